//! The wire-level part of the protocol: packet layout, reserved commands, and message id
//!  sequencing. Nothing in here does I/O or keeps session state beyond message ids.

pub mod command;
pub mod packet_buffer;
pub mod packet_header;
pub mod sequence;
