//! Device side of a lightweight request / acknowledgement protocol over UDP: a device talks to
//!  a single server that it discovers by broadcasting, with at most one message in flight,
//!  retransmission until acknowledgement, and duplicate suppression for incoming commands.

pub mod clock;
pub mod config;
pub mod device;
pub mod driver;
pub mod handler;
pub mod identity;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod test_util;


#[cfg(test)]
mod test {
    use tracing::Level;

    #[ctor::ctor]
    fn init_test_logging() {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(Level::TRACE)
            .try_init()
            .ok();
    }
}
