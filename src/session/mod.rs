pub mod connectivity;
pub mod inbound;
pub mod outbound;
