pub mod ack;
pub mod serve;
