pub mod backoff;
pub mod connection;

pub use backoff::{Backoff, BackoffOptions};
pub use connection::ConnectionState;
