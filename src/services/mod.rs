pub mod probe;
pub mod server;
