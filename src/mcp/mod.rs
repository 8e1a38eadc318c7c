pub mod catalog;
pub mod envelope;
pub mod help;
pub mod protocol;
pub mod server;
