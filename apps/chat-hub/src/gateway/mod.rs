pub mod client;
pub mod hub;
pub mod presence;
pub mod server;
