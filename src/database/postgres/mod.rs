pub mod client;
pub mod generate;
pub mod loader;
pub mod merge;
pub mod session;
