pub mod board;
pub mod config;
pub mod errors;
pub mod observability;
pub mod remote;
pub mod server;
pub mod session;

pub use errors::BoardError;
