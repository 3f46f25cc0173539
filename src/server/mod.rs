//! Proxy server: JSON API over the board controller plus a WebSocket stream
//! of board notifications.

pub mod api;
pub mod http;
pub mod ws;

pub use http::{bind, build_router, serve};
