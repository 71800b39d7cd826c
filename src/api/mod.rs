//! HTTP surface
//!
//! Per-user Basic auth, quiz endpoints, the ad-hoc position analysis
//! endpoint, and the crawl-and-analyze SSE stream.

pub mod auth;
pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{router, run, AppContext};
