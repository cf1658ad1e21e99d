//! HTTP interface of the heartbeat server
//!
//! - `handlers`: health envelope, `/ws/health` heartbeat socket, metrics
//! - `middleware`: request id, security headers, request metrics
//! - `router`: route table

pub mod handlers;
pub mod middleware;
pub mod router;

pub use router::{create_router, RouterOptions};
