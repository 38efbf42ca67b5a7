//! External prediction service plumbing.
//!
//! Every oracle call in the system goes through [`OracleGateway`], which
//! enforces the concurrency gate, call spacing, the sliding per-minute quota
//! and the bounded retry policy, and appends an audit record for every
//! attempt. Business code only depends on the `ask -> text` capability and
//! applies its own fallback heuristics on top.

mod client;
mod gateway;
mod http;

pub use client::{OracleApiError, OracleClient};
pub use gateway::{OracleGateway, OracleGatewayConfig};
pub use http::HttpOracleClient;
