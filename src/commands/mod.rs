//! Command implementations for the CLI
//!
//! - start: Start the gateway server
//! - test: Test configuration validity
//! - oauth: Inspect, refresh and revoke stored tokens
//! - session: Issue dashboard session tokens

pub mod oauth;
pub mod session;
pub mod start;
