//! recruit-gateway: OAuth2 token lifecycle and API proxying for a recruiting
//! dashboard's JobAdder and LinkedIn integrations.

pub mod auth;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod oauth;
pub mod proxy;
pub mod server;
pub mod signals;

pub use logging::init_tracing;
