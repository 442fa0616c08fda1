pub mod manager;
pub mod provider;
pub mod state;
pub mod token_store;
pub mod types;

pub use manager::{OAuthManager, OAuthRegistry};
pub use provider::{HttpOAuthProvider, OAuthProvider};
pub use token_store::{MemoryTokenStore, SqliteTokenStore, TokenStore};
pub use types::{AuthEvent, AuthStatus, AuthStatusReport, TokenRecord, TokenResponse};
