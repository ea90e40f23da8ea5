// Error taxonomy
pub mod error;

// Environment and file configuration
pub mod config;

// JSON file storage with merge-on-write
pub mod store;

// Token record and refresh policy
pub mod token;

// Provider endpoints and wire types
pub mod provider;

// HTTP transport boundary
pub mod transport;

// OAuth client core
pub mod client;

pub use client::{AuthorizationRequest, OAuthClient, UserInfo};
pub use config::{ClientConfig, ClientCredentials};
pub use error::{OAuthError, Result};
pub use token::{TokenRecord, TokenState};
