//! RESO Web API access: credentials and bearer token management

pub mod auth;
pub mod models;

pub use auth::AuthProvider;
pub use models::{ClientCredentials, Credentials, TokenResponse};
