//! Request authentication

pub mod api_key;

pub use api_key::{ApiKeyValidator, API_KEY_HEADER};
