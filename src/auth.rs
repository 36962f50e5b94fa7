//! Credentials, scopes, and the cached token model.

pub mod credentials;
pub mod scope;
pub mod secret;
pub mod token;

pub use credentials::*;
pub use scope::*;
pub use secret::*;
pub use token::*;
