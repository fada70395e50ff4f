//! Client-side library shared by front-ends: a credential store, an API
//! client that attaches the bearer token, and the auth and feed services
//! built on top of it.

pub mod api;
pub mod auth;
pub mod credentials;
pub mod error;
pub mod feed;

pub use api::ApiClient;
pub use auth::{AuthService, SignupFields};
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::ClientError;
pub use feed::{FeedService, ToggleResult};
