//! Authentication for backend calls
//!
//! - `Credentials` / `SessionStore`: the bearer token and its persistence
//! - `IdentityProvider` / `LoginPrompt`: where credentials come from
//! - `AuthenticationSession`: single-flight login and refresh

pub mod credentials;
pub mod provider;
pub mod session;

pub use credentials::{Credentials, SessionStore};
pub use provider::{
    HttpIdentityProvider, IdentityProvider, LocalIdentityProvider, LoginPrompt,
    LOCAL_TOKEN_PREFIX,
};
pub use session::AuthenticationSession;
