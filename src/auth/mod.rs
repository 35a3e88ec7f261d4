//! OAuth device-authorization flow and session storage.

pub mod authenticator;
pub mod client;
pub mod error;
pub mod pkce;
pub mod session;
pub mod store;

pub use authenticator::{Authenticator, PromptFn, SessionProvider, DEFAULT_POLL_INTERVAL};
pub use client::{AuthClient, AuthTransport, Scope, DEFAULT_AUTH_SERVER};
pub use error::{AuthError, AUTHORIZATION_PENDING};
pub use pkce::{compute_code_challenge, Challenger, PkcePair, S256Challenger, StaticChallenger};
pub use session::{AuthenticatedSession, AuthenticationSession, VerificationPrompt};
pub use store::{default_session_path, FileSessionStore, InMemorySessionStore, SessionStore};
