//! Tower layers composed by [`crate::TransportBuilder`].
//!
//! - [`ApiKeyAuthLayer`] - attaches the registry API key
//! - [`TraceLayer`] - `outgoing_http` span per request
//! - [`UserAgentLayer`] - default `User-Agent`
//! - [`SecureRedirectPolicy`] - redirect policy that keeps credentials on-origin

mod api_key;
mod redirect;
mod trace;
mod user_agent;

pub use api_key::{ApiKeyAuthLayer, ApiKeyAuthService, ApiKeyLocation};
pub use redirect::SecureRedirectPolicy;
pub use trace::{TraceLayer, TraceService};
pub use user_agent::{UserAgentLayer, UserAgentService};
