//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports from the [`secrecy`] crate. Any struct that derives `Debug`
//! while holding a `SecretString` field automatically prints `[REDACTED]`
//! instead of the value, so a secret cannot leak through `{:?}` formatting
//! or a tracing field. Secrets are zeroized when dropped.
//!
//! Use `SecretString` for the Redis connection URL (it may embed
//! credentials), the access-token signing secret, and any bearer token held
//! longer than a single call. Reading the value requires an explicit
//! [`ExposeSecret::expose_secret`] call at the use site.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct StoreConfig {
//!     bind_address: String,
//!     redis_url: SecretString,
//! }
//!
//! let config = StoreConfig {
//!     bind_address: "0.0.0.0:8080".to_string(),
//!     redis_url: SecretString::from("redis://:hunter2@cache:6379"),
//! };
//!
//! // Safe: the URL is redacted
//! let printed = format!("{config:?}");
//! assert!(!printed.contains("hunter2"));
//!
//! // Deliberate access only
//! let url: &str = config.redis_url.expose_secret();
//! # assert!(url.starts_with("redis://"));
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
