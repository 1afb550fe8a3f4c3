//! IndieAuth Server
//!
//! Authorization and token endpoints for IndieAuth: users approve a client's
//! request for their identity URL, the client receives a one-time code and
//! either verifies it or exchanges it for an access token.
//!
//! # Features
//!
//! - **Two token modes**: stateless signed JWTs or stored opaque tokens
//! - **Pluggable storage**: in-memory, embedded document database, or an
//!   S3-compatible object store
//! - **Optional password gate**: salted SHA-256 hashes per identity URL
//!
//! # Example
//!
//! ```no_run
//! use indieauth_server::{config::Config, engine::Engine, server::AuthServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = Engine::from_config(&Config::for_testing())?;
//!     AuthServer::new(engine).run_http("127.0.0.1:8080".parse()?).await
//! }
//! ```

pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod identity;
pub mod server;
pub mod store;

pub use config::Config;
pub use engine::Engine;
pub use error::{AuthError, ConfigError, StoreError};
