//! Master-less peer-to-peer autodiscovery and RPC between HTTP services on
//! the same network.
//!
//! A process joins a named logical group either as a pure client or as a
//! server announcing exactly one named service. Members discover each other
//! automatically over a gossip fabric, and any member can issue
//! request/response calls addressed by service name; calls round-robin
//! across every live instance of the service.
//!
//! # Components
//!
//! - [`Client`] — joins a group, tracks the peer directory, issues calls,
//!   and (with a [`Handler`]) answers them
//! - [`Config`] — group, interface, port, service, and timeout settings
//! - [`ResponseWriter`] — hands a handler's output back to the caller
//! - [`sleuth_fabric::Fabric`] — the pluggable gossip transport; tests and
//!   single-host setups use [`sleuth_fabric::memory::MemoryHub`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use http::{Request, StatusCode};
//! use sleuth::{Client, Config, Handler, ResponseWriter};
//! use sleuth_fabric::memory::MemoryHub;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Handler for Echo {
//!     async fn serve(&self, request: Request<Vec<u8>>, writer: &mut ResponseWriter) {
//!         let body = request.into_body();
//!         let _ = writer.write(&body).await;
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> sleuth::Result<()> {
//!     let hub = MemoryHub::new();
//!
//!     let server_config = Config {
//!         service: "echo".to_string(),
//!         ..Config::default()
//!     };
//!     let server = Client::connect(hub.node(), server_config, Some(Arc::new(Echo))).await?;
//!
//!     let client = Client::connect(hub.node(), Config::default(), None).await?;
//!     client.wait_for(&["echo"]).await?;
//!
//!     let request = Request::builder()
//!         .method("POST")
//!         .uri("sleuth://echo/")
//!         .body(b"foo bar baz".to_vec())
//!         .unwrap();
//!     let response = client.call(request).await?;
//!     assert_eq!(response.status(), StatusCode::OK);
//!
//!     client.close().await?;
//!     server.close().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod handler;
pub mod writer;

mod notifier;
mod peer;
mod pending;
mod pool;
mod registry;

pub use client::{Client, SCHEME};
pub use config::{Config, DEFAULT_GROUP, DEFAULT_PORT, DEFAULT_TIMEOUT_MS};
pub use handler::Handler;
pub use writer::ResponseWriter;

pub use sleuth_common::{codes, Error, Result};
