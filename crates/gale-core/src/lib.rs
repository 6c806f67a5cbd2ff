//! gale-core: Embeddable asynchronous HTTP/HTTPS client engine
//!
//! Build a [`Request`], hand it to an [`Engine`], get a [`Response`] back
//! at once, and wait on it from whichever thread needs the result. The
//! network work happens on a reactor thread.
//!
//! ## Features
//! - `tls` (default) - HTTPS via rustls, with webpki roots or a PEM trust file
//!
//! ## Behaviour
//! - One connection per request, closed after the exchange
//! - HTTP/1.1, GET and POST only
//! - No redirects, cookies, retries or connection reuse
//! - A non-2xx status is a completed exchange with `error()` populated
//!
//! ## Example
//! ```no_run
//! use gale_core::{Engine, Method, RequestBuilder};
//!
//! let engine = Engine::new()?;
//! let request = RequestBuilder::new(Method::Get, "http://127.0.0.1:3001/")
//!     .header("Connection", "keep-alive")
//!     .build();
//!
//! let response = engine.send(&request)?;
//! response.wait();
//! println!("{} {}", response.status_code(), response.text().unwrap_or(""));
//! # Ok::<(), gale_core::Error>(())
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod reactor;
pub mod request;
pub mod response;

mod exchange;
mod registry;
mod signal;

#[cfg(feature = "tls")]
pub mod tls;

// Re-exports
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{Error, Result};
pub use reactor::{Reactor, ReactorHandle};
pub use registry::ExchangeId;
pub use request::{default_port, Method, Request, RequestBuilder};
pub use response::{ExchangeState, Response};

#[cfg(feature = "tls")]
pub use tls::{SessionFactory, TlsContext, TlsOptions, TlsSession, TrustStore, Verification};

pub use gale_url::{decode_query, encode_query, Url};
