//! Local blocking proxy for the guardian domain classifier.
//!
//! `guardian-proxy` handles two kinds of request:
//!
//! 1. **CONNECT tunnel** (`connect`) - the target `host:port` is classified,
//!    and if allowed the proxy opens a raw TCP tunnel. TLS is never
//!    terminated.
//!
//! 2. **Forwarding** (`forward`) - absolute-form HTTP requests are
//!    classified, rewritten to origin form, and sent to the upstream.
//!
//! Denied and malformed requests are dropped without a response. Each
//! decision is logged under the `guardian_proxy::audit` target and can be
//! observed through an [`ObservationSink`].

pub mod audit;
pub mod buffer;
pub mod config;
pub mod connect;
pub mod error;
pub mod filter;
pub mod forward;
pub mod protection;
pub mod relay;
pub mod request;
pub mod server;

pub use audit::{ChannelSink, FilterEvent, ObservationSink};
pub use config::ProxyConfig;
pub use error::{ProxyError, Result};
pub use filter::{ProxyFilter, UrlPolicy};
pub use protection::{NoopSystemProxy, Protection, SystemProxy};
pub use server::{start, ProxyHandle};
