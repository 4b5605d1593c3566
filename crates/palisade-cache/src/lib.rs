//! # palisade-cache
//!
//! Short-lived keyed store backing the authorization server's in-flight
//! requests and opaque authorization codes.
//!
//! The trait is intentionally narrow: point `put`/`get` plus an atomic
//! `take` that underpins the single-use guarantee for authorization codes.
//! The bundled implementation is an in-process TTL map; hosts scale out by
//! supplying an implementation over their distributed cache.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod memory;
pub mod provider;

pub use error::CacheError;
pub use memory::MemoryRequestCache;
pub use provider::{ExpirationPolicy, RequestCache};
