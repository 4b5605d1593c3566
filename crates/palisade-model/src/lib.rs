//! # palisade-model
//!
//! Wire-level message and authentication-ticket model for the palisade
//! authorization server.
//!
//! This crate is deliberately free of protocol logic: it defines the typed
//! views over OAuth 2.0 / `OpenID` Connect request parameters, the
//! authentication ticket passed between endpoints, and the binary frame used
//! to park in-flight authorization requests in the request cache.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod codec;
pub mod message;
pub mod ticket;

pub use codec::{decode_message, encode_message, CodecError};
pub use message::{MessageKind, ProtocolMessage};
pub use ticket::{AuthenticationTicket, Claim, Destination, SubjectIdentity, TicketProperties};
