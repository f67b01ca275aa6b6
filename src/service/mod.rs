//! # Services
//!
//! Typed connection handles built on top of the transport layer.
//!
//! - [`channel::Channel`]: typed send / receive / close over one connection

pub mod channel;
