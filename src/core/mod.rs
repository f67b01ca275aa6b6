//! # Core Protocol Components
//!
//! Frames and the message codec shared by every transport.
//!
//! ## Components
//! - **Frame**: transport-neutral unit of data (binary, text, close)
//! - **Codec**: JSON tagged-union encoding of typed messages
//!
//! ## Wire Format
//! ```text
//! WebSocket binary frame ── {"type": "<variant>", ...payload fields}
//! ```
//!
//! The `type` discriminator selects exactly one variant; decoding never probes
//! payload shapes.

pub mod codec;
pub mod frame;
