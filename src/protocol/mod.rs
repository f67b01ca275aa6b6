//! # Protocol Layer
//!
//! Message schemas exchanged between item clients and the item server.
//!
//! ## Message Flow
//! ```text
//! client ── Add / Update / Delete ──▶ server
//! client ◀── Items (once, on connect) ── server
//! every client ◀── Added / Updated / Deleted ── server (after each mutation)
//! ```

pub mod message;
