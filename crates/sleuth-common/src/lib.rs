//! Sleuth Common Types and Framing
//!
//! This crate provides the protocol layer shared by every sleuth component:
//!
//! - **Error handling**: the [`Error`] type carrying the ordered trace of
//!   failure-site codes, plus the [`codes`] table itself
//! - **Framing**: request and response envelopes, their marshaling to and
//!   from wire frames, and the gzip helpers used by the frame body
//!
//! # Wire format
//!
//! Every frame on the wire is the ASCII group identifier, a 4-byte kind tag
//! (`REPL` for requests, `RECV` for responses), and a gzip-compressed JSON
//! body:
//!
//! ```text
//! [group bytes] [RECV | REPL] [gzip(JSON envelope)]
//! ```
//!
//! Frames whose prefix does not match the receiving client's group are
//! rejected before the body is ever inspected.

pub mod error;
pub mod protocol;
pub mod zip;

pub use error::{codes, Error, Result};
