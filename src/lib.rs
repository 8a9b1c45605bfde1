//! Client-side engine for MongoDB result cursors and bulk writes.
//!
//! This crate implements the two protocol state machines a driver needs on
//! the client side of a query or a write: lazily-fetching cursors with
//! lockstep iterator handles (including revival of tailable cursors), and
//! the batching, sequential submission, and result merging of heterogeneous
//! bulk writes.
//!
//! Connection management, the wire format, and id generation live elsewhere
//! and are reached through the `cursor::BatchSource`, `bulk::WriteSink`, and
//! `bulk::IdSource` traits.
#[macro_use]
extern crate bson;

pub mod bulk;
pub mod common;
pub mod cursor;
pub mod error;

pub use common::WriteConcern;
pub use error::{Error, ErrorCode, Result};
