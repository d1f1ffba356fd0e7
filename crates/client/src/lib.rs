//! Async HTTP client for Blossom blob servers.
//!
//! [`Client`] speaks the wire protocol for one server. Coordinators in
//! `blossom-upload` and `blossom-media` only see the [`BlobServer`] trait,
//! which keeps them testable against in-process mocks.

pub mod capabilities;
pub mod client;
pub mod error;
pub mod fanout;
pub mod probe;
pub mod server;
pub mod types;

pub use capabilities::parse_capabilities;
pub use client::{Client, Timeouts};
pub use error::ClientError;
pub use fanout::{BatchCancel, Slot, fan_out};
pub use probe::exists;
pub use server::BlobServer;
pub use types::{BlobUpload, ChunkResponse, ChunkUpload, HeadResponse, Operation};
