//! Stream byte sources.
//!
//! The ingestion layer hands raw bytes to the demuxer and nothing else:
//! it does not frame, decode, or interpret the stream. Two backends exist:
//!
//! - `http(s)://` endpoints are read as an unbounded streaming GET body, the
//!   way the camera firmware serves its interleaved feed.
//! - `stub://` endpoints synthesize the same wire format in-process, for the
//!   demo binary and for running the daemon without hardware.
//!
//! Connection retry, authentication challenges, and reconnect UX belong to
//! the network collaborator, not here.

mod http;

pub use http::{ByteStreamSource, DEFAULT_CHUNK_BYTES};
