//! Channel abstraction for message I/O.

pub mod cli;
pub mod transport;

pub use cli::{CliChannel, EventStream};
pub use transport::{extract_or_empty, TextExtractor, Transport, PlainTextExtractor};
