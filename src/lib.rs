#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod cursor;
pub mod error;
pub mod ffprobe;
pub mod mime;
pub mod service;
pub mod settings;
pub mod sniffer;

pub use cache::{MediaCache, PassthroughCache};
pub use error::ProbeError;
pub use service::{Metadata, MetadataService};
