pub mod clock;
pub mod config;
pub mod error;
pub mod fmt;
pub mod index;
pub mod iterator;
pub mod keys;
pub mod ring;
pub mod segment;
pub mod vlog;
pub mod writer;

pub use config::RingConfig;
pub use error::{Error, Result};
pub use iterator::ForwardIterator;
pub use ring::SegRing;
pub use segment::Segment;
pub use vlog::ValueStruct;
