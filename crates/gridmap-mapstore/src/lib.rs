//! In-memory reference backend for gridmap: plain ordered maps behind a
//! full grid dialect. Exists to pin the dialect contract's semantics and
//! to let engines and tests run without a datastore server.
#![warn(unreachable_pub)]

pub mod codec;
pub mod dialect;
pub mod store;

pub use codec::{MAX_RECORD_BYTES, RawRecord};
pub use dialect::MapDialect;
pub use store::MapDatastore;
