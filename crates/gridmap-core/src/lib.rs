//! Core contract for gridmap: the grid dialect trait and its facets, the
//! tuple and association data model, the flush-cycle error protocol, and
//! the option/configuration machinery shared by every datastore backend.
#![warn(unreachable_pub)]

pub mod config;
pub mod dialect;
pub mod error;
pub mod flush;
pub mod id;
pub mod model;
pub mod options;

///
/// Prelude
///
/// Prelude contains the vocabulary a dialect implementation or an engine
/// needs daily. Configuration, options plumbing, and error internals stay
/// one module level down.
///

pub mod prelude {
    pub use crate::{
        dialect::{
            BoundDialect, GridDialect,
            context::{AssociationContext, TupleContext},
        },
        error::StoreError,
        flush::FlushCycle,
        model::{Association, AssociationKey, EntityKey, RowKey, Tuple, Value},
    };
}
