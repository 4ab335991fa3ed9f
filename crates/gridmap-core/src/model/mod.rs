pub mod association;
pub mod key;
pub mod tuple;
pub mod value;

pub use association::{Association, AssociationOp};
pub use key::{
    AssociationKey, AssociationKeyMetadata, AssociationKeyMetadataBuilder, AssociationKind,
    EntityKey, EntityKeyMetadata, IdSourceKey, IdSourceKeyMetadata, KeyError, RowKey,
};
pub use tuple::{SnapshotKind, Tuple, TupleOp};
pub use value::{Float64, Value};
