use crate::{
    error::{ErrorClass, ErrorOrigin, StoreError},
    model::value::Value,
};
use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};
use thiserror::Error as ThisError;

///
/// KeyError
///
/// Invariant violations raised while building key metadata or keys.
///

#[derive(Debug, ThisError)]
pub enum KeyError {
    #[error("key for table '{table}' expects {expected} column values, found {found}")]
    ArityMismatch {
        table: String,
        expected: usize,
        found: usize,
    },

    #[error("key metadata for table '{table}' has no columns")]
    EmptyColumns { table: String },

    #[error("key metadata for table '{table}' repeats column '{column}'")]
    DuplicateColumn { table: String, column: String },
}

impl KeyError {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        ErrorClass::InvariantViolation
    }

    #[must_use]
    pub const fn origin(&self) -> ErrorOrigin {
        ErrorOrigin::Model
    }
}

impl From<KeyError> for StoreError {
    fn from(err: KeyError) -> Self {
        Self::invariant(err.origin(), err.to_string())
    }
}

fn check_columns(table: &str, columns: &[String]) -> Result<(), KeyError> {
    if columns.is_empty() {
        return Err(KeyError::EmptyColumns {
            table: table.to_string(),
        });
    }
    for (i, column) in columns.iter().enumerate() {
        if columns[..i].contains(column) {
            return Err(KeyError::DuplicateColumn {
                table: table.to_string(),
                column: column.clone(),
            });
        }
    }

    Ok(())
}

fn check_arity(table: &str, expected: usize, found: usize) -> Result<(), KeyError> {
    if expected == found {
        Ok(())
    } else {
        Err(KeyError::ArityMismatch {
            table: table.to_string(),
            expected,
            found,
        })
    }
}

fn fmt_values(f: &mut fmt::Formatter<'_>, values: &[Value]) -> fmt::Result {
    write!(f, "[")?;
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{value}")?;
    }
    write!(f, "]")
}

///
/// EntityKeyMetadata
///
/// Immutable descriptor of one logical entity table: the table name and
/// the ordered, duplicate-free key column names. Shared via `Arc` by every
/// key addressing the table; identity is the full field set.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EntityKeyMetadata {
    table: String,
    column_names: Vec<String>,
}

impl EntityKeyMetadata {
    pub fn try_new(
        table: impl Into<String>,
        column_names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, KeyError> {
        let table = table.into();
        let column_names: Vec<String> = column_names.into_iter().map(Into::into).collect();
        check_columns(&table, &column_names)?;

        Ok(Self {
            table,
            column_names,
        })
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    #[must_use]
    pub fn is_key_column(&self, name: &str) -> bool {
        self.column_names.iter().any(|c| c == name)
    }
}

impl fmt::Display for EntityKeyMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.table, self.column_names.join(", "))
    }
}

///
/// EntityKey
///
/// Transient address of one entity row: shared metadata plus the concrete
/// key column values, positionally matched to the metadata columns.
/// Ordered by table then values so rows of one table are contiguous in
/// ordered stores.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EntityKey {
    metadata: Arc<EntityKeyMetadata>,
    values: Vec<Value>,
}

impl EntityKey {
    pub fn try_new(
        metadata: Arc<EntityKeyMetadata>,
        values: Vec<Value>,
    ) -> Result<Self, KeyError> {
        check_arity(
            metadata.table(),
            metadata.column_names().len(),
            values.len(),
        )?;

        Ok(Self { metadata, values })
    }

    #[must_use]
    pub fn metadata(&self) -> &Arc<EntityKeyMetadata> {
        &self.metadata
    }

    #[must_use]
    pub fn table(&self) -> &str {
        self.metadata.table()
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        self.metadata.column_names()
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value of one key column, positionally resolved through the metadata.
    #[must_use]
    pub fn value_of(&self, column: &str) -> Option<&Value> {
        let idx = self.metadata.column_names().iter().position(|c| c == column)?;
        self.values.get(idx)
    }

    /// Key values without the table prefix, for error payloads that carry
    /// the table separately.
    #[must_use]
    pub fn values_display(&self) -> String {
        let parts: Vec<String> = self.values.iter().map(ToString::to_string).collect();
        format!("[{}]", parts.join(", "))
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table())?;
        fmt_values(f, &self.values)
    }
}

///
/// AssociationKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AssociationKind {
    /// Stored in a dedicated association structure.
    Association,
    /// Embedded into the owning entity's own structure.
    Embedded,
}

///
/// AssociationKeyMetadata
///
/// Descriptor of one association structure. Identity is the table and the
/// owning key columns; the remaining fields are navigation payload carried
/// for dialects and excluded from equality and hashing.
///

#[derive(Clone, Debug)]
pub struct AssociationKeyMetadata {
    table: String,
    column_names: Vec<String>,

    // navigation payload, not identity
    row_key_column_names: Vec<String>,
    row_key_index_column_names: Vec<String>,
    inverse: bool,
    collection_role: String,
    kind: AssociationKind,
}

impl AssociationKeyMetadata {
    #[must_use]
    pub fn builder() -> AssociationKeyMetadataBuilder {
        AssociationKeyMetadataBuilder::default()
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    #[must_use]
    pub fn row_key_column_names(&self) -> &[String] {
        &self.row_key_column_names
    }

    #[must_use]
    pub fn row_key_index_column_names(&self) -> &[String] {
        &self.row_key_index_column_names
    }

    /// True when this side does not own the association.
    #[must_use]
    pub const fn is_inverse(&self) -> bool {
        self.inverse
    }

    #[must_use]
    pub fn collection_role(&self) -> &str {
        &self.collection_role
    }

    #[must_use]
    pub const fn kind(&self) -> AssociationKind {
        self.kind
    }
}

impl PartialEq for AssociationKeyMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.column_names == other.column_names
    }
}

impl Eq for AssociationKeyMetadata {}

impl Hash for AssociationKeyMetadata {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table.hash(state);
        self.column_names.hash(state);
    }
}

impl Ord for AssociationKeyMetadata {
    fn cmp(&self, other: &Self) -> Ordering {
        // consistent with Eq: payload never participates
        self.table
            .cmp(&other.table)
            .then_with(|| self.column_names.cmp(&other.column_names))
    }
}

impl PartialOrd for AssociationKeyMetadata {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for AssociationKeyMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.table, self.column_names.join(", "))
    }
}

///
/// AssociationKeyMetadataBuilder
///

#[derive(Debug, Default)]
pub struct AssociationKeyMetadataBuilder {
    table: String,
    column_names: Vec<String>,
    row_key_column_names: Vec<String>,
    row_key_index_column_names: Vec<String>,
    inverse: bool,
    collection_role: String,
    kind: Option<AssociationKind>,
}

impl AssociationKeyMetadataBuilder {
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    #[must_use]
    pub fn column_names(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.column_names = names.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn row_key_column_names(
        mut self,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.row_key_column_names = names.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn row_key_index_column_names(
        mut self,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.row_key_index_column_names = names.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn inverse(mut self, inverse: bool) -> Self {
        self.inverse = inverse;
        self
    }

    #[must_use]
    pub fn collection_role(mut self, role: impl Into<String>) -> Self {
        self.collection_role = role.into();
        self
    }

    #[must_use]
    pub const fn kind(mut self, kind: AssociationKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn try_build(self) -> Result<AssociationKeyMetadata, KeyError> {
        check_columns(&self.table, &self.column_names)?;
        check_columns(&self.table, &self.row_key_column_names)?;

        Ok(AssociationKeyMetadata {
            table: self.table,
            column_names: self.column_names,
            row_key_column_names: self.row_key_column_names,
            row_key_index_column_names: self.row_key_index_column_names,
            inverse: self.inverse,
            collection_role: self.collection_role,
            kind: self.kind.unwrap_or(AssociationKind::Association),
        })
    }
}

///
/// AssociationKey
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AssociationKey {
    metadata: Arc<AssociationKeyMetadata>,
    values: Vec<Value>,
}

impl AssociationKey {
    pub fn try_new(
        metadata: Arc<AssociationKeyMetadata>,
        values: Vec<Value>,
    ) -> Result<Self, KeyError> {
        check_arity(
            metadata.table(),
            metadata.column_names().len(),
            values.len(),
        )?;

        Ok(Self { metadata, values })
    }

    #[must_use]
    pub fn metadata(&self) -> &Arc<AssociationKeyMetadata> {
        &self.metadata
    }

    #[must_use]
    pub fn table(&self) -> &str {
        self.metadata.table()
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        self.metadata.column_names()
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl fmt::Display for AssociationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table())?;
        fmt_values(f, &self.values)
    }
}

///
/// RowKey
///
/// Address of one row inside an association. Row keys exist in very large
/// numbers, so they carry their column names directly instead of shared
/// metadata; no uniqueness validation is repeated per row.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RowKey {
    column_names: Arc<Vec<String>>,
    values: Vec<Value>,
}

impl RowKey {
    pub fn try_new(column_names: Arc<Vec<String>>, values: Vec<Value>) -> Result<Self, KeyError> {
        if column_names.len() != values.len() {
            return Err(KeyError::ArityMismatch {
                table: "<row>".to_string(),
                expected: column_names.len(),
                found: values.len(),
            });
        }

        Ok(Self {
            column_names,
            values,
        })
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn value_of(&self, column: &str) -> Option<&Value> {
        let idx = self.column_names.iter().position(|c| c == column)?;
        self.values.get(idx)
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_values(f, &self.values)
    }
}

///
/// IdSourceKeyMetadata
///
/// Descriptor of one id source: a counter table addressed by a segment
/// column, or a named sequence for stores that expose sequences natively.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum IdSourceKeyMetadata {
    Table {
        table: String,
        key_column: String,
        value_column: String,
    },
    Sequence {
        name: String,
    },
}

impl IdSourceKeyMetadata {
    pub fn for_table(
        table: impl Into<String>,
        key_column: impl Into<String>,
        value_column: impl Into<String>,
    ) -> Self {
        Self::Table {
            table: table.into(),
            key_column: key_column.into(),
            value_column: value_column.into(),
        }
    }

    pub fn for_sequence(name: impl Into<String>) -> Self {
        Self::Sequence { name: name.into() }
    }

    /// Table name or sequence name, whichever backs this source.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Table { table, .. } => table,
            Self::Sequence { name } => name,
        }
    }

    #[must_use]
    pub const fn is_sequence(&self) -> bool {
        matches!(self, Self::Sequence { .. })
    }
}

///
/// IdSourceKey
///
/// One counter inside an id source: a (table, segment) pair for the table
/// strategy, or the sequence itself for the sequence strategy.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct IdSourceKey {
    metadata: Arc<IdSourceKeyMetadata>,
    segment: Option<String>,
}

impl IdSourceKey {
    #[must_use]
    pub fn for_table(metadata: Arc<IdSourceKeyMetadata>, segment: impl Into<String>) -> Self {
        Self {
            metadata,
            segment: Some(segment.into()),
        }
    }

    #[must_use]
    pub const fn for_sequence(metadata: Arc<IdSourceKeyMetadata>) -> Self {
        Self {
            metadata,
            segment: None,
        }
    }

    #[must_use]
    pub fn metadata(&self) -> &Arc<IdSourceKeyMetadata> {
        &self.metadata
    }

    #[must_use]
    pub fn segment(&self) -> Option<&str> {
        self.segment.as_deref()
    }
}

impl fmt::Display for IdSourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.segment() {
            Some(segment) => write!(f, "{}#{segment}", self.metadata.name()),
            None => write!(f, "{}", self.metadata.name()),
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn order_metadata() -> Arc<EntityKeyMetadata> {
        Arc::new(EntityKeyMetadata::try_new("Order", ["id"]).unwrap())
    }

    #[test]
    fn metadata_rejects_duplicate_columns() {
        let err = EntityKeyMetadata::try_new("Order", ["id", "id"]).unwrap_err();
        assert!(matches!(err, KeyError::DuplicateColumn { .. }));
    }

    #[test]
    fn metadata_rejects_empty_columns() {
        let err = EntityKeyMetadata::try_new("Order", Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, KeyError::EmptyColumns { .. }));
    }

    #[test]
    fn entity_key_enforces_arity() {
        let metadata = order_metadata();
        let err =
            EntityKey::try_new(metadata, vec![Value::Int(1), Value::Int(2)]).unwrap_err();
        assert!(matches!(
            err,
            KeyError::ArityMismatch {
                expected: 1,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn entity_keys_of_one_table_are_contiguous() {
        let orders = order_metadata();
        let users = Arc::new(EntityKeyMetadata::try_new("User", ["id"]).unwrap());

        let mut keys = vec![
            EntityKey::try_new(users.clone(), vec![Value::Int(1)]).unwrap(),
            EntityKey::try_new(orders.clone(), vec![Value::Int(9)]).unwrap(),
            EntityKey::try_new(users, vec![Value::Int(2)]).unwrap(),
            EntityKey::try_new(orders, vec![Value::Int(3)]).unwrap(),
        ];
        keys.sort();

        let tables: Vec<&str> = keys.iter().map(EntityKey::table).collect();
        assert_eq!(tables, vec!["Order", "Order", "User", "User"]);
        assert_eq!(keys[0].values(), &[Value::Int(3)]);
        assert_eq!(keys[1].values(), &[Value::Int(9)]);
    }

    #[test]
    fn association_metadata_identity_excludes_payload() {
        let left = AssociationKeyMetadata::builder()
            .table("Order_items")
            .column_names(["order_id"])
            .row_key_column_names(["order_id", "item_id"])
            .collection_role("items")
            .inverse(false)
            .kind(AssociationKind::Association)
            .try_build()
            .unwrap();
        let right = AssociationKeyMetadata::builder()
            .table("Order_items")
            .column_names(["order_id"])
            .row_key_column_names(["order_id", "item_id"])
            .collection_role("elsewhere")
            .inverse(true)
            .kind(AssociationKind::Embedded)
            .try_build()
            .unwrap();

        assert_eq!(left, right);
        assert_eq!(left.cmp(&right), Ordering::Equal);
    }

    #[test]
    fn row_key_resolves_columns_positionally() {
        let columns = Arc::new(vec!["order_id".to_string(), "item_id".to_string()]);
        let row = RowKey::try_new(columns, vec![Value::Int(1), Value::Int(7)]).unwrap();

        assert_eq!(row.value_of("item_id"), Some(&Value::Int(7)));
        assert_eq!(row.value_of("missing"), None);
    }

    #[test]
    fn id_source_key_display_includes_segment() {
        let metadata = Arc::new(IdSourceKeyMetadata::for_table(
            "sequences",
            "sequence_name",
            "next_val",
        ));
        let key = IdSourceKey::for_table(metadata, "Order");
        assert_eq!(key.to_string(), "sequences#Order");
    }
}
