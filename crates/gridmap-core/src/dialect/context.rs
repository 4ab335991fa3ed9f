use crate::options::{OptionKey, OptionsRegistry};
use std::sync::Arc;
use ulid::Ulid;

///
/// TransactionContext
///
/// Correlates dialect calls belonging to one unit of work, for stores
/// that batch or scope writes by transaction id. Optional everywhere;
/// dialects must work without one.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TransactionContext {
    id: Ulid,
}

impl TransactionContext {
    #[must_use]
    pub fn new() -> Self {
        Self { id: Ulid::new() }
    }

    #[must_use]
    pub const fn id(&self) -> Ulid {
        self.id
    }
}

impl Default for TransactionContext {
    fn default() -> Self {
        Self::new()
    }
}

///
/// TupleTypeContext
///
/// Boot-scoped descriptor of one entity type as the dialect sees it: the
/// columns worth selecting on reads and the effective options for the
/// type. Built once per entity type and shared across calls; never
/// retained by dialects beyond the call.
///

#[derive(Debug)]
pub struct TupleTypeContext {
    table: String,
    selectable_columns: Vec<String>,
    options: Arc<OptionsRegistry>,
}

impl TupleTypeContext {
    #[must_use]
    pub fn new(
        table: impl Into<String>,
        selectable_columns: impl IntoIterator<Item = impl Into<String>>,
        options: Arc<OptionsRegistry>,
    ) -> Self {
        Self {
            table: table.into(),
            selectable_columns: selectable_columns.into_iter().map(Into::into).collect(),
            options,
        }
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Columns the engine will read from returned tuples. Dialects with
    /// projection support may restrict reads to these.
    #[must_use]
    pub fn selectable_columns(&self) -> &[String] {
        &self.selectable_columns
    }

    #[must_use]
    pub fn options(&self) -> &Arc<OptionsRegistry> {
        &self.options
    }

    /// Effective option for this entity type.
    #[must_use]
    pub fn option<K: OptionKey>(&self) -> Option<K::Value> {
        self.options.resolve_entity::<K>(&self.table)
    }

    /// Effective option for one column of this entity type.
    #[must_use]
    pub fn property_option<K: OptionKey>(&self, column: &str) -> Option<K::Value> {
        self.options.resolve_property::<K>(&self.table, column)
    }
}

///
/// TupleContext
///
/// Per-call context for tuple operations: the type context plus the
/// transaction the call belongs to, if any.
///

#[derive(Clone, Debug)]
pub struct TupleContext {
    type_context: Arc<TupleTypeContext>,
    transaction: Option<TransactionContext>,
}

impl TupleContext {
    #[must_use]
    pub const fn new(type_context: Arc<TupleTypeContext>) -> Self {
        Self {
            type_context,
            transaction: None,
        }
    }

    #[must_use]
    pub const fn with_transaction(mut self, transaction: TransactionContext) -> Self {
        self.transaction = Some(transaction);
        self
    }

    #[must_use]
    pub fn type_context(&self) -> &Arc<TupleTypeContext> {
        &self.type_context
    }

    #[must_use]
    pub const fn transaction(&self) -> Option<&TransactionContext> {
        self.transaction.as_ref()
    }
}

///
/// AssociationTypeContext
///
/// Boot-scoped descriptor of one association role: the owning entity's
/// table, the role name on the main side, and the effective options. The
/// role resolves options at property scope on the owning table.
///

#[derive(Debug)]
pub struct AssociationTypeContext {
    table: String,
    role: String,
    options: Arc<OptionsRegistry>,
}

impl AssociationTypeContext {
    #[must_use]
    pub fn new(
        table: impl Into<String>,
        role: impl Into<String>,
        options: Arc<OptionsRegistry>,
    ) -> Self {
        Self {
            table: table.into(),
            role: role.into(),
            options,
        }
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Role of the association on the side owning it.
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    #[must_use]
    pub fn options(&self) -> &Arc<OptionsRegistry> {
        &self.options
    }

    /// Effective option for this association role.
    #[must_use]
    pub fn option<K: OptionKey>(&self) -> Option<K::Value> {
        self.options.resolve_property::<K>(&self.table, &self.role)
    }
}

///
/// AssociationContext
///

#[derive(Clone, Debug)]
pub struct AssociationContext {
    type_context: Arc<AssociationTypeContext>,
    transaction: Option<TransactionContext>,
}

impl AssociationContext {
    #[must_use]
    pub const fn new(type_context: Arc<AssociationTypeContext>) -> Self {
        Self {
            type_context,
            transaction: None,
        }
    }

    #[must_use]
    pub const fn with_transaction(mut self, transaction: TransactionContext) -> Self {
        self.transaction = Some(transaction);
        self
    }

    #[must_use]
    pub fn type_context(&self) -> &Arc<AssociationTypeContext> {
        &self.type_context
    }

    #[must_use]
    pub const fn transaction(&self) -> Option<&TransactionContext> {
        self.transaction.as_ref()
    }
}

///
/// TESTS
///
