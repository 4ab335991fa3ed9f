use crate::{
    dialect::context::TupleContext,
    error::StoreError,
    model::{EntityKeyMetadata, Tuple, Value},
};
use std::{collections::BTreeMap, fmt, sync::Arc};

///
/// NativeQuery
///
/// A store-native query passed through untranslated, with named value
/// parameters. The text's meaning belongs entirely to the backend.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NativeQuery {
    text: String,
    params: BTreeMap<String, Value>,
}

impl NativeQuery {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }
}

impl fmt::Display for NativeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

///
/// QueryableGridDialect
///
/// Facet for stores exposing a native query capability. Results come back
/// as tuples of the addressed entity type.
///

pub trait QueryableGridDialect {
    fn execute_native_query(
        &self,
        query: &NativeQuery,
        metadata: &Arc<EntityKeyMetadata>,
        context: &TupleContext,
    ) -> Result<Vec<Tuple>, StoreError>;
}
