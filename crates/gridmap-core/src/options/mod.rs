use std::{
    any::{Any, TypeId},
    collections::BTreeMap,
    fmt,
};

///
/// OptionKey
///
/// Marker type identifying one store-tunable option and the type of its
/// value. Options are unique per key and per configured element: setting
/// the same key twice on one scope replaces the earlier value.
///
/// `default_value` is the store-default fallback used when no scope
/// configured the key at all.
///

pub trait OptionKey: 'static {
    type Value: Clone + Send + Sync + 'static;

    fn default_value() -> Option<Self::Value> {
        None
    }
}

///
/// OptionsContainer
///
/// Values for one configuration scope (the global scope, one entity, or
/// one property), keyed by option type.
///

#[derive(Default)]
pub struct OptionsContainer {
    values: BTreeMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl OptionsContainer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Set the value for a key, replacing any earlier value.
    pub fn set<K: OptionKey>(&mut self, value: K::Value) {
        self.values.insert(TypeId::of::<K>(), Box::new(value));
    }

    #[must_use]
    pub fn get<K: OptionKey>(&self) -> Option<K::Value> {
        self.values
            .get(&TypeId::of::<K>())
            .and_then(|v| v.downcast_ref::<K::Value>())
            .cloned()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }
}

impl fmt::Debug for OptionsContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionsContainer")
            .field("len", &self.values.len())
            .finish()
    }
}

///
/// OptionsBuilder
///
/// Programmatic option source spanning the three scopes. Built once at
/// boot and frozen into an immutable [`OptionsRegistry`]; the registry is
/// then shared for the session-factory lifetime.
///

#[derive(Debug, Default)]
pub struct OptionsBuilder {
    global: OptionsContainer,
    entities: BTreeMap<String, OptionsContainer>,
    properties: BTreeMap<(String, String), OptionsContainer>,
}

impl OptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key on the global scope.
    #[must_use]
    pub fn set_global<K: OptionKey>(mut self, value: K::Value) -> Self {
        self.global.set::<K>(value);
        self
    }

    /// Set a key on one entity's scope.
    #[must_use]
    pub fn set_entity<K: OptionKey>(mut self, table: impl Into<String>, value: K::Value) -> Self {
        self.entities.entry(table.into()).or_default().set::<K>(value);
        self
    }

    /// Set a key on one property's scope.
    #[must_use]
    pub fn set_property<K: OptionKey>(
        mut self,
        table: impl Into<String>,
        column: impl Into<String>,
        value: K::Value,
    ) -> Self {
        self.properties
            .entry((table.into(), column.into()))
            .or_default()
            .set::<K>(value);
        self
    }

    /// Freeze into an immutable registry.
    #[must_use]
    pub fn freeze(self) -> OptionsRegistry {
        OptionsRegistry {
            global: self.global,
            entities: self.entities,
            properties: self.properties,
        }
    }
}

///
/// OptionsRegistry
///
/// Immutable option store resolved against at runtime. Exactly one value
/// is effective per key and element; precedence is property, then entity,
/// then global, then the key's store default.
///

#[derive(Debug, Default)]
pub struct OptionsRegistry {
    global: OptionsContainer,
    entities: BTreeMap<String, OptionsContainer>,
    properties: BTreeMap<(String, String), OptionsContainer>,
}

impl OptionsRegistry {
    #[must_use]
    pub fn get_global<K: OptionKey>(&self) -> Option<K::Value> {
        self.global.get::<K>()
    }

    /// Value configured directly on the entity scope, no fallback.
    #[must_use]
    pub fn get_entity<K: OptionKey>(&self, table: &str) -> Option<K::Value> {
        self.entities.get(table).and_then(OptionsContainer::get::<K>)
    }

    /// Value configured directly on the property scope, no fallback.
    #[must_use]
    pub fn get_property<K: OptionKey>(&self, table: &str, column: &str) -> Option<K::Value> {
        self.properties
            .get(&(table.to_string(), column.to_string()))
            .and_then(OptionsContainer::get::<K>)
    }

    /// Effective value for an entity: entity scope, then global, then the
    /// key's store default.
    #[must_use]
    pub fn resolve_entity<K: OptionKey>(&self, table: &str) -> Option<K::Value> {
        self.get_entity::<K>(table)
            .or_else(|| self.get_global::<K>())
            .or_else(K::default_value)
    }

    /// Effective value for a property: property scope, then entity scope,
    /// then global, then the key's store default.
    #[must_use]
    pub fn resolve_property<K: OptionKey>(&self, table: &str, column: &str) -> Option<K::Value> {
        self.get_property::<K>(table, column)
            .or_else(|| self.resolve_entity::<K>(table))
    }
}

///
/// TESTS
///
