use crate::error::{ErrorClass, ErrorOrigin, StoreError};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, time::Duration};
use thiserror::Error as ThisError;

///
/// Settings
///
/// Property keys understood by the core. Store modules document their own
/// keys next to their provider types.
///

pub mod settings {
    /// Store module selector, e.g. "map".
    pub const DATASTORE: &str = "gridmap.datastore";

    /// Default wait for pessimistic lock acquisition, in milliseconds.
    /// Default: 5000.
    pub const LOCK_TIMEOUT_MS: &str = "gridmap.lock_timeout_ms";

    /// Enables the failed-operation handler protocol for flush cycles.
    /// Default: true.
    pub const ERROR_HANDLER: &str = "gridmap.error_handler";

    /// Default for [`LOCK_TIMEOUT_MS`].
    pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;
}

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("missing required property '{key}'")]
    MissingProperty { key: String },

    #[error("property '{key}' expects {expected}, found {found}")]
    InvalidValue {
        key: String,
        expected: &'static str,
        found: String,
    },
}

impl ConfigError {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        ErrorClass::InvariantViolation
    }

    #[must_use]
    pub const fn origin(&self) -> ErrorOrigin {
        ErrorOrigin::Config
    }
}

impl From<ConfigError> for StoreError {
    fn from(err: ConfigError) -> Self {
        Self::invariant(err.origin(), err.to_string())
    }
}

///
/// PropertyValue
///
/// One boot property. Integrators usually hand these in as text; typed
/// variants are accepted from serde sources such as JSON fixtures.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

///
/// Properties
///
/// The string-keyed boot property map handed to a session factory.
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Properties {
    values: BTreeMap<String, PropertyValue>,
}

impl Properties {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.values.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Typed fluent access; see [`PropertyQuery`].
    #[must_use]
    pub fn property<T: FromProperty>(&self, key: &str) -> PropertyQuery<'_, T> {
        PropertyQuery {
            properties: self,
            key: key.to_string(),
            default: None,
        }
    }
}

impl From<BTreeMap<String, PropertyValue>> for Properties {
    fn from(values: BTreeMap<String, PropertyValue>) -> Self {
        Self { values }
    }
}

///
/// PropertyQuery
///
/// Fluent typed accessor for one property:
/// `properties.property::<u64>("gridmap.lock_timeout_ms").with_default(5000).get()?`.
///
/// `get` treats the property as required once no default is set;
/// `get_optional` never errors on absence.
///

pub struct PropertyQuery<'a, T: FromProperty> {
    properties: &'a Properties,
    key: String,
    default: Option<T>,
}

impl<T: FromProperty> PropertyQuery<'_, T> {
    #[must_use]
    pub fn with_default(mut self, value: T) -> Self {
        self.default = Some(value);
        self
    }

    /// Resolve to a value, falling back to the default. Errors when the
    /// property is absent without a default, or present but unparseable.
    pub fn get(self) -> Result<T, ConfigError> {
        let key = self.key.clone();
        match self.get_optional()? {
            Some(value) => Ok(value),
            None => Err(ConfigError::MissingProperty { key }),
        }
    }

    /// Resolve to a value or `None`; absence is not an error, an
    /// unparseable present value still is.
    pub fn get_optional(self) -> Result<Option<T>, ConfigError> {
        match self.properties.get(&self.key) {
            Some(value) => T::from_property(value)
                .map(Some)
                .map_err(|expected| ConfigError::InvalidValue {
                    key: self.key,
                    expected,
                    found: value.to_string(),
                }),
            None => Ok(self.default),
        }
    }
}

///
/// FromProperty
///
/// Conversion from a boot property into a typed setting. Text values are
/// parsed; typed values convert when the types line up.
///

pub trait FromProperty: Sized {
    /// Convert, or name the expected form for the error message.
    fn from_property(value: &PropertyValue) -> Result<Self, &'static str>;
}

impl FromProperty for String {
    fn from_property(value: &PropertyValue) -> Result<Self, &'static str> {
        Ok(value.to_string())
    }
}

impl FromProperty for bool {
    fn from_property(value: &PropertyValue) -> Result<Self, &'static str> {
        match value {
            PropertyValue::Bool(v) => Ok(*v),
            PropertyValue::Text(s) => s.parse().map_err(|_| "a boolean"),
            _ => Err("a boolean"),
        }
    }
}

impl FromProperty for i64 {
    fn from_property(value: &PropertyValue) -> Result<Self, &'static str> {
        match value {
            PropertyValue::Int(v) => Ok(*v),
            PropertyValue::Text(s) => s.parse().map_err(|_| "an integer"),
            _ => Err("an integer"),
        }
    }
}

impl FromProperty for u64 {
    fn from_property(value: &PropertyValue) -> Result<Self, &'static str> {
        match value {
            PropertyValue::Int(v) => u64::try_from(*v).map_err(|_| "a non-negative integer"),
            PropertyValue::Text(s) => s.parse().map_err(|_| "a non-negative integer"),
            _ => Err("a non-negative integer"),
        }
    }
}

impl FromProperty for u32 {
    fn from_property(value: &PropertyValue) -> Result<Self, &'static str> {
        match value {
            PropertyValue::Int(v) => u32::try_from(*v).map_err(|_| "a 32-bit unsigned integer"),
            PropertyValue::Text(s) => s.parse().map_err(|_| "a 32-bit unsigned integer"),
            _ => Err("a 32-bit unsigned integer"),
        }
    }
}

impl FromProperty for u16 {
    fn from_property(value: &PropertyValue) -> Result<Self, &'static str> {
        match value {
            PropertyValue::Int(v) => u16::try_from(*v).map_err(|_| "a 16-bit unsigned integer"),
            PropertyValue::Text(s) => s.parse().map_err(|_| "a 16-bit unsigned integer"),
            _ => Err("a 16-bit unsigned integer"),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
impl FromProperty for f64 {
    fn from_property(value: &PropertyValue) -> Result<Self, &'static str> {
        match value {
            PropertyValue::Float(v) => Ok(*v),
            PropertyValue::Int(v) => Ok(*v as Self),
            PropertyValue::Text(s) => s.parse().map_err(|_| "a number"),
            _ => Err("a number"),
        }
    }
}

/// Millisecond count properties read directly as durations.
impl FromProperty for Duration {
    fn from_property(value: &PropertyValue) -> Result<Self, &'static str> {
        u64::from_property(value)
            .map(Self::from_millis)
            .map_err(|_| "a millisecond count")
    }
}

///
/// TESTS
///
