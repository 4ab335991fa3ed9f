use crate::model::IdSourceKey;
use std::fmt;

///
/// NextValueRequest
///
/// One request for the next value of an id source. The dialect owning the
/// source must initialize an absent counter to `initial_value` (returning
/// it as the first value) and afterwards advance by `increment` per
/// request. Increments larger than one let engines hand out id blocks
/// without a round trip per id.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NextValueRequest {
    key: IdSourceKey,
    increment: u32,
    initial_value: i64,
}

impl NextValueRequest {
    #[must_use]
    pub const fn new(key: IdSourceKey, increment: u32, initial_value: i64) -> Self {
        Self {
            key,
            increment,
            initial_value,
        }
    }

    #[must_use]
    pub const fn key(&self) -> &IdSourceKey {
        &self.key
    }

    #[must_use]
    pub const fn increment(&self) -> u32 {
        self.increment
    }

    #[must_use]
    pub const fn initial_value(&self) -> i64 {
        self.initial_value
    }
}

impl fmt::Display for NextValueRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (+{}, initial {})",
            self.key, self.increment, self.initial_value
        )
    }
}
