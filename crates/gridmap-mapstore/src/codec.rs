use gridmap_core::{
    error::StoreError,
    model::{EntityKey, Value},
};
use serde_cbor::{from_slice, to_vec};
use std::{
    collections::BTreeMap,
    panic::{AssertUnwindSafe, catch_unwind},
};

/// Max serialized bytes for a single record to keep value loads bounded.
pub const MAX_RECORD_BYTES: usize = 4 * 1024 * 1024;

///
/// RawRecord
///
/// One entity row as the store keeps it: opaque CBOR bytes, bounded at
/// construction so nothing oversized ever lands in the map.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawRecord(Vec<u8>);

impl RawRecord {
    pub fn try_new(bytes: Vec<u8>) -> Result<Self, StoreError> {
        if bytes.len() > MAX_RECORD_BYTES {
            return Err(StoreError::RecordTooLarge {
                len: bytes.len(),
                limit: MAX_RECORD_BYTES,
            });
        }

        Ok(Self(bytes))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Serialize a row into CBOR bytes.
pub(crate) fn encode_row(row: &BTreeMap<String, Value>) -> Result<RawRecord, StoreError> {
    let bytes = to_vec(row).map_err(|err| StoreError::codec(err.to_string()))?;
    RawRecord::try_new(bytes)
}

/// Deserialize a stored record back into a row.
///
/// Input size is bounded at record construction, and any panic during
/// decode is caught and reported; no panic escapes this function.
pub(crate) fn decode_row(
    record: &RawRecord,
    key: &EntityKey,
) -> Result<BTreeMap<String, Value>, StoreError> {
    let result = catch_unwind(AssertUnwindSafe(|| from_slice(record.as_bytes())));

    match result {
        Ok(Ok(row)) => Ok(row),
        Ok(Err(err)) => Err(corrupt(key, err.to_string())),
        Err(_) => Err(corrupt(key, "panic during CBOR deserialization")),
    }
}

fn corrupt(key: &EntityKey, message: impl Into<String>) -> StoreError {
    StoreError::CorruptRecord {
        table: key.table().to_string(),
        key: key.values_display(),
        message: message.into(),
    }
}

///
/// TESTS
///
