//! JSON encoding of records.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

pub fn encode<T: Serialize>(record: &T) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(record)?))
}

pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(data)?)
}
