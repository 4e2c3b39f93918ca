#![forbid(unsafe_code)]

//! Launch payload boundary.
//!
//! [`DataOutput`] is the write side and [`DataInput`] the read side of the
//! only channel that carries data into and out of an activity: launch input,
//! response output, and saved state all use it. Between the two sits
//! [`Payload`], an opaque byte string that can cross threads, be stored, or
//! be persisted.
//!
//! # Encoding
//!
//! Payloads are JSON. Binary blobs are base64-encoded so the encoding stays
//! text-safe. Decoding a payload that is not a valid encoding is
//! [`Error::Corruption`]; an empty payload decodes to an empty input.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod blob {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

/// One payload value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Nested key-value structure.
    Item(BTreeMap<String, Value>),
    List(Vec<Value>),
    /// Raw bytes, including caller-serialized values.
    Blob(#[serde(with = "blob")] Vec<u8>),
}

impl Value {
    fn check(&self) -> Result<()> {
        match self {
            Value::Float(f) if !f.is_finite() => {
                Err(Error::invalid(format!("non-finite float {f}")))
            }
            Value::Item(map) => map.iter().try_for_each(|(k, v)| {
                check_key(k)?;
                v.check()
            }),
            Value::List(items) => items.iter().try_for_each(Value::check),
            _ => Ok(()),
        }
    }
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::invalid("payload key must not be empty"));
    }
    Ok(())
}

/// Opaque encoded payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload(#[serde(with = "blob")] Vec<u8>);

impl Payload {
    /// The empty payload.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap bytes received from elsewhere; validity is checked on decode.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode into a reader.
    pub fn decode(&self) -> Result<DataInput> {
        if self.0.is_empty() {
            return Ok(DataInput::default());
        }
        let entries: BTreeMap<String, Value> = serde_json::from_slice(&self.0)
            .map_err(|e| Error::corrupt(format!("malformed payload: {e}")))?;
        Ok(DataInput { entries })
    }
}

/// Write side of the payload boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataOutput {
    entries: BTreeMap<String, Value>,
}

impl DataOutput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store any value, validating key and contents first.
    pub fn put(&mut self, key: impl Into<String>, value: Value) -> Result<&mut Self> {
        let key = key.into();
        check_key(&key)?;
        value.check()?;
        self.entries.insert(key, value);
        Ok(self)
    }

    pub fn put_bool(&mut self, key: impl Into<String>, value: bool) -> Result<&mut Self> {
        self.put(key, Value::Bool(value))
    }

    pub fn put_int(&mut self, key: impl Into<String>, value: i64) -> Result<&mut Self> {
        self.put(key, Value::Int(value))
    }

    pub fn put_float(&mut self, key: impl Into<String>, value: f64) -> Result<&mut Self> {
        self.put(key, Value::Float(value))
    }

    pub fn put_str(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<&mut Self> {
        self.put(key, Value::Str(value.into()))
    }

    /// Store a nested structure built with another writer.
    pub fn put_item(&mut self, key: impl Into<String>, item: DataOutput) -> Result<&mut Self> {
        self.put(key, Value::Item(item.entries))
    }

    pub fn put_list(&mut self, key: impl Into<String>, items: Vec<Value>) -> Result<&mut Self> {
        self.put(key, Value::List(items))
    }

    pub fn put_blob(&mut self, key: impl Into<String>, bytes: Vec<u8>) -> Result<&mut Self> {
        self.put(key, Value::Blob(bytes))
    }

    /// Store a caller-defined value as a serialized blob.
    pub fn put_serialized<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<&mut Self> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| Error::invalid(format!("value not serializable: {e}")))?;
        self.put(key, Value::Blob(bytes))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode into an opaque payload.
    pub fn finish(&self) -> Payload {
        if self.entries.is_empty() {
            return Payload::empty();
        }
        // Keys are strings and floats are finite, so encoding cannot fail.
        Payload(serde_json::to_vec(&self.entries).unwrap_or_default())
    }

    /// Read back without an encode/decode pass.
    pub fn into_input(self) -> DataInput {
        DataInput {
            entries: self.entries,
        }
    }
}

/// Read side of the payload boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataInput {
    entries: BTreeMap<String, Value>,
}

impl DataInput {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats, widening integers.
    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_item(&self, key: &str) -> Option<DataInput> {
        match self.get(key)? {
            Value::Item(map) => Some(DataInput {
                entries: map.clone(),
            }),
            _ => None,
        }
    }

    pub fn get_list(&self, key: &str) -> Option<&[Value]> {
        match self.get(key)? {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Strings of a list value, skipping non-string elements.
    pub fn get_str_list(&self, key: &str) -> Option<Vec<String>> {
        let items = self.get_list(key)?;
        Some(
            items
                .iter()
                .filter_map(|v| match v {
                    Value::Str(s) => Some(s.clone()),
                    _ => None,
                })
                .collect(),
        )
    }

    pub fn get_blob(&self, key: &str) -> Option<&[u8]> {
        match self.get(key)? {
            Value::Blob(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Decode a blob written with [`DataOutput::put_serialized`].
    ///
    /// Missing keys yield `Ok(None)`; undecodable blobs are corruption.
    pub fn get_serialized<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(bytes) = self.get_blob(key) else {
            return Ok(None);
        };
        serde_json::from_slice(bytes)
            .map(Some)
            .map_err(|e| Error::corrupt(format!("blob {key:?} undecodable: {e}")))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
