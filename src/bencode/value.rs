//! Bencode value type

use std::collections::BTreeMap;

/// A decoded bencode value.
///
/// Dictionaries are kept in a `BTreeMap` keyed by raw bytes, so iteration (and
/// therefore encoding) always follows byte-lexicographic key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BencodeValue {
    Integer(i64),
    Bytes(Vec<u8>),
    List(Vec<BencodeValue>),
    Dict(BTreeMap<Vec<u8>, BencodeValue>),
}

impl BencodeValue {
    /// Build a byte string value from anything byte-like
    pub fn bytes(value: impl AsRef<[u8]>) -> Self {
        BencodeValue::Bytes(value.as_ref().to_vec())
    }

    /// Build a dictionary from `(key, value)` pairs in any order
    pub fn dict<K, I>(entries: I) -> Self
    where
        K: AsRef<[u8]>,
        I: IntoIterator<Item = (K, BencodeValue)>,
    {
        BencodeValue::Dict(
            entries
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_vec(), v))
                .collect(),
        )
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            BencodeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BencodeValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Byte string as UTF-8 text, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_list(&self) -> Option<&[BencodeValue]> {
        match self {
            BencodeValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, BencodeValue>> {
        match self {
            BencodeValue::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Look up a key when this value is a dictionary
    pub fn get(&self, key: &[u8]) -> Option<&BencodeValue> {
        self.as_dict().and_then(|d| d.get(key))
    }

    /// Short name of the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            BencodeValue::Integer(_) => "integer",
            BencodeValue::Bytes(_) => "byte string",
            BencodeValue::List(_) => "list",
            BencodeValue::Dict(_) => "dictionary",
        }
    }

    /// Render as JSON. Byte strings become text (invalid UTF-8 is replaced).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            BencodeValue::Integer(i) => serde_json::Value::from(*i),
            BencodeValue::Bytes(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
            BencodeValue::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            BencodeValue::Dict(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (String::from_utf8_lossy(k).into_owned(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<i64> for BencodeValue {
    fn from(value: i64) -> Self {
        BencodeValue::Integer(value)
    }
}

impl From<&str> for BencodeValue {
    fn from(value: &str) -> Self {
        BencodeValue::Bytes(value.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for BencodeValue {
    fn from(value: Vec<u8>) -> Self {
        BencodeValue::Bytes(value)
    }
}

impl From<Vec<BencodeValue>> for BencodeValue {
    fn from(value: Vec<BencodeValue>) -> Self {
        BencodeValue::List(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let value = BencodeValue::dict([("name", BencodeValue::from("file.txt")), ("size", BencodeValue::Integer(42))]);
        assert_eq!(value.get(b"name").and_then(|v| v.as_str()), Some("file.txt"));
        assert_eq!(value.get(b"size").and_then(|v| v.as_int()), Some(42));
        assert!(value.get(b"missing").is_none());
        assert!(value.as_list().is_none());
        assert_eq!(value.type_name(), "dictionary");
    }

    #[test]
    fn test_to_json() {
        let value = BencodeValue::dict([
            ("foo", BencodeValue::from("bar")),
            ("list", vec![BencodeValue::Integer(1), BencodeValue::Integer(-2)].into()),
        ]);
        assert_eq!(value.to_json(), serde_json::json!({"foo": "bar", "list": [1, -2]}));
    }

    #[test]
    fn test_to_json_non_utf8_bytes() {
        let value = BencodeValue::Bytes(vec![0xff, b'a']);
        assert_eq!(value.to_json(), serde_json::json!("\u{fffd}a"));
    }
}
