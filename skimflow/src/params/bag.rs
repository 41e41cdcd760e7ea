//! Ordered parameter bag.

use super::{ParameterError, ParameterValue, Scalar};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A named mapping from key to [`ParameterValue`] attached to one stage.
///
/// Keys are unique. Lookups do not depend on insertion order, but iteration
/// and diagnostics follow it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterBag {
    entries: Vec<(String, ParameterValue)>,
}

impl ParameterBag {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, overwriting any existing value for `key` in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ParameterValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder-style [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Gets a value.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if the key is absent.
    pub fn get(&self, key: &str) -> Result<&ParameterValue, ParameterError> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
            .ok_or_else(|| ParameterError::key_not_found(key))
    }

    /// Gets a number.
    pub fn number(&self, key: &str) -> Result<f64, ParameterError> {
        match self.get(key)? {
            ParameterValue::Number(n) => Ok(*n),
            other => Err(mismatch(key, "number", other)),
        }
    }

    /// Gets an integral number.
    ///
    /// Fails with `InvalidValue` if the stored number has a fractional part.
    pub fn integer(&self, key: &str) -> Result<i64, ParameterError> {
        let n = self.number(key)?;
        if n.fract() != 0.0 || !n.is_finite() {
            return Err(ParameterError::invalid(key, format!("{n} is not an integer")));
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(n as i64)
    }

    /// Gets a string.
    pub fn text(&self, key: &str) -> Result<&str, ParameterError> {
        match self.get(key)? {
            ParameterValue::Text(s) => Ok(s),
            other => Err(mismatch(key, "string", other)),
        }
    }

    /// Gets a list.
    pub fn list(&self, key: &str) -> Result<&[Scalar], ParameterError> {
        match self.get(key)? {
            ParameterValue::List(items) => Ok(items),
            other => Err(mismatch(key, "list", other)),
        }
    }

    /// Gets an optional string, failing only on a kind mismatch.
    pub fn text_or(&self, key: &str, default: &str) -> Result<String, ParameterError> {
        match self.text(key) {
            Ok(s) => Ok(s.to_string()),
            Err(ParameterError::KeyNotFound { .. }) => Ok(default.to_string()),
            Err(e) => Err(e),
        }
    }

    /// Gets an optional string.
    pub fn optional_text(&self, key: &str) -> Result<Option<String>, ParameterError> {
        match self.text(key) {
            Ok(s) => Ok(Some(s.to_string())),
            Err(ParameterError::KeyNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns all keys in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }
}

fn mismatch(key: &str, expected: &'static str, found: &ParameterValue) -> ParameterError {
    ParameterError::TypeMismatch {
        key: key.to_string(),
        expected,
        found: found.kind(),
    }
}

impl fmt::Display for ParameterBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k} = {v}")?;
        }
        write!(f, "}}")
    }
}

impl<K: Into<String>, V: Into<ParameterValue>> FromIterator<(K, V)> for ParameterBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bag = Self::new();
        for (k, v) in iter {
            bag.set(k, v);
        }
        bag
    }
}

impl Serialize for ParameterBag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ParameterBag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BagVisitor;

        impl<'de> Visitor<'de> for BagVisitor {
            type Value = ParameterBag;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of parameter names to numbers, strings or lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut bag = ParameterBag::new();
                while let Some((key, value)) = access.next_entry::<String, ParameterValue>()? {
                    if bag.contains(&key) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate parameter '{key}'"
                        )));
                    }
                    bag.entries.push((key, value));
                }
                Ok(bag)
            }
        }

        deserializer.deserialize_map(BagVisitor)
    }
}
