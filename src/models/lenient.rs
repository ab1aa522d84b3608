//! Tolerant decoding of backend output.
//!
//! Reasoning backends are loose about key names ("title" vs "text"),
//! sometimes send several spellings at once, and are loose about scalar
//! types ("baseline": 70 vs "baseline": "70%", "hours": "4"). Input types
//! decode through [`Fields`], which looks each field up under a list of
//! keys in preference order and ignores the rest.

use serde::de::{DeserializeOwned, Error};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// A backend object with keyed lookups in preference order.
pub struct Fields(Map<String, Value>);

impl Fields {
    pub fn from_deserializer<'de, D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Map::deserialize(deserializer).map(Self)
    }

    /// The first key present with a non-null value.
    fn first(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .filter_map(|key| self.0.get(*key))
            .find(|value| !value.is_null())
    }

    pub fn string(&self, keys: &[&str]) -> Option<String> {
        self.first(keys).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Like [`string`](Self::string), empty when absent.
    pub fn text(&self, keys: &[&str]) -> String {
        self.string(keys).unwrap_or_default()
    }

    /// A number, or a numeric string with an optional hour suffix.
    pub fn number<E: Error>(&self, keys: &[&str]) -> Result<Option<f64>, E> {
        match self.first(keys) {
            None => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(Value::String(s)) => {
                let trimmed = s.trim().trim_end_matches(['h', 'H']).trim();
                trimmed
                    .parse::<f64>()
                    .map(Some)
                    .map_err(|_| E::custom(format!("expected a number, got {:?}", s)))
            }
            Some(other) => Err(E::custom(format!("expected a number, got {}", other))),
        }
    }

    /// A list of strings. A single string becomes a one-element list.
    pub fn list(&self, keys: &[&str]) -> Vec<String> {
        match self.first(keys) {
            None => Vec::new(),
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect(),
            Some(other) => vec![other.to_string()],
        }
    }

    /// A list of nested objects, empty when absent.
    pub fn items<T: DeserializeOwned, E: Error>(&self, keys: &[&str]) -> Result<Vec<T>, E> {
        match self.first(keys) {
            None => Ok(Vec::new()),
            Some(value) => Vec::<T>::deserialize(value).map_err(E::custom),
        }
    }
}
