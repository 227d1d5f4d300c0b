use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_mime_type() -> String {
    "application/octet-stream".to_string()
}

/// Serializable file reference used by File-type variables.
///
/// Only metadata crosses the suspension boundary; the bytes live in external storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSegment {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

impl Default for FileSegment {
    fn default() -> Self {
        Self {
            name: String::new(),
            size: 0,
            mime_type: default_mime_type(),
            id: None,
            url: None,
            extension: None,
        }
    }
}

impl FileSegment {
    pub fn from_url(url: String, name: String, mime_type: String, size: u64) -> Self {
        let extension = name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase());
        Self {
            name,
            size,
            mime_type,
            id: None,
            url: Some(url),
            extension,
        }
    }

    /// Attribute lookup used by subpath selectors (`file.name`, `file.size`, ...).
    pub fn attribute(&self, key: &str) -> Option<Segment> {
        match key {
            "name" => Some(Segment::String(self.name.clone())),
            "size" => Some(Segment::Integer(self.size as i64)),
            "mime_type" => Some(Segment::String(self.mime_type.clone())),
            "id" => self.id.clone().map(Segment::String),
            "url" => self.url.clone().map(Segment::String),
            "extension" => self.extension.clone().map(Segment::String),
            _ => None,
        }
    }
}

/// A typed value stored in the variable pool.
///
/// Serialized with an explicit type tag so integers, floats, and files survive a
/// snapshot/restore cycle unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Segment {
    #[default]
    None,
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Object(HashMap<String, Segment>),
    Array(Vec<Segment>),
    File(Box<FileSegment>),
}

impl Segment {
    /// Convert Segment → serde_json::Value (type tags are dropped).
    pub fn to_value(&self) -> Value {
        match self {
            Segment::None => Value::Null,
            Segment::String(s) => Value::String(s.clone()),
            Segment::Integer(i) => serde_json::json!(*i),
            Segment::Float(f) => serde_json::json!(*f),
            Segment::Boolean(b) => Value::Bool(*b),
            Segment::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
            Segment::Array(items) => Value::Array(items.iter().map(Segment::to_value).collect()),
            Segment::File(file) => serde_json::to_value(file.as_ref()).unwrap_or(Value::Null),
        }
    }

    /// Create Segment from serde_json::Value
    pub fn from_value(v: &Value) -> Self {
        match v {
            Value::Null => Segment::None,
            Value::Bool(b) => Segment::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Segment::Integer(i),
                None => Segment::Float(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => Segment::String(s.clone()),
            Value::Array(arr) => Segment::Array(arr.iter().map(Segment::from_value).collect()),
            Value::Object(map) => Segment::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Segment::from_value(v)))
                    .collect(),
            ),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Segment::None)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Segment::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Segment::Integer(i) => Some(*i),
            Segment::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    /// Try to extract a `f64` (integers, floats, or parseable strings).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Segment::Integer(i) => Some(*i as f64),
            Segment::Float(f) => Some(*f),
            Segment::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Segment::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Segment>> {
        match self {
            Segment::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HashMap<String, Segment>> {
        match self {
            Segment::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Walk a subpath: object keys, array indices, or file attributes.
    pub fn lookup(&self, path: &[String]) -> Option<Segment> {
        let Some((head, rest)) = path.split_first() else {
            return Some(self.clone());
        };
        match self {
            Segment::Object(map) => map.get(head)?.lookup(rest),
            Segment::Array(items) => {
                let idx: usize = head.parse().ok()?;
                items.get(idx)?.lookup(rest)
            }
            Segment::File(file) => file.attribute(head)?.lookup(rest),
            _ => None,
        }
    }

    /// Human-readable form used by string comparisons.
    pub fn to_display_string(&self) -> String {
        match self {
            Segment::None => String::new(),
            Segment::String(s) => s.clone(),
            Segment::Integer(i) => i.to_string(),
            Segment::Float(f) => f.to_string(),
            Segment::Boolean(b) => b.to_string(),
            other => serde_json::to_string(&other.to_value()).unwrap_or_default(),
        }
    }

    /// Return `true` if this segment is empty (null, empty string, empty collection).
    pub fn is_empty(&self) -> bool {
        match self {
            Segment::None => true,
            Segment::String(s) => s.is_empty(),
            Segment::Array(v) => v.is_empty(),
            Segment::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Segment::None => "none",
            Segment::String(_) => "string",
            Segment::Integer(_) => "integer",
            Segment::Float(_) => "float",
            Segment::Boolean(_) => "boolean",
            Segment::Object(_) => "object",
            Segment::Array(_) => "array",
            Segment::File(_) => "file",
        }
    }
}

impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Segment::None, Segment::None) => true,
            (Segment::String(a), Segment::String(b)) => a == b,
            (Segment::Integer(a), Segment::Integer(b)) => a == b,
            (Segment::Float(a), Segment::Float(b)) => (a - b).abs() < 1e-10,
            (Segment::Boolean(a), Segment::Boolean(b)) => a == b,
            (Segment::Object(a), Segment::Object(b)) => a == b,
            (Segment::Array(a), Segment::Array(b)) => a == b,
            (Segment::File(a), Segment::File(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Value> for Segment {
    fn from(value: Value) -> Self {
        Segment::from_value(&value)
    }
}

impl From<&str> for Segment {
    fn from(value: &str) -> Self {
        Segment::String(value.to_string())
    }
}

impl From<i64> for Segment {
    fn from(value: i64) -> Self {
        Segment::Integer(value)
    }
}

impl From<f64> for Segment {
    fn from(value: f64) -> Self {
        Segment::Float(value)
    }
}

impl From<bool> for Segment {
    fn from(value: bool) -> Self {
        Segment::Boolean(value)
    }
}
