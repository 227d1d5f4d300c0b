use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Reserved node id holding run inputs (`sys.<name>`).
pub const SYS_NODE_ID: &str = "sys";

/// Variable address: `(node_id, variable[, subpath...])`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selector {
    node_id: String,
    variable: String,
    path: Vec<String>,
}

impl Selector {
    pub fn new(node_id: impl Into<String>, variable: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            variable: variable.into(),
            path: Vec::new(),
        }
    }

    /// Extend the selector with one more subpath segment.
    pub fn with_path(mut self, segment: impl Into<String>) -> Self {
        self.path.push(segment.into());
        self
    }

    pub fn sys(variable: impl Into<String>) -> Self {
        Self::new(SYS_NODE_ID, variable)
    }

    pub fn parse_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(arr) => {
                let mut parts = Vec::with_capacity(arr.len());
                for v in arr {
                    let s = v.as_str()?;
                    if !s.is_empty() {
                        parts.push(s.to_string());
                    }
                }
                Self::from_parts(parts)
            }
            Value::String(s) => Self::parse_str(s),
            _ => None,
        }
    }

    pub fn parse_str(selector: &str) -> Option<Self> {
        let parts: Vec<String> = selector
            .split('.')
            .filter(|p| !p.is_empty())
            .map(|p| p.to_string())
            .collect();
        Self::from_parts(parts)
    }

    fn from_parts(parts: Vec<String>) -> Option<Self> {
        let mut iter = parts.into_iter();
        let node_id = iter.next()?;
        let variable = iter.next()?;
        Some(Self {
            node_id,
            variable,
            path: iter.collect(),
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn parts(&self) -> Vec<String> {
        let mut parts = Vec::with_capacity(2 + self.path.len());
        parts.push(self.node_id.clone());
        parts.push(self.variable.clone());
        parts.extend(self.path.iter().cloned());
        parts
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node_id, self.variable)?;
        for seg in &self.path {
            write!(f, ".{}", seg)?;
        }
        Ok(())
    }
}

impl Serialize for Selector {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.parts().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SelectorVisitor;

        impl<'de> serde::de::Visitor<'de> for SelectorVisitor {
            type Value = Selector;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("selector string like 'node.var.path' or string array")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Selector::parse_str(v).ok_or_else(|| E::custom("invalid selector string"))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let mut parts = Vec::new();
                while let Some(value) = seq.next_element::<String>()? {
                    if !value.is_empty() {
                        parts.push(value);
                    }
                }
                Selector::from_parts(parts)
                    .ok_or_else(|| serde::de::Error::custom("invalid selector array"))
            }
        }

        deserializer.deserialize_any(SelectorVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_str_with_subpath() {
        let sel = Selector::parse_str("llm.usage.tokens.total").unwrap();
        assert_eq!(sel.node_id(), "llm");
        assert_eq!(sel.variable(), "usage");
        assert_eq!(sel.path(), &["tokens".to_string(), "total".to_string()]);
        assert_eq!(sel.to_string(), "llm.usage.tokens.total");
    }

    #[test]
    fn test_single_part_rejected() {
        assert!(Selector::parse_str("only").is_none());
        assert!(Selector::parse_value(&serde_json::json!(["a"])).is_none());
        assert!(Selector::parse_value(&serde_json::json!(["a", 1])).is_none());
    }

    #[test]
    fn test_serde_as_array() {
        let sel = Selector::new("a", "x").with_path("k");
        let json = serde_json::to_value(&sel).unwrap();
        assert_eq!(json, serde_json::json!(["a", "x", "k"]));
        let back: Selector = serde_json::from_value(json).unwrap();
        assert_eq!(back, sel);
        let from_str: Selector = serde_json::from_value(serde_json::json!("a.x.k")).unwrap();
        assert_eq!(from_str, sel);
    }
}
