use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::ops::Deref;
use std::sync::Arc;

use crate::domain::model::Selector;
use crate::domain::Segment;

// ================================
// VariablePool
// Key: node_id → variable → Segment, subpaths resolved inside the segment
// ================================

/// Keyed store of typed values flowing between nodes.
///
/// Owned and mutated only by the decision loop. Writes are last-write-wins per
/// selector path, and every write bumps `version`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariablePool {
    variables: BTreeMap<String, BTreeMap<String, Segment>>,
    #[serde(default)]
    version: u64,
}

impl VariablePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool seeded with run inputs under the `sys` scope.
    pub fn with_inputs(inputs: &HashMap<String, Value>) -> Self {
        let mut pool = Self::new();
        for (name, value) in inputs {
            pool.set(&Selector::sys(name.clone()), Segment::from_value(value));
        }
        pool
    }

    /// Number of stored top-level variables.
    pub fn len(&self) -> usize {
        self.variables.values().map(|vars| vars.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Get variable by selector; `Segment::None` when absent.
    pub fn get(&self, selector: &Selector) -> Segment {
        self.variables
            .get(selector.node_id())
            .and_then(|vars| vars.get(selector.variable()))
            .and_then(|seg| seg.lookup(selector.path()))
            .unwrap_or(Segment::None)
    }

    pub fn get_value(&self, selector: &Selector) -> Value {
        self.get(selector).to_value()
    }

    /// Check if variable exists and is not None
    pub fn has(&self, selector: &Selector) -> bool {
        !self.get(selector).is_none()
    }

    /// Set a single variable. Subpath writes create intermediate objects and
    /// replace non-object values on the way.
    pub fn set(&mut self, selector: &Selector, value: Segment) {
        let slot = self
            .variables
            .entry(selector.node_id().to_string())
            .or_default()
            .entry(selector.variable().to_string())
            .or_insert(Segment::None);
        write_path(slot, selector.path(), value);
        self.version += 1;
    }

    /// Set node outputs as (node_id, key) -> value
    pub fn set_node_outputs(&mut self, node_id: &str, outputs: &HashMap<String, Value>) {
        for (key, val) in outputs {
            self.set(&Selector::new(node_id, key.clone()), Segment::from_value(val));
        }
    }

    /// Get all variables for a given node_id
    pub fn node_variables(&self, node_id: &str) -> HashMap<String, Segment> {
        self.variables
            .get(node_id)
            .map(|vars| vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    /// Remove all variables for a given node
    pub fn remove_node(&mut self, node_id: &str) {
        if self.variables.remove(node_id).is_some() {
            self.version += 1;
        }
    }

    /// Append value to an array variable, promoting scalars to arrays.
    pub fn append(&mut self, selector: &Selector, value: Segment) {
        let next = match self.get(selector) {
            Segment::None => Segment::Array(vec![value]),
            Segment::Array(mut items) => {
                items.push(value);
                Segment::Array(items)
            }
            Segment::String(mut s) => {
                s.push_str(&value.to_display_string());
                Segment::String(s)
            }
            other => Segment::Array(vec![other, value]),
        };
        self.set(selector, next);
    }

    /// Serialize the whole pool, type tags included.
    pub fn snapshot(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Rebuild a pool from [`VariablePool::snapshot`] output.
    pub fn restore(snapshot: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(snapshot)
    }
}

fn write_path(slot: &mut Segment, path: &[String], value: Segment) {
    let Some((head, rest)) = path.split_first() else {
        *slot = value;
        return;
    };
    if let Segment::Array(items) = slot {
        if let Some(item) = head.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
            write_path(item, rest, value);
            return;
        }
    }
    if !matches!(slot, Segment::Object(_)) {
        *slot = Segment::Object(HashMap::new());
    }
    if let Segment::Object(map) = slot {
        let child = map.entry(head.clone()).or_insert(Segment::None);
        write_path(child, rest, value);
    }
}

/// Read-only snapshot handed to workers.
///
/// Cloning is cheap; the decision loop keeps writing to its own copy
/// (`Arc::make_mut`) without affecting views already handed out.
#[derive(Debug, Clone, Default)]
pub struct PoolView(Arc<VariablePool>);

impl PoolView {
    pub fn new(pool: Arc<VariablePool>) -> Self {
        Self(pool)
    }
}

impl Deref for PoolView {
    type Target = VariablePool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<VariablePool> for PoolView {
    fn from(pool: VariablePool) -> Self {
        Self(Arc::new(pool))
    }
}
