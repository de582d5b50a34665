//! Parsed per-file state: the flat parameter set and per-task sample streams.

use crate::decode::Value;

/// Flat `Args.<name>` parameter set.
///
/// Insertion order is preserved for listing; a repeated name overwrites the
/// previous value in place (last occurrence wins).
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    entries: Vec<(String, Value)>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// `get_i64` with a fallback for absent parameters.
    pub fn get_i64_or(&self, name: &str, default: i64) -> i64 {
        self.get_i64(name).unwrap_or(default)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ordered sample records of one task, as decoded JSON payloads.
pub type TaskStream = Vec<serde_json::Value>;

/// All task streams of one file, in first-appearance order.
#[derive(Debug, Clone, Default)]
pub struct TaskStreams {
    tasks: Vec<(String, TaskStream)>,
}

impl TaskStreams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_record(&mut self, task: &str, record: serde_json::Value) {
        match self.tasks.iter_mut().find(|(name, _)| name == task) {
            Some((_, stream)) => stream.push(record),
            None => self.tasks.push((task.to_string(), vec![record])),
        }
    }

    pub fn get(&self, task: &str) -> Option<&TaskStream> {
        self.tasks
            .iter()
            .find(|(name, _)| name == task)
            .map(|(_, stream)| stream)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaskStream)> {
        self.tasks.iter().map(|(name, stream)| (name.as_str(), stream))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Drop record 0 of every stream (a partial measurement interval), then
    /// drop streams left empty.
    pub fn discard_first_records(&mut self) {
        for (_, stream) in &mut self.tasks {
            stream.remove(0);
        }
        self.tasks.retain(|(_, stream)| !stream.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Value;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn repeated_parameter_overwrites_in_place() {
        let mut params = ParameterSet::new();
        params.insert("a", Value::Int(1));
        params.insert("b", Value::Int(2));
        params.insert("a", Value::Int(3));
        assert_eq!(params.get_i64("a"), Some(3));
        let names: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn first_record_discard_drops_single_sample_streams() {
        let mut tasks = TaskStreams::new();
        for t in 0..3 {
            tasks.push_record("steady", json!({"time": t}));
        }
        tasks.push_record("lone", json!({"time": 0}));
        tasks.discard_first_records();

        assert_eq!(tasks.get("steady").map(Vec::len), Some(2));
        assert_eq!(tasks.get("lone"), None);
    }
}
