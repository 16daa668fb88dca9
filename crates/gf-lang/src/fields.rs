use indexmap::IndexMap;

use crate::value::Value;

/// An ordered bag of `(name, value)` pairs on an object.
///
/// Names are distinct; lookup of a missing name returns [`Value::Null`].
/// Iteration order is insertion order; `indexmap` is used wherever
/// deterministic, non-alphabetical field order must be observable to a
/// caller (here: JSON header emission order).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldList {
    inner: IndexMap<String, Value>,
}

impl FieldList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.inner.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Value {
        self.inner.get(name).cloned().unwrap_or(Value::Null)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(|k| k.as_str())
    }
}

impl FromIterator<(String, Value)> for FieldList {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_resolves_to_null() {
        let fields = FieldList::new();
        assert_eq!(fields.get("speed"), Value::Null);
    }

    #[test]
    fn preserves_insertion_order() {
        let mut fields = FieldList::new();
        fields.set("b", Value::Number(1.0));
        fields.set("a", Value::Number(2.0));
        let names: Vec<_> = fields.names().collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
