//! Published snapshot of node values.

use std::fmt;
use std::ops::Index;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

/// Named values of every enabled node, in registration order.
///
/// Built fresh each scan tick from whatever the ledgers hold at that moment,
/// so a node still computing contributes its stale or null value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct State {
    properties: IndexMap<String, Option<Value>>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property, replacing any existing value.
    pub fn insert(&mut self, name: impl Into<String>, value: Option<Value>) {
        self.properties.insert(name.into(), value);
    }

    /// Value of a property. `None` if the property is absent or null.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name).and_then(Option::as_ref)
    }

    /// Whether the property is present (its value may be null).
    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.properties
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_ref()))
    }

    pub fn properties(&self) -> &IndexMap<String, Option<Value>> {
        &self.properties
    }
}

impl Index<&str> for State {
    type Output = Option<Value>;

    /// # Panics
    /// If no property with this name exists.
    fn index(&self, name: &str) -> &Self::Output {
        &self.properties[name]
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.properties.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            match value {
                Some(value) => write!(f, "{name:>15}: {value}")?,
                None => write!(f, "{name:>15}: ")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keeps_insertion_order() {
        let mut state = State::new();
        state.insert("b", Some(json!(2)));
        state.insert("a", None);

        let names: Vec<_> = state.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(state.contains("a"));
        assert_eq!(state.get("a"), None);
        assert_eq!(state["b"], Some(json!(2)));
    }

    #[test]
    fn display_right_aligns_names() {
        let mut state = State::new();
        state.insert("Earth", Some(json!("blue")));
        state.insert("Mars", None);

        assert_eq!(
            state.to_string(),
            "          Earth: \"blue\"\n           Mars: "
        );
    }

    #[test]
    fn serializes_nulls() {
        let mut state = State::new();
        state.insert("x", None);
        state.insert("y", Some(json!(1)));
        assert_eq!(serde_json::to_string(&state).unwrap(), r#"{"x":null,"y":1}"#);
    }
}
