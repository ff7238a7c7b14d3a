//! Ordered name/value configuration handed to pluggable sources.
//!
//! Every `TeamSource`, `ManagedObjectSource`, and `AdministratorSource`
//! receives its configuration as a [`PropertyList`]. Order is preserved so a
//! source can report its properties back in the order the configuration
//! declared them.

use serde::{Deserialize, Serialize};

/// A single named configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Property name.
    pub name: String,
    /// Property value.
    pub value: String,
}

/// An ordered list of properties.
///
/// Lookup is linear; property lists are small and read once at
/// construction time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyList {
    entries: Vec<Property>,
}

impl PropertyList {
    /// Create an empty property list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a property, keeping declaration order.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.push(Property {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Builder-style variant of [`Self::add`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(name, value);
        self
    }

    /// Look up a property value by name. First declaration wins.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// Look up a property value, falling back to a default.
    pub fn get_or(&self, name: &str, default: &'static str) -> String {
        self.get(name).unwrap_or(default).to_string()
    }

    /// Parse a property value as the given type.
    pub fn get_parsed<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|v| v.parse().ok())
    }

    /// Whether no properties are declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of declared properties.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate properties in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.entries.iter()
    }

    /// Names of properties in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|p| p.name.as_str()).collect()
    }
}

impl FromIterator<(String, String)> for PropertyList {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut list = PropertyList::new();
        for (name, value) in iter {
            list.add(name, value);
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_get_preserves_order() {
        let list = PropertyList::new().with("size", "4").with("mode", "lazy");
        assert_eq!(list.get("size"), Some("4"));
        assert_eq!(list.get("mode"), Some("lazy"));
        assert_eq!(list.names(), vec!["size", "mode"]);
    }

    #[test]
    fn first_declaration_wins_on_duplicate() {
        let list = PropertyList::new().with("size", "4").with("size", "8");
        assert_eq!(list.get("size"), Some("4"));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn get_parsed_handles_numbers() {
        let list = PropertyList::new().with("size", "16").with("bad", "x");
        assert_eq!(list.get_parsed::<usize>("size"), Some(16));
        assert_eq!(list.get_parsed::<usize>("bad"), None);
        assert_eq!(list.get_parsed::<usize>("missing"), None);
    }

    #[test]
    fn deserializes_from_yaml_sequence() {
        let yaml = "- name: size\n  value: '2'\n- name: mode\n  value: eager\n";
        let list: PropertyList = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(list.get("size"), Some("2"));
        assert_eq!(list.get("mode"), Some("eager"));
    }
}
