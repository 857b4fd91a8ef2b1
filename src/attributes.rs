use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// An immutable, ordered set of variant attributes such as
/// `artifactType=jar` or `usage=java-runtime`.
///
/// Attribute sets are shared between a variant and every artifact set built
/// from it, so they are reference counted and never mutated in place; the
/// modifying methods return a new set.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Attributes(Arc<BTreeMap<String, String>>);

impl Attributes {
    /// The empty attribute set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns a copy of this set with `key` set to `value`.
    pub fn with(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut map = BTreeMap::clone(&self.0);
        map.insert(key.into(), value.into());
        Self(Arc::new(map))
    }

    /// Returns a copy of this set with every entry of `other` added.
    /// Entries from `other` win on conflicting keys.
    pub fn concat(&self, other: &Attributes) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }

        let mut map = BTreeMap::clone(&self.0);
        for (key, value) in other.0.iter() {
            map.insert(key.clone(), value.clone());
        }
        Self(Arc::new(map))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serialize the set to a JSON object.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self(Arc::new(map))
    }
}

impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str("}")
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Attributes{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_does_not_mutate() {
        let base = Attributes::empty().with("usage", "java-runtime");
        let derived = base.with("artifactType", "jar");

        assert_eq!(base.len(), 1);
        assert_eq!(derived.len(), 2);
        assert_eq!(derived.get("artifactType"), Some("jar"));
        assert_eq!(base.get("artifactType"), None);
    }

    #[test]
    fn test_concat_prefers_right() {
        let left: Attributes = [("a", "1"), ("b", "2")].into_iter().collect();
        let right: Attributes = [("b", "3"), ("c", "4")].into_iter().collect();

        let merged = left.concat(&right);
        assert_eq!(merged.to_string(), "{a=1, b=3, c=4}");
    }

    #[test]
    fn test_to_json() {
        let attrs: Attributes = [("artifactType", "classes")].into_iter().collect();
        assert_eq!(attrs.to_json().unwrap(), r#"{"artifactType":"classes"}"#);
    }

    #[test]
    fn test_empty_display() {
        assert_eq!(Attributes::empty().to_string(), "{}");
    }
}
