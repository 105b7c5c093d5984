#![forbid(unsafe_code)]

//! Segment-based addressing into a nested [`Value`] tree.
//!
//! A path is a slice of [`Segment`]s resolved from the root on every access.
//! Paths carry no cached references, so a handle built from one can outlive
//! arbitrary mutations of the tree; resolution simply fails (returns `None`)
//! if the addressed node no longer exists.

use std::fmt;

use serde_json::Value;

/// One step of a path: a map key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, ".{key}"),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

impl From<&str> for Segment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_owned())
    }
}

impl From<String> for Segment {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Render a path for diagnostics, e.g. `$.todos[2].title`.
#[must_use]
pub fn render(path: &[Segment]) -> String {
    let mut out = String::from("$");
    for segment in path {
        out.push_str(&segment.to_string());
    }
    out
}

/// Resolve a path to a shared reference, or `None` if any step is missing
/// or of the wrong kind.
#[must_use]
pub fn lookup<'v>(root: &'v Value, path: &[Segment]) -> Option<&'v Value> {
    let mut node = root;
    for segment in path {
        node = match segment {
            Segment::Key(key) => node.get(key.as_str())?,
            Segment::Index(index) => node.get(*index)?,
        };
    }
    Some(node)
}

/// Resolve a path to an exclusive reference, or `None` if any step is
/// missing or of the wrong kind.
pub fn lookup_mut<'v>(root: &'v mut Value, path: &[Segment]) -> Option<&'v mut Value> {
    let mut node = root;
    for segment in path {
        node = match segment {
            Segment::Key(key) => node.get_mut(key.as_str())?,
            Segment::Index(index) => node.get_mut(*index)?,
        };
    }
    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "name": "strata",
            "todos": [
                { "title": "ship", "done": false },
                { "title": "rest", "done": true },
            ],
        })
    }

    #[test]
    fn lookup_nested() {
        let tree = sample();
        let path = [Segment::from("todos"), Segment::from(1), Segment::from("title")];
        assert_eq!(lookup(&tree, &path), Some(&json!("rest")));
    }

    #[test]
    fn lookup_empty_path_is_root() {
        let tree = sample();
        assert_eq!(lookup(&tree, &[]), Some(&tree));
    }

    #[test]
    fn lookup_missing_key() {
        let tree = sample();
        assert_eq!(lookup(&tree, &[Segment::from("nope")]), None);
    }

    #[test]
    fn lookup_wrong_kind() {
        let tree = sample();
        // Indexing into a string fails rather than panicking.
        let path = [Segment::from("name"), Segment::from(0)];
        assert_eq!(lookup(&tree, &path), None);
    }

    #[test]
    fn lookup_mut_allows_write() {
        let mut tree = sample();
        let path = [Segment::from("todos"), Segment::from(0), Segment::from("done")];
        *lookup_mut(&mut tree, &path).unwrap() = json!(true);
        assert_eq!(lookup(&tree, &path), Some(&json!(true)));
    }

    #[test]
    fn render_formats_segments() {
        let path = [Segment::from("todos"), Segment::from(2), Segment::from("title")];
        assert_eq!(render(&path), "$.todos[2].title");
        assert_eq!(render(&[]), "$");
    }
}
