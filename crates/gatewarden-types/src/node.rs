//! hierarchy node type and its path-like key.
//!
//! ancestry is encoded entirely in the key: "1:4:9" is a child of "1:4",
//! which is a child of "1". a node's descendants are exactly the nodes
//! whose key starts with `{key}:`. nothing else defines the tree shape.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// unique identifier for a hierarchy node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// error returned when parsing a malformed node key.
#[derive(Debug, Error)]
#[error("invalid node key segment: {0:?}")]
pub struct NodeKeyParseError(pub String);

/// colon-delimited hierarchy path, e.g. "1:4:9".
///
/// keys order by their numeric segments so siblings sort stably
/// ("1:10" after "1:9", not between "1:1" and "1:2").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeKey(String);

impl TryFrom<String> for NodeKey {
    type Error = NodeKeyParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        NodeKey::parse(&s)
    }
}

impl From<NodeKey> for String {
    fn from(key: NodeKey) -> String {
        key.0
    }
}

impl NodeKey {
    /// parse a key, validating every segment is numeric.
    pub fn parse(s: &str) -> Result<Self, NodeKeyParseError> {
        if s.is_empty() {
            return Err(NodeKeyParseError(s.to_string()));
        }
        for segment in s.split(':') {
            if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                return Err(NodeKeyParseError(s.to_string()));
            }
        }
        Ok(Self(s.to_string()))
    }

    /// the raw key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// the parent key, or `None` for a root node.
    pub fn parent(&self) -> Option<NodeKey> {
        self.0.rsplit_once(':').map(|(head, _)| NodeKey(head.to_string()))
    }

    /// all ancestor keys, nearest first.
    pub fn ancestors(&self) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(key) = current {
            current = key.parent();
            out.push(key);
        }
        out
    }

    /// true if `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &NodeKey) -> bool {
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b':'
    }

    /// true if `other` is `self` or a descendant of `self`.
    pub fn covers(&self, other: &NodeKey) -> bool {
        self == other || self.is_ancestor_of(other)
    }

    /// true if `other` is a direct child of `self`.
    pub fn is_parent_of(&self, other: &NodeKey) -> bool {
        other.parent().as_ref() == Some(self)
    }

    /// depth in the tree (root nodes have depth 1).
    pub fn depth(&self) -> usize {
        self.0.split(':').count()
    }

    /// numeric segments, used as the sort key for sibling ordering.
    fn segments(&self) -> impl Iterator<Item = u64> + '_ {
        // parse() guarantees every segment is numeric
        self.0.split(':').map(|s| s.parse().unwrap_or(u64::MAX))
    }
}

impl PartialOrd for NodeKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.segments().cmp(other.segments())
    }
}

impl std::str::FromStr for NodeKey {
    type Err = NodeKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKey::parse(s)
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// a node in the asset hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// unique identifier.
    pub id: NodeId,

    /// path-like key encoding ancestry.
    pub key: NodeKey,

    /// display name.
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> NodeKey {
        NodeKey::parse(s).unwrap()
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(NodeKey::parse("").is_err());
        assert!(NodeKey::parse("1::4").is_err());
        assert!(NodeKey::parse("1:a").is_err());
        assert!(NodeKey::parse("1:4:").is_err());
        assert!(NodeKey::parse("1:4:9").is_ok());
    }

    #[test]
    fn parent_walks_up() {
        assert_eq!(key("1:4:9").parent(), Some(key("1:4")));
        assert_eq!(key("1").parent(), None);
    }

    #[test]
    fn ancestors_nearest_first() {
        assert_eq!(key("1:4:9").ancestors(), vec![key("1:4"), key("1")]);
        assert!(key("1").ancestors().is_empty());
    }

    #[test]
    fn ancestry_requires_segment_boundary() {
        // "1:4" is not an ancestor of "1:40"
        assert!(key("1:4").is_ancestor_of(&key("1:4:9")));
        assert!(!key("1:4").is_ancestor_of(&key("1:40")));
        assert!(!key("1:4").is_ancestor_of(&key("1:4")));
        assert!(key("1:4").covers(&key("1:4")));
    }

    #[test]
    fn ordering_is_numeric_per_segment() {
        let mut keys = vec![key("1:10"), key("1:2"), key("1"), key("1:2:1")];
        keys.sort();
        assert_eq!(keys, vec![key("1"), key("1:2"), key("1:2:1"), key("1:10")]);
    }

    #[test]
    fn direct_child_check() {
        assert!(key("1:4").is_parent_of(&key("1:4:9")));
        assert!(!key("1").is_parent_of(&key("1:4:9")));
    }
}
