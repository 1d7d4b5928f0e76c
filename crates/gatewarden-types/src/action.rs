//! action bitmask for permission grants.
//!
//! actions only ever accumulate: merging two grants unions their bits.
//! there is no deny bit and no precedence between actions.

use serde::{Deserialize, Serialize};

/// a single action a grant can allow on an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// open an interactive connection to the asset.
    Connect,
    /// upload files to the asset.
    Upload,
    /// download files from the asset.
    Download,
    /// copy from the remote clipboard.
    Copy,
    /// paste into the remote clipboard.
    Paste,
    /// delete files on the asset.
    Delete,
}

impl Action {
    /// every action, in display order.
    pub const ALL: [Action; 6] = [
        Action::Connect,
        Action::Upload,
        Action::Download,
        Action::Copy,
        Action::Paste,
        Action::Delete,
    ];

    /// the bit this action occupies in an [`ActionSet`].
    pub const fn bit(self) -> u8 {
        match self {
            Action::Connect => 0b1,
            Action::Upload => 0b10,
            Action::Download => 0b100,
            Action::Copy => 0b1000,
            Action::Paste => 0b10000,
            Action::Delete => 0b100000,
        }
    }

    /// human-readable label.
    pub const fn label(self) -> &'static str {
        match self {
            Action::Connect => "connect",
            Action::Upload => "upload",
            Action::Download => "download",
            Action::Copy => "copy",
            Action::Paste => "paste",
            Action::Delete => "delete",
        }
    }

    /// ui grouping label. has no effect on resolution semantics.
    pub const fn group(self) -> &'static str {
        match self {
            Action::Connect => "Basic",
            Action::Upload | Action::Download | Action::Delete => "Transfer",
            Action::Copy | Action::Paste => "Clipboard",
        }
    }
}

/// error for unrecognised action labels.
#[derive(Debug, thiserror::Error)]
#[error("unknown action: {0:?}")]
pub struct ActionParseError(pub String);

impl std::str::FromStr for Action {
    type Err = ActionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.label() == s)
            .ok_or_else(|| ActionParseError(s.to_string()))
    }
}

/// bitmask of allowed actions.
///
/// union is associative, commutative and idempotent, so merging the same
/// grant twice is harmless. serialized as the raw integer, which is also
/// the on-wire form the original data model used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionSet(pub u8);

impl ActionSet {
    /// the empty set (no actions allowed).
    pub const NONE: ActionSet = ActionSet(0);

    /// every defined action.
    pub const ALL: ActionSet = ActionSet(0b111111);

    /// connect only - the default for new grants.
    pub const CONNECT: ActionSet = ActionSet(0b1);

    /// set containing exactly one action.
    pub const fn single(action: Action) -> Self {
        ActionSet(action.bit())
    }

    /// union of two sets.
    pub const fn union(self, other: ActionSet) -> ActionSet {
        ActionSet(self.0 | other.0)
    }

    /// true if every bit of `subset` is present in `self`.
    pub const fn contains(self, subset: ActionSet) -> bool {
        self.0 & subset.0 == subset.0
    }

    /// true if this specific action is allowed.
    pub const fn allows(self, action: Action) -> bool {
        self.0 & action.bit() != 0
    }

    /// true if no actions are allowed.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// the allowed actions in display order.
    pub fn actions(self) -> Vec<Action> {
        Action::ALL
            .into_iter()
            .filter(|a| self.allows(*a))
            .collect()
    }

    /// ordered labels for display ("connect", "upload", ...).
    pub fn labels(self) -> Vec<&'static str> {
        self.actions().into_iter().map(Action::label).collect()
    }
}

impl std::ops::BitOr for ActionSet {
    type Output = ActionSet;

    fn bitor(self, rhs: ActionSet) -> ActionSet {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for ActionSet {
    fn bitor_assign(&mut self, rhs: ActionSet) {
        self.0 |= rhs.0;
    }
}

impl From<Action> for ActionSet {
    fn from(action: Action) -> Self {
        ActionSet::single(action)
    }
}

impl FromIterator<Action> for ActionSet {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        iter.into_iter()
            .fold(ActionSet::NONE, |set, a| set | ActionSet::single(a))
    }
}

impl std::fmt::Display for ActionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.labels().join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_is_idempotent() {
        let a = ActionSet::single(Action::Connect) | ActionSet::single(Action::Upload);
        assert_eq!(a | a, a);
    }

    #[test]
    fn union_is_commutative() {
        let a = ActionSet::single(Action::Connect);
        let b = ActionSet::single(Action::Delete);
        assert_eq!(a | b, b | a);
    }

    #[test]
    fn contains_is_bitwise_subset() {
        let whole = ActionSet::single(Action::Connect)
            | ActionSet::single(Action::Upload)
            | ActionSet::single(Action::Download);
        let subset = ActionSet::single(Action::Upload);
        assert!(whole.contains(subset));
        assert!(!subset.contains(whole));
        // empty set is a subset of everything
        assert!(whole.contains(ActionSet::NONE));
    }

    #[test]
    fn all_contains_every_action() {
        for action in Action::ALL {
            assert!(ActionSet::ALL.allows(action));
        }
    }

    #[test]
    fn labels_are_ordered() {
        let set = ActionSet::single(Action::Delete) | ActionSet::single(Action::Connect);
        assert_eq!(set.labels(), vec!["connect", "delete"]);
    }

    #[test]
    fn transfer_group_labels() {
        assert_eq!(Action::Upload.group(), "Transfer");
        assert_eq!(Action::Download.group(), "Transfer");
        assert_eq!(Action::Delete.group(), "Transfer");
        assert_eq!(Action::Copy.group(), "Clipboard");
    }

    #[test]
    fn serde_roundtrip_as_integer() {
        let set = ActionSet::single(Action::Connect) | ActionSet::single(Action::Upload);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, "3");
        let back: ActionSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }
}
