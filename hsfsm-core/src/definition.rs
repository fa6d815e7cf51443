//! Transition table types.
//!
//! Tables can be declared in code or with a JSON/YAML DSL:
//!
//! ```json
//! {
//!   "initial": "Initializing",
//!   "events": [
//!     {"name": "Ready", "from": ["Initializing", "Error"], "to": "Running"},
//!     {"name": "NotReady", "from": "Running", "to": "Error"},
//!     {"name": "Stop", "from": ["Initializing", "Running", "Error"], "to": "Stopped"},
//!     {"name": "Delete", "from": "Stopped", "to": "Deleted"}
//!   ]
//! }
//! ```
//!
//! The set of valid states is implied by the labels used in `initial` and the
//! rules; nothing else declares them.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

/// A state label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(pub String);

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for State {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for State {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<str> for State {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for State {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Opaque key of one state machine instance within a shared table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// An event and the transition it triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRule {
    /// Event name.
    pub name: String,

    /// Source states, in declaration order. Can be a single state or multiple.
    #[serde(rename = "from", deserialize_with = "deserialize_from_states")]
    pub sources: Vec<State>,

    /// Destination state.
    #[serde(rename = "to")]
    pub destination: State,
}

impl TransitionRule {
    pub fn new<I, S>(name: impl Into<String>, sources: I, destination: impl Into<State>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<State>,
    {
        Self {
            name: name.into(),
            sources: sources.into_iter().map(Into::into).collect(),
            destination: destination.into(),
        }
    }

    /// Returns true if the rule fires from the given state.
    pub fn applies_to(&self, state: &State) -> bool {
        self.sources.contains(state)
    }
}

fn deserialize_from_states<'de, D>(deserializer: D) -> Result<Vec<State>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct FromStatesVisitor;

    impl<'de> Visitor<'de> for FromStatesVisitor {
        type Value = Vec<State>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a state label or a list of state labels")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![State::from(v)])
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut states = Vec::new();
            while let Some(s) = seq.next_element::<String>()? {
                states.push(State(s));
            }
            Ok(states)
        }
    }

    deserializer.deserialize_any(FromStatesVisitor)
}

/// Raw table definition as declared in JSON or YAML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionTableRaw {
    /// Initial state for new entities.
    pub initial: String,

    /// Event rules.
    #[serde(default)]
    pub events: Vec<TransitionRule>,
}

/// Immutable, indexed transition table.
///
/// Built once and shared read-only (typically behind an `Arc`) by every
/// caller; lookups never contend.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    initial: State,

    /// Rules in declaration order.
    rules: Vec<TransitionRule>,

    /// Event name -> position in `rules`.
    index: HashMap<String, usize>,
}

impl TransitionTable {
    /// Builds a table from an initial state and a list of rules.
    ///
    /// Rejects empty or duplicate event names and rules without sources.
    /// Reachability is not checked here; see [`Self::validate_reachability`].
    pub fn build(
        initial: impl Into<State>,
        rules: impl IntoIterator<Item = TransitionRule>,
    ) -> Result<Self, CoreError> {
        let initial = initial.into();
        if initial.as_str().is_empty() {
            return Err(CoreError::InvalidDefinition {
                reason: "initial state must not be empty".to_string(),
            });
        }

        let rules: Vec<TransitionRule> = rules.into_iter().collect();
        let mut index = HashMap::with_capacity(rules.len());
        for (pos, rule) in rules.iter().enumerate() {
            if rule.name.is_empty() {
                return Err(CoreError::InvalidDefinition {
                    reason: "event name must not be empty".to_string(),
                });
            }
            if rule.sources.is_empty() {
                return Err(CoreError::InvalidDefinition {
                    reason: format!("event '{}' has no source states", rule.name),
                });
            }
            if index.insert(rule.name.clone(), pos).is_some() {
                return Err(CoreError::InvalidDefinition {
                    reason: format!("duplicate event '{}'", rule.name),
                });
            }
        }

        Ok(Self {
            initial,
            rules,
            index,
        })
    }

    /// Parses a table from the JSON DSL.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, CoreError> {
        let raw: TransitionTableRaw = serde_json::from_value(json.clone())?;
        Self::from_raw(raw)
    }

    /// Builds a table from its raw definition.
    pub fn from_raw(raw: TransitionTableRaw) -> Result<Self, CoreError> {
        Self::build(raw.initial, raw.events)
    }

    /// Returns the raw definition.
    pub fn to_raw(&self) -> TransitionTableRaw {
        TransitionTableRaw {
            initial: self.initial.0.clone(),
            events: self.rules.clone(),
        }
    }

    /// Initial state for new entities.
    pub fn initial(&self) -> &State {
        &self.initial
    }

    /// Looks up the rule for an event.
    pub fn lookup(&self, event: &str) -> Result<&TransitionRule, CoreError> {
        self.index
            .get(event)
            .map(|&pos| &self.rules[pos])
            .ok_or_else(|| CoreError::UndefinedEvent {
                event: event.to_string(),
            })
    }

    /// Rules in declaration order.
    pub fn rules(&self) -> &[TransitionRule] {
        &self.rules
    }

    /// All labels appearing in the initial state and the rules.
    pub fn states(&self) -> BTreeSet<&State> {
        let mut states = BTreeSet::new();
        states.insert(&self.initial);
        for rule in &self.rules {
            states.extend(rule.sources.iter());
            states.insert(&rule.destination);
        }
        states
    }

    /// Names of the events whose rules fire from the given state.
    pub fn events_from(&self, state: &State) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|r| r.applies_to(state))
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Checks that every label is reachable from the initial state.
    pub fn validate_reachability(&self) -> Result<(), CoreError> {
        let mut reached: HashSet<&State> = HashSet::new();
        reached.insert(&self.initial);

        loop {
            let before = reached.len();
            for rule in &self.rules {
                if rule.sources.iter().any(|s| reached.contains(s)) {
                    reached.insert(&rule.destination);
                }
            }
            if reached.len() == before {
                break;
            }
        }

        match self.states().into_iter().find(|s| !reached.contains(s)) {
            Some(state) => Err(CoreError::Unreachable {
                state: state.0.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_definition() -> serde_json::Value {
        serde_json::json!({
            "initial": "Initializing",
            "events": [
                {"name": "Ready", "from": ["Initializing", "Error"], "to": "Running"},
                {"name": "NotReady", "from": "Running", "to": "Error"},
                {"name": "Stop", "from": ["Initializing", "Running", "Error"], "to": "Stopped"},
                {"name": "Delete", "from": "Stopped", "to": "Deleted"}
            ]
        })
    }

    #[test]
    fn test_parse_definition() {
        let table = TransitionTable::from_json(&task_definition()).unwrap();

        assert_eq!(table.initial().as_str(), "Initializing");
        assert_eq!(table.rules().len(), 4);
        assert_eq!(table.states().len(), 5);
    }

    #[test]
    fn test_lookup() {
        let table = TransitionTable::from_json(&task_definition()).unwrap();

        let rule = table.lookup("Ready").unwrap();
        assert_eq!(rule.sources, vec![State::from("Initializing"), State::from("Error")]);
        assert_eq!(rule.destination, "Running");

        // Single-source shorthand
        let rule = table.lookup("NotReady").unwrap();
        assert_eq!(rule.sources, vec![State::from("Running")]);

        let err = table.lookup("Launch").unwrap_err();
        assert!(matches!(err, CoreError::UndefinedEvent { ref event } if event == "Launch"));
    }

    #[test]
    fn test_events_from() {
        let table = TransitionTable::from_json(&task_definition()).unwrap();

        assert_eq!(table.events_from(&State::from("Running")), vec!["NotReady", "Stop"]);
        assert_eq!(table.events_from(&State::from("Stopped")), vec!["Delete"]);
        assert!(table.events_from(&State::from("Deleted")).is_empty());
    }

    #[test]
    fn test_duplicate_event_rejected() {
        let result = TransitionTable::build(
            "a",
            vec![
                TransitionRule::new("GO", ["a"], "b"),
                TransitionRule::new("GO", ["b"], "a"),
            ],
        );
        assert!(matches!(result, Err(CoreError::InvalidDefinition { .. })));
    }

    #[test]
    fn test_empty_sources_rejected() {
        let result = TransitionTable::build(
            "a",
            vec![TransitionRule::new("GO", Vec::<State>::new(), "b")],
        );
        assert!(matches!(result, Err(CoreError::InvalidDefinition { .. })));
    }

    #[test]
    fn test_self_transition_allowed() {
        let table =
            TransitionTable::build("idle", vec![TransitionRule::new("Ping", ["idle"], "idle")])
                .unwrap();
        assert_eq!(table.lookup("Ping").unwrap().destination, "idle");
    }

    #[test]
    fn test_unreachable_labels_are_permitted_by_default() {
        let table = TransitionTable::build(
            "a",
            vec![TransitionRule::new("Revive", ["ghost"], "a")],
        )
        .unwrap();
        assert!(table.lookup("Revive").is_ok());

        let err = table.validate_reachability().unwrap_err();
        assert!(matches!(err, CoreError::Unreachable { ref state } if state == "ghost"));
    }

    #[test]
    fn test_reachability_of_task_lifecycle() {
        let table = TransitionTable::from_json(&task_definition()).unwrap();
        table.validate_reachability().unwrap();
    }

    #[test]
    fn test_raw_roundtrip_preserves_source_order() {
        let table = TransitionTable::from_json(&task_definition()).unwrap();
        let json = serde_json::to_value(table.to_raw()).unwrap();
        let again = TransitionTable::from_json(&json).unwrap();

        assert_eq!(
            again.lookup("Stop").unwrap().sources,
            table.lookup("Stop").unwrap().sources
        );
    }
}
