//! Structured events emitted by procedures.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// An event field value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventValue {
    /// Boolean field.
    Bool(bool),
    /// Integer field.
    Int(i64),
    /// String field.
    Str(String),
    /// Ordered list of strings.
    Strings(Vec<String>),
}

impl fmt::Display for EventValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Strings(list) => write!(f, "[{}]", list.join(", ")),
        }
    }
}

impl From<bool> for EventValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for EventValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for EventValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for EventValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for EventValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<String>> for EventValue {
    fn from(value: Vec<String>) -> Self {
        Self::Strings(value)
    }
}

impl<const N: usize> From<[&str; N]> for EventValue {
    fn from(value: [&str; N]) -> Self {
        Self::Strings(value.iter().map(ToString::to_string).collect())
    }
}

/// A structured record emitted while a procedure runs.
///
/// Events are compared structurally: same identifier and same fields.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier, e.g. `SET_PASSWORD_QUALITY`.
    pub id: String,
    /// Payload fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, EventValue>,
}

impl Event {
    /// Creates an event with no fields.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Adds a field.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<EventValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Parses an event from its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns the decoder error if `json` is not an event object.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Encodes the event in its JSON wire form.
    #[must_use]
    pub fn to_json(&self) -> String {
        // Maps of strings to primitives always encode.
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)?;
        if self.fields.is_empty() {
            return Ok(());
        }
        f.write_str("{")?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        f.write_str("}")
    }
}

/// Events a scenario expects a procedure to emit.
///
/// Order is ignored; multiplicity is not. Expecting `A` once and receiving it
/// twice reports the second `A` as unexpected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedEventSet {
    events: Vec<Event>,
}

impl ExpectedEventSet {
    /// Creates an empty set, i.e. "no events at all".
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an expected event.
    #[must_use]
    pub fn with(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }

    /// Returns the expected events.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Returns true if no events are expected.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Compares the expected events with what was emitted.
    pub fn compare(&self, emitted: &[Event]) -> EventDiff {
        let mut balance: BTreeMap<&Event, i64> = BTreeMap::new();
        for event in &self.events {
            *balance.entry(event).or_default() += 1;
        }
        for event in emitted {
            *balance.entry(event).or_default() -= 1;
        }

        let mut diff = EventDiff::default();
        for (event, count) in balance {
            let target = if count > 0 {
                &mut diff.missing
            } else {
                &mut diff.unexpected
            };
            for _ in 0..count.unsigned_abs() {
                target.push(event.clone());
            }
        }
        diff
    }
}

impl FromIterator<Event> for ExpectedEventSet {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        Self {
            events: iter.into_iter().collect(),
        }
    }
}

/// Difference between expected and emitted events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventDiff {
    /// Expected but not emitted.
    pub missing: Vec<Event>,
    /// Emitted but not expected.
    pub unexpected: Vec<Event>,
}

impl EventDiff {
    /// Returns true if the emitted events matched exactly.
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}
