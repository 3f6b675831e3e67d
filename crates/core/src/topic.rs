//! Topic descriptions: which row changes a channel listens to

use crate::error::RealtimeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Schema used when a topic does not name one
pub const DEFAULT_SCHEMA: &str = "public";

/// Kind of row-level change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EventKind {
    Insert,
    Update,
    Delete,
    /// Wildcard, matches every concrete kind
    #[default]
    Any,
}

impl EventKind {
    /// Wire representation understood by the transport
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Insert => "INSERT",
            EventKind::Update => "UPDATE",
            EventKind::Delete => "DELETE",
            EventKind::Any => "*",
        }
    }

    /// Whether a subscription for `self` receives a change of kind `other`
    pub fn matches(&self, other: EventKind) -> bool {
        *self == EventKind::Any || *self == other
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INSERT" => Ok(EventKind::Insert),
            "UPDATE" => Ok(EventKind::Update),
            "DELETE" => Ok(EventKind::Delete),
            "*" | "ANY" => Ok(EventKind::Any),
            _ => Err(RealtimeError::UnknownEventKind(s.to_string())),
        }
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Row filter operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Neq,
    /// Value is a parenthesised, comma separated list: `(a,b,c)`
    In,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::In => "in",
        }
    }
}

/// Server-side row filter in `column=op.value` form
///
/// ```text
/// workspace_id=eq.ws-1
/// status=in.(open,blocked)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: String,
}

impl Filter {
    /// `column = value`
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    /// `column != value`
    pub fn neq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Neq,
            value: value.into(),
        }
    }

    /// `column IN (values...)`
    pub fn one_of<I, S>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = values
            .into_iter()
            .map(|v| v.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(",");
        Self {
            column: column.into(),
            op: FilterOp::In,
            value: format!("({})", joined),
        }
    }

    /// Evaluate the filter against a row
    ///
    /// Column values are compared by their string rendering. A row without
    /// the column never satisfies `eq`/`in` and always satisfies `neq`.
    pub fn matches(&self, record: &serde_json::Value) -> bool {
        let actual = record.get(&self.column).map(render_value);

        match self.op {
            FilterOp::Eq => actual.as_deref() == Some(self.value.as_str()),
            FilterOp::Neq => actual.as_deref() != Some(self.value.as_str()),
            FilterOp::In => match actual {
                Some(actual) => self.in_values().any(|v| v == actual),
                None => false,
            },
        }
    }

    fn in_values(&self) -> impl Iterator<Item = &str> {
        self.value
            .trim_start_matches('(')
            .trim_end_matches(')')
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}.{}", self.column, self.op.as_str(), self.value)
    }
}

impl FromStr for Filter {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| RealtimeError::InvalidFilter {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let (column, rest) = s.split_once('=').ok_or_else(|| invalid("missing '='"))?;
        let column = column.trim();
        if column.is_empty() {
            return Err(invalid("empty column"));
        }

        let (op, value) = rest
            .split_once('.')
            .ok_or_else(|| invalid("expected 'op.value' after '='"))?;
        let op = match op {
            "eq" => FilterOp::Eq,
            "neq" => FilterOp::Neq,
            "in" => FilterOp::In,
            _ => return Err(invalid("unsupported operator")),
        };

        if op == FilterOp::In && !(value.starts_with('(') && value.ends_with(')')) {
            return Err(invalid("'in' expects a parenthesised list"));
        }

        Ok(Self {
            column: column.to_string(),
            op,
            value: value.to_string(),
        })
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One table/event/filter combination registered on a channel
///
/// Immutable once handed to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicSubscription {
    pub schema: String,
    pub table: String,
    pub event: EventKind,
    pub filter: Option<Filter>,
}

impl TopicSubscription {
    /// All changes on `public.<table>`
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            table: table.into(),
            event: EventKind::Any,
            filter: None,
        }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn on_event(mut self, event: EventKind) -> Self {
        self.event = event;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Whether this topic receives the given change
    pub fn matches(&self, change: &RowChange) -> bool {
        self.schema == change.schema
            && self.table == change.table
            && self.event.matches(change.kind)
            && self
                .filter
                .as_ref()
                .map_or(true, |filter| filter.matches(&change.record))
    }
}

impl fmt::Display for TopicSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}", self.event, self.schema, self.table)?;
        if let Some(filter) = &self.filter {
            write!(f, " [{}]", filter)?;
        }
        Ok(())
    }
}

/// A concrete row change as delivered by a transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub schema: String,
    pub table: String,
    pub kind: EventKind,
    /// New row for inserts/updates, old row for deletes
    pub record: serde_json::Value,
}

impl RowChange {
    pub fn new(table: impl Into<String>, kind: EventKind, record: serde_json::Value) -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            table: table.into(),
            kind,
            record,
        }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }
}
