//! Core data models for Recall
//!
//! These are the stored units of organizational knowledge plus the two
//! append-only audit trails kept beside them.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The kind of a knowledge item.
///
/// The four well-known kinds get their own id prefix. Any other type string
/// is accepted and kept verbatim; its items are tagged with the `X` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemType {
    /// A reusable approach that worked.
    Pattern,
    /// Something that went wrong and should not be repeated.
    Failure,
    /// A decision and the reasoning behind it.
    Decision,
    /// Background context about a project or environment.
    Context,
    /// Any other type string.
    Other(String),
}

impl ItemType {
    /// Returns the stored string form of this type.
    pub fn as_str(&self) -> &str {
        match self {
            ItemType::Pattern => "pattern",
            ItemType::Failure => "failure",
            ItemType::Decision => "decision",
            ItemType::Context => "context",
            ItemType::Other(s) => s,
        }
    }

    /// Returns the id prefix for items of this type.
    pub fn id_prefix(&self) -> char {
        match self {
            ItemType::Pattern => 'P',
            ItemType::Failure => 'F',
            ItemType::Decision => 'D',
            ItemType::Context => 'C',
            ItemType::Other(_) => 'X',
        }
    }
}

impl From<&str> for ItemType {
    fn from(s: &str) -> Self {
        match s {
            "pattern" => ItemType::Pattern,
            "failure" => ItemType::Failure,
            "decision" => ItemType::Decision,
            "context" => ItemType::Context,
            other => ItemType::Other(other.to_string()),
        }
    }
}

impl From<String> for ItemType {
    fn from(s: String) -> Self {
        ItemType::from(s.as_str())
    }
}

impl From<ItemType> for String {
    fn from(t: ItemType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether knowledge applies everywhere or to a single project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Valid across all projects.
    Global,
    /// Specific to one project.
    Project,
}

impl Scope {
    /// Returns the stored string form of this scope.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Project => "project",
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(Scope::Global),
            "project" => Ok(Scope::Project),
            other => Err(format!("unknown scope '{other}' (expected global or project)")),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored unit of organizational knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeItem {
    /// Unique identifier, `{prefix}-{8 hex}`
    pub id: String,

    /// Kind of knowledge
    #[serde(rename = "type")]
    pub item_type: ItemType,

    pub title: String,

    /// Immutable after creation
    pub content: String,

    /// Tags in the order they were submitted
    pub tags: Vec<String>,

    pub scope: Scope,

    /// Project the item was recorded in, if any
    pub project_path: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Total positive feedback votes; never decreases
    pub usefulness_score: f64,

    /// Number of times the item was reported useful
    pub use_count: i64,
}

/// Input for creating a new knowledge item.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub item_type: ItemType,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub scope: Scope,
    pub project_path: Option<String>,
}

/// Filters applied to a full-text search.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Raw full-text query
    pub query: String,

    /// Restrict to these item types (empty means all)
    pub types: Vec<String>,

    /// Restrict to one scope (None means all)
    pub scope: Option<Scope>,

    /// Maximum number of results; non-positive falls back to the default
    pub limit: i64,
}

/// Default number of search results.
pub const DEFAULT_SEARCH_LIMIT: i64 = 10;

impl SearchOptions {
    /// Returns the limit actually applied to the query.
    pub fn effective_limit(&self) -> i64 {
        if self.limit <= 0 {
            DEFAULT_SEARCH_LIMIT
        } else {
            self.limit
        }
    }
}

/// An audit record of a usefulness judgment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub item_id: String,
    pub session_id: String,
    pub useful: bool,
    pub context: String,
    pub created_at: DateTime<Utc>,
}

/// The kind of event written to the flight recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FlightEntryType {
    Decision,
    Error,
    Milestone,
    Observation,
    TaskAnnotation,
    TaskComplete,
}

impl FlightEntryType {
    /// Returns the stored string form of this entry type.
    pub fn as_str(&self) -> &'static str {
        match self {
            FlightEntryType::Decision => "decision",
            FlightEntryType::Error => "error",
            FlightEntryType::Milestone => "milestone",
            FlightEntryType::Observation => "observation",
            FlightEntryType::TaskAnnotation => "task_annotation",
            FlightEntryType::TaskComplete => "task_complete",
        }
    }
}

impl std::str::FromStr for FlightEntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "decision" => Ok(FlightEntryType::Decision),
            "error" => Ok(FlightEntryType::Error),
            "milestone" => Ok(FlightEntryType::Milestone),
            "observation" => Ok(FlightEntryType::Observation),
            "task_annotation" => Ok(FlightEntryType::TaskAnnotation),
            "task_complete" => Ok(FlightEntryType::TaskComplete),
            other => Err(format!("unknown flight recorder entry type '{other}'")),
        }
    }
}

impl std::fmt::Display for FlightEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A session-scoped event in the flight recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightRecorderEntry {
    /// Auto-incrementing row id
    pub id: i64,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub entry_type: FlightEntryType,
    pub content: String,
    pub rationale: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Input for writing a flight recorder entry.
#[derive(Debug, Clone)]
pub struct NewFlightEntry {
    pub entry_type: FlightEntryType,
    pub content: String,
    pub rationale: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_type_prefixes() {
        assert_eq!(ItemType::from("pattern").id_prefix(), 'P');
        assert_eq!(ItemType::from("failure").id_prefix(), 'F');
        assert_eq!(ItemType::from("decision").id_prefix(), 'D');
        assert_eq!(ItemType::from("context").id_prefix(), 'C');
        assert_eq!(ItemType::from("snippet").id_prefix(), 'X');
    }

    #[test]
    fn test_unknown_item_type_keeps_its_name() {
        let t = ItemType::from("snippet");
        assert_eq!(t, ItemType::Other("snippet".to_string()));
        assert_eq!(t.as_str(), "snippet");
    }

    #[test]
    fn test_item_type_serializes_as_string() {
        let json = serde_json::to_string(&ItemType::Decision).unwrap();
        assert_eq!(json, "\"decision\"");
        let back: ItemType = serde_json::from_str("\"howto\"").unwrap();
        assert_eq!(back, ItemType::Other("howto".to_string()));
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!("global".parse::<Scope>(), Ok(Scope::Global));
        assert_eq!("project".parse::<Scope>(), Ok(Scope::Project));
        assert!("all".parse::<Scope>().is_err());
    }

    #[test]
    fn test_effective_limit() {
        let mut opts = SearchOptions::default();
        assert_eq!(opts.effective_limit(), DEFAULT_SEARCH_LIMIT);
        opts.limit = -3;
        assert_eq!(opts.effective_limit(), DEFAULT_SEARCH_LIMIT);
        opts.limit = 1;
        assert_eq!(opts.effective_limit(), 1);
    }

    #[test]
    fn test_knowledge_item_uses_camel_case() {
        let item = KnowledgeItem {
            id: "P-0000beef".to_string(),
            item_type: ItemType::Pattern,
            title: "t".to_string(),
            content: "c".to_string(),
            tags: vec![],
            scope: Scope::Global,
            project_path: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            usefulness_score: 0.0,
            use_count: 0,
        };
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["type"], "pattern");
        assert_eq!(value["scope"], "global");
        assert!(value.get("usefulnessScore").is_some());
        assert!(value.get("useCount").is_some());
        assert!(value.get("projectPath").is_some());
    }

    #[test]
    fn test_flight_entry_type_round_trip_names() {
        for name in [
            "decision",
            "error",
            "milestone",
            "observation",
            "task_annotation",
            "task_complete",
        ] {
            let parsed: FlightEntryType = name.parse().unwrap();
            assert_eq!(parsed.as_str(), name);
        }
        assert!("note".parse::<FlightEntryType>().is_err());
    }
}
