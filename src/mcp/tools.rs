//! The five tools exposed by the Recall MCP server.
//!
//! Each tool deserializes its arguments into a typed parameter struct. The
//! same structs generate the `inputSchema` advertised by `tools/list`, so the
//! catalog and the validation can never drift apart.
//!
//! Argument policy is strict: a field of the wrong JSON type is reported as
//! an application error naming the field rather than treated as absent.
//! An explicit `null` on an optional field counts as absent.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::storage::models::{
    FlightEntryType, ItemType, KnowledgeItem, NewFlightEntry, NewItem, Scope, SearchOptions,
    DEFAULT_SEARCH_LIMIT,
};
use crate::storage::Database;

// ============== Tool Catalog ==============

/// All tools exposed by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Search,
    Get,
    Add,
    Feedback,
    Log,
}

impl Tool {
    /// Every tool, in catalog order.
    pub const ALL: [Tool; 5] = [Tool::Search, Tool::Get, Tool::Add, Tool::Feedback, Tool::Log];

    /// Parse a tool name from a `tools/call` request.
    pub fn parse(name: &str) -> Option<Self> {
        Tool::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tool::Search => "search",
            Tool::Get => "get",
            Tool::Add => "add",
            Tool::Feedback => "feedback",
            Tool::Log => "log",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Tool::Search => {
                "Search stored knowledge (patterns, failures, decisions, context) by full-text \
                 query. Results are ranked best match first."
            }
            Tool::Get => "Fetch a single knowledge item by ID.",
            Tool::Add => {
                "Store a new knowledge item. Types: pattern, failure, decision, context. \
                 Returns the new item's ID."
            }
            Tool::Feedback => {
                "Report whether a knowledge item was useful. Useful items rank higher in \
                 usage statistics."
            }
            Tool::Log => {
                "Write an entry to this session's flight recorder: decisions, errors, \
                 milestones, observations and task notes."
            }
        }
    }

    /// JSON Schema for this tool's arguments.
    pub fn input_schema(&self) -> Value {
        let schema = match self {
            Tool::Search => schemars::schema_for!(SearchParams),
            Tool::Get => schemars::schema_for!(GetParams),
            Tool::Add => schemars::schema_for!(AddParams),
            Tool::Feedback => schemars::schema_for!(FeedbackParams),
            Tool::Log => schemars::schema_for!(LogParams),
        };
        let mut value = serde_json::to_value(schema).unwrap_or_else(|_| json!({}));
        if let Value::Object(map) = &mut value {
            map.remove("$schema");
            map.remove("title");
            map.entry("type").or_insert_with(|| json!("object"));
            map.entry("properties").or_insert_with(|| json!({}));
            map.entry("required").or_insert_with(|| json!([]));
        }
        value
    }
}

/// A catalog entry as returned by `tools/list`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// The static tool catalog.
pub fn all_tools() -> Vec<ToolDef> {
    Tool::ALL
        .iter()
        .map(|tool| ToolDef {
            name: tool.name(),
            description: tool.description(),
            input_schema: tool.input_schema(),
        })
        .collect()
}

// ============== Tool Parameter Types ==============

/// Parameters for the search tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchParams {
    #[schemars(description = "Full-text query matched against item titles and content")]
    pub query: String,

    #[schemars(
        description = "Only return items of these types (pattern, failure, decision, context)"
    )]
    pub types: Option<Vec<String>>,

    #[schemars(description = "global, project or all (default: all)")]
    pub scope: Option<String>,

    #[schemars(description = "Maximum number of results (default: 10)")]
    pub limit: Option<i64>,
}

/// Parameters for the get tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetParams {
    #[schemars(description = "Knowledge item ID, e.g. P-1a2b3c4d")]
    pub id: String,
}

/// Parameters for the add tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddParams {
    #[serde(rename = "type")]
    #[schemars(description = "pattern, failure, decision or context")]
    pub item_type: String,

    #[schemars(description = "Short title")]
    pub title: String,

    #[schemars(description = "The knowledge itself")]
    pub content: String,

    #[schemars(description = "Tags, kept in the given order")]
    pub tags: Option<Vec<String>>,

    #[schemars(description = "global or project (default: project)")]
    pub scope: Option<Scope>,
}

/// Parameters for the feedback tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct FeedbackParams {
    #[schemars(description = "ID of the knowledge item being rated")]
    pub item_id: String,

    #[schemars(description = "Whether the item helped")]
    pub useful: bool,

    #[schemars(description = "What the item was used for")]
    pub context: Option<String>,
}

/// Parameters for the log tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct LogParams {
    #[serde(rename = "type")]
    #[schemars(description = "Kind of event being recorded")]
    pub entry_type: FlightEntryType,

    #[schemars(description = "What happened")]
    pub content: String,

    #[schemars(description = "Why it happened or why it was chosen")]
    pub rationale: Option<String>,

    #[schemars(description = "Arbitrary structured data attached to the entry")]
    pub metadata: Option<Value>,
}

// ============== Result Types ==============

/// Search results response.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<KnowledgeItem>,
    pub count: usize,
}

/// Response to a successful add.
#[derive(Debug, Serialize)]
pub struct AddResponse {
    pub id: String,
    pub message: String,
}

/// Acknowledgement for feedback and log writes.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

// ============== Errors ==============

/// Failures while executing a tool.
///
/// These are application faults: the RPC call itself succeeds and the
/// message is returned to the client with `isError` set.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// A required argument was empty.
    #[error("{0} is required")]
    MissingArgument(&'static str),

    /// The arguments did not match the tool's schema.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// No item with the given ID exists.
    #[error("Knowledge item not found: {0}")]
    NotFound(String),

    /// The knowledge store failed.
    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

// ============== Dispatch ==============

/// Per-process values the tools attribute their writes to.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Session that feedback and flight recorder entries belong to
    pub session_id: String,

    /// Project path stamped on project-scoped items
    pub project_path: Option<String>,
}

/// Run a tool against the store.
pub fn call_tool(
    tool: Tool,
    arguments: Value,
    db: &mut Database,
    ctx: &ToolContext,
) -> Result<Value, ToolError> {
    match tool {
        Tool::Search => to_json(search_impl(db, parse_args(arguments)?)?),
        Tool::Get => to_json(get_impl(db, parse_args(arguments)?)?),
        Tool::Add => to_json(add_impl(db, ctx, parse_args(arguments)?)?),
        Tool::Feedback => to_json(feedback_impl(db, ctx, parse_args(arguments)?)?),
        Tool::Log => to_json(log_impl(db, ctx, parse_args(arguments)?)?),
    }
}

/// Wrap a tool outcome in the `tools/call` result envelope.
pub fn tool_result(outcome: Result<Value, ToolError>) -> Value {
    match outcome {
        Ok(value) => {
            let text = serde_json::to_string_pretty(&value)
                .unwrap_or_else(|e| format!("Error serializing response: {e}"));
            json!({ "content": [{ "type": "text", "text": text }] })
        }
        Err(e) => json!({
            "content": [{ "type": "text", "text": format!("Error: {e}") }],
            "isError": true,
        }),
    }
}

fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

fn to_json<T: Serialize>(response: T) -> Result<Value, ToolError> {
    serde_json::to_value(response).map_err(|e| ToolError::Storage(e.into()))
}

fn require(value: &str, name: &'static str) -> Result<(), ToolError> {
    if value.trim().is_empty() {
        Err(ToolError::MissingArgument(name))
    } else {
        Ok(())
    }
}

/// Reads the search scope filter. Empty and "all" both mean no filter.
fn parse_scope_filter(raw: Option<&str>) -> Result<Option<Scope>, ToolError> {
    match raw.map(str::trim) {
        None | Some("") | Some("all") => Ok(None),
        Some(s) => s
            .parse::<Scope>()
            .map(Some)
            .map_err(ToolError::InvalidArguments),
    }
}

// ============== Implementation Functions ==============

/// Implementation of the search tool.
fn search_impl(db: &Database, params: SearchParams) -> Result<SearchResponse, ToolError> {
    require(&params.query, "query")?;

    let options = SearchOptions {
        query: params.query,
        types: params.types.unwrap_or_default(),
        scope: parse_scope_filter(params.scope.as_deref())?,
        limit: params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
    };

    let results = db.search(&options)?;
    tracing::debug!("search '{}' matched {} items", options.query, results.len());

    Ok(SearchResponse {
        count: results.len(),
        results,
    })
}

/// Implementation of the get tool.
fn get_impl(db: &Database, params: GetParams) -> Result<KnowledgeItem, ToolError> {
    require(&params.id, "id")?;

    db.get_item(&params.id)?
        .ok_or(ToolError::NotFound(params.id))
}

/// Implementation of the add tool.
fn add_impl(db: &Database, ctx: &ToolContext, params: AddParams) -> Result<AddResponse, ToolError> {
    require(&params.item_type, "type")?;
    require(&params.title, "title")?;
    require(&params.content, "content")?;

    let scope = params.scope.unwrap_or(Scope::Project);
    let project_path = match scope {
        Scope::Project => ctx.project_path.clone(),
        Scope::Global => None,
    };

    let item = db.add_item(&NewItem {
        item_type: ItemType::from(params.item_type),
        title: params.title,
        content: params.content,
        tags: params.tags.unwrap_or_default(),
        scope,
        project_path,
    })?;
    tracing::info!("Added {} item {}", item.item_type, item.id);

    Ok(AddResponse {
        message: format!("Added {} '{}'", item.item_type, item.title),
        id: item.id,
    })
}

/// Implementation of the feedback tool.
fn feedback_impl(
    db: &mut Database,
    ctx: &ToolContext,
    params: FeedbackParams,
) -> Result<StatusResponse, ToolError> {
    require(&params.item_id, "item_id")?;

    let context = params.context.unwrap_or_default();
    db.record_feedback(&params.item_id, &ctx.session_id, params.useful, &context)?
        .ok_or(ToolError::NotFound(params.item_id))?;

    Ok(StatusResponse { status: "recorded" })
}

/// Implementation of the log tool.
fn log_impl(
    db: &Database,
    ctx: &ToolContext,
    params: LogParams,
) -> Result<StatusResponse, ToolError> {
    require(&params.content, "content")?;

    db.log_flight_entry(
        &ctx.session_id,
        &NewFlightEntry {
            entry_type: params.entry_type,
            content: params.content,
            rationale: params.rationale,
            metadata: params.metadata,
        },
    )?;

    Ok(StatusResponse { status: "logged" })
}
