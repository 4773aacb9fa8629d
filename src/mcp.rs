//! MCP tool bridge.
//!
//! Serves the rule store to MCP clients over stdio. Three tools are
//! exposed, each answering with human-readable text:
//!
//! | Tool | Store operation |
//! |------|-----------------|
//! | `load-governance-rule` | upsert |
//! | `query-governance-rules` | similarity query |
//! | `list-all-rules` | list |
//!
//! Tool failures are reported as error results (`is_error = true`) so the
//! calling model sees the message; only an unknown tool name is a protocol
//! error.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::sync::Arc;

use rmcp::model::*;
use rmcp::transport::stdio;
use rmcp::{ErrorData as McpError, ServerHandler, ServiceExt};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use governance_rules_core::models::{
    RuleDraft, RuleHits, RuleList, RuleQuery, DEFAULT_LIST_LIMIT, DEFAULT_QUERY_LIMIT,
};
use governance_rules_core::RuleStore;

pub const LOAD_TOOL: &str = "load-governance-rule";
pub const QUERY_TOOL: &str = "query-governance-rules";
pub const LIST_TOOL: &str = "list-all-rules";

/// Bridges the rule store to the MCP JSON-RPC protocol.
///
/// Each MCP session receives a clone; the store is shared behind `Arc`.
#[derive(Clone)]
pub struct McpBridge {
    store: Arc<RuleStore>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QueryArgs {
    query: Option<String>,
    category: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListArgs {
    limit: Option<usize>,
}

impl McpBridge {
    pub fn new(store: Arc<RuleStore>) -> Self {
        Self { store }
    }

    /// Serve over stdin/stdout until the client disconnects.
    pub async fn serve_stdio(self) -> anyhow::Result<()> {
        info!("starting MCP server on stdio");
        let service = self
            .serve(stdio())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start MCP service: {:?}", e))?;
        service.waiting().await?;
        info!("MCP server shutdown complete");
        Ok(())
    }

    fn tools() -> Vec<Tool> {
        vec![
            make_tool(
                LOAD_TOOL,
                "Load a governance rule into the rule store",
                json!({
                    "type": "object",
                    "properties": {
                        "title": { "type": "string", "description": "Title of the governance rule" },
                        "description": { "type": "string", "description": "Description of what the rule governs" },
                        "rule_text": { "type": "string", "description": "The actual rule text/content" },
                        "category": {
                            "type": "string",
                            "description": "Category of the rule (e.g., 'privacy', 'safety', 'ethics')",
                            "default": "general"
                        },
                        "priority": {
                            "type": "integer",
                            "description": "Priority level (1-10, higher is more important)",
                            "default": 1
                        },
                        "tags": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Tags for categorizing the rule",
                            "default": []
                        }
                    },
                    "required": ["title", "rule_text"]
                }),
                false,
            ),
            make_tool(
                QUERY_TOOL,
                "Query governance rules by context or topic using semantic search",
                json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "Query text describing the context or topic" },
                        "category": { "type": "string", "description": "Optional category filter" },
                        "limit": {
                            "type": "integer",
                            "description": "Maximum number of rules to return",
                            "default": DEFAULT_QUERY_LIMIT
                        }
                    },
                    "required": ["query"]
                }),
                true,
            ),
            make_tool(
                LIST_TOOL,
                "List all available governance rules",
                json!({
                    "type": "object",
                    "properties": {
                        "limit": {
                            "type": "integer",
                            "description": "Maximum number of rules to return",
                            "default": DEFAULT_LIST_LIMIT
                        }
                    }
                }),
                true,
            ),
        ]
    }

    /// Run one tool. `Ok` carries the text to show; `Err` the failure text.
    pub async fn call(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Option<Result<String, String>> {
        let result = match name {
            LOAD_TOOL => self.load(args).await,
            QUERY_TOOL => self.query(args).await,
            LIST_TOOL => self.list(args).await,
            _ => return None,
        };
        Some(result)
    }

    async fn load(&self, args: serde_json::Value) -> Result<String, String> {
        let draft: RuleDraft = serde_json::from_value(args)
            .map_err(|e| format!("Error loading rule: invalid arguments: {}", e))?;
        let rule = draft
            .validate()
            .map_err(|e| format!("Failed to load rule: {}", e))?;
        let title = rule.title().to_string();
        let id = self
            .store
            .upsert(rule)
            .await
            .map_err(|e| format!("Failed to load rule: {}", e))?;
        Ok(format!(
            "Successfully loaded governance rule '{}' with ID: {}",
            title, id
        ))
    }

    async fn query(&self, args: serde_json::Value) -> Result<String, String> {
        let args: QueryArgs = serde_json::from_value(args)
            .map_err(|e| format!("Error querying rules: invalid arguments: {}", e))?;
        let query = RuleQuery {
            text: args.query.unwrap_or_default(),
            category: args.category.filter(|c| !c.is_empty()),
            limit: args.limit.unwrap_or(DEFAULT_QUERY_LIMIT),
        };
        let hits = self
            .store
            .query(&query)
            .await
            .map_err(|e| format!("Query failed: {}", e))?;
        Ok(format_query_results(&query.text, &hits))
    }

    async fn list(&self, args: serde_json::Value) -> Result<String, String> {
        let args: ListArgs = serde_json::from_value(args)
            .map_err(|e| format!("Error listing rules: invalid arguments: {}", e))?;
        let list = self
            .store
            .list(args.limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .await
            .map_err(|e| format!("Failed to list rules: {}", e))?;
        Ok(format_rule_list(&list))
    }
}

fn make_tool(
    name: &'static str,
    description: &'static str,
    schema: serde_json::Value,
    read_only: bool,
) -> Tool {
    let input_schema = match schema {
        serde_json::Value::Object(map) => Arc::new(map),
        _ => Arc::new(serde_json::Map::new()),
    };
    Tool {
        name: Cow::Borrowed(name),
        title: None,
        description: Some(Cow::Borrowed(description)),
        input_schema,
        output_schema: None,
        annotations: Some(ToolAnnotations::new().read_only(read_only)),
        execution: None,
        icons: None,
        meta: None,
    }
}

/// Numbered query results with scores.
pub fn format_query_results(query: &str, hits: &RuleHits) -> String {
    if hits.rules.is_empty() {
        return format!("No governance rules found for query: '{}'", query);
    }

    let mut out = format!(
        "Found {} governance rules (total: {}):\n\n",
        hits.rules.len(),
        hits.total
    );
    for (i, hit) in hits.rules.iter().enumerate() {
        let rule = &hit.rule;
        let _ = writeln!(out, "{}. **{}**", i + 1, rule.title);
        let _ = writeln!(out, "   Category: {}", rule.category);
        let _ = writeln!(out, "   Priority: {}", rule.priority);
        if !rule.description.is_empty() {
            let _ = writeln!(out, "   Description: {}", rule.description);
        }
        let _ = writeln!(out, "   Rule: {}", rule.rule_text);
        if !rule.tags.is_empty() {
            let tags: Vec<&str> = rule.tags.iter().map(String::as_str).collect();
            let _ = writeln!(out, "   Tags: {}", tags.join(", "));
        }
        let _ = writeln!(out, "   Score: {:.3}\n", hit.score);
    }
    out
}

/// Numbered listing with ids and creation times.
pub fn format_rule_list(list: &RuleList) -> String {
    if list.rules.is_empty() {
        return "No governance rules found in the system.".to_string();
    }

    let mut out = format!(
        "All Governance Rules ({} of {}):\n\n",
        list.rules.len(),
        list.total
    );
    for (i, rule) in list.rules.iter().enumerate() {
        let _ = writeln!(out, "{}. **{}**", i + 1, rule.title);
        let _ = writeln!(out, "   ID: {}", rule.rule_id);
        let _ = writeln!(out, "   Category: {}", rule.category);
        let _ = writeln!(out, "   Priority: {}", rule.priority);
        if !rule.description.is_empty() {
            let _ = writeln!(out, "   Description: {}", rule.description);
        }
        let _ = writeln!(out, "   Rule: {}", rule.rule_text);
        if !rule.tags.is_empty() {
            let tags: Vec<&str> = rule.tags.iter().map(String::as_str).collect();
            let _ = writeln!(out, "   Tags: {}", tags.join(", "));
        }
        let _ = writeln!(out, "   Created: {}\n", rule.created_at.to_rfc3339());
    }
    out
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "governance-rules".to_string(),
                title: Some("Governance Rules".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Governance rule store. Use query-governance-rules to find the rules that \
                 apply to a topic, list-all-rules to browse by priority, and \
                 load-governance-rule to add or replace a rule."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult::with_all_items(Self::tools())))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        Self::tools().into_iter().find(|t| t.name == name)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let args = request
            .arguments
            .map(serde_json::Value::Object)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        match self.call(&request.name, args).await {
            Some(Ok(text)) => Ok(CallToolResult::success(vec![Content::text(text)])),
            Some(Err(text)) => Ok(CallToolResult::error(vec![Content::text(text)])),
            None => Err(McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("Unknown tool: {}", request.name),
                None,
            )),
        }
    }
}
