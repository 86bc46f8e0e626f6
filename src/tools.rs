//! Tool trait, context, and the built-in tool set.
//!
//! Every operation the service exposes over HTTP is a [`Tool`]: it has a
//! name, a one-line description, an OpenAI function-calling parameter
//! schema, and an async `execute` that receives the validated parameters
//! plus a [`ToolContext`]. The server looks tools up by name in a
//! [`ToolRegistry`] and reports errors using [`RagError::code`].
//!
//! # Built-in tools
//!
//! | Tool | Operation |
//! |------|-----------|
//! | `ingest_document` | [`RagService::ingest`] |
//! | `rag_query` | [`RagService::query`] |
//! | `rag_batch_query` | [`RagService::batch_query`] |
//! | `get_document_summary` | [`RagService::summary`] |
//! | `extract_tables_from_document` | [`RagService::tables`] |
//! | `list_indexed_documents` | [`RagService::list`] |
//! | `load_existing_index` | [`RagService::load_existing`] |
//! | `delete_document_index` | [`RagService::delete`] |
//! | `generate_rag_report` | [`RagService::rag_report`] |
//! | `compare_document_to_specification` | [`ComplianceEngine::compare`](crate::compliance::ComplianceEngine::compare) |
//! | `compare_multiple_documents_to_spec` | [`ComplianceEngine::compare_multiple`](crate::compliance::ComplianceEngine::compare_multiple) |
//! | `generate_compliance_report` | compare + [`report::render`] |

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::compliance::{CancelSignal, ComparisonResult, DocumentComparison};
use crate::error::{RagError, Result};
use crate::report::{self, ReportFormat};
use crate::service::RagService;
use crate::specification::SpecificationInput;

const DEFAULT_SPEC_NAME: &str = "Specification";

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

/// A callable operation exposed via `POST /tools/{name}`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Route name, lowercase with underscores.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema (`type: "object"`) describing the parameters.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. `params` has already passed [`validate_params`].
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// What a tool can reach while executing.
#[derive(Clone)]
pub struct ToolContext {
    pub service: Arc<RagService>,
    pub cancel: CancelSignal,
}

impl ToolContext {
    pub fn new(service: Arc<RagService>) -> Self {
        Self {
            service,
            cancel: CancelSignal::never(),
        }
    }

    /// Default threshold from `[compliance]`.
    fn default_threshold(&self) -> f32 {
        self.service.config().compliance.threshold
    }
}

/// Serializable tool info for `GET /tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// A registry holding every built-in tool.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(IngestDocumentTool));
        registry.register(Box::new(RagQueryTool));
        registry.register(Box::new(RagBatchQueryTool));
        registry.register(Box::new(DocumentSummaryTool));
        registry.register(Box::new(ExtractTablesTool));
        registry.register(Box::new(ListDocumentsTool));
        registry.register(Box::new(LoadIndexTool));
        registry.register(Box::new(DeleteIndexTool));
        registry.register(Box::new(RagReportTool));
        registry.register(Box::new(CompareDocumentTool));
        registry.register(Box::new(CompareMultipleTool));
        registry.register(Box::new(ComplianceReportTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn infos(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Parameter validation
// ═══════════════════════════════════════════════════════════════════════

/// Check `params` against a tool schema: required keys present, declared
/// types respected. Missing optional keys with a `default` are filled in.
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value> {
    let mut result = match params {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        _ => return Err(RagError::unsupported("parameters must be a JSON object")),
    };

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required.iter().filter_map(|v| v.as_str()) {
            if !result.contains_key(field) {
                return Err(RagError::unsupported(format!(
                    "missing required parameter: {}",
                    field
                )));
            }
        }
    }

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    for (name, prop) in &properties {
        match result.get(name) {
            Some(value) => {
                let types: Vec<&str> = match prop.get("type") {
                    Some(Value::String(t)) => vec![t.as_str()],
                    Some(Value::Array(ts)) => ts.iter().filter_map(|t| t.as_str()).collect(),
                    _ => Vec::new(),
                };
                if !types.is_empty() && !types.iter().any(|t| type_matches(t, value)) {
                    return Err(RagError::unsupported(format!(
                        "parameter '{}' must be of type '{}', got {}",
                        name,
                        types.join("|"),
                        json_type_name(value)
                    )));
                }
            }
            None => {
                if let Some(default) = prop.get("default") {
                    result.insert(name.clone(), default.clone());
                }
            }
        }
    }

    Ok(Value::Object(result))
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_u64() || value.is_i64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn str_param<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params[key]
        .as_str()
        .ok_or_else(|| RagError::unsupported(format!("parameter '{}' must be a string", key)))
}

fn opt_str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

fn usize_param(params: &Value, key: &str, default: usize) -> Result<usize> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_u64()
            .filter(|n| *n > 0)
            .map(|n| n as usize)
            .ok_or_else(|| {
                RagError::unsupported(format!("parameter '{}' must be a positive integer", key))
            }),
    }
}

fn string_list(params: &Value, key: &str) -> Result<Vec<String>> {
    params[key]
        .as_array()
        .ok_or_else(|| RagError::unsupported(format!("parameter '{}' must be an array", key)))?
        .iter()
        .map(|v| {
            v.as_str().map(str::to_string).ok_or_else(|| {
                RagError::unsupported(format!("parameter '{}' must contain strings", key))
            })
        })
        .collect()
}

fn threshold_param(params: &Value, ctx: &ToolContext) -> f32 {
    params
        .get("threshold")
        .and_then(|v| v.as_f64())
        .map(|t| t as f32)
        .unwrap_or_else(|| ctx.default_threshold())
}

fn specification_param(params: &Value) -> Result<SpecificationInput> {
    SpecificationInput::from_value(params["specifications"].clone())
}

fn statistics(result: &ComparisonResult) -> Value {
    json!({
        "total_requirements": result.total_requirements,
        "compliant": result.compliant_items,
        "partial": result.partial_items,
        "non_compliant": result.non_compliant_items,
        "unknown": result.unknown_items,
    })
}

fn specifications_schema() -> Value {
    json!({
        "type": ["array", "object"],
        "description": "List of requirement strings, or an object (optionally with a 'requirements' array)"
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Retrieval tools
// ═══════════════════════════════════════════════════════════════════════

pub struct IngestDocumentTool;

#[async_trait]
impl Tool for IngestDocumentTool {
    fn name(&self) -> &str {
        "ingest_document"
    }

    fn description(&self) -> &str {
        "Extract, chunk, embed, and index a document file"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "Path to the document" },
                "document_name": { "type": "string", "description": "Name to register the document under (defaults to the file stem)" }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let path = PathBuf::from(str_param(&params, "file_path")?);
        let outcome = ctx
            .service
            .ingest(&path, opt_str_param(&params, "document_name"))
            .await;
        Ok(serde_json::to_value(outcome)?)
    }
}

pub struct RagQueryTool;

#[async_trait]
impl Tool for RagQueryTool {
    fn name(&self) -> &str {
        "rag_query"
    }

    fn description(&self) -> &str {
        "Semantic search within one indexed document"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "document_name": { "type": "string" },
                "query": { "type": "string", "description": "Natural language query" },
                "top_k": { "type": "integer", "description": "Number of results", "default": 5 }
            },
            "required": ["document_name", "query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let top_k = usize_param(&params, "top_k", ctx.service.config().retrieval.top_k)?;
        let response = ctx
            .service
            .query(
                str_param(&params, "document_name")?,
                str_param(&params, "query")?,
                Some(top_k),
            )
            .await?;
        Ok(serde_json::to_value(response)?)
    }
}

pub struct RagBatchQueryTool;

#[async_trait]
impl Tool for RagBatchQueryTool {
    fn name(&self) -> &str {
        "rag_batch_query"
    }

    fn description(&self) -> &str {
        "Run one query against several indexed documents"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "document_names": { "type": "array", "items": { "type": "string" } },
                "query": { "type": "string" },
                "top_k": { "type": "integer", "description": "Results per document", "default": 3 }
            },
            "required": ["document_names", "query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let names = string_list(&params, "document_names")?;
        let top_k = usize_param(&params, "top_k", 3)?;
        let report = ctx
            .service
            .batch_query(&names, str_param(&params, "query")?, top_k)
            .await;
        Ok(serde_json::to_value(report)?)
    }
}

pub struct DocumentSummaryTool;

#[async_trait]
impl Tool for DocumentSummaryTool {
    fn name(&self) -> &str {
        "get_document_summary"
    }

    fn description(&self) -> &str {
        "Metadata and index statistics for one document"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "document_name": { "type": "string" } },
            "required": ["document_name"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let summary = ctx.service.summary(str_param(&params, "document_name")?)?;
        Ok(serde_json::to_value(summary)?)
    }
}

pub struct ExtractTablesTool;

#[async_trait]
impl Tool for ExtractTablesTool {
    fn name(&self) -> &str {
        "extract_tables_from_document"
    }

    fn description(&self) -> &str {
        "All tables found in a document (Excel sheets, Word tables)"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "document_name": { "type": "string" } },
            "required": ["document_name"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let tables = ctx.service.tables(str_param(&params, "document_name")?)?;
        Ok(serde_json::to_value(tables)?)
    }
}

pub struct ListDocumentsTool;

#[async_trait]
impl Tool for ListDocumentsTool {
    fn name(&self) -> &str {
        "list_indexed_documents"
    }

    fn description(&self) -> &str {
        "List every indexed document"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "required": [] })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        Ok(serde_json::to_value(ctx.service.list())?)
    }
}

pub struct LoadIndexTool;

#[async_trait]
impl Tool for LoadIndexTool {
    fn name(&self) -> &str {
        "load_existing_index"
    }

    fn description(&self) -> &str {
        "Register a previously persisted index artifact"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "document_name": { "type": "string" },
                "store_path": { "type": "string", "description": "Path to the .sqlite index artifact" }
            },
            "required": ["document_name", "store_path"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let path = PathBuf::from(str_param(&params, "store_path")?);
        let outcome = ctx
            .service
            .load_existing(str_param(&params, "document_name")?, &path)
            .await?;
        Ok(serde_json::to_value(outcome)?)
    }
}

pub struct DeleteIndexTool;

#[async_trait]
impl Tool for DeleteIndexTool {
    fn name(&self) -> &str {
        "delete_document_index"
    }

    fn description(&self) -> &str {
        "Delete a document's index and metadata"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "document_name": { "type": "string" } },
            "required": ["document_name"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let outcome = ctx
            .service
            .delete(str_param(&params, "document_name")?)
            .await?;
        Ok(serde_json::to_value(outcome)?)
    }
}

pub struct RagReportTool;

#[async_trait]
impl Tool for RagReportTool {
    fn name(&self) -> &str {
        "generate_rag_report"
    }

    fn description(&self) -> &str {
        "Run several queries against one document and collect the findings"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "document_name": { "type": "string" },
                "queries": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["document_name", "queries"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let queries = string_list(&params, "queries")?;
        let report = ctx
            .service
            .rag_report(str_param(&params, "document_name")?, &queries)
            .await?;
        Ok(serde_json::to_value(report)?)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Compliance tools
// ═══════════════════════════════════════════════════════════════════════

pub struct CompareDocumentTool;

#[async_trait]
impl Tool for CompareDocumentTool {
    fn name(&self) -> &str {
        "compare_document_to_specification"
    }

    fn description(&self) -> &str {
        "Check a document against a list of requirements"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "document_name": { "type": "string" },
                "specifications": specifications_schema(),
                "spec_name": { "type": "string", "default": DEFAULT_SPEC_NAME },
                "threshold": { "type": "number", "description": "Similarity threshold (0.0-1.0)" }
            },
            "required": ["document_name", "specifications"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let spec = specification_param(&params)?;
        let result = ctx
            .service
            .compliance_engine()
            .compare(
                str_param(&params, "document_name")?,
                &spec,
                opt_str_param(&params, "spec_name").unwrap_or(DEFAULT_SPEC_NAME),
                threshold_param(&params, ctx),
                &ctx.cancel,
            )
            .await?;

        let mut value = serde_json::to_value(&result)?;
        if let Value::Object(map) = &mut value {
            map.insert("success".into(), json!(true));
            map.insert("statistics".into(), statistics(&result));
        }
        Ok(value)
    }
}

pub struct CompareMultipleTool;

#[async_trait]
impl Tool for CompareMultipleTool {
    fn name(&self) -> &str {
        "compare_multiple_documents_to_spec"
    }

    fn description(&self) -> &str {
        "Check several documents against the same requirements"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "document_names": { "type": "array", "items": { "type": "string" } },
                "specifications": specifications_schema(),
                "spec_name": { "type": "string", "default": DEFAULT_SPEC_NAME },
                "threshold": { "type": "number" }
            },
            "required": ["document_names", "specifications"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let names = string_list(&params, "document_names")?;
        let spec = specification_param(&params)?;
        let spec_name = opt_str_param(&params, "spec_name").unwrap_or(DEFAULT_SPEC_NAME);
        let results = ctx
            .service
            .compliance_engine()
            .compare_multiple(&names, &spec, spec_name, threshold_param(&params, ctx), &ctx.cancel)
            .await?;

        let mut out = Map::new();
        for (name, comparison) in &results {
            let entry = match comparison {
                DocumentComparison::Completed(r) => json!({
                    "document_name": r.document_name,
                    "compliance_percentage": r.compliance_percentage,
                    "summary": r.summary,
                    "statistics": statistics(r),
                }),
                DocumentComparison::Failed { error } => json!({ "error": error }),
            };
            out.insert(name.clone(), entry);
        }

        Ok(json!({
            "success": true,
            "spec_name": spec_name,
            "documents_compared": names.len(),
            "results": out,
        }))
    }
}

pub struct ComplianceReportTool;

#[async_trait]
impl Tool for ComplianceReportTool {
    fn name(&self) -> &str {
        "generate_compliance_report"
    }

    fn description(&self) -> &str {
        "Compare a document against requirements and render a text, json, or html report"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "document_name": { "type": "string" },
                "specifications": specifications_schema(),
                "spec_name": { "type": "string", "default": DEFAULT_SPEC_NAME },
                "threshold": { "type": "number" },
                "format": { "type": "string", "description": "text, json, or html", "default": "text" }
            },
            "required": ["document_name", "specifications"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let format_name = opt_str_param(&params, "format").unwrap_or("text");
        let format: ReportFormat = format_name.parse()?;
        let document_name = str_param(&params, "document_name")?;
        let spec_name = opt_str_param(&params, "spec_name").unwrap_or(DEFAULT_SPEC_NAME);
        let spec = specification_param(&params)?;

        let result = ctx
            .service
            .compliance_engine()
            .compare(document_name, &spec, spec_name, threshold_param(&params, ctx), &ctx.cancel)
            .await?;

        Ok(json!({
            "success": true,
            "document_name": document_name,
            "spec_name": spec_name,
            "format": format_name,
            "report": report::render(&result, format)?,
        }))
    }
}
