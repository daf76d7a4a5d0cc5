//! MCP protocol messages.
//!
//! Params and result types for every method the session handles or sends.

use std::collections::HashMap;

use rapormcp_core::LoggingLevel;
use serde::{Deserialize, Serialize};

use crate::types::{
    ClientCapabilities, ClientInfo, Content, Prompt, PromptMessage, Resource, ResourceContent,
    ResourceTemplate, Role, Root, ServerCapabilities, ServerInfo, Tool,
};

// ============================================================================
// Request metadata
// ============================================================================

/// Correlates `notifications/progress` with the request that asked for them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    String(String),
    Number(i64),
}

impl From<String> for ProgressToken {
    fn from(token: String) -> Self {
        Self::String(token)
    }
}

impl From<&str> for ProgressToken {
    fn from(token: &str) -> Self {
        Self::String(token.to_string())
    }
}

impl From<i64> for ProgressToken {
    fn from(token: i64) -> Self {
        Self::Number(token)
    }
}

impl std::fmt::Display for ProgressToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(token) => f.write_str(token),
            Self::Number(token) => write!(f, "{token}"),
        }
    }
}

/// The `_meta` object of a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_token: Option<ProgressToken>,
}

// ============================================================================
// Initialize
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Version the client asked for; negotiated, never trusted as-is.
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ClientCapabilities,
    pub client_info: ClientInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: ServerInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

// ============================================================================
// Tools
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<Tool>,
}

/// `tools/call` params. Missing `arguments` validate as `{}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<RequestMeta>,
}

/// `tools/call` result. Tool failures are results with `isError` set, not
/// JSON-RPC errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<Content>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl CallToolResult {
    #[must_use]
    pub fn success(content: Vec<Content>) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    /// A flagged result carrying one text item.
    #[must_use]
    pub fn error_text(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            is_error: true,
        }
    }
}

// ============================================================================
// Resources
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResourcesResult {
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourceTemplatesResult {
    pub resource_templates: Vec<ResourceTemplate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceParams {
    pub uri: String,
}

/// `resources/read` result: one entry per piece of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceResult {
    pub contents: Vec<ResourceContent>,
}

// ============================================================================
// Prompts
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListPromptsResult {
    pub prompts: Vec<Prompt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPromptParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPromptResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub messages: Vec<PromptMessage>,
}

// ============================================================================
// Completion
// ============================================================================

/// What a `completion/complete` request is completing an argument of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CompletionReference {
    /// An argument of a prompt.
    #[serde(rename = "ref/prompt")]
    Prompt {
        /// Prompt name.
        name: String,
    },
    /// A placeholder of a resource template, keyed by the template string.
    #[serde(rename = "ref/resource")]
    Resource {
        /// The template's URI pattern.
        uri: String,
    },
    /// Any other reference kind.
    #[serde(other)]
    Unknown,
}

/// The argument being completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionArgument {
    /// Argument name.
    pub name: String,
    /// Partial value typed so far.
    pub value: String,
}

/// completion/complete request params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteParams {
    /// Completion target.
    #[serde(rename = "ref")]
    pub reference: CompletionReference,
    /// Argument being completed.
    pub argument: CompletionArgument,
}

/// Candidate values for a completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Candidate values, best first.
    pub values: Vec<String>,
    /// Total number of matches, which may exceed `values.len()`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    /// Whether more matches exist beyond `values`.
    #[serde(rename = "hasMore", skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

impl Completion {
    /// Builds a completion whose total is the number of values.
    #[must_use]
    pub fn from_values(values: Vec<String>) -> Self {
        let total = values.len();
        Self {
            values,
            total: Some(total),
            has_more: None,
        }
    }
}

/// completion/complete response result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteResult {
    /// The completion.
    pub completion: Completion,
}

// ============================================================================
// Logging
// ============================================================================

/// logging/setLevel request params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLevelParams {
    /// New threshold.
    pub level: LoggingLevel,
}

/// notifications/message params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessageParams {
    /// Severity of the entry.
    pub level: LoggingLevel,
    /// Logger name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    /// Payload.
    pub data: serde_json::Value,
}

// ============================================================================
// Notifications
// ============================================================================

/// notifications/cancelled params.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledParams {
    /// The request being cancelled.
    pub request_id: crate::RequestId,
    /// Optional reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// notifications/progress params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressParams {
    /// Token from the originating request's `_meta`.
    pub progress_token: ProgressToken,
    /// Progress so far.
    pub progress: f64,
    /// Total, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    /// Status message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressParams {
    /// Progress without a total.
    #[must_use]
    pub fn new(token: impl Into<ProgressToken>, progress: f64) -> Self {
        Self {
            progress_token: token.into(),
            progress,
            total: None,
            message: None,
        }
    }

    /// Sets the total.
    #[must_use]
    pub fn with_total(mut self, total: f64) -> Self {
        self.total = Some(total);
        self
    }

    /// Sets the status message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// ============================================================================
// Roots
// ============================================================================

/// roots/list response result (sent by the client).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRootsResult {
    /// Declared roots.
    #[serde(default)]
    pub roots: Vec<Root>,
}

// ============================================================================
// Sampling (server-to-client LLM requests)
// ============================================================================

/// One message of a sampling conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingMessage {
    /// Speaker.
    pub role: Role,
    /// Message content.
    pub content: Content,
}

impl SamplingMessage {
    /// A user text message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::text(text),
        }
    }
}

/// sampling/createMessage request params.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageParams {
    pub messages: Vec<SamplingMessage>,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    /// Passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_preferences: Option<serde_json::Value>,
}

impl CreateMessageParams {
    /// A request with default settings.
    #[must_use]
    pub fn new(messages: Vec<SamplingMessage>, max_tokens: u32) -> Self {
        Self {
            messages,
            max_tokens,
            system_prompt: None,
            temperature: None,
            stop_sequences: Vec::new(),
            model_preferences: None,
        }
    }

    /// Sets the system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// sampling/createMessage response result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageResult {
    pub content: Content,
    pub role: Role,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_tool_params_read_progress_token() {
        let params: CallToolParams = serde_json::from_value(json!({
            "name": "rata_rata_nilai",
            "arguments": {"siswaId": 1},
            "_meta": {"progressToken": "tok-1"}
        }))
        .unwrap();
        assert_eq!(
            params.meta.and_then(|m| m.progress_token),
            Some(ProgressToken::from("tok-1"))
        );
    }

    #[test]
    fn call_tool_result_flags_errors_only_when_set() {
        let ok = serde_json::to_value(CallToolResult::success(vec![Content::text("hi")])).unwrap();
        assert!(ok.get("isError").is_none());

        let err = serde_json::to_value(CallToolResult::error_text("nope")).unwrap();
        assert_eq!(err["isError"], true);
        assert_eq!(err["content"][0]["text"], "nope");
    }

    #[test]
    fn completion_reference_kinds() {
        let prompt: CompletionReference =
            serde_json::from_value(json!({"type": "ref/prompt", "name": "ringkasan_rapor"}))
                .unwrap();
        assert_eq!(
            prompt,
            CompletionReference::Prompt {
                name: "ringkasan_rapor".into()
            }
        );

        let resource: CompletionReference =
            serde_json::from_value(json!({"type": "ref/resource", "uri": "rapor://siswa/{id}/nilai"}))
                .unwrap();
        assert!(matches!(resource, CompletionReference::Resource { .. }));

        let other: CompletionReference =
            serde_json::from_value(json!({"type": "ref/tool"})).unwrap();
        assert_eq!(other, CompletionReference::Unknown);
    }

    #[test]
    fn completion_from_values_sets_total() {
        let completion = Completion::from_values(vec!["a".into(), "b".into()]);
        assert_eq!(completion.total, Some(2));
        let value = serde_json::to_value(completion).unwrap();
        assert!(value.get("hasMore").is_none());
    }

    #[test]
    fn progress_params_serialization() {
        let params = ProgressParams::new(7i64, 2.0)
            .with_total(4.0)
            .with_message("half");
        assert_eq!(
            serde_json::to_value(params).unwrap(),
            json!({"progressToken": 7, "progress": 2.0, "total": 4.0, "message": "half"})
        );
    }

    #[test]
    fn set_level_params_reject_unknown_levels() {
        assert!(serde_json::from_value::<SetLevelParams>(json!({"level": "debug"})).is_ok());
        assert!(serde_json::from_value::<SetLevelParams>(json!({"level": "loud"})).is_err());
    }

    #[test]
    fn create_message_round_trip() {
        let params = CreateMessageParams::new(vec![SamplingMessage::user("Halo")], 100)
            .with_system_prompt("Jawab singkat");
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["maxTokens"], 100);
        assert_eq!(value["messages"][0]["content"]["text"], "Halo");

        let result: CreateMessageResult = serde_json::from_value(json!({
            "role": "assistant",
            "content": {"type": "text", "text": "Hai"},
            "model": "test-model"
        }))
        .unwrap();
        assert_eq!(result.content.as_text(), Some("Hai"));
        assert!(result.stop_reason.is_none());
    }

    #[test]
    fn list_roots_tolerates_missing_field() {
        let result: ListRootsResult = serde_json::from_value(json!({})).unwrap();
        assert!(result.roots.is_empty());
    }
}
