//! Capability registry and request routing.
//!
//! The [`Router`] is filled by the [`ServerBuilder`](crate::ServerBuilder)
//! and shared read-only by every session afterwards. Lookups are first-match
//! in registration order; duplicates are kept but unreachable.

use std::collections::HashMap;
use std::sync::Arc;

use rapormcp_core::logging::{debug, targets, trace, warn};
use rapormcp_core::{McpContext, McpError, McpErrorCode, McpResult};
use rapormcp_protocol::schema::describe_issues;
use rapormcp_protocol::{
    CallToolParams, CallToolResult, CompleteParams, CompleteResult, CompletionReference,
    CompletionsCapability, Content, GetPromptParams, GetPromptResult, ListPromptsResult,
    ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, LoggingCapability, Prompt,
    PromptMessage, PromptsCapability, ReadResourceParams, ReadResourceResult, Resource,
    ResourceTemplate, ResourcesCapability, Role, ServerCapabilities, Tool, ToolsCapability,
    validate,
};
use serde_json::{Value, json};
use tokio::task::JoinError;

use crate::handler::{
    ContentDefaults, PromptHandler, ResourceHandler, ResourceTemplateHandler, ToolError,
    ToolHandler, UriParams,
};

/// Registered tools, resources, templates and prompts.
#[derive(Default)]
pub struct Router {
    tools: Vec<Arc<dyn ToolHandler>>,
    resources: Vec<Arc<dyn ResourceHandler>>,
    templates: Vec<TemplateEntry>,
    prompts: Vec<Arc<dyn PromptHandler>>,
}

struct TemplateEntry {
    matcher: UriTemplate,
    handler: Arc<dyn ResourceTemplateHandler>,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tool<H: ToolHandler + 'static>(&mut self, handler: H) {
        self.tools.push(Arc::new(handler));
    }

    pub fn add_resource<H: ResourceHandler + 'static>(&mut self, handler: H) {
        self.resources.push(Arc::new(handler));
    }

    pub fn add_resource_template<H: ResourceTemplateHandler + 'static>(&mut self, handler: H) {
        let matcher = UriTemplate::new(&handler.definition().uri_template);
        self.templates.push(TemplateEntry {
            matcher,
            handler: Arc::new(handler),
        });
    }

    pub fn add_prompt<H: PromptHandler + 'static>(&mut self, handler: H) {
        self.prompts.push(Arc::new(handler));
    }

    #[must_use]
    pub fn tools(&self) -> Vec<Tool> {
        self.tools.iter().map(|h| h.definition()).collect()
    }

    #[must_use]
    pub fn resources(&self) -> Vec<Resource> {
        self.resources.iter().map(|h| h.definition()).collect()
    }

    #[must_use]
    pub fn resource_templates(&self) -> Vec<ResourceTemplate> {
        self.templates.iter().map(|e| e.handler.definition()).collect()
    }

    #[must_use]
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.iter().map(|h| h.definition()).collect()
    }

    /// Capability flags derived from what is registered.
    ///
    /// Logging is always offered. Completion is offered when there is
    /// anything to complete against.
    #[must_use]
    pub fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: (!self.tools.is_empty()).then(ToolsCapability::default),
            resources: (!self.resources.is_empty() || !self.templates.is_empty())
                .then(ResourcesCapability::default),
            prompts: (!self.prompts.is_empty()).then(PromptsCapability::default),
            logging: Some(LoggingCapability {}),
            completions: (!self.prompts.is_empty() || !self.templates.is_empty())
                .then_some(CompletionsCapability {}),
        }
    }

    fn find_tool(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.tools.iter().find(|h| h.definition().name == name)
    }

    fn find_prompt(&self, name: &str) -> Option<&Arc<dyn PromptHandler>> {
        self.prompts.iter().find(|h| h.definition().name == name)
    }

    // ========================================================================
    // Tools
    // ========================================================================

    /// Handles `tools/list`. Tools without a schema advertise a permissive
    /// object schema.
    #[must_use]
    pub fn handle_tools_list(&self) -> ListToolsResult {
        let tools = self
            .tools()
            .into_iter()
            .map(|mut tool| {
                if tool.input_schema.is_null() {
                    tool.input_schema = json!({ "type": "object" });
                }
                tool
            })
            .collect();
        ListToolsResult { tools }
    }

    /// Handles `tools/call`.
    ///
    /// Only lookup and argument validation fail at the protocol level.
    /// Everything that goes wrong while the tool runs (errors, panics,
    /// timeouts) comes back as content with `isError` set.
    pub async fn handle_tools_call(
        &self,
        ctx: McpContext,
        params: CallToolParams,
    ) -> McpResult<CallToolResult> {
        debug!(target: targets::HANDLER, "Calling tool: {}", params.name);
        trace!(target: targets::HANDLER, "Tool arguments: {:?}", params.arguments);

        let handler = self
            .find_tool(&params.name)
            .ok_or_else(|| McpError::method_not_found(format!("Unknown tool: {}", params.name)))?;

        let arguments = params.arguments.unwrap_or_else(|| json!({}));
        let definition = handler.definition();
        if !definition.input_schema.is_null() {
            if let Err(issues) = validate(&definition.input_schema, &arguments) {
                return Err(McpError::invalid_params(format!(
                    "Input validation failed: {}",
                    describe_issues(&issues)
                ))
                .with_data(json!({ "issues": issues })));
            }
        }

        let handler = Arc::clone(handler);
        let timeout = handler.timeout();
        let mut task = tokio::spawn(async move { handler.call_async(&ctx, arguments).await });

        let joined = match timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    // The task keeps running detached; its result is dropped.
                    warn!(
                        target: targets::HANDLER,
                        "Tool {} timed out after {}ms", params.name, limit.as_millis()
                    );
                    return Ok(CallToolResult::error_text(format!(
                        "Tool execution timed out after {}ms",
                        limit.as_millis()
                    )));
                }
            },
            None => task.await,
        };

        Ok(match joined {
            Ok(Ok(output)) => CallToolResult::success(output.normalize()),
            Ok(Err(ToolError::User(message))) => CallToolResult::error_text(message),
            Ok(Err(ToolError::Other(err))) => {
                debug!(target: targets::HANDLER, "Tool {} failed: {}", params.name, err);
                CallToolResult::error_text(format!("Error: {err}"))
            }
            Err(join) => {
                warn!(target: targets::HANDLER, "Tool {} panicked", params.name);
                CallToolResult::error_text(format!("Error: {}", panic_message(join)))
            }
        })
    }

    // ========================================================================
    // Resources
    // ========================================================================

    #[must_use]
    pub fn handle_resources_list(&self) -> ListResourcesResult {
        ListResourcesResult {
            resources: self.resources(),
        }
    }

    #[must_use]
    pub fn handle_resource_templates_list(&self) -> ListResourceTemplatesResult {
        ListResourceTemplatesResult {
            resource_templates: self.resource_templates(),
        }
    }

    /// Handles `resources/read`: exact URI first, then templates in
    /// registration order.
    pub async fn handle_resources_read(
        &self,
        ctx: &McpContext,
        params: ReadResourceParams,
    ) -> McpResult<ReadResourceResult> {
        let uri = params.uri;
        debug!(target: targets::HANDLER, "Reading resource: {}", uri);

        if let Some(handler) = self.resources.iter().find(|h| h.definition().uri == uri) {
            let definition = handler.definition();
            let output = handler
                .read_async(ctx)
                .await
                .map_err(|err| read_failure(&uri, err))?;
            let defaults = ContentDefaults {
                uri: &uri,
                name: Some(&definition.name),
                mime_type: definition.mime_type.as_deref(),
            };
            return Ok(ReadResourceResult {
                contents: output.into_contents(&defaults),
            });
        }

        for entry in &self.templates {
            let Some(values) = entry.matcher.matches(&uri) else {
                continue;
            };
            trace!(target: targets::ROUTER, "{} matched template {}", uri, entry.matcher.pattern);
            let definition = entry.handler.definition();
            let output = entry
                .handler
                .read_async(ctx, &uri, &values)
                .await
                .map_err(|err| read_failure(&uri, err))?;
            let defaults = ContentDefaults {
                uri: &uri,
                name: Some(&definition.name),
                mime_type: definition.mime_type.as_deref(),
            };
            return Ok(ReadResourceResult {
                contents: output.into_contents(&defaults),
            });
        }

        Err(McpError::method_not_found(format!("Resource not found: {uri}")))
    }

    // ========================================================================
    // Prompts
    // ========================================================================

    #[must_use]
    pub fn handle_prompts_list(&self) -> ListPromptsResult {
        ListPromptsResult {
            prompts: self.prompts(),
        }
    }

    /// Handles `prompts/get`. The rendered text becomes one user message.
    pub async fn handle_prompts_get(
        &self,
        ctx: &McpContext,
        params: GetPromptParams,
    ) -> McpResult<GetPromptResult> {
        let handler = self
            .find_prompt(&params.name)
            .ok_or_else(|| McpError::method_not_found(format!("Unknown prompt: {}", params.name)))?;
        let definition = handler.definition();
        let arguments = params.arguments.unwrap_or_default();

        if let Some(missing) = definition
            .arguments
            .iter()
            .find(|arg| arg.required && !arguments.contains_key(&arg.name))
        {
            return Err(McpError::invalid_request(format!(
                "Missing required argument: {}",
                missing.name
            )));
        }

        let text = handler.get_async(ctx, arguments).await.map_err(|err| {
            McpError::internal_error(format!("Failed to load prompt {}: {}", definition.name, err.message))
        })?;

        Ok(GetPromptResult {
            description: definition.description,
            messages: vec![PromptMessage {
                role: Role::User,
                content: Content::text(text),
            }],
        })
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Handles `completion/complete`. Templates are matched by their exact
    /// template string, not by URI expansion.
    pub async fn handle_complete(&self, params: CompleteParams) -> McpResult<CompleteResult> {
        let argument = &params.argument;
        let completion = match &params.reference {
            CompletionReference::Prompt { name } => {
                let handler = self
                    .find_prompt(name)
                    .ok_or_else(|| McpError::unexpected_state(format!("Unknown prompt: {name}")))?;
                if !handler.supports_completion() {
                    return Err(McpError::unexpected_state("Prompt does not support completion"));
                }
                handler.complete(&argument.name, &argument.value).await?
            }
            CompletionReference::Resource { uri } => {
                let entry = self
                    .templates
                    .iter()
                    .find(|e| e.matcher.pattern == *uri)
                    .ok_or_else(|| McpError::unexpected_state(format!("Unknown resource: {uri}")))?;
                if !entry.handler.supports_completion() {
                    return Err(McpError::unexpected_state("Resource does not support completion"));
                }
                entry.handler.complete(&argument.name, &argument.value).await?
            }
            CompletionReference::Unknown => {
                return Err(McpError::unexpected_state("Unexpected completion request"));
            }
        };
        Ok(CompleteResult { completion })
    }
}

fn read_failure(uri: &str, err: McpError) -> McpError {
    McpError::new(
        McpErrorCode::InternalError,
        format!("Failed to read resource {uri}: {}", err.message),
    )
    .with_data(json!({ "uri": uri }))
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "tool panicked".to_string()
    }
}

// ============================================================================
// URI templates
// ============================================================================

/// A `{placeholder}` URI pattern.
///
/// Each placeholder matches a non-empty run of characters up to the next
/// literal part of the pattern and never crosses a `/`.
#[derive(Debug, Clone)]
struct UriTemplate {
    pattern: String,
    segments: Vec<UriSegment>,
}

#[derive(Debug, Clone)]
enum UriSegment {
    Literal(String),
    Param(String),
}

impl UriTemplate {
    fn new(pattern: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = pattern.chars();

        while let Some(ch) = chars.next() {
            if ch != '{' {
                literal.push(ch);
                continue;
            }
            let name: String = chars.by_ref().take_while(|c| *c != '}').collect();
            if name.is_empty() {
                literal.push_str("{}");
                continue;
            }
            if !literal.is_empty() {
                segments.push(UriSegment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(UriSegment::Param(name));
        }
        if !literal.is_empty() {
            segments.push(UriSegment::Literal(literal));
        }

        Self {
            pattern: pattern.to_string(),
            segments,
        }
    }

    fn matches(&self, uri: &str) -> Option<UriParams> {
        let mut params = HashMap::new();
        let mut remainder = uri;
        let mut iter = self.segments.iter().peekable();

        while let Some(segment) = iter.next() {
            match segment {
                UriSegment::Literal(lit) => {
                    remainder = remainder.strip_prefix(lit.as_str())?;
                }
                UriSegment::Param(name) => {
                    // Bound the value by the segment end, then by the next literal.
                    let segment_end = remainder.find('/').unwrap_or(remainder.len());
                    let end = match iter.peek() {
                        Some(UriSegment::Literal(lit)) => remainder[..segment_end]
                            .find(lit.as_str())
                            .or_else(|| remainder[segment_end..].starts_with(lit.as_str()).then_some(segment_end))?,
                        // Adjacent placeholders are ambiguous.
                        Some(UriSegment::Param(_)) => return None,
                        None => segment_end,
                    };
                    if end == 0 {
                        return None;
                    }
                    params.insert(name.clone(), remainder[..end].to_string());
                    remainder = &remainder[end..];
                }
            }
        }

        remainder.is_empty().then_some(params)
    }
}
