//! Handler traits for tools, resources, resource templates and prompts.
//!
//! The router only ever calls the async methods. For most servers the
//! closure-backed types at the bottom of this module ([`FunctionTool`],
//! [`FunctionResource`], [`FunctionResourceTemplate`], [`FunctionPrompt`])
//! are enough; implement the traits directly for handlers that carry their
//! own state.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rapormcp_core::{McpContext, McpError, McpResult};
use rapormcp_protocol::{
    Completion, Content, Prompt, PromptArgument, Resource, ResourceContent, ResourceTemplate, Tool,
    ToolAnnotations,
};
use serde_json::Value;

use crate::completion::fuzzy_complete;

/// A boxed future for async handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Placeholder values extracted from a URI by a resource template.
pub type UriParams = HashMap<String, String>;

/// Produces completion candidates for a partially typed argument value.
pub type Completer = Arc<dyn Fn(String) -> BoxFuture<'static, McpResult<Completion>> + Send + Sync>;

/// Wraps an async closure as a [`Completer`].
pub fn completer<F, Fut>(f: F) -> Completer
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = McpResult<Completion>> + Send + 'static,
{
    Arc::new(move |value| Box::pin(f(value)))
}

// ============================================================================
// Tool results
// ============================================================================

/// What a tool returns on success.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Plain text, sent as one text item.
    Text(String),
    /// A single content item.
    Content(Content),
    /// A full content list.
    Contents(Vec<Content>),
}

impl ToolOutput {
    /// Plain text output.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Pretty-printed JSON as text output.
    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self, ToolError> {
        Ok(Self::Text(serde_json::to_string_pretty(value)?))
    }

    /// Maps the output to the canonical content list.
    #[must_use]
    pub fn normalize(self) -> Vec<Content> {
        match self {
            Self::Text(text) => vec![Content::text(text)],
            Self::Content(content) => vec![content],
            Self::Contents(contents) => contents,
        }
    }
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Content> for ToolOutput {
    fn from(content: Content) -> Self {
        Self::Content(content)
    }
}

impl From<Vec<Content>> for ToolOutput {
    fn from(contents: Vec<Content>) -> Self {
        Self::Contents(contents)
    }
}

/// Why a tool failed. Both variants reach the client as content with
/// `isError` set, never as a JSON-RPC error.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// A message meant for the caller, sent verbatim.
    #[error("{0}")]
    User(String),
    /// Any other failure, sent as `Error: <details>`.
    #[error("{0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl ToolError {
    /// A caller-facing error.
    #[must_use]
    pub fn user(message: impl Into<String>) -> Self {
        Self::User(message.into())
    }

    /// Wraps any error.
    pub fn other(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Other(err.into())
    }
}

impl From<McpError> for ToolError {
    fn from(err: McpError) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

// ============================================================================
// Resource results
// ============================================================================

/// One piece of resource content as produced by a loader.
///
/// Unset `uri`, `name` and `mime_type` are filled in from the resource (or
/// template) definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceData {
    pub text: Option<String>,
    pub blob: Option<String>,
    pub uri: Option<String>,
    pub name: Option<String>,
    pub mime_type: Option<String>,
}

impl ResourceData {
    /// Text content.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Base64 binary content.
    #[must_use]
    pub fn blob(blob: impl Into<String>) -> Self {
        Self {
            blob: Some(blob.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    fn into_content(self, defaults: &ContentDefaults<'_>) -> ResourceContent {
        ResourceContent {
            uri: self.uri.unwrap_or_else(|| defaults.uri.to_string()),
            name: self.name.or_else(|| defaults.name.map(str::to_string)),
            mime_type: self
                .mime_type
                .or_else(|| defaults.mime_type.map(str::to_string)),
            text: self.text,
            blob: self.blob,
        }
    }
}

/// What a resource loader returns: one entry or several.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceOutput {
    Single(ResourceData),
    Multiple(Vec<ResourceData>),
}

/// Fields inherited by content entries that do not set them.
pub(crate) struct ContentDefaults<'a> {
    pub uri: &'a str,
    pub name: Option<&'a str>,
    pub mime_type: Option<&'a str>,
}

impl ResourceOutput {
    pub(crate) fn into_contents(self, defaults: &ContentDefaults<'_>) -> Vec<ResourceContent> {
        match self {
            Self::Single(data) => vec![data.into_content(defaults)],
            Self::Multiple(entries) => entries
                .into_iter()
                .map(|data| data.into_content(defaults))
                .collect(),
        }
    }
}

impl From<ResourceData> for ResourceOutput {
    fn from(data: ResourceData) -> Self {
        Self::Single(data)
    }
}

impl From<Vec<ResourceData>> for ResourceOutput {
    fn from(entries: Vec<ResourceData>) -> Self {
        Self::Multiple(entries)
    }
}

// ============================================================================
// Handler traits
// ============================================================================

/// Handler for a tool.
pub trait ToolHandler: Send + Sync {
    /// Returns the tool definition. An `input_schema` of `null` means the
    /// tool accepts any arguments.
    fn definition(&self) -> Tool;

    /// Execution deadline. `None` runs the tool unbounded.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Runs the tool with arguments that already passed schema validation.
    fn call_async<'a>(
        &'a self,
        ctx: &'a McpContext,
        arguments: Value,
    ) -> BoxFuture<'a, Result<ToolOutput, ToolError>>;
}

/// Handler for a resource with a fixed URI.
pub trait ResourceHandler: Send + Sync {
    /// Returns the resource definition.
    fn definition(&self) -> Resource;

    /// Loads the resource.
    fn read_async<'a>(&'a self, ctx: &'a McpContext) -> BoxFuture<'a, McpResult<ResourceOutput>>;
}

/// Handler for a family of resources addressed by a URI template.
pub trait ResourceTemplateHandler: Send + Sync {
    /// Returns the template definition.
    fn definition(&self) -> ResourceTemplate;

    /// Loads the resource at `uri`, with the placeholder values extracted
    /// from it.
    fn read_async<'a>(
        &'a self,
        ctx: &'a McpContext,
        uri: &'a str,
        params: &'a UriParams,
    ) -> BoxFuture<'a, McpResult<ResourceOutput>>;

    /// Whether any placeholder offers completion.
    fn supports_completion(&self) -> bool {
        false
    }

    /// Completes a placeholder value.
    fn complete<'a>(&'a self, _argument: &'a str, _value: &'a str) -> BoxFuture<'a, McpResult<Completion>> {
        Box::pin(async { Ok(Completion::default()) })
    }
}

/// Handler for a prompt.
pub trait PromptHandler: Send + Sync {
    /// Returns the prompt definition.
    fn definition(&self) -> Prompt;

    /// Renders the prompt text. Required arguments are checked by the router
    /// before this is called.
    fn get_async<'a>(
        &'a self,
        ctx: &'a McpContext,
        arguments: HashMap<String, String>,
    ) -> BoxFuture<'a, McpResult<String>>;

    /// Whether any argument offers completion.
    fn supports_completion(&self) -> bool {
        false
    }

    /// Completes an argument value.
    fn complete<'a>(&'a self, _argument: &'a str, _value: &'a str) -> BoxFuture<'a, McpResult<Completion>> {
        Box::pin(async { Ok(Completion::default()) })
    }
}

// ============================================================================
// Closure-backed handlers
// ============================================================================

type ToolFn = Arc<dyn Fn(McpContext, Value) -> BoxFuture<'static, Result<ToolOutput, ToolError>> + Send + Sync>;
type ResourceFn = Arc<dyn Fn(McpContext) -> BoxFuture<'static, McpResult<ResourceOutput>> + Send + Sync>;
type TemplateFn =
    Arc<dyn Fn(McpContext, String, UriParams) -> BoxFuture<'static, McpResult<ResourceOutput>> + Send + Sync>;
type PromptFn =
    Arc<dyn Fn(McpContext, HashMap<String, String>) -> BoxFuture<'static, McpResult<String>> + Send + Sync>;

/// A tool backed by an async closure.
///
/// ```ignore
/// let tool = FunctionTool::new("echo", |_ctx, args| async move {
///     Ok(ToolOutput::text(args["text"].as_str().unwrap_or_default()))
/// })
/// .description("Echo the input")
/// .input_schema(json!({"type": "object", "properties": {"text": {"type": "string"}}}))
/// .timeout(Duration::from_secs(5));
/// ```
#[derive(Clone)]
pub struct FunctionTool {
    definition: Tool,
    timeout: Option<Duration>,
    run: ToolFn,
}

impl FunctionTool {
    pub fn new<F, Fut>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(McpContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
    {
        Self {
            definition: Tool {
                name: name.into(),
                description: None,
                input_schema: Value::Null,
                annotations: None,
            },
            timeout: None,
            run: Arc::new(move |ctx, args| Box::pin(run(ctx, args))),
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.definition.description = Some(description.into());
        self
    }

    /// JSON Schema the arguments are validated against.
    #[must_use]
    pub fn input_schema(mut self, schema: Value) -> Self {
        self.definition.input_schema = schema;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn annotations(mut self, annotations: ToolAnnotations) -> Self {
        self.definition.annotations = Some(annotations);
        self
    }
}

impl ToolHandler for FunctionTool {
    fn definition(&self) -> Tool {
        self.definition.clone()
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn call_async<'a>(
        &'a self,
        ctx: &'a McpContext,
        arguments: Value,
    ) -> BoxFuture<'a, Result<ToolOutput, ToolError>> {
        (self.run)(ctx.clone(), arguments)
    }
}

/// A fixed-URI resource backed by an async closure.
#[derive(Clone)]
pub struct FunctionResource {
    definition: Resource,
    load: ResourceFn,
}

impl FunctionResource {
    pub fn new<F, Fut>(uri: impl Into<String>, name: impl Into<String>, load: F) -> Self
    where
        F: Fn(McpContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<ResourceOutput>> + Send + 'static,
    {
        Self {
            definition: Resource {
                uri: uri.into(),
                name: name.into(),
                description: None,
                mime_type: None,
            },
            load: Arc::new(move |ctx| Box::pin(load(ctx))),
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.definition.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.definition.mime_type = Some(mime_type.into());
        self
    }
}

impl ResourceHandler for FunctionResource {
    fn definition(&self) -> Resource {
        self.definition.clone()
    }

    fn read_async<'a>(&'a self, ctx: &'a McpContext) -> BoxFuture<'a, McpResult<ResourceOutput>> {
        (self.load)(ctx.clone())
    }
}

/// A resource template backed by an async closure, with optional
/// per-placeholder completers.
#[derive(Clone)]
pub struct FunctionResourceTemplate {
    definition: ResourceTemplate,
    load: TemplateFn,
    completers: Vec<(String, Completer)>,
}

impl FunctionResourceTemplate {
    pub fn new<F, Fut>(uri_template: impl Into<String>, name: impl Into<String>, load: F) -> Self
    where
        F: Fn(McpContext, String, UriParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<ResourceOutput>> + Send + 'static,
    {
        Self {
            definition: ResourceTemplate {
                uri_template: uri_template.into(),
                name: name.into(),
                description: None,
                mime_type: None,
            },
            load: Arc::new(move |ctx, uri, params| Box::pin(load(ctx, uri, params))),
            completers: Vec::new(),
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.definition.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.definition.mime_type = Some(mime_type.into());
        self
    }

    /// Registers a completer for the placeholder `argument`.
    #[must_use]
    pub fn complete_with(mut self, argument: impl Into<String>, completer: Completer) -> Self {
        self.completers.push((argument.into(), completer));
        self
    }
}

impl ResourceTemplateHandler for FunctionResourceTemplate {
    fn definition(&self) -> ResourceTemplate {
        self.definition.clone()
    }

    fn read_async<'a>(
        &'a self,
        ctx: &'a McpContext,
        uri: &'a str,
        params: &'a UriParams,
    ) -> BoxFuture<'a, McpResult<ResourceOutput>> {
        (self.load)(ctx.clone(), uri.to_string(), params.clone())
    }

    fn supports_completion(&self) -> bool {
        !self.completers.is_empty()
    }

    fn complete<'a>(&'a self, argument: &'a str, value: &'a str) -> BoxFuture<'a, McpResult<Completion>> {
        let completer = self
            .completers
            .iter()
            .find(|(name, _)| name == argument)
            .map(|(_, completer)| Arc::clone(completer));
        let value = value.to_string();
        Box::pin(async move {
            match completer {
                Some(completer) => completer(value).await,
                None => Ok(Completion::default()),
            }
        })
    }
}

/// Declaration of one prompt argument.
#[derive(Clone)]
pub struct PromptArgumentSpec {
    name: String,
    description: Option<String>,
    required: bool,
    values: Option<Vec<String>>,
    completer: Option<Completer>,
}

impl PromptArgumentSpec {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            required: false,
            values: None,
            completer: None,
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Restricts the argument to a fixed set of values. Completion matches
    /// against them fuzzily.
    #[must_use]
    pub fn enumeration<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Completes the argument with a custom function. Takes precedence over
    /// an enumeration.
    #[must_use]
    pub fn complete_with(mut self, completer: Completer) -> Self {
        self.completer = Some(completer);
        self
    }

    fn supports_completion(&self) -> bool {
        self.completer.is_some() || self.values.is_some()
    }

    fn to_argument(&self) -> PromptArgument {
        PromptArgument {
            name: self.name.clone(),
            description: self.description.clone(),
            required: self.required,
        }
    }
}

/// A prompt backed by an async closure returning the message text.
#[derive(Clone)]
pub struct FunctionPrompt {
    name: String,
    description: Option<String>,
    arguments: Vec<PromptArgumentSpec>,
    load: PromptFn,
}

impl FunctionPrompt {
    pub fn new<F, Fut>(name: impl Into<String>, load: F) -> Self
    where
        F: Fn(McpContext, HashMap<String, String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: None,
            arguments: Vec::new(),
            load: Arc::new(move |ctx, args| Box::pin(load(ctx, args))),
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Appends an argument declaration.
    #[must_use]
    pub fn argument(mut self, argument: PromptArgumentSpec) -> Self {
        self.arguments.push(argument);
        self
    }
}

impl PromptHandler for FunctionPrompt {
    fn definition(&self) -> Prompt {
        Prompt {
            name: self.name.clone(),
            description: self.description.clone(),
            arguments: self.arguments.iter().map(PromptArgumentSpec::to_argument).collect(),
        }
    }

    fn get_async<'a>(
        &'a self,
        ctx: &'a McpContext,
        arguments: HashMap<String, String>,
    ) -> BoxFuture<'a, McpResult<String>> {
        (self.load)(ctx.clone(), arguments)
    }

    fn supports_completion(&self) -> bool {
        self.arguments.iter().any(PromptArgumentSpec::supports_completion)
    }

    fn complete<'a>(&'a self, argument: &'a str, value: &'a str) -> BoxFuture<'a, McpResult<Completion>> {
        let spec = self.arguments.iter().find(|spec| spec.name == argument);
        Box::pin(async move {
            let Some(spec) = spec else {
                return Ok(Completion::default());
            };
            if let Some(completer) = &spec.completer {
                return completer(value.to_string()).await;
            }
            Ok(spec
                .values
                .as_deref()
                .map(|values| fuzzy_complete(values, value))
                .unwrap_or_default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_output_normalization() {
        assert_eq!(ToolOutput::text("hi").normalize(), vec![Content::text("hi")]);
        assert_eq!(
            ToolOutput::from(Content::image("AA==", "image/png")).normalize(),
            vec![Content::image("AA==", "image/png")]
        );
        let list = vec![Content::text("a"), Content::audio("BB==", "audio/wav")];
        assert_eq!(ToolOutput::from(list.clone()).normalize(), list);
    }

    #[test]
    fn tool_output_json_is_pretty_text() {
        let output = ToolOutput::json(&json!({"id": 1})).unwrap();
        let ToolOutput::Text(text) = output else {
            panic!("expected text");
        };
        assert!(text.contains("\"id\": 1"));
    }

    #[test]
    fn tool_error_messages() {
        assert_eq!(ToolError::user("Nilai tidak ditemukan").to_string(), "Nilai tidak ditemukan");
        let other = ToolError::other("backend down");
        assert!(matches!(other, ToolError::Other(_)));
        assert_eq!(other.to_string(), "backend down");
        let from_mcp: ToolError = McpError::internal_error("boom").into();
        assert!(from_mcp.to_string().contains("boom"));
    }

    #[test]
    fn resource_entries_inherit_defaults() {
        let defaults = ContentDefaults {
            uri: "file:///x",
            name: Some("x"),
            mime_type: Some("text/plain"),
        };
        let contents = ResourceOutput::from(vec![
            ResourceData::text("a"),
            ResourceData::text("b").with_uri("file:///x/b").with_mime_type("text/markdown"),
        ])
        .into_contents(&defaults);

        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].uri, "file:///x");
        assert_eq!(contents[0].name.as_deref(), Some("x"));
        assert_eq!(contents[0].mime_type.as_deref(), Some("text/plain"));
        assert_eq!(contents[1].uri, "file:///x/b");
        assert_eq!(contents[1].mime_type.as_deref(), Some("text/markdown"));
        assert_eq!(contents[1].text.as_deref(), Some("b"));
    }

    #[test]
    fn function_tool_definition() {
        let tool = FunctionTool::new("echo", |_ctx, _args| async { Ok(ToolOutput::text("x")) })
            .description("Echo")
            .timeout(Duration::from_millis(250));
        let def = tool.definition();
        assert_eq!(def.name, "echo");
        assert_eq!(def.description.as_deref(), Some("Echo"));
        assert!(def.input_schema.is_null());
        assert_eq!(ToolHandler::timeout(&tool), Some(Duration::from_millis(250)));
    }

    #[tokio::test]
    async fn function_tool_runs_closure() {
        let tool = FunctionTool::new("echo", |_ctx, args: Value| async move {
            Ok(ToolOutput::text(args["text"].as_str().unwrap_or_default().to_string()))
        });
        let ctx = McpContext::new(1);
        let output = tool.call_async(&ctx, json!({"text": "halo"})).await.unwrap();
        assert_eq!(output, ToolOutput::text("halo"));
    }

    #[tokio::test]
    async fn prompt_completion_prefers_completer_then_enum() {
        let prompt = FunctionPrompt::new("p", |_ctx, _args| async { Ok(String::new()) })
            .argument(PromptArgumentSpec::new("gaya").enumeration(["singkat", "lengkap"]))
            .argument(PromptArgumentSpec::new("siswa").required().complete_with(completer(
                |value: String| async move { Ok(Completion::from_values(vec![format!("{value}!")])) },
            )))
            .argument(PromptArgumentSpec::new("bebas"));

        assert!(prompt.supports_completion());
        let def = prompt.definition();
        assert_eq!(def.arguments.len(), 3);
        assert!(def.arguments[1].required);

        let gaya = prompt.complete("gaya", "leng").await.unwrap();
        assert_eq!(gaya.values, vec!["lengkap".to_string()]);
        let siswa = prompt.complete("siswa", "Bu").await.unwrap();
        assert_eq!(siswa.values, vec!["Bu!".to_string()]);
        let bebas = prompt.complete("bebas", "x").await.unwrap();
        assert!(bebas.values.is_empty());
    }

    #[test]
    fn prompt_without_completion_sources() {
        let prompt = FunctionPrompt::new("p", |_ctx, _args| async { Ok(String::new()) })
            .argument(PromptArgumentSpec::new("changes").required());
        assert!(!prompt.supports_completion());
    }

    #[tokio::test]
    async fn template_completion_by_placeholder() {
        let template = FunctionResourceTemplate::new("rapor://siswa/{id}/nilai", "nilai", |_ctx, _uri, _params| async {
            Ok(ResourceOutput::from(ResourceData::text("[]")))
        })
        .complete_with("id", completer(|_value| async { Ok(Completion::from_values(vec!["1".into(), "2".into()])) }));

        assert!(template.supports_completion());
        let ids = template.complete("id", "").await.unwrap();
        assert_eq!(ids.total, Some(2));
        let other = template.complete("kelas", "").await.unwrap();
        assert!(other.values.is_empty());
    }
}
