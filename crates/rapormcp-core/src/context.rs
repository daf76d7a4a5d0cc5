//! Request-scoped context handed to tool, resource and prompt handlers.
//!
//! [`McpContext`] carries what a handler may need from its session without
//! holding the session itself: the request identity, a client logger that
//! honours the session's `logging/setLevel` threshold, a progress reporter
//! bound to the request's progress token, and the session's auth context.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::AuthContext;
use crate::logging::{LoggingLevel, SharedLevel};

// ============================================================================
// Notification Sender
// ============================================================================

/// Sends notifications back to the client.
///
/// Implemented by the session so that handlers can stream progress and log
/// messages while they run. Sends are fire-and-forget: after the session
/// closes they are dropped.
pub trait NotificationSender: Send + Sync {
    /// Sends a `notifications/progress` message.
    fn send_progress(&self, progress: f64, total: Option<f64>, message: Option<&str>);

    /// Sends a `notifications/message` log entry.
    fn send_log(&self, level: LoggingLevel, logger: Option<&str>, data: Value);
}

/// A sender that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpNotificationSender;

impl NotificationSender for NoOpNotificationSender {
    fn send_progress(&self, _progress: f64, _total: Option<f64>, _message: Option<&str>) {}

    fn send_log(&self, _level: LoggingLevel, _logger: Option<&str>, _data: Value) {}
}

// ============================================================================
// Progress
// ============================================================================

/// Progress reporter bound to one request's progress token.
#[derive(Clone)]
pub struct ProgressReporter {
    sender: Arc<dyn NotificationSender>,
}

impl ProgressReporter {
    /// Creates a reporter that forwards to `sender`.
    pub fn new(sender: Arc<dyn NotificationSender>) -> Self {
        Self { sender }
    }

    /// Reports indeterminate progress.
    pub fn report(&self, progress: f64, message: Option<&str>) {
        self.sender.send_progress(progress, None, message);
    }

    /// Reports progress against a known total.
    pub fn report_with_total(&self, progress: f64, total: f64, message: Option<&str>) {
        self.sender.send_progress(progress, Some(total), message);
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter").finish_non_exhaustive()
    }
}

// ============================================================================
// Client Logger
// ============================================================================

/// Forwards log entries to the client as `notifications/message`.
///
/// Entries below the session's current threshold are dropped. The threshold
/// is read on every call, so a `logging/setLevel` issued while a tool is
/// running applies to its later entries.
#[derive(Clone)]
pub struct ClientLogger {
    sender: Arc<dyn NotificationSender>,
    threshold: SharedLevel,
    name: Option<String>,
}

impl ClientLogger {
    /// Creates a logger filtered by `threshold`.
    pub fn new(sender: Arc<dyn NotificationSender>, threshold: SharedLevel) -> Self {
        Self {
            sender,
            threshold,
            name: None,
        }
    }

    /// Sets the `logger` name reported with each entry.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the session's current threshold.
    #[must_use]
    pub fn threshold(&self) -> LoggingLevel {
        self.threshold.get()
    }

    /// Sends an entry at `level` if it passes the threshold.
    ///
    /// With `context`, the payload is `{"message": .., "context": ..}`;
    /// otherwise it is the bare message string.
    pub fn log(&self, level: LoggingLevel, message: &str, context: Option<Value>) {
        if !self.threshold.allows(level) {
            return;
        }
        let data = match context {
            Some(context) => json!({ "message": message, "context": context }),
            None => Value::String(message.to_string()),
        };
        self.sender.send_log(level, self.name.as_deref(), data);
    }

    pub fn debug(&self, message: &str) {
        self.log(LoggingLevel::Debug, message, None);
    }

    pub fn info(&self, message: &str) {
        self.log(LoggingLevel::Info, message, None);
    }

    pub fn warning(&self, message: &str) {
        self.log(LoggingLevel::Warning, message, None);
    }

    pub fn error(&self, message: &str) {
        self.log(LoggingLevel::Error, message, None);
    }
}

impl Default for ClientLogger {
    fn default() -> Self {
        Self::new(Arc::new(NoOpNotificationSender), SharedLevel::default())
    }
}

impl std::fmt::Debug for ClientLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientLogger")
            .field("threshold", &self.threshold.get())
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// McpContext
// ============================================================================

/// Per-request handle passed to handlers.
///
/// # Example
///
/// ```ignore
/// async fn import(ctx: McpContext, rows: Vec<Row>) -> Result<ToolOutput, ToolError> {
///     let total = rows.len() as f64;
///     for (i, row) in rows.iter().enumerate() {
///         ctx.report_progress_with_total(i as f64, total, None);
///         store(row).await?;
///     }
///     ctx.log().info("import finished");
///     Ok(ToolOutput::text("done"))
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct McpContext {
    /// Numeric form of the JSON-RPC request id, for tracing.
    request_id: u64,
    session_id: Option<String>,
    progress_reporter: Option<ProgressReporter>,
    logger: ClientLogger,
    auth: Option<Arc<AuthContext>>,
}

impl McpContext {
    /// Creates a context with no progress reporting, a discarding logger
    /// and no auth.
    #[must_use]
    pub fn new(request_id: u64) -> Self {
        Self {
            request_id,
            ..Self::default()
        }
    }

    /// Enables progress reporting.
    #[must_use]
    pub fn with_progress(mut self, reporter: ProgressReporter) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Replaces the client logger.
    #[must_use]
    pub fn with_logger(mut self, logger: ClientLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Attaches the session's auth context.
    #[must_use]
    pub fn with_auth(mut self, auth: Arc<AuthContext>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Records the owning session's id.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Returns the request identifier.
    #[must_use]
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Returns the owning session's id, if known.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Returns whether the client asked for progress on this request.
    #[must_use]
    pub fn has_progress_reporter(&self) -> bool {
        self.progress_reporter.is_some()
    }

    /// Reports progress. Does nothing when the request carried no progress
    /// token.
    pub fn report_progress(&self, progress: f64, message: Option<&str>) {
        if let Some(ref reporter) = self.progress_reporter {
            reporter.report(progress, message);
        }
    }

    /// Reports progress against a total. Does nothing when the request
    /// carried no progress token.
    pub fn report_progress_with_total(&self, progress: f64, total: f64, message: Option<&str>) {
        if let Some(ref reporter) = self.progress_reporter {
            reporter.report_with_total(progress, total, message);
        }
    }

    /// Client logger for this request.
    #[must_use]
    pub fn log(&self) -> &ClientLogger {
        &self.logger
    }

    /// Returns the session's auth context, if the session was authenticated.
    #[must_use]
    pub fn auth(&self) -> Option<&AuthContext> {
        self.auth.as_deref()
    }
}
