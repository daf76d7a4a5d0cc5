//! [`ServerBuilder`]: registration and configuration before serving.

use std::sync::Arc;

use rapormcp_protocol::ServerInfo;

use crate::auth::AuthProvider;
use crate::config::SessionConfig;
use crate::handler::{PromptHandler, ResourceHandler, ResourceTemplateHandler, ToolHandler};
use crate::router::Router;
use crate::Server;

/// Collects handlers and settings for a [`Server`].
///
/// Everything is registered here; the registry is frozen by [`build`](Self::build)
/// and shared read-only by all sessions.
pub struct ServerBuilder {
    info: ServerInfo,
    router: Router,
    instructions: Option<String>,
    session_config: SessionConfig,
    auth_provider: Option<Arc<dyn AuthProvider>>,
}

impl ServerBuilder {
    /// A builder with an empty registry and default session settings.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            info: ServerInfo {
                name: name.into(),
                version: version.into(),
            },
            router: Router::new(),
            instructions: None,
            session_config: SessionConfig::default(),
            auth_provider: None,
        }
    }

    /// Adds a tool. A later tool with the same name replaces it.
    #[must_use]
    pub fn tool<H: ToolHandler + 'static>(mut self, handler: H) -> Self {
        self.router.add_tool(handler);
        self
    }

    /// Adds a fixed-URI resource.
    #[must_use]
    pub fn resource<H: ResourceHandler + 'static>(mut self, handler: H) -> Self {
        self.router.add_resource(handler);
        self
    }

    /// Adds a URI template. Templates are matched in registration order.
    #[must_use]
    pub fn resource_template<H: ResourceTemplateHandler + 'static>(mut self, handler: H) -> Self {
        self.router.add_resource_template(handler);
        self
    }

    /// Adds a prompt.
    #[must_use]
    pub fn prompt<H: PromptHandler + 'static>(mut self, handler: H) -> Self {
        self.router.add_prompt(handler);
        self
    }

    /// Text returned to clients in the `initialize` result.
    #[must_use]
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Sets handshake, ping and roots behavior for every session.
    #[must_use]
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Authenticates HTTP connections before a session is created.
    #[must_use]
    pub fn auth_provider<P: AuthProvider + 'static>(mut self, provider: P) -> Self {
        self.auth_provider = Some(Arc::new(provider));
        self
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> Server {
        Server::from_parts(
            self.info,
            Arc::new(self.router),
            self.instructions,
            self.session_config,
            self.auth_provider,
        )
    }
}
