//! End-to-end tests: a real [`Server`] driven through [`TestClient`] over the
//! in-memory transport, plus the HTTP listener on an ephemeral port.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rapormcp_core::{McpError, McpErrorCode};
use rapormcp_protocol::{
    ClientCapabilities, JsonRpcMessage, JsonRpcResponse, ReadResourceResult, Root, RootsCapability,
};
use serde_json::{Value, json};

use crate::testing::{TestClient, TestClientError};
use crate::{
    BearerTokenAuthProvider, FunctionPrompt, FunctionResource, FunctionResourceTemplate,
    FunctionTool, HandshakeConfig, PingConfig, PromptArgumentSpec, ResourceData, Server, ServerBuilder,
    ServerEvent, SessionConfig, SessionEvent, ToolError, ToolOutput, TransportConfig,
};

// ============================================================================
// Fixtures
// ============================================================================

fn greet_tool() -> FunctionTool {
    FunctionTool::new("greet", |_ctx, args| async move {
        let name = args["name"].as_str().unwrap_or("world").to_string();
        Ok(ToolOutput::text(format!("Halo, {name}!")))
    })
    .description("Greets someone")
    .input_schema(json!({
        "type": "object",
        "properties": {"name": {"type": "string"}},
        "required": ["name"]
    }))
}

fn slow_tool() -> FunctionTool {
    FunctionTool::new("slow", |_ctx, args| async move {
        let ms = args["ms"].as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(ToolOutput::text("done"))
    })
    .timeout(Duration::from_millis(100))
}

fn counting_tool() -> FunctionTool {
    FunctionTool::new("count", |ctx, args| async move {
        let steps = args["steps"].as_u64().unwrap_or(3);
        for step in 1..=steps {
            ctx.report_progress_with_total(step as f64, steps as f64, Some("counting"));
        }
        ctx.log().debug("counted quietly");
        ctx.log().info("counted");
        Ok(ToolOutput::text(steps.to_string()))
    })
}

fn failing_tool() -> FunctionTool {
    FunctionTool::new("fail", |_ctx, args| async move {
        if args["user"].as_bool().unwrap_or(false) {
            Err(ToolError::user("Nilai tidak ditemukan"))
        } else {
            Err(ToolError::other(std::io::Error::other("backend down")))
        }
    })
}

fn base_builder() -> ServerBuilder {
    Server::new("test-server", "1.0.0")
        .tool(greet_tool())
        .tool(slow_tool())
        .tool(counting_tool())
        .tool(failing_tool())
        .resource(
            FunctionResource::new("rapor://info", "info", |_ctx| async {
                Ok(vec![
                    ResourceData::text("first").with_name("part-1"),
                    ResourceData::text("{\"n\":2}")
                        .with_uri("rapor://info/2")
                        .with_mime_type("application/json"),
                ]
                .into())
            })
            .mime_type("text/plain"),
        )
        .resource_template(FunctionResourceTemplate::new(
            "rapor://siswa/{id}/nilai",
            "nilai-siswa",
            |_ctx, _uri, params| async move {
                let id = params.get("id").cloned().unwrap_or_default();
                Ok(ResourceData::text(format!("nilai untuk {id}")).into())
            },
        ))
        .prompt(
            FunctionPrompt::new("ringkasan", |_ctx, args| async move {
                Ok(format!("Ringkas rapor {}", args.get("siswa").cloned().unwrap_or_default()))
            })
            .argument(PromptArgumentSpec::new("siswa").required())
            .argument(PromptArgumentSpec::new("gaya").enumeration(["singkat", "lengkap"])),
        )
}

fn quick_handshake() -> SessionConfig {
    SessionConfig {
        handshake: HandshakeConfig {
            max_attempts: 3,
            backoff: Duration::from_millis(10),
        },
        ..SessionConfig::default()
    }
}

async fn connect(server: &Server) -> (TestClient, Arc<crate::Session>) {
    TestClient::connect(server, ClientCapabilities::default())
        .await
        .expect("client connects")
}

fn remote_code(err: &TestClientError) -> McpErrorCode {
    err.remote().expect("remote error").kind()
}

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn initialize_reports_capabilities_and_client() {
    let server = base_builder().instructions("Gunakan tools rapor").build();
    let (client, transport) = TestClient::pair();
    let connecting = {
        let server = server.clone();
        tokio::spawn(async move { server.connect(Arc::new(transport), None).await })
    };

    let result = client.initialize(ClientCapabilities::default()).await.unwrap();
    assert_eq!(result.server_info.name, "test-server");
    assert_eq!(result.instructions.as_deref(), Some("Gunakan tools rapor"));
    assert!(result.capabilities.tools.is_some());
    assert!(result.capabilities.logging.is_some());
    assert!(result.capabilities.completions.is_some());

    let session = connecting.await.unwrap().unwrap();
    assert_eq!(session.client_info().map(|info| info.name.as_str()), Some("test-client"));
    assert!(session.protocol_version().is_some());
}

#[tokio::test]
async fn handshake_exhaustion_continues_without_capabilities() {
    let server = base_builder().session_config(quick_handshake()).build();
    let (client, transport) = TestClient::pair();

    let session = tokio::time::timeout(
        Duration::from_secs(2),
        server.connect(Arc::new(transport), None),
    )
    .await
    .expect("connect gives up on its own")
    .unwrap();
    assert!(session.client_capabilities().is_none());
    assert!(!session.is_closed());

    // The session still serves requests.
    let pong = client.request("ping", None).await.unwrap();
    assert_eq!(pong, json!({}));
}

#[tokio::test]
async fn second_connect_is_rejected() {
    let server = base_builder().build();
    let (_client, session) = connect(&server).await;
    let (_other, transport) = TestClient::pair();
    let err = session.connect(Arc::new(transport)).await.unwrap_err();
    assert!(matches!(err, crate::SessionError::AlreadyConnected));
}

// ============================================================================
// Tools
// ============================================================================

#[tokio::test]
async fn tools_list_includes_schema() {
    let server = base_builder().build();
    let (client, _session) = connect(&server).await;

    let listed = client.request("tools/list", None).await.unwrap();
    let tools = listed["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 4);
    let greet = tools.iter().find(|t| t["name"] == "greet").unwrap();
    assert_eq!(greet["inputSchema"]["required"], json!(["name"]));
    let slow = tools.iter().find(|t| t["name"] == "slow").unwrap();
    assert_eq!(slow["inputSchema"], json!({"type": "object"}));
}

#[tokio::test]
async fn schema_violation_then_success() {
    let server = base_builder().build();
    let (client, _session) = connect(&server).await;

    let err = client.call_tool("greet", json!({"name": 7})).await.unwrap_err();
    assert_eq!(remote_code(&err), McpErrorCode::InvalidParams);
    let remote = err.remote().unwrap();
    assert!(remote.message.starts_with("Input validation failed"));
    assert!(remote.data.as_ref().is_some_and(|data| data["issues"].is_array()));

    let ok = client.call_tool("greet", json!({"name": "Budi"})).await.unwrap();
    assert!(!ok.is_error);
    assert_eq!(ok.content[0].as_text(), Some("Halo, Budi!"));
}

#[tokio::test]
async fn timeout_then_success() {
    let server = base_builder().build();
    let (client, _session) = connect(&server).await;

    let timed_out = client.call_tool("slow", json!({"ms": 1000})).await.unwrap();
    assert!(timed_out.is_error);
    assert_eq!(
        timed_out.content[0].as_text(),
        Some("Tool execution timed out after 100ms")
    );

    let ok = client.call_tool("slow", json!({"ms": 0})).await.unwrap();
    assert!(!ok.is_error);
    assert_eq!(ok.content[0].as_text(), Some("done"));
}

#[tokio::test]
async fn unknown_tool_is_method_not_found() {
    let server = base_builder().build();
    let (client, _session) = connect(&server).await;

    let err = client.call_tool("missing", json!({})).await.unwrap_err();
    assert_eq!(remote_code(&err), McpErrorCode::MethodNotFound);
    assert_eq!(err.remote().unwrap().message, "Unknown tool: missing");
}

#[tokio::test]
async fn tool_failures_become_error_results() {
    let server = base_builder().build();
    let (client, _session) = connect(&server).await;

    let user = client.call_tool("fail", json!({"user": true})).await.unwrap();
    assert!(user.is_error);
    assert_eq!(user.content[0].as_text(), Some("Nilai tidak ditemukan"));

    let other = client.call_tool("fail", json!({})).await.unwrap();
    assert!(other.is_error);
    assert_eq!(other.content[0].as_text(), Some("Error: backend down"));
}

#[tokio::test]
async fn progress_notifications_precede_response() {
    let server = base_builder().build();
    let (client, _session) = connect(&server).await;

    let result = client
        .call_tool_with_progress("count", json!({"steps": 4}), "tok-1")
        .await
        .unwrap();
    assert_eq!(result.content[0].as_text(), Some("4"));

    let received = client.received();
    let response_at = received
        .iter()
        .rposition(|m| matches!(m, JsonRpcMessage::Response(_)))
        .unwrap();
    let progress: Vec<(usize, Value)> = received
        .iter()
        .enumerate()
        .filter_map(|(i, m)| match m {
            JsonRpcMessage::Request(r) if r.method == "notifications/progress" => {
                Some((i, r.params.clone().unwrap_or_default()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(progress.len(), 4);
    assert!(progress.iter().all(|(i, _)| *i < response_at));
    assert_eq!(progress[0].1["progressToken"], "tok-1");
    assert_eq!(progress[3].1["progress"], 4.0);
    assert_eq!(progress[3].1["total"], 4.0);
}

#[tokio::test]
async fn no_progress_without_token() {
    let server = base_builder().build();
    let (client, _session) = connect(&server).await;

    client.call_tool("count", json!({"steps": 2})).await.unwrap();
    assert!(client.take_notifications("notifications/progress").is_empty());
}

#[tokio::test]
async fn set_level_changes_forwarded_logs() {
    let server = base_builder().build();
    let (client, session) = connect(&server).await;

    client.call_tool("count", json!({"steps": 1})).await.unwrap();
    let logs = client.take_notifications("notifications/message");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].params.as_ref().unwrap()["data"], "counted");

    client.set_level("debug").await.unwrap();
    assert_eq!(session.logging_level(), rapormcp_core::LoggingLevel::Debug);
    client.call_tool("count", json!({"steps": 1})).await.unwrap();
    let logs = client.take_notifications("notifications/message");
    let levels: Vec<_> = logs
        .iter()
        .map(|n| n.params.as_ref().unwrap()["level"].clone())
        .collect();
    assert_eq!(levels, vec![json!("debug"), json!("info")]);

    client.set_level("error").await.unwrap();
    client.call_tool("count", json!({"steps": 1})).await.unwrap();
    assert!(client.take_notifications("notifications/message").is_empty());
}

// ============================================================================
// Resources and prompts
// ============================================================================

#[tokio::test]
async fn resource_read_returns_every_entry() {
    let server = base_builder().build();
    let (client, _session) = connect(&server).await;

    let value = client
        .request("resources/read", Some(json!({"uri": "rapor://info"})))
        .await
        .unwrap();
    let result: ReadResourceResult = serde_json::from_value(value).unwrap();
    assert_eq!(result.contents.len(), 2);
    assert_eq!(result.contents[0].uri, "rapor://info");
    assert_eq!(result.contents[0].name.as_deref(), Some("part-1"));
    assert_eq!(result.contents[0].mime_type.as_deref(), Some("text/plain"));
    assert_eq!(result.contents[1].uri, "rapor://info/2");
    assert_eq!(result.contents[1].mime_type.as_deref(), Some("application/json"));
}

#[tokio::test]
async fn template_extracts_parameters() {
    let server = base_builder().build();
    let (client, _session) = connect(&server).await;

    let value = client
        .request("resources/read", Some(json!({"uri": "rapor://siswa/42/nilai"})))
        .await
        .unwrap();
    assert_eq!(value["contents"][0]["text"], "nilai untuk 42");
    assert_eq!(value["contents"][0]["uri"], "rapor://siswa/42/nilai");

    let err = client
        .request("resources/read", Some(json!({"uri": "rapor://siswa/42/absen"})))
        .await
        .unwrap_err();
    assert_eq!(remote_code(&err), McpErrorCode::MethodNotFound);
}

#[tokio::test]
async fn prompt_requires_declared_arguments() {
    let server = base_builder().build();
    let (client, _session) = connect(&server).await;

    let err = client
        .request("prompts/get", Some(json!({"name": "ringkasan", "arguments": {}})))
        .await
        .unwrap_err();
    assert_eq!(remote_code(&err), McpErrorCode::InvalidRequest);
    assert_eq!(err.remote().unwrap().message, "Missing required argument: siswa");

    let value = client
        .request(
            "prompts/get",
            Some(json!({"name": "ringkasan", "arguments": {"siswa": "Ani"}})),
        )
        .await
        .unwrap();
    assert_eq!(value["messages"][0]["role"], "user");
    assert_eq!(value["messages"][0]["content"]["text"], "Ringkas rapor Ani");
}

#[tokio::test]
async fn prompt_argument_completion() {
    let server = base_builder().build();
    let (client, _session) = connect(&server).await;

    let value = client
        .request(
            "completion/complete",
            Some(json!({
                "ref": {"type": "ref/prompt", "name": "ringkasan"},
                "argument": {"name": "gaya", "value": "leng"}
            })),
        )
        .await
        .unwrap();
    assert_eq!(value["completion"]["values"], json!(["lengkap"]));
}

#[tokio::test]
async fn unknown_method_is_reported() {
    let server = base_builder().build();
    let (client, _session) = connect(&server).await;

    let err = client.request("resources/subscribe", None).await.unwrap_err();
    assert_eq!(remote_code(&err), McpErrorCode::MethodNotFound);
    assert_eq!(err.remote().unwrap().message, "Method not found: resources/subscribe");
}

// ============================================================================
// Server-initiated traffic
// ============================================================================

#[tokio::test]
async fn roots_fetched_after_handshake_and_on_change() {
    let server = base_builder().build();
    let (client, transport) = TestClient::pair();
    client.set_roots(Some(vec![Root {
        uri: "file:///rapor/2024".to_string(),
        name: Some("2024".to_string()),
    }]));
    let connecting = {
        let server = server.clone();
        tokio::spawn(async move { server.connect(Arc::new(transport), None).await })
    };
    let capabilities = ClientCapabilities {
        roots: Some(RootsCapability { list_changed: true }),
        ..ClientCapabilities::default()
    };
    client.initialize(capabilities).await.unwrap();
    let session = connecting.await.unwrap().unwrap();
    assert_eq!(session.roots().len(), 1);
    assert_eq!(session.roots()[0].uri, "file:///rapor/2024");

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    session.on_event(move |event| {
        if let SessionEvent::RootsChanged(roots) = event {
            let _ = tx.send(roots.clone());
        }
    });
    client.set_roots(Some(vec![
        Root {
            uri: "file:///rapor/2024".to_string(),
            name: None,
        },
        Root {
            uri: "file:///rapor/2025".to_string(),
            name: None,
        },
    ]));
    client.notify("notifications/roots/list_changed", None).unwrap();

    let roots = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(roots.len(), 2);
    assert_eq!(session.roots().len(), 2);
}

#[tokio::test]
async fn roots_unsupported_by_client_leave_list_empty() {
    let server = base_builder().build();
    let capabilities = ClientCapabilities {
        roots: Some(RootsCapability { list_changed: false }),
        ..ClientCapabilities::default()
    };
    let (_client, session) = TestClient::connect(&server, capabilities).await.unwrap();
    assert!(session.roots().is_empty());
    assert!(!session.is_closed());
}

#[tokio::test]
async fn server_can_ping_client() {
    let server = base_builder().build();
    let (_client, session) = connect(&server).await;
    session.ping().await.unwrap();
}

#[tokio::test]
async fn session_notify_reaches_client() {
    let server = base_builder().build();
    let (client, session) = connect(&server).await;
    session.notify("notifications/tools/list_changed", json!({}));
    let note = client
        .next_notification("notifications/tools/list_changed")
        .await
        .unwrap();
    assert_eq!(note.method, "notifications/tools/list_changed");
}

// ============================================================================
// Session set
// ============================================================================

#[tokio::test]
async fn connect_and_disconnect_events() {
    let server = base_builder().build();
    let events = Arc::new(Mutex::new(Vec::new()));
    {
        let events = Arc::clone(&events);
        server.on_event(move |event| {
            let label = match event {
                ServerEvent::Connect(s) => format!("connect:{}", s.id()),
                ServerEvent::Disconnect(s) => format!("disconnect:{}", s.id()),
            };
            events.lock().unwrap().push(label);
        });
    }

    let (first, first_session) = connect(&server).await;
    let (_second, second_session) = connect(&server).await;
    assert_eq!(server.sessions().len(), 2);

    first.close();
    tokio::time::timeout(Duration::from_secs(2), first_session.closed())
        .await
        .unwrap();
    assert_eq!(server.sessions().len(), 1);
    assert!(Arc::ptr_eq(&server.sessions()[0], &second_session));

    // Reconnect with a fresh client.
    let (_third, third_session) = connect(&server).await;
    assert_eq!(server.sessions().len(), 2);

    let events = events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            format!("connect:{}", first_session.id()),
            format!("connect:{}", second_session.id()),
            format!("disconnect:{}", first_session.id()),
            format!("connect:{}", third_session.id()),
        ]
    );
}

#[tokio::test]
async fn close_is_idempotent_and_drops_later_sends() {
    let server = base_builder().build();
    let (client, session) = connect(&server).await;

    session.close().await;
    session.close().await;
    assert!(session.is_closed());
    session.notify("notifications/message", json!({"level": "info", "data": "late"}));
    assert!(matches!(
        session.ping().await,
        Err(crate::SessionError::Closed | crate::SessionError::NotConnected)
    ));
    assert!(client.request("ping", None).await.is_err());
}

#[tokio::test]
async fn stray_error_response_is_ignored() {
    let server = base_builder().build();
    let (client, _session) = connect(&server).await;

    // A response to nothing is logged and ignored.
    client
        .send_raw(JsonRpcResponse::error(None, McpError::internal_error("stray").into()).into())
        .unwrap();
    assert_eq!(client.request("ping", None).await.unwrap(), json!({}));
}

// ============================================================================
// HTTP
// ============================================================================

fn count_connects(server: &Server) -> Arc<Mutex<usize>> {
    let connects = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&connects);
    server.on_event(move |event| {
        if matches!(event, ServerEvent::Connect(_)) {
            *counter.lock().unwrap() += 1;
        }
    });
    connects
}

async fn start_sse(server: &Server) -> String {
    let address = server
        .start(TransportConfig::sse("127.0.0.1", 0))
        .await
        .unwrap()
        .unwrap();
    format!("http://{address}")
}

/// Reads the SSE body until `needle` shows up, returning everything read.
async fn read_until(stream: &mut reqwest::Response, needle: &str) -> String {
    let mut text = String::new();
    while !text.contains(needle) {
        let chunk = tokio::time::timeout(Duration::from_secs(2), stream.chunk())
            .await
            .expect("event arrives in time")
            .unwrap()
            .expect("stream still open");
        text.push_str(&String::from_utf8_lossy(&chunk));
    }
    text
}

async fn wait_for_sessions(server: &Server, count: usize) {
    for _ in 0..250 {
        if server.sessions().len() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {count} sessions, have {}", server.sessions().len());
}

async fn start_http(server: &Server) -> String {
    let address = server
        .start(TransportConfig::http_stream("127.0.0.1", 0))
        .await
        .unwrap()
        .unwrap();
    format!("http://{address}")
}

fn initialize_body() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": {"name": "http-test", "version": "1.0"}
        }
    })
}

#[tokio::test]
async fn http_rejects_missing_token() {
    let server = base_builder()
        .auth_provider(BearerTokenAuthProvider::new("rahasia", "guru"))
        .build();
    let connects = count_connects(&server);
    let base = start_http(&server).await;
    let http = reqwest::Client::new();

    let denied = http
        .post(format!("{base}/mcp"))
        .json(&initialize_body())
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), reqwest::StatusCode::UNAUTHORIZED);

    let wrong = http
        .post(format!("{base}/mcp"))
        .bearer_auth("salah")
        .json(&initialize_body())
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), reqwest::StatusCode::UNAUTHORIZED);

    // Rejected requests never reach session creation.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*connects.lock().unwrap(), 0);
    assert!(server.sessions().is_empty());

    let allowed = http
        .post(format!("{base}/mcp"))
        .bearer_auth("rahasia")
        .json(&initialize_body())
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), reqwest::StatusCode::OK);
    assert!(allowed.headers().contains_key(crate::http::SESSION_HEADER));
    let body = allowed.text().await.unwrap();
    assert!(body.contains("event: message"));
    assert!(body.contains("\"serverInfo\""));

    server.stop().await;
}

#[tokio::test]
async fn http_stream_session_lifecycle() {
    let server = base_builder().build();
    let base = start_http(&server).await;
    let http = reqwest::Client::new();

    let init = http
        .post(format!("{base}/mcp"))
        .json(&initialize_body())
        .send()
        .await
        .unwrap();
    let session_id = init.headers()[crate::http::SESSION_HEADER]
        .to_str()
        .unwrap()
        .to_string();
    let _ = init.text().await.unwrap();

    let call = http
        .post(format!("{base}/mcp"))
        .header(crate::http::SESSION_HEADER, &session_id)
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "greet", "arguments": {"name": "Sari"}}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(call.status(), reqwest::StatusCode::OK);
    assert!(call.text().await.unwrap().contains("Halo, Sari!"));

    let unknown = http
        .post(format!("{base}/mcp"))
        .header(crate::http::SESSION_HEADER, "nope")
        .json(&json!({"jsonrpc": "2.0", "id": 3, "method": "ping"}))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), reqwest::StatusCode::NOT_FOUND);

    let no_session = http
        .post(format!("{base}/mcp"))
        .json(&json!({"jsonrpc": "2.0", "id": 4, "method": "ping"}))
        .send()
        .await
        .unwrap();
    assert_eq!(no_session.status(), reqwest::StatusCode::BAD_REQUEST);

    let garbage = http
        .post(format!("{base}/mcp"))
        .header(crate::http::SESSION_HEADER, &session_id)
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(garbage.status(), reqwest::StatusCode::BAD_REQUEST);

    let deleted = http
        .delete(format!("{base}/mcp"))
        .header(crate::http::SESSION_HEADER, &session_id)
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), reqwest::StatusCode::OK);

    let gone = http
        .delete(format!("{base}/mcp"))
        .header(crate::http::SESSION_HEADER, &session_id)
        .send()
        .await
        .unwrap();
    assert_eq!(gone.status(), reqwest::StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn http_health_ping_and_cors() {
    let server = base_builder().build();
    let base = start_http(&server).await;
    let http = reqwest::Client::new();

    let health = http.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(health.text().await.unwrap(), "OK");
    let ping = http.get(format!("{base}/ping")).send().await.unwrap();
    assert_eq!(ping.text().await.unwrap(), "pong");

    let preflight = http
        .request(reqwest::Method::OPTIONS, format!("{base}/mcp"))
        .header("origin", "http://localhost:5173")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .unwrap();
    assert_eq!(preflight.status(), reqwest::StatusCode::NO_CONTENT);
    assert_eq!(
        preflight.headers()["access-control-allow-origin"],
        "http://localhost:5173"
    );
    assert_eq!(preflight.headers()["access-control-allow-headers"], "content-type");

    server.stop().await;
}

#[tokio::test]
async fn sse_stream_announces_message_endpoint() {
    let server = base_builder().build();
    let address = server
        .start(TransportConfig::sse("127.0.0.1", 0))
        .await
        .unwrap()
        .unwrap();
    let base = format!("http://{address}");
    let http = reqwest::Client::new();

    let mut stream = http.get(format!("{base}/sse")).send().await.unwrap();
    assert_eq!(stream.status(), reqwest::StatusCode::OK);
    let first = tokio::time::timeout(Duration::from_secs(2), stream.chunk())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8_lossy(&first).to_string();
    assert!(text.contains("event: endpoint"));
    assert!(text.contains("/messages?sessionId="));

    let missing = http
        .post(format!("{base}/messages"))
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::BAD_REQUEST);

    let unknown = http
        .post(format!("{base}/messages?sessionId=nope"))
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), reqwest::StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn sse_rejected_connection_creates_no_session() {
    let server = base_builder()
        .auth_provider(BearerTokenAuthProvider::new("rahasia", "guru"))
        .build();
    let connects = count_connects(&server);
    let base = start_sse(&server).await;

    let denied = reqwest::Client::new()
        .get(format!("{base}/sse"))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), reqwest::StatusCode::UNAUTHORIZED);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*connects.lock().unwrap(), 0);
    assert!(server.sessions().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn sse_messages_are_answered_on_the_stream() {
    // Frequent pings make a dropped stream show up quickly on the server.
    let server = base_builder()
        .session_config(SessionConfig {
            ping: PingConfig {
                enabled: Some(true),
                interval: Duration::from_millis(50),
                ..PingConfig::default()
            },
            request_timeout: Duration::from_millis(100),
            ..quick_handshake()
        })
        .build();
    let connects = count_connects(&server);
    let base = start_sse(&server).await;
    let http = reqwest::Client::new();

    let mut stream = http.get(format!("{base}/sse")).send().await.unwrap();
    let announced = read_until(&mut stream, "sessionId=").await;
    let endpoint = announced
        .lines()
        .find_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .expect("endpoint event carries a path")
        .to_string();
    assert!(endpoint.starts_with("/messages?sessionId="));

    let posted = http
        .post(format!("{base}{endpoint}"))
        .json(&initialize_body())
        .send()
        .await
        .unwrap();
    assert_eq!(posted.status(), reqwest::StatusCode::ACCEPTED);

    let answer = read_until(&mut stream, "\"serverInfo\"").await;
    assert!(answer.contains("event: message"));
    assert!(answer.contains("\"test-server\""));

    wait_for_sessions(&server, 1).await;
    assert_eq!(*connects.lock().unwrap(), 1);

    drop(stream);
    wait_for_sessions(&server, 0).await;

    let after = http
        .post(format!("{base}{endpoint}"))
        .json(&json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}))
        .send()
        .await
        .unwrap();
    assert_eq!(after.status(), reqwest::StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn bind_failure_names_address() {
    let server = base_builder().build();
    let err = server
        .start(TransportConfig::http_stream("256.0.0.1", 0))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("256.0.0.1:0"));
}
