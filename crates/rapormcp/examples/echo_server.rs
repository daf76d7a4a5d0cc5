//! Example: Echo Server
//!
//! A small server with one tool, one resource, one template and one prompt.
//!
//! Run with:
//! ```bash
//! cargo run --example echo_server            # stdio
//! cargo run --example echo_server -- http    # streamable HTTP on 127.0.0.1:8080
//! ```

use rapormcp::prelude::*;

fn echo_tool() -> FunctionTool {
    FunctionTool::new("echo", |ctx, args| async move {
        let text = args["text"].as_str().unwrap_or_default().to_string();
        ctx.log().info("echoing");
        Ok(ToolOutput::text(text))
    })
    .description("Echo the input text back")
    .input_schema(json!({
        "type": "object",
        "properties": {"text": {"type": "string"}},
        "required": ["text"]
    }))
}

fn reverse_tool() -> FunctionTool {
    FunctionTool::new("reverse", |ctx, args| async move {
        let text = args["text"].as_str().unwrap_or_default();
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len() as f64;
        for done in 0..chars.len() {
            ctx.report_progress_with_total((done + 1) as f64, total, None);
        }
        Ok(ToolOutput::text(chars.into_iter().rev().collect::<String>()))
    })
    .description("Reverse a string, reporting progress per character")
    .input_schema(json!({
        "type": "object",
        "properties": {"text": {"type": "string"}},
        "required": ["text"]
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = Server::new("echo-server", "1.0.0")
        .tool(echo_tool())
        .tool(reverse_tool())
        .resource(
            FunctionResource::new("echo://readme", "readme", |_ctx| async {
                Ok(ResourceData::text("Send text to the echo tool.").into())
            })
            .mime_type("text/plain"),
        )
        .resource_template(FunctionResourceTemplate::new(
            "echo://upper/{text}",
            "upper",
            |_ctx, _uri, params| async move {
                let text = params.get("text").cloned().unwrap_or_default();
                Ok(ResourceData::text(text.to_uppercase()).into())
            },
        ))
        .prompt(
            FunctionPrompt::new("greet", |_ctx, args| async move {
                let name = args.get("name").cloned().unwrap_or_default();
                let tone = args.get("tone").map_or("friendly", String::as_str).to_string();
                Ok(format!("Write a {tone} greeting for {name}."))
            })
            .argument(PromptArgumentSpec::new("name").required())
            .argument(PromptArgumentSpec::new("tone").enumeration(["friendly", "formal"])),
        )
        .build();

    let config = match std::env::args().nth(1).as_deref() {
        Some("http") => TransportConfig::http_stream("127.0.0.1", 8080),
        Some("sse") => TransportConfig::sse("127.0.0.1", 8080),
        _ => TransportConfig::Stdio,
    };
    match server.start(config).await? {
        Some(address) => {
            eprintln!("listening on http://{address}");
            tokio::signal::ctrl_c().await?;
            server.stop().await;
        }
        None => {
            for session in server.sessions() {
                session.closed().await;
            }
        }
    }
    Ok(())
}
