//! The grade-book MCP surface.
//!
//! [`register`] adds to a [`ServerBuilder`]:
//!
//! - tools: `list_mapel`, `get_mapel`, `create_mapel`, `update_mapel`,
//!   `delete_mapel`, `list_nilai`, `create_nilai`, `update_nilai`,
//!   `delete_nilai`, `rata_rata_nilai`
//! - resource `rapor://mapel` and template `rapor://siswa/{id}/nilai`
//! - prompt `ringkasan_rapor`

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use rapormcp_core::logging::{debug, targets};
use rapormcp_core::{McpContext, McpError, McpResult};
use rapormcp_protocol::Completion;
use rapormcp_server::completion::fuzzy_complete;
use rapormcp_server::{
    FunctionPrompt, FunctionResource, FunctionResourceTemplate, FunctionTool, PromptArgumentSpec,
    ResourceData, ServerBuilder, ToolError, ToolOutput, completer,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::client::{GradesApi, GradesError};
use crate::models::{NewMapel, NewNilai, average};

pub const MAPEL_URI: &str = "rapor://mapel";
pub const NILAI_TEMPLATE: &str = "rapor://siswa/{id}/nilai";

const JSON_MIME: &str = "application/json";

/// Registers every grade-book tool, resource and prompt on `builder`.
pub fn register(builder: ServerBuilder, api: Arc<dyn GradesApi>) -> ServerBuilder {
    builder
        .tool(list_mapel(&api))
        .tool(get_mapel(&api))
        .tool(create_mapel(&api))
        .tool(update_mapel(&api))
        .tool(delete_mapel(&api))
        .tool(list_nilai(&api))
        .tool(create_nilai(&api))
        .tool(update_nilai(&api))
        .tool(delete_nilai(&api))
        .tool(rata_rata_nilai(&api))
        .resource(mapel_resource(&api))
        .resource_template(nilai_template(&api))
        .prompt(ringkasan_prompt(&api))
}

// ============================================================================
// Arguments
// ============================================================================

#[derive(Debug, Deserialize)]
struct IdArgs {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct UpdateMapelArgs {
    id: i64,
    nama: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListNilaiArgs {
    siswa_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateNilaiArgs {
    id: i64,
    #[serde(flatten)]
    nilai: NewNilai,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SiswaArgs {
    siswa_id: i64,
}

fn id_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {"id": {"type": "integer", "description": description}},
        "required": ["id"]
    })
}

fn nilai_properties() -> Value {
    json!({
        "siswaId": {"type": "integer", "description": "Student id"},
        "mapelId": {"type": "integer", "description": "Subject id"},
        "nilai": {"type": "number", "minimum": 0, "maximum": 100}
    })
}

// ============================================================================
// Helpers
// ============================================================================

/// Maps a backend failure to a tool failure. Missing records are the
/// caller's mistake and keep their message; the rest are reported as
/// backend errors.
fn tool_error(err: GradesError) -> ToolError {
    match err {
        GradesError::NotFound(what) => ToolError::user(format!("Tidak ditemukan: {what}")),
        other => ToolError::other(other),
    }
}

fn resource_error(err: GradesError) -> McpError {
    McpError::internal_error(err.to_string())
}

/// Builds a tool whose body gets its own handle on the backend.
fn api_tool<F, Fut>(name: &str, api: &Arc<dyn GradesApi>, run: F) -> FunctionTool
where
    F: Fn(Arc<dyn GradesApi>, McpContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
{
    let api = Arc::clone(api);
    FunctionTool::new(name, move |ctx, args| run(Arc::clone(&api), ctx, args))
}

// ============================================================================
// Mapel tools
// ============================================================================

fn list_mapel(api: &Arc<dyn GradesApi>) -> FunctionTool {
    api_tool("list_mapel", api, |api, _ctx, _args| async move {
        let mapel = api.list_mapel().await.map_err(tool_error)?;
        ToolOutput::json(&mapel)
    })
    .description("List every subject")
    .input_schema(json!({"type": "object", "properties": {}}))
}

fn get_mapel(api: &Arc<dyn GradesApi>) -> FunctionTool {
    api_tool("get_mapel", api, |api, _ctx, args| async move {
        let IdArgs { id } = serde_json::from_value(args)?;
        let mapel = api.get_mapel(id).await.map_err(tool_error)?;
        ToolOutput::json(&mapel)
    })
    .description("Get one subject by id")
    .input_schema(id_schema("Subject id"))
}

fn create_mapel(api: &Arc<dyn GradesApi>) -> FunctionTool {
    api_tool("create_mapel", api, |api, _ctx, args| async move {
        let mapel: NewMapel = serde_json::from_value(args)?;
        let created = api.create_mapel(&mapel).await.map_err(tool_error)?;
        ToolOutput::json(&created)
    })
    .description("Create a subject")
    .input_schema(json!({
        "type": "object",
        "properties": {"nama": {"type": "string", "minLength": 1}},
        "required": ["nama"]
    }))
}

fn update_mapel(api: &Arc<dyn GradesApi>) -> FunctionTool {
    api_tool("update_mapel", api, |api, _ctx, args| async move {
        let UpdateMapelArgs { id, nama } = serde_json::from_value(args)?;
        let updated = api
            .update_mapel(id, &NewMapel { nama })
            .await
            .map_err(tool_error)?;
        ToolOutput::json(&updated)
    })
    .description("Rename a subject")
    .input_schema(json!({
        "type": "object",
        "properties": {
            "id": {"type": "integer"},
            "nama": {"type": "string", "minLength": 1}
        },
        "required": ["id", "nama"]
    }))
}

fn delete_mapel(api: &Arc<dyn GradesApi>) -> FunctionTool {
    api_tool("delete_mapel", api, |api, _ctx, args| async move {
        let IdArgs { id } = serde_json::from_value(args)?;
        api.delete_mapel(id).await.map_err(tool_error)?;
        Ok(ToolOutput::text(format!("Mapel {id} dihapus")))
    })
    .description("Delete a subject")
    .input_schema(id_schema("Subject id"))
}

// ============================================================================
// Nilai tools
// ============================================================================

fn list_nilai(api: &Arc<dyn GradesApi>) -> FunctionTool {
    api_tool("list_nilai", api, |api, _ctx, args| async move {
        let ListNilaiArgs { siswa_id } = serde_json::from_value(args)?;
        let nilai = match siswa_id {
            Some(siswa_id) => api.nilai_for_siswa(siswa_id).await,
            None => api.list_nilai().await,
        }
        .map_err(tool_error)?;
        ToolOutput::json(&nilai)
    })
    .description("List grades, optionally for one student")
    .input_schema(json!({
        "type": "object",
        "properties": {"siswaId": {"type": "integer", "description": "Only this student's grades"}}
    }))
}

fn create_nilai(api: &Arc<dyn GradesApi>) -> FunctionTool {
    api_tool("create_nilai", api, |api, _ctx, args| async move {
        let nilai: NewNilai = serde_json::from_value(args)?;
        let created = api.create_nilai(&nilai).await.map_err(tool_error)?;
        ToolOutput::json(&created)
    })
    .description("Record a grade")
    .input_schema(json!({
        "type": "object",
        "properties": nilai_properties(),
        "required": ["siswaId", "mapelId", "nilai"]
    }))
}

fn update_nilai(api: &Arc<dyn GradesApi>) -> FunctionTool {
    let mut properties = nilai_properties();
    properties["id"] = json!({"type": "integer"});
    api_tool("update_nilai", api, |api, _ctx, args| async move {
        let UpdateNilaiArgs { id, nilai } = serde_json::from_value(args)?;
        let updated = api.update_nilai(id, &nilai).await.map_err(tool_error)?;
        ToolOutput::json(&updated)
    })
    .description("Replace a grade")
    .input_schema(json!({
        "type": "object",
        "properties": properties,
        "required": ["id", "siswaId", "mapelId", "nilai"]
    }))
}

fn delete_nilai(api: &Arc<dyn GradesApi>) -> FunctionTool {
    api_tool("delete_nilai", api, |api, _ctx, args| async move {
        let IdArgs { id } = serde_json::from_value(args)?;
        api.delete_nilai(id).await.map_err(tool_error)?;
        Ok(ToolOutput::text(format!("Nilai {id} dihapus")))
    })
    .description("Delete a grade")
    .input_schema(id_schema("Grade id"))
}

fn rata_rata_nilai(api: &Arc<dyn GradesApi>) -> FunctionTool {
    api_tool("rata_rata_nilai", api, |api, ctx, args| async move {
        let SiswaArgs { siswa_id } = serde_json::from_value(args)?;
        let siswa = api.get_siswa(siswa_id).await.map_err(tool_error)?;
        let grades = api.nilai_for_siswa(siswa_id).await.map_err(tool_error)?;

        let total = grades.len() as f64;
        for (done, _) in grades.iter().enumerate() {
            ctx.report_progress_with_total((done + 1) as f64, total, Some("menghitung"));
        }
        ctx.log().info(&format!("{} nilai dihitung untuk {}", grades.len(), siswa.nama));

        let Some(mean) = average(&grades) else {
            return Ok(ToolOutput::text(format!("Belum ada nilai untuk {}", siswa.nama)));
        };
        ToolOutput::json(&json!({
            "siswaId": siswa.id,
            "nama": siswa.nama,
            "jumlahNilai": grades.len(),
            "rataRata": (mean * 100.0).round() / 100.0,
        }))
    })
    .description("Average grade of one student")
    .input_schema(json!({
        "type": "object",
        "properties": {"siswaId": {"type": "integer"}},
        "required": ["siswaId"]
    }))
}

// ============================================================================
// Resources
// ============================================================================

fn mapel_resource(api: &Arc<dyn GradesApi>) -> FunctionResource {
    let api = Arc::clone(api);
    FunctionResource::new(MAPEL_URI, "mapel", move |_ctx| {
        let api = Arc::clone(&api);
        async move {
            let mapel = api.list_mapel().await.map_err(resource_error)?;
            let text = serde_json::to_string(&mapel)
                .map_err(|err| McpError::internal_error(err.to_string()))?;
            Ok(ResourceData::text(text).into())
        }
    })
    .description("All subjects")
    .mime_type(JSON_MIME)
}

fn nilai_template(api: &Arc<dyn GradesApi>) -> FunctionResourceTemplate {
    let load_api = Arc::clone(api);
    FunctionResourceTemplate::new(NILAI_TEMPLATE, "nilai-siswa", move |_ctx, _uri, params| {
        let api = Arc::clone(&load_api);
        async move {
            let id = parse_id(params.get("id").map(String::as_str))?;
            let grades = api.nilai_for_siswa(id).await.map_err(resource_error)?;
            let text = serde_json::to_string(&grades)
                .map_err(|err| McpError::internal_error(err.to_string()))?;
            Ok(ResourceData::text(text).into())
        }
    })
    .description("Grades of one student")
    .mime_type(JSON_MIME)
    .complete_with("id", siswa_id_completer(api))
}

fn parse_id(raw: Option<&str>) -> McpResult<i64> {
    raw.and_then(|raw| raw.parse().ok())
        .ok_or_else(|| McpError::invalid_params(format!("Invalid student id: {}", raw.unwrap_or(""))))
}

/// Completes student ids against the backend's current list.
fn siswa_id_completer(api: &Arc<dyn GradesApi>) -> rapormcp_server::Completer {
    let api = Arc::clone(api);
    completer(move |value| {
        let api = Arc::clone(&api);
        async move {
            let siswa = api.list_siswa().await.map_err(resource_error)?;
            let ids: Vec<String> = siswa.iter().map(|s| s.id.to_string()).collect();
            Ok::<Completion, McpError>(fuzzy_complete(&ids, &value))
        }
    })
}

// ============================================================================
// Prompt
// ============================================================================

fn ringkasan_prompt(api: &Arc<dyn GradesApi>) -> FunctionPrompt {
    let load_api = Arc::clone(api);
    FunctionPrompt::new("ringkasan_rapor", move |_ctx, args| {
        let api = Arc::clone(&load_api);
        async move { ringkasan(api.as_ref(), &args).await }
    })
    .description("Ask for a written summary of a student's report card")
    .argument(
        PromptArgumentSpec::new("siswa")
            .description("Student id")
            .required()
            .complete_with(siswa_id_completer(api)),
    )
    .argument(
        PromptArgumentSpec::new("gaya")
            .description("Summary style")
            .enumeration(["singkat", "lengkap", "formal"]),
    )
}

async fn ringkasan(api: &dyn GradesApi, args: &HashMap<String, String>) -> McpResult<String> {
    let id = parse_id(args.get("siswa").map(String::as_str))?;
    let gaya = args.get("gaya").map_or("singkat", String::as_str);

    let siswa = api.get_siswa(id).await.map_err(resource_error)?;
    let grades = api.nilai_for_siswa(id).await.map_err(resource_error)?;
    let mapel: HashMap<i64, String> = api
        .list_mapel()
        .await
        .map_err(resource_error)?
        .into_iter()
        .map(|m| (m.id, m.nama))
        .collect();
    debug!(target: targets::GRADES, "Summarising {} grades for {}", grades.len(), siswa.nama);

    let mut prompt = format!(
        "Tuliskan ringkasan rapor yang {gaya} untuk siswa {} (id {}).\n",
        siswa.nama, siswa.id
    );
    if grades.is_empty() {
        prompt.push_str("Siswa ini belum memiliki nilai.\n");
    } else {
        prompt.push_str("Nilai:\n");
        for grade in &grades {
            let subject = mapel
                .get(&grade.mapel_id)
                .map_or_else(|| format!("Mapel {}", grade.mapel_id), Clone::clone);
            prompt.push_str(&format!("- {subject}: {}\n", grade.nilai));
        }
        if let Some(mean) = average(&grades) {
            prompt.push_str(&format!("Rata-rata: {mean:.2}\n"));
        }
    }
    Ok(prompt)
}
