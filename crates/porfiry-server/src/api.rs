//! HTTP routes
//!
//! Generation and report storage:
//! - `POST /generate`, `POST /generate/stream`, `POST /generate/killchain/stream`
//! - `POST /reports/save`, `GET /reports/{project}`, `GET /reports/{project}/{id}`
//!
//! OCR worker:
//! - `POST /ocr`, `GET /ocr/stream?path=`
//! - `GET /` (health), `GET /status`

use crate::reply;
use crate::state::AppState;
use futures::StreamExt;
use porfiry_core::{
    load_screenshots, sse_frame, AssemblyError, AssemblyRequest, ChatMessage, NewReport, OcrInput,
    PromptVariant, ReportStore, StoreError,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// Largest accepted JSON body (base64 OCR images included)
pub const MAX_BODY_BYTES: u64 = 32 * 1024 * 1024;

const SSE_HEADERS: [(&str, &str); 4] = [
    ("cache-control", "no-cache"),
    ("connection", "keep-alive"),
    ("x-accel-buffering", "no"),
    ("access-control-allow-origin", "*"),
];

const MISSING_OCR_SOURCE: &str = "Provide 'path' or 'image'";

/// Generation input: conversation plus screenshots as parallel lists
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateBody {
    /// Conversation turns, oldest first
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    /// Screenshot file paths
    #[serde(default)]
    pub images: Vec<String>,
    /// Display names, parallel to `images`
    #[serde(default)]
    pub filenames: Vec<String>,
}

/// OCR input; `image` wins when both are given
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OcrBody {
    /// Local path or `http(s)` URL
    pub path: Option<String>,
    /// Base64 payload, optionally a data URI
    pub image: Option<String>,
}

impl OcrBody {
    fn into_input(self) -> Result<OcrInput, AssemblyError> {
        match (self.image, self.path) {
            (Some(image), _) if !image.is_empty() => Ok(OcrInput::Base64(image)),
            (_, Some(path)) if !path.is_empty() => Ok(OcrInput::Path(path)),
            _ => Err(AssemblyError::invalid_input(MISSING_OCR_SOURCE)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OcrStreamQuery {
    path: Option<String>,
}

#[derive(Serialize)]
struct OcrText {
    text: String,
}

#[derive(Serialize)]
struct SaveAck {
    ok: bool,
    id: String,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    model: String,
    ocr_model: String,
}

/// Every route, with rejection recovery and access logging
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let generate = warp::path!("generate")
        .and(warp::post())
        .and(json_body::<GenerateBody>())
        .and(with_state(state.clone()))
        .and_then(|body: GenerateBody, state: AppState| generate_report(PromptVariant::Report, body, state));

    let generate_stream = warp::path!("generate" / "stream")
        .and(warp::post())
        .and(json_body::<GenerateBody>())
        .and(with_state(state.clone()))
        .and_then(|body: GenerateBody, state: AppState| stream_report(PromptVariant::Report, body, state));

    let killchain_stream = warp::path!("generate" / "killchain" / "stream")
        .and(warp::post())
        .and(json_body::<GenerateBody>())
        .and(with_state(state.clone()))
        .and_then(|body: GenerateBody, state: AppState| stream_report(PromptVariant::KillChain, body, state));

    let save = warp::path!("reports" / "save")
        .and(warp::post())
        .and(json_body::<NewReport>())
        .and(with_state(state.clone()))
        .and_then(save_report);

    let list = warp::path!("reports" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(list_reports);

    let get = warp::path!("reports" / String / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(get_report);

    let ocr = warp::path!("ocr")
        .and(warp::post())
        .and(json_body::<OcrBody>())
        .and(with_state(state.clone()))
        .and_then(ocr_once);

    let ocr_stream = warp::path!("ocr" / "stream")
        .and(warp::get())
        .and(warp::query::<OcrStreamQuery>())
        .and(with_state(state.clone()))
        .and_then(ocr_stream);

    let health = warp::path::end()
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(health);

    let status = warp::path!("status")
        .and(warp::get())
        .and(with_state(state))
        .and_then(status);

    generate
        .or(generate_stream)
        .or(killchain_stream)
        .or(save)
        .or(list)
        .or(get)
        .or(ocr)
        .or(ocr_stream)
        .or(health)
        .or(status)
        .recover(reply::recover)
        .with(warp::log::custom(access_log))
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

fn access_log(info: warp::log::Info<'_>) {
    tracing::info!(
        target: "porfiry::access",
        method = %info.method(),
        path = info.path(),
        status = info.status().as_u16(),
        elapsed_ms = info.elapsed().as_secs_f64() * 1000.0,
        "request"
    );
}

async fn assembly_request(variant: PromptVariant, body: GenerateBody) -> Result<AssemblyRequest, AssemblyError> {
    let screenshots = load_screenshots(&body.filenames, &body.images).await?;
    Ok(AssemblyRequest::new(variant, body.history, screenshots))
}

async fn generate_report(variant: PromptVariant, body: GenerateBody, state: AppState) -> Result<Response, Rejection> {
    let result = match assembly_request(variant, body).await {
        Ok(request) => state.assembler.generate(request).await,
        Err(err) => Err(err),
    };
    Ok(reply::json(result))
}

async fn stream_report(variant: PromptVariant, body: GenerateBody, state: AppState) -> Result<Response, Rejection> {
    let stream = match assembly_request(variant, body).await {
        Ok(request) => state.assembler.raw_stream(request).await,
        Err(err) => Err(err),
    };
    Ok(match stream {
        Ok(chunks) => reply::streaming(chunks, "text/plain; charset=utf-8", &[]),
        Err(err) => reply::error(&err),
    })
}

async fn on_store<T, F>(store: Arc<dyn ReportStore>, call: F) -> Result<T, AssemblyError>
where
    T: Send + 'static,
    F: FnOnce(&dyn ReportStore) -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || call(store.as_ref()))
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
        .map_err(AssemblyError::from)
}

async fn save_report(report: NewReport, state: AppState) -> Result<Response, Rejection> {
    let saved = on_store(state.store, move |store| store.save(report)).await;
    if let Ok(saved) = &saved {
        tracing::info!(project = %saved.project, id = %saved.id, "report saved");
    }
    Ok(reply::json(saved.map(|saved| SaveAck { ok: true, id: saved.id })))
}

async fn list_reports(project: String, state: AppState) -> Result<Response, Rejection> {
    Ok(reply::json(
        on_store(state.store, move |store| store.list(&project)).await,
    ))
}

async fn get_report(project: String, id: String, state: AppState) -> Result<Response, Rejection> {
    let found = on_store(state.store, {
        let (project, id) = (project.clone(), id.clone());
        move |store| store.get(&project, &id)
    })
    .await
    .and_then(|report| {
        report.ok_or_else(|| AssemblyError::not_found(format!("report {id} in project {project}")))
    });
    Ok(reply::json(found))
}

async fn ocr_once(body: OcrBody, state: AppState) -> Result<Response, Rejection> {
    let result = match body.into_input() {
        Ok(input) => state.ocr.ocr(input).await,
        Err(err) => Err(err),
    };
    Ok(reply::json(result.map(|text| OcrText { text })))
}

async fn ocr_stream(query: OcrStreamQuery, state: AppState) -> Result<Response, Rejection> {
    let Some(path) = query.path.filter(|p| !p.is_empty()) else {
        return Ok(reply::error(&AssemblyError::invalid_input(MISSING_OCR_SOURCE)));
    };
    Ok(match state.ocr.ocr_stream(&path).await {
        Ok(chunks) => reply::streaming(
            chunks.map(|chunk| sse_frame(&chunk)).boxed(),
            "text/event-stream",
            &SSE_HEADERS,
        ),
        Err(err) => reply::error(&err),
    })
}

async fn health(state: AppState) -> Result<Response, Rejection> {
    Ok(warp::reply::json(&Health {
        status: "ok",
        model: state.assembler.model_name().to_string(),
        ocr_model: state.ocr.status().model,
    })
    .into_response())
}

async fn status(state: AppState) -> Result<Response, Rejection> {
    Ok(warp::reply::json(&state.ocr.status()).into_response())
}
