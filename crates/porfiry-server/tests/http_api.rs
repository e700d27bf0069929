//! HTTP surface against scripted backends

use porfiry_core::{Assembler, MemoryStore, OcrService};
use porfiry_server::{routes, AppState};
use porfiry_test_utils::{screenshot_dir, GatedOcr, OcrGate, ScriptedModel};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use warp::http::StatusCode;

fn state(model: ScriptedModel) -> (AppState, OcrGate) {
    let (ocr, gate) = GatedOcr::new("Hello OCR world");
    let state = AppState::new(
        Assembler::new(Arc::new(model)),
        OcrService::new(Arc::new(ocr)),
        Arc::new(MemoryStore::new()),
    );
    (state, gate)
}

fn body_json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn health_and_status_report_models() {
    let (state, _gate) = state(ScriptedModel::new(["x"]));
    let api = routes(state);

    let res = warp::test::request().path("/").reply(&api).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        body_json(res.body()),
        json!({"status": "ok", "model": "scripted", "ocr_model": "gated-ocr"})
    );

    let res = warp::test::request().path("/status").reply(&api).await;
    assert_eq!(body_json(res.body()), json!({"busy": false, "model": "gated-ocr"}));
}

#[tokio::test]
async fn generate_resolves_references_to_data_uris() {
    let (dir, paths) = screenshot_dir(&["login.png"]);
    let (state, _gate) = state(ScriptedModel::new(["## Weak login\n", "![form](screenshot1.png)"]));
    let api = routes(state);

    let res = warp::test::request()
        .method("POST")
        .path("/generate")
        .json(&json!({
            "history": [{"role": "user", "content": "# Weak login\n\nno lockout"}],
            "images": [paths[0]],
            "filenames": ["screenshot1.png"],
        }))
        .reply(&api)
        .await;

    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res.body());
    assert_eq!(body["raw"], "## Weak login\n![form](screenshot1.png)");
    let markdown = body["markdown"].as_str().unwrap();
    assert!(markdown.starts_with("## Weak login\n![form](data:image/png;base64,"));
    drop(dir);
}

#[tokio::test]
async fn generate_rejects_mismatched_screenshot_lists() {
    let (state, _gate) = state(ScriptedModel::new(["x"]));
    let api = routes(state);

    let res = warp::test::request()
        .method("POST")
        .path("/generate")
        .json(&json!({"images": ["/tmp/a.png"], "filenames": []}))
        .reply(&api)
        .await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(res.body())["detail"].as_str().unwrap().starts_with("invalid input"));
}

#[tokio::test]
async fn stream_ends_with_error_marker_on_model_failure() {
    let (state, _gate) = state(ScriptedModel::new(["## A", "bc", "never"]).failing_after(2, "out of memory"));
    let api = routes(state);

    let res = warp::test::request()
        .method("POST")
        .path("/generate/killchain/stream")
        .json(&json!({"history": []}))
        .reply(&api)
        .await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "text/plain; charset=utf-8");
    assert_eq!(
        std::str::from_utf8(res.body()).unwrap(),
        "## Abc\n[ERROR] scripted error: out of memory"
    );
}

#[tokio::test]
async fn unreachable_model_is_bad_gateway() {
    let (state, _gate) = state(ScriptedModel::new(["x"]).unreachable("connection refused"));
    let api = routes(state);

    let res = warp::test::request()
        .method("POST")
        .path("/generate/stream")
        .json(&json!({}))
        .reply(&api)
        .await;

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn reports_are_saved_listed_and_fetched_by_project() {
    let (state, _gate) = state(ScriptedModel::new(["x"]));
    let api = routes(state);

    let res = warp::test::request()
        .method("POST")
        .path("/reports/save")
        .json(&json!({"project": "acme", "markdown": "## SQLi"}))
        .reply(&api)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let ack = body_json(res.body());
    assert_eq!(ack["ok"], true);
    let id = ack["id"].as_str().unwrap().to_string();
    assert_eq!(id.len(), 32);

    let listed = body_json(warp::test::request().path("/reports/acme").reply(&api).await.body());
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["markdown"], "## SQLi");

    let other = body_json(warp::test::request().path("/reports/globex").reply(&api).await.body());
    assert_eq!(other, json!([]));

    let res = warp::test::request().path(&format!("/reports/acme/{id}")).reply(&api).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res.body())["id"], id.as_str());

    let res = warp::test::request().path(&format!("/reports/globex/{id}")).reply(&api).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn saved_report_project_defaults() {
    let (state, _gate) = state(ScriptedModel::new(["x"]));
    let api = routes(state);

    warp::test::request()
        .method("POST")
        .path("/reports/save")
        .json(&json!({"markdown": "## XSS"}))
        .reply(&api)
        .await;

    let listed = body_json(warp::test::request().path("/reports/default").reply(&api).await.body());
    assert_eq!(listed[0]["project"], "default");
}

#[tokio::test]
async fn ocr_requires_a_source() {
    let (state, _gate) = state(ScriptedModel::new(["x"]));
    let api = routes(state);

    let res = warp::test::request()
        .method("POST")
        .path("/ocr")
        .json(&json!({}))
        .reply(&api)
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(res.body()),
        json!({"detail": "invalid input: Provide 'path' or 'image'"})
    );

    let res = warp::test::request().path("/ocr/stream").reply(&api).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ocr_returns_text_and_is_busy_while_a_stream_runs() {
    let (dir, paths) = screenshot_dir(&["shell.png"]);
    let (state, gate) = state(ScriptedModel::new(["x"]));
    let api = routes(state.clone());

    let held = state.ocr.ocr_stream(&paths[0]).await.unwrap();
    let res = warp::test::request()
        .method("POST")
        .path("/ocr")
        .json(&json!({"path": paths[0]}))
        .reply(&api)
        .await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(res.body()), json!({"detail": "ocr busy, try again later"}));

    let res = warp::test::request().path("/status").reply(&api).await;
    assert_eq!(body_json(res.body())["busy"], true);

    drop(held);
    gate.release();
    let res = warp::test::request()
        .method("POST")
        .path("/ocr")
        .json(&json!({"path": paths[0]}))
        .reply(&api)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res.body()), json!({"text": "Hello OCR world"}));
    drop(dir);
}

#[tokio::test]
async fn ocr_stream_frames_chunks_as_events() {
    let (dir, paths) = screenshot_dir(&["page.png"]);
    let (state, _gate) = state(ScriptedModel::new(["x"]));
    let api = routes(state.clone());

    let res = warp::test::request()
        .path(&format!("/ocr/stream?path={}", paths[0]))
        .reply(&api)
        .await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "text/event-stream");
    assert_eq!(res.headers()["cache-control"], "no-cache");
    assert_eq!(res.headers()["x-accel-buffering"], "no");
    assert_eq!(
        std::str::from_utf8(res.body()).unwrap(),
        "data: Hello \n\ndata: OCR \n\ndata: world\n\ndata: \n\n"
    );
    assert!(!state.ocr.is_busy());
    drop(dir);
}

#[tokio::test]
async fn missing_ocr_file_is_not_found() {
    let (state, _gate) = state(ScriptedModel::new(["x"]));
    let api = routes(state.clone());

    let res = warp::test::request()
        .path("/ocr/stream?path=/no/such/image.png")
        .reply(&api)
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(!state.ocr.is_busy());
}

#[tokio::test]
async fn unknown_route_is_a_json_not_found() {
    let (state, _gate) = state(ScriptedModel::new(["x"]));
    let api = routes(state);

    let res = warp::test::request().path("/nope").reply(&api).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(res.body()), json!({"detail": "not found"}));
}
