use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use providers::{ClauseClassifier, Prediction, ProviderError, ProviderRegistry};
use riskscan_core::config::AppConfig;
use riskscan_core::pipeline::AppContext;
use riskscan_core::settings::DEFAULT_MODEL;
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;
use web::{build_router, AppState};

const BOUNDARY: &str = "riskscan-test-boundary";

struct KeywordClassifier;

#[async_trait::async_trait]
impl ClauseClassifier for KeywordClassifier {
    async fn classify(&self, texts: &[String]) -> Result<Vec<Prediction>, ProviderError> {
        Ok(texts
            .iter()
            .map(|t| Prediction {
                label: if t.contains("terminate") { "Termination" } else { "Other" }.into(),
                score: 0.9,
            })
            .collect())
    }

    fn model_spec(&self) -> &str {
        DEFAULT_MODEL
    }
}

async fn app() -> (Router, AppContext, TempDir) {
    let temp = tempdir().unwrap();
    let registry = ProviderRegistry::new().with_classifier(Arc::new(KeywordClassifier));
    let ctx = AppContext::open(AppConfig::rooted_at(temp.path()), registry)
        .await
        .unwrap();
    (build_router(AppState::new(ctx.clone())), ctx, temp)
}

fn contract_docx() -> Vec<u8> {
    let xml = "<w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>\
        <w:p><w:r><w:t>This agreement is made between the supplier and the customer named in the schedule below.</w:t></w:r></w:p>\
        <w:p><w:r><w:t>Either party may terminate this agreement at any time by giving thirty days written notice.</w:t></w:r></w:p>\
        </w:body></w:document>";
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    zip.start_file("word/document.xml", zip::write::FileOptions::default())
        .unwrap();
    zip.write_all(xml.as_bytes()).unwrap();
    zip.finish().unwrap().into_inner()
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn multipart(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        write!(body, "--{BOUNDARY}\r\n").unwrap();
        match part {
            Part::Text(name, value) => {
                write!(body, "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").unwrap();
            }
            Part::File(name, file_name, data) => {
                write!(
                    body,
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .unwrap();
                body.extend_from_slice(data);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    write!(body, "--{BOUNDARY}--\r\n").unwrap();
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn location(resp: &Response) -> String {
    resp.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn body_text(resp: Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(resp: Response) -> Value {
    serde_json::from_str(&body_text(resp).await).unwrap()
}

async fn upload(app: &Router) -> String {
    let docx = contract_docx();
    let resp = app
        .clone()
        .oneshot(multipart("/analyze/run", &[Part::File("file", "deal.docx", &docx)]))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    location(&resp)
}

#[tokio::test]
async fn health_and_empty_dashboard() {
    let (app, _ctx, _temp) = app().await;
    let resp = app.clone().oneshot(get("/healthz")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "ok");

    let resp = app.oneshot(get("/")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("No analyses yet"));
}

#[tokio::test]
async fn upload_then_view_result() {
    let (app, _ctx, _temp) = app().await;
    let result = upload(&app).await;
    assert_eq!(result, "/analyze/1");

    let resp = app.clone().oneshot(get(&result)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_text(resp).await;
    assert!(html.contains("deal.docx"));
    assert!(html.contains("id=\"hit-1\""));
    assert!(html.contains("Why this category matters:"));

    let resp = app.clone().oneshot(get("/api/analyses/1")).await.unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["analysis"]["total_hits"], 1);
    assert_eq!(json["hits"][0]["category"], "Termination");

    let resp = app.clone().oneshot(get("/history")).await.unwrap();
    let html = body_text(resp).await;
    assert!(html.contains("deal.docx"));
    assert!(html.contains("Termination"));

    let resp = app.oneshot(get("/history/1")).await.unwrap();
    assert_eq!(location(&resp), "/analyze/1");
}

#[tokio::test]
async fn upload_rejections_flash_back_to_form() {
    let (app, _ctx, _temp) = app().await;
    let resp = app
        .clone()
        .oneshot(multipart("/analyze/run", &[Part::File("file", "notes.txt", b"hello")]))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&resp),
        "/analyze?level=danger&notice=Unsupported+file+type.+Allowed%3A+PDF+or+DOCX."
    );

    let resp = app
        .clone()
        .oneshot(multipart("/analyze/run", &[Part::Text("other", "x")]))
        .await
        .unwrap();
    assert!(location(&resp).starts_with("/analyze?level=warning&notice=Please+choose+a+file."));

    let resp = app
        .oneshot(get("/analyze?level=danger&notice=Too+big"))
        .await
        .unwrap();
    assert!(body_text(resp).await.contains("<div class=\"notice notice-danger\">Too big</div>"));
}

#[tokio::test]
async fn missing_analysis_is_404() {
    let (app, _ctx, _temp) = app().await;
    let resp = app.clone().oneshot(get("/analyze/99")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let resp = app.clone().oneshot(post("/history/99/delete")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let resp = app.oneshot(get("/api/analyses/99")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["ok"], false);
}

#[tokio::test]
async fn json_endpoints_report_errors() {
    let (app, _ctx, _temp) = app().await;
    upload(&app).await;

    let resp = app.clone().oneshot(post("/analyze/1/explain/1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp).await;
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"], "Gemini disabled in settings.");

    let resp = app.clone().oneshot(get("/analyze/1/pdf/coords/original")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "Not a PDF");

    let resp = app.oneshot(get("/analyze/1/pdf")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(location(&resp).starts_with("/analyze/1?level=warning"));
}

#[tokio::test]
async fn export_downloads_html_report() {
    let (app, _ctx, _temp) = app().await;
    upload(&app).await;
    let resp = app.oneshot(post("/analyze/1/export")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"analysis_1_report.html\""
    );
    assert!(body_text(resp).await.contains("Risk Report - deal.docx"));
}

#[tokio::test]
async fn reanalyze_and_delete_from_history() {
    let (app, _ctx, _temp) = app().await;
    upload(&app).await;

    let resp = app.clone().oneshot(post("/history/1/reanalyze")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&resp),
        "/analyze/2?level=success&notice=Re-analysis+completed."
    );

    let resp = app.clone().oneshot(post("/history/1/delete")).await.unwrap();
    assert_eq!(
        location(&resp),
        "/history?level=success&notice=Analysis+deleted."
    );
    let resp = app.clone().oneshot(get("/analyze/1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let resp = app.oneshot(get("/analyze/2")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn settings_form_saves_and_validates() {
    let (app, ctx, _temp) = app().await;
    let resp = app
        .clone()
        .oneshot(multipart(
            "/settings",
            &[
                Part::Text("threshold", "0.8"),
                Part::Text("category_thresholds", "Termination=0.95"),
                Part::Text("enable_gemini", "on"),
                Part::File("logo", "brand.png", b"\x89PNG"),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(location(&resp), "/settings?level=success&notice=Settings+saved.");
    let settings = ctx.settings().await;
    assert_eq!(settings.threshold, 0.8);
    assert!(settings.enable_gemini);
    assert!(settings.logo_path.ends_with("logo_brand.png"));
    assert!(std::path::Path::new(&settings.logo_path).exists());

    let resp = app
        .clone()
        .oneshot(multipart("/settings", &[Part::Text("threshold", "3")]))
        .await
        .unwrap();
    assert!(location(&resp).starts_with("/settings?level=danger"));
    assert_eq!(ctx.settings().await.threshold, 0.8);

    let resp = app.oneshot(get("/settings")).await.unwrap();
    assert!(body_text(resp).await.contains("Termination=0.95"));
}
