use crate::nid_parser::{NidParser, ParsedDocument};
use crate::utils::NidError;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub const EXTRACT_PATH: &str = "/extract-nid-info/";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub parser: Arc<NidParser>,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
    pub endpoints: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NidInfoResponse {
    pub name: Option<String>,
    pub dob: Option<String>,
    pub nid: Option<String>,
    pub extracted_text: String,
}

impl From<ParsedDocument> for NidInfoResponse {
    fn from(doc: ParsedDocument) -> Self {
        NidInfoResponse {
            name: doc.result.name,
            dob: doc.result.dob,
            nid: doc.result.nid,
            extracted_text: doc.extracted_text,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// Problem with the request itself
    BadRequest(String),
    /// Multipart body rejected while streaming, carries axum's status
    Upload(StatusCode, String),
    /// OCR or decoding failed
    Processing(NidError),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Upload(status, msg) => (status, msg),
            ApiError::Processing(NidError::ImageDecodeError(msg)) => {
                (StatusCode::BAD_REQUEST, format!("Invalid image: {}", msg))
            }
            ApiError::Processing(e) if e.is_input_error() => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("OCR processing failed: {}", e),
            ),
            ApiError::Processing(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            error!("{}", detail);
        } else {
            warn!("Rejected request: {}", detail);
        }
        (status, Json(ErrorResponse { detail })).into_response()
    }
}

impl From<NidError> for ApiError {
    fn from(err: NidError) -> Self {
        ApiError::Processing(err)
    }
}

impl ApiError {
    fn too_large(max_upload_bytes: usize) -> Self {
        ApiError::BadRequest(format!(
            "File size too large. Maximum size is {}",
            format_size(max_upload_bytes)
        ))
    }

    /// Body limit hits become the same 400 as an oversized file.
    fn from_multipart(err: MultipartError, max_upload_bytes: usize) -> Self {
        let status = err.status();
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::too_large(max_upload_bytes)
        } else {
            ApiError::Upload(status, err.body_text())
        }
    }
}

fn format_size(bytes: usize) -> String {
    const MIB: usize = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{} bytes", bytes)
    }
}

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES);
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route(EXTRACT_PATH, post(extract_nid_info))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> Json<RootResponse> {
    let endpoints = [
        ("extract_nid_info", EXTRACT_PATH),
        ("docs", "/docs"),
        ("health", "/health"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    Json(RootResponse {
        message: "NID Parser API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints,
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Local::now().to_rfc3339(),
    })
}

async fn extract_nid_info(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<NidInfoResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::from_multipart(e, state.max_upload_bytes))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().unwrap_or_default().to_string();
        let file_name = field.file_name().unwrap_or("upload").to_string();
        if !content_type.starts_with("image/") {
            return Err(ApiError::BadRequest("File must be an image".to_string()));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::from_multipart(e, state.max_upload_bytes))?;
        upload = Some((file_name, bytes));
        break;
    }

    let (file_name, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("Missing file field".to_string()))?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Empty file received".to_string()));
    }
    if bytes.len() > state.max_upload_bytes {
        return Err(ApiError::too_large(state.max_upload_bytes));
    }
    info!("Processing {} ({} bytes)", file_name, bytes.len());

    let parser = Arc::clone(&state.parser);
    let doc = tokio::task::spawn_blocking(move || parser.parse_image(&bytes))
        .await
        .map_err(|e| ApiError::Internal(format!("OCR task failed: {}", e)))??;

    Ok(Json(doc.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractionRules, RecognizedFragment};
    use crate::processing::assembler::FieldExtractor;
    use crate::processing::ocr::fake::{FailingEngine, StaticEngine};
    use crate::processing::ocr::OcrEngine;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::NaiveDate;
    use tower::ServiceExt;

    const BOUNDARY: &str = "nid-test-boundary";

    fn state_with(engine: Arc<dyn OcrEngine>, max_upload_bytes: usize) -> AppState {
        let extractor = FieldExtractor::new(&ExtractionRules::default())
            .unwrap()
            .with_today(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        AppState {
            parser: Arc::new(NidParser::new(engine, extractor)),
            max_upload_bytes,
        }
    }

    fn card_state() -> AppState {
        state_with(
            Arc::new(StaticEngine(vec![
                RecognizedFragment::text_only("Republic of X", 0.9),
                RecognizedFragment::text_only("Name: JOHN DOE", 0.9),
                RecognizedFragment::text_only("DOB 15/03/1990", 0.9),
                RecognizedFragment::text_only("NID 123456789012345", 0.9),
            ])),
            DEFAULT_MAX_UPLOAD_BYTES,
        )
    }

    fn upload_request(content_type: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"file\"; filename=\"card.jpg\"\r\n");
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri(EXTRACT_PATH)
            .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_root_lists_endpoints() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = create_router(card_state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let root: RootResponse = body_json(response).await;
        assert_eq!(root.message, "NID Parser API");
        assert_eq!(root.endpoints["extract_nid_info"], EXTRACT_PATH);
        assert_eq!(root.endpoints["health"], "/health");
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = create_router(card_state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let health: HealthResponse = body_json(response).await;
        assert_eq!(health.status, "healthy");
        assert!(!health.timestamp.is_empty());
    }

    #[tokio::test]
    async fn test_extract_success() {
        let response = create_router(card_state())
            .oneshot(upload_request("image/jpeg", b"fake jpeg bytes"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let info: NidInfoResponse = body_json(response).await;
        assert_eq!(info.name.as_deref(), Some("JOHN DOE"));
        assert_eq!(info.dob.as_deref(), Some("15/03/1990"));
        assert_eq!(info.nid.as_deref(), Some("123456789012345"));
        assert!(info.extracted_text.starts_with("Republic of X Name: JOHN DOE"));
    }

    #[tokio::test]
    async fn test_missing_fields_are_null() {
        let state = state_with(
            Arc::new(StaticEngine(vec![RecognizedFragment::text_only("blurry", 0.2)])),
            DEFAULT_MAX_UPLOAD_BYTES,
        );
        let response = create_router(state)
            .oneshot(upload_request("image/png", b"png"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let value: serde_json::Value = body_json(response).await;
        assert_eq!(value["name"], serde_json::Value::Null);
        assert_eq!(value["dob"], serde_json::Value::Null);
        assert_eq!(value["nid"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_non_image_rejected() {
        let response = create_router(card_state())
            .oneshot(upload_request("text/plain", b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err: ErrorResponse = body_json(response).await;
        assert_eq!(err.detail, "File must be an image");
    }

    #[tokio::test]
    async fn test_empty_file_rejected() {
        let response = create_router(card_state())
            .oneshot(upload_request("image/jpeg", b""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err: ErrorResponse = body_json(response).await;
        assert_eq!(err.detail, "Empty file received");
    }

    #[tokio::test]
    async fn test_oversized_file_rejected() {
        let state = state_with(Arc::new(StaticEngine(Vec::new())), 16);
        let response = create_router(state)
            .oneshot(upload_request("image/jpeg", &[7u8; 32]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err: ErrorResponse = body_json(response).await;
        assert_eq!(err.detail, "File size too large. Maximum size is 16 bytes");
    }

    #[tokio::test]
    async fn test_upload_past_body_limit_rejected() {
        let state = state_with(Arc::new(StaticEngine(Vec::new())), 16);
        let payload = vec![7u8; MULTIPART_OVERHEAD_BYTES + 4096];
        let response = create_router(state)
            .oneshot(upload_request("image/jpeg", &payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err: ErrorResponse = body_json(response).await;
        assert_eq!(err.detail, "File size too large. Maximum size is 16 bytes");
    }

    #[tokio::test]
    async fn test_ocr_failure_is_server_error() {
        let state = state_with(Arc::new(FailingEngine), DEFAULT_MAX_UPLOAD_BYTES);
        let response = create_router(state)
            .oneshot(upload_request("image/jpeg", b"jpeg"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let err: ErrorResponse = body_json(response).await;
        assert!(err.detail.starts_with("OCR processing failed:"));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(DEFAULT_MAX_UPLOAD_BYTES), "10MB");
        assert_eq!(format_size(1500), "1500 bytes");
    }
}
