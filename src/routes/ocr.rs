//! OCR endpoint: multipart image upload in, extracted text out.

use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;

use crate::error::{ApiError, Result};
use crate::ocr::OcrOptions;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(recognize))
}

#[derive(Serialize)]
pub struct OcrResponse {
    pub text: String,
}

/// Handle one OCR request. Field names are configurable
/// (`HTTP_INPUT_OPTIONS_FIELD` / `HTTP_INPUT_FILE_FIELD`); the options field
/// is optional JSON, the file field is required.
async fn recognize(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<OcrResponse>> {
    let options_field = state.config().http.options_field.clone();
    let file_field = state.config().http.file_field.clone();

    let mut options: Option<OcrOptions> = None;
    let mut image: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == options_field {
            let raw = field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(format!("unreadable options field: {e}")))?;
            options = Some(
                serde_json::from_str(&raw)
                    .map_err(|e| ApiError::BadRequest(format!("invalid options json: {e}")))?,
            );
        } else if name == file_field {
            image = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("unreadable file field: {e}")))?,
            );
        }
        // Unknown fields are ignored, matching lenient multipart handling.
    }

    let image = image
        .ok_or_else(|| ApiError::BadRequest(format!("missing multipart field `{file_field}`")))?;
    if image.is_empty() {
        return Err(ApiError::BadRequest("uploaded file is empty".to_string()));
    }

    let text = state
        .ocr()
        .process(&image, options.unwrap_or_default())
        .await?;
    Ok(Json(OcrResponse { text }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    const BOUNDARY: &str = "test-boundary";

    fn app() -> Router {
        let state = AppState::new(Config::default());
        Router::new().merge(router()).with_state(state)
    }

    fn multipart_request(parts: &[(&str, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (name, value) in parts {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        Request::post("/")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[tokio::test]
    async fn test_missing_file_field_is_bad_request() {
        let response = app()
            .oneshot(multipart_request(&[("options", "{}")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("missing multipart field `file`"));
    }

    #[tokio::test]
    async fn test_invalid_options_json_is_bad_request() {
        let response = app()
            .oneshot(multipart_request(&[
                ("options", "{not json"),
                ("file", "fake image bytes"),
            ]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("invalid options json"));
    }

    #[tokio::test]
    async fn test_empty_file_is_bad_request() {
        let response = app()
            .oneshot(multipart_request(&[("file", "")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("uploaded file is empty"));
    }

    #[tokio::test]
    async fn test_non_multipart_body_rejected() {
        let request = Request::post("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert!(response.status().is_client_error());
    }
}
