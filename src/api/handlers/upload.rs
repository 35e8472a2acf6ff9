use crate::api::error::AppError;
use crate::services::upload_service::RelayResult;
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
};
use utoipa::ToSchema;

/// `multipart/form-data` body accepted by `/upload`.
#[derive(ToSchema)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

// The body limit surfaces as a multipart error; its status tells it apart
// from a malformed form.
fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(e.body_text())
    }
}

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data", description = "File upload"),
    responses(
        (status = 200, description = "File relayed to the channel", body = RelayResult),
        (status = 400, description = "Malformed request or large-file transport not configured"),
        (status = 413, description = "File exceeds the maximum size"),
        (status = 500, description = "File could not be staged"),
        (status = 502, description = "Messaging backend rejected or did not answer")
    ),
    tag = "upload"
)]
pub async fn upload_file(
    State(state): State<crate::AppState>,
    mut multipart: Multipart,
) -> Result<Json<RelayResult>, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("unnamed").to_string();
        let payload = field.bytes().await.map_err(multipart_error)?;

        let result = state
            .upload_service
            .process_upload(&payload, &filename)
            .await?;
        return Ok(Json(result));
    }

    Err(AppError::BadRequest("No file provided".to_string()))
}
