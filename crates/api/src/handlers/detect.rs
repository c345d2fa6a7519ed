//! One-shot detection over an uploaded still image.

use std::path::Path as FsPath;

use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use gatewatch_core::annotate::{annotate_detections, encode_jpeg};
use gatewatch_core::{Detection, Frame};
use gatewatch_db::models::completion::NewCompletion;
use gatewatch_db::repositories::CompletionRepo;
use gatewatch_pipeline::PipelineError;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

const ALLOWED_IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

#[derive(Debug, Deserialize)]
pub struct DetectImageParams {
    pub camera_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DetectImageResponse {
    pub count: usize,
    pub file_name: String,
    pub output_url: String,
}

/// POST /detect/image
///
/// Run the detector once over an uploaded image, store the annotated JPEG,
/// record a completion row, and return the detection count.
pub async fn detect_image(
    State(state): State<AppState>,
    Query(params): Query<DetectImageParams>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let extension = FsPath::new(&file_name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !ALLOWED_IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            return Err(AppError::BadRequest(format!(
                "unsupported media type '{file_name}', expected one of {ALLOWED_IMAGE_EXTENSIONS:?}"
            )));
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("upload read failed: {e}")))?;
        upload = Some((file_name, data.to_vec()));
        break;
    }
    let (original_name, data) =
        upload.ok_or_else(|| AppError::BadRequest("missing 'file' field".into()))?;

    let image = image::load_from_memory(&data)
        .map_err(|e| AppError::BadRequest(format!("undecodable image: {e}")))?
        .to_rgb8();
    let (width, height) = image.dimensions();
    let frame = Frame::from_rgb24(0, width, height, image.into_raw(), chrono::Utc::now())?;

    let cfg = state.manager.config();
    let detections: Vec<Detection> = state
        .detector
        .detect(&frame)
        .map_err(PipelineError::from)?
        .into_iter()
        .filter(|d| d.confidence >= cfg.min_det_conf)
        .filter(|d| cfg.target_class_id.is_none_or(|c| d.class_id == c))
        .collect();

    let annotated = annotate_detections(&frame, &detections);
    let jpeg = encode_jpeg(&annotated, cfg.jpeg_quality)?;

    let out_dir = cfg.media_dir.join("outputs").join("images");
    tokio::fs::create_dir_all(&out_dir)
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    let file_name = format!("{}.jpg", uuid::Uuid::new_v4());
    tokio::fs::write(out_dir.join(&file_name), &jpeg)
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;

    CompletionRepo::insert(
        &state.pool,
        &NewCompletion {
            file_type: "image".into(),
            file_name: file_name.clone(),
            object_count: detections.len() as i64,
            entry_count: 0,
            exit_count: 0,
            net_count: 0,
        },
    )
    .await?;

    tracing::info!(
        original = %original_name,
        camera_id = params.camera_id.as_deref().unwrap_or(""),
        count = detections.len(),
        "Image processed",
    );

    Ok((
        StatusCode::OK,
        Json(DetectImageResponse {
            count: detections.len(),
            output_url: format!("/media/images/{file_name}"),
            file_name,
        }),
    ))
}
