use axum::extract::{Multipart, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::db::models::MediaType;
use crate::db::new_id;
use crate::error::{AppError, AppResult};
use crate::extractors::{ApiPath, CurrentUser};
use crate::state::AppState;

pub fn public() -> Router<AppState> {
    Router::new().route("/uploads/{name}", get(serve))
}

pub fn protected() -> Router<AppState> {
    Router::new().route("/api/upload", post(upload))
}

/// Classify a MIME type; anything but image, video or audio is refused.
/// SVG is scriptable, so it is refused along with non-media types.
fn media_type_of(mime: &mime_guess::Mime) -> Option<MediaType> {
    match mime.type_().as_str() {
        "image" if mime.subtype().as_str() == "svg" => None,
        "image" => Some(MediaType::Image),
        "video" => Some(MediaType::Video),
        "audio" => Some(MediaType::Audio),
        _ => None,
    }
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::BadRequest(err.body_text())
}

/// POST /api/upload: multipart field `file`.
async fn upload(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    let max_bytes = state.config.storage.max_upload_bytes;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let mime = field
            .content_type()
            .and_then(|ct| ct.parse::<mime_guess::Mime>().ok())
            .filter(|m| media_type_of(m).is_some())
            .or_else(|| mime_guess::from_path(&file_name).first())
            .ok_or_else(|| AppError::BadRequest("Unsupported file type".into()))?;
        let media_type = media_type_of(&mime)
            .ok_or_else(|| AppError::BadRequest("Only images, videos and audio are allowed".into()))?;

        let mut data = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            if data.len() + chunk.len() > max_bytes {
                return Err(AppError::BadRequest(format!(
                    "File exceeds the {} byte upload limit",
                    max_bytes
                )));
            }
            data.extend_from_slice(&chunk);
        }
        if data.is_empty() {
            return Err(AppError::BadRequest("Uploaded file is empty".into()));
        }

        let extension = stored_extension(&file_name, &mime)
            .ok_or_else(|| AppError::BadRequest("Unsupported file type".into()))?;
        let stored_name = format!("{}.{}", new_id(), extension);

        let dir = state.config.uploads_path();
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&stored_name), &data).await?;
        tracing::info!(
            user_id = %user.id,
            file = %stored_name,
            bytes = data.len(),
            "Stored upload"
        );

        return Ok(Json(json!({
            "success": true,
            "url": format!("/uploads/{}", stored_name),
            "media_type": media_type,
        })));
    }

    Err(AppError::BadRequest("Missing file field".into()))
}

/// Whether `ext` is served as `mime`.
fn serves_as(ext: &str, mime: &mime_guess::Mime) -> bool {
    mime_guess::from_ext(ext)
        .first()
        .is_some_and(|guess| guess.essence_str() == mime.essence_str())
}

/// Extension the upload is stored under. It always maps back to `mime`, so
/// the type served later is the type that was validated here. The client's
/// own extension is kept only when it agrees with `mime`.
fn stored_extension(file_name: &str, mime: &mime_guess::Mime) -> Option<String> {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
        .filter(|e| serves_as(e, mime))
        .or_else(|| {
            mime_guess::get_mime_extensions(mime)?
                .iter()
                .find(|e| serves_as(e, mime))
                .map(|e| e.to_string())
        })
}

/// GET /uploads/{name}
async fn serve(
    State(state): State<AppState>,
    ApiPath(name): ApiPath<String>,
) -> AppResult<Response> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        return Err(AppError::NotFound);
    }
    let Some(mime) = mime_guess::from_path(&name)
        .first()
        .filter(|m| media_type_of(m).is_some())
    else {
        return Err(AppError::NotFound);
    };
    let path = state.config.uploads_path().join(&name);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(AppError::NotFound),
        Err(e) => return Err(e.into()),
    };
    Ok((
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
            (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
        ],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_media_types_are_accepted() {
        let png = mime_guess::from_path("a.png").first_or_octet_stream();
        let mp4 = mime_guess::from_path("a.mp4").first_or_octet_stream();
        let pdf = mime_guess::from_path("a.pdf").first_or_octet_stream();
        assert_eq!(media_type_of(&png), Some(MediaType::Image));
        assert_eq!(media_type_of(&mp4), Some(MediaType::Video));
        assert_eq!(media_type_of(&pdf), None);
        let svg = mime_guess::from_path("a.svg").first_or_octet_stream();
        assert_eq!(media_type_of(&svg), None);
    }

    #[test]
    fn stored_extension_follows_validated_type() {
        assert_eq!(
            stored_extension("evil.html", &mime_guess::mime::IMAGE_PNG).as_deref(),
            Some("png")
        );
        assert_eq!(
            stored_extension("Photo.JPG", &mime_guess::mime::IMAGE_JPEG).as_deref(),
            Some("jpg")
        );
        let ext = stored_extension("noext", &mime_guess::mime::IMAGE_JPEG).unwrap();
        assert_eq!(
            mime_guess::from_ext(&ext).first(),
            Some(mime_guess::mime::IMAGE_JPEG)
        );
    }
}
