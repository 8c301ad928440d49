//! Image upload intake and serving of stored uploads.

use crate::constants::{UPLOADS_PATH, UPLOAD_FIELD_NAME};
use crate::storage::{get_storage, StorageError};
use actix_multipart::Multipart;
use actix_web::http::{header, StatusCode};
use actix_web::{error, get, web, Error, HttpRequest, HttpResponse};
use futures::{StreamExt, TryStreamExt};

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_upload);
}

/// Public URL of a stored object.
pub fn upload_url(key: &str) -> String {
    format!("{}/{}", UPLOADS_PATH, key)
}

/// An image read from a multipart request, not yet stored.
pub struct ImageUpload {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Read the `image` field of a multipart body.
///
/// Rejects unsupported content types with 415 and bodies above
/// `storage.max_size_mb` with 413. Other fields are skipped.
pub async fn read_image_field(mut payload: Multipart) -> Result<ImageUpload, Error> {
    let max_bytes = crate::app_config::storage().max_size_mb as usize * 1024 * 1024;

    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::debug!("read_image_field: multipart error: {}", e);
        error::ErrorBadRequest("Malformed multipart body.")
    })? {
        let is_image_field = field.content_disposition().get_name() == Some(UPLOAD_FIELD_NAME);
        if !is_image_field {
            // Drain and ignore.
            while let Some(chunk) = field.next().await {
                chunk.map_err(|_| error::ErrorBadRequest("Malformed multipart body."))?;
            }
            continue;
        }

        let content_type = field
            .content_type()
            .map(|ct| mime::Mime::essence_str(ct).to_owned())
            .unwrap_or_default();

        if crate::storage::extension_for(&content_type).is_none() {
            return Err(error::ErrorUnsupportedMediaType(
                "Images must be JPEG, PNG, WebP or GIF.",
            ));
        }

        let mut data: Vec<u8> = Vec::new();
        while let Some(chunk) = field.next().await {
            let bytes = chunk.map_err(|e| {
                log::error!("read_image_field: multipart read error: {}", e);
                error::ErrorBadRequest("Error interpreting user input.")
            })?;

            if data.len() + bytes.len() > max_bytes {
                return Err(error::ErrorPayloadTooLarge(format!(
                    "Images may not exceed {} MB.",
                    max_bytes / 1024 / 1024
                )));
            }
            data.extend_from_slice(&bytes);
        }

        if data.is_empty() {
            return Err(error::ErrorBadRequest("Upload is empty or improper."));
        }

        return Ok(ImageUpload { data, content_type });
    }

    Err(error::ErrorBadRequest(format!(
        "Missing '{}' field.",
        UPLOAD_FIELD_NAME
    )))
}

/// Store an upload and return its key.
pub async fn store_upload(upload: ImageUpload) -> Result<String, Error> {
    crate::storage::store_image(upload.data, &upload.content_type)
        .await
        .map_err(|e| {
            log::error!("Failed to store upload: {}", e);
            error::ErrorInternalServerError("Failed to store upload.")
        })
}

#[get("/uploads/{key}")]
async fn view_upload(req: HttpRequest, key: web::Path<String>) -> Result<HttpResponse, Error> {
    let storage = get_storage()
        .ok_or_else(|| error::ErrorServiceUnavailable("Storage is not configured."))?;

    let range = req
        .headers()
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let object = match storage.get_object(&key, range).await {
        Ok(object) => object,
        Err(StorageError::NotFound(_)) | Err(StorageError::InvalidKey(_)) => {
            return Err(error::ErrorNotFound("Upload not found."))
        }
        Err(StorageError::InvalidRange(msg)) => {
            return Err(error::InternalError::new(msg, StatusCode::RANGE_NOT_SATISFIABLE).into())
        }
        Err(e) => {
            log::error!("view_upload: {}", e);
            return Err(error::ErrorInternalServerError("Failed to read upload."));
        }
    };

    let mut response = if object.content_range.is_some() {
        HttpResponse::PartialContent()
    } else {
        HttpResponse::Ok()
    };

    if let Some(content_type) = object.content_type {
        response.insert_header((header::CONTENT_TYPE, content_type));
    }
    if let Some(range) = object.content_range {
        response.insert_header((header::CONTENT_RANGE, range));
    }
    if let Some(accept) = object.accept_ranges {
        response.insert_header((header::ACCEPT_RANGES, accept));
    }
    if let Some(e_tag) = object.e_tag {
        response.insert_header((header::ETAG, e_tag));
    }
    if let Some(modified) = object.last_modified {
        response.insert_header((header::LAST_MODIFIED, modified));
    }
    // Keys are content hashes, so an object never changes.
    response.insert_header((header::CACHE_CONTROL, "public, max-age=31536000, immutable"));

    Ok(response.streaming(object.body))
}
