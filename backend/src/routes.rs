use actix_files::Files;
use actix_multipart::{Field, Multipart};
use actix_web::{HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use shared::CropLibraryEntry;
use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::{AuthMiddleware, AuthenticatedUser, JwtService};
use crate::db::DomainStore;
use crate::diagnosis::{DiagnosisError, DiagnosisService, ImageUpload};
use crate::storage::BlobStore;

pub const IMAGE_FIELD: &str = "image";

pub fn configure_routes(
    cfg: &mut web::ServiceConfig,
    jwt_service: Arc<JwtService>,
    media_root: Option<PathBuf>,
) {
    cfg.service(
        web::resource("/model/predict/")
            .wrap(AuthMiddleware::new(jwt_service))
            .route(web::post().to(predict_image)),
    )
    .service(web::resource("/model/crop-library/").route(web::get().to(crop_library)));

    if let Some(root) = media_root {
        cfg.service(Files::new("/media", root));
    }
}

async fn predict_image(
    service: web::Data<DiagnosisService>,
    user: AuthenticatedUser,
    payload: Multipart,
) -> Result<HttpResponse, DiagnosisError> {
    let upload = read_image_field(payload, service.max_upload_bytes()).await?;
    log::info!(
        "Received {} upload of {} bytes from user {}",
        upload.mime_type,
        upload.data.len(),
        user.0.id
    );
    let response = service.diagnose(&user.0, upload).await?;
    Ok(HttpResponse::Ok().json(response))
}

async fn crop_library(
    store: web::Data<dyn DomainStore>,
    blob_store: web::Data<dyn BlobStore>,
) -> Result<HttpResponse, DiagnosisError> {
    let entries: Vec<CropLibraryEntry> = store
        .list_diseases()
        .await
        .inspect_err(|e| log::error!("Failed to list diseases: {}", e))?
        .into_iter()
        .map(|(plant, disease)| CropLibraryEntry {
            plant_name: plant.name,
            disease_name: disease.name,
            sample_image_url: disease
                .sample_image
                .as_deref()
                .map(|key| blob_store.public_url(key)),
        })
        .collect();
    Ok(HttpResponse::Ok().json(entries))
}

/// Pulls the `image` field out of the form, enforcing the size limit while
/// streaming. Other fields are drained and ignored.
async fn read_image_field(
    mut payload: Multipart,
    max_bytes: usize,
) -> Result<ImageUpload, DiagnosisError> {
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::warn!("Invalid image upload: {}", e);
        DiagnosisError::Validation("Malformed multipart upload.".into())
    })? {
        if field.name() != Some(IMAGE_FIELD) {
            drain(&mut field).await?;
            continue;
        }

        let mime_type = field
            .content_type()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_default();

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| {
                log::warn!("Invalid image upload: {}", e);
                DiagnosisError::Validation("Malformed multipart upload.".into())
            })?;
            if data.len() + chunk.len() > max_bytes {
                log::warn!("Invalid image upload: exceeds limit of {} bytes", max_bytes);
                return Err(DiagnosisError::Validation(format!(
                    "Image exceeds the maximum upload size of {} bytes.",
                    max_bytes
                )));
            }
            data.extend_from_slice(&chunk);
        }
        return Ok(ImageUpload { data, mime_type });
    }

    log::warn!("Invalid image upload: no '{}' field", IMAGE_FIELD);
    Err(DiagnosisError::Validation(format!(
        "The '{}' field is required.",
        IMAGE_FIELD
    )))
}

async fn drain(field: &mut Field) -> Result<(), DiagnosisError> {
    while let Some(chunk) = field.next().await {
        chunk.map_err(|_| DiagnosisError::Validation("Malformed multipart upload.".into()))?;
    }
    Ok(())
}
