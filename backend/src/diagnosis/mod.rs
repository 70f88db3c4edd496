pub mod models;
pub mod service;

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use shared::ErrorResponse;

use crate::db::RepositoryError;
use crate::inference::model::InferenceError;
use crate::inference::quality::QualityVerdict;
use crate::storage::StorageError;

pub use models::ImageUpload;
pub use service::{DiagnosisService, DiagnosisTimeouts};

pub const QUALITY_MESSAGE: &str = "Image quality insufficient, please upload a clearer image.";
pub const INTERNAL_MESSAGE: &str = "An internal error occurred while processing the image.";

#[derive(Debug, thiserror::Error)]
pub enum DiagnosisError {
    #[error("{0}")]
    Validation(String),
    #[error("Image quality insufficient, please upload a clearer image.")]
    Quality(QualityVerdict),
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),
    #[error("Plant '{0}' not found in database.")]
    UnknownCrop(String),
    #[error("Disease '{disease}' not found for plant '{plant}'.")]
    UnknownDisease { disease: String, plant: String },
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl DiagnosisError {
    /// Message safe to show the caller. Server-side failures stay generic.
    pub fn client_message(&self) -> String {
        match self {
            DiagnosisError::Inference(_)
            | DiagnosisError::Storage(_)
            | DiagnosisError::Repository(_) => INTERNAL_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for DiagnosisError {
    fn status_code(&self) -> StatusCode {
        match self {
            DiagnosisError::Validation(_) | DiagnosisError::Quality(_) => StatusCode::BAD_REQUEST,
            DiagnosisError::UnknownCrop(_) | DiagnosisError::UnknownDisease { .. } => {
                StatusCode::NOT_FOUND
            }
            DiagnosisError::Inference(_)
            | DiagnosisError::Storage(_)
            | DiagnosisError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse::new(self.client_message()))
    }
}
