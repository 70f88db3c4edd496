use shared::HealthStatus;

use crate::inference::labels::ParsedPrediction;

pub const HEALTHY_MESSAGE: &str = "The plant is healthy.";
pub const UNIDENTIFIED_MESSAGE: &str =
    "The plant is not healthy, but the disease could not be identified.";

/// Raw image bytes as received in the `image` multipart field.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// What a parsed label means for the user: status, optional disease and the
/// sentence shown to them.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthAssessment {
    pub status: HealthStatus,
    pub disease_name: Option<String>,
    pub message: String,
}

impl HealthAssessment {
    pub fn from_prediction(parsed: &ParsedPrediction) -> Self {
        if parsed.is_healthy() {
            Self {
                status: HealthStatus::Healthy,
                disease_name: None,
                message: HEALTHY_MESSAGE.to_string(),
            }
        } else if parsed.is_unidentified() {
            Self {
                status: HealthStatus::Unhealthy,
                disease_name: None,
                message: UNIDENTIFIED_MESSAGE.to_string(),
            }
        } else {
            Self {
                status: HealthStatus::Unhealthy,
                disease_name: Some(parsed.disease.clone()),
                message: format!(
                    "The plant is not healthy and is affected by {}.",
                    parsed.disease
                ),
            }
        }
    }
}
