use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Binary health outcome of a diagnosis. An unhealthy plant whose disease
/// could not be identified is still `Unhealthy`; the message tells them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DiagnosisResponse {
    pub condition_status: HealthStatus,
    pub crop: String,
    pub disease_name: Option<String>,
    pub prediction_raw: String,
    pub message: String,
    pub image_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CropLibraryEntry {
    pub plant_name: String,
    pub disease_name: String,
    pub sample_image_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
