use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::HealthStatus;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plant {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disease {
    pub id: Uuid,
    pub plant_id: Uuid,
    pub name: String,
    /// Storage key of a reference photo of the disease, if one was uploaded.
    pub sample_image: Option<String>,
}

/// One diagnosis event. Written once by the prediction path and never
/// updated by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseHistory {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plant_id: Uuid,
    pub disease_id: Option<Uuid>,
    pub status: HealthStatus,
    pub image_url: String,
    pub date_detected: DateTime<Utc>,
}

impl Plant {
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
        }
    }
}

impl Disease {
    pub fn new(name: &str, plant: &Plant) -> Self {
        Self {
            id: Uuid::new_v4(),
            plant_id: plant.id,
            name: name.to_string(),
            sample_image: None,
        }
    }
}

impl DiseaseHistory {
    pub fn new(
        user_id: Uuid,
        plant: &Plant,
        disease: Option<&Disease>,
        status: HealthStatus,
        image_url: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            plant_id: plant.id,
            disease_id: disease.map(|d| d.id),
            status,
            image_url,
            date_detected: Utc::now(),
        }
    }
}
