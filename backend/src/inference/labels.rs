use std::collections::HashMap;

/// Delimiter between the crop and the disease token of a label.
pub const LABEL_DELIMITER: &str = "___";
pub const HEALTHY_TOKEN: &str = "healthy";
pub const HEALTHY: &str = "Healthy";
pub const UNKNOWN: &str = "-";

/// Class names in the order of the classifier's output layer. The index of a
/// label here is the index of its logit, so this list must never be reordered
/// without retraining the model.
pub const LABELS: [&str; 38] = [
    "Apple___Apple_scab",
    "Apple___Black_rot",
    "Apple___Cedar_apple_rust",
    "Apple___healthy",
    "Blueberry___healthy",
    "Cherry_(including_sour)___healthy",
    "Cherry_(including_sour)___Powdery_mildew",
    "Corn_(maize)___Cercospora_leaf_spot Gray_leaf_spot",
    "Corn_(maize)___Common_rust_",
    "Corn_(maize)___healthy",
    "Corn_(maize)___Northern_Leaf_Blight",
    "Grape___Black_rot",
    "Grape___Esca_(Black_Measles)",
    "Grape___healthy",
    "Grape___Leaf_blight_(Isariopsis_Leaf_Spot)",
    "Orange___Haunglongbing_(Citrus_greening)",
    "Peach___Bacterial_spot",
    "Peach___healthy",
    "Pepper,_bell___Bacterial_spot",
    "Pepper,_bell___healthy",
    "Potato___Early_blight",
    "Potato___healthy",
    "Potato___Late_blight",
    "Raspberry___healthy",
    "Soybean___healthy",
    "Squash___Powdery_mildew",
    "Strawberry___healthy",
    "Strawberry___Leaf_scorch",
    "Tomato___Bacterial_spot",
    "Tomato___Early_blight",
    "Tomato___healthy",
    "Tomato___Late_blight",
    "Tomato___Leaf_Mold",
    "Tomato___Septoria_leaf_spot",
    "Tomato___Spider_mites Two-spotted_spider_mite",
    "Tomato___Target_Spot",
    "Tomato___Tomato_mosaic_virus",
    "Tomato___Tomato_Yellow_Leaf_Curl_Virus",
];

pub const NUM_CLASSES: usize = LABELS.len();

lazy_static::lazy_static! {
    static ref LABEL_INDEX: HashMap<&'static str, usize> = LABELS
        .iter()
        .enumerate()
        .map(|(index, label)| (*label, index))
        .collect();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPrediction {
    pub crop: String,
    pub disease: String,
}

impl ParsedPrediction {
    pub fn is_healthy(&self) -> bool {
        self.disease == HEALTHY
    }

    pub fn is_unidentified(&self) -> bool {
        self.disease == UNKNOWN
    }
}

pub fn label_for_index(index: usize) -> Option<&'static str> {
    LABELS.get(index).copied()
}

pub fn index_of_label(label: &str) -> Option<usize> {
    LABEL_INDEX.get(label).copied()
}

/// Splits a raw classifier label into crop and disease.
///
/// `"Apple___Black_rot"` becomes `Apple` / `Black Rot`; the `healthy` token
/// becomes `Healthy`, and a missing token becomes `-`.
pub fn parse_label(label: &str) -> ParsedPrediction {
    if label.is_empty() {
        return ParsedPrediction {
            crop: UNKNOWN.to_string(),
            disease: UNKNOWN.to_string(),
        };
    }

    let mut parts = label.split(LABEL_DELIMITER);
    let crop = match parts.next() {
        Some(crop) if !crop.is_empty() => crop.to_string(),
        _ => UNKNOWN.to_string(),
    };
    let disease_raw = parts.next().unwrap_or(UNKNOWN);

    let disease = if disease_raw == UNKNOWN {
        UNKNOWN.to_string()
    } else if disease_raw == HEALTHY_TOKEN {
        HEALTHY.to_string()
    } else {
        title_case(&disease_raw.replace('_', " "))
    };

    ParsedPrediction { crop, disease }
}

/// Upper-cases every letter that follows a non-letter and lower-cases the
/// rest, so `two-spotted` becomes `Two-Spotted`.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_cased = false;
    for ch in text.chars() {
        if previous_cased {
            out.extend(ch.to_lowercase());
        } else {
            out.extend(ch.to_uppercase());
        }
        previous_cased = ch.is_lowercase() || ch.is_uppercase();
    }
    out
}
