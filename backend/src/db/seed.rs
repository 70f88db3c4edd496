use crate::inference::labels::{LABELS, UNKNOWN, parse_label};

use super::{DomainStore, RepositoryError};

#[derive(Debug, thiserror::Error)]
pub enum VocabularyError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Classifier labels missing from the store: {}", .0.join(", "))]
    Missing(Vec<String>),
}

/// Creates the plant and disease rows for every vocabulary label. Existing
/// rows are left untouched, so running it again is harmless.
pub async fn seed_vocabulary(store: &dyn DomainStore) -> Result<usize, RepositoryError> {
    let mut seeded = 0;
    for label in LABELS {
        let parsed = parse_label(label);
        let plant = store.get_or_create_plant(&parsed.crop).await?;
        store.get_or_create_disease(&parsed.disease, &plant).await?;
        seeded += 1;
    }
    log::info!("Seeded plant and disease rows for {} labels", seeded);
    Ok(seeded)
}

/// Confirms that every label the classifier can emit resolves to a stored
/// plant and, for diseased labels, to a stored disease of that plant.
pub async fn verify_vocabulary(store: &dyn DomainStore) -> Result<(), VocabularyError> {
    let mut missing = Vec::new();
    for label in LABELS {
        let parsed = parse_label(label);
        let Some(plant) = store.find_plant_by_name(&parsed.crop).await? else {
            missing.push(label.to_string());
            continue;
        };
        if parsed.is_healthy() || parsed.disease == UNKNOWN {
            continue;
        }
        if store.find_disease(&parsed.disease, &plant).await?.is_none() {
            missing.push(label.to_string());
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(VocabularyError::Missing(missing))
    }
}
