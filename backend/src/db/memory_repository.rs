use futures::FutureExt;
use futures::future::{BoxFuture, ready};
use std::sync::{Arc, RwLock};

use super::models::{Disease, DiseaseHistory, Plant};
use super::{DomainStore, RepositoryError};

#[derive(Default)]
struct Tables {
    plants: Vec<Plant>,
    diseases: Vec<Disease>,
    history: Vec<DiseaseHistory>,
}

/// In-process store for local runs and tests. Contents are lost on restart.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn history(&self) -> Result<Vec<DiseaseHistory>, RepositoryError> {
        let tables = self.tables.read().map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(tables.history.clone())
    }

    fn plant_by_name(&self, name: &str) -> Result<Option<Plant>, RepositoryError> {
        let tables = self.tables.read().map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(tables.plants.iter().find(|p| p.name == name).cloned())
    }

    fn disease_by_name(&self, name: &str, plant: &Plant) -> Result<Option<Disease>, RepositoryError> {
        let tables = self.tables.read().map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(tables
            .diseases
            .iter()
            .find(|d| d.name == name && d.plant_id == plant.id)
            .cloned())
    }

    fn insert_history(&self, entry: &DiseaseHistory) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().map_err(|_| RepositoryError::LockPoisoned)?;
        tables.history.push(entry.clone());
        Ok(())
    }

    fn upsert_plant(&self, name: &str) -> Result<Plant, RepositoryError> {
        let mut tables = self.tables.write().map_err(|_| RepositoryError::LockPoisoned)?;
        if let Some(existing) = tables.plants.iter().find(|p| p.name == name) {
            return Ok(existing.clone());
        }
        let plant = Plant::new(name);
        tables.plants.push(plant.clone());
        Ok(plant)
    }

    fn upsert_disease(&self, name: &str, plant: &Plant) -> Result<Disease, RepositoryError> {
        let mut tables = self.tables.write().map_err(|_| RepositoryError::LockPoisoned)?;
        if let Some(existing) = tables
            .diseases
            .iter()
            .find(|d| d.name == name && d.plant_id == plant.id)
        {
            return Ok(existing.clone());
        }
        let disease = Disease::new(name, plant);
        tables.diseases.push(disease.clone());
        Ok(disease)
    }

    fn all_diseases(&self) -> Result<Vec<(Plant, Disease)>, RepositoryError> {
        let tables = self.tables.read().map_err(|_| RepositoryError::LockPoisoned)?;
        tables
            .diseases
            .iter()
            .map(|disease| {
                tables
                    .plants
                    .iter()
                    .find(|p| p.id == disease.plant_id)
                    .map(|plant| (plant.clone(), disease.clone()))
                    .ok_or_else(|| {
                        RepositoryError::InvalidData(format!(
                            "disease {} references unknown plant {}",
                            disease.id, disease.plant_id
                        ))
                    })
            })
            .collect()
    }
}

impl DomainStore for MemoryRepository {
    fn find_plant_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Option<Plant>, RepositoryError>> {
        ready(self.plant_by_name(name)).boxed()
    }

    fn find_disease<'a>(
        &'a self,
        name: &'a str,
        plant: &'a Plant,
    ) -> BoxFuture<'a, Result<Option<Disease>, RepositoryError>> {
        ready(self.disease_by_name(name, plant)).boxed()
    }

    fn create_history<'a>(
        &'a self,
        entry: &'a DiseaseHistory,
    ) -> BoxFuture<'a, Result<(), RepositoryError>> {
        ready(self.insert_history(entry)).boxed()
    }

    fn get_or_create_plant<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Plant, RepositoryError>> {
        ready(self.upsert_plant(name)).boxed()
    }

    fn get_or_create_disease<'a>(
        &'a self,
        name: &'a str,
        plant: &'a Plant,
    ) -> BoxFuture<'a, Result<Disease, RepositoryError>> {
        ready(self.upsert_disease(name, plant)).boxed()
    }

    fn list_diseases(&self) -> BoxFuture<'_, Result<Vec<(Plant, Disease)>, RepositoryError>> {
        ready(self.all_diseases()).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::HealthStatus;
    use uuid::Uuid;

    #[actix_web::test]
    async fn get_or_create_is_idempotent() {
        let repo = MemoryRepository::new();
        let first = repo.get_or_create_plant("Apple").await.unwrap();
        let second = repo.get_or_create_plant("Apple").await.unwrap();
        assert_eq!(first, second);

        let scab = repo.get_or_create_disease("Apple Scab", &first).await.unwrap();
        let again = repo.get_or_create_disease("Apple Scab", &first).await.unwrap();
        assert_eq!(scab, again);
        assert_eq!(repo.list_diseases().await.unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn disease_lookup_is_scoped_to_plant() {
        let repo = MemoryRepository::new();
        let grape = repo.get_or_create_plant("Grape").await.unwrap();
        let apple = repo.get_or_create_plant("Apple").await.unwrap();
        repo.get_or_create_disease("Black Rot", &grape).await.unwrap();

        assert!(repo.find_disease("Black Rot", &grape).await.unwrap().is_some());
        assert!(repo.find_disease("Black Rot", &apple).await.unwrap().is_none());
        assert!(repo.find_plant_by_name("apple").await.unwrap().is_none());
    }

    #[actix_web::test]
    async fn history_is_appended() {
        let repo = MemoryRepository::new();
        let plant = repo.get_or_create_plant("Peach").await.unwrap();
        let entry = DiseaseHistory::new(
            Uuid::new_v4(),
            &plant,
            None,
            HealthStatus::Healthy,
            "http://localhost/media/x.png".into(),
        );
        repo.create_history(&entry).await.unwrap();
        assert_eq!(repo.history().unwrap(), vec![entry]);
    }
}
