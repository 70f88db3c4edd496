pub mod dynamodb_repository;
pub mod memory_repository;
pub mod models;
pub mod seed;

use futures::future::BoxFuture;

pub use dynamodb_repository::DynamoDbRepository;
pub use memory_repository::MemoryRepository;
use models::{Disease, DiseaseHistory, Plant};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),
    #[error("Invalid data format: {0}")]
    InvalidData(String),
    #[error("Repository lock poisoned")]
    LockPoisoned,
}

/// Lookup data (plants, diseases) and the diagnosis history log.
pub trait DomainStore: Send + Sync {
    fn find_plant_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Option<Plant>, RepositoryError>>;

    /// Finds a disease by exact name among the diseases of `plant`.
    fn find_disease<'a>(
        &'a self,
        name: &'a str,
        plant: &'a Plant,
    ) -> BoxFuture<'a, Result<Option<Disease>, RepositoryError>>;

    fn create_history<'a>(
        &'a self,
        entry: &'a DiseaseHistory,
    ) -> BoxFuture<'a, Result<(), RepositoryError>>;

    fn get_or_create_plant<'a>(&'a self, name: &'a str)
    -> BoxFuture<'a, Result<Plant, RepositoryError>>;

    fn get_or_create_disease<'a>(
        &'a self,
        name: &'a str,
        plant: &'a Plant,
    ) -> BoxFuture<'a, Result<Disease, RepositoryError>>;

    /// Every disease together with the plant that owns it.
    fn list_diseases(&self) -> BoxFuture<'_, Result<Vec<(Plant, Disease)>, RepositoryError>>;
}
