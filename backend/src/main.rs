mod auth;
mod config;
mod db;
mod diagnosis;
mod inference;
mod notify;
mod routes;
mod storage;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use auth::JwtService;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;
use config::{AppConfig, ConfigError, DataBackend, StorageBackend};
use db::seed::{VocabularyError, seed_vocabulary, verify_vocabulary};
use db::{DomainStore, DynamoDbRepository, MemoryRepository, RepositoryError};
use diagnosis::{DiagnosisService, DiagnosisTimeouts};
use inference::labels::NUM_CLASSES;
use inference::manifest::{ManifestError, ModelManifest};
use inference::model::{Classifier, InferenceError, PlantDiseaseModel};
use notify::{BrevoNotifier, Notifier};
use routes::configure_routes;
use std::env;
use std::sync::Arc;
use storage::{BlobStore, LocalStorage, S3Service};

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Model manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("Model loading failed: {0}")]
    Model(#[from] InferenceError),
    #[error("Classifier head has {actual} outputs, vocabulary has {expected} labels")]
    HeadWidth { expected: usize, actual: usize },
    #[error("Seeding failed: {0}")]
    Seed(#[from] RepositoryError),
    #[error("Vocabulary check failed: {0}")]
    Vocabulary(#[from] VocabularyError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    match run().await {
        Ok(()) => Ok(()),
        Err(StartupError::Io(e)) => Err(e),
        Err(e) => {
            log::error!("{}", e);
            Err(std::io::Error::other(e.to_string()))
        }
    }
}

async fn run() -> Result<(), StartupError> {
    let config = AppConfig::from_env()?;

    let manifest = ModelManifest::load(&config.model_manifest_path)?;
    manifest.validate()?;
    manifest.verify_weights(&config.model_weights_path)?;
    log::info!(
        "Model manifest {} accepted ({} labels)",
        manifest.version,
        manifest.labels.len()
    );

    let classifier: Arc<dyn Classifier> =
        Arc::new(PlantDiseaseModel::load(&config.model_weights_path, NUM_CLASSES)?);
    if classifier.num_classes() != NUM_CLASSES {
        return Err(StartupError::HeadWidth {
            expected: NUM_CLASSES,
            actual: classifier.num_classes(),
        });
    }

    let (blob_store, media_root) = match &config.storage {
        StorageBackend::Local { media_root } => {
            std::fs::create_dir_all(media_root)?;
            log::info!("Storing uploads under {}", media_root.display());
            let storage: Arc<dyn BlobStore> =
                Arc::new(LocalStorage::new(media_root.clone(), config.media_base_url()));
            (storage, Some(media_root.clone()))
        }
        StorageBackend::S3 {
            bucket,
            public_base,
        } => {
            log::info!("Storing uploads in S3 bucket {}", bucket);
            let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
            let storage: Arc<dyn BlobStore> = Arc::new(S3Service::new(
                S3Client::new(&aws_config),
                bucket.clone(),
                public_base.clone(),
            ));
            (storage, None)
        }
    };

    let store: Arc<dyn DomainStore> = match &config.data {
        DataBackend::Memory => {
            log::warn!("Using in-memory store; history is lost on restart");
            Arc::new(MemoryRepository::new())
        }
        DataBackend::DynamoDb {
            plants_table,
            diseases_table,
            history_table,
        } => {
            log::info!(
                "Using DynamoDB tables {}, {}, {}",
                plants_table,
                diseases_table,
                history_table
            );
            let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
            Arc::new(DynamoDbRepository::new(
                DynamoDbClient::new(&aws_config),
                plants_table.clone(),
                diseases_table.clone(),
                history_table.clone(),
            ))
        }
    };

    if config.seed_on_startup {
        seed_vocabulary(store.as_ref()).await?;
    }
    verify_vocabulary(store.as_ref()).await?;
    log::info!("Every classifier label resolves to a stored plant and disease");

    if config.email.api_key.is_none() {
        log::warn!("BREVO_API_KEY is not set; diagnosis reports will not be emailed");
    }
    let notifier: Arc<dyn Notifier> = Arc::new(BrevoNotifier::new(
        config.email.api_key.clone(),
        config.email.sender_name.clone(),
        config.email.sender_email.clone(),
        config.email.api_url.clone(),
    ));

    let diagnosis_service = DiagnosisService::new(
        blob_store.clone(),
        store.clone(),
        notifier,
        classifier,
        DiagnosisTimeouts {
            inference: config.inference_timeout,
            storage: config.storage_timeout,
            notify: config.notify_timeout,
        },
        config.max_upload_bytes,
    );
    let jwt_service = Arc::new(JwtService::new(&config.jwt_secret));

    let bind_address = config.bind_address();
    log::info!("Starting server on {} ({})", bind_address, config.base_url);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(web::Data::new(diagnosis_service.clone()))
            .app_data(web::Data::from(store.clone()))
            .app_data(web::Data::from(blob_store.clone()))
            .configure(|cfg| configure_routes(cfg, jwt_service.clone(), media_root.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
