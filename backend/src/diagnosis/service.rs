use actix_web::web;
use futures::future::BoxFuture;
use shared::DiagnosisResponse;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use super::DiagnosisError;
use super::models::{HealthAssessment, ImageUpload};
use crate::auth::AuthUser;
use crate::db::DomainStore;
use crate::db::models::DiseaseHistory;
use crate::inference::labels::parse_label;
use crate::inference::model::{Classifier, InferenceError};
use crate::inference::quality::{QualityVerdict, check_image_quality};
use crate::inference::{Prediction, predict};
use crate::notify::{DiagnosisReport, Notifier};
use crate::storage::{
    BlobStore, StorageError, calculate_image_hash, extract_file_extension, generate_object_key,
    validate_image_size,
};

#[derive(Debug, Clone, Copy)]
pub struct DiagnosisTimeouts {
    pub inference: Duration,
    pub storage: Duration,
    pub notify: Duration,
}

/// Runs one upload through storage, the quality gate, the classifier and the
/// plant/disease lookup, then records the outcome and emails the user.
///
/// Nothing is written to history before the crop and disease resolve, and the
/// email is only attempted after the history row is stored. Email failures are
/// logged and never change the response.
#[derive(Clone)]
pub struct DiagnosisService {
    blob_store: Arc<dyn BlobStore>,
    store: Arc<dyn DomainStore>,
    notifier: Arc<dyn Notifier>,
    classifier: Arc<dyn Classifier>,
    timeouts: DiagnosisTimeouts,
    max_upload_bytes: usize,
}

impl DiagnosisService {
    pub fn new(
        blob_store: Arc<dyn BlobStore>,
        store: Arc<dyn DomainStore>,
        notifier: Arc<dyn Notifier>,
        classifier: Arc<dyn Classifier>,
        timeouts: DiagnosisTimeouts,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            blob_store,
            store,
            notifier,
            classifier,
            timeouts,
            max_upload_bytes,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub async fn diagnose(
        &self,
        user: &AuthUser,
        upload: ImageUpload,
    ) -> Result<DiagnosisResponse, DiagnosisError> {
        let extension = self.validate_upload(&upload)?;

        let image_hash = calculate_image_hash(&upload.data);
        let key = generate_object_key(user.id, &image_hash, extension);
        let stored_key = self
            .with_storage_timeout(self.blob_store.save(&key, &upload.data, &upload.mime_type))
            .await
            .inspect_err(|e| log::error!("Failed to store upload {}: {}", key, e))?;
        let image_url = self.blob_store.public_url(&stored_key);

        let image_data = Arc::new(
            self.with_storage_timeout(self.blob_store.read(&stored_key))
                .await
                .inspect_err(|e| log::error!("Failed to read back upload {}: {}", stored_key, e))?,
        );

        let verdict = self.check_quality(image_data.clone(), stored_key.clone()).await?;
        if !verdict.is_usable() {
            log::warn!("Image quality insufficient: {} ({:?})", stored_key, verdict);
            return Err(DiagnosisError::Quality(verdict));
        }

        let prediction = self
            .run_inference(image_data)
            .await
            .inspect_err(|e| log::error!("Error during prediction for {}: {}", stored_key, e))?;
        log::debug!(
            "Class {} ({}) for {} with confidence {:.4}",
            prediction.index,
            prediction.label,
            stored_key,
            prediction.confidence
        );

        let parsed = parse_label(prediction.label);
        let assessment = HealthAssessment::from_prediction(&parsed);

        let plant = match self.store.find_plant_by_name(&parsed.crop).await? {
            Some(plant) => plant,
            None => {
                log::error!("Plant not found in store: {}", parsed.crop);
                return Err(DiagnosisError::UnknownCrop(parsed.crop));
            }
        };

        let disease = match &assessment.disease_name {
            Some(name) => match self.store.find_disease(name, &plant).await? {
                Some(disease) => Some(disease),
                None => {
                    log::error!("Disease '{}' not found for plant '{}'", name, plant.name);
                    return Err(DiagnosisError::UnknownDisease {
                        disease: name.clone(),
                        plant: plant.name.clone(),
                    });
                }
            },
            None => None,
        };

        let entry = DiseaseHistory::new(
            user.id,
            &plant,
            disease.as_ref(),
            assessment.status,
            image_url.clone(),
        );
        self.store
            .create_history(&entry)
            .await
            .inspect_err(|e| log::error!("Failed to record diagnosis {}: {}", entry.id, e))?;
        log::info!(
            "Recorded diagnosis {} for user {}: {} / {}",
            entry.id,
            user.id,
            plant.name,
            parsed.disease
        );

        let report = DiagnosisReport {
            recipient_email: user.email.clone(),
            recipient_name: if user.name.is_empty() {
                user.email.clone()
            } else {
                user.name.clone()
            },
            crop: parsed.crop.clone(),
            disease_name: assessment.disease_name.clone(),
            status: assessment.status,
            message: assessment.message.clone(),
            image_url: image_url.clone(),
        };
        self.send_report(&report).await;

        Ok(DiagnosisResponse {
            condition_status: assessment.status,
            crop: parsed.crop,
            disease_name: assessment.disease_name,
            prediction_raw: prediction.label.to_string(),
            message: assessment.message,
            image_url,
        })
    }

    fn validate_upload(&self, upload: &ImageUpload) -> Result<&'static str, DiagnosisError> {
        if upload.data.is_empty() {
            log::warn!("Invalid image upload: empty body");
            return Err(DiagnosisError::Validation("No image was provided.".into()));
        }
        if validate_image_size(&upload.data, self.max_upload_bytes).is_err() {
            log::warn!(
                "Invalid image upload: {} bytes exceeds limit of {}",
                upload.data.len(),
                self.max_upload_bytes
            );
            return Err(DiagnosisError::Validation(format!(
                "Image exceeds the maximum upload size of {} bytes.",
                self.max_upload_bytes
            )));
        }
        extract_file_extension(&upload.mime_type).map_err(|_| {
            log::warn!("Invalid image upload: unsupported type {}", upload.mime_type);
            DiagnosisError::Validation(format!(
                "Unsupported image type '{}'. Upload a JPEG or PNG image.",
                upload.mime_type
            ))
        })
    }

    async fn with_storage_timeout<T>(
        &self,
        operation: BoxFuture<'_, Result<T, StorageError>>,
    ) -> Result<T, StorageError> {
        match timeout(self.timeouts.storage, operation).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(self.timeouts.storage)),
        }
    }

    async fn check_quality(
        &self,
        image_data: Arc<Vec<u8>>,
        image_ref: String,
    ) -> Result<QualityVerdict, DiagnosisError> {
        web::block(move || check_image_quality(&image_data, &image_ref))
            .await
            .map_err(|e| {
                log::error!("Quality check task failed: {}", e);
                DiagnosisError::Inference(InferenceError::Blocking(e.to_string()))
            })
    }

    async fn run_inference(&self, image_data: Arc<Vec<u8>>) -> Result<Prediction, InferenceError> {
        let classifier = self.classifier.clone();
        let task = web::block(move || predict(classifier.as_ref(), &image_data));
        match timeout(self.timeouts.inference, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(InferenceError::Blocking(e.to_string())),
            Err(_) => Err(InferenceError::Timeout(self.timeouts.inference)),
        }
    }

    async fn send_report(&self, report: &DiagnosisReport) {
        match timeout(
            self.timeouts.notify,
            self.notifier.send_diagnosis_report(report),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("Failed to send detection email: {}", e),
            Err(_) => log::error!(
                "Failed to send detection email: timed out after {:?}",
                self.timeouts.notify
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::models::{Disease, Plant};
    use crate::db::seed::seed_vocabulary;
    use crate::db::{MemoryRepository, RepositoryError};
    use crate::diagnosis::QUALITY_MESSAGE;
    use crate::inference::quality::tests::solid_png;
    use crate::inference::tests::{FixedClassifier, NanClassifier};
    use crate::notify::NotifyError;
    use actix_web::ResponseError;
    use actix_web::http::StatusCode;
    use futures::FutureExt;
    use futures::future::ready;
    use ndarray::Array4;
    use shared::HealthStatus;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Blob store backed by a map.
    #[derive(Default)]
    pub(crate) struct MemoryBlobStore {
        pub objects: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl BlobStore for MemoryBlobStore {
        fn save<'a>(
            &'a self,
            key: &'a str,
            data: &'a [u8],
            _mime_type: &'a str,
        ) -> BoxFuture<'a, Result<String, StorageError>> {
            self.objects
                .lock()
                .unwrap()
                .insert(key.to_string(), data.to_vec());
            ready(Ok(key.to_string())).boxed()
        }

        fn read<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>, StorageError>> {
            let result = self
                .objects
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| StorageError::InvalidKey(key.to_string()));
            ready(result).boxed()
        }

        fn public_url(&self, key: &str) -> String {
            format!("http://localhost:8081/media/{}", key)
        }
    }

    /// Counts report attempts and optionally fails every one of them.
    #[derive(Default)]
    pub(crate) struct SpyNotifier {
        pub calls: AtomicUsize,
        pub fail: bool,
        pub last: Mutex<Option<DiagnosisReport>>,
    }

    impl SpyNotifier {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Notifier for SpyNotifier {
        fn send_diagnosis_report<'a>(
            &'a self,
            report: &'a DiagnosisReport,
        ) -> BoxFuture<'a, Result<(), NotifyError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(report.clone());
            if self.fail {
                ready(Err(NotifyError::NotConfigured("forced failure"))).boxed()
            } else {
                ready(Ok(())).boxed()
            }
        }
    }

    /// Delegates to a memory repository but refuses history writes.
    struct HistoryFailingStore(MemoryRepository);

    impl DomainStore for HistoryFailingStore {
        fn find_plant_by_name<'a>(
            &'a self,
            name: &'a str,
        ) -> BoxFuture<'a, Result<Option<Plant>, RepositoryError>> {
            self.0.find_plant_by_name(name)
        }

        fn find_disease<'a>(
            &'a self,
            name: &'a str,
            plant: &'a Plant,
        ) -> BoxFuture<'a, Result<Option<Disease>, RepositoryError>> {
            self.0.find_disease(name, plant)
        }

        fn create_history<'a>(
            &'a self,
            _entry: &'a DiseaseHistory,
        ) -> BoxFuture<'a, Result<(), RepositoryError>> {
            ready(Err(RepositoryError::DynamoDb("history table unavailable".into()))).boxed()
        }

        fn get_or_create_plant<'a>(
            &'a self,
            name: &'a str,
        ) -> BoxFuture<'a, Result<Plant, RepositoryError>> {
            self.0.get_or_create_plant(name)
        }

        fn get_or_create_disease<'a>(
            &'a self,
            name: &'a str,
            plant: &'a Plant,
        ) -> BoxFuture<'a, Result<Disease, RepositoryError>> {
            self.0.get_or_create_disease(name, plant)
        }

        fn list_diseases(&self) -> BoxFuture<'_, Result<Vec<(Plant, Disease)>, RepositoryError>> {
            self.0.list_diseases()
        }
    }

    struct SlowClassifier(Duration);

    impl Classifier for SlowClassifier {
        fn logits(&self, _input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
            std::thread::sleep(self.0);
            Ok(vec![0.0; 38])
        }

        fn num_classes(&self) -> usize {
            38
        }
    }

    pub(crate) fn timeouts() -> DiagnosisTimeouts {
        DiagnosisTimeouts {
            inference: Duration::from_secs(30),
            storage: Duration::from_secs(5),
            notify: Duration::from_secs(5),
        }
    }

    pub(crate) fn user() -> AuthUser {
        AuthUser {
            id: Uuid::parse_str("6f1c2f43-3a8e-4b55-9a0f-8f1f3f4c5d6e").unwrap(),
            email: "grower@example.com".into(),
            name: "Sam".into(),
        }
    }

    fn png_upload(value: u8) -> ImageUpload {
        ImageUpload {
            data: solid_png(300, 300, value),
            mime_type: "image/png".into(),
        }
    }

    async fn seeded_repo() -> MemoryRepository {
        let repo = MemoryRepository::new();
        seed_vocabulary(&repo).await.unwrap();
        repo
    }

    fn service(
        store: Arc<dyn DomainStore>,
        notifier: Arc<SpyNotifier>,
        classifier: Arc<dyn Classifier>,
    ) -> DiagnosisService {
        DiagnosisService::new(
            Arc::new(MemoryBlobStore::default()),
            store,
            notifier,
            classifier,
            timeouts(),
            1024 * 1024,
        )
    }

    fn hot(index: usize) -> Arc<dyn Classifier> {
        Arc::new(FixedClassifier {
            hot: index,
            width: 38,
        })
    }

    #[actix_web::test]
    async fn healthy_prediction_records_history_and_notifies_once() {
        let repo = seeded_repo().await;
        let notifier = Arc::new(SpyNotifier::default());
        // 3 = Apple___healthy
        let service = service(Arc::new(repo.clone()), notifier.clone(), hot(3));

        let response = service.diagnose(&user(), png_upload(180)).await.unwrap();

        assert_eq!(response.condition_status, HealthStatus::Healthy);
        assert_eq!(response.crop, "Apple");
        assert_eq!(response.disease_name, None);
        assert_eq!(response.prediction_raw, "Apple___healthy");
        assert_eq!(response.message, "The plant is healthy.");
        assert!(response.image_url.starts_with(&format!(
            "http://localhost:8081/media/detection/{}/",
            user().id
        )));
        assert!(response.image_url.ends_with(".png"));

        let history = repo.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].disease_id, None);
        assert_eq!(history[0].status, HealthStatus::Healthy);
        assert_eq!(history[0].user_id, user().id);
        assert_eq!(history[0].image_url, response.image_url);

        assert_eq!(notifier.call_count(), 1);
        let report = notifier.last.lock().unwrap().clone().unwrap();
        assert_eq!(report.recipient_email, "grower@example.com");
        assert_eq!(report.disease_name, None);
    }

    #[actix_web::test]
    async fn diseased_prediction_links_the_disease_row() {
        let repo = seeded_repo().await;
        let notifier = Arc::new(SpyNotifier::default());
        // 1 = Apple___Black_rot
        let service = service(Arc::new(repo.clone()), notifier.clone(), hot(1));

        let response = service.diagnose(&user(), png_upload(180)).await.unwrap();
        assert_eq!(response.condition_status, HealthStatus::Unhealthy);
        assert_eq!(response.disease_name.as_deref(), Some("Black Rot"));
        assert_eq!(
            response.message,
            "The plant is not healthy and is affected by Black Rot."
        );

        let apple = repo.find_plant_by_name("Apple").await.unwrap().unwrap();
        let black_rot = repo.find_disease("Black Rot", &apple).await.unwrap().unwrap();
        assert_eq!(repo.history().unwrap()[0].disease_id, Some(black_rot.id));
    }

    #[actix_web::test]
    async fn unknown_crop_is_not_found_without_side_effects() {
        let repo = MemoryRepository::new();
        let notifier = Arc::new(SpyNotifier::default());
        let service = service(Arc::new(repo.clone()), notifier.clone(), hot(1));

        let error = service.diagnose(&user(), png_upload(180)).await.unwrap_err();

        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
        assert!(matches!(error, DiagnosisError::UnknownCrop(ref crop) if crop == "Apple"));
        assert!(repo.history().unwrap().is_empty());
        assert_eq!(notifier.call_count(), 0);
    }

    #[actix_web::test]
    async fn unknown_disease_is_distinct_from_unknown_crop() {
        let repo = MemoryRepository::new();
        repo.get_or_create_plant("Apple").await.unwrap();
        let notifier = Arc::new(SpyNotifier::default());
        let service = service(Arc::new(repo.clone()), notifier.clone(), hot(1));

        let error = service.diagnose(&user(), png_upload(180)).await.unwrap_err();

        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            error.client_message(),
            "Disease 'Black Rot' not found for plant 'Apple'."
        );
        assert!(repo.history().unwrap().is_empty());
        assert_eq!(notifier.call_count(), 0);
    }

    #[actix_web::test]
    async fn notifier_failure_does_not_change_the_response() {
        let ok_repo = seeded_repo().await;
        let ok_notifier = Arc::new(SpyNotifier::default());
        let ok_service = service(Arc::new(ok_repo), ok_notifier.clone(), hot(30));

        let failing_repo = seeded_repo().await;
        let failing_notifier = Arc::new(SpyNotifier::failing());
        let failing_service = service(
            Arc::new(failing_repo.clone()),
            failing_notifier.clone(),
            hot(30),
        );

        let expected = ok_service.diagnose(&user(), png_upload(180)).await.unwrap();
        let actual = failing_service
            .diagnose(&user(), png_upload(180))
            .await
            .unwrap();

        assert_eq!(actual, expected);
        assert_eq!(failing_notifier.call_count(), 1);
        assert_eq!(failing_repo.history().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn history_failure_skips_notification() {
        let store = HistoryFailingStore(seeded_repo().await);
        let notifier = Arc::new(SpyNotifier::default());
        let service = service(Arc::new(store), notifier.clone(), hot(3));

        let error = service.diagnose(&user(), png_upload(180)).await.unwrap_err();

        assert!(matches!(error, DiagnosisError::Repository(_)));
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(notifier.call_count(), 0);
    }

    #[actix_web::test]
    async fn dark_image_fails_the_quality_gate() {
        let repo = seeded_repo().await;
        let notifier = Arc::new(SpyNotifier::default());
        let service = service(Arc::new(repo.clone()), notifier.clone(), hot(3));

        let error = service.diagnose(&user(), png_upload(10)).await.unwrap_err();

        assert!(matches!(
            error,
            DiagnosisError::Quality(QualityVerdict::TooDark { .. })
        ));
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(error.client_message(), QUALITY_MESSAGE);
        assert!(repo.history().unwrap().is_empty());
        assert_eq!(notifier.call_count(), 0);
    }

    #[actix_web::test]
    async fn unsupported_mime_type_is_rejected_before_storage() {
        let blob_store = Arc::new(MemoryBlobStore::default());
        let notifier = Arc::new(SpyNotifier::default());
        let service = DiagnosisService::new(
            blob_store.clone(),
            Arc::new(seeded_repo().await),
            notifier,
            hot(3),
            timeouts(),
            1024 * 1024,
        );
        let upload = ImageUpload {
            data: solid_png(300, 300, 180),
            mime_type: "image/gif".into(),
        };

        let error = service.diagnose(&user(), upload).await.unwrap_err();

        assert!(matches!(error, DiagnosisError::Validation(_)));
        assert!(blob_store.objects.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn empty_and_oversized_uploads_are_rejected() {
        let notifier = Arc::new(SpyNotifier::default());
        let service = DiagnosisService::new(
            Arc::new(MemoryBlobStore::default()),
            Arc::new(MemoryRepository::new()),
            notifier,
            hot(3),
            timeouts(),
            16,
        );

        let empty = ImageUpload {
            data: Vec::new(),
            mime_type: "image/png".into(),
        };
        assert!(matches!(
            service.diagnose(&user(), empty).await,
            Err(DiagnosisError::Validation(_))
        ));
        assert!(matches!(
            service.diagnose(&user(), png_upload(180)).await,
            Err(DiagnosisError::Validation(_))
        ));
    }

    #[actix_web::test]
    async fn wrong_head_width_is_a_generic_server_error() {
        let repo = seeded_repo().await;
        let notifier = Arc::new(SpyNotifier::default());
        let classifier = Arc::new(FixedClassifier { hot: 0, width: 10 });
        let service = service(Arc::new(repo.clone()), notifier.clone(), classifier);

        let error = service.diagnose(&user(), png_upload(180)).await.unwrap_err();

        assert!(matches!(error, DiagnosisError::Inference(_)));
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(repo.history().unwrap().is_empty());
        assert_eq!(notifier.call_count(), 0);
    }

    #[actix_web::test]
    async fn nan_logits_fail_without_side_effects() {
        let repo = seeded_repo().await;
        let notifier = Arc::new(SpyNotifier::default());
        let service = service(Arc::new(repo.clone()), notifier.clone(), Arc::new(NanClassifier));

        let error = service.diagnose(&user(), png_upload(180)).await.unwrap_err();

        assert!(matches!(
            error,
            DiagnosisError::Inference(InferenceError::NonFiniteOutput(5))
        ));
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(repo.history().unwrap().is_empty());
        assert_eq!(notifier.call_count(), 0);
    }

    #[actix_web::test]
    async fn slow_inference_times_out_as_inference_error() {
        let repo = seeded_repo().await;
        let notifier = Arc::new(SpyNotifier::default());
        let service = DiagnosisService::new(
            Arc::new(MemoryBlobStore::default()),
            Arc::new(repo.clone()),
            notifier.clone(),
            Arc::new(SlowClassifier(Duration::from_millis(500))),
            DiagnosisTimeouts {
                inference: Duration::from_millis(50),
                ..timeouts()
            },
            1024 * 1024,
        );

        let error = service.diagnose(&user(), png_upload(180)).await.unwrap_err();

        assert!(matches!(
            error,
            DiagnosisError::Inference(InferenceError::Timeout(_))
        ));
        assert!(repo.history().unwrap().is_empty());
        assert_eq!(notifier.call_count(), 0);
    }
}
