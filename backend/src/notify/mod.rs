pub mod brevo_service;

use futures::future::BoxFuture;
use shared::HealthStatus;

pub use brevo_service::BrevoNotifier;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notifier is not configured: {0}")]
    NotConfigured(&'static str),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Email API rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Everything a diagnosis report needs to reach the user.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosisReport {
    pub recipient_email: String,
    pub recipient_name: String,
    pub crop: String,
    pub disease_name: Option<String>,
    pub status: HealthStatus,
    pub message: String,
    pub image_url: String,
}

pub trait Notifier: Send + Sync {
    fn send_diagnosis_report<'a>(
        &'a self,
        report: &'a DiagnosisReport,
    ) -> BoxFuture<'a, Result<(), NotifyError>>;
}
