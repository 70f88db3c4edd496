use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::Client as HttpClient;
use serde::Serialize;

use super::{DiagnosisReport, Notifier, NotifyError};

pub const BREVO_SEND_URL: &str = "https://api.brevo.com/v3/smtp/email";
pub const REPORT_SUBJECT: &str = "Plant Disease Detection Report";

#[derive(Debug, Serialize)]
struct Contact<'a> {
    name: &'a str,
    email: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailRequest<'a> {
    sender: Contact<'a>,
    to: Vec<Contact<'a>>,
    subject: &'a str,
    html_content: String,
    text_content: String,
}

/// Sends diagnosis reports through the Brevo transactional email API.
#[derive(Clone)]
pub struct BrevoNotifier {
    http_client: HttpClient,
    api_key: Option<String>,
    sender_name: String,
    sender_email: String,
    endpoint: String,
}

impl BrevoNotifier {
    pub fn new(
        api_key: Option<String>,
        sender_name: String,
        sender_email: String,
        endpoint: String,
    ) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            sender_name,
            sender_email,
            endpoint,
        }
    }

    pub async fn send_report(&self, report: &DiagnosisReport) -> Result<(), NotifyError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(NotifyError::NotConfigured("BREVO_API_KEY is not set"))?;

        let html_content = render_report_html(report);
        let request = SendEmailRequest {
            sender: Contact {
                name: &self.sender_name,
                email: &self.sender_email,
            },
            to: vec![Contact {
                name: &report.recipient_name,
                email: &report.recipient_email,
            }],
            subject: REPORT_SUBJECT,
            text_content: render_report_text(report),
            html_content,
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .header("api-key", api_key)
            .header("accept", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected { status, body });
        }

        log::info!("Disease report email sent to {}", report.recipient_email);
        Ok(())
    }
}

impl Notifier for BrevoNotifier {
    fn send_diagnosis_report<'a>(
        &'a self,
        report: &'a DiagnosisReport,
    ) -> BoxFuture<'a, Result<(), NotifyError>> {
        self.send_report(report).boxed()
    }
}

fn disease_label(report: &DiagnosisReport) -> &str {
    report.disease_name.as_deref().unwrap_or("Not Identified")
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn render_report_html(report: &DiagnosisReport) -> String {
    format!(
        r#"<html><body>
<h2>{subject}</h2>
<p>Hello {name},</p>
<p>Here are the results of the analysis run on {datetime}.</p>
<table>
<tr><th align="left">Crop</th><td>{crop}</td></tr>
<tr><th align="left">Disease</th><td>{disease}</td></tr>
<tr><th align="left">Health status</th><td>{status}</td></tr>
</table>
<p>{message}</p>
<p><img src="{image_url}" alt="Uploaded leaf" width="256"></p>
</body></html>"#,
        subject = REPORT_SUBJECT,
        name = escape_html(&report.recipient_name),
        datetime = Utc::now().format("%Y-%m-%d %H:%M UTC"),
        crop = escape_html(&report.crop),
        disease = escape_html(disease_label(report)),
        status = report.status,
        message = escape_html(&report.message),
        image_url = escape_html(&report.image_url),
    )
}

pub fn render_report_text(report: &DiagnosisReport) -> String {
    format!(
        "{}\n\nHello {},\n\nCrop: {}\nDisease: {}\nHealth status: {}\n\n{}\n\nImage: {}\n",
        REPORT_SUBJECT,
        report.recipient_name,
        report.crop,
        disease_label(report),
        report.status,
        report.message,
        report.image_url
    )
}
