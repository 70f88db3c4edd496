use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::notify::brevo_service::BREVO_SEND_URL;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    Local { media_root: PathBuf },
    S3 { bucket: String, public_base: Url },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataBackend {
    Memory,
    DynamoDb {
        plants_table: String,
        diseases_table: String,
        history_table: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailConfig {
    pub api_key: Option<String>,
    pub api_url: String,
    pub sender_name: String,
    pub sender_email: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    pub base_url: Url,
    pub jwt_secret: String,
    pub model_weights_path: PathBuf,
    pub model_manifest_path: PathBuf,
    pub storage: StorageBackend,
    pub data: DataBackend,
    pub seed_on_startup: bool,
    pub email: EmailConfig,
    pub inference_timeout: Duration,
    pub storage_timeout: Duration,
    pub notify_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any name -> value lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let port: u16 = vars.parse_or("PORT", 8081)?;
        let base_url = vars.url_or("BASE_URL", &format!("http://localhost:{}", port))?;
        let jwt_secret = vars.required("JWT_SECRET")?;

        let storage = match vars.or("STORAGE_BACKEND", "local").as_str() {
            "local" => StorageBackend::Local {
                media_root: PathBuf::from(vars.or("MEDIA_ROOT", "media")),
            },
            "s3" => {
                let bucket = vars.required("S3_BUCKET_NAME")?;
                let public_base = vars.url_or(
                    "S3_PUBLIC_BASE_URL",
                    &format!("https://{}.s3.amazonaws.com", bucket),
                )?;
                StorageBackend::S3 {
                    bucket,
                    public_base,
                }
            }
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORAGE_BACKEND",
                    value: other.to_string(),
                });
            }
        };

        let data = match vars.or("DATA_BACKEND", "memory").as_str() {
            "memory" => DataBackend::Memory,
            "dynamodb" => DataBackend::DynamoDb {
                plants_table: vars.required("DYNAMODB_PLANTS_TABLE")?,
                diseases_table: vars.required("DYNAMODB_DISEASES_TABLE")?,
                history_table: vars.required("DYNAMODB_HISTORY_TABLE")?,
            },
            other => {
                return Err(ConfigError::Invalid {
                    name: "DATA_BACKEND",
                    value: other.to_string(),
                });
            }
        };

        Ok(Self {
            port,
            base_url,
            jwt_secret,
            model_weights_path: PathBuf::from(
                vars.or("MODEL_WEIGHTS_PATH", "model/plant-disease-model.safetensors"),
            ),
            model_manifest_path: PathBuf::from(
                vars.or("MODEL_MANIFEST_PATH", "config/model_manifest.yaml"),
            ),
            storage,
            data,
            seed_on_startup: vars.parse_or("SEED_ON_STARTUP", true)?,
            email: EmailConfig {
                api_key: vars.optional("BREVO_API_KEY"),
                api_url: vars.or("BREVO_API_URL", BREVO_SEND_URL),
                sender_name: vars.or("EMAIL_SENDER_NAME", "Plant-Disease"),
                sender_email: vars.or("EMAIL_SENDER_EMAIL", "no-reply@plant-disease.local"),
            },
            inference_timeout: Duration::from_secs(vars.parse_or("INFERENCE_TIMEOUT_SECS", 30)?),
            storage_timeout: Duration::from_secs(vars.parse_or("STORAGE_TIMEOUT_SECS", 15)?),
            notify_timeout: Duration::from_secs(vars.parse_or("NOTIFY_TIMEOUT_SECS", 10)?),
            max_upload_bytes: vars.parse_or("MAX_UPLOAD_BYTES", 50 * 1024 * 1024)?,
        })
    }

    /// Public base URL for locally stored media, `<BASE_URL>/media/`.
    pub fn media_base_url(&self) -> Url {
        let mut url = self.base_url.clone();
        let path = format!("{}/media/", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Blank values count as unset.
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn or(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn parse_or<T: FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match self.optional(name) {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid { name, value }),
            None => Ok(default),
        }
    }

    fn url_or(&self, name: &'static str, default: &str) -> Result<Url, ConfigError> {
        let value = self.or(name, default);
        Url::parse(&value).map_err(|_| ConfigError::Invalid { name, value })
    }
}
