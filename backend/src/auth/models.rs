use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The caller behind a verified bearer token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub exp: usize,
    pub iat: usize,
}
