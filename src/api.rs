//! REST client for the annotation backend.
//!
//! Every request carries a bearer credential obtained from a
//! [`TokenProvider`]; a missing token aborts the operation before any
//! network traffic. 401 and 404 responses map to distinct error variants so
//! the UI can tell an expired session from a missing resource.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication token is missing")]
    MissingCredential,
    #[error("authentication failed: invalid or expired token")]
    AuthRejected,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("server returned status {0}")]
    Server(u16),
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// Missing or rejected credential; both require re-authentication.
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::MissingCredential | ApiError::AuthRejected)
    }

    fn from_ureq(err: ureq::Error, what: &'static str) -> Self {
        match err {
            ureq::Error::Status(401, _) => ApiError::AuthRejected,
            ureq::Error::Status(404, _) => ApiError::NotFound(what),
            ureq::Error::Status(code, _) => ApiError::Server(code),
            ureq::Error::Transport(t) => ApiError::Network(t.to_string()),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

/// Source of the bearer credential attached to every request. Injected so
/// the client is testable without ambient storage.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// Fixed token taken from the command line or environment at startup.
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// No credential available; every operation fails with `MissingCredential`.
pub struct NoToken;

impl TokenProvider for NoToken {
    fn token(&self) -> Option<String> {
        None
    }
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Deserialize)]
pub struct LabelDto {
    pub id: i64,
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AnnotationLabelDto {
    pub name: String,
}

/// Stored annotation: top-left corner plus extent, all in UV units.
#[derive(Clone, Debug, Deserialize)]
pub struct AnnotationDto {
    pub id: i64,
    pub label: AnnotationLabelDto,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Debug, Serialize)]
pub struct NewAnnotation {
    pub label_id: i64,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub coordinate_format: &'static str,
}

#[derive(Deserialize)]
struct CreatedDto {
    id: i64,
}

// ── Client ──────────────────────────────────────────────────────────────────

/// Remote operations the client performs, one method per endpoint. The sync
/// layer is written against this trait; tests substitute an in-memory
/// implementation.
pub trait ProjectApi: Send + Sync {
    fn list_labels(&self, project_id: &str) -> Result<Vec<LabelDto>, ApiError>;
    fn create_label(&self, project_id: &str, name: &str) -> Result<LabelDto, ApiError>;
    fn delete_label(&self, project_id: &str, label_id: i64) -> Result<(), ApiError>;
    fn list_annotations(&self, image_id: &str) -> Result<Vec<AnnotationDto>, ApiError>;
    fn create_annotation(&self, image_id: &str, new: &NewAnnotation) -> Result<i64, ApiError>;
    fn delete_annotation(&self, image_id: &str, annotation_id: i64) -> Result<(), ApiError>;
    fn fetch_image(&self, image_id: &str) -> Result<Vec<u8>, ApiError>;
}

pub struct HttpApi {
    agent: ureq::Agent,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpApi {
    pub fn new(base_url: &str, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(15))
                .build(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            tokens,
        }
    }

    fn bearer(&self) -> Result<String, ApiError> {
        match self.tokens.token() {
            Some(token) => Ok(format!("Bearer {token}")),
            None => Err(ApiError::MissingCredential),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl ProjectApi for HttpApi {
    fn list_labels(&self, project_id: &str) -> Result<Vec<LabelDto>, ApiError> {
        let bearer = self.bearer()?;
        let resp = self
            .agent
            .get(&self.url(&format!("/api/projects/{project_id}/labels")))
            .set("Authorization", &bearer)
            .call()
            .map_err(|e| ApiError::from_ureq(e, "project"))?;
        Ok(resp.into_json()?)
    }

    fn create_label(&self, project_id: &str, name: &str) -> Result<LabelDto, ApiError> {
        let bearer = self.bearer()?;
        let resp = self
            .agent
            .post(&self.url(&format!("/api/projects/{project_id}/labels")))
            .set("Authorization", &bearer)
            .send_json(serde_json::json!({ "name": name }))
            .map_err(|e| ApiError::from_ureq(e, "project"))?;
        Ok(resp.into_json()?)
    }

    fn delete_label(&self, project_id: &str, label_id: i64) -> Result<(), ApiError> {
        let bearer = self.bearer()?;
        self.agent
            .delete(&self.url(&format!("/api/projects/{project_id}/labels/{label_id}")))
            .set("Authorization", &bearer)
            .call()
            .map_err(|e| ApiError::from_ureq(e, "label"))?;
        Ok(())
    }

    fn list_annotations(&self, image_id: &str) -> Result<Vec<AnnotationDto>, ApiError> {
        let bearer = self.bearer()?;
        let resp = self
            .agent
            .get(&self.url(&format!("/api/images/{image_id}/annotations")))
            .set("Authorization", &bearer)
            .call()
            .map_err(|e| ApiError::from_ureq(e, "image"))?;
        Ok(resp.into_json()?)
    }

    fn create_annotation(&self, image_id: &str, new: &NewAnnotation) -> Result<i64, ApiError> {
        let bearer = self.bearer()?;
        let resp = self
            .agent
            .post(&self.url(&format!("/api/images/{image_id}/annotations")))
            .set("Authorization", &bearer)
            .send_json(new)
            .map_err(|e| ApiError::from_ureq(e, "image"))?;
        let created: CreatedDto = resp.into_json()?;
        Ok(created.id)
    }

    fn delete_annotation(&self, image_id: &str, annotation_id: i64) -> Result<(), ApiError> {
        let bearer = self.bearer()?;
        self.agent
            .delete(&self.url(&format!(
                "/api/images/{image_id}/annotations/{annotation_id}"
            )))
            .set("Authorization", &bearer)
            .call()
            .map_err(|e| ApiError::from_ureq(e, "annotation"))?;
        Ok(())
    }

    fn fetch_image(&self, image_id: &str) -> Result<Vec<u8>, ApiError> {
        let bearer = self.bearer()?;
        let resp = self
            .agent
            .get(&self.url(&format!("/api/images/{image_id}/file")))
            .set("Authorization", &bearer)
            .call()
            .map_err(|e| ApiError::from_ureq(e, "image"))?;
        let mut bytes = Vec::new();
        resp.into_reader().read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}
