//! HTTP binding of the onboarding service (reqwest).

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use super::model::OnboardingRecord;
use super::registry::{DocumentKind, SectionId, SectionRegistry};
use super::service::{DocumentUpload, OnboardingService, SectionForm, SectionUpdate, UploadFile};
use crate::config::ClientConfig;
use crate::error::ServiceError;

/// Talks to the onboarding REST endpoints.
pub struct HttpOnboardingService {
    base_url: String,
    token: Option<SecretString>,
    registry: SectionRegistry,
    client: reqwest::Client,
}

impl HttpOnboardingService {
    pub fn new(config: &ClientConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| ServiceError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
            registry: config.registry,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/onboarding{path}", self.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ServiceError> {
        let resp = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = error_message(status, &body);
            tracing::warn!(status = status.as_u16(), error = %message, "Onboarding service rejected request");
            return Err(ServiceError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        resp.json::<T>()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }
}

/// The server's `error` field verbatim, else the body, else the status text.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(msg) = value.get("error").and_then(|v| v.as_str()) {
            return msg.to_string();
        }
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() && trimmed.len() <= 200 && !trimmed.starts_with('<') {
        return trimmed.to_string();
    }
    status
        .canonical_reason()
        .map(String::from)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

#[async_trait]
impl OnboardingService for HttpOnboardingService {
    async fn fetch_record(&self) -> Result<OnboardingRecord, ServiceError> {
        let value: serde_json::Value = self.send(self.client.get(self.url(""))).await?;
        OnboardingRecord::from_wire(&value, &self.registry)
    }

    async fn update_section(
        &self,
        section: SectionId,
        fields: &SectionForm,
    ) -> Result<SectionUpdate, ServiceError> {
        let body = serde_json::json!({ "fields": fields });
        let request = self
            .client
            .post(self.url(&format!("/sections/{section}")))
            .json(&body);
        self.send(request).await
    }

    async fn upload_document(
        &self,
        section: SectionId,
        kind: DocumentKind,
        file: UploadFile,
    ) -> Result<DocumentUpload, ServiceError> {
        let mut part = Part::bytes(file.bytes).file_name(file.file_name.clone());
        if let Some(content_type) = &file.content_type {
            part = part
                .mime_str(content_type)
                .map_err(|e| ServiceError::Transport(format!("Invalid content type: {e}")))?;
        }
        let form = Form::new().part("file", part);

        let request = self
            .client
            .post(self.url(&format!("/sections/{section}/documents/{kind}")))
            .multipart(form);
        let reply: DocumentUpload = self.send(request).await?;

        tracing::info!(section = %section, kind = %kind, file = %file.file_name, "Document uploaded");
        Ok(reply)
    }

    async fn confirm_signature(&self, section: SectionId) -> Result<SectionUpdate, ServiceError> {
        let request = self
            .client
            .post(self.url(&format!("/sections/{section}/signature/confirm")));
        self.send(request).await
    }
}
