use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::backend::{CompleteStepRequest, NetworkError, StartStepRequest, VerificationBackend};
use super::domain::{ApplicationId, AuditTrailEntry, StepKey, StepStatus};
use super::router::{COMPLETE_STEP_PATH, START_STEP_PATH};

/// [`VerificationBackend`] that speaks the verification HTTP contract.
#[derive(Debug, Clone)]
pub struct HttpVerificationBackend {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpVerificationBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|error| NetworkError::Transport(error.to_string()))?;

        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn application_url(&self, application_id: ApplicationId, resource: &str) -> String {
        self.url(&format!(
            "/api/v1/verification/applications/{application_id}/{resource}"
        ))
    }

    async fn decode<T>(response: reqwest::Response) -> Result<T, NetworkError>
    where
        T: DeserializeOwned,
    {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|body| body.error)
                .unwrap_or(body);
            return Err(NetworkError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|error| NetworkError::InvalidResponse(error.to_string()))
    }
}

fn transport(error: reqwest::Error) -> NetworkError {
    if error.is_timeout() || error.is_connect() {
        NetworkError::Unavailable(error.to_string())
    } else {
        NetworkError::Transport(error.to_string())
    }
}

#[async_trait]
impl VerificationBackend for HttpVerificationBackend {
    async fn start_step(&self, request: StartStepRequest) -> Result<AuditTrailEntry, NetworkError> {
        debug!(application_id = %request.application_id, step_key = %request.step_name, "POST start_step");
        let response = self
            .client
            .post(self.url(START_STEP_PATH))
            .json(&request)
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }

    async fn complete_step(
        &self,
        request: CompleteStepRequest,
    ) -> Result<AuditTrailEntry, NetworkError> {
        debug!(
            application_id = %request.application_id,
            step_key = %request.step_name,
            status = %request.status,
            "POST complete_step"
        );
        let response = self
            .client
            .post(self.url(COMPLETE_STEP_PATH))
            .json(&request)
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }

    async fn list_audit_trail(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<AuditTrailEntry>, NetworkError> {
        let response = self
            .client
            .get(self.application_url(application_id, "audit-trail"))
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }

    async fn current_step_statuses(
        &self,
        application_id: ApplicationId,
    ) -> Result<BTreeMap<StepKey, StepStatus>, NetworkError> {
        let response = self
            .client
            .get(self.application_url(application_id, "step-statuses"))
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }
}
