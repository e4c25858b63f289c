use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{FeedbackReceipt, FeedbackSubmission},
};
use thiserror::Error;
use tracing::info;
use url::Url;

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("invalid portal url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("failed to reach portal: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("portal rejected feedback ({status}): {message}")]
    Rejected {
        status: u16,
        code: Option<ErrorCode>,
        message: String,
    },
    #[error("no submission endpoint is configured")]
    Unavailable,
}

impl SubmissionError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status, code, .. } => match code {
                Some(code) => code.is_retryable(),
                None => *status >= 500 || *status == StatusCode::TOO_MANY_REQUESTS.as_u16(),
            },
            Self::InvalidUrl { .. } | Self::Unavailable => false,
        }
    }
}

#[async_trait]
pub trait SubmissionGateway: Send + Sync {
    async fn submit(
        &self,
        submission: &FeedbackSubmission,
    ) -> Result<FeedbackReceipt, SubmissionError>;
}

pub struct MissingSubmissionGateway;

#[async_trait]
impl SubmissionGateway for MissingSubmissionGateway {
    async fn submit(
        &self,
        _submission: &FeedbackSubmission,
    ) -> Result<FeedbackReceipt, SubmissionError> {
        Err(SubmissionError::Unavailable)
    }
}

pub struct HttpSubmissionGateway {
    http: Client,
    base_url: Url,
}

impl HttpSubmissionGateway {
    pub fn new(base_url: &str) -> Result<Self, SubmissionError> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Result<Self, SubmissionError> {
        let parsed = Url::parse(base_url).map_err(|err| SubmissionError::InvalidUrl {
            url: base_url.to_string(),
            reason: err.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(SubmissionError::InvalidUrl {
                url: base_url.to_string(),
                reason: "url cannot be used as a base".to_string(),
            });
        }
        Ok(Self {
            http,
            base_url: parsed,
        })
    }

    // Project ids are preview URLs, so they travel as one escaped path segment.
    pub fn endpoint(&self, project_id: &str) -> Result<Url, SubmissionError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SubmissionError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: "url cannot be used as a base".to_string(),
            })?
            .pop_if_empty()
            .extend(["api", "projects", project_id, "feedback"]);
        Ok(url)
    }
}

#[async_trait]
impl SubmissionGateway for HttpSubmissionGateway {
    async fn submit(
        &self,
        submission: &FeedbackSubmission,
    ) -> Result<FeedbackReceipt, SubmissionError> {
        let url = self.endpoint(submission.project_id.as_str())?;
        let res = self.http.post(url).json(submission).send().await?;
        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            let (code, message) = match serde_json::from_str::<ApiError>(&body) {
                Ok(api_error) => (Some(api_error.code), api_error.message),
                Err(_) if body.trim().is_empty() => (None, status.to_string()),
                Err(_) => (None, body),
            };
            return Err(SubmissionError::Rejected {
                status: status.as_u16(),
                code,
                message,
            });
        }

        let receipt = serde_json::from_str::<FeedbackReceipt>(&body).unwrap_or_default();
        info!(
            project_id = %submission.project_id,
            kind = ?submission.kind,
            sections = submission.section_feedback.len(),
            answers = submission.question_answers.len(),
            "feedback submitted"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
