use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ModerationError, ModerationResult};
use crate::scorer::Scorer;

/// Response fields checked for the score, in order
const SCORE_FIELDS: [&str; 2] = ["score", "genital_score"];

#[derive(Debug, Clone)]
pub struct HttpScorerConfig {
    pub url: String,

    /// Sent as `Authorization: Bearer <secret>` when non-empty
    pub secret: String,

    /// Multipart field carrying the media
    pub field: String,

    pub timeout_secs: u64,
    pub require_https: bool,
}

impl Default for HttpScorerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            secret: String::new(),
            field: "file".to_string(),
            timeout_secs: 30,
            require_https: false,
        }
    }
}

/// Scores media by posting it to the model service as a multipart upload
#[derive(Clone)]
pub struct HttpScorer {
    client: Client,
    url: Url,
    secret: Option<String>,
    field: String,
}

impl HttpScorer {
    pub fn new(config: HttpScorerConfig) -> Result<Self> {
        let url = Url::parse(&config.url).context("Invalid scorer URL")?;

        if config.require_https && url.scheme() != "https" {
            anyhow::bail!("Scorer URL must use HTTPS: {}", url);
        }

        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("media-moderator/0.1");

        if config.require_https {
            builder = builder.https_only(true);
            info!("HTTPS enforcement enabled for scorer requests");
        }

        let client = builder
            .build()
            .context("Failed to create scorer HTTP client")?;

        let secret = if config.secret.is_empty() {
            warn!("No scorer secret configured, requests are unauthenticated");
            None
        } else {
            Some(config.secret)
        };

        Ok(Self {
            client,
            url,
            secret,
            field: config.field,
        })
    }
}

#[async_trait]
impl Scorer for HttpScorer {
    async fn score(&self, media: &[u8]) -> ModerationResult<f64> {
        let mime = infer::get(media)
            .map(|t| t.mime_type())
            .unwrap_or("application/octet-stream");
        let extension = infer::get(media).map(|t| t.extension()).unwrap_or("bin");

        let part = Part::bytes(media.to_vec())
            .file_name(format!("media.{}", extension))
            .mime_str(mime)
            .map_err(|e| ModerationError::ScoringUnavailable(format!("invalid MIME type: {}", e)))?;
        let form = Form::new().part(self.field.clone(), part);

        let mut request = self.client.post(self.url.clone()).multipart(form);
        if let Some(secret) = &self.secret {
            request = request.bearer_auth(secret);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ModerationError::ScoringUnavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ModerationError::ScoringUnavailable(format!(
                "scorer returned HTTP {}",
                status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ModerationError::ScoringUnavailable(format!("malformed response: {}", e)))?;

        let score = extract_score(&body)?;
        debug!(score = score, mime = mime, bytes = media.len(), "Scored media");
        Ok(score)
    }
}

fn extract_score(body: &Value) -> ModerationResult<f64> {
    let raw = SCORE_FIELDS
        .iter()
        .find_map(|field| body.get(*field).filter(|v| !v.is_null()))
        .ok_or_else(|| {
            ModerationError::ScoringUnavailable("response carries no score".to_string())
        })?;

    let score = raw.as_f64().ok_or_else(|| {
        ModerationError::ScoringUnavailable(format!("score is not a number: {}", raw))
    })?;

    if !score.is_finite() || !(0.0..=1.0).contains(&score) {
        return Err(ModerationError::ScoringUnavailable(format!(
            "score out of range: {}",
            score
        )));
    }

    Ok(score)
}
