use std::time::Duration;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use curb_contracts::{
    GeneratedImage, GenerationError, GenerationErrorKind, GenerationRequest, GenerationResponse,
};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde_json::Value;

use super::{non_empty_env, truncate_text, ImageGenerator};

pub const DEFAULT_API_BASE: &str = "https://image.octoai.run";

/// OctoAI hosted SDXL image-to-image.
///
/// One blocking POST per action, no retries. Without `OCTOAI_TIMEOUT_SECS`
/// the HTTP client's default timeout applies.
pub struct OctoAiGenerator {
    api_base: String,
    engine: String,
    token: Option<String>,
    http: HttpClient,
}

impl OctoAiGenerator {
    pub fn new(
        api_base: impl Into<String>,
        engine: impl Into<String>,
        token: Option<String>,
        timeout: Option<Duration>,
    ) -> anyhow::Result<Self> {
        let mut builder = HttpClient::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("failed building OctoAI HTTP client")?;
        Ok(Self {
            api_base: api_base.into().trim().trim_end_matches('/').to_string(),
            engine: engine.into().trim().trim_matches('/').to_string(),
            token: token
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            http,
        })
    }

    pub fn from_env(engine: &str) -> anyhow::Result<Self> {
        let api_base =
            non_empty_env("OCTOAI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let timeout = non_empty_env("OCTOAI_TIMEOUT_SECS").and_then(|raw| match raw.parse::<u64>() {
            Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
            _ => {
                tracing::warn!(value = %raw, "ignoring invalid OCTOAI_TIMEOUT_SECS");
                None
            }
        });
        Self::new(api_base, engine, Self::token_from_env(), timeout)
    }

    pub fn token_from_env() -> Option<String> {
        non_empty_env("OCTOAI_TOKEN").or_else(|| non_empty_env("OCTOAI_API_TOKEN"))
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        if let Some(token) = token
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
        {
            self.token = Some(token);
        }
        self
    }

    pub fn with_api_base(mut self, api_base: Option<String>) -> Self {
        if let Some(api_base) = api_base
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
        {
            self.api_base = api_base;
        }
        self
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn endpoint(&self) -> String {
        format!("{}/generate/{}", self.api_base, self.engine)
    }
}

impl ImageGenerator for OctoAiGenerator {
    fn name(&self) -> &str {
        "octoai"
    }

    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        let Some(token) = self.token.as_deref() else {
            return Err(GenerationError::new(
                GenerationErrorKind::MissingCredential,
                "OCTOAI_TOKEN not set",
            ));
        };
        let endpoint = self.endpoint();
        tracing::info!(
            %endpoint,
            seed = request.seed,
            num_images = request.num_images,
            strength = request.strength,
            "submitting generation request"
        );

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .json(request)
            .send()
            .map_err(|err| {
                GenerationError::new(
                    GenerationErrorKind::Transport,
                    format!("OctoAI request failed ({endpoint}): {err}"),
                )
            })?;
        let status = response.status();
        let body = response.text().map_err(|err| {
            GenerationError::new(
                GenerationErrorKind::Transport,
                format!("OctoAI response body read failed: {err}"),
            )
        })?;
        if let Some(kind) = classify_status(status) {
            return Err(GenerationError::new(
                kind,
                format!(
                    "OctoAI request failed ({}): {}",
                    status.as_u16(),
                    truncate_text(&body, 512)
                ),
            ));
        }

        let payload: Value = serde_json::from_str(&body).map_err(|err| {
            GenerationError::new(
                GenerationErrorKind::MalformedResponse,
                format!("OctoAI returned invalid JSON payload: {err}"),
            )
        })?;
        let response = decode_response(&payload)?;
        if response.len() != request.num_images as usize {
            tracing::warn!(
                requested = request.num_images,
                returned = response.len(),
                "OctoAI returned a different number of images than requested"
            );
        }
        Ok(response)
    }
}

fn classify_status(status: StatusCode) -> Option<GenerationErrorKind> {
    if status.is_success() {
        return None;
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Some(GenerationErrorKind::Unauthorized),
        _ => Some(GenerationErrorKind::ServiceRejected),
    }
}

/// Decodes every image or fails the whole response.
fn decode_response(payload: &Value) -> Result<GenerationResponse, GenerationError> {
    let malformed =
        |message: String| GenerationError::new(GenerationErrorKind::MalformedResponse, message);

    let rows = payload
        .get("images")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("OctoAI response missing `images` array".to_string()))?;
    if rows.is_empty() {
        return Err(malformed("OctoAI generated no images".to_string()));
    }

    let mut images = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        let encoded = row
            .get("image_b64")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| malformed(format!("OctoAI image {idx} has no `image_b64` data")))?;
        let bytes = BASE64
            .decode(encoded.as_bytes())
            .map_err(|err| malformed(format!("OctoAI image {idx} base64 decode failed: {err}")))?;
        let finish_reason = row
            .get("finish_reason")
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(reason) = finish_reason.as_deref() {
            if !reason.eq_ignore_ascii_case("ok") {
                tracing::warn!(index = idx, finish_reason = reason, "image finished abnormally");
            }
        }
        images.push(
            GeneratedImage::new(bytes)
                .with_seed(row.get("seed").and_then(Value::as_u64))
                .with_finish_reason(finish_reason),
        );
    }

    Ok(GenerationResponse {
        images,
        request_id: payload
            .get("request_id")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}
