use std::env;
use std::time::Duration;

use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use idphoto_contracts::edits::UPSCALE_PROMPT;
use idphoto_contracts::gemini::{GenerateContentRequest, GenerateContentResponse};
use idphoto_contracts::media::EncodedImage;
use reqwest::blocking::Client as HttpClient;
use reqwest::StatusCode;
use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";

const API_KEY_HEADER: &str = "x-goog-api-key";
const API_KEY_VARS: [&str; 3] = ["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"];
const ERROR_BODY_MAX_CHARS: usize = 512;
const REFUSAL_TEXT_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Transform,
    Upscale,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    /// The detail describes what came back instead; it is never shown to users.
    #[error("model response did not contain an inline image ({0})")]
    NoImagePart(String),
    #[error("image service rate limit reached (429)")]
    RateLimited,
    #[error("image service request failed: {0}")]
    Transport(String),
}

impl EditError {
    /// The only form in which an edit failure reaches the user.
    pub fn user_message(&self, kind: EditKind) -> &'static str {
        match (self, kind) {
            (EditError::NoImagePart(_), EditKind::Transform) => {
                "The AI did not return an image. It may have refused the request."
            }
            (EditError::NoImagePart(_), EditKind::Upscale) => {
                "The AI did not return an upscaled image. It may have refused the request."
            }
            (EditError::RateLimited, _) => "Too many requests. Please try again later.",
            (EditError::Transport(_), EditKind::Transform) => {
                "An error occurred while communicating with the AI service."
            }
            (EditError::Transport(_), EditKind::Upscale) => {
                "An error occurred while communicating with the AI service to upscale the image."
            }
        }
    }
}

/// A remote (or fake) model that edits one image according to a prompt.
///
/// Every call is a single attempt. Results are not deterministic: the same
/// image and prompt may produce different output on each call.
pub trait ImageEditor: Send + Sync {
    fn name(&self) -> &str;

    fn transform(&self, image: &EncodedImage, prompt: &str) -> Result<Vec<u8>, EditError>;

    fn upscale(&self, image: &EncodedImage) -> Result<Vec<u8>, EditError> {
        self.transform(image, UPSCALE_PROMPT)
    }
}

#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub request_timeout: Option<Duration>,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: None,
        }
    }

    /// Reads the service credential and optional overrides from the environment.
    ///
    /// A missing credential is an error: the editor cannot be built without it.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with variables resolved through `lookup`.
    /// Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let Some(api_key) = API_KEY_VARS.iter().find_map(|key| var(*key)) else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY or API_KEY not set");
        };
        let mut config = Self::new(api_key);
        if let Some(api_base) = var("GEMINI_API_BASE") {
            config.api_base = api_base.trim_end_matches('/').to_string();
        }
        if let Some(model) = var("IDPHOTO_MODEL") {
            config.model = model;
        }
        if let Some(raw) = var("IDPHOTO_REQUEST_TIMEOUT_SECS") {
            let seconds: f64 = raw
                .parse()
                .with_context(|| format!("IDPHOTO_REQUEST_TIMEOUT_SECS is not a number: {raw}"))?;
            if !seconds.is_finite() || seconds <= 0.0 {
                bail!("IDPHOTO_REQUEST_TIMEOUT_SECS must be positive, got {raw}");
            }
            config.request_timeout = Some(Duration::from_secs_f64(seconds));
        }
        Ok(config)
    }
}

pub struct GeminiEditor {
    config: GeminiConfig,
    http: HttpClient,
}

impl GeminiEditor {
    pub fn new(config: GeminiConfig) -> anyhow::Result<Self> {
        if config.api_key.trim().is_empty() {
            bail!("Gemini API key is empty");
        }
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { config, http })
    }

    pub fn endpoint(&self) -> String {
        let trimmed = self.config.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!(
            "{}/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            model_path
        )
    }

    fn generate(
        &self,
        payload: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, EditError> {
        let endpoint = self.endpoint();
        let response = self
            .http
            .post(&endpoint)
            .header(API_KEY_HEADER, self.config.api_key.as_str())
            .json(payload)
            .send()
            .map_err(|err| {
                let err =
                    anyhow::Error::new(err).context(format!("Gemini request failed ({endpoint})"));
                EditError::Transport(error_chain_text(&err, ERROR_BODY_MAX_CHARS))
            })?;
        let status = response.status();
        let body = response.text().map_err(|err| {
            EditError::Transport(format!("Gemini response body read failed: {err}"))
        })?;
        parse_response(status, &body)
    }
}

impl ImageEditor for GeminiEditor {
    fn name(&self) -> &str {
        "gemini"
    }

    fn transform(&self, image: &EncodedImage, prompt: &str) -> Result<Vec<u8>, EditError> {
        validate_request(image, prompt)?;
        let payload = GenerateContentRequest::image_edit(image, prompt);
        let response = self.generate(&payload)?;
        extract_image(&response)
    }
}

/// Maps an HTTP status and body onto a parsed response or an edit error.
pub fn parse_response(
    status: StatusCode,
    body: &str,
) -> Result<GenerateContentResponse, EditError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(EditError::RateLimited);
    }
    if !status.is_success() {
        return Err(EditError::Transport(format!(
            "Gemini request failed ({}): {}",
            status.as_u16(),
            truncate_text(body, ERROR_BODY_MAX_CHARS)
        )));
    }
    serde_json::from_str(body)
        .map_err(|err| EditError::Transport(format!("Gemini returned invalid JSON payload: {err}")))
}

/// Decodes the first inline image of the first candidate.
pub fn extract_image(response: &GenerateContentResponse) -> Result<Vec<u8>, EditError> {
    let Some(inline) = response.first_inline_image() else {
        return Err(EditError::NoImagePart(refusal_detail(response)));
    };
    let bytes = BASE64
        .decode(inline.data.trim().as_bytes())
        .map_err(|err| EditError::Transport(format!("Gemini image base64 decode failed: {err}")))?;
    if bytes.is_empty() {
        return Err(EditError::NoImagePart("inline image decoded to zero bytes".to_string()));
    }
    Ok(bytes)
}

/// What the model sent instead of an image: finish reason and reply text.
fn refusal_detail(response: &GenerateContentResponse) -> String {
    if response.candidates.is_empty() {
        return "no candidates".to_string();
    }
    let mut detail = format!("finish_reason={}", response.finish_reason().unwrap_or("unknown"));
    let text = response.text_summary();
    let text = text.trim();
    if !text.is_empty() {
        detail.push_str("; text=");
        detail.push_str(&truncate_text(text, REFUSAL_TEXT_MAX_CHARS));
    }
    detail
}

fn validate_request(image: &EncodedImage, prompt: &str) -> Result<(), EditError> {
    if image.data.trim().is_empty() {
        return Err(EditError::Transport("empty image payload".to_string()));
    }
    if image.mime_type.trim().is_empty() {
        return Err(EditError::Transport("missing image MIME type".to_string()));
    }
    if prompt.trim().is_empty() {
        return Err(EditError::Transport("empty prompt".to_string()));
    }
    Ok(())
}

fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts.last().map(|existing| existing == trimmed).unwrap_or(false) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
