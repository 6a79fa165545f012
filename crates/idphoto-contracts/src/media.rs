//! Conversions between uploaded files, base64 payloads and `data:` URIs.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use thiserror::Error;

/// MIME type of every edit result.
pub const RESULT_MIME_TYPE: &str = "image/png";

/// File name offered for saving when nothing was ever uploaded.
pub const DEFAULT_OUTPUT_NAME: &str = "download.png";

const PROCESSED_SUFFIX: &str = "-processed.png";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),
    #[error("malformed data URI: {0}")]
    Parse(String),
}

impl MediaError {
    pub fn user_message(&self) -> &'static str {
        match self {
            MediaError::UnsupportedInput(_) => "Please select an image file only.",
            MediaError::Parse(_) => "The current result could not be read back for upscaling.",
        }
    }
}

/// An uploaded image exactly as the user selected it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    name: String,
    mime_type: String,
    bytes: Vec<u8>,
}

impl SourceImage {
    /// Accepts a file only when its declared MIME type is `image/*`.
    pub fn from_upload(
        name: impl Into<String>,
        bytes: Vec<u8>,
        declared_mime: &str,
    ) -> Result<Self, MediaError> {
        let mime_type = declared_mime.trim().to_ascii_lowercase();
        if !is_image_mime(&mime_type) {
            return Err(MediaError::UnsupportedInput(format!(
                "declared type '{}' is not an image",
                declared_mime.trim()
            )));
        }
        if bytes.is_empty() {
            return Err(MediaError::UnsupportedInput("file is empty".to_string()));
        }
        Ok(Self {
            name: name.into(),
            mime_type,
            bytes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Base64 payload plus MIME type, the shape the edit service consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub data: String,
    pub mime_type: String,
}

impl EncodedImage {
    pub fn decode_bytes(&self) -> Result<Vec<u8>, MediaError> {
        BASE64
            .decode(self.data.as_bytes())
            .map_err(|err| MediaError::Parse(format!("invalid base64 payload: {err}")))
    }
}

pub fn encode(source: &SourceImage) -> EncodedImage {
    EncodedImage {
        data: BASE64.encode(source.bytes()),
        mime_type: source.mime_type().to_string(),
    }
}

/// Splits `data:<mime>;base64,<payload>` into its parts.
///
/// An empty MIME segment falls back to `image/png`.
pub fn decode_data_uri(uri: &str) -> Result<EncodedImage, MediaError> {
    let Some(rest) = uri.trim().strip_prefix("data:") else {
        return Err(MediaError::Parse("missing 'data:' scheme".to_string()));
    };
    let Some((header, payload)) = rest.split_once(',') else {
        return Err(MediaError::Parse("missing ',' separator".to_string()));
    };
    let Some(mime) = header.strip_suffix(";base64") else {
        return Err(MediaError::Parse("payload is not base64 encoded".to_string()));
    };
    if payload.is_empty() {
        return Err(MediaError::Parse("empty payload".to_string()));
    }
    let mime_type = if mime.trim().is_empty() {
        RESULT_MIME_TYPE.to_string()
    } else {
        mime.trim().to_string()
    };
    Ok(EncodedImage {
        data: payload.to_string(),
        mime_type,
    })
}

pub fn to_data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", BASE64.encode(bytes))
}

pub fn is_image_mime(mime_type: &str) -> bool {
    mime_type
        .trim()
        .to_ascii_lowercase()
        .strip_prefix("image/")
        .map(|subtype| !subtype.is_empty())
        .unwrap_or(false)
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())?;
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        "tif" | "tiff" => Some("image/tiff"),
        "txt" | "md" => Some("text/plain"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}

/// `portrait.jpg` becomes `portrait-processed.png`; only the last extension is
/// stripped and a name without one is kept whole.
pub fn processed_file_name(original: &str) -> String {
    let base = Path::new(original)
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or(original);
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    };
    format!("{stem}{PROCESSED_SUFFIX}")
}
