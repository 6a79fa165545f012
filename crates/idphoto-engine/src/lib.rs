//! ID-photo editing engine: access gate, edit session, and the image editors
//! that talk to Gemini (or stand in for it offline).

mod access;
mod client;
mod dryrun;
mod session;

use anyhow::bail;

pub use access::{
    AccessError, AccessGate, LoginForm, SharedSecretGate, ACCESS_SECRET_ENV,
    DEFAULT_SHARED_SECRET,
};
pub use client::{
    extract_image, parse_response, EditError, EditKind, GeminiConfig, GeminiEditor, ImageEditor,
    DEFAULT_API_BASE, DEFAULT_MODEL,
};
pub use dryrun::DryrunEditor;
pub use session::{Activity, EditResult, EditSession, PendingRequest, RequestKind, SessionError};

pub const EDITOR_NAMES: &[&str] = &["gemini", "dryrun"];

/// Overrides applied on top of the environment when building the Gemini editor.
#[derive(Debug, Clone, Default)]
pub struct EditorOptions {
    pub model: Option<String>,
    pub api_base: Option<String>,
}

pub fn build_editor(name: &str, options: &EditorOptions) -> anyhow::Result<Box<dyn ImageEditor>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "gemini" => {
            let mut config = GeminiConfig::from_env()?;
            if let Some(model) = non_empty(options.model.as_deref()) {
                config.model = model.to_string();
            }
            if let Some(api_base) = non_empty(options.api_base.as_deref()) {
                config.api_base = api_base.trim_end_matches('/').to_string();
            }
            Ok(Box::new(GeminiEditor::new(config)?))
        }
        "dryrun" => Ok(Box::new(DryrunEditor::new())),
        other => bail!(
            "unknown editor '{other}' (expected one of: {})",
            EDITOR_NAMES.join(", ")
        ),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
