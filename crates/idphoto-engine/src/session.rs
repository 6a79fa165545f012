//! The editing session: who is signed in, which image is loaded, what result
//! is on screen and whether a request is in flight.
//!
//! A request is split into `begin_*`, dispatch and [`EditSession::complete`] so
//! the network call is the only point where the session waits. While a request
//! is pending the session is busy and every further `begin_*` is rejected
//! without touching state. The activity is one enum, so processing and
//! upscaling can never be set together.
//!
//! There is exactly one caller per session (`&mut self`). Serving several
//! clients from one session would need a per-session lock instead.
//!
//! The event log is checked once in [`EditSession::with_events`]. A write that
//! fails after that does not stop the session; the first such failure is kept
//! in [`EditSession::event_log_error`] for the front end to report.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{bail, Context};
use idphoto_contracts::edits::{
    build_prompt, EditOperation, PROMPT_TEMPLATE_VERSION, UPSCALE_PROMPT,
};
use idphoto_contracts::events::{EventPayload, EventWriter};
use idphoto_contracts::media::{
    decode_data_uri, encode, processed_file_name, to_data_uri, EncodedImage, MediaError,
    SourceImage, DEFAULT_OUTPUT_NAME, RESULT_MIME_TYPE,
};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::access::AccessGate;
use crate::client::{EditError, EditKind, ImageEditor};

const UPSCALE_PROGRESS_MESSAGE: &str = "Upscaling to 2K...";

/// The image currently shown as the result, held as a PNG `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditResult {
    data_uri: String,
}

impl EditResult {
    pub fn from_png_bytes(bytes: &[u8]) -> Self {
        Self {
            data_uri: to_data_uri(RESULT_MIME_TYPE, bytes),
        }
    }

    pub fn data_uri(&self) -> &str {
        &self.data_uri
    }

    pub fn mime_type(&self) -> &'static str {
        RESULT_MIME_TYPE
    }

    pub fn decode(&self) -> Result<EncodedImage, MediaError> {
        decode_data_uri(&self.data_uri)
    }

    pub fn png_bytes(&self) -> Result<Vec<u8>, MediaError> {
        self.decode()?.decode_bytes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Idle,
    Processing(EditOperation),
    Upscaling,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("sign in first")]
    NotAuthenticated,
    #[error("no image has been uploaded")]
    NoImage,
    #[error("there is no result to upscale")]
    NoResult,
    #[error("another request is still in progress")]
    Busy,
    #[error(transparent)]
    Media(#[from] MediaError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Edit(EditOperation),
    Upscale,
}

impl RequestKind {
    fn edit_kind(self) -> EditKind {
        match self {
            RequestKind::Edit(_) => EditKind::Transform,
            RequestKind::Upscale => EditKind::Upscale,
        }
    }

    fn event_prefix(self) -> &'static str {
        match self {
            RequestKind::Edit(_) => "edit",
            RequestKind::Upscale => "upscale",
        }
    }
}

/// An edit or upscale that has been started but not yet applied.
#[must_use = "pass the outcome back to EditSession::complete to leave the busy state"]
#[derive(Debug)]
pub struct PendingRequest {
    kind: RequestKind,
    image: EncodedImage,
    prompt: String,
    upload_generation: u64,
}

impl PendingRequest {
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn image(&self) -> &EncodedImage {
        &self.image
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn dispatch(&self, editor: &dyn ImageEditor) -> Result<Vec<u8>, EditError> {
        match self.kind {
            RequestKind::Edit(_) => editor.transform(&self.image, &self.prompt),
            RequestKind::Upscale => editor.upscale(&self.image),
        }
    }
}

pub struct EditSession {
    gate: Box<dyn AccessGate>,
    authenticated: bool,
    source: Option<SourceImage>,
    result: Option<EditResult>,
    activity: Activity,
    error: Option<String>,
    upload_generation: u64,
    events: Option<EventWriter>,
    event_error: OnceLock<String>,
}

impl EditSession {
    pub fn new(gate: Box<dyn AccessGate>) -> Self {
        Self {
            gate,
            authenticated: false,
            source: None,
            result: None,
            activity: Activity::Idle,
            error: None,
            upload_generation: 0,
            events: None,
            event_error: OnceLock::new(),
        }
    }

    /// Attaches an event log. Fails when the first event cannot be written.
    pub fn with_events(mut self, events: EventWriter) -> anyhow::Result<Self> {
        events
            .emit("session_started", EventPayload::new())
            .with_context(|| format!("event log {} is not writable", events.path().display()))?;
        self.events = Some(events);
        Ok(self)
    }

    /// First event-log write failure since the log was attached.
    pub fn event_log_error(&self) -> Option<&str> {
        self.event_error.get().map(String::as_str)
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn source(&self) -> Option<&SourceImage> {
        self.source.as_ref()
    }

    pub fn result(&self) -> Option<&EditResult> {
        self.result.as_ref()
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn is_processing(&self) -> bool {
        matches!(self.activity, Activity::Processing(_))
    }

    pub fn is_upscaling(&self) -> bool {
        matches!(self.activity, Activity::Upscaling)
    }

    pub fn is_busy(&self) -> bool {
        self.activity != Activity::Idle
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Progress line for the current activity, if any.
    pub fn progress_message(&self) -> Option<&'static str> {
        match self.activity {
            Activity::Idle => None,
            Activity::Processing(op) => Some(op.progress_message()),
            Activity::Upscaling => Some(UPSCALE_PROGRESS_MESSAGE),
        }
    }

    pub fn on_login(&mut self, password: &str) -> bool {
        match self.gate.verify(password) {
            Ok(()) => {
                self.authenticated = true;
                self.emit("login_succeeded", json!({}));
                true
            }
            Err(err) => {
                self.emit("login_rejected", json!({ "reason": err.to_string() }));
                false
            }
        }
    }

    /// Signs out and forgets the loaded image and result.
    pub fn logout(&mut self) {
        self.authenticated = false;
        self.source = None;
        self.result = None;
        self.error = None;
        self.upload_generation += 1;
        self.emit("logged_out", json!({}));
    }

    /// Replaces the source image. A non-image file is rejected with a visible
    /// error and leaves the image and result untouched.
    pub fn upload(
        &mut self,
        name: &str,
        bytes: Vec<u8>,
        declared_mime: &str,
    ) -> Result<(), SessionError> {
        if !self.authenticated {
            return Err(SessionError::NotAuthenticated);
        }
        let byte_count = bytes.len();
        match SourceImage::from_upload(name, bytes, declared_mime) {
            Ok(source) => {
                self.emit(
                    "image_uploaded",
                    json!({
                        "name": source.name(),
                        "mime_type": source.mime_type(),
                        "bytes": byte_count,
                        "sha256": sha256_hex(source.bytes()),
                    }),
                );
                self.source = Some(source);
                self.result = None;
                self.error = None;
                self.upload_generation += 1;
                Ok(())
            }
            Err(err) => {
                self.error = Some(err.user_message().to_string());
                self.emit(
                    "upload_rejected",
                    json!({
                        "name": name,
                        "declared_mime": declared_mime,
                        "reason": err.to_string(),
                    }),
                );
                Err(err.into())
            }
        }
    }

    pub fn begin_edit(&mut self, operation: EditOperation) -> Result<PendingRequest, SessionError> {
        if !self.authenticated {
            return Err(SessionError::NotAuthenticated);
        }
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        let Some(source) = self.source.as_ref() else {
            return Err(SessionError::NoImage);
        };

        let image = encode(source);
        let input_sha256 = sha256_hex(source.bytes());
        self.activity = Activity::Processing(operation);
        self.error = None;
        self.result = None;
        self.emit(
            "edit_started",
            json!({
                "operation": operation.slug(),
                "prompt_version": PROMPT_TEMPLATE_VERSION,
                "input_sha256": input_sha256,
            }),
        );

        Ok(PendingRequest {
            kind: RequestKind::Edit(operation),
            image,
            prompt: build_prompt(operation),
            upload_generation: self.upload_generation,
        })
    }

    pub fn begin_upscale(&mut self) -> Result<PendingRequest, SessionError> {
        if !self.authenticated {
            return Err(SessionError::NotAuthenticated);
        }
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        let Some(result) = self.result.as_ref() else {
            return Err(SessionError::NoResult);
        };

        self.error = None;
        let image = match result.decode() {
            Ok(image) => image,
            Err(err) => {
                self.error = Some(err.user_message().to_string());
                self.emit("upscale_failed", json!({ "reason": err.to_string() }));
                return Err(err.into());
            }
        };
        self.activity = Activity::Upscaling;
        self.emit("upscale_started", json!({ "input_mime": image.mime_type }));

        Ok(PendingRequest {
            kind: RequestKind::Upscale,
            image,
            prompt: UPSCALE_PROMPT.to_string(),
            upload_generation: self.upload_generation,
        })
    }

    /// Applies the outcome of a pending request and returns the session to
    /// idle, whatever the outcome.
    ///
    /// An outcome for an image that has since been replaced or signed out is
    /// dropped.
    pub fn complete(&mut self, pending: PendingRequest, outcome: Result<Vec<u8>, EditError>) {
        self.activity = Activity::Idle;
        let prefix = pending.kind.event_prefix();

        if pending.upload_generation != self.upload_generation {
            self.emit(
                "result_discarded",
                json!({ "request": prefix, "reason": "source image changed" }),
            );
            return;
        }

        let outcome = outcome.and_then(|bytes| {
            if bytes.is_empty() {
                Err(EditError::NoImagePart("editor returned zero bytes".to_string()))
            } else {
                Ok(bytes)
            }
        });
        match outcome {
            Ok(bytes) => {
                let result = EditResult::from_png_bytes(&bytes);
                self.emit(
                    &format!("{prefix}_finished"),
                    json!({
                        "bytes": bytes.len(),
                        "sha256": sha256_hex(&bytes),
                    }),
                );
                self.result = Some(result);
            }
            Err(err) => {
                self.error = Some(err.user_message(pending.kind.edit_kind()).to_string());
                self.emit(
                    &format!("{prefix}_failed"),
                    json!({ "reason": err.to_string() }),
                );
            }
        }
    }

    /// Runs one edit end to end. Returns `false` when the call was rejected
    /// before any request was sent.
    pub fn run_edit(&mut self, editor: &dyn ImageEditor, operation: EditOperation) -> bool {
        let Ok(pending) = self.begin_edit(operation) else {
            return false;
        };
        let outcome = pending.dispatch(editor);
        self.complete(pending, outcome);
        true
    }

    pub fn run_upscale(&mut self, editor: &dyn ImageEditor) -> bool {
        let Ok(pending) = self.begin_upscale() else {
            return false;
        };
        let outcome = pending.dispatch(editor);
        self.complete(pending, outcome);
        true
    }

    pub fn output_name(&self) -> String {
        self.source
            .as_ref()
            .map(|source| processed_file_name(source.name()))
            .unwrap_or_else(|| DEFAULT_OUTPUT_NAME.to_string())
    }

    /// Writes the current result into `dir` under [`Self::output_name`].
    pub fn save_result(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        let Some(result) = self.result.as_ref() else {
            bail!("there is no result to save");
        };
        let bytes = result.png_bytes()?;
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(self.output_name());
        fs::write(&path, &bytes).with_context(|| format!("failed to write {}", path.display()))?;
        self.emit(
            "result_saved",
            json!({
                "path": path.to_string_lossy(),
                "bytes": bytes.len(),
            }),
        );
        Ok(path)
    }

    fn emit(&self, event_type: &str, payload: Value) {
        if let Some(events) = self.events.as_ref() {
            let payload: EventPayload = payload.as_object().cloned().unwrap_or_default();
            if let Err(err) = events.emit(event_type, payload) {
                // keep the first failure only
                let _ = self.event_error.set(format!("{event_type}: {err:#}"));
            }
        }
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use idphoto_contracts::edits::{build_prompt, EditOperation, UPSCALE_PROMPT};
    use idphoto_contracts::events::EventWriter;
    use idphoto_contracts::media::EncodedImage;

    use super::*;
    use crate::access::SharedSecretGate;

    /// Returns queued outcomes in order and records what it was sent.
    #[derive(Default)]
    struct ScriptedEditor {
        outcomes: Mutex<Vec<Result<Vec<u8>, EditError>>>,
        prompts: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedEditor {
        fn with(outcomes: Vec<Result<Vec<u8>, EditError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
        }
    }

    impl ImageEditor for ScriptedEditor {
        fn name(&self) -> &str {
            "scripted"
        }

        fn transform(&self, _image: &EncodedImage, prompt: &str) -> Result<Vec<u8>, EditError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt.to_string());
            }
            let mut outcomes = self
                .outcomes
                .lock()
                .map_err(|_| EditError::Transport("poisoned".to_string()))?;
            if outcomes.is_empty() {
                return Err(EditError::NoImagePart("script exhausted".to_string()));
            }
            outcomes.remove(0)
        }
    }

    fn signed_in() -> EditSession {
        let mut session = EditSession::new(Box::new(SharedSecretGate::default()));
        assert!(session.on_login("213213213"));
        session
    }

    fn with_portrait() -> EditSession {
        let mut session = signed_in();
        session
            .upload("portrait.jpg", b"jpeg-bytes".to_vec(), "image/jpeg")
            .expect("portrait upload");
        session
    }

    #[test]
    fn login_gate() {
        let mut session = EditSession::new(Box::new(SharedSecretGate::default()));
        assert!(!session.on_login("wrong"));
        assert!(!session.is_authenticated());
        assert!(session.on_login("213213213"));
        assert!(session.is_authenticated());
    }

    #[test]
    fn nothing_works_before_login() {
        let mut session = EditSession::new(Box::new(SharedSecretGate::default()));
        assert_eq!(
            session.upload("a.png", b"x".to_vec(), "image/png"),
            Err(SessionError::NotAuthenticated)
        );
        let editor = ScriptedEditor::default();
        assert!(!session.run_edit(&editor, EditOperation::ReplaceBackgroundBlue));
        assert!(!session.run_upscale(&editor));
        assert_eq!(editor.calls(), 0);
        assert_eq!(session.error(), None);
    }

    #[test]
    fn non_image_upload_is_rejected_visibly_and_keeps_state() {
        let mut session = with_portrait();
        let err = session.upload("notes.txt", b"hi".to_vec(), "text/plain");
        assert!(matches!(
            err,
            Err(SessionError::Media(MediaError::UnsupportedInput(_)))
        ));
        assert_eq!(session.error(), Some("Please select an image file only."));
        assert_eq!(session.source().map(|s| s.name()), Some("portrait.jpg"));
    }

    #[test]
    fn upload_clears_previous_result_and_error() {
        let mut session = with_portrait();
        let editor = ScriptedEditor::with(vec![Ok(b"png".to_vec())]);
        assert!(session.run_edit(&editor, EditOperation::ReplaceBackgroundWhite));
        assert!(session.result().is_some());
        let _ = session.upload("bad.pdf", b"%PDF".to_vec(), "application/pdf");
        assert!(session.error().is_some());

        session
            .upload("next.png", b"png".to_vec(), "image/png")
            .expect("second upload");
        assert!(session.result().is_none());
        assert_eq!(session.error(), None);
        assert_eq!(session.output_name(), "next-processed.png");
    }

    #[test]
    fn run_edit_without_image_is_a_noop() {
        let mut session = signed_in();
        let editor = ScriptedEditor::with(vec![Ok(b"png".to_vec())]);
        assert!(!session.run_edit(&editor, EditOperation::OutfitMenShirt));
        assert_eq!(editor.calls(), 0);
        assert_eq!(session.activity(), Activity::Idle);
        assert!(session.result().is_none());
        assert_eq!(session.error(), None);
    }

    #[test]
    fn run_edit_while_processing_is_a_noop() {
        let mut session = with_portrait();
        let pending = session
            .begin_edit(EditOperation::ReplaceBackgroundBlue)
            .expect("first edit starts");
        assert!(session.is_processing());

        let editor = ScriptedEditor::with(vec![Ok(b"png".to_vec())]);
        assert!(!session.run_edit(&editor, EditOperation::OutfitWomenVest));
        assert!(!session.run_upscale(&editor));
        assert_eq!(editor.calls(), 0);
        assert_eq!(session.activity(), Activity::Processing(EditOperation::ReplaceBackgroundBlue));
        assert_eq!(
            session.progress_message(),
            Some(EditOperation::ReplaceBackgroundBlue.progress_message())
        );

        session.complete(pending, Ok(b"first".to_vec()));
        assert!(!session.is_processing());
        assert_eq!(session.progress_message(), None);
    }

    #[test]
    fn successful_edit_stores_png_result() -> anyhow::Result<()> {
        let mut session = with_portrait();
        let editor = ScriptedEditor::with(vec![Ok(b"A".to_vec())]);
        assert!(session.run_edit(&editor, EditOperation::OutfitMenVest));

        assert!(!session.is_processing());
        assert_eq!(session.error(), None);
        let result = session.result().expect("result stored");
        assert_eq!(result.data_uri(), "data:image/png;base64,QQ==");
        assert_eq!(result.mime_type(), "image/png");
        assert_eq!(result.png_bytes()?, b"A".to_vec());
        assert_eq!(editor.prompts(), vec![build_prompt(EditOperation::OutfitMenVest)]);
        Ok(())
    }

    #[test]
    fn failed_edit_leaves_result_cleared_and_sets_error() {
        let mut session = with_portrait();
        let editor = ScriptedEditor::with(vec![
            Ok(b"first".to_vec()),
            Err(EditError::NoImagePart("finish_reason=SAFETY".to_string())),
        ]);
        assert!(session.run_edit(&editor, EditOperation::ReplaceBackgroundBlue));
        assert!(session.result().is_some());

        assert!(session.run_edit(&editor, EditOperation::ReplaceBackgroundWhite));
        assert!(!session.is_processing());
        assert!(session.result().is_none());
        assert_eq!(
            session.error(),
            Some("The AI did not return an image. It may have refused the request.")
        );
    }

    #[test]
    fn empty_editor_output_is_not_a_result() -> anyhow::Result<()> {
        let mut session = with_portrait();
        let editor = ScriptedEditor::with(vec![Ok(Vec::new())]);
        assert!(session.run_edit(&editor, EditOperation::ReplaceBackgroundBlue));

        assert!(session.result().is_none());
        assert_eq!(
            session.error(),
            Some("The AI did not return an image. It may have refused the request.")
        );
        assert_eq!(session.begin_upscale().err(), Some(SessionError::NoResult));

        let temp = tempfile::tempdir()?;
        assert!(session.save_result(temp.path()).is_err());
        Ok(())
    }

    #[test]
    fn empty_upscale_output_keeps_previous_result() -> anyhow::Result<()> {
        let mut session = with_portrait();
        let editor = ScriptedEditor::with(vec![Ok(b"small".to_vec()), Ok(Vec::new())]);
        assert!(session.run_edit(&editor, EditOperation::ReplaceBackgroundBlue));
        assert!(session.run_upscale(&editor));

        assert_eq!(session.result().expect("result kept").png_bytes()?, b"small".to_vec());
        assert!(session.error().is_some());
        Ok(())
    }

    #[test]
    fn rate_limit_message_is_distinct() {
        let mut session = with_portrait();
        let editor = ScriptedEditor::with(vec![Err(EditError::RateLimited)]);
        assert!(session.run_edit(&editor, EditOperation::ReplaceBackgroundBlue));
        assert_eq!(session.error(), Some("Too many requests. Please try again later."));
    }

    #[test]
    fn error_is_cleared_when_next_edit_starts() {
        let mut session = with_portrait();
        let editor = ScriptedEditor::with(vec![Err(EditError::Transport("down".to_string()))]);
        assert!(session.run_edit(&editor, EditOperation::ReplaceBackgroundBlue));
        assert!(session.error().is_some());

        let pending = session
            .begin_edit(EditOperation::ReplaceBackgroundBlue)
            .expect("retry starts");
        assert_eq!(session.error(), None);
        session.complete(pending, Ok(b"ok".to_vec()));
    }

    #[test]
    fn upscale_success_replaces_result_and_clears_flag() -> anyhow::Result<()> {
        let mut session = with_portrait();
        let editor = ScriptedEditor::with(vec![Ok(b"small".to_vec()), Ok(b"large".to_vec())]);
        assert!(session.run_edit(&editor, EditOperation::ReplaceBackgroundBlue));

        let pending = session.begin_upscale().expect("upscale starts");
        assert!(session.is_upscaling());
        assert_eq!(pending.kind(), RequestKind::Upscale);
        assert_eq!(pending.prompt(), UPSCALE_PROMPT);
        assert_eq!(pending.image().mime_type, "image/png");
        let outcome = pending.dispatch(&editor);
        session.complete(pending, outcome);

        assert!(!session.is_upscaling());
        assert_eq!(session.result().expect("result").png_bytes()?, b"large".to_vec());
        assert_eq!(editor.prompts().last().map(String::as_str), Some(UPSCALE_PROMPT));
        Ok(())
    }

    #[test]
    fn upscale_failure_keeps_result_and_clears_flag() -> anyhow::Result<()> {
        let mut session = with_portrait();
        let editor = ScriptedEditor::with(vec![
            Ok(b"small".to_vec()),
            Err(EditError::Transport("reset".to_string())),
        ]);
        assert!(session.run_edit(&editor, EditOperation::ReplaceBackgroundBlue));
        assert!(session.run_upscale(&editor));

        assert!(!session.is_upscaling());
        assert_eq!(session.activity(), Activity::Idle);
        assert_eq!(session.result().expect("result kept").png_bytes()?, b"small".to_vec());
        assert_eq!(
            session.error(),
            Some("An error occurred while communicating with the AI service to upscale the image.")
        );
        Ok(())
    }

    #[test]
    fn upscale_requires_a_result() {
        let mut session = with_portrait();
        let editor = ScriptedEditor::default();
        assert_eq!(session.begin_upscale().err(), Some(SessionError::NoResult));
        assert!(!session.run_upscale(&editor));
        assert_eq!(editor.calls(), 0);
        assert!(!session.is_upscaling());
    }

    #[test]
    fn upscale_after_fresh_upload_is_a_noop() {
        let mut session = with_portrait();
        let editor = ScriptedEditor::with(vec![Ok(b"png".to_vec())]);
        assert!(session.run_edit(&editor, EditOperation::ReplaceBackgroundBlue));
        session
            .upload("other.png", b"png".to_vec(), "image/png")
            .expect("upload");
        assert!(!session.run_upscale(&editor));
        assert_eq!(editor.calls(), 1);
    }

    #[test]
    fn outcome_for_replaced_image_is_discarded() {
        let mut session = with_portrait();
        let pending = session
            .begin_edit(EditOperation::ReplaceBackgroundBlue)
            .expect("edit starts");
        session
            .upload("newer.png", b"png".to_vec(), "image/png")
            .expect("upload mid-flight");
        session.complete(pending, Ok(b"stale".to_vec()));

        assert_eq!(session.activity(), Activity::Idle);
        assert!(session.result().is_none());
        assert_eq!(session.error(), None);
    }

    #[test]
    fn output_name_defaults_and_strips_extension() {
        let mut session = signed_in();
        assert_eq!(session.output_name(), "download.png");
        session
            .upload("portrait.jpg", b"x".to_vec(), "image/jpeg")
            .expect("upload");
        assert_eq!(session.output_name(), "portrait-processed.png");
        session
            .upload("portrait", b"x".to_vec(), "image/jpeg")
            .expect("upload");
        assert_eq!(session.output_name(), "portrait-processed.png");
    }

    #[test]
    fn save_result_writes_png_under_output_name() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut session = with_portrait();
        assert!(session.save_result(temp.path()).is_err());

        let editor = ScriptedEditor::with(vec![Ok(b"png-bytes".to_vec())]);
        assert!(session.run_edit(&editor, EditOperation::ReplaceBackgroundBlue));
        let path = session.save_result(&temp.path().join("out"))?;
        assert!(path.ends_with("out/portrait-processed.png"));
        assert_eq!(std::fs::read(path)?, b"png-bytes".to_vec());
        Ok(())
    }

    #[test]
    fn logout_drops_image_and_result() {
        let mut session = with_portrait();
        let editor = ScriptedEditor::with(vec![Ok(b"png".to_vec())]);
        assert!(session.run_edit(&editor, EditOperation::ReplaceBackgroundBlue));
        session.logout();
        assert!(!session.is_authenticated());
        assert!(session.source().is_none());
        assert!(session.result().is_none());
    }

    #[test]
    fn unwritable_event_log_is_rejected_up_front() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, b"not a directory")?;
        let events = EventWriter::new(blocker.join("events.jsonl"), "session-1");

        let session = EditSession::new(Box::new(SharedSecretGate::default()));
        let err = match session.with_events(events) {
            Ok(_) => anyhow::bail!("log under a regular file should be rejected"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("is not writable"), "{err:#}");
        Ok(())
    }

    #[test]
    fn later_event_write_failure_is_recorded_once() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, b"not a directory")?;

        let mut session = EditSession::new(Box::new(SharedSecretGate::default()));
        session.events = Some(EventWriter::new(blocker.join("events.jsonl"), "session-1"));
        assert_eq!(session.event_log_error(), None);

        assert!(session.on_login("213213213"));
        session.upload("portrait.jpg", b"jpeg".to_vec(), "image/jpeg")?;

        let recorded = session.event_log_error().expect("failure recorded");
        assert!(recorded.starts_with("login_succeeded: "), "{recorded}");
        assert!(session.source().is_some());
        assert_eq!(session.error(), None);
        Ok(())
    }

    #[test]
    fn events_record_lifecycle_without_image_bytes() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events = EventWriter::new(temp.path().join("events.jsonl"), "session-1");
        let mut session =
            EditSession::new(Box::new(SharedSecretGate::default())).with_events(events.clone())?;
        assert!(!session.on_login("nope"));
        assert!(session.on_login("213213213"));
        session.upload("portrait.jpg", b"secret-pixels".to_vec(), "image/jpeg")?;
        let editor = ScriptedEditor::with(vec![Ok(b"png".to_vec()), Err(EditError::RateLimited)]);
        assert!(session.run_edit(&editor, EditOperation::ReplaceBackgroundBlue));
        assert!(session.run_upscale(&editor));

        assert_eq!(
            events.event_types()?,
            vec![
                "session_started",
                "login_rejected",
                "login_succeeded",
                "image_uploaded",
                "edit_started",
                "edit_finished",
                "upscale_started",
                "upscale_failed",
            ]
        );
        let raw = std::fs::read_to_string(events.path())?;
        assert!(!raw.contains("213213213"));
        assert!(!raw.contains("nope"));
        assert!(!raw.contains("secret-pixels"));
        assert!(raw.contains(&sha256_hex(b"secret-pixels")));
        Ok(())
    }
}
