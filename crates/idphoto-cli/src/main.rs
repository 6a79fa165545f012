use std::fs;
use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use idphoto_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS};
use idphoto_contracts::edits::{build_prompt, EditOperation};
use idphoto_contracts::events::EventWriter;
use idphoto_contracts::media::mime_for_path;
use idphoto_engine::{
    build_editor, Activity, EditSession, EditorOptions, ImageEditor, LoginForm, SharedSecretGate,
    EDITOR_NAMES,
};

const FALLBACK_MIME: &str = "application/octet-stream";
const DEFAULT_OUT_DIR: &str = "idphoto-out";
const SIGN_IN_HINT: &str =
    "Enter the access password (use /login <password> if it starts with '/').";

#[derive(Debug, Parser)]
#[command(name = "idphoto", version, about = "ID photo editor backed by Gemini image editing")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session: sign in, upload, edit, upscale, save.
    Chat(ChatArgs),
    /// One edit from the command line.
    Edit(EditArgs),
    /// List the available edit operations.
    Ops,
}

#[derive(Debug, Parser)]
struct EditorArgs {
    #[arg(long, default_value = "gemini")]
    provider: String,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    api_base: Option<String>,
}

impl EditorArgs {
    fn build(&self) -> Result<Box<dyn ImageEditor>> {
        build_editor(
            &self.provider,
            &EditorOptions {
                model: self.model.clone(),
                api_base: self.api_base.clone(),
            },
        )
    }
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long, default_value = DEFAULT_OUT_DIR)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    editor: EditorArgs,
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    operation: String,
    #[arg(long)]
    upscale: bool,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    /// Access password; asked for on stdin when omitted.
    #[arg(long)]
    password: Option<String>,
    #[command(flatten)]
    editor: EditorArgs,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("idphoto error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Edit(args) => run_edit(args),
        Command::Ops => {
            print_operations(&mut io::stdout())?;
            Ok(0)
        }
    }
}

fn new_session(out: &Path, events: Option<&Path>) -> Result<EditSession> {
    let events_path = events
        .map(Path::to_path_buf)
        .unwrap_or_else(|| out.join("events.jsonl"));
    let session_id = uuid::Uuid::new_v4().to_string();
    EditSession::new(Box::new(SharedSecretGate::from_env()))
        .with_events(EventWriter::new(events_path, session_id))
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let editor = args.editor.build()?;
    let session = new_session(&args.out, args.events.as_deref())?;
    let mut shell = ChatShell::new(session, editor, args.out.clone());

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();

    println!(
        "idphoto chat started ({} editor; available: {}). {SIGN_IN_HINT}",
        shell.editor.name(),
        EDITOR_NAMES.join(", ")
    );

    loop {
        print!("> ");
        stdout.flush()?;

        line.clear();
        let read = match stdin.lock().read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        if shell.handle(input, &mut stdout)? == Flow::Quit {
            break;
        }
    }
    Ok(())
}

fn run_edit(args: EditArgs) -> Result<i32> {
    let operation: EditOperation = args.operation.parse().map_err(anyhow::Error::msg)?;
    let editor = args.editor.build()?;
    let mut session = new_session(&args.out, args.events.as_deref())?;

    let password = match args.password {
        Some(password) => password,
        None => prompt_password()?,
    };
    let mut form = LoginForm::new();
    form.set_password(password);
    if !form.submit(&mut session) {
        bail!("{}", form.error().unwrap_or("sign-in failed"));
    }

    let (name, bytes, mime) = read_upload(&args.input)?;
    if session.upload(&name, bytes, &mime).is_err() {
        bail!(
            "{}: {}",
            args.input.display(),
            session.error().unwrap_or("upload rejected")
        );
    }

    let pending = session.begin_edit(operation)?;
    eprintln!("{}", session.progress_message().unwrap_or_default());
    let outcome = pending.dispatch(editor.as_ref());
    session.complete(pending, outcome);
    if let Some(message) = session.error() {
        bail!("{message}");
    }

    let mut code = 0;
    if args.upscale {
        let pending = session.begin_upscale()?;
        eprintln!("{}", session.progress_message().unwrap_or_default());
        let outcome = pending.dispatch(editor.as_ref());
        session.complete(pending, outcome);
        if let Some(message) = session.error() {
            eprintln!("{message}");
            code = 1;
        }
    }

    let path = session.save_result(&args.out)?;
    println!("{}", path.display());
    if let Some(err) = session.event_log_error() {
        eprintln!("warning: event log incomplete: {err}");
    }
    Ok(code)
}

fn prompt_password() -> Result<String> {
    eprint!("Access password: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;
    Ok(line.trim().to_string())
}

fn print_operations(out: &mut impl Write) -> Result<()> {
    for op in EditOperation::ALL {
        writeln!(out, "{:<18} {}", op.slug(), op.label())?;
        writeln!(out, "    {}", build_prompt(op))?;
    }
    Ok(())
}

/// Reads a file for upload. The declared type comes from the extension, then
/// from sniffing the content.
fn read_upload(path: &Path) -> Result<(String, Vec<u8>, String)> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|value| value.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.to_string_lossy().to_string());
    let mime = mime_for_path(path)
        .or_else(|| {
            image::guess_format(&bytes)
                .ok()
                .map(|format| format.to_mime_type())
        })
        .unwrap_or(FALLBACK_MIME)
        .to_string();
    Ok((name, bytes, mime))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

struct ChatShell {
    session: EditSession,
    editor: Box<dyn ImageEditor>,
    form: LoginForm,
    out_dir: PathBuf,
    event_log_warned: bool,
}

impl ChatShell {
    fn new(session: EditSession, editor: Box<dyn ImageEditor>, out_dir: PathBuf) -> Self {
        Self {
            session,
            editor,
            form: LoginForm::new(),
            out_dir,
            event_log_warned: false,
        }
    }

    fn handle(&mut self, input: &str, out: &mut impl Write) -> Result<Flow> {
        let flow = self.respond(input, out)?;
        if !self.event_log_warned {
            if let Some(err) = self.session.event_log_error() {
                writeln!(out, "warning: event log stopped recording: {err}")?;
                self.event_log_warned = true;
            }
        }
        Ok(flow)
    }

    fn respond(&mut self, input: &str, out: &mut impl Write) -> Result<Flow> {
        let intent = parse_intent(input);
        match intent.action.as_str() {
            "noop" => {}
            "quit" => return Ok(Flow::Quit),
            "help" => writeln!(out, "Commands: {}", CHAT_HELP_COMMANDS.join(" "))?,
            "list_operations" => print_operations(out)?,
            "login" => self.sign_in(intent.arg("password").unwrap_or_default(), out)?,
            "text" if !self.session.is_authenticated() => {
                self.sign_in(intent.arg("text").unwrap_or_default(), out)?
            }
            _ if !self.session.is_authenticated() => {
                writeln!(out, "Sign in first. {SIGN_IN_HINT}")?
            }
            "upload" => self.upload(&intent, out)?,
            "edit" => self.edit(&intent, out)?,
            "upscale" => self.upscale(out)?,
            "save" => self.save(&intent, out)?,
            "status" => self.status(out)?,
            "logout" => {
                self.session.logout();
                writeln!(out, "Signed out.")?;
            }
            "unknown" => writeln!(
                out,
                "Unknown command /{}. Type /help.",
                intent.arg("command").unwrap_or_default()
            )?,
            _ => writeln!(out, "Type /help for commands.")?,
        }
        Ok(Flow::Continue)
    }

    fn sign_in(&mut self, password: &str, out: &mut impl Write) -> Result<()> {
        if self.session.is_authenticated() {
            writeln!(out, "Already signed in.")?;
            return Ok(());
        }
        self.form.set_password(password);
        if self.form.submit(&mut self.session) {
            writeln!(out, "Signed in. Use /upload <path> to load a photo.")?;
        } else if let Some(message) = self.form.error() {
            writeln!(out, "{message}")?;
        }
        Ok(())
    }

    fn upload(&mut self, intent: &Intent, out: &mut impl Write) -> Result<()> {
        let Some(path) = intent.arg("path") else {
            writeln!(out, "/upload requires a path")?;
            return Ok(());
        };
        let path = PathBuf::from(path);
        let (name, bytes, mime) = match read_upload(&path) {
            Ok(upload) => upload,
            Err(err) => {
                writeln!(out, "Upload failed: {err:#}")?;
                return Ok(());
            }
        };
        match self.session.upload(&name, bytes, &mime) {
            Ok(()) => {
                let size = self.session.source().map(|s| s.bytes().len()).unwrap_or(0);
                writeln!(out, "Loaded {name} ({mime}, {size} bytes).")?;
            }
            Err(_) => {
                writeln!(out, "{}", self.session.error().unwrap_or("Upload rejected."))?;
            }
        }
        Ok(())
    }

    fn edit(&mut self, intent: &Intent, out: &mut impl Write) -> Result<()> {
        let Some(raw) = intent.arg("operation") else {
            writeln!(out, "/edit requires an operation (see /ops)")?;
            return Ok(());
        };
        let operation = match raw.parse::<EditOperation>() {
            Ok(operation) => operation,
            Err(message) => {
                writeln!(out, "{message}")?;
                return Ok(());
            }
        };
        let pending = match self.session.begin_edit(operation) {
            Ok(pending) => pending,
            Err(err) => {
                writeln!(out, "Cannot edit: {err}.")?;
                return Ok(());
            }
        };
        writeln!(out, "{}", self.session.progress_message().unwrap_or_default())?;
        out.flush()?;
        let outcome = pending.dispatch(self.editor.as_ref());
        self.session.complete(pending, outcome);
        self.report_result(out)
    }

    fn upscale(&mut self, out: &mut impl Write) -> Result<()> {
        let pending = match self.session.begin_upscale() {
            Ok(pending) => pending,
            Err(err) => {
                writeln!(out, "Cannot upscale: {err}.")?;
                return Ok(());
            }
        };
        writeln!(out, "{}", self.session.progress_message().unwrap_or_default())?;
        out.flush()?;
        let outcome = pending.dispatch(self.editor.as_ref());
        self.session.complete(pending, outcome);
        self.report_result(out)
    }

    fn report_result(&self, out: &mut impl Write) -> Result<()> {
        if let Some(message) = self.session.error() {
            writeln!(out, "{message}")?;
        } else if self.session.result().is_some() {
            writeln!(
                out,
                "Result ready. /save to write {} or /upscale for 2K.",
                self.session.output_name()
            )?;
        }
        Ok(())
    }

    fn save(&mut self, intent: &Intent, out: &mut impl Write) -> Result<()> {
        let dir = intent
            .arg("path")
            .map(PathBuf::from)
            .unwrap_or_else(|| self.out_dir.clone());
        match self.session.save_result(&dir) {
            Ok(path) => writeln!(out, "Saved {}", path.display())?,
            Err(err) => writeln!(out, "Save failed: {err:#}")?,
        }
        Ok(())
    }

    fn status(&self, out: &mut impl Write) -> Result<()> {
        let source = self
            .session
            .source()
            .map(|source| format!("{} ({})", source.name(), source.mime_type()))
            .unwrap_or_else(|| "none".to_string());
        let state = match self.session.activity() {
            Activity::Idle => "idle".to_string(),
            Activity::Processing(op) => format!("processing {op}"),
            Activity::Upscaling => "upscaling".to_string(),
        };
        writeln!(out, "editor: {}", self.editor.name())?;
        writeln!(out, "image: {source}")?;
        writeln!(
            out,
            "result: {}",
            if self.session.result().is_some() { "ready" } else { "none" }
        )?;
        writeln!(out, "state: {state}")?;
        if let Some(message) = self.session.error() {
            writeln!(out, "error: {message}")?;
        }
        Ok(())
    }
}
