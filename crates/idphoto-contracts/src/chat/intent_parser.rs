use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, EDIT_COMMAND, NO_ARG_COMMANDS, OPERATION_COMMANDS, RAW_ARG_COMMANDS,
    SINGLE_PATH_COMMANDS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            command_args: BTreeMap::new(),
        }
    }

    fn with_arg(mut self, key: &str, value: impl Into<String>) -> Self {
        self.command_args
            .insert(key.to_string(), Value::String(value.into()));
        self
    }

    /// String argument, `None` when missing or blank.
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.command_args
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_single_path_arg(arg: &str) -> String {
    if arg.trim().is_empty() {
        return String::new();
    }
    let parts = match shell_words::split(arg) {
        Ok(parts) => parts,
        Err(_) => arg.split_whitespace().map(str::to_string).collect(),
    };
    parts
        .into_iter()
        .filter(|value| !value.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop");
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(action) = find_action(&command, RAW_ARG_COMMANDS) {
                return Intent::new(action).with_arg("password", arg);
            }

            if let Some(action) = find_action(&command, SINGLE_PATH_COMMANDS) {
                return Intent::new(action).with_arg("path", parse_single_path_arg(arg));
            }

            if let Some((_, slug)) = OPERATION_COMMANDS
                .iter()
                .find(|(shortcut, _)| *shortcut == command)
            {
                return Intent::new(EDIT_COMMAND.action).with_arg("operation", *slug);
            }

            if command == EDIT_COMMAND.command {
                return Intent::new(EDIT_COMMAND.action).with_arg("operation", arg);
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action);
            }

            return Intent::new("unknown")
                .with_arg("command", command)
                .with_arg("arg", arg);
        }
    }

    Intent::new("text").with_arg("text", raw_trimmed)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_intent;

    #[test]
    fn blank_lines_are_noops() {
        assert_eq!(parse_intent("").action, "noop");
        assert_eq!(parse_intent("   \n").action, "noop");
    }

    #[test]
    fn parse_upload_quoted_path() {
        let intent = parse_intent("/upload \"/tmp/my photos/me.jpg\"");
        assert_eq!(intent.action, "upload");
        assert_eq!(intent.command_args["path"], json!("/tmp/my photos/me.jpg"));

        let open = parse_intent("/open me.png");
        assert_eq!(open.action, "upload");
        assert_eq!(open.arg("path"), Some("me.png"));
    }

    #[test]
    fn parse_save_with_and_without_dir() {
        assert_eq!(parse_intent("/save").arg("path"), None);
        assert_eq!(parse_intent("/save out").arg("path"), Some("out"));
    }

    #[test]
    fn operation_shortcuts_map_to_edit_slugs() {
        let blue = parse_intent("/blue");
        assert_eq!(blue.action, "edit");
        assert_eq!(blue.command_args["operation"], json!("blue"));

        assert_eq!(
            parse_intent("/men_shirt").arg("operation"),
            Some("men_white_shirt")
        );
        assert_eq!(
            parse_intent("/WOMEN_VEST").arg("operation"),
            Some("women_vest")
        );

        let explicit = parse_intent("/edit women_white_shirt");
        assert_eq!(explicit.action, "edit");
        assert_eq!(explicit.arg("operation"), Some("women_white_shirt"));
    }

    #[test]
    fn login_keeps_raw_password_argument() {
        let intent = parse_intent("/login  213 213 ");
        assert_eq!(intent.action, "login");
        assert_eq!(intent.command_args["password"], json!("213 213"));
    }

    #[test]
    fn no_arg_commands() {
        assert_eq!(parse_intent("/upscale").action, "upscale");
        assert_eq!(parse_intent("/ops").action, "list_operations");
        assert_eq!(parse_intent("/exit").action, "quit");
        assert_eq!(parse_intent("/status").action, "status");
    }

    #[test]
    fn parse_unknown_command_and_plain_text() {
        let intent = parse_intent("/magic foo bar");
        assert_eq!(intent.action, "unknown");
        assert_eq!(intent.command_args["command"], json!("magic"));
        assert_eq!(intent.command_args["arg"], json!("foo bar"));

        let text = parse_intent("  213213213 ");
        assert_eq!(text.action, "text");
        assert_eq!(text.arg("text"), Some("213213213"));
    }
}
