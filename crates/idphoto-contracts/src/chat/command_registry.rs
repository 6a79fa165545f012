#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "login",
    action: "login",
}];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "upload",
        action: "upload",
    },
    CommandSpec {
        command: "open",
        action: "upload",
    },
    CommandSpec {
        command: "save",
        action: "save",
    },
];

/// Shortcuts that run one edit operation each; `operation` is the slug.
pub(crate) const OPERATION_COMMANDS: &[(&str, &str)] = &[
    ("blue", "blue"),
    ("white", "white"),
    ("men_shirt", "men_white_shirt"),
    ("men_white_shirt", "men_white_shirt"),
    ("women_shirt", "women_white_shirt"),
    ("women_white_shirt", "women_white_shirt"),
    ("men_vest", "men_vest"),
    ("women_vest", "women_vest"),
];

pub(crate) const EDIT_COMMAND: CommandSpec = CommandSpec {
    command: "edit",
    action: "edit",
};

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "upscale",
        action: "upscale",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "ops",
        action: "list_operations",
    },
    CommandSpec {
        command: "logout",
        action: "logout",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/login",
    "/upload",
    "/blue",
    "/white",
    "/men_shirt",
    "/women_shirt",
    "/men_vest",
    "/women_vest",
    "/edit",
    "/upscale",
    "/save",
    "/status",
    "/ops",
    "/logout",
    "/help",
    "/quit",
];
