#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "upload",
        action: "upload",
    },
    CommandSpec {
        command: "use",
        action: "upload",
    },
];

/// Commands whose whole remainder is free text.
pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "ask",
        action: "ask",
    },
    CommandSpec {
        command: "show",
        action: "show",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "disease",
        action: "find_disease",
    },
    CommandSpec {
        command: "find_disease",
        action: "find_disease",
    },
    CommandSpec {
        command: "advice",
        action: "advice",
    },
    CommandSpec {
        command: "suggestions",
        action: "advice",
    },
    CommandSpec {
        command: "tips",
        action: "tips",
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
    "/upload <path>",
    "/disease",
    "/advice",
    "/ask <question>",
    "/show [action]",
    "/tips",
    "/help",
    "/quit",
];
