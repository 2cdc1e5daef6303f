use crate::env::Environment;
use crate::tree::DEFAULT_LEVEL;
use std::path::PathBuf;

/// Variable naming the history file explicitly.
pub const HISTORY_VAR: &str = "COMMAND_SHELL_HISTORY";

/// History file name used under `$HOME`.
pub const HISTORY_FILE_NAME: &str = ".command_shell_history";

/// Shell settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Prompt while reading structured commands.
    pub command_prompt: String,
    /// Prompt while in console mode.
    pub console_prompt: String,
    /// Prompt while a console statement is incomplete.
    pub continuation_prompt: String,
    /// Where line history is kept; `None` disables persistence.
    pub history_file: Option<PathBuf>,
    /// Level given to commands registered without one.
    pub default_level: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            command_prompt: "cmd> ".to_string(),
            console_prompt: "con> ".to_string(),
            continuation_prompt: "... > ".to_string(),
            history_file: None,
            default_level: DEFAULT_LEVEL,
        }
    }
}

impl Settings {
    /// Defaults with the history file taken from the environment.
    pub fn from_env(env: &Environment) -> Self {
        let history_file = env
            .get_var(HISTORY_VAR)
            .map(|path| PathBuf::from(shellexpand::tilde(&path).into_owned()))
            .or_else(|| {
                env.get_var("HOME")
                    .map(|home| PathBuf::from(home).join(HISTORY_FILE_NAME))
            });
        Self {
            history_file,
            ..Self::default()
        }
    }
}
