use std::io;

/// Errors produced while registering, resolving or running shell commands.
///
/// Every variant describes a failure local to one input line. The dispatch
/// boundary reports them as a single message and carries on with the next
/// line; only [`ShellError::ExitRequested`] ends the interactive loop.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// A double quote was opened but never closed.
    #[error("inappropriate use of quotation characters")]
    MalformedQuoting,

    /// An abbreviation matched several commands of equal level.
    #[error("command is ambiguous: {0}")]
    AmbiguousCommand(String),

    /// No command with a handler could be found for the input.
    #[error("command not recognized: {0}")]
    UnknownCommand(String),

    /// The terminal segment of a registration already exists.
    #[error("refusing to overwrite already existing command: {0}")]
    DuplicateCommand(String),

    /// The path given for removal does not name an exact command.
    #[error("no valid command node specified: {0}")]
    InvalidRemoval(String),

    /// A registration path without any segment.
    #[error("invalid command path: {0:?}")]
    InvalidPath(String),

    /// Contradicting per-command configuration, detected at registration.
    #[error("invalid options for {path}: {reason}")]
    InvalidOptions { path: String, reason: String },

    /// The option parser stopped on request (e.g. `--help`); the message is informational.
    #[error("{0}")]
    ParseAbort(String),

    /// The option parser rejected the input.
    #[error("{0}")]
    ParseError(String),

    /// The number of positional arguments violates `nargs`/`minargs`/`maxargs`.
    #[error("wrong number of arguments to command (got {got})")]
    ArityError { got: usize },

    /// Ordinary failure reported by a command handler.
    #[error("{0}")]
    Command(String),

    /// A handler noticed the interrupt flag and gave up.
    #[error("aborted")]
    Interrupted,

    /// Dispatched code asked the shell to terminate.
    #[error("exit requested")]
    ExitRequested,

    /// A batch file could not be read.
    #[error("cannot read batch file {path}: {source}")]
    BatchFile {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Batch files include each other too deeply.
    #[error("batch files nested too deeply at {0}")]
    BatchNesting(String),
}

impl ShellError {
    /// Shorthand for handlers reporting an ordinary one-line failure.
    pub fn command(msg: impl Into<String>) -> Self {
        ShellError::Command(msg.into())
    }
}
