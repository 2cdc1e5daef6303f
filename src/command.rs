use crate::error::ShellError;
use crate::options::OptionParser;
use std::any::Any;
use std::io::Write;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// What a handler wants the dispatcher to do after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// Nothing more to do.
    Done,
    /// Print the command's usage text; this is not an error.
    ShowUsage,
}

/// Value returned by every command handler.
///
/// Ordinary failures should be reported as [`ShellError`] values so the
/// shell can print them as a one-line message. Any other error type is
/// treated as an unexpected fault and reported with its full chain.
pub type CommandResult = anyhow::Result<CommandStatus>;

/// Object-safe handler signature.
pub type Handler = Rc<dyn Fn(&mut Invocation<'_>) -> CommandResult>;

/// Custom argument completion: receives the fragment being completed and
/// the positional arguments typed so far.
pub type CompleteFn = Rc<dyn Fn(&str, &[String]) -> Vec<String>>;

/// Interrupt flag shared between the shell and whatever raises interrupts
/// (the Ctrl-C handler or an asynchronous exit request).
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Reset the flag, returning whether it was set.
    pub fn clear(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Everything a handler receives when it is invoked.
pub struct Invocation<'a> {
    /// Positional arguments left after command resolution and option parsing.
    pub args: Vec<String>,
    /// Where the command writes its output.
    pub out: &'a mut dyn Write,
    options: Option<Box<dyn Any>>,
    interrupt: Interrupt,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(
        args: Vec<String>,
        options: Option<Box<dyn Any>>,
        out: &'a mut dyn Write,
        interrupt: Interrupt,
    ) -> Self {
        Self {
            args,
            out,
            options,
            interrupt,
        }
    }

    /// The parsed options, if the command declares a parser of type `T`.
    pub fn options<T: 'static>(&self) -> Option<&T> {
        self.options.as_ref()?.downcast_ref::<T>()
    }

    /// Move the parsed options out, leaving `args` and `out` free to borrow.
    pub fn take_options<T: 'static>(&mut self) -> Option<Box<T>> {
        self.options.take()?.downcast::<T>().ok()
    }

    /// Long-running handlers call this periodically to honour Ctrl-C.
    pub fn check_interrupt(&self) -> Result<(), ShellError> {
        if self.interrupt.is_raised() {
            Err(ShellError::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// Which filesystem entries to offer when completing arguments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArgCompletion {
    #[default]
    None,
    Files,
    Directories,
}

/// Recognised per-command configuration.
///
/// Absent values take no effect.
#[derive(Clone, Default)]
pub struct CommandOptions {
    pub nargs: Option<usize>,
    pub minargs: Option<usize>,
    pub maxargs: Option<usize>,
    pub parser: Option<Rc<dyn OptionParser>>,
    /// Usage template; `%prog` is replaced by the command's full title.
    pub usage: Option<String>,
    pub completer: Option<CompleteFn>,
    pub args: ArgCompletion,
}

impl CommandOptions {
    /// Reject contradicting arity constraints.
    pub fn validate(&self, path: &str) -> Result<(), ShellError> {
        let invalid = |reason: &str| ShellError::InvalidOptions {
            path: path.to_string(),
            reason: reason.to_string(),
        };
        if self.nargs.is_some() && (self.minargs.is_some() || self.maxargs.is_some()) {
            return Err(invalid("nargs cannot be combined with minargs or maxargs"));
        }
        if let (Some(min), Some(max)) = (self.minargs, self.maxargs) {
            if min > max {
                return Err(invalid("minargs exceeds maxargs"));
            }
        }
        Ok(())
    }

    /// Whether the command accepts `n` positional arguments.
    pub fn accepts(&self, n: usize) -> bool {
        self.nargs.is_none_or(|exact| n == exact)
            && self.minargs.is_none_or(|min| n >= min)
            && self.maxargs.is_none_or(|max| n <= max)
    }

    /// Usage text for the command titled `full_title`, if any is known.
    pub fn usage_text(&self, full_title: &str) -> Option<String> {
        if let Some(parser) = &self.parser {
            Some(parser.usage(full_title))
        } else {
            self.usage
                .as_ref()
                .map(|template| format!("usage: {}", template.replace("%prog", full_title)))
        }
    }
}

/// A command to be registered in the command tree.
///
/// ```
/// use command_shell::{CommandSpec, CommandStatus, CommandTree};
/// use std::io::Write;
///
/// let mut tree = CommandTree::new();
/// tree.add(
///     CommandSpec::new("db lookup", |inv| {
///         writeln!(inv.out, "looking up {}", inv.args.join(" "))?;
///         Ok(CommandStatus::Done)
///     })
///     .minargs(1),
/// )
/// .unwrap();
/// ```
pub struct CommandSpec {
    pub(crate) path: String,
    pub(crate) handler: Handler,
    pub(crate) options: CommandOptions,
    pub(crate) level: Option<u32>,
    pub(crate) overwrite: bool,
}

impl CommandSpec {
    pub fn new<F>(path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> CommandResult + 'static,
    {
        Self {
            path: path.into(),
            handler: Rc::new(handler),
            options: CommandOptions::default(),
            level: None,
            overwrite: false,
        }
    }

    /// Priority among abbreviation matches; lower wins. Defaults to the
    /// tree's default level.
    pub fn level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    /// Replace an existing command at the same path instead of failing.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn nargs(mut self, n: usize) -> Self {
        self.options.nargs = Some(n);
        self
    }

    pub fn minargs(mut self, n: usize) -> Self {
        self.options.minargs = Some(n);
        self
    }

    pub fn maxargs(mut self, n: usize) -> Self {
        self.options.maxargs = Some(n);
        self
    }

    pub fn parser(mut self, parser: impl OptionParser + 'static) -> Self {
        self.options.parser = Some(Rc::new(parser));
        self
    }

    pub fn usage(mut self, template: impl Into<String>) -> Self {
        self.options.usage = Some(template.into());
        self
    }

    pub fn completer<F>(mut self, completer: F) -> Self
    where
        F: Fn(&str, &[String]) -> Vec<String> + 'static,
    {
        self.options.completer = Some(Rc::new(completer));
        self
    }

    /// Complete arguments as file names.
    pub fn file_args(mut self) -> Self {
        self.options.args = ArgCompletion::Files;
        self
    }

    /// Complete arguments as directory names only.
    pub fn dir_args(mut self) -> Self {
        self.options.args = ArgCompletion::Directories;
        self
    }
}
