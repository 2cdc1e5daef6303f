//! The interactive loop.
//!
//! A line is classified by its first character: `:` goes to the console,
//! `%` to the user's shell, `@` names a batch file and anything else is a
//! structured command. While the console is active every line belongs to it.

use crate::command::{CommandSpec, CommandStatus, Interrupt};
use crate::completion;
use crate::config::Settings;
use crate::console::{Calculator, Console};
use crate::env::Environment;
use crate::error::ShellError;
use crate::external;
use crate::input::{LineSource, ReadEvent};
use crate::tree::CommandTree;
use std::any::Any;
use std::cell::Cell;
use std::fs;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

/// Batch files may include each other this deep.
pub const MAX_BATCH_DEPTH: usize = 16;

/// How a raw input line is to be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    Command(&'a str),
    Console(&'a str),
    Shell(&'a str),
    Batch(&'a str),
}

/// Classify a line by its leading character, ignoring leading whitespace.
/// Blank lines classify to nothing.
pub fn classify(line: &str) -> Option<LineKind<'_>> {
    let line = line.trim_start();
    let mut chars = line.chars();
    match chars.next()? {
        ':' => Some(LineKind::Console(chars.as_str())),
        '%' => Some(LineKind::Shell(chars.as_str())),
        '@' => Some(LineKind::Batch(chars.as_str())),
        _ => Some(LineKind::Command(line)),
    }
}

/// Stops a running [`Repl`] from any thread.
#[derive(Clone)]
pub struct ExitHandle {
    stop: Arc<AtomicBool>,
    interrupt: Interrupt,
    events: Sender<ReadEvent>,
}

impl ExitHandle {
    /// Ask the loop to end.
    ///
    /// A wait for a line is woken up at once; a running command sees the
    /// interrupt flag and the loop ends after it returns. A call made while
    /// the loop is not running stops the next [`Repl::run`] right away.
    pub fn exit(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.interrupt.raise();
        let _ = self.events.send(ReadEvent::Wake);
    }
}

/// The shell: a command tree, a console and a line source driven by one
/// thread.
pub struct Repl<S: LineSource> {
    tree: CommandTree,
    console: Box<dyn Console>,
    input: S,
    settings: Settings,
    env: Rc<Environment>,
    out: Box<dyn Write>,
    console_mode: Rc<Cell<bool>>,
    continuation: bool,
    /// A line was requested and its outcome has not arrived yet.
    read_pending: bool,
    stop: Arc<AtomicBool>,
    sender: Sender<ReadEvent>,
    events: Receiver<ReadEvent>,
}

impl<S: LineSource> Repl<S> {
    /// A shell reading from `input` and writing to stdout, with the
    /// calculator console and the `console`, `shell`, `exit` and `quit`
    /// commands registered.
    pub fn new(input: S, settings: Settings, env: Environment) -> Result<Self, ShellError> {
        let mut tree = CommandTree::new();
        tree.set_default_level(settings.default_level);
        let console_mode = Rc::new(Cell::new(false));
        let env = Rc::new(env);
        register_shell_commands(&mut tree, &console_mode, env.clone())?;

        let mut input = input;
        if let Some(path) = &settings.history_file {
            if let Err(err) = input.load_history(path) {
                log::warn!("{err:#}");
            }
        }

        let (sender, events) = mpsc::channel();
        Ok(Self {
            tree,
            console: Box::new(Calculator::new()),
            input,
            settings,
            env,
            out: Box::new(io::stdout()),
            console_mode,
            continuation: false,
            read_pending: false,
            stop: Arc::new(AtomicBool::new(false)),
            sender,
            events,
        })
    }

    pub fn with_console(mut self, console: impl Console + 'static) -> Self {
        self.console = Box::new(console);
        self
    }

    pub fn with_output(mut self, out: impl Write + 'static) -> Self {
        self.out = Box::new(out);
        self
    }

    pub fn tree(&self) -> &CommandTree {
        &self.tree
    }

    /// Register or remove commands.
    pub fn tree_mut(&mut self) -> &mut CommandTree {
        &mut self.tree
    }

    pub fn input(&self) -> &S {
        &self.input
    }

    pub fn is_console_mode(&self) -> bool {
        self.console_mode.get()
    }

    /// Whether the console is waiting for the rest of a statement.
    pub fn is_continuation(&self) -> bool {
        self.continuation
    }

    pub fn exit_handle(&self) -> ExitHandle {
        ExitHandle {
            stop: self.stop.clone(),
            interrupt: self.tree.interrupt(),
            events: self.sender.clone(),
        }
    }

    fn prompt(&self) -> &str {
        if self.continuation {
            &self.settings.continuation_prompt
        } else if self.console_mode.get() {
            &self.settings.console_prompt
        } else {
            &self.settings.command_prompt
        }
    }

    /// Dispatch one raw line.
    ///
    /// Failures local to the line have already been reported when this
    /// returns. Errors returned are those a handler raised itself, including
    /// [`ShellError::ExitRequested`].
    pub fn execute_line(&mut self, line: &str) -> anyhow::Result<()> {
        let result = self.dispatch(line, 0);
        self.out.flush()?;
        result
    }

    fn dispatch(&mut self, line: &str, depth: usize) -> anyhow::Result<()> {
        if self.console_mode.get() || self.continuation {
            return self.push_console(line);
        }
        match classify(line) {
            None => Ok(()),
            Some(LineKind::Console(statement)) => self.push_console(statement),
            Some(LineKind::Shell(command)) => {
                let command = command.trim();
                self.out.flush()?;
                external::run_shell(&self.env, (!command.is_empty()).then_some(command))?;
                Ok(())
            }
            Some(LineKind::Batch(path)) => self.execute_batch(path.trim(), depth + 1),
            Some(LineKind::Command(command)) => {
                self.tree.execute(command, &mut *self.out)?;
                Ok(())
            }
        }
    }

    fn push_console(&mut self, line: &str) -> anyhow::Result<()> {
        self.continuation = self.console.push(line, &mut *self.out)?;
        Ok(())
    }

    fn execute_batch(&mut self, path: &str, depth: usize) -> anyhow::Result<()> {
        if depth > MAX_BATCH_DEPTH {
            return Err(ShellError::BatchNesting(path.to_string()).into());
        }
        writeln!(self.out, "Execute file: {path}")?;
        let text = fs::read_to_string(&*shellexpand::tilde(path)).map_err(|source| {
            ShellError::BatchFile {
                path: path.to_string(),
                source,
            }
        })?;
        log::info!("replaying {path} ({} lines)", text.lines().count());

        let interrupt = self.tree.interrupt();
        for line in text.lines() {
            if interrupt.is_raised() {
                return Err(ShellError::Interrupted.into());
            }
            writeln!(self.out, "file> {line}")?;
            self.dispatch(line, depth)?;
            if self.continuation {
                self.push_console("")?;
            }
        }
        Ok(())
    }

    /// Run `line` like the interactive loop does, reporting any error.
    ///
    /// Returns `false` once the shell should stop.
    pub fn process_line(&mut self, line: &str) -> anyhow::Result<bool> {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.execute_line(line)));
        let keep_running = match result {
            Ok(Ok(())) => true,
            Ok(Err(err)) => self.report(err)?,
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                log::error!("command panicked: {msg}");
                writeln!(self.out, "Unhandled panic: {msg}")?;
                true
            }
        };
        self.out.flush()?;
        Ok(keep_running)
    }

    fn report(&mut self, err: anyhow::Error) -> anyhow::Result<bool> {
        match err.downcast_ref::<ShellError>() {
            Some(ShellError::ExitRequested) => return Ok(false),
            Some(ShellError::Interrupted) => writeln!(self.out, "Aborted")?,
            Some(shell_err) => writeln!(self.out, "Error: {shell_err}")?,
            None => {
                log::error!("unhandled error: {err:?}");
                writeln!(self.out, "Unhandled error: {err:?}")?;
            }
        }
        Ok(true)
    }

    /// Wait for the outcome of a line read, answering completion requests
    /// in the meantime.
    fn next_event(&mut self) -> ReadEvent {
        loop {
            // The loop holds a sender itself, so the channel never closes.
            let Ok(event) = self.events.recv() else {
                return ReadEvent::Eof;
            };
            match event {
                ReadEvent::Complete(request) => {
                    let candidates = completion::complete_line(
                        &self.tree,
                        self.console.as_ref(),
                        self.console_mode.get() || self.continuation,
                        &request.buffer,
                        &request.fragment,
                    );
                    request.respond(candidates);
                }
                ReadEvent::Wake if !self.stop.load(Ordering::SeqCst) => {
                    log::debug!("ignoring wake-up left from an earlier exit request");
                }
                event => return event,
            }
        }
    }

    /// Read and dispatch lines until end of input, an exit request or an
    /// [`ExitHandle`] stops the loop. History is saved on the way out.
    ///
    /// The loop may be run again afterwards. A read still pending from the
    /// previous run is taken over instead of prompting twice.
    pub fn run(&mut self) -> anyhow::Result<()> {
        self.input.set_listening(true);
        let result = self.run_loop();
        self.input.set_listening(false);
        self.stop.store(false, Ordering::SeqCst);

        if let Some(path) = &self.settings.history_file {
            if let Err(err) = self.input.save_history(path) {
                log::warn!("{err:#}");
                writeln!(self.out, "Error: {err:#}")?;
            }
        }
        self.out.flush()?;
        result
    }

    fn run_loop(&mut self) -> anyhow::Result<()> {
        while !self.stop.load(Ordering::SeqCst) {
            self.tree.interrupt().clear();
            if !self.read_pending {
                let prompt = self.prompt().to_string();
                self.read_pending = true;
                self.input.request_line(&prompt, &self.sender);
            }

            let event = self.next_event();
            if !matches!(event, ReadEvent::Wake) {
                self.read_pending = false;
            }
            match event {
                ReadEvent::Line(line) => {
                    if !line.trim().is_empty() {
                        self.input.add_history(&line);
                    }
                    if !self.process_line(&line)? {
                        break;
                    }
                }
                ReadEvent::Eof => {
                    writeln!(self.out)?;
                    if !self.console_mode.get() {
                        break;
                    }
                    self.console_mode.set(false);
                    self.continuation = false;
                    self.console.reset();
                }
                ReadEvent::Interrupted { buffer_empty } => {
                    if self.continuation {
                        self.console.reset();
                        self.continuation = false;
                        writeln!(self.out)?;
                    } else if !buffer_empty {
                        writeln!(self.out)?;
                    } else {
                        writeln!(self.out, "\nInterrupt: use Ctrl-D to exit")?;
                    }
                }
                ReadEvent::Failed(msg) => {
                    log::error!("line editor failed: {msg}");
                    writeln!(self.out, "Error: {msg}")?;
                    break;
                }
                ReadEvent::Wake => {
                    writeln!(self.out)?;
                    break;
                }
                ReadEvent::Complete(_) => unreachable!("answered by next_event"),
            }
            self.out.flush()?;
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn register_shell_commands(
    tree: &mut CommandTree,
    console_mode: &Rc<Cell<bool>>,
    env: Rc<Environment>,
) -> Result<(), ShellError> {
    let mode = console_mode.clone();
    tree.add(
        CommandSpec::new("console", move |_| {
            mode.set(true);
            Ok(CommandStatus::Done)
        })
        .nargs(0),
    )?;
    tree.add(
        CommandSpec::new("shell", move |_| {
            external::run_shell(&env, None)?;
            Ok(CommandStatus::Done)
        })
        .nargs(0)
        .level(2),
    )?;
    for name in ["exit", "quit"] {
        tree.add(CommandSpec::new(name, |_| Err(ShellError::ExitRequested.into())).nargs(0))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{CompletionRequest, ScriptedInput};
    use crate::io_adapters::SharedBuffer;
    use std::cell::RefCell;

    fn repl(input: ScriptedInput) -> (Repl<ScriptedInput>, SharedBuffer) {
        let out = SharedBuffer::new();
        let repl = Repl::new(input, Settings::default(), Environment::default())
            .unwrap()
            .with_output(out.clone());
        (repl, out)
    }

    #[test]
    fn test_classify_by_prefix() {
        assert_eq!(classify(""), None);
        assert_eq!(classify("   "), None);
        assert_eq!(classify("  :x = 1"), Some(LineKind::Console("x = 1")));
        assert_eq!(classify("%ls -l"), Some(LineKind::Shell("ls -l")));
        assert_eq!(classify("%"), Some(LineKind::Shell("")));
        assert_eq!(classify("@ run.cmd"), Some(LineKind::Batch(" run.cmd")));
        assert_eq!(classify("  fit list"), Some(LineKind::Command("fit list")));
        assert_eq!(classify("fit :x"), Some(LineKind::Command("fit :x")));
    }

    #[test]
    fn test_console_statement_continues_over_lines() {
        let (mut repl, out) = repl(ScriptedInput::lines([":(1 +", "2)"]));
        repl.run().unwrap();
        assert_eq!(out.contents(), "3\n\n");
        assert_eq!(repl.input().prompts(), ["cmd> ", "... > ", "cmd> "]);
        assert!(!repl.is_continuation());
    }

    #[test]
    fn test_console_mode_until_end_of_input() {
        let input = ScriptedInput::lines(["console", "x = 2", "x * 3"])
            .then(ReadEvent::Eof)
            .then(ReadEvent::Line("exit".into()));
        let (mut repl, out) = repl(input);
        repl.run().unwrap();

        assert_eq!(out.contents(), "6\n\n");
        assert_eq!(
            repl.input().prompts(),
            ["cmd> ", "con> ", "con> ", "con> ", "cmd> "]
        );
        assert!(!repl.is_console_mode());
    }

    #[test]
    fn test_console_mode_ignores_prefixes() {
        let (mut repl, out) = repl(ScriptedInput::lines(["console", "exit"]));
        repl.run().unwrap();
        assert!(out.contents().starts_with("Error: name \"exit\" is not defined"));
    }

    #[test]
    fn test_interrupts_while_reading() {
        let input = ScriptedInput::new()
            .then(ReadEvent::Interrupted { buffer_empty: true })
            .then(ReadEvent::Interrupted { buffer_empty: false })
            .then(ReadEvent::Line(":(4".into()))
            .then(ReadEvent::Interrupted { buffer_empty: false })
            .then(ReadEvent::Line(":5".into()));
        let (mut repl, out) = repl(input);
        repl.run().unwrap();
        assert_eq!(
            out.contents(),
            "\nInterrupt: use Ctrl-D to exit\n\n\n5\n\n"
        );
    }

    #[test]
    fn test_dispatch_errors_are_contained() {
        let input = ScriptedInput::lines([
            "fail", "abort", "weird", "explode", "quit now", "nosuch", "quit",
        ])
        .then(ReadEvent::Line("never reached".into()));
        let (mut repl, out) = repl(input);
        let tree = repl.tree_mut();
        tree.add_command("fail", |_| Err(ShellError::command("boom").into()))
            .unwrap();
        tree.add_command("abort", |_| Err(ShellError::Interrupted.into()))
            .unwrap();
        tree.add_command("weird", |_| Err(anyhow::anyhow!("disk on fire")))
            .unwrap();
        tree.add_command("explode", |_| panic!("kaboom")).unwrap();
        repl.run().unwrap();

        let text = out.contents();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Error: boom");
        assert_eq!(lines[1], "Aborted");
        assert!(lines[2].starts_with("Unhandled error: disk on fire"));
        assert!(text.contains("Unhandled panic: kaboom\n"));
        assert!(text.contains("Error: wrong number of arguments to command (got 1)\n"));
        assert!(text.contains("Error: command not recognized: nosuch\n"));
        assert_eq!(repl.input().prompts().len(), 7);
    }

    #[test]
    fn test_batch_replay_echoes_and_closes_console_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("setup.cmd");
        fs::write(&path, "# setup\nrecord a b\n:z = 5 \\\n:z * 2\n").unwrap();

        let calls = Rc::new(RefCell::new(Vec::new()));
        let (mut repl, out) = repl(ScriptedInput::new());
        let seen = calls.clone();
        repl.tree_mut()
            .add_command("record", move |inv| {
                seen.borrow_mut().push(inv.args.clone());
                Ok(CommandStatus::Done)
            })
            .unwrap();

        repl.execute_line(&format!("@{}", path.display())).unwrap();
        assert_eq!(
            out.contents(),
            format!(
                "Execute file: {}\nfile> # setup\nfile> record a b\nfile> :z = 5 \\\nfile> :z * 2\n10\n",
                path.display()
            )
        );
        assert_eq!(*calls.borrow(), vec![vec!["a".to_string(), "b".to_string()]]);
        assert!(!repl.is_continuation());
    }

    #[test]
    fn test_batch_error_stops_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.cmd");
        fs::write(&path, "fail\n:1\n").unwrap();
        let (mut repl, out) = repl(ScriptedInput::new());
        repl.tree_mut()
            .add_command("fail", |_| Err(ShellError::command("boom").into()))
            .unwrap();

        assert!(repl.process_line(&format!("@{}", path.display())).unwrap());
        assert!(out.contents().ends_with("file> fail\nError: boom\n"));
    }

    #[test]
    fn test_missing_and_recursive_batch_files() {
        let dir = tempfile::tempdir().unwrap();
        let (mut repl, out) = repl(ScriptedInput::new());

        repl.process_line("@/no/such/file.cmd").unwrap();
        assert!(out.take().contains("Error: cannot read batch file /no/such/file.cmd"));

        let path = dir.path().join("loop.cmd");
        fs::write(&path, format!("@{}\n", path.display())).unwrap();
        repl.process_line(&format!("@{}", path.display())).unwrap();
        let text = out.take();
        assert_eq!(text.matches("Execute file:").count(), MAX_BATCH_DEPTH);
        assert!(text.ends_with(&format!(
            "Error: batch files nested too deeply at {}\n",
            path.display()
        )));
    }

    #[test]
    fn test_completion_is_answered_while_reading() {
        let (request, answer) = CompletionRequest::new("qu", "qu");
        let (console_request, console_answer) = CompletionRequest::new(":sq", "sq");
        let input = ScriptedInput::new()
            .then(ReadEvent::Complete(request))
            .then(ReadEvent::Complete(console_request))
            .then(ReadEvent::Eof);
        let (mut repl, _) = repl(input);
        repl.run().unwrap();
        assert_eq!(answer.recv().unwrap(), vec!["quit "]);
        assert_eq!(console_answer.recv().unwrap(), vec!["sqrt("]);
    }

    #[test]
    fn test_exit_handle_stops_blocked_loop() {
        let input = ScriptedInput::lines([":1"]).then_block();
        let (mut repl, out) = repl(input);
        repl.exit_handle().exit();
        repl.run().unwrap();
        assert_eq!(out.contents(), "");
        assert!(repl.input().prompts().is_empty());
    }

    #[test]
    fn test_run_again_after_exit() {
        let (mut repl, out) = repl(ScriptedInput::lines([":7", "quit"]));
        repl.exit_handle().exit();
        repl.run().unwrap();
        assert!(repl.input().prompts().is_empty());

        repl.run().unwrap();
        assert_eq!(out.contents(), "7\n");
        assert_eq!(repl.input().prompts().len(), 2);
    }

    #[test]
    fn test_next_run_takes_over_pending_read() {
        let (mut repl, out) = repl(ScriptedInput::lines([":1"]).then_block());
        let handle = repl.exit_handle();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            handle.exit();
        });
        repl.run().unwrap();
        stopper.join().unwrap();
        assert_eq!(out.take(), "1\n\n");
        assert_eq!(repl.input().prompts().len(), 2);

        // The editor finishes the line it was reading.
        repl.sender.send(ReadEvent::Line(":5".into())).unwrap();
        repl.run().unwrap();
        assert_eq!(out.contents(), "5\n\n");
        assert_eq!(repl.input().prompts().len(), 3);
    }

    #[test]
    fn test_history_goes_through_the_line_source() {
        let path = std::path::PathBuf::from("/tmp/shell-history");
        let settings = Settings {
            history_file: Some(path.clone()),
            ..Settings::default()
        };
        let input = ScriptedInput::lines([":1", "  ", ":1", "quit"]);
        let mut repl = Repl::new(input, settings, Environment::default())
            .unwrap()
            .with_output(SharedBuffer::new());
        assert_eq!(repl.input().loaded_history(), [path.clone()]);
        repl.run().unwrap();

        assert_eq!(repl.input().history(), [":1", ":1", "quit"]);
        assert_eq!(repl.input().saved_history(), [path]);
    }

    #[test]
    fn test_disabled_history_is_never_touched() {
        let (mut repl, _) = repl(ScriptedInput::lines(["quit"]));
        repl.run().unwrap();
        assert!(repl.input().loaded_history().is_empty());
        assert!(repl.input().saved_history().is_empty());
    }
}
