//! Where input lines come from.
//!
//! The REPL never blocks inside a line editor directly. It asks a
//! [`LineSource`] for a line and then waits on its own event channel, so a
//! line, an interrupt, end of input or a wake-up from another thread all
//! arrive the same way. Completion requests from the editor travel over the
//! same channel and are answered by the REPL thread, which is the only
//! thread that touches the command tree and the console.

use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::{DefaultHistory, History};
use rustyline::validate::Validator;
use rustyline::{
    Cmd, CompletionType, ConditionalEventHandler, Config, Context, Editor, Event, EventContext,
    EventHandler, Helper, KeyEvent, RepeatCount,
};
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often a pending completion checks whether anyone still answers.
const ANSWER_POLL: Duration = Duration::from_millis(50);

/// A completion request from the line editor.
#[derive(Debug)]
pub struct CompletionRequest {
    /// Edit buffer up to the cursor.
    pub buffer: String,
    /// The word being completed.
    pub fragment: String,
    reply: Sender<Vec<String>>,
}

impl CompletionRequest {
    pub fn new(
        buffer: impl Into<String>,
        fragment: impl Into<String>,
    ) -> (Self, Receiver<Vec<String>>) {
        let (reply, answer) = mpsc::channel();
        let request = Self {
            buffer: buffer.into(),
            fragment: fragment.into(),
            reply,
        };
        (request, answer)
    }

    pub fn respond(self, candidates: Vec<String>) {
        // The editor may have given up waiting; nothing to do then.
        let _ = self.reply.send(candidates);
    }
}

/// Everything the REPL can be woken up by.
#[derive(Debug)]
pub enum ReadEvent {
    Line(String),
    /// Ctrl-C while reading.
    Interrupted { buffer_empty: bool },
    Eof,
    Complete(CompletionRequest),
    /// The line editor failed and cannot deliver more input.
    Failed(String),
    /// Sent by [`crate::ExitHandle`]; does not end the pending read.
    Wake,
}

/// A supplier of input lines.
pub trait LineSource {
    /// Start reading one line shown with `prompt`.
    ///
    /// The outcome is delivered on `events`; completion requests may be sent
    /// before it.
    fn request_line(&mut self, prompt: &str, events: &Sender<ReadEvent>);

    /// Make `line` available for history recall.
    fn add_history(&mut self, _line: &str) {}

    /// Read history entries from `path`. A missing file is not an error.
    fn load_history(&mut self, _path: &Path) -> anyhow::Result<()> {
        Ok(())
    }

    /// Append the entries added since the last load or save to `path`.
    fn save_history(&mut self, _path: &Path) -> anyhow::Result<()> {
        Ok(())
    }

    /// Whether completion requests will be answered. While nobody listens
    /// they get no candidates instead of waiting.
    fn set_listening(&mut self, _listening: bool) {}
}

/// Word boundaries for completion: whitespace and `/`. A line prefix
/// (`:`, `%`, `@`) is not part of the first word.
pub fn fragment_start(buffer: &str) -> usize {
    let start = buffer
        .char_indices()
        .rev()
        .find(|&(_, c)| c.is_whitespace() || c == '/')
        .map_or(0, |(i, c)| i + c.len_utf8());
    let leading_prefix = buffer[..start].trim().is_empty()
        && buffer[start..].starts_with([':', '%', '@']);
    if leading_prefix { start + 1 } else { start }
}

/// Records whether the edit buffer was empty when Ctrl-C was pressed.
struct CtrlCHandler {
    buffer_empty: Arc<AtomicBool>,
}

impl ConditionalEventHandler for CtrlCHandler {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext,
    ) -> Option<Cmd> {
        self.buffer_empty
            .store(ctx.line().is_empty(), Ordering::SeqCst);
        Some(Cmd::Interrupt)
    }
}

/// Editor helper that forwards completion to the REPL thread.
struct LineHelper {
    events: Option<Sender<ReadEvent>>,
    listening: Arc<AtomicBool>,
}

impl Completer for LineHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let buffer = &line[..pos];
        let start = fragment_start(buffer);
        let Some(events) = &self.events else {
            return Ok((start, Vec::new()));
        };
        if !self.listening.load(Ordering::SeqCst) {
            return Ok((start, Vec::new()));
        }

        let (request, answer) = CompletionRequest::new(buffer, &buffer[start..]);
        if events.send(ReadEvent::Complete(request)).is_err() {
            return Ok((start, Vec::new()));
        }
        let candidates = loop {
            match answer.recv_timeout(ANSWER_POLL) {
                Ok(candidates) => break candidates,
                Err(RecvTimeoutError::Timeout) if self.listening.load(Ordering::SeqCst) => {}
                Err(_) => break Vec::new(),
            }
        };
        let candidates = candidates
            .into_iter()
            .map(|candidate| Pair {
                display: candidate.clone(),
                replacement: candidate,
            })
            .collect();
        Ok((start, candidates))
    }
}

impl Hinter for LineHelper {
    type Hint = String;
}

impl Highlighter for LineHelper {}

impl Validator for LineHelper {}

impl Helper for LineHelper {}

type HistoryReply = Sender<anyhow::Result<()>>;

enum EditorRequest {
    Read {
        prompt: String,
        events: Sender<ReadEvent>,
    },
    AddHistory(String),
    LoadHistory { path: PathBuf, reply: HistoryReply },
    SaveHistory { path: PathBuf, reply: HistoryReply },
}

/// Flags shared between [`EditorInput`] and its worker.
#[derive(Clone, Default)]
struct EditorState {
    /// Ctrl-C was pressed on an empty buffer.
    buffer_empty: Arc<AtomicBool>,
    /// A `readline` call is queued or running.
    reading: Arc<AtomicBool>,
    /// The REPL answers completion requests.
    listening: Arc<AtomicBool>,
}

/// Interactive line editing backed by rustyline.
///
/// The editor lives on its own thread; the REPL thread stays free to answer
/// completion requests and to be woken by [`crate::ExitHandle`]. History is
/// rustyline's file history, loaded and appended by the worker.
///
/// A read cannot be cancelled. Once the REPL stops listening a pending read
/// still owns the terminal until the user ends the line; completion then
/// offers nothing, and history requests sent meanwhile run after the read.
pub struct EditorInput {
    requests: Sender<EditorRequest>,
    state: EditorState,
    _worker: JoinHandle<()>,
}

impl EditorInput {
    pub fn new() -> anyhow::Result<Self> {
        let (requests, inbox) = mpsc::channel();
        let (ready, started) = mpsc::channel();
        let state = EditorState::default();
        let worker_state = state.clone();
        let worker = thread::Builder::new()
            .name("line-editor".into())
            .spawn(move || match build_editor(&worker_state) {
                Ok(editor) => {
                    let _ = ready.send(Ok(()));
                    editor_loop(editor, inbox, worker_state);
                }
                Err(err) => {
                    let _ = ready.send(Err(err));
                }
            })?;
        started.recv()??;
        Ok(Self {
            requests,
            state,
            _worker: worker,
        })
    }

    /// Hand a history request to the worker. The reply is awaited unless a
    /// read is in progress, in which case the worker reports errors itself.
    fn history_request(
        &self,
        request: impl FnOnce(HistoryReply) -> EditorRequest,
    ) -> anyhow::Result<()> {
        let (reply, answer) = mpsc::channel();
        self.requests
            .send(request(reply))
            .map_err(|_| anyhow::anyhow!("line editor has stopped"))?;
        if self.state.reading.load(Ordering::SeqCst) {
            log::debug!("history request queued behind a pending read");
            return Ok(());
        }
        answer
            .recv()
            .map_err(|_| anyhow::anyhow!("line editor has stopped"))?
    }
}

fn build_editor(state: &EditorState) -> Result<Editor<LineHelper, DefaultHistory>, ReadlineError> {
    let config = Config::builder()
        .completion_type(CompletionType::List)
        .auto_add_history(false)
        .history_ignore_dups(true)?
        .build();
    let mut editor: Editor<LineHelper, DefaultHistory> = Editor::with_config(config)?;
    editor.set_helper(Some(LineHelper {
        events: None,
        listening: state.listening.clone(),
    }));
    editor.bind_sequence(
        KeyEvent::ctrl('C'),
        EventHandler::Conditional(Box::new(CtrlCHandler {
            buffer_empty: state.buffer_empty.clone(),
        })),
    );
    Ok(editor)
}

fn load_history(editor: &mut Editor<LineHelper, DefaultHistory>, path: &Path) -> anyhow::Result<()> {
    match editor.load_history(path) {
        Ok(()) => {
            log::info!(
                "loaded {} history entries from {}",
                editor.history().len(),
                path.display()
            );
            Ok(())
        }
        Err(ReadlineError::Io(err)) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(anyhow::anyhow!(
            "cannot read history file {}: {err}",
            path.display()
        )),
    }
}

fn reply_or_log(reply: HistoryReply, result: anyhow::Result<()>) {
    if let Err(mpsc::SendError(Err(err))) = reply.send(result) {
        log::warn!("{err:#}");
    }
}

fn editor_loop(
    mut editor: Editor<LineHelper, DefaultHistory>,
    inbox: Receiver<EditorRequest>,
    state: EditorState,
) {
    for request in inbox {
        match request {
            EditorRequest::AddHistory(line) => {
                if let Err(err) = editor.add_history_entry(line) {
                    log::warn!("cannot record history entry: {err}");
                }
            }
            EditorRequest::LoadHistory { path, reply } => {
                let result = load_history(&mut editor, &path);
                reply_or_log(reply, result);
            }
            EditorRequest::SaveHistory { path, reply } => {
                let result = editor.append_history(&path).map_err(|err| {
                    anyhow::anyhow!("cannot write history file {}: {err}", path.display())
                });
                reply_or_log(reply, result);
            }
            EditorRequest::Read { prompt, events } => {
                if let Some(helper) = editor.helper_mut() {
                    helper.events = Some(events.clone());
                }
                state.buffer_empty.store(true, Ordering::SeqCst);
                let result = editor.readline(&prompt);
                state.reading.store(false, Ordering::SeqCst);
                let event = match result {
                    Ok(line) => ReadEvent::Line(line),
                    Err(ReadlineError::Interrupted) => ReadEvent::Interrupted {
                        buffer_empty: state.buffer_empty.load(Ordering::SeqCst),
                    },
                    Err(ReadlineError::Eof) => ReadEvent::Eof,
                    Err(err) => ReadEvent::Failed(err.to_string()),
                };
                if events.send(event).is_err() {
                    break;
                }
            }
        }
    }
    log::debug!("line editor stopped");
}

impl LineSource for EditorInput {
    fn request_line(&mut self, prompt: &str, events: &Sender<ReadEvent>) {
        let request = EditorRequest::Read {
            prompt: prompt.to_string(),
            events: events.clone(),
        };
        self.state.reading.store(true, Ordering::SeqCst);
        if self.requests.send(request).is_err() {
            self.state.reading.store(false, Ordering::SeqCst);
            let _ = events.send(ReadEvent::Failed("line editor has stopped".into()));
        }
    }

    fn add_history(&mut self, line: &str) {
        let _ = self.requests.send(EditorRequest::AddHistory(line.to_string()));
    }

    fn load_history(&mut self, path: &Path) -> anyhow::Result<()> {
        let path = path.to_path_buf();
        self.history_request(|reply| EditorRequest::LoadHistory { path, reply })
    }

    fn save_history(&mut self, path: &Path) -> anyhow::Result<()> {
        let path = path.to_path_buf();
        self.history_request(|reply| EditorRequest::SaveHistory { path, reply })
    }

    fn set_listening(&mut self, listening: bool) {
        self.state.listening.store(listening, Ordering::SeqCst);
    }
}

/// Replays a fixed sequence of events; used for automation and tests.
///
/// Each `request_line` call delivers queued events up to and including the
/// next one that ends a read. A `None` entry delivers nothing, leaving the
/// REPL blocked until something else wakes it. Once the script is used up
/// every read ends with [`ReadEvent::Eof`].
#[derive(Debug, Default)]
pub struct ScriptedInput {
    script: VecDeque<Option<ReadEvent>>,
    prompts: Vec<String>,
    history: Vec<String>,
    loaded: Vec<PathBuf>,
    saved: Vec<PathBuf>,
}

impl ScriptedInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script that types each of `lines` in turn.
    pub fn lines<I, L>(lines: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        let mut input = Self::new();
        for line in lines {
            input = input.then(ReadEvent::Line(line.into()));
        }
        input
    }

    pub fn then(mut self, event: ReadEvent) -> Self {
        self.script.push_back(Some(event));
        self
    }

    /// Stop delivering events at this point.
    pub fn then_block(mut self) -> Self {
        self.script.push_back(None);
        self
    }

    /// Prompts shown so far, in order.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    /// Lines offered for history recall.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// History files loaded so far.
    pub fn loaded_history(&self) -> &[PathBuf] {
        &self.loaded
    }

    /// History files saved so far.
    pub fn saved_history(&self) -> &[PathBuf] {
        &self.saved
    }
}

impl LineSource for ScriptedInput {
    fn request_line(&mut self, prompt: &str, events: &Sender<ReadEvent>) {
        self.prompts.push(prompt.to_string());
        loop {
            let event = match self.script.pop_front() {
                Some(Some(event)) => event,
                Some(None) => return,
                None => ReadEvent::Eof,
            };
            let ends_read = !matches!(event, ReadEvent::Complete(_));
            if events.send(event).is_err() || ends_read {
                return;
            }
        }
    }

    fn add_history(&mut self, line: &str) {
        self.history.push(line.to_string());
    }

    fn load_history(&mut self, path: &Path) -> anyhow::Result<()> {
        self.loaded.push(path.to_path_buf());
        Ok(())
    }

    fn save_history(&mut self, path: &Path) -> anyhow::Result<()> {
        self.saved.push(path.to_path_buf());
        Ok(())
    }
}
