//! Lexical analysis of command lines.
//!
//! A line is split into words at unquoted whitespace. A double quote opens a
//! region in which whitespace is part of the word; an unquoted `#` ends the
//! line and everything after it is ignored. Outside quotes a backslash makes
//! the next character literal; inside quotes it only escapes `"` and `\`.

/// The only quoting character recognised by the shell.
pub const QUOTE: char = '"';

/// Starts a comment that runs to the end of the line.
pub const COMMENT: char = '#';

/// Makes the following character literal.
pub const ESCAPE: char = '\\';

/// Errors that can occur during the lexical analysis process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexingError {
    /// A closing quote was not found.
    UnfinishedQuote,
    /// The line ended right after an escape character.
    UnfinishedEscape,
}

impl From<LexingError> for crate::error::ShellError {
    fn from(err: LexingError) -> Self {
        match err {
            LexingError::UnfinishedQuote | LexingError::UnfinishedEscape => {
                crate::error::ShellError::MalformedQuoting
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingQuote,
    Escaped,
    EscapedInQuote,
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    buffer: String,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Start,
            buffer: String::new(),
        }
    }

    fn make_words(&mut self) -> Result<Vec<String>, LexingError> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            let keep_going = match self.state {
                LexingState::Start => self.handle_start(ch),
                LexingState::ReadingWord => self.handle_word(ch, &mut out),
                LexingState::ReadingQuote => self.handle_quote(ch),
                LexingState::Escaped => self.handle_escaped(ch),
                LexingState::EscapedInQuote => self.handle_escaped_in_quote(ch),
            };
            if !keep_going {
                break;
            }
        }

        match self.state {
            LexingState::ReadingQuote | LexingState::EscapedInQuote => {
                return Err(LexingError::UnfinishedQuote);
            }
            LexingState::Escaped => return Err(LexingError::UnfinishedEscape),
            LexingState::ReadingWord => out.push(std::mem::take(&mut self.buffer)),
            LexingState::Start => {}
        }

        Ok(out)
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    /// Returns false when the rest of the line is a comment.
    fn handle_start(&mut self, ch: char) -> bool {
        match ch {
            c if c.is_whitespace() => {}
            COMMENT => return false,
            QUOTE => self.state = LexingState::ReadingQuote,
            ESCAPE => self.state = LexingState::Escaped,
            c => {
                self.buffer.push(c);
                self.state = LexingState::ReadingWord;
            }
        }
        true
    }

    fn handle_word(&mut self, ch: char, out: &mut Vec<String>) -> bool {
        match ch {
            c if c.is_whitespace() => {
                out.push(std::mem::take(&mut self.buffer));
                self.state = LexingState::Start;
            }
            COMMENT => {
                out.push(std::mem::take(&mut self.buffer));
                self.state = LexingState::Start;
                return false;
            }
            QUOTE => self.state = LexingState::ReadingQuote,
            ESCAPE => self.state = LexingState::Escaped,
            c => self.buffer.push(c),
        }
        true
    }

    fn handle_quote(&mut self, ch: char) -> bool {
        match ch {
            // The word continues after the closing quote: `a"b c"d` is one word.
            QUOTE => self.state = LexingState::ReadingWord,
            ESCAPE => self.state = LexingState::EscapedInQuote,
            c => self.buffer.push(c),
        }
        true
    }

    fn handle_escaped(&mut self, ch: char) -> bool {
        self.buffer.push(ch);
        self.state = LexingState::ReadingWord;
        true
    }

    fn handle_escaped_in_quote(&mut self, ch: char) -> bool {
        if ch != QUOTE && ch != ESCAPE {
            self.buffer.push(ESCAPE);
        }
        self.buffer.push(ch);
        self.state = LexingState::ReadingQuote;
        true
    }
}

/// Splits `line` into words.
///
/// # Returns
/// The words in order, with quotes removed; `""` yields an empty word.
/// Fails with [`LexingError::UnfinishedQuote`] if a quote is left open and
/// with [`LexingError::UnfinishedEscape`] on a trailing backslash.
pub fn split_into_words(line: &str) -> Result<Vec<String>, LexingError> {
    LexingFSM::new(line).make_words()
}
