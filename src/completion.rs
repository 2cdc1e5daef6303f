//! Line completion: file-name candidates and the bridge that decides which
//! completer is responsible for the current edit buffer.

use crate::console::Console;
use crate::repl::{LineKind, classify};
use crate::tree::CommandTree;
use std::fs;
use std::path::Path;

/// Split a partially typed path into its directory part and the name being
/// typed: `"data/run"` gives `("data", "run")`, `"run"` gives `("", "run")`.
pub fn split_dir(word: &str) -> (&str, &str) {
    match word.rfind('/') {
        Some(0) => ("/", &word[1..]),
        Some(i) => (&word[..i], &word[i + 1..]),
        None => ("", word),
    }
}

/// Names in `dir` starting with `text`, sorted.
///
/// Directories get a trailing `/`, files a trailing space; files are left out
/// when `dirs_only` is set. Names containing whitespace are skipped since they
/// can't be typed unquoted. An empty `dir` means the current directory and a
/// leading `~` is expanded. Unreadable directories give no candidates.
pub fn file_candidates(dir: &str, text: &str, dirs_only: bool) -> Vec<String> {
    let dir = if dir.is_empty() { "." } else { dir };
    let dir = shellexpand::tilde(dir);
    let entries = match fs::read_dir(Path::new(&*dir)) {
        Ok(entries) => entries,
        Err(err) => {
            log::debug!("no completion from {dir}: {err}");
            return Vec::new();
        }
    };

    let mut options: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            if !name.starts_with(text) || name.contains(char::is_whitespace) {
                return None;
            }
            if entry.path().is_dir() {
                Some(format!("{name}/"))
            } else if dirs_only {
                None
            } else {
                Some(format!("{name} "))
            }
        })
        .collect();
    options.sort();
    options
}

/// Completion candidates for the whole input line.
///
/// `buffer` is the edit buffer up to the cursor and `fragment` the word being
/// completed. While the console is active every line is console input;
/// otherwise the line prefix picks the completer. Shell lines get none.
pub fn complete_line(
    tree: &CommandTree,
    console: &dyn Console,
    console_active: bool,
    buffer: &str,
    fragment: &str,
) -> Vec<String> {
    if console_active {
        return console.complete(fragment);
    }
    match classify(buffer) {
        None => tree.complete_options("", fragment),
        Some(LineKind::Command(line)) => tree.complete_options(line, fragment),
        Some(LineKind::Console(_)) => console.complete(fragment),
        Some(LineKind::Batch(path)) => {
            let (dir, _) = split_dir(path.trim_start());
            file_candidates(dir, fragment, false)
        }
        Some(LineKind::Shell(_)) => Vec::new(),
    }
}
