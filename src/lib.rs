//! An interactive command shell built around a tree of abbreviable commands.
//!
//! Applications register commands under space-separated paths such as
//! `"spectrum show"`; users may type any unambiguous prefix of each segment
//! (`"sp sh"`). Besides structured commands the shell understands three
//! line prefixes: `:` sends the line to an embedded console, `%` runs it
//! with the user's shell and `@` replays a batch file.
//!
//! The main entry points are [`CommandTree`] for registration and dispatch
//! and [`Repl`] for the interactive loop. Interactive input comes from
//! [`EditorInput`]; [`ScriptedInput`] drives the loop without a terminal.
//!
//! ```
//! use command_shell::{CommandSpec, CommandStatus, CommandTree};
//!
//! let mut tree = CommandTree::new();
//! tree.add(CommandSpec::new("db lookup", |inv| {
//!     assert_eq!(inv.args, ["123"]);
//!     Ok(CommandStatus::Done)
//! }).minargs(1)).unwrap();
//! tree.execute("db loo 123", &mut std::io::sink()).unwrap();
//! ```

pub mod builtin;
pub mod command;
pub mod completion;
pub mod config;
pub mod console;
pub mod env;
pub mod error;
pub mod external;
pub mod input;
mod io_adapters;
pub mod lexer;
pub mod options;
pub mod repl;
pub mod tree;

pub use builtin::register_builtins;
pub use command::{CommandResult, CommandSpec, CommandStatus, Interrupt, Invocation};
pub use config::Settings;
pub use console::{Calculator, Console};
pub use env::Environment;
pub use error::ShellError;
pub use input::{EditorInput, LineSource, ReadEvent, ScriptedInput};
pub use io_adapters::SharedBuffer;
pub use lexer::split_into_words;
pub use options::{ArghParser, Positionals};
pub use repl::{ExitHandle, Repl};
pub use tree::{CommandTree, Outcome};
