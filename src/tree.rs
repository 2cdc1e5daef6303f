//! The command tree: registration, abbreviation-aware lookup, dispatch,
//! removal and completion of command names.
//!
//! Nodes live in an arena; parents own the indices of their children in
//! insertion order and each child keeps the index of its parent, so the
//! tree can be walked in both directions without reference cycles.

use crate::command::{
    ArgCompletion, CommandOptions, CommandSpec, CommandStatus, Handler, Interrupt, Invocation,
};
use crate::completion;
use crate::error::ShellError;
use crate::lexer;
use generational_arena::{Arena, Index};
use std::io::Write;

/// Level given to registrations that don't ask for one.
pub const DEFAULT_LEVEL: u32 = 1;

/// Handle to a node of a [`CommandTree`].
pub type NodeId = Index;

/// One segment of a command path.
pub struct CommandNode {
    title: String,
    level: u32,
    handler: Option<Handler>,
    options: CommandOptions,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl CommandNode {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    /// Pure namespace nodes have no handler.
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    pub fn options(&self) -> &CommandOptions {
        &self.options
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// What [`CommandTree::execute`] did with a line.
#[derive(Debug)]
pub enum Outcome {
    /// The line was blank or only a comment.
    Empty,
    /// The handler ran to completion.
    Completed,
    /// Usage text was printed at the handler's request.
    UsageShown,
    /// The option parser stopped on request (e.g. help output).
    Aborted,
    /// The line was rejected; the error has already been reported.
    Rejected(ShellError),
}

/// All commands understood by the shell.
pub struct CommandTree {
    arena: Arena<CommandNode>,
    root: NodeId,
    default_level: u32,
    interrupt: Interrupt,
}

impl Default for CommandTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandTree {
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.insert(CommandNode {
            title: String::new(),
            level: 0,
            handler: None,
            options: CommandOptions::default(),
            parent: None,
            children: Vec::new(),
        });
        Self {
            arena,
            root,
            default_level: DEFAULT_LEVEL,
            interrupt: Interrupt::default(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Look at a node. Panics if `id` was removed from this tree.
    pub fn node(&self, id: NodeId) -> &CommandNode {
        &self.arena[id]
    }

    pub fn set_default_level(&mut self, level: u32) {
        self.default_level = level;
    }

    /// Interrupt flag handed to every invoked handler.
    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }

    /// Titles from the root down to `id`, joined by spaces.
    pub fn full_title(&self, id: NodeId) -> String {
        let mut titles = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &self.arena[node_id];
            if node.parent.is_some() {
                titles.push(node.title.as_str());
            }
            current = node.parent;
        }
        titles.reverse();
        titles.join(" ")
    }

    fn insert_child(&mut self, parent: NodeId, title: &str, level: u32) -> NodeId {
        let id = self.arena.insert(CommandNode {
            title: title.to_string(),
            level,
            handler: None,
            options: CommandOptions::default(),
            parent: Some(parent),
            children: Vec::new(),
        });
        self.arena[parent].children.push(id);
        id
    }

    fn exact_child(&self, parent: NodeId, title: &str) -> Option<NodeId> {
        self.arena[parent]
            .children
            .iter()
            .copied()
            .find(|&child| self.arena[child].title == title)
    }

    /// Register a command.
    ///
    /// Intermediate path segments are created on demand; an existing
    /// intermediate node takes the new level if it is lower than its own.
    pub fn add(&mut self, spec: CommandSpec) -> Result<NodeId, ShellError> {
        let segments: Vec<&str> = spec.path.split_whitespace().collect();
        let Some((last, intermediate)) = segments.split_last() else {
            return Err(ShellError::InvalidPath(spec.path.clone()));
        };
        spec.options.validate(&spec.path)?;
        let level = spec.level.unwrap_or(self.default_level);

        let mut node = self.root;
        for segment in intermediate {
            node = match self.exact_child(node, segment) {
                Some(existing) => {
                    let existing_node = &mut self.arena[existing];
                    existing_node.level = existing_node.level.min(level);
                    existing
                }
                None => self.insert_child(node, segment, level),
            };
        }

        let terminal = match self.exact_child(node, last) {
            Some(_) if !spec.overwrite => {
                return Err(ShellError::DuplicateCommand(segments.join(" ")));
            }
            Some(existing) => {
                let lowest_child = self.arena[existing]
                    .children
                    .iter()
                    .map(|&child| self.arena[child].level)
                    .min();
                self.arena[existing].level = lowest_child.map_or(level, |lowest| lowest.min(level));
                existing
            }
            None => self.insert_child(node, last, level),
        };
        let terminal_node = &mut self.arena[terminal];
        terminal_node.handler = Some(spec.handler);
        terminal_node.options = spec.options;

        log::debug!("registered command {:?} at level {}", segments.join(" "), level);
        Ok(terminal)
    }

    /// Shorthand for [`CommandTree::add`] with default level and options.
    pub fn add_command<F>(&mut self, path: &str, handler: F) -> Result<NodeId, ShellError>
    where
        F: Fn(&mut Invocation<'_>) -> crate::command::CommandResult + 'static,
    {
        self.add(CommandSpec::new(path, handler))
    }

    /// Find the child of `parent` that `segment` abbreviates.
    ///
    /// An exact title wins outright. Otherwise, among the children whose
    /// title starts with `segment`, a single match is taken; with
    /// `use_levels` the unique match of lowest level is taken. Returns
    /// `Ok(None)` when nothing matches.
    pub fn find_child(
        &self,
        parent: NodeId,
        segment: &str,
        use_levels: bool,
    ) -> Result<Option<NodeId>, ShellError> {
        if let Some(exact) = self.exact_child(parent, segment) {
            return Ok(Some(exact));
        }
        let matches: Vec<NodeId> = self.arena[parent]
            .children
            .iter()
            .copied()
            .filter(|&child| self.arena[child].title.starts_with(segment))
            .collect();

        match matches.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(*only)),
            _ if use_levels => {
                let lowest = matches
                    .iter()
                    .map(|&child| self.arena[child].level)
                    .min()
                    .unwrap_or_default();
                let mut best = matches
                    .iter()
                    .copied()
                    .filter(|&child| self.arena[child].level == lowest);
                match (best.next(), best.next()) {
                    (Some(winner), None) => Ok(Some(winner)),
                    _ => Err(ShellError::AmbiguousCommand(segment.to_string())),
                }
            }
            _ => Err(ShellError::AmbiguousCommand(segment.to_string())),
        }
    }

    /// Walk down from the root as far as `path` allows.
    ///
    /// Returns the deepest node reached and the unconsumed rest of the path,
    /// which callers treat as positional arguments.
    pub fn find_node<'p, S: AsRef<str>>(
        &self,
        path: &'p [S],
        use_levels: bool,
    ) -> Result<(NodeId, &'p [S]), ShellError> {
        let mut node = self.root;
        let mut consumed = 0;
        for segment in path {
            match self.find_child(node, segment.as_ref(), use_levels)? {
                Some(child) => {
                    node = child;
                    consumed += 1;
                }
                None => break,
            }
        }
        Ok((node, &path[consumed..]))
    }

    /// The unique child with the strictly lowest level.
    pub fn primary_child(&self, id: NodeId) -> Option<NodeId> {
        let mut best: Option<NodeId> = None;
        let mut tied = false;
        for &child in &self.arena[id].children {
            let level = self.arena[child].level;
            match best {
                Some(current) if level > self.arena[current].level => {}
                Some(current) if level == self.arena[current].level => tied = true,
                _ => {
                    best = Some(child);
                    tied = false;
                }
            }
        }
        if tied { None } else { best }
    }

    fn write_usage(&self, id: NodeId, out: &mut dyn Write) -> anyhow::Result<()> {
        let title = self.full_title(id);
        if let Some(usage) = self.arena[id].options.usage_text(&title) {
            writeln!(out, "{usage}")?;
        }
        Ok(())
    }

    fn reject(
        &self,
        err: ShellError,
        usage_of: Option<NodeId>,
        out: &mut dyn Write,
    ) -> anyhow::Result<Outcome> {
        log::debug!("rejected command line: {err}");
        writeln!(out, "Error: {err}")?;
        if let Some(id) = usage_of {
            self.write_usage(id, out)?;
        }
        Ok(Outcome::Rejected(err))
    }

    /// Parse and run one command line.
    ///
    /// Failures local to the line are reported to `out` and returned as
    /// [`Outcome::Rejected`]. Errors returned by the handler itself are
    /// passed through to the caller.
    pub fn execute(&self, line: &str, out: &mut dyn Write) -> anyhow::Result<Outcome> {
        let words = match lexer::split_into_words(line) {
            Ok(words) => words,
            Err(err) => return self.reject(err.into(), None, out),
        };
        if words.is_empty() {
            return Ok(Outcome::Empty);
        }

        let (mut node, rest) = match self.find_node(&words, true) {
            Ok(found) => found,
            Err(err) => return self.reject(err, None, out),
        };
        let mut args = rest.to_vec();

        while !self.arena[node].has_handler() {
            match self.primary_child(node) {
                Some(child) => node = child,
                None => {
                    return self.reject(ShellError::UnknownCommand(words.join(" ")), None, out);
                }
            }
        }

        let command = &self.arena[node];
        let title = self.full_title(node);
        let mut options = None;
        if let Some(parser) = &command.options.parser {
            match parser.parse(&title, &args) {
                Ok(parsed) => {
                    args = parsed.args;
                    options = Some(parsed.options);
                }
                Err(ShellError::ParseAbort(msg)) => {
                    if !msg.is_empty() {
                        writeln!(out, "{msg}")?;
                    }
                    return Ok(Outcome::Aborted);
                }
                Err(err) => return self.reject(err, Some(node), out),
            }
        }
        if !command.options.accepts(args.len()) {
            return self.reject(ShellError::ArityError { got: args.len() }, Some(node), out);
        }

        let handler = match &command.handler {
            Some(handler) => handler.clone(),
            None => return self.reject(ShellError::UnknownCommand(title), None, out),
        };
        log::debug!("dispatching {title:?} with {args:?}");
        let status = {
            let mut invocation = Invocation::new(args, options, out, self.interrupt.clone());
            handler(&mut invocation)?
        };
        match status {
            CommandStatus::Done => Ok(Outcome::Completed),
            CommandStatus::ShowUsage => {
                self.write_usage(node, out)?;
                Ok(Outcome::UsageShown)
            }
        }
    }

    /// Remove the command named exactly by `path`; abbreviations are not
    /// accepted.
    ///
    /// Ancestors left without children are pruned up to the root. A command
    /// that still has subcommands only loses its handler.
    pub fn remove_command(&mut self, path: &str) -> Result<(), ShellError> {
        let invalid = || ShellError::InvalidRemoval(path.to_string());
        let mut node = self.root;
        for segment in path.split_whitespace() {
            node = self.exact_child(node, segment).ok_or_else(invalid)?;
        }
        if !self.arena[node].has_handler() {
            return Err(invalid());
        }

        let target = &mut self.arena[node];
        target.handler = None;
        target.options = CommandOptions::default();

        let mut current = node;
        while let Some(parent) = self.arena[current].parent {
            let candidate = &self.arena[current];
            if !candidate.children.is_empty() || candidate.has_handler() {
                break;
            }
            self.arena[parent].children.retain(|&child| child != current);
            self.arena.remove(current);
            current = parent;
        }
        log::debug!("removed command {path:?}");
        Ok(())
    }

    /// Completion candidates for the command line `buffer`, whose last
    /// word-in-progress is `fragment`.
    pub fn complete_options(&self, buffer: &str, fragment: &str) -> Vec<String> {
        let Ok(mut path) = lexer::split_into_words(buffer) else {
            return Vec::new();
        };

        let mut last_word = String::new();
        let completing_new_word = buffer.is_empty() || buffer.ends_with(char::is_whitespace);
        if !completing_new_word {
            last_word = path.pop().unwrap_or_default();
        }

        let Ok((node, args)) = self.find_node(&path, true) else {
            return Vec::new();
        };
        let node = &self.arena[node];

        if args.is_empty() && !node.children.is_empty() {
            return node
                .children
                .iter()
                .map(|&child| &self.arena[child].title)
                .filter(|title| title.starts_with(fragment))
                .map(|title| format!("{title} "))
                .collect();
        }
        if let Some(completer) = &node.options.completer {
            return completer(fragment, args);
        }
        match node.options.args {
            ArgCompletion::None => Vec::new(),
            mode => {
                let (dir, base) = completion::split_dir(&last_word);
                completion::file_candidates(dir, base, mode == ArgCompletion::Directories)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Calls = Rc<RefCell<Vec<Vec<String>>>>;

    fn recorder(
        calls: &Calls,
    ) -> impl use<> + Fn(&mut Invocation<'_>) -> crate::command::CommandResult {
        let calls = calls.clone();
        move |inv| {
            calls.borrow_mut().push(inv.args.clone());
            Ok(CommandStatus::Done)
        }
    }

    fn noop(_: &mut Invocation<'_>) -> crate::command::CommandResult {
        Ok(CommandStatus::Done)
    }

    fn words(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    fn run(tree: &CommandTree, line: &str) -> (Outcome, String) {
        let mut out = Vec::new();
        let outcome = tree.execute(line, &mut out).unwrap();
        (outcome, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_registered_path_resolves_to_itself() {
        let mut tree = CommandTree::new();
        let list = tree.add_command("fit list", noop).unwrap();
        let listall = tree.add_command("fit listall", noop).unwrap();
        let deep = tree.add_command("spectrum calibration position set", noop).unwrap();

        for (path, id) in [
            ("fit list", list),
            ("fit listall", listall),
            ("spectrum calibration position set", deep),
        ] {
            let segments = words(path);
            let (node, rest) = tree.find_node(&segments, true).unwrap();
            assert_eq!(node, id, "{path}");
            assert!(rest.is_empty());
            assert_eq!(tree.full_title(node), path);
        }
    }

    #[test]
    fn test_abbreviation_with_equal_levels() {
        let mut tree = CommandTree::new();
        let list = tree.add(CommandSpec::new("list", noop)).unwrap();
        tree.add(CommandSpec::new("lookup", noop)).unwrap();

        assert!(matches!(
            tree.find_node(&["l"], true),
            Err(ShellError::AmbiguousCommand(_))
        ));
        assert_eq!(tree.find_node(&["lis"], true).unwrap().0, list);
        assert_eq!(tree.find_node(&["li"], true).unwrap().0, list);
    }

    #[test]
    fn test_lower_level_wins_shared_prefix() {
        let mut tree = CommandTree::new();
        let list = tree.add(CommandSpec::new("list", noop).level(1)).unwrap();
        tree.add(CommandSpec::new("lookup", noop).level(2)).unwrap();
        tree.add(CommandSpec::new("load", noop).level(2)).unwrap();

        assert_eq!(tree.find_node(&["l"], true).unwrap().0, list);
        assert!(tree.find_node(&["l"], false).is_err());
        assert!(matches!(
            tree.find_node(&["lo"], true),
            Err(ShellError::AmbiguousCommand(_))
        ));
    }

    #[test]
    fn test_unmatched_segments_are_returned_as_arguments() {
        let mut tree = CommandTree::new();
        let lookup = tree.add_command("db lookup", noop).unwrap();
        let path = words("db loo 123 456");
        let (node, rest) = tree.find_node(&path, true).unwrap();
        assert_eq!(node, lookup);
        assert_eq!(rest, &["123".to_string(), "456".to_string()]);
    }

    #[test]
    fn test_intermediate_node_takes_lowest_level() {
        let mut tree = CommandTree::new();
        tree.add(CommandSpec::new("fit execute", noop).level(3)).unwrap();
        tree.add(CommandSpec::new("fit list", noop).level(1)).unwrap();
        let (fit, _) = tree.find_node(&["fit"], true).unwrap();
        assert_eq!(tree.node(fit).level(), 1);
        assert!(!tree.node(fit).has_handler());
    }

    #[test]
    fn test_duplicate_registration() {
        let calls: Calls = Default::default();
        let mut tree = CommandTree::new();
        tree.add_command("fit list", noop).unwrap();
        assert!(matches!(
            tree.add_command("fit list", noop),
            Err(ShellError::DuplicateCommand(path)) if path == "fit list"
        ));

        tree.add(CommandSpec::new("fit list", recorder(&calls)).nargs(1).overwrite(true))
            .unwrap();
        let (outcome, _) = run(&tree, "fit list 7");
        assert!(matches!(outcome, Outcome::Completed));
        assert_eq!(*calls.borrow(), vec![vec!["7".to_string()]]);
        assert_eq!(tree.node(tree.root()).children().len(), 1);
    }

    #[test]
    fn test_empty_path_is_rejected() {
        let mut tree = CommandTree::new();
        assert!(matches!(
            tree.add_command("   ", noop),
            Err(ShellError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_abbreviated_dispatch_passes_arguments() {
        let calls: Calls = Default::default();
        let mut tree = CommandTree::new();
        tree.add(CommandSpec::new("db lookup", recorder(&calls)).minargs(1))
            .unwrap();

        let (outcome, _) = run(&tree, "db loo 123");
        assert!(matches!(outcome, Outcome::Completed));
        assert_eq!(*calls.borrow(), vec![vec!["123".to_string()]]);
    }

    #[test]
    fn test_blank_and_comment_lines_do_nothing() {
        let tree = CommandTree::new();
        assert!(matches!(run(&tree, "   ").0, Outcome::Empty));
        assert!(matches!(run(&tree, "# note").0, Outcome::Empty));
    }

    #[test]
    fn test_malformed_quoting_is_reported() {
        let mut tree = CommandTree::new();
        tree.add_command("echo", noop).unwrap();
        let (outcome, text) = run(&tree, "echo \"open");
        assert!(matches!(outcome, Outcome::Rejected(ShellError::MalformedQuoting)));
        assert!(text.contains("quotation"));
    }

    #[test]
    fn test_namespace_descends_to_primary_child() {
        let calls: Calls = Default::default();
        let mut tree = CommandTree::new();
        tree.add(CommandSpec::new("spectrum list", recorder(&calls)).level(1))
            .unwrap();
        tree.add(CommandSpec::new("spectrum delete", noop).level(2))
            .unwrap();

        let (outcome, _) = run(&tree, "spec");
        assert!(matches!(outcome, Outcome::Completed));
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn test_namespace_with_tied_children_is_unknown() {
        let mut tree = CommandTree::new();
        tree.add_command("fit list", noop).unwrap();
        tree.add_command("fit delete", noop).unwrap();
        tree.add_command("exit", noop).unwrap();
        let (outcome, text) = run(&tree, "fit");
        assert!(matches!(outcome, Outcome::Rejected(ShellError::UnknownCommand(_))));
        assert!(text.starts_with("Error: "));
    }

    #[test]
    fn test_arity_violation_prints_usage() {
        let calls: Calls = Default::default();
        let mut tree = CommandTree::new();
        tree.add(
            CommandSpec::new("cal pos", recorder(&calls))
                .minargs(1)
                .maxargs(2)
                .usage("%prog <a> [b]"),
        )
        .unwrap();

        let (outcome, text) = run(&tree, "cal pos");
        assert!(matches!(outcome, Outcome::Rejected(ShellError::ArityError { got: 0 })));
        assert!(text.contains("usage: cal pos <a> [b]"));
        assert!(matches!(run(&tree, "cal pos 1 2 3").0, Outcome::Rejected(_)));
        assert!(matches!(run(&tree, "cal pos 1").0, Outcome::Completed));
        assert!(matches!(run(&tree, "cal pos 1 2").0, Outcome::Completed));
        assert_eq!(calls.borrow().len(), 2);
    }

    #[test]
    fn test_show_usage_is_not_an_error() {
        let mut tree = CommandTree::new();
        tree.add(
            CommandSpec::new("fit", |_| Ok(CommandStatus::ShowUsage)).usage("%prog [id]"),
        )
        .unwrap();
        let (outcome, text) = run(&tree, "fit");
        assert!(matches!(outcome, Outcome::UsageShown));
        assert_eq!(text, "usage: fit [id]\n");
    }

    #[test]
    fn test_handler_error_is_passed_through() {
        let mut tree = CommandTree::new();
        tree.add_command("fail", |_| Err(ShellError::command("no spectrum").into()))
            .unwrap();
        let mut out = Vec::new();
        let err = tree.execute("fail", &mut out).unwrap_err();
        assert!(matches!(err.downcast_ref::<ShellError>(), Some(ShellError::Command(_))));
    }

    #[test]
    fn test_remove_prunes_empty_ancestors() {
        let mut tree = CommandTree::new();
        tree.add_command("a b c", noop).unwrap();
        tree.remove_command("a b c").unwrap();
        assert!(tree.node(tree.root()).children().is_empty());
        assert!(tree.find_node(&["a"], true).unwrap().1.len() == 1);
    }

    #[test]
    fn test_remove_keeps_populated_ancestors() {
        let mut tree = CommandTree::new();
        tree.add_command("a b c", noop).unwrap();
        let sibling = tree.add_command("a x", noop).unwrap();
        tree.remove_command("a b c").unwrap();
        let (a, _) = tree.find_node(&["a"], true).unwrap();
        assert_eq!(tree.node(a).children(), &[sibling]);
    }

    #[test]
    fn test_remove_requires_exact_command() {
        let mut tree = CommandTree::new();
        tree.add_command("fit list", noop).unwrap();
        tree.add_command("fit delete", noop).unwrap();
        assert!(matches!(tree.remove_command("fit"), Err(ShellError::InvalidRemoval(_))));
        assert!(tree.remove_command("fit list extra").is_err());
        assert!(tree.remove_command("nothing").is_err());
        tree.remove_command("fit list").unwrap();
    }

    #[test]
    fn test_remove_does_not_accept_abbreviations() {
        let mut tree = CommandTree::new();
        tree.add_command("fit list", noop).unwrap();
        assert!(matches!(tree.remove_command("fi li"), Err(ShellError::InvalidRemoval(_))));
        assert!(tree.remove_command("fit li").is_err());
        tree.remove_command("fit list").unwrap();
    }

    #[test]
    fn test_overwrite_keeps_level_of_lower_subcommands() {
        let mut tree = CommandTree::new();
        tree.add(CommandSpec::new("db lookup", noop).level(1)).unwrap();
        let db = tree
            .add(CommandSpec::new("db", noop).level(2).overwrite(true))
            .unwrap();
        assert_eq!(tree.node(db).level(), 1);

        tree.add(CommandSpec::new("db", noop).level(0).overwrite(true))
            .unwrap();
        assert_eq!(tree.node(db).level(), 0);
    }

    #[test]
    fn test_remove_command_with_subcommands_keeps_them() {
        let mut tree = CommandTree::new();
        tree.add_command("db", noop).unwrap();
        let lookup = tree.add_command("db lookup", noop).unwrap();
        tree.add_command("db", noop).unwrap_err();
        tree.remove_command("db").unwrap();
        let (db, _) = tree.find_node(&["db"], true).unwrap();
        assert!(!tree.node(db).has_handler());
        assert_eq!(tree.node(db).children(), &[lookup]);
    }

    #[test]
    fn test_complete_top_level_lists_every_title() {
        let mut tree = CommandTree::new();
        tree.add_command("fit list", noop).unwrap();
        tree.add_command("spectrum show", noop).unwrap();
        tree.add_command("exit", noop).unwrap();
        assert_eq!(
            tree.complete_options("", ""),
            vec!["fit ", "spectrum ", "exit "]
        );
    }

    #[test]
    fn test_complete_child_fragment() {
        let mut tree = CommandTree::new();
        tree.add_command("fit list", noop).unwrap();
        tree.add_command("fit lookup", noop).unwrap();
        tree.add_command("fit delete", noop).unwrap();
        assert_eq!(tree.complete_options("fit l", "l"), vec!["list ", "lookup "]);
        assert_eq!(tree.complete_options("fi", "fi"), vec!["fit "]);
        assert_eq!(tree.complete_options("f ", ""), vec!["list ", "lookup ", "delete "]);
    }

    #[test]
    fn test_complete_uses_custom_completer() {
        let mut tree = CommandTree::new();
        tree.add(
            CommandSpec::new("db lookup", noop).completer(|fragment, args| {
                ["energy", "element"]
                    .iter()
                    .filter(|c| c.starts_with(fragment))
                    .map(|c| format!("{c}{}", args.len()))
                    .collect()
            }),
        )
        .unwrap();
        assert_eq!(tree.complete_options("db lookup x e", "e"), vec!["energy1", "element1"]);
    }

    #[test]
    fn test_complete_gives_up_on_ambiguity_and_bad_quotes() {
        let mut tree = CommandTree::new();
        tree.add_command("list", noop).unwrap();
        tree.add_command("lookup", noop).unwrap();
        assert!(tree.complete_options("l ", "").is_empty());
        assert!(tree.complete_options("list \"a", "a").is_empty());
        assert!(tree.complete_options("list x ", "").is_empty());
    }

    #[test]
    fn test_complete_files_for_file_args() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("run1.spc"), "").unwrap();
        std::fs::create_dir(dir.path().join("runs")).unwrap();

        let mut tree = CommandTree::new();
        tree.add(CommandSpec::new("spectrum get", noop).file_args())
            .unwrap();
        tree.add(CommandSpec::new("cd", noop).dir_args()).unwrap();

        let base = dir.path().to_string_lossy().to_string();
        let mut found = tree.complete_options(&format!("spectrum get {base}/ru"), "ru");
        found.sort();
        assert_eq!(found, vec!["run1.spc ", "runs/"]);
        assert_eq!(tree.complete_options(&format!("cd {base}/r"), "r"), vec!["runs/"]);
    }
}
