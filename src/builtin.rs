use crate::command::{CommandResult, CommandSpec, CommandStatus, Invocation};
use crate::env::Environment;
use crate::error::ShellError;
use crate::options::{ArghParser, Positionals};
use crate::tree::CommandTree;
use argh::{ArgsInfo, FromArgs};
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

#[derive(FromArgs, ArgsInfo)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(switch, short = 'v')]
    /// print the new working directory
    pub verbose: bool,

    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl Positionals for Cd {
    fn take_positionals(&mut self) -> Vec<String> {
        self.target.take().into_iter().collect()
    }
}

impl Cd {
    fn execute(&self, inv: &mut Invocation<'_>, env: &Environment) -> CommandResult {
        let target = match inv.args.first() {
            Some(t) if !t.is_empty() => PathBuf::from(shellexpand::tilde(t).into_owned()),
            _ => match env.get_var("HOME") {
                Some(home) => PathBuf::from(home),
                None => return Err(ShellError::command("cd: no target and HOME not set").into()),
            },
        };

        let canonical = fs::canonicalize(&target)
            .map_err(|e| ShellError::command(format!("cd: {}: {e}", target.display())))?;
        env::set_current_dir(&canonical)
            .map_err(|e| ShellError::command(format!("cd: {}: {e}", canonical.display())))?;
        log::debug!("changed directory to {}", canonical.display());
        if self.verbose {
            writeln!(inv.out, "{}", canonical.display())?;
        }
        Ok(CommandStatus::Done)
    }
}

/// Register the leaf commands shipped with the shell binary: `cd`.
pub fn register_builtins(tree: &mut CommandTree, env: &Environment) -> Result<(), ShellError> {
    let env = env.clone();
    tree.add(
        CommandSpec::new("cd", move |inv| match inv.take_options::<Cd>() {
            Some(cd) => cd.execute(inv, &env),
            None => Ok(CommandStatus::ShowUsage),
        })
        .parser(ArghParser::<Cd>::default())
        .maxargs(1)
        .dir_args(),
    )?;
    Ok(())
}
