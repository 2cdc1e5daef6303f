use crate::env::Environment;
use crate::error::ShellError;
use std::borrow::Cow;
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, ExitStatus};

/// Shell-style exit code of a child process.
pub type ExitCode = i32;

/// Run `command` with the user's shell, or an interactive subshell when
/// there is no command, and wait for it to finish.
///
/// The child inherits the terminal and sees the variables of `env`.
pub fn run_shell(env: &Environment, command: Option<&str>) -> Result<ExitCode, ShellError> {
    let shell = env.shell_program();
    let mut child = Command::new(&shell);
    if let Some(command) = command {
        child.arg("-c").arg(command);
    }
    log::debug!("running {} with {command:?}", shell.display());

    let status = child
        .env_clear()
        .envs(env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .status()
        .map_err(|e| ShellError::command(format!("cannot run {}: {e}", shell.display())))?;
    let code = status.code().unwrap_or_else(|| terminated_by_signal(status));
    if code != 0 {
        log::debug!("{} exited with {code}", shell.display());
    }
    Ok(code)
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a program name the way a shell would.
///
/// Absolute paths and relative paths with several components (or a leading
/// `./`) are taken as they are when they exist. A bare name is looked up in
/// each directory of `search_paths`. Returns `None` when nothing exists.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    let mut components = path.components();
    match (components.next(), components.next()) {
        (None, _) => None,
        (Some(name), None) if !path.is_absolute() && !path.starts_with("./") => {
            std::env::split_paths(search_paths)
                .map(|dir| dir.join(name))
                .find(|candidate| candidate.exists())
                .map(Cow::Owned)
        }
        _ => path.exists().then_some(Cow::Borrowed(path)),
    }
}
