use crate::external::find_command_path;
use std::collections::HashMap;
use std::env as stdenv;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

/// Shell used when neither `$SHELL` nor the password database names one.
pub const FALLBACK_SHELL: &str = "/bin/sh";

const PASSWD_FILE: &str = "/etc/passwd";

/// Snapshot of the process environment the shell works with.
///
/// Child processes started by the shell see exactly these variables.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
}

impl Environment {
    /// Capture the variables of the current process.
    pub fn new() -> Self {
        Self {
            vars: stdenv::vars().collect(),
        }
    }

    /// Get the value of an environment variable, ignoring empty values.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).filter(|v| !v.is_empty()).cloned()
    }

    /// Set or override an environment variable.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Name of the invoking user.
    pub fn user(&self) -> Option<String> {
        self.get_var("USER").or_else(|| self.get_var("LOGNAME"))
    }

    /// The program used for shell pass-through.
    ///
    /// `$SHELL` first, then the user's login shell from the password
    /// database, then [`FALLBACK_SHELL`]. Bare program names are resolved
    /// through `PATH`.
    pub fn shell_program(&self) -> PathBuf {
        let shell = self
            .get_var("SHELL")
            .or_else(|| {
                let user = self.user()?;
                let passwd = fs::read_to_string(PASSWD_FILE).ok()?;
                login_shell(&passwd, &user)
            })
            .unwrap_or_else(|| FALLBACK_SHELL.to_string());

        let search_paths = self.get_var("PATH").unwrap_or_default();
        match find_command_path(OsStr::new(&search_paths), Path::new(&shell)) {
            Some(found) => found.into_owned(),
            None => {
                log::debug!("{shell} not found on PATH, using it as given");
                PathBuf::from(shell)
            }
        }
    }
}

/// The login shell recorded for `user` in passwd-formatted `contents`.
fn login_shell(contents: &str, user: &str) -> Option<String> {
    contents
        .lines()
        .filter(|line| !line.starts_with('#'))
        .map(|line| line.split(':').collect::<Vec<_>>())
        .find(|fields| fields.len() >= 7 && fields[0] == user)
        .map(|fields| fields[6].trim().to_string())
        .filter(|shell| !shell.is_empty())
}
