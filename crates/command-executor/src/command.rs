//! Command type for building executable commands

use async_process::Command as AsyncCommand;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

/// A command to be executed
///
/// This is a builder for creating commands that can be converted to `async_process::Command`
/// when needed. Unlike `AsyncCommand`, this type is `Clone` and can be reused multiple times.
/// Arguments are kept as a typed list and are never joined into a shell string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    program: OsString,
    args: Vec<OsString>,
    env: BTreeMap<OsString, OsString>,
    current_dir: Option<PathBuf>,
    /// File to feed to the process on stdin
    stdin_file: Option<PathBuf>,
    /// File that receives the process stdout instead of the event stream
    stdout_file: Option<PathBuf>,
}

impl Command {
    /// Create a new command for the given program
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
            env: BTreeMap::new(),
            current_dir: None,
            stdin_file: None,
            stdout_file: None,
        }
    }

    /// Add an argument to the command
    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Add multiple arguments to the command
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.arg(arg);
        }
        self
    }

    /// Set an environment variable on top of the inherited environment
    pub fn env<K, V>(&mut self, key: K, val: V) -> &mut Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.env
            .insert(key.as_ref().to_owned(), val.as_ref().to_owned());
        self
    }

    /// Set the working directory for the command
    pub fn current_dir<P: AsRef<Path>>(&mut self, dir: P) -> &mut Self {
        self.current_dir = Some(dir.as_ref().to_owned());
        self
    }

    /// Read the process stdin from a file
    pub fn stdin_file<P: AsRef<Path>>(&mut self, path: P) -> &mut Self {
        self.stdin_file = Some(path.as_ref().to_owned());
        self
    }

    /// Write the process stdout to a file, replaced only once the process succeeds
    pub fn stdout_file<P: AsRef<Path>>(&mut self, path: P) -> &mut Self {
        self.stdout_file = Some(path.as_ref().to_owned());
        self
    }

    /// Get the program name
    pub fn get_program(&self) -> &OsStr {
        &self.program
    }

    /// Get the arguments
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Get the environment variables
    pub fn get_envs(&self) -> &BTreeMap<OsString, OsString> {
        &self.env
    }

    /// Get the current directory
    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Get the stdin redirection, if any
    pub fn get_stdin_file(&self) -> Option<&Path> {
        self.stdin_file.as_deref()
    }

    /// Get the stdout redirection, if any
    pub fn get_stdout_file(&self) -> Option<&Path> {
        self.stdout_file.as_deref()
    }

    /// Prepare this command for execution by converting to an `async_process::Command`
    ///
    /// Stdio is left untouched; launchers decide how streams are wired.
    pub fn prepare(&self) -> AsyncCommand {
        let mut cmd = AsyncCommand::new(&self.program);
        cmd.args(&self.args);

        for (key, val) in &self.env {
            cmd.env(key, val);
        }

        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        cmd
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        if let Some(path) = &self.stdin_file {
            write!(f, " < {}", path.display())?;
        }
        if let Some(path) = &self.stdout_file {
            write!(f, " > {}", path.display())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_with_args() {
        let mut cmd = Command::new("ls");
        cmd.arg("-la").arg("/tmp");

        assert_eq!(cmd.get_args().len(), 2);
        assert_eq!(cmd.get_args()[0], "-la");
        assert_eq!(cmd.get_args()[1], "/tmp");
    }

    #[test]
    fn test_command_settings() {
        let mut cmd = Command::new("echo");
        cmd.arg("hello")
            .arg("world")
            .env("TEST_VAR", "test_value")
            .current_dir("/tmp");

        assert_eq!(cmd.get_program(), "echo");
        assert_eq!(cmd.get_args(), &["hello", "world"]);
        assert_eq!(
            cmd.get_envs().get(OsStr::new("TEST_VAR")),
            Some(&OsString::from("test_value"))
        );
        assert_eq!(cmd.get_current_dir(), Some(Path::new("/tmp")));
    }

    #[test]
    fn test_display_shows_redirections_but_not_env() {
        let mut cmd = Command::new("docker");
        cmd.args(["compose", "exec", "-T", "db", "mysqldump"])
            .env("MYSQL_PWD", "secret")
            .stdout_file("backup.sql");

        assert_eq!(
            cmd.to_string(),
            "docker compose exec -T db mysqldump > backup.sql"
        );
    }

    #[test]
    fn test_arguments_are_not_split() {
        let mut cmd = Command::new("echo");
        cmd.arg("a b; rm -rf /");
        assert_eq!(cmd.get_args().len(), 1);
    }
}
