//! Resolved command specifications.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

/// Resolved specification of a command to run.
///
/// This is the input the execution engine consumes; assembling it (shell
/// quoting, script generation, DSLs) is a caller concern. The fluent setters
/// cover the plain cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: HashMap<String, String>,
    attachments: Vec<PathBuf>,
}

impl CommandSpec {
    /// Creates a spec for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
            attachments: Vec::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Sets one environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Records a file the command references, for later diagnostics.
    pub fn attach(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachments.push(path.into());
        self
    }

    /// The program to execute.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The arguments, in order.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// The working directory, if one was set.
    pub fn working_directory(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// The extra environment variables.
    pub fn environment(&self) -> &HashMap<String, String> {
        &self.env
    }

    /// Files the command references.
    pub fn attachments(&self) -> &[PathBuf] {
        &self.attachments
    }

    /// Single-line rendering of the command, for logs and dumps.
    pub fn command_line(&self) -> String {
        let mut parts = vec![quote(&self.program)];
        parts.extend(self.args.iter().map(|a| quote(a)));
        parts.join(" ")
    }

    /// Builds the std `Command`, with all three stdio streams piped.
    pub(crate) fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Quotes a token for display when it contains whitespace or quotes.
fn quote(token: &str) -> String {
    if token.is_empty() || token.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') {
        format!("'{}'", token.replace('\'', "\\'"))
    } else {
        token.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_fields() {
        let spec = CommandSpec::new("docker")
            .arg("run")
            .args(["--rm", "busybox"])
            .working_dir("/tmp")
            .env("FOO", "bar")
            .attach("/tmp/setup.sh");

        assert_eq!(spec.program(), "docker");
        assert_eq!(spec.arguments(), ["run", "--rm", "busybox"]);
        assert_eq!(spec.working_directory(), Some(Path::new("/tmp")));
        assert_eq!(spec.environment().get("FOO").map(String::as_str), Some("bar"));
        assert_eq!(spec.attachments(), [PathBuf::from("/tmp/setup.sh")]);
    }

    #[test]
    fn test_command_line_quotes_whitespace() {
        let spec = CommandSpec::new("sh").arg("-c").arg("echo hello");
        assert_eq!(spec.command_line(), "sh -c 'echo hello'");
        assert_eq!(spec.to_string(), spec.command_line());
    }

    #[test]
    fn test_command_line_plain_tokens_unquoted() {
        let spec = CommandSpec::new("echo").arg("hello");
        assert_eq!(spec.command_line(), "echo hello");
    }
}
