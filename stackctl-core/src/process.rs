use std::collections::HashMap;
use std::process::Stdio;
use std::str::FromStr;
use tokio::process::{Child, Command};

pub use nix::sys::signal::Signal;

/// Parse a signal name as it appears in configuration. Accepts both the
/// short form (`TERM`) and the full name (`SIGTERM`), case-insensitive.
pub fn parse_signal(name: &str) -> crate::Result<Signal> {
    let upper = name.trim().to_ascii_uppercase();
    let full = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{upper}")
    };
    Signal::from_str(&full).map_err(|_| crate::Error::Config(format!("unknown signal: {name}")))
}

#[derive(Debug, Clone, Copy)]
pub struct ExitStatus {
    code: Option<i32>,
    signal: Option<i32>,
}

impl ExitStatus {
    pub fn from_std(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            #[cfg(unix)]
            signal: {
                use std::os::unix::process::ExitStatusExt;
                status.signal()
            },
            #[cfg(not(unix))]
            signal: None,
        }
    }

    pub fn new(code: Option<i32>, signal: Option<i32>) -> Self {
        Self { code, signal }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn signal(&self) -> Option<i32> {
        self.signal
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(sig)) => write!(f, "signal {sig}"),
            (None, None) => write!(f, "unknown status"),
        }
    }
}

pub struct ProcessBuilder {
    command: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    cwd: Option<std::path::PathBuf>,
    stdout: Stdio,
    stderr: Stdio,
    stdin: Stdio,
}

impl ProcessBuilder {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            stdout: Stdio::inherit(),
            stderr: Stdio::inherit(),
            stdin: Stdio::null(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args = args.into_iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (k, v) in vars {
            self.env
                .push((k.as_ref().to_string(), v.as_ref().to_string()));
        }
        self
    }

    pub fn env_map(self, vars: &HashMap<String, String>) -> Self {
        self.envs(vars.iter())
    }

    pub fn current_dir(mut self, dir: impl AsRef<std::path::Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn stdout(mut self, stdout: Stdio) -> Self {
        self.stdout = stdout;
        self
    }

    pub fn stderr(mut self, stderr: Stdio) -> Self {
        self.stderr = stderr;
        self
    }

    pub fn stdin(mut self, stdin: Stdio) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn spawn(self) -> crate::Result<Child> {
        // Handle command strings like "puma -C config/puma.rb" when no
        // explicit args were set. shell-words keeps quoted arguments intact.
        let (actual_command, mut parsed_args) =
            if self.command.contains(' ') && self.args.is_empty() {
                match shell_words::split(&self.command) {
                    Ok(parts) if !parts.is_empty() => {
                        if let Some(first) = parts.first() {
                            let cmd = first.clone();
                            let args = parts.into_iter().skip(1).collect();
                            (cmd, args)
                        } else {
                            (self.command.clone(), Vec::new())
                        }
                    }
                    _ => (self.command.clone(), Vec::new()),
                }
            } else {
                (self.command.clone(), Vec::new())
            };

        parsed_args.extend(self.args);

        tracing::debug!(
            "Spawning process: command='{}', args={:?}",
            actual_command,
            parsed_args
        );

        let mut cmd = Command::new(&actual_command);
        cmd.args(&parsed_args)
            .stdout(self.stdout)
            .stderr(self.stderr)
            .stdin(self.stdin)
            .kill_on_drop(true);

        if let Some(cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        for (key, value) in self.env {
            cmd.env(key, value);
        }

        cmd.spawn()
            .map_err(|e| crate::Error::SpawnFailed(format!("{}: {}", actual_command, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_success() {
        let status = ExitStatus::new(Some(0), None);

        assert!(status.success());
        assert_eq!(status.code(), Some(0));
        assert_eq!(status.signal(), None);
    }

    #[test]
    fn test_exit_status_failure() {
        let status = ExitStatus::new(Some(1), None);

        assert!(!status.success());
        assert_eq!(status.code(), Some(1));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_signal() {
        let status = ExitStatus::new(None, Some(9)); // SIGKILL

        assert!(!status.success());
        assert_eq!(status.code(), None);
        assert_eq!(status.signal(), Some(9));
    }

    #[test]
    fn test_exit_status_display() {
        assert_eq!(ExitStatus::new(Some(3), None).to_string(), "exit code 3");
        assert_eq!(ExitStatus::new(None, Some(15)).to_string(), "signal 15");
    }

    #[test]
    fn test_parse_signal_short_and_full() {
        assert_eq!(parse_signal("TERM").unwrap(), Signal::SIGTERM);
        assert_eq!(parse_signal("SIGTERM").unwrap(), Signal::SIGTERM);
        assert_eq!(parse_signal("quit").unwrap(), Signal::SIGQUIT);
        assert_eq!(parse_signal("Usr1").unwrap(), Signal::SIGUSR1);
    }

    #[test]
    fn test_parse_signal_unknown() {
        assert!(parse_signal("NOPE").is_err());
        assert!(parse_signal("").is_err());
    }
}
