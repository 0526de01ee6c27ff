use std::io;
use std::path::Path;
use std::process::Command;

/// Captured result of one external process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

pub trait ProcessRunner: Send + Sync {
    fn execute(&self, program: &Path, args: &[String], cwd: &Path) -> io::Result<ProcessOutput>;
}

/// Runs the real process and waits for it.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn execute(&self, program: &Path, args: &[String], cwd: &Path) -> io::Result<ProcessOutput> {
        let output = Command::new(program).args(args).current_dir(cwd).output()?;
        Ok(ProcessOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
