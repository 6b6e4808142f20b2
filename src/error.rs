use std::io;

use thiserror::Error;

/// Everything that can go wrong while handling one input line.
///
/// None of these end the session: the read loop prints the error and reads
/// the next line.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("cd: missing operand")]
    MissingOperand,

    #[error("cd: {path}: {source}")]
    ChangeDir { path: String, source: io::Error },

    #[error("bosh: cannot determine working directory: {0}")]
    WorkingDir(#[source] io::Error),

    #[error("bosh: could not fork: {0}")]
    Fork(#[source] io::Error),

    #[error("bosh: pipe could not be initialized: {0}")]
    Pipe(#[source] io::Error),

    #[error("bosh: could not install interrupt handler: {0}")]
    Signal(#[source] io::Error),

    #[error("bosh: syntax error: missing redirection target after `{0}`")]
    MissingTarget(&'static str),

    #[error("bosh: syntax error: empty command next to `|`")]
    EmptyPipeStage,

    #[error("bosh: argument contains a NUL byte: {0:?}")]
    NulByte(String),

    #[error("exec: {command}: permission denied")]
    ExecPermissionDenied { command: String },

    #[error("exec: {command}: file does not exist")]
    ExecNotFound { command: String },

    #[error("exec: unable to exec {command}: {source}")]
    ExecFailed { command: String, source: io::Error },
}

impl ShellError {
    /// Classifies a failed `execvp` of `command` by its OS error code.
    pub fn from_exec(command: &str, err: io::Error) -> Self {
        let command = command.to_string();
        match err.raw_os_error() {
            Some(libc::EACCES) => Self::ExecPermissionDenied { command },
            Some(libc::ENOENT) => Self::ExecNotFound { command },
            _ => Self::ExecFailed {
                command,
                source: err,
            },
        }
    }
}
