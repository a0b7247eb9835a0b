use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Shared, cloneable error used for scripted failures.
///
/// Scripted commands are cloned out of the registry on every dispatch, so the
/// error they carry has to be shareable rather than owned.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// Errors returned through the normal `Result` channel.
///
/// Unregistered invocations against a [`MockExecutor`](crate::MockExecutor)
/// are NOT reported here: they panic, because they indicate a missing test
/// setup rather than a condition the code under test should handle.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("expected stdin to be provided but it was not (was SetStdin() called?)")]
    StdinNotProvided,

    #[error(
        "expected stdin set by SetStdin() to be \"{}\" but got \"{}\"",
        String::from_utf8_lossy(.expected),
        String::from_utf8_lossy(.actual)
    )]
    StdinMismatch { expected: Vec<u8>, actual: Vec<u8> },

    #[error("failed to read stdin: {0}")]
    StdinRead(#[source] std::io::Error),

    /// Error scripted on a mock command or look-up. A failing mock command
    /// still hands back the output it was scripted with.
    #[error("{source}")]
    Scripted {
        #[source]
        source: SharedError,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },

    #[error("executable file not found in $PATH: {0}")]
    ExecutableNotFound(String),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Failed to spawn '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process exited with code {code}")]
    ExitCode {
        code: i32,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },

    #[error("Process terminated by signal {0}")]
    Signal(i32),

    #[error("Process timed out after {0:?}")]
    Timeout(Duration),

    #[error("Process '{command}' was cancelled")]
    Cancelled { command: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stdout already set")]
    StdoutAlreadySet,

    #[error("Stderr already set")]
    StderrAlreadySet,

    #[error("a mock executor is already installed")]
    AlreadySubstituted,
}

impl ProcessError {
    /// Wrap any error as a scripted failure.
    pub fn scripted<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Scripted {
            source: Arc::new(err),
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    /// Numeric code for this error, see [`ErrorCode`].
    pub fn code(&self) -> u16 {
        match self {
            ProcessError::StdinNotProvided => ErrorCode::VALIDATION_STDIN_MISSING,
            ProcessError::StdinMismatch { .. } => ErrorCode::VALIDATION_STDIN_MISMATCH,
            ProcessError::StdinRead(_) => ErrorCode::EXEC_STDIN_ERROR,
            ProcessError::Scripted { .. } => ErrorCode::EXEC_SCRIPTED,
            ProcessError::ExecutableNotFound(_) | ProcessError::CommandNotFound(_) => {
                ErrorCode::EXEC_COMMAND_NOT_FOUND
            }
            ProcessError::SpawnFailed { .. } | ProcessError::Io(_) => ErrorCode::EXEC_SPAWN_FAILED,
            ProcessError::ExitCode { .. } => ErrorCode::EXEC_SUBPROCESS_FAILED,
            ProcessError::Signal(_) => ErrorCode::EXEC_SIGNAL_RECEIVED,
            ProcessError::Timeout(_) => ErrorCode::EXEC_TIMEOUT,
            ProcessError::Cancelled { .. } => ErrorCode::EXEC_CANCELLED,
            ProcessError::StdoutAlreadySet | ProcessError::StderrAlreadySet => {
                ErrorCode::EXEC_OUTPUT_ERROR
            }
            ProcessError::AlreadySubstituted => ErrorCode::VALIDATION_ALREADY_SUBSTITUTED,
        }
    }

    /// Exit code of a process that ran to completion and failed.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProcessError::ExitCode { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Stdout produced alongside the failure, by a real process that exited
    /// non-zero or by a scripted command.
    pub fn stdout(&self) -> Option<&[u8]> {
        match self {
            ProcessError::ExitCode { stdout, .. } | ProcessError::Scripted { stdout, .. } => {
                Some(stdout)
            }
            _ => None,
        }
    }

    pub fn stderr(&self) -> Option<&[u8]> {
        match self {
            ProcessError::ExitCode { stderr, .. } | ProcessError::Scripted { stderr, .. } => {
                Some(stderr)
            }
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProcessError::Cancelled { .. })
    }
}

/// Error code registry
///
/// Codes are organized by category:
/// - 4000-4999: Execution errors
/// - 7000-7999: Validation errors
pub struct ErrorCode;

impl ErrorCode {
    // Execution errors (4000-4999)
    pub const EXEC_COMMAND_NOT_FOUND: u16 = 4001;
    pub const EXEC_TIMEOUT: u16 = 4002;
    pub const EXEC_SUBPROCESS_FAILED: u16 = 4003;
    pub const EXEC_SIGNAL_RECEIVED: u16 = 4005;
    pub const EXEC_SPAWN_FAILED: u16 = 4006;
    pub const EXEC_OUTPUT_ERROR: u16 = 4007;
    pub const EXEC_CANCELLED: u16 = 4008;
    pub const EXEC_STDIN_ERROR: u16 = 4009;
    pub const EXEC_SCRIPTED: u16 = 4010;

    // Validation errors (7000-7999)
    pub const VALIDATION_STDIN_MISSING: u16 = 7001;
    pub const VALIDATION_STDIN_MISMATCH: u16 = 7002;
    pub const VALIDATION_ALREADY_SUBSTITUTED: u16 = 7003;
}

/// Human readable description of an error code.
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        ErrorCode::EXEC_COMMAND_NOT_FOUND => "Command or executable not found",
        ErrorCode::EXEC_TIMEOUT => "Process timed out",
        ErrorCode::EXEC_SUBPROCESS_FAILED => "Process exited with a non-zero code",
        ErrorCode::EXEC_SIGNAL_RECEIVED => "Process terminated by a signal",
        ErrorCode::EXEC_SPAWN_FAILED => "Process could not be spawned",
        ErrorCode::EXEC_OUTPUT_ERROR => "Output stream misconfigured",
        ErrorCode::EXEC_CANCELLED => "Process cancelled",
        ErrorCode::EXEC_STDIN_ERROR => "Failed to read provided stdin",
        ErrorCode::EXEC_SCRIPTED => "Scripted error returned by a mock command",
        ErrorCode::VALIDATION_STDIN_MISSING => "Expected stdin was never provided",
        ErrorCode::VALIDATION_STDIN_MISMATCH => "Provided stdin did not match expectation",
        ErrorCode::VALIDATION_ALREADY_SUBSTITUTED => "A mock executor is already installed",
        _ => "Unknown error code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stdin_mismatch_message() {
        let err = ProcessError::StdinMismatch {
            expected: b"hello world".to_vec(),
            actual: b"goodbye world".to_vec(),
        };
        assert_eq!(
            err.to_string(),
            "expected stdin set by SetStdin() to be \"hello world\" but got \"goodbye world\""
        );
    }

    #[test]
    fn test_stdin_mismatch_non_utf8_is_lossy() {
        let err = ProcessError::StdinMismatch {
            expected: b"ok".to_vec(),
            actual: vec![0xff, b'o'],
        };
        assert!(err.to_string().ends_with("but got \"\u{fffd}o\""));
    }

    #[test]
    fn test_scripted_displays_source() {
        let err = ProcessError::scripted(std::io::Error::other("exit status 1"));
        assert_eq!(err.to_string(), "exit status 1");
        assert_eq!(err.code(), ErrorCode::EXEC_SCRIPTED);
    }

    #[test]
    fn test_scripted_keeps_output() {
        let err = ProcessError::Scripted {
            source: Arc::new(std::io::Error::other("exit status 1")),
            stdout: b"out".to_vec(),
            stderr: b"rejected".to_vec(),
        };
        assert_eq!(err.to_string(), "exit status 1");
        assert_eq!(err.stdout(), Some(&b"out"[..]));
        assert_eq!(err.stderr(), Some(&b"rejected"[..]));
        assert_eq!(err.source().map(|e| e.to_string()).as_deref(), Some("exit status 1"));
        assert_eq!(ProcessError::StdinNotProvided.stdout(), None);
    }

    #[test]
    fn test_codes_are_described() {
        let errors = [
            ProcessError::StdinNotProvided,
            ProcessError::StdinMismatch {
                expected: Vec::new(),
                actual: Vec::new(),
            },
            ProcessError::StdinRead(std::io::Error::other("closed")),
            ProcessError::scripted(std::io::Error::other("scripted")),
            ProcessError::ExecutableNotFound("git".to_string()),
            ProcessError::CommandNotFound("git".to_string()),
            ProcessError::SpawnFailed {
                command: "git".to_string(),
                source: std::io::Error::other("denied"),
            },
            ProcessError::ExitCode {
                code: 1,
                stdout: Vec::new(),
                stderr: Vec::new(),
            },
            ProcessError::Signal(9),
            ProcessError::Timeout(Duration::from_secs(1)),
            ProcessError::Cancelled {
                command: "sleep 5".to_string(),
            },
            ProcessError::Io(std::io::Error::other("io")),
            ProcessError::StdoutAlreadySet,
            ProcessError::StderrAlreadySet,
            ProcessError::AlreadySubstituted,
        ];
        for err in &errors {
            assert_ne!(describe_error_code(err.code()), "Unknown error code");
        }
    }

    #[test]
    fn test_exit_code_accessor() {
        let err = ProcessError::ExitCode {
            code: 2,
            stdout: Vec::new(),
            stderr: b"boom".to_vec(),
        };
        assert_eq!(err.exit_code(), Some(2));
        assert_eq!(ProcessError::StdoutAlreadySet.exit_code(), None);
    }
}
