use std::error::Error;
use std::fmt;

/// Represents all possible errors that can occur in Metronome
#[derive(Debug)]
pub enum MetronomeError {
    /// A task specification failed validation
    InvalidSpec(String),

    /// A task with the same name is already registered
    DuplicateName(String),

    /// No task with the given name is registered
    NotFound(String),

    /// An operation was attempted in a state that does not permit it
    IllegalState(String),

    /// The scheduler was started a second time
    AlreadyStarted,

    /// Invalid scheduler configuration
    Config(String),

    /// Error reported by a task body
    Task(String),
}

impl fmt::Display for MetronomeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetronomeError::InvalidSpec(msg) => write!(f, "invalid task spec: {}", msg),
            MetronomeError::DuplicateName(name) => {
                write!(f, "task '{}' is already registered", name)
            }
            MetronomeError::NotFound(name) => write!(f, "task '{}' not found", name),
            MetronomeError::IllegalState(msg) => write!(f, "illegal state: {}", msg),
            MetronomeError::AlreadyStarted => write!(f, "scheduler is already running"),
            MetronomeError::Config(msg) => write!(f, "configuration error: {}", msg),
            MetronomeError::Task(msg) => write!(f, "task error: {}", msg),
        }
    }
}

impl Error for MetronomeError {}

impl From<String> for MetronomeError {
    fn from(message: String) -> Self {
        MetronomeError::Task(message)
    }
}

impl From<&str> for MetronomeError {
    fn from(message: &str) -> Self {
        MetronomeError::Task(message.to_string())
    }
}
