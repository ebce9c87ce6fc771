use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which stdio pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputStream::Stdout => write!(f, "stdout"),
            OutputStream::Stderr => write!(f, "stderr"),
        }
    }
}

/// A line of output from the supervised agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutput {
    /// When the line was read
    pub timestamp: DateTime<Utc>,

    pub stream: OutputStream,

    /// Spawn generation that produced the line
    pub generation: u64,

    /// The line without its trailing newline
    pub line: String,
}

impl ProcessOutput {
    pub fn new(stream: OutputStream, generation: u64, line: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream,
            generation,
            line: line.into(),
        }
    }

    pub fn stdout(generation: u64, line: impl Into<String>) -> Self {
        Self::new(OutputStream::Stdout, generation, line)
    }

    pub fn stderr(generation: u64, line: impl Into<String>) -> Self {
        Self::new(OutputStream::Stderr, generation, line)
    }
}
