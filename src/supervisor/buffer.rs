//! Ring buffer of recent agent output

use std::collections::VecDeque;

use crate::domain::ProcessOutput;

/// Keeps the last N stdout/stderr lines across restarts
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    lines: VecDeque<ProcessOutput>,
    max_lines: usize,
}

impl OutputBuffer {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(max_lines.min(1024)),
            max_lines,
        }
    }

    /// Add a line, evicting the oldest when full
    pub fn push(&mut self, line: ProcessOutput) {
        if self.max_lines == 0 {
            return;
        }
        if self.lines.len() >= self.max_lines {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Get the last N lines, oldest first
    pub fn last_n(&self, n: usize) -> Vec<ProcessOutput> {
        let skip = self.lines.len().saturating_sub(n);
        self.lines.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
