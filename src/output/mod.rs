//! Line-oriented output channels.
//!
//! Channels format every published value into a line and queue it on a shared
//! [`LineSink`]. The run loop drains the sink into its writer after each
//! advertisement and tick, so I/O errors surface there instead of inside
//! [`crate::channel::Channel::publish`].

pub mod influxdb;

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// Queue of formatted lines shared by all channels of one output.
#[derive(Debug, Clone, Default)]
pub struct LineSink {
    pending: Arc<Mutex<Vec<String>>>,
}

impl LineSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a line; the trailing newline is added when draining.
    pub fn push(&self, line: String) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
    }

    /// Number of queued lines.
    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write every queued line to `out`.
    ///
    /// # Errors
    /// Returns the first write error; lines not yet written are dropped.
    pub fn drain_into(&self, out: &mut dyn Write) -> io::Result<()> {
        let lines = std::mem::take(
            &mut *self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for line in lines {
            writeln!(out, "{line}")?;
        }
        Ok(())
    }
}
