use log::trace;

use super::node::{Arena, NodeId};
use crate::error::Result;

/// Gradient rule of one recorded operation. Captures operand ids only.
pub(crate) type BackwardFn = Box<dyn Fn(&mut Arena) -> Result<()>>;

pub(crate) struct TapeEntry {
    pub(crate) output: NodeId,
    pub(crate) backward: Option<BackwardFn>,
}

impl TapeEntry {
    pub(crate) fn propagate(&self, arena: &mut Arena) -> Result<()> {
        match &self.backward {
            Some(backward) => backward(arena),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for TapeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TapeEntry")
            .field("output", &self.output)
            .field("backward", &self.backward.is_some())
            .finish()
    }
}

/// Append-only log of the operations recorded since the last clear.
///
/// Must be cleared between unrelated computations: replay runs every entry,
/// so leftovers from a previous iteration would leak gradient into this one.
#[derive(Debug, Default)]
pub(crate) struct Tape {
    entries: Vec<TapeEntry>,
}

impl Tape {
    pub(crate) fn record(&mut self, output: NodeId, backward: Option<BackwardFn>) {
        self.entries.push(TapeEntry { output, backward });
    }

    /// Replays every entry, newest first.
    pub(crate) fn run_backward(&self, arena: &mut Arena) -> Result<()> {
        for entry in self.entries.iter().rev() {
            trace!("propagating gradient of {}", entry.output);
            entry.propagate(arena)?;
        }
        Ok(())
    }

    pub(crate) fn entries(&self) -> &[TapeEntry] {
        &self.entries
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Empties the tape and returns the number of entries dropped.
    pub(crate) fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries = Vec::new();
        dropped
    }
}
