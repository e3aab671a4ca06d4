use pitr_core::{Chunk, ChronologyError, Instant, RestoreWindow, Result, TimeRange};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedChunk {
    pub chunk: Chunk,
    /// Last chunk of the window; replay of this one is capped at the window's `to`.
    pub terminal: bool,
}

/// Chunks to replay for a restore window, in chain order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub chunks: Vec<SelectedChunk>,
    pub upper_bound: Option<Instant>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Hard replay limit for `selected`: the window end for the terminal chunk, none otherwise.
    pub fn upper_bound_for(&self, selected: &SelectedChunk) -> Option<Instant> {
        if selected.terminal {
            self.upper_bound
        } else {
            None
        }
    }

    /// Interval spanned by the selected chunks.
    pub fn span(&self) -> Option<TimeRange> {
        let first = self.chunks.first()?;
        let last = self.chunks.last()?;
        Some(TimeRange {
            from: first.chunk.from_time,
            to: last.chunk.to_time,
        })
    }
}

/// Select the chunks of an ordered chain that overlap `window`.
///
/// Consecutive selected chunks must meet exactly (`prev.to_time == next.from_time`);
/// anything else is a coverage gap and nothing is returned.
pub fn select_for_window(chunks: &[Chunk], window: &RestoreWindow) -> Result<Selection> {
    window.validate()?;

    let selected: Vec<&Chunk> = chunks.iter().filter(|c| window.admits(c)).collect();
    for pair in selected.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        if prev.to_time != next.from_time {
            return Err(ChronologyError::CoverageGap {
                previous_key: prev.key.clone(),
                previous_to: prev.to_time,
                next_key: next.key.clone(),
                next_from: next.from_time,
            });
        }
    }

    let last = selected.len().saturating_sub(1);
    let selection = Selection {
        chunks: selected
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| SelectedChunk {
                chunk: chunk.clone(),
                terminal: i == last,
            })
            .collect(),
        upper_bound: window.to,
    };
    debug!(
        target = "selection",
        from = ?window.from,
        to = ?window.to,
        candidates = chunks.len(),
        selected = selection.len(),
        "selected chunks for window"
    );
    Ok(selection)
}
