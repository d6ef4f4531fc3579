//! Playback engine boundary

use crate::types::{ExpandedTick, LoopBounds};

/// The playback engine as the overlay sees it.
pub trait Transport {
    fn is_playing(&self) -> bool;

    /// Move the play position.
    fn seek(&mut self, tick: ExpandedTick);

    /// Set or clear the engine's native loop field. `end` is exclusive.
    fn set_loop_range(&mut self, bounds: Option<LoopBounds>);
}

/// Result of advancing a [`SimulatedTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    pub tick: ExpandedTick,
    /// The native loop field sent playback back to its start
    pub wrapped: bool,
}

/// Clock-driven transport with no audio behind it. Drives the CLI and the
/// controller tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulatedTransport {
    pub playing: bool,
    pub position: ExpandedTick,
    pub loop_range: Option<LoopBounds>,
    /// Every seek, in order
    pub seeks: Vec<ExpandedTick>,
}

impl SimulatedTransport {
    pub fn playing() -> Self {
        Self {
            playing: true,
            ..Self::default()
        }
    }

    /// Move the clock forward by `step` ticks, honouring the native loop field.
    pub fn advance(&mut self, step: ExpandedTick) -> Advance {
        let next = self.position + step;
        match self.loop_range {
            Some(bounds) if self.position < bounds.end && next >= bounds.end => {
                self.position = bounds.start;
                Advance {
                    tick: bounds.start,
                    wrapped: true,
                }
            }
            _ => {
                self.position = next;
                Advance {
                    tick: next,
                    wrapped: false,
                }
            }
        }
    }
}

impl Transport for SimulatedTransport {
    fn is_playing(&self) -> bool {
        self.playing
    }

    fn seek(&mut self, tick: ExpandedTick) {
        self.position = tick;
        self.seeks.push(tick);
    }

    fn set_loop_range(&mut self, bounds: Option<LoopBounds>) {
        self.loop_range = bounds;
    }
}
