pub mod config;
pub mod cursor;
pub mod error;
pub mod gesture;
pub mod layout;
pub mod looping;
pub mod overlay;
pub mod resolver;
pub mod score;
pub mod timeline;
pub mod types;

pub use config::FollowConfig;
pub use cursor::{CursorInterpolator, CursorState, Latch};
pub use error::*;
pub use gesture::{GestureHitTester, GestureOutcome, GesturePhase, Hit};
pub use layout::{OccurrenceTable, ScoreRenderer, StaticLayout};
pub use looping::{LoopEvent, LoopRangeManager, LoopSelection};
pub use overlay::{PlaybackOverlay, SimulatedTransport, Transport};
pub use resolver::{BeatResolver, BeatTracker};
pub use score::{Ending, ExpansionEntry, Score, StructuralBar, StructuralBeat};
pub use timeline::TimelineExpander;
pub use types::*;

/// Load a layout fixture and build its first occurrence table.
/// This is the main entry point for tools driving the overlay from files.
pub fn load_fixture(source: &str) -> Result<(StaticLayout, OccurrenceTable), CursorError> {
    let layout = StaticLayout::from_yaml(source)?;
    let table = OccurrenceTable::build(&layout)?;
    Ok((layout, table))
}
