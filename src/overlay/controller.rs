use super::transport::Transport;
use crate::config::FollowConfig;
use crate::cursor::{CursorInterpolator, CursorState};
use crate::error::CursorError;
use crate::gesture::{GestureHitTester, GesturePhase, Hit};
use crate::layout::{OccurrenceTable, ScoreRenderer};
use crate::looping::{LoopEvent, LoopRangeManager, LoopSelection};
use crate::resolver::BeatTracker;
use crate::types::{CursorFrame, ExpandedTick, Granularity, Rect, WrapPolicy};

/// One active playback overlay.
///
/// Owns every piece of mutable follow state. All of it changes only inside
/// the `on_*` entry points, one event at a time.
pub struct PlaybackOverlay<T: Transport> {
    config: FollowConfig,
    transport: T,
    table: Option<OccurrenceTable>,
    tracker: BeatTracker,
    cursor: CursorInterpolator,
    loops: LoopRangeManager,
    gesture: GestureHitTester,
    position: ExpandedTick,
}

impl<T: Transport> PlaybackOverlay<T> {
    pub fn new(config: FollowConfig, transport: T) -> Self {
        Self {
            tracker: BeatTracker::new(&config),
            cursor: CursorInterpolator::new(&config),
            loops: LoopRangeManager::new(&config),
            gesture: GestureHitTester::new(&config),
            config,
            transport,
            table: None,
            position: 0,
        }
    }

    pub fn config(&self) -> &FollowConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn table(&self) -> Option<&OccurrenceTable> {
        self.table.as_ref()
    }

    /// Last tick seen from the clock (or sought to by a wrap).
    pub fn position(&self) -> ExpandedTick {
        self.position
    }

    pub fn cursor_state(&self) -> &CursorState {
        self.cursor.state()
    }

    pub fn last_frame(&self) -> Option<CursorFrame> {
        self.cursor.last_frame()
    }

    pub fn gesture_phase(&self) -> GesturePhase {
        self.gesture.phase()
    }

    /// The renderer finished a layout pass.
    ///
    /// Any gesture in progress is dropped before geometry is read. An
    /// expansion table inconsistent with the score is returned as an error
    /// and the previous table stays in use.
    pub fn on_layout_finished(&mut self, renderer: &dyn ScoreRenderer) -> Result<(), CursorError> {
        self.gesture.cancel();
        let table = OccurrenceTable::build(renderer)?;
        self.tracker.invalidate();
        self.cursor.reset();
        self.loops.relayout(&table);
        self.table = Some(table);
        self.sync_transport();
        log::debug!(target: "cursor::overlay", "layout rebuilt at tick {}", self.position);
        Ok(())
    }

    /// A clock position-change event. Returns the indicator to draw, or
    /// `None` when the frame is skipped or would not move the indicator.
    pub fn on_position_changed(&mut self, tick: ExpandedTick) -> Option<CursorFrame> {
        self.position = tick;
        let tick = match self.loops.on_tick(tick) {
            Some(start) => {
                self.wrap_to(start);
                start
            }
            None => tick,
        };

        let table = self.table.as_ref()?;
        let playing = self.transport.is_playing();
        let frame = self
            .tracker
            .update(table, tick)
            .and_then(|update| self.cursor.frame(table, &update, tick, playing));
        match frame {
            Ok(frame) => frame,
            Err(e) if e.is_recoverable() => {
                log::trace!(target: "cursor::overlay", "skipping frame at {}: {}", tick, e);
                None
            }
            Err(e) => {
                log::warn!(target: "cursor::overlay", "dropping frame at {}: {}", tick, e);
                None
            }
        }
    }

    /// The engine's native loop sent playback back to the loop start.
    pub fn on_loop_wrapped(&mut self) {
        log::debug!(target: "cursor::overlay", "engine loop wrapped");
        self.tracker.reset();
        self.cursor.reset();
    }

    pub fn on_pointer_down(&mut self, x: f64, y: f64) -> Option<Hit> {
        let table = self.table.as_ref()?;
        self.gesture.press(table, x, y, self.position)
    }

    pub fn on_pointer_move(&mut self, x: f64, y: f64) -> Option<Hit> {
        let table = self.table.as_ref()?;
        self.gesture.move_to(table, x, y)
    }

    /// Finish a gesture. A committed selection enables looping.
    pub fn on_pointer_up(&mut self, x: f64, y: f64) -> Option<LoopSelection> {
        let table = self.table.as_ref()?;
        let outcome = self.gesture.release(table, x, y)?;
        match self.loops.commit(table, &outcome) {
            Ok(selection) => {
                self.loops.set_enabled(true);
                self.sync_transport();
                Some(selection)
            }
            Err(e) => {
                log::debug!(target: "cursor::overlay", "gesture did not produce a loop: {}", e);
                None
            }
        }
    }

    pub fn selection(&self) -> Option<&LoopSelection> {
        self.loops.selection()
    }

    pub fn loop_enabled(&self) -> bool {
        self.loops.enabled()
    }

    pub fn set_loop_enabled(&mut self, enabled: bool) {
        self.loops.set_enabled(enabled);
        self.sync_transport();
    }

    pub fn granularity(&self) -> Granularity {
        self.loops.granularity()
    }

    pub fn set_granularity(&mut self, granularity: Granularity) {
        self.loops.set_granularity(granularity);
        self.gesture.set_granularity(granularity);
    }

    pub fn wrap_policy(&self) -> WrapPolicy {
        self.loops.policy()
    }

    pub fn set_wrap_policy(&mut self, policy: WrapPolicy) {
        self.loops.set_policy(policy);
        self.sync_transport();
    }

    pub fn clear_loop(&mut self) {
        self.loops.clear();
        self.sync_transport();
    }

    /// Loop a whole bar, at the pass nearest the current position.
    pub fn select_bar(&mut self, bar_index: usize) -> Result<LoopSelection, CursorError> {
        let table = self.table.as_ref().ok_or(CursorError::GeometryUnavailable {
            bar_index,
            occurrence: 0,
        })?;
        let selection = self.loops.select_bar(table, bar_index, self.position)?;
        self.sync_transport();
        Ok(selection)
    }

    /// Loop an explicit expanded range.
    pub fn select_range(&mut self, start: ExpandedTick, end: ExpandedTick) -> Result<LoopSelection, CursorError> {
        let table = self
            .table
            .as_ref()
            .ok_or(CursorError::OccurrenceResolutionMiss { tick: start })?;
        let selection = self.loops.select_ticks(table, start, end)?;
        self.sync_transport();
        Ok(selection)
    }

    pub fn highlight_rects(&self) -> Vec<Rect> {
        self.table
            .as_ref()
            .map(|table| self.loops.highlight_rects(table))
            .unwrap_or_default()
    }

    pub fn subscribe_loop(&mut self, listener: impl FnMut(&LoopEvent) + 'static) {
        self.loops.subscribe(listener);
    }

    fn wrap_to(&mut self, start: ExpandedTick) {
        self.tracker.reset();
        self.cursor.reset();
        self.transport.seek(start);
        self.position = start;
    }

    fn sync_transport(&mut self) {
        self.transport.set_loop_range(self.loops.engine_bounds());
    }
}
