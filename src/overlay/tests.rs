use super::*;
use crate::config::FollowConfig;
use crate::gesture::GesturePhase;
use crate::layout::{Grid, StaticLayout};
use crate::looping::LoopEvent;
use crate::score::{Score, StructuralBar};
use crate::types::{Granularity, LoopBounds, WrapPolicy};
use std::cell::RefCell;
use std::rc::Rc;

/// Bars 0-9, with 5-9 played three times: bar 5 starts at 9600, 19200, 28800.
fn three_pass_layout() -> StaticLayout {
    let bars = (0..10).map(|i| StructuralBar::uniform(i * 1920, 4, 480)).collect();
    let order = vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 5, 6, 7, 8, 9, 5, 6, 7, 8, 9];
    StaticLayout::with_grid(Score { bars }, Some(order), Grid::default())
}

fn overlay(config: FollowConfig) -> PlaybackOverlay<SimulatedTransport> {
    let mut overlay = PlaybackOverlay::new(config, SimulatedTransport::playing());
    overlay.on_layout_finished(&three_pass_layout()).unwrap();
    overlay
}

fn manual() -> FollowConfig {
    FollowConfig {
        wrap_policy: WrapPolicy::Manual,
        ..FollowConfig::default()
    }
}

#[test]
fn test_no_frames_before_layout() {
    let mut overlay = PlaybackOverlay::new(FollowConfig::default(), SimulatedTransport::playing());
    assert_eq!(overlay.on_position_changed(0), None);
    assert_eq!(overlay.on_pointer_down(10.0, 10.0), None);
}

#[test]
fn test_cursor_follows_the_playing_pass() {
    let mut overlay = overlay(FollowConfig::default());
    // Second pass of bar 5 is drawn at layout position 10: row 2, column 2
    let frame = overlay.on_position_changed(19200).unwrap();
    assert_eq!(frame.x, 408.0);
    assert_eq!(frame.y, 200.0);

    // Third pass: layout position 15, row 3, column 3
    let frame = overlay.on_position_changed(28800).unwrap();
    assert_eq!(frame.x, 608.0);
    assert_eq!(frame.y, 300.0);
}

#[test]
fn test_manual_wrap_scenario() {
    let mut overlay = overlay(manual());
    overlay.select_range(9600, 11520).unwrap();
    overlay.set_loop_enabled(true);
    assert_eq!(overlay.transport().loop_range, None);

    overlay.on_position_changed(11519);
    assert!(overlay.transport().seeks.is_empty());

    let frame = overlay.on_position_changed(11520).unwrap();
    assert_eq!(overlay.transport().seeks, vec![9600]);
    assert_eq!(overlay.position(), 9600);
    // Re-snapped to the first beat of the loop
    assert_eq!(frame.x, 8.0 + 200.0);
}

#[test]
fn test_declarative_loop_reaches_engine() {
    let mut overlay = overlay(FollowConfig::default());
    overlay.select_bar(5).unwrap();
    assert_eq!(overlay.transport().loop_range, None);

    overlay.set_loop_enabled(true);
    assert_eq!(overlay.transport().loop_range, Some(LoopBounds { start: 9600, end: 11521 }));

    overlay.set_wrap_policy(WrapPolicy::Manual);
    assert_eq!(overlay.transport().loop_range, None);

    overlay.set_wrap_policy(WrapPolicy::Declarative);
    overlay.clear_loop();
    assert_eq!(overlay.transport().loop_range, None);
}

#[test]
fn test_select_bar_anchors_at_current_pass() {
    let mut overlay = overlay(FollowConfig::default());
    overlay.on_position_changed(20000);
    let selection = overlay.select_bar(5).unwrap();
    assert_eq!(selection.start, 19200);
}

#[test]
fn test_engine_wrap_resets_follow_state() {
    let mut overlay = overlay(FollowConfig::default());
    overlay.on_position_changed(11000);
    assert!(overlay.cursor_state().beat.is_some());
    overlay.on_loop_wrapped();
    assert!(overlay.cursor_state().beat.is_none());
    assert!(overlay.last_frame().is_none());
    assert!(overlay.on_position_changed(9600).is_some());
}

#[test]
fn test_click_commits_full_bar_and_enables_loop() {
    let mut overlay = overlay(FollowConfig::default());
    overlay.on_pointer_down(210.0, 40.0).unwrap();
    overlay.on_pointer_move(210.4, 40.0);
    let selection = overlay.on_pointer_up(210.4, 40.0).unwrap();
    assert_eq!((selection.start, selection.end), (1920, 3840));
    assert!(overlay.loop_enabled());
    assert_eq!(overlay.transport().loop_range, Some(LoopBounds { start: 1920, end: 3841 }));
    assert_eq!(overlay.highlight_rects().len(), 1);
}

#[test]
fn test_drag_across_rows() {
    let mut overlay = overlay(FollowConfig::default());
    overlay.on_pointer_down(610.0, 40.0).unwrap();
    overlay.on_pointer_move(10.0, 140.0).unwrap();
    assert_eq!(overlay.gesture_phase(), GesturePhase::Dragging);
    let selection = overlay.on_pointer_up(10.0, 140.0).unwrap();
    // Bar 3 through bar 4
    assert_eq!((selection.start, selection.end), (5760, 9600));
    assert_eq!(overlay.highlight_rects().len(), 2);
}

#[test]
fn test_layout_cancels_gesture() {
    let mut overlay = overlay(FollowConfig::default());
    overlay.on_pointer_down(10.0, 40.0).unwrap();
    assert_eq!(overlay.gesture_phase(), GesturePhase::Pressed);
    overlay.on_layout_finished(&three_pass_layout()).unwrap();
    assert_eq!(overlay.gesture_phase(), GesturePhase::Idle);
    assert_eq!(overlay.on_pointer_up(10.0, 40.0), None);
}

#[test]
fn test_relayout_keeps_loop_on_its_pass() {
    let mut overlay = overlay(FollowConfig::default());
    overlay.on_position_changed(29000);
    overlay.select_bar(5).unwrap();
    overlay.set_loop_enabled(true);

    let base = three_pass_layout();
    let narrow = StaticLayout::with_grid(base.score, base.playback_order, Grid { bars_per_row: 2, ..Grid::default() });
    overlay.on_layout_finished(&narrow).unwrap();

    let selection = overlay.selection().unwrap();
    assert_eq!(selection.start, 28800);
    assert_eq!(overlay.transport().loop_range, Some(LoopBounds { start: 28800, end: 30721 }));
}

#[test]
fn test_missing_geometry_holds_last_frame() {
    let mut layout = three_pass_layout();
    layout.visual_bars.truncate(3);
    let mut overlay = PlaybackOverlay::new(FollowConfig::default(), SimulatedTransport::playing());
    overlay.on_layout_finished(&layout).unwrap();

    let held = overlay.on_position_changed(5000).unwrap();
    assert_eq!(overlay.on_position_changed(6000), None);
    assert_eq!(overlay.last_frame(), Some(held));
}

#[test]
fn test_granularity_toggle_reaches_gestures() {
    let mut overlay = overlay(FollowConfig::default());
    overlay.set_granularity(Granularity::Beat);
    assert_eq!(overlay.granularity(), Granularity::Beat);
    overlay.on_pointer_down(60.0, 40.0).unwrap();
    let selection = overlay.on_pointer_up(60.0, 40.0).unwrap();
    assert_eq!((selection.start, selection.end), (480, 960));
}

#[test]
fn test_loop_listeners() {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    let mut overlay = overlay(FollowConfig::default());
    overlay.subscribe_loop(move |event| sink.borrow_mut().push(*event));

    overlay.select_bar(0).unwrap();
    overlay.clear_loop();
    let events = events.borrow();
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], LoopEvent::Changed(_)));
    assert_eq!(events[1], LoopEvent::Cleared);
}
