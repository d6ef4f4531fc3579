//! # Follow Configuration
//!
//! Tuning constants for beat tracking, loop wrapping and gesture detection,
//! loadable from YAML.
//!
//! ## Tick Resolution
//! Every tick-valued constant is tuned for 960 ticks per quarter note. A
//! clock with a different resolution should start from
//! [`FollowConfig::for_resolution`], which re-derives each constant as the
//! same fraction of a quarter note instead of reusing absolute tick counts.
//!
//! ## Example
//! ```rust
//! use score_cursor::{FollowConfig, WrapPolicy};
//!
//! let config = FollowConfig::from_yaml(r#"
//! wrap-policy: manual
//! wrap-margin: 20
//! "#).unwrap();
//!
//! assert_eq!(config.wrap_policy, WrapPolicy::Manual);
//! assert_eq!(config.wrap_margin, 20);
//! assert_eq!(config.forward_scan_limit, 4000); // untouched fields keep defaults
//! ```

use crate::error::CursorError;
use crate::types::{Granularity, Tick, WrapPolicy};
use serde::{Deserialize, Serialize};

/// Resolution the default constants are expressed in.
pub const DEFAULT_TICKS_PER_QUARTER: Tick = 960;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FollowConfig {
    /// Clock resolution
    pub ticks_per_quarter: Tick,
    /// Tick delta between consecutive clock events treated as a jump
    pub discontinuity_threshold: Tick,
    /// Bound of the backward beat-boundary scan
    pub backward_scan_limit: Tick,
    /// Bound of the forward next-beat scan
    pub forward_scan_limit: Tick,
    /// Bound of the backward scan that finds a loop's last sounding beat
    pub end_scan_limit: Tick,
    /// Step of that scan
    pub end_scan_step: Tick,
    /// Manual wrap fires once the tick reaches `end - wrap_margin`
    pub wrap_margin: Tick,
    pub wrap_policy: WrapPolicy,
    pub granularity: Granularity,
    /// Resolve proportional in-beat ticks instead of snapping to boundaries
    pub fine_hit_testing: bool,
    /// Pointer travel in pixels before a press becomes a drag
    pub drag_threshold: f64,
    /// Cursor moves smaller than this many pixels are not emitted
    pub min_pixel_delta: f64,
    /// Progress at which a paused cursor pins to its beat anchor
    pub paused_pin_progress: f64,
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            ticks_per_quarter: DEFAULT_TICKS_PER_QUARTER,
            discontinuity_threshold: 3840,
            backward_scan_limit: 2000,
            forward_scan_limit: 4000,
            end_scan_limit: 3840,
            end_scan_step: 10,
            wrap_margin: 0,
            wrap_policy: WrapPolicy::Declarative,
            granularity: Granularity::Bar,
            fine_hit_testing: false,
            drag_threshold: 4.0,
            min_pixel_delta: 0.25,
            paused_pin_progress: 0.999,
        }
    }
}

impl FollowConfig {
    /// Parse a YAML document. Missing fields take their defaults.
    pub fn from_yaml(content: &str) -> Result<Self, CursorError> {
        let config: FollowConfig =
            serde_yaml::from_str(content).map_err(|e| CursorError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults rescaled to another clock resolution.
    ///
    /// ```
    /// # use score_cursor::FollowConfig;
    /// let config = FollowConfig::for_resolution(480);
    /// assert_eq!(config.discontinuity_threshold, 1920);
    /// assert_eq!(config.backward_scan_limit, 1000);
    /// ```
    pub fn for_resolution(ticks_per_quarter: Tick) -> Self {
        let base = Self::default();
        let scale = |ticks: Tick| -> Tick {
            (ticks as i128 * ticks_per_quarter as i128 / DEFAULT_TICKS_PER_QUARTER as i128) as Tick
        };
        Self {
            ticks_per_quarter,
            discontinuity_threshold: scale(base.discontinuity_threshold),
            backward_scan_limit: scale(base.backward_scan_limit),
            forward_scan_limit: scale(base.forward_scan_limit),
            end_scan_limit: scale(base.end_scan_limit),
            end_scan_step: scale(base.end_scan_step).max(1),
            wrap_margin: scale(base.wrap_margin),
            ..base
        }
    }

    pub fn validate(&self) -> Result<(), CursorError> {
        let positive = [
            ("ticks-per-quarter", self.ticks_per_quarter),
            ("discontinuity-threshold", self.discontinuity_threshold),
            ("backward-scan-limit", self.backward_scan_limit),
            ("forward-scan-limit", self.forward_scan_limit),
            ("end-scan-limit", self.end_scan_limit),
            ("end-scan-step", self.end_scan_step),
        ];
        for (name, value) in positive {
            if value <= 0 {
                return Err(CursorError::ConfigError(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if self.wrap_margin < 0 {
            return Err(CursorError::ConfigError(format!(
                "wrap-margin must not be negative, got {}",
                self.wrap_margin
            )));
        }
        if !(self.drag_threshold >= 0.0) {
            return Err(CursorError::ConfigError(format!(
                "drag-threshold must not be negative, got {}",
                self.drag_threshold
            )));
        }
        if !(self.min_pixel_delta >= 0.0) {
            return Err(CursorError::ConfigError(format!(
                "min-pixel-delta must not be negative, got {}",
                self.min_pixel_delta
            )));
        }
        if !(0.0..=1.0).contains(&self.paused_pin_progress) {
            return Err(CursorError::ConfigError(format!(
                "paused-pin-progress must be within 0..=1, got {}",
                self.paused_pin_progress
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_gives_defaults() {
        // serde_yaml treats an empty document as unit, so use an empty mapping
        let config = FollowConfig::from_yaml("{}").unwrap();
        assert_eq!(config, FollowConfig::default());
    }

    #[test]
    fn test_granularity_and_fine_mode() {
        let config = FollowConfig::from_yaml("granularity: beat\nfine-hit-testing: true").unwrap();
        assert_eq!(config.granularity, Granularity::Beat);
        assert!(config.fine_hit_testing);
    }

    #[test]
    fn test_unknown_policy_is_config_error() {
        let result = FollowConfig::from_yaml("wrap-policy: sideways");
        assert!(matches!(result, Err(CursorError::ConfigError(_))));
    }

    #[test]
    fn test_negative_margin_rejected() {
        let result = FollowConfig::from_yaml("wrap-margin: -5");
        if let Err(CursorError::ConfigError(message)) = result {
            assert!(message.contains("wrap-margin"));
        } else {
            panic!("Expected ConfigError but got: {:?}", result);
        }
    }

    #[test]
    fn test_zero_scan_limit_rejected() {
        assert!(FollowConfig::from_yaml("forward-scan-limit: 0").is_err());
    }

    #[test]
    fn test_for_resolution_keeps_ratios() {
        let config = FollowConfig::for_resolution(1920);
        assert_eq!(config.ticks_per_quarter, 1920);
        assert_eq!(config.discontinuity_threshold, 7680);
        assert_eq!(config.forward_scan_limit, 8000);
        assert_eq!(config.end_scan_step, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_for_resolution_step_never_zero() {
        let config = FollowConfig::for_resolution(24);
        assert_eq!(config.end_scan_step, 1);
    }
}
