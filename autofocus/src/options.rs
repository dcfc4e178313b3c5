//! Autofocus run configuration

use crate::error::{FocusError, FocusResult};

/// Curve used to locate best focus
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum FittingMode {
    /// Intersection of the two trend lines
    Trendlines,
    /// Vertex of a quadratic fit
    Parabolic,
    /// Midpoint of the parabola vertex and the trend line intersection
    TrendParabolic,
    /// Vertex of a hyperbolic fit
    Hyperbolic,
    /// Midpoint of the hyperbola vertex and the trend line intersection
    TrendHyperbolic,
}

impl Default for FittingMode {
    fn default() -> Self {
        Self::Hyperbolic
    }
}

impl FittingMode {
    pub fn uses_parabolic(self) -> bool {
        matches!(self, FittingMode::Parabolic | FittingMode::TrendParabolic)
    }

    pub fn uses_hyperbolic(self) -> bool {
        matches!(self, FittingMode::Hyperbolic | FittingMode::TrendHyperbolic)
    }

    /// Whether the trend line halves take part in the fit quality check
    pub fn uses_trend_lines(self) -> bool {
        matches!(
            self,
            FittingMode::Trendlines | FittingMode::TrendParabolic | FittingMode::TrendHyperbolic
        )
    }
}

/// Autofocus options
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct AutoFocusOptions {
    /// Samples taken on each side of the starting position
    #[serde(default = "default_initial_offset_steps")]
    pub initial_offset_steps: u32,

    /// Focuser steps between samples
    #[serde(default = "default_step_size")]
    pub step_size: f64,

    #[serde(default)]
    pub fitting_mode: FittingMode,

    /// Maximum `rmsd / focus_hfd` accepted for the fits in use. `None` or 0 disables the check.
    #[serde(default)]
    pub rmsd_threshold: Option<f64>,

    /// Sweep starts inward instead of outward
    #[serde(default)]
    pub reversed: bool,

    /// Upper travel limit of the focuser
    #[serde(default = "default_max_position")]
    pub max_position: f64,
}

impl Default for AutoFocusOptions {
    fn default() -> Self {
        Self {
            initial_offset_steps: default_initial_offset_steps(),
            step_size: default_step_size(),
            fitting_mode: FittingMode::default(),
            rmsd_threshold: None,
            reversed: false,
            max_position: default_max_position(),
        }
    }
}

fn default_initial_offset_steps() -> u32 {
    4
}

fn default_step_size() -> f64 {
    100.0
}

fn default_max_position() -> f64 {
    100000.0
}

impl AutoFocusOptions {
    /// Largest number of samples a run may collect before giving up
    pub fn maximum_focus_points(&self) -> usize {
        self.initial_offset_steps as usize * 10
    }

    pub fn validate(&self) -> FocusResult<()> {
        if self.initial_offset_steps == 0 {
            return Err(FocusError::InvalidOptions("initial_offset_steps must be at least 1".to_string()));
        }

        if !(self.step_size.is_finite() && self.step_size > 0.0) {
            return Err(FocusError::InvalidOptions(format!(
                "step_size must be positive, got {}",
                self.step_size
            )));
        }

        if !(self.max_position.is_finite() && self.max_position > 0.0) {
            return Err(FocusError::InvalidOptions(format!(
                "max_position must be positive, got {}",
                self.max_position
            )));
        }

        if let Some(threshold) = self.rmsd_threshold {
            if !(threshold.is_finite() && threshold >= 0.0) {
                return Err(FocusError::InvalidOptions(format!(
                    "rmsd_threshold must be a non-negative number, got {}",
                    threshold
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = AutoFocusOptions::default();
        assert_eq!(options.initial_offset_steps, 4);
        assert_eq!(options.step_size, 100.0);
        assert_eq!(options.fitting_mode, FittingMode::Hyperbolic);
        assert_eq!(options.rmsd_threshold, None);
        assert!(!options.reversed);
        assert_eq!(options.max_position, 100000.0);
        assert_eq!(options.maximum_focus_points(), 40);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut options = AutoFocusOptions::default();
        options.initial_offset_steps = 0;
        assert!(options.validate().is_err());

        let mut options = AutoFocusOptions::default();
        options.step_size = 0.0;
        assert!(options.validate().is_err());

        let mut options = AutoFocusOptions::default();
        options.step_size = f64::NAN;
        assert!(options.validate().is_err());

        let mut options = AutoFocusOptions::default();
        options.max_position = -1.0;
        assert!(options.validate().is_err());

        let mut options = AutoFocusOptions::default();
        options.rmsd_threshold = Some(-0.1);
        assert!(matches!(options.validate(), Err(FocusError::InvalidOptions(_))));

        let mut options = AutoFocusOptions::default();
        options.rmsd_threshold = Some(0.0);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_mode_fits() {
        assert!(FittingMode::TrendParabolic.uses_parabolic());
        assert!(!FittingMode::TrendParabolic.uses_hyperbolic());
        assert!(FittingMode::Hyperbolic.uses_hyperbolic());
        assert!(!FittingMode::Hyperbolic.uses_trend_lines());
        assert!(FittingMode::Trendlines.uses_trend_lines());
    }

    #[test]
    fn test_serde() {
        let options: AutoFocusOptions =
            serde_json::from_str(r#"{"fitting_mode":"TrendHyperbolic","rmsd_threshold":0.15}"#).unwrap();
        assert_eq!(options.fitting_mode, FittingMode::TrendHyperbolic);
        assert_eq!(options.rmsd_threshold, Some(0.15));
        assert_eq!(options.initial_offset_steps, 4);

        let json = serde_json::to_string(&options).unwrap();
        let deserialized: AutoFocusOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(options, deserialized);
    }
}
