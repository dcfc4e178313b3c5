//! Autofocus state machine
//!
//! [`AutoFocus::add`] is fed one `(position, hfd)` sample per captured frame
//! and answers with the next focuser move. The run sweeps out to one side of
//! the starting position, steps back across it, fills in whichever side of
//! the curve minimum is short of samples, and finally fits the curve selected
//! by [`FittingMode`] to pick the best focus position.
//!
//! The caller owns the focuser and the camera. Nothing here performs I/O.

use crate::options::{AutoFocusOptions, FittingMode};
use crate::point::{insert_sorted, mid_point, unzip, Point};
use crate::regression::{
    hyperbolic_regression, quadratic_regression, regression_score, trend_line_regression, HyperbolicRegression,
    PolynomialRegression, TrendLineMethod, TrendLineRegression,
};
use std::fmt;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoFocusState {
    /// Waiting for the first sample
    Idle,
    /// Collecting samples
    Sampling,
    /// A terminal step has been returned
    Done,
}

/// Why a run gave up
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum FailureReason {
    MaxFocusPointsExceeded,
    PositionLimitReached,
    NotEnoughSpreadPoints,
    MissingFit,
    FocusPointOutOfRange,
    PoorFitQuality,
    /// `add` was called after the run ended
    AlreadyFinished,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureReason::MaxFocusPointsExceeded => "maximum number of focus points exceeded",
            FailureReason::PositionLimitReached => "focuser reached its minimum or maximum position",
            FailureReason::NotEnoughSpreadPoints => "not enough spread points",
            FailureReason::MissingFit => "no fit available for the fitting mode",
            FailureReason::FocusPointOutOfRange => "focus point is outside the measured range",
            FailureReason::PoorFitQuality => "fit quality is below threshold",
            FailureReason::AlreadyFinished => "autofocus already finished",
        };
        f.write_str(text)
    }
}

/// What the caller should do next
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutoFocusStep {
    /// Move the focuser by `relative` steps, then capture
    Move { relative: f64 },
    /// Move the focuser to `absolute`, then capture
    MoveTo { absolute: f64 },
    /// Give up and return the focuser to `restore_position`
    Failed { restore_position: f64, reason: FailureReason },
    /// Best focus found at `position`
    Completed { position: f64 },
}

impl AutoFocusStep {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AutoFocusStep::Failed { .. } | AutoFocusStep::Completed { .. })
    }

    /// Absolute position this step asks for, given the focuser is at `current`
    pub fn target(&self, current: f64) -> f64 {
        match *self {
            AutoFocusStep::Move { relative } => current + relative,
            AutoFocusStep::MoveTo { absolute } => absolute,
            AutoFocusStep::Failed { restore_position, .. } => restore_position,
            AutoFocusStep::Completed { position } => position,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// One autofocus run
#[derive(Debug, Clone)]
pub struct AutoFocus {
    options: AutoFocusOptions,
    state: AutoFocusState,
    initial_focus_position: f64,
    remaining_steps: u32,
    focus_points: Vec<Point>,
    trend_line: Option<TrendLineRegression>,
    parabolic: Option<PolynomialRegression>,
    hyperbolic: Option<HyperbolicRegression>,
}

impl AutoFocus {
    pub fn new(options: AutoFocusOptions) -> Self {
        Self {
            options,
            state: AutoFocusState::Idle,
            initial_focus_position: 0.0,
            remaining_steps: 0,
            focus_points: Vec::new(),
            trend_line: None,
            parabolic: None,
            hyperbolic: None,
        }
    }

    pub fn options(&self) -> &AutoFocusOptions {
        &self.options
    }

    pub fn state(&self) -> AutoFocusState {
        self.state
    }

    /// Position recorded by the first sample, where a failed run returns to
    pub fn initial_focus_position(&self) -> f64 {
        self.initial_focus_position
    }

    /// Samples collected so far, sorted by position
    pub fn focus_points(&self) -> &[Point] {
        &self.focus_points
    }

    pub fn trend_line(&self) -> Option<&TrendLineRegression> {
        self.trend_line.as_ref()
    }

    pub fn parabolic(&self) -> Option<&PolynomialRegression> {
        self.parabolic.as_ref()
    }

    pub fn hyperbolic(&self) -> Option<&HyperbolicRegression> {
        self.hyperbolic.as_ref()
    }

    /// Best focus candidate for the configured fitting mode, if the fits it needs exist
    pub fn final_focus_point(&self) -> Option<Point> {
        let intersection = self.trend_line.as_ref().map(|t| t.intersection);
        let parabolic = self.parabolic.as_ref().and_then(|p| p.minimum());
        let hyperbolic = self.hyperbolic.as_ref().map(|h| h.minimum);

        match self.options.fitting_mode {
            FittingMode::Trendlines => intersection,
            FittingMode::Parabolic => parabolic,
            FittingMode::Hyperbolic => hyperbolic,
            FittingMode::TrendParabolic => Some(mid_point(parabolic?, intersection?)),
            FittingMode::TrendHyperbolic => Some(mid_point(hyperbolic?, intersection?)),
        }
    }

    /// Feed the sample taken at `position` and get the next step.
    ///
    /// `position` must be where the focuser actually is, not where it was asked to go.
    /// Once a terminal step has been returned every further call fails with
    /// [`FailureReason::AlreadyFinished`] and leaves the session untouched.
    pub fn add(&mut self, position: f64, hfd: f64) -> AutoFocusStep {
        match self.state {
            AutoFocusState::Idle => {
                self.initial_focus_position = position;
                self.remaining_steps = self.options.initial_offset_steps.saturating_add(1);
                self.state = AutoFocusState::Sampling;

                let relative = self.direction() * self.options.initial_offset_steps as f64 * self.options.step_size;

                tracing::debug!(
                    "Autofocus started at position {}: mode={:?}, moving {} to the outermost sample",
                    position,
                    self.options.fitting_mode,
                    relative
                );

                AutoFocusStep::Move { relative }
            }
            AutoFocusState::Sampling => self.sample(position, hfd),
            AutoFocusState::Done => {
                tracing::debug!("Autofocus already finished, ignoring sample at position {}", position);
                self.failed(FailureReason::AlreadyFinished)
            }
        }
    }

    fn direction(&self) -> f64 {
        if self.options.reversed {
            -1.0
        } else {
            1.0
        }
    }

    fn sample(&mut self, position: f64, hfd: f64) -> AutoFocusStep {
        self.compute_regression(position, hfd);

        if self.remaining_steps > 0 {
            self.remaining_steps -= 1;
            return AutoFocusStep::Move {
                relative: self.direction() * -self.options.step_size,
            };
        }

        if self.has_enough_points() {
            return self.determine_final_focus_point();
        }

        if self.focus_points.len() >= self.options.maximum_focus_points() {
            tracing::warn!(
                "Autofocus failed: maximum number of focus points ({}) exceeded",
                self.options.maximum_focus_points()
            );
            return self.fail(FailureReason::MaxFocusPointsExceeded);
        }

        let max_position = self.options.max_position;
        if position <= 0.0 || (max_position > 0.0 && position >= max_position) {
            tracing::warn!(
                "Autofocus failed: focuser reached position {} (limits 0..{})",
                position,
                max_position
            );
            return self.fail(FailureReason::PositionLimitReached);
        }

        self.evaluate_trend_line(position)
    }

    fn compute_regression(&mut self, position: f64, hfd: f64) {
        insert_sorted(&mut self.focus_points, Point::new(position, hfd));

        let (x, y) = unzip(&self.focus_points);

        self.trend_line = Some(trend_line_regression(&x, &y, TrendLineMethod::Simple));

        if x.len() >= 3 {
            let mode = self.options.fitting_mode;
            if mode.uses_parabolic() {
                self.parabolic = Some(quadratic_regression(&x, &y));
            } else if mode.uses_hyperbolic() {
                self.hyperbolic = Some(hyperbolic_regression(&x, &y));
            }
        }

        tracing::debug!(
            "Focus point {} at position {}: HFD = {:.3}",
            self.focus_points.len(),
            position,
            hfd
        );
    }

    /// Samples usable on one side of the trend line minimum.
    ///
    /// Zero-HFD samples count even though the trend line ignores them.
    fn side_count(&self, side: Side) -> usize {
        let Some(trend) = &self.trend_line else {
            return 0;
        };

        let minimum = trend.minimum.x;
        let on_side = |p: &Point| match side {
            Side::Left => p.x < minimum,
            Side::Right => p.x > minimum,
        };

        let fitted = match side {
            Side::Left => trend.left_points.len(),
            Side::Right => trend.right_points.len(),
        };
        let zeros = self.focus_points.iter().filter(|p| on_side(p) && p.y == 0.0).count();

        fitted + zeros
    }

    fn has_enough_points(&self) -> bool {
        let needed = self.options.initial_offset_steps as usize;
        self.trend_line.is_some() && self.side_count(Side::Left) >= needed && self.side_count(Side::Right) >= needed
    }

    fn evaluate_trend_line(&mut self, position: f64) -> AutoFocusStep {
        let Some(trend) = &self.trend_line else {
            tracing::warn!("Autofocus failed: no trend line available");
            return self.fail(FailureReason::MissingFit);
        };

        if trend.left_points.is_empty() && trend.right_points.is_empty() {
            tracing::warn!("Autofocus failed: not enough spread points");
            return self.fail(FailureReason::NotEnoughSpreadPoints);
        }

        let needed = self.options.initial_offset_steps as usize;
        let step_size = self.options.step_size;

        // Fill the left side first, then the right, one step beyond the outermost sample
        if self.side_count(Side::Left) < needed {
            let first = self.focus_points[0].x.trunc();
            tracing::debug!("More data points needed to the left of the minimum");

            if position != first {
                AutoFocusStep::MoveTo { absolute: first }
            } else {
                AutoFocusStep::Move { relative: -step_size }
            }
        } else if self.side_count(Side::Right) < needed {
            let last = self.focus_points[self.focus_points.len() - 1].x.trunc();
            tracing::debug!("More data points needed to the right of the minimum");

            if position != last {
                AutoFocusStep::MoveTo { absolute: last }
            } else {
                AutoFocusStep::Move { relative: step_size }
            }
        } else {
            self.determine_final_focus_point()
        }
    }

    fn determine_final_focus_point(&mut self) -> AutoFocusStep {
        let Some(focus_point) = self.final_focus_point() else {
            tracing::warn!(
                "Autofocus failed: no {:?} fit available, restoring focus position {}",
                self.options.fitting_mode,
                self.initial_focus_position
            );
            return self.fail(FailureReason::MissingFit);
        };

        if let Err(reason) = self.validate_focus_point(focus_point) {
            tracing::warn!(
                "Potentially bad autofocus ({}), restoring focus position {}",
                reason,
                self.initial_focus_position
            );
            return self.fail(reason);
        }

        self.state = AutoFocusState::Done;

        tracing::info!(
            "Autofocus complete: position = {:.1}, HFD = {:.3}, points = {}",
            focus_point.x,
            focus_point.y,
            self.focus_points.len()
        );

        AutoFocusStep::Completed {
            position: focus_point.x,
        }
    }

    fn validate_focus_point(&self, focus_point: Point) -> Result<(), FailureReason> {
        let (Some(first), Some(last)) = (self.focus_points.first(), self.focus_points.last()) else {
            return Err(FailureReason::MissingFit);
        };

        if !(focus_point.x >= first.x && focus_point.x <= last.x) {
            tracing::debug!(
                "Focus point {} is outside the measured range {}..{}",
                focus_point.x,
                first.x,
                last.x
            );
            return Err(FailureReason::FocusPointOutOfRange);
        }

        let Some(threshold) = self.options.rmsd_threshold.filter(|t| *t > 0.0) else {
            return Ok(());
        };

        let mode = self.options.fitting_mode;
        let (x, y) = unzip(&self.focus_points);
        let mut ratios = Vec::with_capacity(3);

        if mode.uses_parabolic() {
            let parabolic = self.parabolic.as_ref().ok_or(FailureReason::MissingFit)?;
            ratios.push(regression_score(parabolic, &x, &y).rmsd / focus_point.y);
        }

        if mode.uses_hyperbolic() {
            let hyperbolic = self.hyperbolic.as_ref().ok_or(FailureReason::MissingFit)?;
            ratios.push(regression_score(hyperbolic, &x, &y).rmsd / focus_point.y);
        }

        if mode.uses_trend_lines() {
            let trend = self.trend_line.as_ref().ok_or(FailureReason::MissingFit)?;
            ratios.push(trend.left_score().rmsd / focus_point.y);
            ratios.push(trend.right_score().rmsd / focus_point.y);
        }

        if ratios.iter().all(|ratio| *ratio <= threshold) {
            Ok(())
        } else {
            tracing::debug!("RMSD ratios {:?} exceed threshold {}", ratios, threshold);
            Err(FailureReason::PoorFitQuality)
        }
    }

    fn fail(&mut self, reason: FailureReason) -> AutoFocusStep {
        self.state = AutoFocusState::Done;
        self.failed(reason)
    }

    fn failed(&self, reason: FailureReason) -> AutoFocusStep {
        AutoFocusStep::Failed {
            restore_position: self.initial_focus_position,
            reason,
        }
    }
}
