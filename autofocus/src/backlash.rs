//! Backlash compensation
//!
//! Corrects commanded focuser positions for mechanical slack when the
//! direction of travel reverses. `Absolute` keeps a running offset that is
//! added to every target, `Overshoot` drives past the target and comes back
//! so the final approach always takes up the slack.

use crate::error::{FocusError, FocusResult};

/// How backlash is corrected
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum BacklashMode {
    /// Targets pass through unchanged
    None,
    /// Accumulate a persistent offset on each reversal
    Absolute,
    /// Overshoot the target and approach it from the other side
    Overshoot,
}

impl Default for BacklashMode {
    fn default() -> Self {
        Self::None
    }
}

/// Direction of the last commanded move
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum OvershootDirection {
    None,
    /// Towards lower positions
    In,
    /// Towards higher positions
    Out,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct BacklashCompensation {
    #[serde(default)]
    pub mode: BacklashMode,

    /// Steps of slack when reversing inward
    #[serde(default)]
    pub backlash_in: f64,

    /// Steps of slack when reversing outward
    #[serde(default)]
    pub backlash_out: f64,
}

impl Default for BacklashCompensation {
    fn default() -> Self {
        Self {
            mode: BacklashMode::None,
            backlash_in: 0.0,
            backlash_out: 0.0,
        }
    }
}

impl BacklashCompensation {
    pub fn validate(&self) -> FocusResult<()> {
        for (name, value) in [("backlash_in", self.backlash_in), ("backlash_out", self.backlash_out)] {
            if !value.is_finite() {
                return Err(FocusError::InvalidBacklash(format!("{} must be finite", name)));
            }
            if value < 0.0 {
                return Err(FocusError::InvalidBacklash(format!("{} must not be negative, got {}", name, value)));
            }
        }
        Ok(())
    }
}

/// Per-run backlash state
#[derive(Debug, Clone)]
pub struct BacklashCompensator {
    config: BacklashCompensation,
    max_position: f64,
    offset: f64,
    last_direction: OvershootDirection,
}

impl BacklashCompensator {
    pub fn new(config: BacklashCompensation, max_position: f64) -> Self {
        Self {
            config,
            max_position,
            offset: 0.0,
            last_direction: OvershootDirection::None,
        }
    }

    /// Accumulated offset, only ever non-zero in `Absolute` mode
    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn last_direction(&self) -> OvershootDirection {
        self.last_direction
    }

    pub fn config(&self) -> &BacklashCompensation {
        &self.config
    }

    /// Positions to command, in order, to reach `target` from `current`.
    ///
    /// Returns two positions when an overshoot leg is needed, one otherwise.
    pub fn compute(&mut self, target: f64, current: f64) -> Vec<f64> {
        let mut position = target;

        match self.config.mode {
            BacklashMode::None => {}
            BacklashMode::Absolute => {
                let adjusted = target + self.offset;

                if adjusted < 0.0 {
                    self.offset = 0.0;
                    position = 0.0;
                } else if adjusted > self.max_position {
                    self.offset = 0.0;
                    position = self.max_position;
                } else {
                    let compensation = self.absolute_compensation(current, adjusted);
                    self.offset += compensation;
                    position = (adjusted + compensation).min(self.max_position).max(0.0);
                }
            }
            BacklashMode::Overshoot => {
                let compensation = self.overshoot_compensation(current, target);

                if compensation != 0.0 {
                    let overshoot = target + compensation;

                    if overshoot >= 0.0 && overshoot <= self.max_position {
                        self.last_direction = self.moving_direction(overshoot, target);
                        return vec![overshoot, target];
                    }

                    tracing::debug!(
                        "Overshoot to {} is outside [0, {}], moving directly to {}",
                        overshoot,
                        self.max_position,
                        target
                    );
                }
            }
        }

        self.last_direction = self.moving_direction(current, position);
        vec![position]
    }

    fn moving_direction(&self, from: f64, to: f64) -> OvershootDirection {
        if to > from {
            OvershootDirection::Out
        } else if to < from {
            OvershootDirection::In
        } else {
            self.last_direction
        }
    }

    // Only a reversal picks up slack
    fn absolute_compensation(&self, from: f64, to: f64) -> f64 {
        match (self.moving_direction(from, to), self.last_direction) {
            (OvershootDirection::In, OvershootDirection::Out) => -self.config.backlash_in,
            (OvershootDirection::Out, OvershootDirection::In) => self.config.backlash_out,
            _ => 0.0,
        }
    }

    fn overshoot_compensation(&self, from: f64, to: f64) -> f64 {
        match self.moving_direction(from, to) {
            OvershootDirection::In if self.config.backlash_in != 0.0 => -self.config.backlash_in,
            OvershootDirection::Out if self.config.backlash_out != 0.0 => self.config.backlash_out,
            _ => 0.0,
        }
    }
}
