//! Device Operations Traits
//!
//! The interface the autofocus instruction needs from the focuser and from
//! whatever measures star blur. Real implementations wrap Alpaca, INDI or
//! ASCOM drivers; [`SimulatedFocuser`] stands in for both when testing.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Result type for device operations
pub type DeviceResult<T> = Result<T, String>;

/// Focuser control needed by autofocus
#[async_trait]
pub trait FocuserOps: Send + Sync {
    /// Move focuser to absolute position
    async fn focuser_move_to(&self, position: i32) -> DeviceResult<()>;

    /// Get current focuser position
    async fn focuser_get_position(&self) -> DeviceResult<i32>;

    /// Check if focuser is moving
    async fn focuser_is_moving(&self) -> DeviceResult<bool>;

    /// Halt focuser movement
    async fn focuser_halt(&self) -> DeviceResult<()>;
}

/// Source of focus measurements
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    /// Capture a frame at the current focuser position and return its median star HFD
    async fn capture_blur_measurement(&self) -> DeviceResult<f64>;
}

/// Simulated focuser optics
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SimulatedFocuserConfig {
    /// Optical position of best focus
    #[serde(default = "default_best_focus")]
    pub best_focus: f64,

    /// HFD at best focus
    #[serde(default = "default_minimum_hfd")]
    pub minimum_hfd: f64,

    /// Distance from best focus at which HFD has grown by a factor of sqrt(2)
    #[serde(default = "default_curve_width")]
    pub curve_width: f64,

    /// Peak amplitude of uniform HFD noise
    #[serde(default)]
    pub noise: f64,

    /// Seed for the noise generator
    #[serde(default)]
    pub seed: u64,

    /// Mechanical slack in steps, lost on every reversal
    #[serde(default)]
    pub backlash: f64,

    #[serde(default = "default_max_position")]
    pub max_position: i32,

    /// Time a move takes to finish
    #[serde(default)]
    pub move_duration_ms: u64,
}

impl Default for SimulatedFocuserConfig {
    fn default() -> Self {
        Self {
            best_focus: default_best_focus(),
            minimum_hfd: default_minimum_hfd(),
            curve_width: default_curve_width(),
            noise: 0.0,
            seed: 0,
            backlash: 0.0,
            max_position: default_max_position(),
            move_duration_ms: 0,
        }
    }
}

fn default_best_focus() -> f64 {
    25000.0
}

fn default_minimum_hfd() -> f64 {
    1.3
}

fn default_curve_width() -> f64 {
    250.0
}

fn default_max_position() -> i32 {
    100000
}

struct SimulatedState {
    position: i32,
    optical_position: f64,
    moving_until: Instant,
    rng: StdRng,
}

/// A focuser and camera pair over a hyperbolic V-curve
///
/// The optical position trails the reported position by up to `backlash`
/// steps: it sits on the reported position after inward moves and `backlash`
/// steps short of it after outward moves.
pub struct SimulatedFocuser {
    config: SimulatedFocuserConfig,
    state: Mutex<SimulatedState>,
}

impl SimulatedFocuser {
    pub fn new(config: SimulatedFocuserConfig, position: i32) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            state: Mutex::new(SimulatedState {
                position,
                optical_position: position as f64,
                moving_until: Instant::now(),
                rng,
            }),
        }
    }

    pub fn config(&self) -> &SimulatedFocuserConfig {
        &self.config
    }

    /// Where the optics actually are, after backlash
    pub async fn optical_position(&self) -> f64 {
        self.state.lock().await.optical_position
    }

    /// Noise-free HFD at an optical position
    pub fn hfd_at(&self, optical_position: f64) -> f64 {
        let defocus = (optical_position - self.config.best_focus) / self.config.curve_width;
        self.config.minimum_hfd * (1.0 + defocus * defocus).sqrt()
    }
}

#[async_trait]
impl FocuserOps for SimulatedFocuser {
    async fn focuser_move_to(&self, position: i32) -> DeviceResult<()> {
        if position < 0 || position > self.config.max_position {
            return Err(format!(
                "Position {} is outside the focuser range 0..{}",
                position, self.config.max_position
            ));
        }

        let mut state = self.state.lock().await;
        let target = position as f64;
        let slack = self.config.backlash.max(0.0);

        state.optical_position = state.optical_position.max(target - slack).min(target);
        state.position = position;
        state.moving_until = Instant::now() + Duration::from_millis(self.config.move_duration_ms);

        tracing::debug!(
            "[SIM] Moving focuser to {} (optical {:.1})",
            position,
            state.optical_position
        );
        Ok(())
    }

    async fn focuser_get_position(&self) -> DeviceResult<i32> {
        Ok(self.state.lock().await.position)
    }

    async fn focuser_is_moving(&self) -> DeviceResult<bool> {
        Ok(Instant::now() < self.state.lock().await.moving_until)
    }

    async fn focuser_halt(&self) -> DeviceResult<()> {
        tracing::info!("[SIM] Halting focuser");
        self.state.lock().await.moving_until = Instant::now();
        Ok(())
    }
}

#[async_trait]
impl MeasurementSource for SimulatedFocuser {
    async fn capture_blur_measurement(&self) -> DeviceResult<f64> {
        let mut state = self.state.lock().await;
        let mut hfd = self.hfd_at(state.optical_position);

        if self.config.noise > 0.0 {
            hfd += state.rng.gen_range(-self.config.noise..=self.config.noise);
        }

        tracing::debug!("[SIM] Calculated HFD: {:.3}", hfd);
        Ok(hfd.max(0.0))
    }
}
