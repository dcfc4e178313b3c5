//! Autofocus instruction implementation
//!
//! Drives an [`AutoFocus`] session against a focuser and a measurement source:
//! every step the engine asks for is routed through the backlash compensator,
//! a frame is measured at the reached position, and the sample is fed back
//! until the run completes or fails.

use crate::device_ops::{FocuserOps, MeasurementSource};
use chrono::{DateTime, Utc};
use nightshade_autofocus::{
    AutoFocus, AutoFocusOptions, AutoFocusStep, BacklashCompensation, BacklashCompensator, FailureReason,
    FittingMode, FocusError, Point,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use uuid::Uuid;

/// Autofocus instruction configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AutofocusRunConfig {
    #[serde(default)]
    pub options: AutoFocusOptions,

    #[serde(default)]
    pub backlash: BacklashCompensation,

    /// Settling delay after each focuser move (milliseconds)
    #[serde(default)]
    pub settling_time_ms: u64,

    /// Timeout for a single focuser move (seconds)
    #[serde(default = "default_move_timeout_secs")]
    pub move_timeout_secs: u64,

    /// Hard limit on captured frames
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for AutofocusRunConfig {
    fn default() -> Self {
        Self {
            options: AutoFocusOptions::default(),
            backlash: BacklashCompensation::default(),
            settling_time_ms: 0,
            move_timeout_secs: default_move_timeout_secs(),
            max_steps: default_max_steps(),
        }
    }
}

fn default_move_timeout_secs() -> u64 {
    120
}

fn default_max_steps() -> usize {
    1000
}

/// Errors that abort an autofocus run
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AutofocusRunError {
    #[error("Device error: {0}")]
    Device(String),

    #[error("Invalid autofocus configuration: {0}")]
    InvalidConfig(#[from] FocusError),

    #[error("Autofocus cancelled")]
    Cancelled,

    #[error("Autofocus exceeded {0} frames")]
    StepLimit(usize),
}

/// Outcome of a completed or failed autofocus run
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AutofocusReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    /// Best focus on success, otherwise the position the focuser was returned to
    pub final_position: f64,
    /// Fitted HFD at best focus
    pub final_hfd: Option<f64>,
    pub failure_reason: Option<FailureReason>,
    pub fitting_mode: FittingMode,
    pub data_points: Vec<Point>,
    /// Frames measured
    pub frames: usize,
}

/// Execute an autofocus run
///
/// The focuser starts wherever it currently is. A failed run returns it there
/// and still produces a report; only device errors, cancellation and the
/// frame limit surface as errors.
pub async fn execute_autofocus(
    config: &AutofocusRunConfig,
    focuser: &dyn FocuserOps,
    camera: &dyn MeasurementSource,
    cancellation_token: Arc<AtomicBool>,
    progress_callback: Option<&(dyn Fn(f64, String) + Send + Sync)>,
) -> Result<AutofocusReport, AutofocusRunError> {
    config.options.validate()?;
    config.backlash.validate()?;

    let run_id = Uuid::new_v4();
    let started_at = Utc::now();

    if let Some(cb) = progress_callback {
        cb(0.0, "Starting autofocus".to_string());
    }

    tracing::info!(
        "Starting autofocus: {:?} mode, {} steps, step size {}, backlash {:?}",
        config.options.fitting_mode,
        config.options.initial_offset_steps,
        config.options.step_size,
        config.backlash.mode
    );

    let start_position = focuser
        .focuser_get_position()
        .await
        .map_err(|e| AutofocusRunError::Device(format!("Failed to get focuser position: {}", e)))?;

    tracing::info!("Current focuser position: {}", start_position);

    let mut autofocus = AutoFocus::new(config.options.clone());
    let mut backlash = BacklashCompensator::new(config.backlash.clone(), config.options.max_position);
    let mut position = start_position as f64;
    let mut frames = 0;
    let expected_frames = config.options.initial_offset_steps as usize * 2 + 1;

    // The first sample only records the starting position
    let mut step = autofocus.add(position, 0.0);

    loop {
        match step {
            AutoFocusStep::Move { .. } | AutoFocusStep::MoveTo { .. } => {
                if cancellation_token.load(Ordering::Relaxed) {
                    tracing::info!("Autofocus cancelled, returning focuser to {}", start_position);
                    abort_run(focuser, start_position).await;
                    return Err(AutofocusRunError::Cancelled);
                }

                if frames >= config.max_steps {
                    tracing::warn!("Autofocus exceeded {} frames, returning focuser to {}", config.max_steps, start_position);
                    abort_run(focuser, start_position).await;
                    return Err(AutofocusRunError::StepLimit(config.max_steps));
                }

                let target = step.target(position);
                move_focuser(config, focuser, &mut backlash, target, position).await?;

                // The engine works in uncompensated positions
                let raw_position = focuser
                    .focuser_get_position()
                    .await
                    .map_err(|e| AutofocusRunError::Device(format!("Failed to get focuser position: {}", e)))?;
                position = raw_position as f64 - backlash.offset();

                let hfd = camera
                    .capture_blur_measurement()
                    .await
                    .map_err(|e| AutofocusRunError::Device(format!("Autofocus exposure failed: {}", e)))?;

                frames += 1;
                tracing::info!("Focus point {} at position {}: HFD = {:.2}", frames, position, hfd);

                if let Some(cb) = progress_callback {
                    let percent = (frames as f64 / expected_frames as f64 * 90.0).min(90.0);
                    cb(percent, format!("Focus point {} at position {}: HFD {:.2}", frames, position, hfd));
                }

                step = autofocus.add(position, hfd);
            }
            AutoFocusStep::Completed { position: best_position } => {
                let final_hfd = autofocus.final_focus_point().map(|p| p.y);

                tracing::info!(
                    "Autofocus complete: position = {:.1}, HFD = {:.2}, points = {}",
                    best_position,
                    final_hfd.unwrap_or(f64::NAN),
                    autofocus.focus_points().len()
                );

                move_focuser(config, focuser, &mut backlash, best_position, position).await?;

                if let Some(cb) = progress_callback {
                    cb(100.0, format!("Autofocus complete: position {:.0}", best_position));
                }

                return Ok(AutofocusReport {
                    run_id,
                    started_at,
                    finished_at: Utc::now(),
                    success: true,
                    final_position: best_position,
                    final_hfd,
                    failure_reason: None,
                    fitting_mode: config.options.fitting_mode,
                    data_points: autofocus.focus_points().to_vec(),
                    frames,
                });
            }
            AutoFocusStep::Failed {
                restore_position,
                reason,
            } => {
                tracing::warn!(
                    "Autofocus failed: {}, restoring focuser position {}",
                    reason,
                    restore_position
                );

                move_focuser(config, focuser, &mut backlash, restore_position, position).await?;

                if let Some(cb) = progress_callback {
                    cb(100.0, format!("Autofocus failed: {}", reason));
                }

                return Ok(AutofocusReport {
                    run_id,
                    started_at,
                    finished_at: Utc::now(),
                    success: false,
                    final_position: restore_position,
                    final_hfd: None,
                    failure_reason: Some(reason),
                    fitting_mode: config.options.fitting_mode,
                    data_points: autofocus.focus_points().to_vec(),
                    frames,
                });
            }
        }
    }
}

/// Move to `target` through the backlash compensator, waiting for each leg to finish
async fn move_focuser(
    config: &AutofocusRunConfig,
    focuser: &dyn FocuserOps,
    backlash: &mut BacklashCompensator,
    target: f64,
    current: f64,
) -> Result<(), AutofocusRunError> {
    let legs = backlash.compute(target, current);

    if legs.len() > 1 {
        tracing::info!(
            "Applying backlash compensation: {} -> {}",
            current,
            legs.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(" -> ")
        );
    }

    for leg in legs {
        let leg = leg.round() as i32;

        if let Err(e) = focuser.focuser_move_to(leg).await {
            tracing::warn!("Failed to move focuser to {}: {}", leg, e);
            return Err(AutofocusRunError::Device(format!("Failed to move focuser: {}", e)));
        }

        wait_for_focuser_idle(focuser, Duration::from_secs(config.move_timeout_secs)).await?;

        if config.settling_time_ms > 0 {
            sleep(Duration::from_millis(config.settling_time_ms)).await;
        }
    }

    Ok(())
}

async fn wait_for_focuser_idle(focuser: &dyn FocuserOps, timeout: Duration) -> Result<(), AutofocusRunError> {
    let start = std::time::Instant::now();
    loop {
        match focuser.focuser_is_moving().await {
            Ok(false) => {
                tracing::debug!("Focuser reached target position");
                return Ok(());
            }
            Ok(true) => {}
            Err(e) => {
                // Transient, keep polling
                tracing::warn!("Error checking focuser status: {}", e);
            }
        }

        if start.elapsed() > timeout {
            return Err(AutofocusRunError::Device(format!(
                "Focuser move timed out after {} seconds",
                timeout.as_secs()
            )));
        }

        sleep(Duration::from_millis(100)).await;
    }
}

/// Halt and send the focuser back without waiting, used when the run is abandoned
async fn abort_run(focuser: &dyn FocuserOps, start_position: i32) {
    if let Err(e) = focuser.focuser_halt().await {
        tracing::warn!("Failed to halt focuser: {}", e);
    }
    if let Err(e) = focuser.focuser_move_to(start_position).await {
        tracing::warn!("Failed to return focuser to {}: {}", start_position, e);
    }
}
