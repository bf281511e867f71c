//! Homing and absolute moves on a GRBL station
//!
//! [`MotionProtocol`] borrows a [`DeviceLink`] and layers the controller
//! operations on top of its line I/O.

use super::status_parser::StatusParser;
use super::{ACK, ALARM_STATE, ERROR_PREFIX, HOME_COMMAND, STATUS_QUERY};
use crate::communication::DeviceLink;
use stationkit_core::{ControllerError, MachinePosition, MotionRequest, Result};
use std::time::{Duration, Instant};

/// Controller operations over a borrowed link
pub struct MotionProtocol<'a> {
    link: &'a mut DeviceLink,
}

impl<'a> MotionProtocol<'a> {
    /// Drive `link`
    pub fn new(link: &'a mut DeviceLink) -> Self {
        Self { link }
    }

    /// The underlying link
    pub fn link(&mut self) -> &mut DeviceLink {
        self.link
    }

    /// Run the homing cycle and wait for the acknowledgement
    ///
    /// Waits at most the configured homing timeout. An `error:` reply from
    /// the controller fails immediately.
    pub fn home(&mut self) -> Result<()> {
        self.link.connect()?;

        let timeout = self.link.settings().homing_timeout();
        tracing::info!("Starting homing cycle");
        self.link.send(HOME_COMMAND)?;

        let started = Instant::now();
        loop {
            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                tracing::error!("Homing not acknowledged within {:?}", timeout);
                return Err(ControllerError::HomingTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                }
                .into());
            }

            let read_timeout = remaining.min(self.link.settings().timeout());
            match self.link.read(Some(read_timeout))? {
                Some(line) if line == ACK => {
                    tracing::info!("Homing complete");
                    return Ok(());
                }
                Some(line) if line.starts_with(ERROR_PREFIX) => {
                    tracing::error!("Homing rejected: {}", line);
                    return Err(ControllerError::HomingFailed { reason: line }.into());
                }
                Some(line) => tracing::debug!("Homing in progress: {}", line),
                None => {}
            }
        }
    }

    /// Move to absolute coordinates
    ///
    /// Polls the controller until it reports idle or the estimated travel
    /// time plus the safety margin has passed. Passing that deadline only
    /// logs a warning; an `error:` reply or an `Alarm` state fails the move. The call never returns before the estimated travel
    /// time has elapsed.
    pub fn move_to(&mut self, request: &MotionRequest) -> Result<()> {
        if request.is_empty() {
            return Err(ControllerError::InvalidMotion {
                reason: "no axis given".to_string(),
            }
            .into());
        }
        if !request.feed_rate.is_finite() || request.feed_rate <= 0.0 {
            return Err(ControllerError::InvalidMotion {
                reason: format!("feed rate must be positive, got {}", request.feed_rate),
            }
            .into());
        }

        self.link.connect()?;

        let Some(current) = self.current_position()? else {
            tracing::error!("Current position unavailable, move aborted");
            return Err(ControllerError::PositionUnavailable.into());
        };

        let estimate = request.estimated_duration(&current);
        let command = request.to_gcode();
        tracing::info!(
            "Moving from {} with {} (estimated {:.2}s)",
            current,
            command,
            estimate.as_secs_f64()
        );

        let started = Instant::now();
        self.link.send(&command)?;
        self.wait_for_completion(started, estimate + self.link.settings().motion_margin())?;

        let elapsed = started.elapsed();
        if elapsed < estimate {
            std::thread::sleep(estimate - elapsed);
        }
        tracing::info!("Move finished in {:.2}s", started.elapsed().as_secs_f64());
        Ok(())
    }

    fn wait_for_completion(&mut self, started: Instant, deadline: Duration) -> Result<()> {
        let status_timeout = self.link.settings().status_timeout();
        let poll_interval = self.link.settings().poll_interval();

        while started.elapsed() < deadline {
            self.link.send(STATUS_QUERY)?;
            if let Some(status) = self.link.read(Some(status_timeout))? {
                if status.starts_with(ERROR_PREFIX) {
                    tracing::error!("Move rejected: {}", status);
                    return Err(ControllerError::CommandRejected { reason: status }.into());
                }
                if StatusParser::is_completion(&status) {
                    return Ok(());
                }
                match StatusParser::parse_machine_state(&status).as_deref() {
                    Some(ALARM_STATE) => {
                        tracing::error!("Controller entered alarm during move: {}", status);
                        return Err(ControllerError::CommandRejected { reason: status }.into());
                    }
                    Some(state) => tracing::debug!("Motion state: {}", state),
                    None => tracing::debug!("Motion status: {}", status),
                }
            }
            std::thread::sleep(poll_interval);
        }

        tracing::warn!(
            "Move did not report completion within {:.2}s, continuing",
            deadline.as_secs_f64()
        );
        Ok(())
    }

    /// Query the machine position
    ///
    /// `Ok(None)` if no status arrived or the report has no valid `MPos`.
    pub fn current_position(&mut self) -> Result<Option<MachinePosition>> {
        self.link.send(STATUS_QUERY)?;
        let timeout = self.link.settings().status_timeout();
        let Some(status) = self.link.read(Some(timeout))? else {
            tracing::warn!("No status report received");
            return Ok(None);
        };

        let position = StatusParser::parse_mpos(&status);
        match &position {
            Some(pos) => tracing::debug!("Current position: {}", pos),
            None => tracing::warn!("No position in status report: {}", status),
        }
        Ok(position)
    }
}
