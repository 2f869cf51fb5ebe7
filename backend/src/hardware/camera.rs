//! Camera exposure lifecycle.
//!
//! Every exposure goes through three steps: start, poll until the shutter
//! closes, read the frame out. [`Camera::take_exposure`] drives the sequence
//! and guarantees the exposing flag is cleared however it ends.

use log::{debug, warn};
use qtty::Seconds;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use super::error::{HardwareError, HardwareResult};
use crate::models::ModifiedJulianDate;

/// An exposure that has been started but not yet read out.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingExposure {
    pub path: PathBuf,
    pub exposure_time: Seconds,
    pub started: ModifiedJulianDate,
}

/// A finished frame on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExposureRecord {
    pub path: PathBuf,
    pub exposure_time: Seconds,
    pub started: ModifiedJulianDate,
}

pub trait Camera: Send {
    fn name(&self) -> &str;

    fn is_exposing(&self) -> bool;

    /// Checks the camera answers and applies its capture settings.
    ///
    /// Called once when the observatory comes online.
    fn connect(&mut self) -> HardwareResult<()> {
        Ok(())
    }

    /// Extension of the raw files written by `start_exposure`.
    fn file_extension(&self) -> &str;

    /// Opens the shutter for `exposure_time`, writing the raw frame to `path`.
    fn start_exposure(
        &mut self,
        exposure_time: Seconds,
        path: &Path,
    ) -> HardwareResult<PendingExposure>;

    /// Blocks until the exposure has finished.
    fn poll_exposure(&mut self, pending: &PendingExposure) -> HardwareResult<()>;

    /// Converts the raw frame and returns the path of the final artifact.
    fn readout(&mut self, pending: &PendingExposure) -> HardwareResult<PathBuf>;

    /// Marks the camera idle again.
    fn finish_exposure(&mut self);

    fn take_exposure(
        &mut self,
        exposure_time: Seconds,
        path: &Path,
    ) -> HardwareResult<ExposureRecord> {
        if self.is_exposing() {
            return Err(HardwareError::CameraBusy);
        }

        let result = match self.start_exposure(exposure_time, path) {
            Ok(pending) => self
                .poll_exposure(&pending)
                .and_then(|()| self.readout(&pending))
                .map(|artifact| ExposureRecord {
                    path: artifact,
                    exposure_time: pending.exposure_time,
                    started: pending.started,
                }),
            Err(e) => Err(e),
        };

        self.finish_exposure();
        if let Err(e) = &result {
            warn!("Exposure on {} failed: {}", self.name(), e);
        }
        result
    }
}

/// Camera that only pretends to expose.
///
/// Sleeps for `exposure_time * time_scale` and, when `write_files` is set,
/// writes a small placeholder artifact so downstream cleanup has something to
/// remove.
#[derive(Debug, Clone)]
pub struct SimulatedCamera {
    name: String,
    exposing: bool,
    time_scale: f64,
    write_files: bool,
    fail_readout: bool,
    exposures_taken: u32,
}

impl SimulatedCamera {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exposing: false,
            time_scale: 0.0,
            write_files: false,
            fail_readout: false,
            exposures_taken: 0,
        }
    }

    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale.max(0.0);
        self
    }

    pub fn with_files(mut self, write_files: bool) -> Self {
        self.write_files = write_files;
        self
    }

    /// Makes every readout fail until cleared.
    pub fn set_fail_readout(&mut self, fail: bool) {
        self.fail_readout = fail;
    }

    pub fn exposures_taken(&self) -> u32 {
        self.exposures_taken
    }
}

impl Camera for SimulatedCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_exposing(&self) -> bool {
        self.exposing
    }

    fn file_extension(&self) -> &str {
        "fits"
    }

    fn start_exposure(
        &mut self,
        exposure_time: Seconds,
        path: &Path,
    ) -> HardwareResult<PendingExposure> {
        debug!("{}: exposing {:.1}s to {}", self.name, exposure_time.value(), path.display());
        self.exposing = true;
        Ok(PendingExposure {
            path: path.to_path_buf(),
            exposure_time,
            started: ModifiedJulianDate::now(),
        })
    }

    fn poll_exposure(&mut self, pending: &PendingExposure) -> HardwareResult<()> {
        let wait = pending.exposure_time.value() * self.time_scale;
        if wait > 0.0 {
            thread::sleep(Duration::from_secs_f64(wait));
        }
        Ok(())
    }

    fn readout(&mut self, pending: &PendingExposure) -> HardwareResult<PathBuf> {
        if self.fail_readout {
            return Err(HardwareError::Camera(format!(
                "{}: readout failed for {}",
                self.name,
                pending.path.display()
            )));
        }

        let artifact = pending.path.with_extension(self.file_extension());
        if self.write_files {
            if let Some(parent) = artifact.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(
                &artifact,
                format!("SIMPLE = T\nEXPTIME = {}\n", pending.exposure_time.value()),
            )?;
        }
        self.exposures_taken += 1;
        Ok(artifact)
    }

    fn finish_exposure(&mut self) {
        self.exposing = false;
    }
}
