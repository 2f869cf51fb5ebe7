//! Simulated observatory for tests and dry runs.
//!
//! The mount is modelled as a small state machine of its own and the clock
//! can run on simulated time, advancing with every slew and exposure so a
//! whole night plays out in milliseconds.

use log::{debug, info, warn};
use qtty::{Degrees, Seconds};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::camera::{Camera, ExposureRecord};
use super::error::{HardwareError, HardwareResult};
use super::observatory::Observatory;
use crate::astro::Observer;
use crate::models::{ModifiedJulianDate, Observation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountState {
    Parked,
    Ready,
    Tracking(String),
}

/// Observatory actions, used for fault injection and the action history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Initialize,
    Calibrate,
    Slew,
    Pointing,
    Observe,
    Park,
    Cleanup,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Initialize => "initialize",
            Operation::Calibrate => "calibrate",
            Operation::Slew => "slew",
            Operation::Pointing => "pointing",
            Operation::Observe => "observe",
            Operation::Park => "park",
            Operation::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// Durations the simulator charges against its clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulatorTiming {
    #[serde(default = "default_slew_time")]
    pub slew_time: Seconds,
    #[serde(default = "default_pointing_exposure")]
    pub pointing_exposure: Seconds,
    #[serde(default = "default_flat_exposure")]
    pub flat_exposure: Seconds,
    #[serde(default = "default_flat_count")]
    pub flat_count: u32,
}

fn default_slew_time() -> Seconds {
    Seconds::new(60.0)
}

fn default_pointing_exposure() -> Seconds {
    Seconds::new(30.0)
}

fn default_flat_exposure() -> Seconds {
    Seconds::new(1.0)
}

fn default_flat_count() -> u32 {
    5
}

impl Default for SimulatorTiming {
    fn default() -> Self {
        Self {
            slew_time: default_slew_time(),
            pointing_exposure: default_pointing_exposure(),
            flat_exposure: default_flat_exposure(),
            flat_count: default_flat_count(),
        }
    }
}

pub struct SimulatedObservatory {
    observer: Observer,
    camera: Box<dyn Camera>,
    mount: MountState,
    clock: Option<ModifiedJulianDate>,
    sun_altitude: Option<Degrees>,
    take_flat_fields: bool,
    weather_safe: Arc<AtomicBool>,
    faults: HashSet<Operation>,
    timing: SimulatorTiming,
    image_dir: PathBuf,
    frame_counter: u32,
    images: Vec<ExposureRecord>,
    history: Vec<Operation>,
}

impl SimulatedObservatory {
    pub fn new(observer: Observer, camera: Box<dyn Camera>) -> Self {
        Self {
            observer,
            camera,
            mount: MountState::Parked,
            clock: None,
            sun_altitude: None,
            take_flat_fields: false,
            weather_safe: Arc::new(AtomicBool::new(true)),
            faults: HashSet::new(),
            timing: SimulatorTiming::default(),
            image_dir: PathBuf::from("images"),
            frame_counter: 0,
            images: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Runs on simulated time starting at `start` instead of the wall clock.
    pub fn with_clock(mut self, start: ModifiedJulianDate) -> Self {
        self.clock = Some(start);
        self
    }

    pub fn with_flat_fields(mut self, take_flat_fields: bool) -> Self {
        self.take_flat_fields = take_flat_fields;
        self
    }

    pub fn with_timing(mut self, timing: SimulatorTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_image_dir(mut self, image_dir: impl Into<PathBuf>) -> Self {
        self.image_dir = image_dir.into();
        self
    }

    /// Pins the reported Sun altitude, e.g. to force twilight.
    pub fn set_sun_altitude(&mut self, altitude: Option<Degrees>) {
        self.sun_altitude = altitude;
    }

    /// Shared weather flag; clearing it makes the site report unsafe weather.
    pub fn weather_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.weather_safe)
    }

    /// Makes `operation` fail until [`clear_fault`](Self::clear_fault).
    pub fn inject_fault(&mut self, operation: Operation) {
        self.faults.insert(operation);
    }

    pub fn clear_fault(&mut self, operation: Operation) {
        self.faults.remove(&operation);
    }

    pub fn mount(&self) -> &MountState {
        &self.mount
    }

    pub fn images(&self) -> &[ExposureRecord] {
        &self.images
    }

    /// Successful operations in the order they happened.
    pub fn history(&self) -> &[Operation] {
        &self.history
    }

    fn advance(&mut self, elapsed: Seconds) {
        if let Some(clock) = self.clock {
            self.clock = Some(clock + elapsed);
        }
    }

    fn check_fault(&self, operation: Operation) -> HardwareResult<()> {
        if !self.faults.contains(&operation) {
            return Ok(());
        }
        let message = format!("injected {} fault", operation);
        Err(match operation {
            Operation::Calibrate => HardwareError::Calibration(message),
            Operation::Pointing | Operation::Observe => HardwareError::Camera(message),
            Operation::Cleanup => HardwareError::Io(io::Error::new(io::ErrorKind::Other, message)),
            Operation::Initialize | Operation::Slew | Operation::Park => {
                HardwareError::Mount(message)
            }
        })
    }

    fn require_tracking(&self, observation: &Observation) -> HardwareResult<()> {
        match &self.mount {
            MountState::Tracking(name) if *name == observation.name => Ok(()),
            other => Err(HardwareError::Mount(format!(
                "not tracking {} (mount {:?})",
                observation.name, other
            ))),
        }
    }

    fn frame_path(&mut self, directory: &str) -> PathBuf {
        self.frame_counter += 1;
        self.image_dir
            .join(sanitize(directory))
            .join(format!("{:04}.raw", self.frame_counter))
    }

    fn expose(&mut self, directory: &str, exposure_time: Seconds) -> HardwareResult<ExposureRecord> {
        let path = self.frame_path(directory);
        let record = self.camera.take_exposure(exposure_time, &path)?;
        self.advance(exposure_time);
        Ok(record)
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

impl Observatory for SimulatedObservatory {
    fn observer(&self) -> &Observer {
        &self.observer
    }

    fn take_flat_fields(&self) -> bool {
        self.take_flat_fields
    }

    fn now(&self) -> ModifiedJulianDate {
        self.clock.unwrap_or_else(ModifiedJulianDate::now)
    }

    fn sun_altitude(&self, time: ModifiedJulianDate) -> Degrees {
        self.sun_altitude
            .unwrap_or_else(|| self.observer.sun_altitude(time))
    }

    fn is_weather_safe(&self) -> bool {
        self.weather_safe.load(Ordering::SeqCst)
    }

    fn initialize(&mut self) -> HardwareResult<()> {
        self.check_fault(Operation::Initialize)?;
        self.camera.connect()?;
        if self.mount == MountState::Parked {
            info!("Unparking mount");
        }
        self.mount = MountState::Ready;
        self.history.push(Operation::Initialize);
        Ok(())
    }

    fn perform_calibration_sequence(&mut self) -> HardwareResult<()> {
        self.check_fault(Operation::Calibrate)?;
        for n in 0..self.timing.flat_count {
            let record = self
                .expose("flats", self.timing.flat_exposure)
                .map_err(|e| HardwareError::Calibration(format!("flat {}: {}", n + 1, e)))?;
            self.images.push(record);
        }
        self.history.push(Operation::Calibrate);
        Ok(())
    }

    fn slew_to(&mut self, observation: &Observation) -> HardwareResult<()> {
        self.check_fault(Operation::Slew)?;
        if self.mount == MountState::Parked {
            return Err(HardwareError::Mount("mount is parked".to_string()));
        }
        debug!("Slewing to {}", observation.name);
        self.advance(self.timing.slew_time);
        self.mount = MountState::Tracking(observation.name.clone());
        self.history.push(Operation::Slew);
        Ok(())
    }

    fn take_pointing_image(&mut self, observation: &Observation) -> HardwareResult<ExposureRecord> {
        self.check_fault(Operation::Pointing)?;
        self.require_tracking(observation)?;
        let record = self.expose(
            &format!("{}-pointing", observation.name),
            self.timing.pointing_exposure,
        )?;
        self.images.push(record.clone());
        self.history.push(Operation::Pointing);
        Ok(record)
    }

    fn observe(&mut self, observation: &Observation) -> HardwareResult<ExposureRecord> {
        self.check_fault(Operation::Observe)?;
        self.require_tracking(observation)?;
        let record = self.expose(&observation.name, observation.exposure.exposure_time)?;
        self.images.push(record.clone());
        self.history.push(Operation::Observe);
        Ok(record)
    }

    fn park(&mut self) -> HardwareResult<()> {
        self.check_fault(Operation::Park)?;
        if self.mount != MountState::Parked {
            self.advance(self.timing.slew_time);
        }
        self.mount = MountState::Parked;
        self.history.push(Operation::Park);
        Ok(())
    }

    fn cleanup_observations(&mut self) -> HardwareResult<()> {
        self.check_fault(Operation::Cleanup)?;

        // Frames that could not be removed stay listed for the next attempt
        let mut first_error = None;
        self.images.retain(|record| match remove_if_present(&record.path) {
            Ok(()) => false,
            Err(e) => {
                warn!("Could not remove {}: {}", record.path.display(), e);
                first_error.get_or_insert(e);
                true
            }
        });
        if let Some(e) = first_error {
            return Err(e.into());
        }

        self.history.push(Operation::Cleanup);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::SimulatedCamera;

    fn observatory() -> SimulatedObservatory {
        SimulatedObservatory::new(
            Observer::new("equator", 0.0, 0.0),
            Box::new(SimulatedCamera::new("sim")),
        )
        .with_clock(ModifiedJulianDate::new(60000.0))
    }

    #[test]
    fn test_mount_lifecycle() {
        let mut site = observatory();
        let target = Observation::new("M42", 0.0);

        assert!(site.slew_to(&target).is_err());
        site.initialize().unwrap();
        assert!(site.observe(&target).is_err());

        site.slew_to(&target).unwrap();
        assert_eq!(site.mount(), &MountState::Tracking("M42".to_string()));
        site.observe(&target).unwrap();
        site.park().unwrap();
        assert_eq!(site.mount(), &MountState::Parked);
        assert_eq!(
            site.history(),
            &[Operation::Initialize, Operation::Slew, Operation::Observe, Operation::Park]
        );
    }

    #[test]
    fn test_clock_advances_with_work() {
        let mut site = observatory();
        let target = Observation::new("M42", 0.0);
        site.initialize().unwrap();
        site.slew_to(&target).unwrap();
        site.observe(&target).unwrap();

        // 60 s slew + 120 s default exposure
        let elapsed = site.now() - ModifiedJulianDate::new(60000.0);
        assert!((elapsed.value() - 180.0).abs() < 1e-3);
    }

    #[test]
    fn test_injected_fault() {
        let mut site = observatory();
        site.inject_fault(Operation::Calibrate);
        assert!(matches!(
            site.perform_calibration_sequence(),
            Err(HardwareError::Calibration(_))
        ));
        site.clear_fault(Operation::Calibrate);
        site.perform_calibration_sequence().unwrap();
        assert_eq!(site.images().len(), 5);
    }

    #[test]
    fn test_overrides() {
        let mut site = observatory();
        site.set_sun_altitude(Some(Degrees::new(-10.0)));
        assert_eq!(site.sun_altitude(site.now()).value(), -10.0);

        site.weather_flag().store(false, Ordering::SeqCst);
        assert!(!site.is_weather_safe());
    }

    #[test]
    fn test_cleanup_removes_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut site = SimulatedObservatory::new(
            Observer::new("equator", 0.0, 0.0),
            Box::new(SimulatedCamera::new("sim").with_files(true)),
        )
        .with_clock(ModifiedJulianDate::new(60000.0))
        .with_image_dir(dir.path());
        let target = Observation::new("NGC 253", 0.0);

        site.initialize().unwrap();
        site.slew_to(&target).unwrap();
        let record = site.observe(&target).unwrap();
        assert!(record.path.starts_with(dir.path().join("NGC_253")));
        assert!(record.path.exists());

        site.cleanup_observations().unwrap();
        assert!(!record.path.exists());
        assert!(site.images().is_empty());
    }

    #[test]
    fn test_cleanup_keeps_frames_it_could_not_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut site = SimulatedObservatory::new(
            Observer::new("equator", 0.0, 0.0),
            Box::new(SimulatedCamera::new("sim").with_files(true)),
        )
        .with_clock(ModifiedJulianDate::new(60000.0))
        .with_image_dir(dir.path());
        let target = Observation::new("M31", 0.0);
        site.initialize().unwrap();
        site.slew_to(&target).unwrap();
        let first = site.observe(&target).unwrap();

        // A directory cannot be removed as a file
        let stuck = dir.path().join("stuck");
        fs::create_dir_all(stuck.join("inner")).unwrap();
        site.images.push(ExposureRecord {
            path: stuck.clone(),
            exposure_time: Seconds::new(1.0),
            started: site.now(),
        });
        let last = site.observe(&target).unwrap();

        assert!(matches!(site.cleanup_observations(), Err(HardwareError::Io(_))));
        assert!(!first.path.exists());
        assert!(!last.path.exists());
        assert_eq!(site.images().len(), 1);
        assert_eq!(site.images()[0].path, stuck);
        assert!(!site.history().contains(&Operation::Cleanup));

        fs::remove_dir_all(&stuck).unwrap();
        site.cleanup_observations().unwrap();
        assert!(site.images().is_empty());
    }
}
