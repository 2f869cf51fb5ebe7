//! DSLR driven through an external gphoto2 capture script.
//!
//! The capture script is called as `<script> <port> <seconds> <path>` and is
//! expected to leave a raw frame at `path`. The shutter is not polled; the
//! driver sleeps for the exposure plus the camera's readout time and then
//! waits a bounded grace period for the script to exit.
//!
//! Camera settings are read and written with the `gphoto2` tool itself when
//! the camera connects.

use chrono::Datelike;
use log::{debug, info, warn};
use std::io::Read;
use qtty::Seconds;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::camera::{Camera, PendingExposure};
use super::error::{HardwareError, HardwareResult};
use crate::models::ModifiedJulianDate;

/// Canon bodies need about six seconds to write a raw frame.
pub const DEFAULT_READOUT_TIME: f64 = 6.0;

/// How long the capture script may outlive the nominal exposure.
const EXIT_GRACE: Duration = Duration::from_secs(10);

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub const DEFAULT_GPHOTO_COMMAND: &str = "gphoto2";

pub const DEFAULT_OWNER: &str = "obsctl";

/// Settings pushed by choice index on connect: manual bulb exposures in RAW at
/// ISO 100, captured to RAM, with the screen and auto power-off disabled.
const CONFIG_BY_INDEX: [(&str, u32); 13] = [
    ("/main/actions/viewfinder", 1),
    ("/main/capturesettings/autoexposuremode", 3),
    ("/main/capturesettings/continuousaf", 0),
    ("/main/capturesettings/drivemode", 0),
    ("/main/capturesettings/focusmode", 0),
    ("/main/capturesettings/shutterspeed", 0),
    ("/main/imgsettings/imageformat", 9),
    ("/main/imgsettings/imageformatcf", 9),
    ("/main/imgsettings/imageformatsd", 9),
    ("/main/imgsettings/iso", 1),
    ("/main/settings/autopoweroff", 0),
    ("/main/settings/capturetarget", 0),
    ("/main/settings/reviewtime", 0),
];

#[derive(Debug)]
pub struct GphotoCamera {
    name: String,
    port: String,
    capture_script: PathBuf,
    convert_command: Option<String>,
    readout_time: Seconds,
    gphoto_command: String,
    owner: String,
    artist: Option<String>,
    serial_number: Option<String>,
    exposing: bool,
    process: Option<Child>,
}

impl GphotoCamera {
    pub fn new(
        name: impl Into<String>,
        port: impl Into<String>,
        capture_script: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            port: port.into(),
            capture_script: capture_script.into(),
            convert_command: None,
            readout_time: Seconds::new(DEFAULT_READOUT_TIME),
            gphoto_command: DEFAULT_GPHOTO_COMMAND.to_string(),
            owner: DEFAULT_OWNER.to_string(),
            artist: None,
            serial_number: None,
            exposing: false,
            process: None,
        }
    }

    /// Command run as `<command> <raw> <fits>` after each exposure.
    pub fn with_convert_command(mut self, command: impl Into<String>) -> Self {
        self.convert_command = Some(command.into());
        self
    }

    pub fn with_readout_time(mut self, readout_time: Seconds) -> Self {
        self.readout_time = readout_time;
        self
    }

    pub fn with_gphoto_command(mut self, command: impl Into<String>) -> Self {
        self.gphoto_command = command.into();
        self
    }

    /// Owner written into the frame metadata. The artist defaults to it.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    /// Set once the camera has answered on connect.
    pub fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }

    /// Runs `gphoto2 --port <port> <args>` and returns its standard output.
    fn gphoto(&self, args: &[String]) -> HardwareResult<String> {
        let output = Command::new(&self.gphoto_command)
            .arg("--port")
            .arg(&self.port)
            .args(args)
            .output()
            .map_err(|e| HardwareError::Command {
                command: self.gphoto_command.clone(),
                message: format!("failed to execute: {}", e),
            })?;

        if !output.status.success() {
            return Err(HardwareError::Command {
                command: self.gphoto_command.clone(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn read_config(&self, property: &str) -> HardwareResult<String> {
        let output = self.gphoto(&["--get-config".to_string(), property.to_string()])?;
        Ok(output
            .lines()
            .find_map(|line| line.strip_prefix("Current:"))
            .map(|value| value.trim().to_string())
            .unwrap_or_default())
    }

    fn settings_args(&self) -> Vec<String> {
        let artist = self.artist.as_deref().unwrap_or(&self.owner);
        let copyright = format!("{} {}", self.owner, chrono::Utc::now().year());

        let mut args = Vec::new();
        for (property, index) in CONFIG_BY_INDEX {
            args.push("--set-config-index".to_string());
            args.push(format!("{}={}", property, index));
        }
        for (property, value) in [
            ("/main/settings/datetime", "now"),
            ("/main/settings/datetimeutc", "now"),
            ("/main/settings/artist", artist),
            ("/main/settings/copyright", copyright.as_str()),
            ("/main/settings/ownername", self.owner.as_str()),
        ] {
            args.push("--set-config-value".to_string());
            args.push(format!("{}={}", property, value));
        }
        args
    }

    fn script_name(&self) -> String {
        self.capture_script.display().to_string()
    }

    fn wait_for_script(&mut self) -> HardwareResult<()> {
        let Some(mut child) = self.process.take() else {
            return Ok(());
        };

        let deadline = Instant::now() + EXIT_GRACE;
        loop {
            if let Some(status) = child.try_wait()? {
                if status.success() {
                    return Ok(());
                }
                let mut stderr = String::new();
                if let Some(mut pipe) = child.stderr.take() {
                    if let Err(e) = pipe.read_to_string(&mut stderr) {
                        warn!("{}: could not read capture script output: {}", self.name, e);
                    }
                }
                return Err(HardwareError::Command {
                    command: self.script_name(),
                    message: format!("{}: {}", status, stderr.trim()),
                });
            }
            if Instant::now() >= deadline {
                debug!("Still waiting for camera, killing capture script");
                let _ = child.kill();
                let _ = child.wait();
                return Err(HardwareError::Command {
                    command: self.script_name(),
                    message: "timed out waiting for capture".to_string(),
                });
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    }
}

impl Camera for GphotoCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_exposing(&self) -> bool {
        self.exposing
    }

    fn connect(&mut self) -> HardwareResult<()> {
        debug!("Connecting to {} on {}", self.name, self.port);
        self.serial_number = None;

        let serial = self.read_config("serialnumber")?;
        if serial.is_empty() {
            return Err(HardwareError::Camera(format!(
                "{}: camera not responding on {}",
                self.name, self.port
            )));
        }

        self.gphoto(&self.settings_args())?;
        info!("{} connected (serial {})", self.name, serial);
        self.serial_number = Some(serial);
        Ok(())
    }

    fn file_extension(&self) -> &str {
        "cr2"
    }

    fn start_exposure(
        &mut self,
        exposure_time: Seconds,
        path: &Path,
    ) -> HardwareResult<PendingExposure> {
        let raw = path.with_extension(self.file_extension());
        if let Some(parent) = raw.parent() {
            std::fs::create_dir_all(parent)?;
        }

        self.exposing = true;
        let child = Command::new(&self.capture_script)
            .arg(&self.port)
            .arg(exposure_time.value().to_string())
            .arg(&raw)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| HardwareError::Command {
                command: self.script_name(),
                message: format!("failed to execute: {}", e),
            })?;
        self.process = Some(child);

        Ok(PendingExposure {
            path: raw,
            exposure_time,
            started: ModifiedJulianDate::now(),
        })
    }

    fn poll_exposure(&mut self, pending: &PendingExposure) -> HardwareResult<()> {
        let wait = pending.exposure_time.value() + self.readout_time.value();
        if wait > 0.0 {
            thread::sleep(Duration::from_secs_f64(wait));
        }
        self.wait_for_script()?;

        if !pending.path.exists() {
            return Err(HardwareError::Camera(format!(
                "{}: no frame written to {}",
                self.name,
                pending.path.display()
            )));
        }
        Ok(())
    }

    fn readout(&mut self, pending: &PendingExposure) -> HardwareResult<PathBuf> {
        let Some(convert) = &self.convert_command else {
            return Ok(pending.path.clone());
        };

        let fits = pending.path.with_extension("fits");
        debug!("Converting {} -> {}", pending.path.display(), fits.display());

        let output = Command::new(convert)
            .arg(&pending.path)
            .arg(&fits)
            .output()
            .map_err(|e| HardwareError::Command {
                command: convert.clone(),
                message: format!("failed to execute: {}", e),
            })?;

        if !output.status.success() {
            return Err(HardwareError::Command {
                command: convert.clone(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(fits)
    }

    fn finish_exposure(&mut self) {
        if let Some(mut child) = self.process.take() {
            warn!("{}: capture script still attached, killing it", self.name);
            let _ = child.kill();
            let _ = child.wait();
        }
        self.exposing = false;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn camera(capture: PathBuf) -> GphotoCamera {
        GphotoCamera::new("canon", "usb:001,004", capture).with_readout_time(Seconds::new(0.0))
    }

    #[test]
    fn test_capture_and_convert() {
        let dir = tempfile::tempdir().unwrap();
        let capture = script(dir.path(), "take_pic.sh", r#"echo "$1 $2" > "$3""#);
        let convert = script(dir.path(), "cr2_to_fits.sh", r#"cp "$1" "$2""#);

        let mut camera = camera(capture).with_convert_command(convert.display().to_string());
        let record = camera
            .take_exposure(Seconds::new(0.0), &dir.path().join("frames/001"))
            .unwrap();

        assert!(!camera.is_exposing());
        assert_eq!(record.path, dir.path().join("frames/001.fits"));
        let content = fs::read_to_string(&record.path).unwrap();
        assert_eq!(content.trim(), "usb:001,004 0");
        assert!(dir.path().join("frames/001.cr2").exists());
    }

    #[test]
    fn test_failing_script_clears_flag() {
        let dir = tempfile::tempdir().unwrap();
        let capture = script(dir.path(), "take_pic.sh", "echo 'no camera' >&2; exit 3");

        let mut camera = camera(capture);
        let err = camera
            .take_exposure(Seconds::new(0.0), &dir.path().join("002"))
            .unwrap_err();
        assert!(!camera.is_exposing());
        assert!(err.to_string().contains("no camera"), "{}", err);
    }

    #[test]
    fn test_missing_script_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut camera = camera(dir.path().join("absent.sh"));
        assert!(matches!(
            camera.take_exposure(Seconds::new(0.0), &dir.path().join("003")),
            Err(HardwareError::Command { .. })
        ));
        assert!(!camera.is_exposing());
    }

    /// Fake `gphoto2` that reports `serial` and logs its arguments to `calls`.
    fn fake_gphoto(dir: &Path, serial: &str) -> PathBuf {
        let calls = dir.join("calls");
        script(
            dir,
            "gphoto2",
            &format!(
                r#"echo "$@" >> "{}"
case "$*" in
  *--get-config*) printf 'Label: Serial Number\nType: TEXT\nCurrent: {}\nEND\n' ;;
esac"#,
                calls.display(),
                serial
            ),
        )
    }

    #[test]
    fn test_connect_reads_serial_and_applies_settings() {
        let dir = tempfile::tempdir().unwrap();
        let gphoto = fake_gphoto(dir.path(), "083024001234");
        let mut camera = camera(dir.path().join("take_pic.sh"))
            .with_gphoto_command(gphoto.display().to_string())
            .with_owner("Observatory")
            .with_artist("unit 7");

        camera.connect().unwrap();
        assert_eq!(camera.serial_number(), Some("083024001234"));

        let calls = fs::read_to_string(dir.path().join("calls")).unwrap();
        let calls: Vec<&str> = calls.lines().collect();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], "--port usb:001,004 --get-config serialnumber");
        assert!(calls[1].contains("--set-config-index /main/imgsettings/iso=1"));
        assert!(calls[1].contains("--set-config-index /main/settings/capturetarget=0"));
        assert!(calls[1].contains("--set-config-value /main/settings/artist=unit 7"));
        assert!(calls[1].contains("--set-config-value /main/settings/ownername=Observatory"));
    }

    #[test]
    fn test_connect_fails_when_camera_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let gphoto = fake_gphoto(dir.path(), "");
        let mut camera =
            camera(dir.path().join("take_pic.sh")).with_gphoto_command(gphoto.display().to_string());

        let err = camera.connect().unwrap_err();
        assert!(matches!(err, HardwareError::Camera(_)), "{}", err);
        assert!(camera.serial_number().is_none());

        // Settings are never pushed to a camera that did not answer
        let calls = fs::read_to_string(dir.path().join("calls")).unwrap();
        assert_eq!(calls.lines().count(), 1);
    }

    #[test]
    fn test_connect_reports_gphoto_failure() {
        let dir = tempfile::tempdir().unwrap();
        let gphoto = script(dir.path(), "gphoto2", "echo '*** Error: No camera found.' >&2; exit 1");
        let mut camera =
            camera(dir.path().join("take_pic.sh")).with_gphoto_command(gphoto.display().to_string());

        let err = camera.connect().unwrap_err();
        assert!(matches!(err, HardwareError::Command { .. }));
        assert!(err.to_string().contains("No camera found"), "{}", err);
    }

    #[test]
    fn test_raw_path_returned_without_converter() {
        let dir = tempfile::tempdir().unwrap();
        let capture = script(dir.path(), "take_pic.sh", r#"touch "$3""#);
        let mut camera = camera(capture);
        let record = camera
            .take_exposure(Seconds::new(0.0), &dir.path().join("004"))
            .unwrap();
        assert_eq!(record.path.extension().unwrap(), "cr2");
    }
}
