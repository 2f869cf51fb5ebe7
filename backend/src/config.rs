//! Observatory configuration file support.
//!
//! Everything needed to assemble a night is read from one TOML file:
//!
//! ```toml
//! [location]
//! name = "Mauna Loa"
//! latitude = 19.54
//! longitude = -155.58
//! elevation = 3400.0
//!
//! [scheduler]
//! field_list = "fields.toml"
//!
//! [[scheduler.constraints]]
//! type = "duration"
//! weight = 1.0
//!
//! [observatory]
//! take_flat_fields = true
//!
//! [camera]
//! type = "gphoto"
//! port = "usb:001,006"
//! capture_script = "scripts/take_pic.sh"
//! owner = "Mauna Loa Observatory"
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use qtty::{Degrees, Meters, Seconds};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::astro::Observer;
use crate::hardware::simulator::SimulatorTiming;
use crate::hardware::{Camera, GphotoCamera, SimulatedCamera, SimulatedObservatory};
use crate::models::ModifiedJulianDate;
use crate::scheduler::{Constraint, ConstraintConfig, FieldListFile, Scheduler, SchedulerError};
use crate::state::{
    default_handlers, nightly_states, EngineError, HandlerOptions, StateGraph, StateMachine,
    StateName, StateSpec,
};

/// File names searched by [`ObservatoryConfig::from_default_location`].
const DEFAULT_LOCATIONS: [&str; 4] = [
    "obsctl.toml",
    "config/obsctl.toml",
    "backend/obsctl.toml",
    "../obsctl.toml",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to parse config file: {0}")]
    Parse(String),

    #[error("No obsctl.toml found in standard locations")]
    NotFound,

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    StateMachine(#[from] EngineError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservatoryConfig {
    pub location: LocationSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub observatory: ObservatorySettings,
    #[serde(default)]
    pub camera: CameraSettings,
    #[serde(default)]
    pub state_machine: StateMachineSettings,
    /// Directory of the file this was loaded from.
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

/// Site coordinates and horizons, all angles in degrees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSettings {
    #[serde(default = "default_site_name")]
    pub name: String,
    pub latitude: f64,
    /// East-positive.
    pub longitude: f64,
    #[serde(default)]
    pub elevation: f64,
    #[serde(default = "default_horizon")]
    pub horizon: f64,
    #[serde(default = "default_civil_horizon")]
    pub civil_horizon: f64,
    #[serde(default = "default_astro_horizon")]
    pub astro_horizon: f64,
}

fn default_site_name() -> String {
    "observatory".to_string()
}

fn default_horizon() -> f64 {
    30.0
}

fn default_civil_horizon() -> f64 {
    -6.0
}

fn default_astro_horizon() -> f64 {
    -18.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default)]
    pub field_list: Option<PathBuf>,
    #[serde(default = "ConstraintConfig::defaults")]
    pub constraints: Vec<ConstraintConfig>,
    #[serde(default = "default_true")]
    pub reread_field_list: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            field_list: None,
            constraints: ConstraintConfig::defaults(),
            reread_field_list: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservatorySettings {
    #[serde(default)]
    pub take_flat_fields: bool,
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,
    /// Run on simulated time from this MJD instead of the wall clock.
    #[serde(default)]
    pub start_mjd: Option<f64>,
    #[serde(default)]
    pub timing: SimulatorTiming,
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("images")
}

impl Default for ObservatorySettings {
    fn default() -> Self {
        Self {
            take_flat_fields: false,
            image_dir: default_image_dir(),
            start_mjd: None,
            timing: SimulatorTiming::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CameraSettings {
    Simulated {
        #[serde(default = "default_simulated_name")]
        name: String,
        #[serde(default)]
        time_scale: f64,
        #[serde(default)]
        write_files: bool,
    },
    Gphoto {
        #[serde(default = "default_gphoto_name")]
        name: String,
        port: String,
        capture_script: PathBuf,
        #[serde(default)]
        convert_command: Option<String>,
        #[serde(default = "default_readout_time")]
        readout_time: f64,
        #[serde(default = "default_gphoto_command")]
        gphoto_command: String,
        #[serde(default = "default_owner")]
        owner: String,
        #[serde(default)]
        artist: Option<String>,
    },
}

fn default_simulated_name() -> String {
    "simulator".to_string()
}

fn default_gphoto_name() -> String {
    "canon".to_string()
}

fn default_gphoto_command() -> String {
    crate::hardware::gphoto::DEFAULT_GPHOTO_COMMAND.to_string()
}

fn default_owner() -> String {
    crate::hardware::gphoto::DEFAULT_OWNER.to_string()
}

fn default_readout_time() -> f64 {
    crate::hardware::gphoto::DEFAULT_READOUT_TIME
}

impl Default for CameraSettings {
    fn default() -> Self {
        CameraSettings::Simulated {
            name: default_simulated_name(),
            time_scale: 0.0,
            write_files: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMachineSettings {
    #[serde(default = "default_initial_state")]
    pub initial_state: StateName,
    #[serde(default = "default_safe_state")]
    pub safe_state: StateName,
    #[serde(default = "default_terminal_state")]
    pub terminal_state: StateName,
    #[serde(default)]
    pub max_transitions: Option<usize>,
    #[serde(default = "nightly_states")]
    pub states: Vec<StateSpec>,
}

fn default_initial_state() -> StateName {
    StateName::Ready
}

fn default_safe_state() -> StateName {
    StateName::Parking
}

fn default_terminal_state() -> StateName {
    StateName::Sleeping
}

impl Default for StateMachineSettings {
    fn default() -> Self {
        Self {
            initial_state: default_initial_state(),
            safe_state: default_safe_state(),
            terminal_state: default_terminal_state(),
            max_transitions: None,
            states: nightly_states(),
        }
    }
}

impl ObservatoryConfig {
    /// Load and validate a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let mut config = Self::parse(&content)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ObservatoryConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the first `obsctl.toml` found in the standard locations.
    pub fn from_default_location() -> Result<Self, ConfigError> {
        for candidate in DEFAULT_LOCATIONS {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        Err(ConfigError::NotFound)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let location = &self.location;
        if !(-90.0..=90.0).contains(&location.latitude) {
            return Err(ConfigError::Invalid(format!(
                "latitude {} outside [-90, 90]",
                location.latitude
            )));
        }
        if !(-180.0..=360.0).contains(&location.longitude) {
            return Err(ConfigError::Invalid(format!(
                "longitude {} outside [-180, 360]",
                location.longitude
            )));
        }
        if location.astro_horizon >= location.civil_horizon {
            return Err(ConfigError::Invalid(format!(
                "astro_horizon ({}) must be below civil_horizon ({})",
                location.astro_horizon, location.civil_horizon
            )));
        }

        for constraint in &self.scheduler.constraints {
            constraint.validate().map_err(ConfigError::Invalid)?;
        }

        match &self.camera {
            CameraSettings::Simulated { time_scale, .. } if *time_scale < 0.0 => {
                return Err(ConfigError::Invalid(format!(
                    "camera time_scale must be >= 0, got {}",
                    time_scale
                )));
            }
            CameraSettings::Gphoto { port, .. } if port.trim().is_empty() => {
                return Err(ConfigError::Invalid("camera port must not be empty".to_string()));
            }
            _ => {}
        }

        self.state_graph()?;
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn to_observer(&self) -> Observer {
        let location = &self.location;
        let mut observer = Observer::new(&location.name, location.latitude, location.longitude);
        observer.elevation = Meters::new(location.elevation);
        observer.horizon = Degrees::new(location.horizon);
        observer.civil_horizon = Degrees::new(location.civil_horizon);
        observer.astro_horizon = Degrees::new(location.astro_horizon);
        observer
    }

    pub fn build_constraints(&self) -> Vec<Box<dyn Constraint>> {
        self.scheduler
            .constraints
            .iter()
            .map(ConstraintConfig::build)
            .collect()
    }

    /// Scheduler with its field list attached and loaded.
    pub fn build_scheduler(&self) -> Result<Scheduler, ConfigError> {
        let scheduler = Scheduler::new(self.to_observer(), self.build_constraints());
        let Some(field_list) = &self.scheduler.field_list else {
            return Ok(scheduler);
        };

        let mut scheduler = scheduler.with_field_list(FieldListFile::new(self.resolve(field_list)));
        scheduler.read_field_list()?;
        Ok(scheduler)
    }

    pub fn build_camera(&self) -> Box<dyn Camera> {
        match &self.camera {
            CameraSettings::Simulated {
                name,
                time_scale,
                write_files,
            } => Box::new(
                SimulatedCamera::new(name)
                    .with_time_scale(*time_scale)
                    .with_files(*write_files),
            ),
            CameraSettings::Gphoto {
                name,
                port,
                capture_script,
                convert_command,
                readout_time,
                gphoto_command,
                owner,
                artist,
            } => {
                let mut camera = GphotoCamera::new(name, port, self.resolve(capture_script))
                    .with_readout_time(Seconds::new(*readout_time))
                    .with_gphoto_command(gphoto_command)
                    .with_owner(owner);
                if let Some(command) = convert_command {
                    camera = camera.with_convert_command(command);
                }
                if let Some(artist) = artist {
                    camera = camera.with_artist(artist);
                }
                Box::new(camera)
            }
        }
    }

    pub fn build_observatory(&self) -> SimulatedObservatory {
        let settings = &self.observatory;
        let observatory = SimulatedObservatory::new(self.to_observer(), self.build_camera())
            .with_flat_fields(settings.take_flat_fields)
            .with_timing(settings.timing)
            .with_image_dir(self.resolve(&settings.image_dir));

        match settings.start_mjd {
            Some(start) => observatory.with_clock(ModifiedJulianDate::new(start)),
            None => observatory,
        }
    }

    pub fn state_graph(&self) -> Result<StateGraph, EngineError> {
        let settings = &self.state_machine;
        StateGraph::new(
            settings.initial_state,
            settings.safe_state,
            settings.terminal_state,
            settings.states.clone(),
        )
    }

    pub fn build_state_machine(&self) -> Result<StateMachine, ConfigError> {
        let options = HandlerOptions {
            reread_field_list: self.scheduler.reread_field_list,
        };
        let machine = StateMachine::new(self.state_graph()?, default_handlers(&options))?
            .with_max_transitions(self.state_machine.max_transitions);
        Ok(machine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::Observatory;
    use std::io::Write;

    const MINIMAL: &str = r#"
[location]
latitude = 19.54
longitude = -155.58
"#;

    #[test]
    fn test_parse_minimal_config() {
        let config = ObservatoryConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.location.name, "observatory");
        assert_eq!(config.location.horizon, 30.0);
        assert_eq!(config.scheduler.constraints, ConstraintConfig::defaults());
        assert_eq!(config.camera, CameraSettings::default());
        assert_eq!(config.state_machine.states, nightly_states());
        assert!(config.build_state_machine().is_ok());

        let observer = config.to_observer();
        assert_eq!(observer.longitude.value(), -155.58);
        assert_eq!(observer.astro_horizon.value(), -18.0);
    }

    #[test]
    fn test_parse_full_config() {
        let config = ObservatoryConfig::parse(
            r#"
[location]
name = "Mauna Loa"
latitude = 19.54
longitude = -155.58
elevation = 3400.0
horizon = 25.0

[scheduler]
reread_field_list = false

[[scheduler.constraints]]
type = "altitude"
minimum = 40.0

[[scheduler.constraints]]
type = "duration"
weight = 2.0

[observatory]
take_flat_fields = true
start_mjd = 60000.0

[observatory.timing]
slew_time = 30.0

[camera]
type = "gphoto"
port = "usb:001,006"
capture_script = "/opt/pocs/scripts/take_pic.sh"
readout_time = 5.0
artist = "unit 7"

[state_machine]
max_transitions = 1000
"#,
        )
        .unwrap();

        assert_eq!(
            config.scheduler.constraints,
            vec![
                ConstraintConfig::Altitude {
                    weight: 1.0,
                    minimum: Some(40.0)
                },
                ConstraintConfig::Duration { weight: 2.0 },
            ]
        );
        assert_eq!(config.observatory.timing.slew_time.value(), 30.0);
        assert_eq!(config.observatory.timing.flat_count, 5);
        assert!(matches!(
            config.camera,
            CameraSettings::Gphoto { ref port, readout_time, .. } if port == "usb:001,006" && readout_time == 5.0
        ));
        assert!(matches!(
            config.camera,
            CameraSettings::Gphoto { ref gphoto_command, ref owner, ref artist, .. }
                if gphoto_command == "gphoto2" && owner == "obsctl" && artist.as_deref() == Some("unit 7")
        ));
        assert_eq!(config.build_camera().name(), "canon");

        let observatory = config.build_observatory();
        assert!(observatory.take_flat_fields());
        assert_eq!(observatory.now(), ModifiedJulianDate::new(60000.0));
        assert_eq!(config.state_machine.max_transitions, Some(1000));
    }

    #[test]
    fn test_rejects_invalid_values() {
        let bad_latitude = MINIMAL.replace("19.54", "95.0");
        assert!(matches!(
            ObservatoryConfig::parse(&bad_latitude),
            Err(ConfigError::Invalid(_))
        ));

        let bad_horizons = format!("{}civil_horizon = -20.0\n", MINIMAL);
        assert!(matches!(
            ObservatoryConfig::parse(&bad_horizons),
            Err(ConfigError::Invalid(_))
        ));

        let bad_weight = format!("{}\n[[scheduler.constraints]]\ntype = \"duration\"\nweight = -1.0\n", MINIMAL);
        assert!(matches!(
            ObservatoryConfig::parse(&bad_weight),
            Err(ConfigError::Invalid(_))
        ));

        let bad_graph = format!("{}\n[state_machine]\ninitial_state = \"parked\"\n", MINIMAL);
        assert!(matches!(
            ObservatoryConfig::parse(&bad_graph),
            Err(ConfigError::StateMachine(EngineError::InvalidGraph(_)))
        ));

        assert!(matches!(
            ObservatoryConfig::parse("[location]\nlatitude = \"north\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut fields = fs::File::create(dir.path().join("fields.toml")).unwrap();
        writeln!(fields, "[[fields]]\nname = \"M42\"\npriority = 10.0").unwrap();

        let config_path = dir.path().join("obsctl.toml");
        fs::write(
            &config_path,
            format!("{}\n[scheduler]\nfield_list = \"fields.toml\"\n", MINIMAL),
        )
        .unwrap();

        let config = ObservatoryConfig::from_file(&config_path).unwrap();
        let scheduler = config.build_scheduler().unwrap();
        assert!(scheduler.has_field_list());
        assert_eq!(scheduler.observations().len(), 1);
        assert!(scheduler.observation("M42").is_some());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ObservatoryConfig::from_file("/nonexistent/obsctl.toml"),
            Err(ConfigError::Read { .. })
        ));
    }
}
