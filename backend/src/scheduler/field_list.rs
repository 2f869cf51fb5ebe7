//! Sources for the observation pool.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::error::{SchedulerError, SchedulerResult};
use crate::models::Observation;

/// Supplies the observation pool on demand.
pub trait FieldListSource: Send + Sync {
    fn load(&self) -> SchedulerResult<Vec<Observation>>;
}

/// On-disk field list document.
///
/// ```toml
/// [[fields]]
/// name = "M42"
/// priority = 10.0
/// target = { ra = 83.82, dec = -5.39 }
/// exposure = { exposure_time = 120.0, min_exposures = 60, exposures_per_set = 10 }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldList {
    #[serde(default)]
    pub fields: Vec<Observation>,
}

impl FieldList {
    /// Validates every entry and rejects duplicate names.
    pub fn into_observations(self) -> SchedulerResult<Vec<Observation>> {
        {
            let mut seen = HashSet::new();
            for observation in &self.fields {
                observation
                    .validate()
                    .map_err(|reason| SchedulerError::InvalidObservation {
                        name: observation.name.clone(),
                        reason,
                    })?;
                if !seen.insert(observation.name.as_str()) {
                    return Err(SchedulerError::DuplicateObservation(
                        observation.name.clone(),
                    ));
                }
            }
        }
        Ok(self.fields)
    }
}

/// Field list stored as a JSON or TOML file, picked by extension.
#[derive(Debug, Clone)]
pub struct FieldListFile {
    path: PathBuf,
}

impl FieldListFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FieldListSource for FieldListFile {
    fn load(&self) -> SchedulerResult<Vec<Observation>> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            SchedulerError::FieldList(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase);

        let list: FieldList = match extension.as_deref() {
            Some("json") => serde_json::from_str(&content).map_err(|e| {
                SchedulerError::FieldList(format!(
                    "Failed to parse {}: {}",
                    self.path.display(),
                    e
                ))
            })?,
            Some("toml") => toml::from_str(&content).map_err(|e| {
                SchedulerError::FieldList(format!(
                    "Failed to parse {}: {}",
                    self.path.display(),
                    e
                ))
            })?,
            other => {
                return Err(SchedulerError::FieldList(format!(
                    "Unsupported field list format: {}",
                    other.unwrap_or("<none>")
                )))
            }
        };

        list.into_observations()
    }
}

/// In-memory field list.
#[derive(Debug, Clone, Default)]
pub struct StaticFieldList(pub Vec<Observation>);

impl FieldListSource for StaticFieldList {
    fn load(&self) -> SchedulerResult<Vec<Observation>> {
        FieldList {
            fields: self.0.clone(),
        }
        .into_observations()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_toml_field_list() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[[fields]]
name = "M42"
priority = 10.0
target = {{ ra = 83.82, dec = -5.39 }}

[[fields]]
name = "Wasp 33"
priority = 100.0
exposure = {{ exposure_time = 60.0, min_exposures = 30 }}
"#
        )
        .unwrap();

        let observations = FieldListFile::new(file.path()).load().unwrap();
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].name, "M42");
        assert_eq!(observations[1].exposure.exposure_time.value(), 60.0);
        assert_eq!(observations[1].exposure.exposures_per_set, 10);
    }

    #[test]
    fn test_load_json_field_list() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"fields": [{{"name": "HD 189733", "priority": 100, "target": {{"ra": 300.18, "dec": 22.71}}}}]}}"#
        )
        .unwrap();

        let observations = FieldListFile::new(file.path()).load().unwrap();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].priority, 100.0);
    }

    #[test]
    fn test_rejects_duplicates_and_unknown_formats() {
        let duplicate = StaticFieldList(vec![Observation::new("A", 0.0), Observation::new("A", 1.0)]);
        assert!(matches!(
            duplicate.load(),
            Err(SchedulerError::DuplicateObservation(name)) if name == "A"
        ));

        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        assert!(matches!(
            FieldListFile::new(file.path()).load(),
            Err(SchedulerError::FieldList(_))
        ));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = FieldListFile::new("/nonexistent/fields.toml")
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
