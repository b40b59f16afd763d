use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::detection::domain::face_detector_adapter::DEFAULT_MIN_CONFIDENCE;
use crate::extraction::domain::feature_extractor::CropRequirements;
use crate::matching::domain::match_engine::MatchPolicy;
use crate::remote::domain::remote_config::RemoteConfig;
use crate::shared::constants::APP_DIR_NAME;
use crate::verification::domain::quality_gate::QualityGate;
use crate::verification::domain::session_config::SessionSettings;

const SETTINGS_FILE: &str = "settings.json";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Detections below this confidence are discarded by the adapter.
    pub min_confidence: f64,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

/// Every tunable of the verification pipeline. Missing fields take their
/// defaults, so partial files load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    pub detection: DetectionSettings,
    pub gating: QualityGate,
    pub extraction: CropRequirements,
    pub matching: MatchPolicy,
    pub session: SessionSettings,
    pub remote: RemoteConfig,
}

impl VerificationSettings {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(SETTINGS_FILE))
    }

    /// Reads and validates `path`.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let json = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = serde_json::from_str(&json).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads the user's settings file, or defaults when there is none.
    pub fn load_default() -> Result<Self, SettingsError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let io_err = |source: std::io::Error| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(io_err)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        unit_range("detection.min_confidence", self.detection.min_confidence)?;
        unit_range("gating.min_confidence", self.gating.min_confidence)?;
        unit_range("gating.max_profile_ratio", self.gating.max_profile_ratio)?;
        non_zero("gating.min_face_size", self.gating.min_face_size as u64)?;
        if !(0.0..=180.0).contains(&self.gating.max_roll_degrees) {
            return Err(invalid("gating.max_roll_degrees", self.gating.max_roll_degrees, "0..=180"));
        }
        non_zero("extraction.min_crop_size", self.extraction.min_crop_size as u64)?;
        if self.extraction.min_sharpness.is_nan() || self.extraction.min_sharpness < 0.0 {
            return Err(invalid("extraction.min_sharpness", self.extraction.min_sharpness, ">= 0"));
        }
        unit_range("matching.threshold", self.matching.threshold)?;
        if !(0.0..=1.0).contains(&self.matching.ambiguity_epsilon) {
            return Err(invalid(
                "matching.ambiguity_epsilon",
                self.matching.ambiguity_epsilon,
                "0..=1",
            ));
        }
        non_zero("session.face_timeout_ms", self.session.face_timeout_ms)?;
        non_zero("remote.request_timeout_ms", self.remote.request_timeout_ms)?;
        non_zero("remote.network_timeout_ms", self.remote.network_timeout_ms)?;
        if self.remote.retry.base_delay_ms > self.remote.retry.max_delay_ms {
            return Err(SettingsError::Invalid(format!(
                "remote.retry.base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.remote.retry.base_delay_ms, self.remote.retry.max_delay_ms
            )));
        }
        if let Some(base_url) = &self.remote.base_url {
            validate_base_url(base_url)?;
        }
        Ok(())
    }
}

fn validate_base_url(base_url: &str) -> Result<(), SettingsError> {
    let parsed = Url::parse(base_url).map_err(|e| {
        SettingsError::Invalid(format!("remote.base_url '{base_url}' is not a URL: {e}"))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(SettingsError::Invalid(format!(
            "remote.base_url must be an http(s) URL with a host, got '{base_url}'"
        )));
    }
    Ok(())
}

fn unit_range(name: &str, value: f64) -> Result<(), SettingsError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(name, value, "0..=1"))
    }
}

fn non_zero(name: &str, value: u64) -> Result<(), SettingsError> {
    if value == 0 {
        Err(SettingsError::Invalid(format!("{name} must be greater than 0")))
    } else {
        Ok(())
    }
}

fn invalid(name: &str, value: f64, range: &str) -> SettingsError {
    SettingsError::Invalid(format!("{name} must be in {range}, got {value}"))
}
