use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Input fields for one candidate, as ingested from a profiles file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSeed {
    /// Upstream record id; re-importing the same `source_ref` updates inputs
    /// instead of creating a second profile.
    pub source_ref: Option<String>,
    pub name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub profile_url: Option<String>,
    pub additional_info: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileSeedsFile {
    pub profiles: Vec<ProfileSeed>,
}

/// Load and validate profile seeds from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_profile_seeds(path: &Path) -> Result<ProfileSeedsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ProfilesFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_profile_seeds(&content)
}

/// Parse and validate profile seeds from YAML text.
///
/// # Errors
///
/// Returns `ConfigError` if the text does not parse or fails validation.
pub fn parse_profile_seeds(content: &str) -> Result<ProfileSeedsFile, ConfigError> {
    let file: ProfileSeedsFile = serde_yaml::from_str(content)?;
    validate_seeds(&file)?;
    Ok(file)
}

fn validate_seeds(file: &ProfileSeedsFile) -> Result<(), ConfigError> {
    let mut seen_refs = HashSet::new();

    for seed in &file.profiles {
        if seed.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "profile name must be non-empty".to_string(),
            ));
        }

        if let Some(source_ref) = &seed.source_ref {
            if !seen_refs.insert(source_ref.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate source_ref: '{source_ref}'"
                )));
            }
        }
    }

    Ok(())
}
