use std::fmt;

#[derive(Debug)]
pub enum AetherError {
    Preset(PresetError),
}

#[derive(Debug)]
pub enum PresetError {
    Json(serde_json::Error),
    UnsupportedVersion { found: u32, supported: u32 },
    EmptyName,
}

impl fmt::Display for AetherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AetherError::Preset(e) => write!(f, "Preset error: {e}"),
        }
    }
}

impl std::error::Error for AetherError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AetherError::Preset(e) => Some(e),
        }
    }
}

impl fmt::Display for PresetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresetError::Json(e) => write!(f, "Malformed preset JSON: {e}"),
            PresetError::UnsupportedVersion { found, supported } => {
                write!(f, "Preset version {found} is newer than supported version {supported}")
            }
            PresetError::EmptyName => write!(f, "Preset name must not be empty"),
        }
    }
}

impl std::error::Error for PresetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PresetError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PresetError> for AetherError {
    fn from(e: PresetError) -> Self {
        AetherError::Preset(e)
    }
}

impl From<serde_json::Error> for PresetError {
    fn from(e: serde_json::Error) -> Self {
        PresetError::Json(e)
    }
}

impl From<serde_json::Error> for AetherError {
    fn from(e: serde_json::Error) -> Self {
        AetherError::Preset(PresetError::Json(e))
    }
}
