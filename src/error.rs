// src/error.rs

use crate::types::LaneId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug)]
pub enum Error {
    /// A lane region with fewer than three vertices.
    InvalidPolygon { lane: LaneId, points: usize },
    InvalidConfig(String),
    /// The lane's frame source cannot be opened or never yields a frame.
    /// Fatal to that lane only.
    SourceUnavailable { lane: LaneId, reason: String },
    Detector(String),
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Json(serde_json::Error),
}

impl Error {
    pub fn source_unavailable(lane: LaneId, reason: impl Into<String>) -> Self {
        Error::SourceUnavailable {
            lane,
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Yaml(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

#[cfg(feature = "vision")]
impl From<opencv::Error> for Error {
    fn from(err: opencv::Error) -> Self {
        Error::Detector(format!("OpenCV: {}", err))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidPolygon { lane, points } => write!(
                f,
                "Invalid detection region for {}: {} point(s), at least 3 required",
                lane, points
            ),
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::SourceUnavailable { lane, reason } => {
                write!(f, "Frame source for {} unavailable: {}", lane, reason)
            }
            Error::Detector(msg) => write!(f, "Detector error: {}", msg),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Yaml(e) => write!(f, "YAML error: {}", e),
            Error::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Yaml(e) => Some(e),
            Error::Json(e) => Some(e),
            _ => None,
        }
    }
}
