use std::fmt;

use thiserror::Error;

/// Pipeline stage in which an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    NoticeParser,
    SkymapBuilder,
    Canonicalizer,
    OcclusionMasker,
    ContourGenerator,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::NoticeParser => "notice parser",
            Stage::SkymapBuilder => "skymap builder",
            Stage::Canonicalizer => "canonicalizer",
            Stage::OcclusionMasker => "occlusion masker",
            Stage::ContourGenerator => "contour generator",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum SkylocError {
    #[error("Required node is missing: {0}")]
    MissingNode(String),

    #[error("Malformed value for {field}: {value:?}")]
    MalformedValue { field: String, value: String },

    #[error("Unsupported localization representation: {0}")]
    UnsupportedRepresentation(String),

    #[error("Failed to fetch {url}: {source}")]
    FetchFailure {
        url: String,
        #[source]
        source: ureq::Error,
    },

    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Unable to parse the VOEvent document: {0}")]
    XmlError(#[from] quick_xml::DeError),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("FITS error: {0}")]
    FitsError(#[from] fitsio::errors::Error),

    #[error("Invalid base64 payload: {0}")]
    Base64Error(#[from] base64::DecodeError),

    #[error("Invalid configuration: {0}")]
    ConfigError(#[from] serde_json::Error),

    #[error("[{stage}] notice {notice}: {source}")]
    Stage {
        notice: String,
        stage: Stage,
        #[source]
        source: Box<SkylocError>,
    },
}

impl SkylocError {
    pub(crate) fn malformed(field: impl Into<String>, value: impl Into<String>) -> Self {
        SkylocError::MalformedValue {
            field: field.into(),
            value: value.into(),
        }
    }

    /// The innermost error, with any stage context stripped.
    pub fn root(&self) -> &SkylocError {
        match self {
            SkylocError::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Attach the notice identifier and the pipeline stage to a failure.
pub trait StageContext<T> {
    fn in_stage(self, notice: &str, stage: Stage) -> Result<T, SkylocError>;
}

impl<T> StageContext<T> for Result<T, SkylocError> {
    fn in_stage(self, notice: &str, stage: Stage) -> Result<T, SkylocError> {
        self.map_err(|err| SkylocError::Stage {
            notice: notice.to_string(),
            stage,
            source: Box::new(err),
        })
    }
}

impl PartialEq for SkylocError {
    fn eq(&self, other: &Self) -> bool {
        use SkylocError::*;
        match (self, other) {
            (MissingNode(a), MissingNode(b)) => a == b,
            (
                MalformedValue {
                    field: fa,
                    value: va,
                },
                MalformedValue {
                    field: fb,
                    value: vb,
                },
            ) => fa == fb && va == vb,
            (UnsupportedRepresentation(a), UnsupportedRepresentation(b)) => a == b,
            (IntegrityViolation(a), IntegrityViolation(b)) => a == b,

            // not comparable: same variant is enough
            (FetchFailure { url: a, .. }, FetchFailure { url: b, .. }) => a == b,
            (XmlError(_), XmlError(_)) => true,
            (IoError(_), IoError(_)) => true,
            (FitsError(_), FitsError(_)) => true,
            (Base64Error(a), Base64Error(b)) => a == b,
            (ConfigError(_), ConfigError(_)) => true,

            (
                Stage {
                    notice: na,
                    stage: sa,
                    source: ea,
                },
                Stage {
                    notice: nb,
                    stage: sb,
                    source: eb,
                },
            ) => na == nb && sa == sb && ea == eb,

            _ => false,
        }
    }
}
