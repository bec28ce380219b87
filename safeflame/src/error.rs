use thiserror::Error;

/// Failures raised while loading, validating or updating an `EngineConfig`.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    #[error("config key `{key}` expects {expected}")]
    InvalidValue { key: String, expected: &'static str },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Boundary failures of the engine facade. The per-tick evaluation itself never fails.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("frame buffer holds {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    FrameSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate zone name: {0}")]
    DuplicateZone(String),

    #[error("zone `{0}` needs a positive size that fits the frame coordinate range")]
    InvalidZone(String),

    #[error("no zone named `{0}`")]
    UnknownZone(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
