use std::error;
use std::fmt;
use std::io;

use seoulmetro_history::model::CongestionThresholds;


#[derive(Debug)]
pub(crate) enum ConfigError {
    OpeningFile(io::Error),
    Loading(toml::de::Error),
    InvalidThresholds(CongestionThresholds),
}
impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::OpeningFile(e)
                => write!(f, "error opening config file: {}", e),
            ConfigError::Loading(e)
                => write!(f, "error loading configuration: {}", e),
            ConfigError::InvalidThresholds(t)
                => write!(
                    f, "congestion thresholds must be ascending, got relaxed_below = {}, normal_below = {}, crowded_below = {}",
                    t.relaxed_below, t.normal_below, t.crowded_below,
                ),
        }
    }
}
impl error::Error for ConfigError {
}


#[derive(Debug)]
pub(crate) enum GeneralError {
    Config(ConfigError),
    Listening(io::Error),
}
impl fmt::Display for GeneralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneralError::Config(e)
                => write!(f, "{}", e),
            GeneralError::Listening(e)
                => write!(f, "error binding listening socket: {}", e),
        }
    }
}
impl error::Error for GeneralError {
}
impl From<ConfigError> for GeneralError {
    fn from(e: ConfigError) -> Self {
        GeneralError::Config(e)
    }
}
