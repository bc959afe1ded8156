use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use seoulmetro_history::model::CongestionThresholds;
use seoulmetro_history::source::{KST_OFFSET_MINUTES, SourceOptions};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;


#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct WebConfig {
    pub listen: SocketAddr,

    #[serde(default = "WebConfig::default_source_path")]
    pub source_path: PathBuf,

    #[serde(default)]
    pub preload_cache: bool,

    #[serde(default = "WebConfig::default_source_utc_offset_minutes")]
    pub source_utc_offset_minutes: i32,

    #[serde(default)]
    pub congestion: CongestionThresholds,
}
impl WebConfig {
    fn default_source_path() -> PathBuf { PathBuf::from("subway_passengers.csv") }
    fn default_source_utc_offset_minutes() -> i32 { KST_OFFSET_MINUTES }

    pub fn source_options(&self) -> SourceOptions {
        SourceOptions {
            utc_offset_minutes: self.source_utc_offset_minutes,
            thresholds: self.congestion,
        }
    }
}


pub(crate) fn load_config(path: &Path) -> Result<WebConfig, ConfigError> {
    let text = fs::read_to_string(path)
        .map_err(|e| ConfigError::OpeningFile(e))?;
    parse_config(&text)
}

pub(crate) fn parse_config(text: &str) -> Result<WebConfig, ConfigError> {
    let config: WebConfig = toml::from_str(text)
        .map_err(|e| ConfigError::Loading(e))?;
    if !config.congestion.is_ascending() {
        return Err(ConfigError::InvalidThresholds(config.congestion));
    }
    Ok(config)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config: WebConfig = toml::from_str("listen = \"127.0.0.1:3000\"\n").unwrap();
        assert_eq!("127.0.0.1:3000".parse::<SocketAddr>().unwrap(), config.listen);
        assert_eq!(PathBuf::from("subway_passengers.csv"), config.source_path);
        assert!(!config.preload_cache);
        assert_eq!(SourceOptions::default(), config.source_options());
    }

    #[test]
    fn test_full_config() {
        let config: WebConfig = toml::from_str("
            listen = \"0.0.0.0:8080\"
            source_path = \"data/ridership.csv\"
            preload_cache = true
            source_utc_offset_minutes = 0

            [congestion]
            relaxed_below = 100
            crowded_below = 1000
        ").unwrap();
        assert_eq!(PathBuf::from("data/ridership.csv"), config.source_path);
        assert!(config.preload_cache);

        let options = config.source_options();
        assert_eq!(0, options.utc_offset_minutes);
        assert_eq!(100, options.thresholds.relaxed_below);
        assert_eq!(400, options.thresholds.normal_below);
        assert_eq!(1000, options.thresholds.crowded_below);
    }

    #[test]
    fn test_missing_listen_rejected() {
        assert!(toml::from_str::<WebConfig>("preload_cache = true\n").is_err());
    }

    #[test]
    fn test_unordered_thresholds_rejected() {
        let err = parse_config("
            listen = \"127.0.0.1:3000\"

            [congestion]
            relaxed_below = 500
            normal_below = 400
        ").unwrap_err();
        match err {
            ConfigError::InvalidThresholds(thresholds) => {
                assert_eq!(500, thresholds.relaxed_below);
                assert_eq!(400, thresholds.normal_below);
            },
            other => panic!("unexpected error {:?}", other),
        }

        assert!(parse_config("listen = \"127.0.0.1:3000\"\n").is_ok());
    }
}
