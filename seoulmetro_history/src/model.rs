use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};


/// How crowded a station was at the time of an observation.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum CongestionLevel {
    Relaxed,
    Normal,
    Crowded,
    VeryCrowded,
}
impl CongestionLevel {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Relaxed => "여유",
            Self::Normal => "보통",
            Self::Crowded => "혼잡",
            Self::VeryCrowded => "매우혼잡",
        }
    }
}
impl fmt::Display for CongestionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
impl FromStr for CongestionLevel {
    type Err = UnknownCongestionLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed {
            "여유" => return Ok(Self::Relaxed),
            "보통" => return Ok(Self::Normal),
            "혼잡" => return Ok(Self::Crowded),
            "매우혼잡" | "매우 혼잡" => return Ok(Self::VeryCrowded),
            _ => {},
        }
        match trimmed.to_lowercase().as_str() {
            "relaxed" => Ok(Self::Relaxed),
            "normal" => Ok(Self::Normal),
            "crowded" => Ok(Self::Crowded),
            "very_crowded"|"verycrowded" => Ok(Self::VeryCrowded),
            _ => Err(UnknownCongestionLevel(trimmed.to_owned())),
        }
    }
}
impl Serialize for CongestionLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.label().serialize(serializer)
    }
}


#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct UnknownCongestionLevel(pub String);
impl fmt::Display for UnknownCongestionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown congestion level {:?}", self.0)
    }
}
impl std::error::Error for UnknownCongestionLevel {
}


/// Passenger counts at which the congestion level steps up.
///
/// Used for source rows that do not carry a stored level.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct CongestionThresholds {
    #[serde(default = "CongestionThresholds::default_relaxed_below")]
    pub relaxed_below: u64,

    #[serde(default = "CongestionThresholds::default_normal_below")]
    pub normal_below: u64,

    #[serde(default = "CongestionThresholds::default_crowded_below")]
    pub crowded_below: u64,
}
impl CongestionThresholds {
    fn default_relaxed_below() -> u64 { 200 }
    fn default_normal_below() -> u64 { 400 }
    fn default_crowded_below() -> u64 { 800 }

    pub fn classify(&self, passenger_count: u64) -> CongestionLevel {
        if passenger_count < self.relaxed_below {
            CongestionLevel::Relaxed
        } else if passenger_count < self.normal_below {
            CongestionLevel::Normal
        } else if passenger_count < self.crowded_below {
            CongestionLevel::Crowded
        } else {
            CongestionLevel::VeryCrowded
        }
    }

    /// Whether the thresholds never step down; otherwise some levels are unreachable.
    pub fn is_ascending(&self) -> bool {
        self.relaxed_below <= self.normal_below && self.normal_below <= self.crowded_below
    }
}
impl Default for CongestionThresholds {
    fn default() -> Self {
        Self {
            relaxed_below: Self::default_relaxed_below(),
            normal_below: Self::default_normal_below(),
            crowded_below: Self::default_crowded_below(),
        }
    }
}


/// One ridership observation for a station on a line at a point in time.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalRecord {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub station_id: String,
    pub station_name: String,
    pub line_num: String,
    pub passenger_count: u64,
    pub congestion_level: CongestionLevel,
}
impl HistoricalRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        station_id: String,
        station_name: String,
        line_num: String,
        passenger_count: u64,
        congestion_level: CongestionLevel,
    ) -> Self {
        Self {
            timestamp,
            station_id,
            station_name,
            line_num,
            passenger_count,
            congestion_level,
        }
    }
}


/// Formats a timestamp as ISO-8601 in UTC with millisecond precision,
/// e.g. `2024-01-01T08:00:00.000Z`.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn serialize_timestamp<S: Serializer>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    format_timestamp(timestamp).serialize(serializer)
}


#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_congestion_level_labels() {
        assert_eq!("여유", CongestionLevel::Relaxed.to_string());
        assert_eq!("보통", CongestionLevel::Normal.to_string());
        assert_eq!("혼잡", CongestionLevel::Crowded.to_string());
        assert_eq!("매우혼잡", CongestionLevel::VeryCrowded.to_string());
    }

    #[test]
    fn test_congestion_level_parse() {
        assert_eq!(Ok(CongestionLevel::Crowded), "혼잡".parse::<CongestionLevel>());
        assert_eq!(Ok(CongestionLevel::Crowded), " Crowded ".parse::<CongestionLevel>());
        assert_eq!(Ok(CongestionLevel::VeryCrowded), "very_crowded".parse::<CongestionLevel>());
        assert_eq!(Ok(CongestionLevel::VeryCrowded), "매우 혼잡".parse::<CongestionLevel>());
        assert_eq!(
            Err(UnknownCongestionLevel("packed".to_owned())),
            "packed".parse::<CongestionLevel>(),
        );
    }

    #[test]
    fn test_default_thresholds() {
        let thresholds = CongestionThresholds::default();
        assert_eq!(CongestionLevel::Relaxed, thresholds.classify(0));
        assert_eq!(CongestionLevel::Relaxed, thresholds.classify(199));
        assert_eq!(CongestionLevel::Normal, thresholds.classify(200));
        assert_eq!(CongestionLevel::Crowded, thresholds.classify(500));
        assert_eq!(CongestionLevel::VeryCrowded, thresholds.classify(800));
        assert_eq!(CongestionLevel::VeryCrowded, thresholds.classify(u64::MAX));
    }

    #[test]
    fn test_thresholds_ascending() {
        assert!(CongestionThresholds::default().is_ascending());
        assert!(CongestionThresholds { relaxed_below: 300, normal_below: 300, crowded_below: 300 }.is_ascending());

        let out_of_order = CongestionThresholds {
            relaxed_below: 500,
            ..CongestionThresholds::default()
        };
        assert!(!out_of_order.is_ascending());
    }

    #[test]
    fn test_format_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        assert_eq!("2024-01-01T08:00:00.000Z", format_timestamp(&ts));
    }

    #[test]
    fn test_record_json() {
        let record = HistoricalRecord::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
            "222".to_owned(),
            "강남".to_owned(),
            "2".to_owned(),
            500,
            CongestionLevel::Crowded,
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            serde_json::json!({
                "timestamp": "2024-01-01T08:00:00.000Z",
                "stationId": "222",
                "stationName": "강남",
                "lineNum": "2",
                "passengerCount": 500,
                "congestionLevel": "혼잡"
            }),
            value,
        );
    }
}
