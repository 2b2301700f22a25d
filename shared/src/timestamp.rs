use chrono::{DateTime, Utc};
use serde::Deserialize;

/// The "no star yet" timestamp.
pub fn epoch_zero() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

pub fn from_epoch_seconds(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(seconds.checked_mul(1000)?)
}

/// Seconds since the epoch as the leaderboard API sends them: a number or a
/// numeric string, with `0` meaning "never".
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Default for RawTimestamp {
    fn default() -> Self {
        Self::Integer(0)
    }
}

impl RawTimestamp {
    pub fn is_sentinel(&self) -> bool {
        match self {
            Self::Integer(value) => *value == 0,
            Self::Float(value) => *value == 0.0,
            Self::Text(value) => {
                let value = value.trim();
                value.is_empty() || value == "0"
            }
        }
    }

    /// `None` if the value cannot be read as epoch seconds.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        if self.is_sentinel() {
            return Some(epoch_zero());
        }

        let seconds = match self {
            Self::Integer(value) => *value,
            Self::Float(value) if value.is_finite() => value.trunc() as i64,
            Self::Float(_) => return None,
            Self::Text(value) => {
                let value = value.trim();
                match value.parse::<i64>() {
                    Ok(seconds) => seconds,
                    Err(_) => {
                        let seconds = value.parse::<f64>().ok().filter(|v| v.is_finite())?;
                        seconds.trunc() as i64
                    }
                }
            }
        };
        from_epoch_seconds(seconds)
    }
}
