//! Encoder configuration: key names, value formatters and the entry assembly switches.

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::Deserialize;

use crate::context::ServiceContext;
use crate::entry::Caller;
use crate::error::{Error, Result};
use crate::level::{Level, Severity};
use crate::marshal::PrimitiveArrayEncoder;

/// Formats the level of an entry.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelEncoder {
    /// `INFO`, `WARNING`, ... as understood by Google Cloud Logging.
    #[default]
    Severity,
    Lowercase,
    Capital,
    #[serde(skip)]
    Custom(fn(Level, &mut dyn PrimitiveArrayEncoder)),
}

impl LevelEncoder {
    pub fn encode(&self, level: Level, enc: &mut dyn PrimitiveArrayEncoder) {
        match self {
            LevelEncoder::Severity => enc.append_string(Severity::from(level).as_str()),
            LevelEncoder::Lowercase => enc.append_string(level.as_str()),
            LevelEncoder::Capital => enc.append_string(level.as_capital_str()),
            LevelEncoder::Custom(f) => f(level, enc),
        }
    }
}

/// Formats timestamps.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeEncoder {
    /// `2018-06-19T16:33:42.000Z`
    #[default]
    Rfc3339Millis,
    /// `2018-06-19T16:33:42.000000000Z`
    Rfc3339Nanos,
    /// Floating point seconds since the Unix epoch.
    Epoch,
    /// Floating point milliseconds since the Unix epoch.
    EpochMillis,
    /// Integer nanoseconds since the Unix epoch.
    EpochNanos,
    #[serde(skip)]
    Custom(fn(DateTime<Utc>, &mut dyn PrimitiveArrayEncoder)),
}

impl TimeEncoder {
    pub fn encode(&self, t: DateTime<Utc>, enc: &mut dyn PrimitiveArrayEncoder) {
        match self {
            TimeEncoder::Rfc3339Millis => {
                enc.append_string(&t.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            TimeEncoder::Rfc3339Nanos => {
                enc.append_string(&t.to_rfc3339_opts(SecondsFormat::Nanos, true))
            }
            TimeEncoder::Epoch => enc.append_float64(
                t.timestamp() as f64 + f64::from(t.timestamp_subsec_nanos()) / 1e9,
            ),
            TimeEncoder::EpochMillis => enc.append_float64(
                t.timestamp() as f64 * 1e3 + f64::from(t.timestamp_subsec_nanos()) / 1e6,
            ),
            TimeEncoder::EpochNanos => enc.append_int64(unix_nanos(t)),
            TimeEncoder::Custom(f) => f(t, enc),
        }
    }
}

/// Formats durations.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationEncoder {
    /// Floating point seconds.
    #[default]
    Seconds,
    /// Integer nanoseconds.
    Nanos,
    /// The `google.protobuf.Duration` JSON form used by the Logging API, e.g. `"3.5s"`.
    String,
    #[serde(skip)]
    Custom(fn(TimeDelta, &mut dyn PrimitiveArrayEncoder)),
}

impl DurationEncoder {
    pub fn encode(&self, d: TimeDelta, enc: &mut dyn PrimitiveArrayEncoder) {
        match self {
            DurationEncoder::Seconds => enc.append_float64(duration_seconds(d)),
            DurationEncoder::Nanos => enc.append_int64(duration_nanos(d)),
            DurationEncoder::String => enc.append_string(&duration_string(d)),
            DurationEncoder::Custom(f) => f(d, enc),
        }
    }
}

/// Formats the call site of an entry.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerEncoder {
    Full,
    /// Only the file and its parent directory.
    #[default]
    Short,
    #[serde(skip)]
    Custom(fn(&Caller, &mut dyn PrimitiveArrayEncoder)),
}

impl CallerEncoder {
    pub fn encode(&self, caller: &Caller, enc: &mut dyn PrimitiveArrayEncoder) {
        match self {
            CallerEncoder::Full => enc.append_string(&caller.full_path()),
            CallerEncoder::Short => enc.append_string(&caller.trimmed_path()),
            CallerEncoder::Custom(f) => f(caller, enc),
        }
    }
}

/// Formats the logger name.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameEncoder {
    #[default]
    Full,
    #[serde(skip)]
    Custom(fn(&str, &mut dyn PrimitiveArrayEncoder)),
}

impl NameEncoder {
    pub fn encode(&self, name: &str, enc: &mut dyn PrimitiveArrayEncoder) {
        match self {
            NameEncoder::Full => enc.append_string(name),
            NameEncoder::Custom(f) => f(name, enc),
        }
    }
}

/// Controls the layout of every encoded entry. A key set to the empty string leaves the
/// corresponding value out of the output.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub message_key: String,
    pub level_key: String,
    pub time_key: String,
    pub name_key: String,
    pub caller_key: String,
    pub stacktrace_key: String,
    /// Written after the closing brace of each entry.
    pub line_ending: String,
    pub encode_level: LevelEncoder,
    pub encode_time: TimeEncoder,
    pub encode_duration: DurationEncoder,
    pub encode_caller: CallerEncoder,
    pub encode_name: NameEncoder,
    /// Adds the call site of an entry as `context.reportLocation`.
    pub report_location: bool,
    /// Adds the call site of an entry as `logging.googleapis.com/sourceLocation`.
    pub source_location: bool,
    /// Only the Stackdriver context survives entry assembly, all other fields are dropped.
    pub drop_non_context_fields: bool,
    /// Added to every entry as `serviceContext` when set.
    pub service_context: Option<ServiceContext>,
}

impl EncoderConfig {
    /// The layout Google Cloud Logging and Error Reporting understand.
    pub fn stackdriver() -> Self {
        Self {
            message_key: "message".to_string(),
            level_key: "severity".to_string(),
            time_key: "eventTime".to_string(),
            name_key: "logger".to_string(),
            caller_key: "caller".to_string(),
            stacktrace_key: "stacktrace".to_string(),
            line_ending: "\n".to_string(),
            encode_level: LevelEncoder::Severity,
            encode_time: TimeEncoder::Rfc3339Millis,
            encode_duration: DurationEncoder::Seconds,
            encode_caller: CallerEncoder::Short,
            encode_name: NameEncoder::Full,
            report_location: true,
            source_location: false,
            drop_non_context_fields: false,
            service_context: None,
        }
    }

    /// Reads a configuration from JSON. Absent keys keep their [`EncoderConfig::stackdriver`]
    /// values.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Error::ConfigError)
    }

    #[must_use]
    pub fn with_service_context(self, service_context: ServiceContext) -> Self {
        Self {
            service_context: Some(service_context),
            ..self
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self::stackdriver()
    }
}

/// Nanoseconds since the Unix epoch, saturating outside of the years 1677 to 2262.
pub(crate) fn unix_nanos(t: DateTime<Utc>) -> i64 {
    t.timestamp_nanos_opt().unwrap_or(if t.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}

/// Saturates at roughly 292 years.
pub(crate) fn duration_nanos(d: TimeDelta) -> i64 {
    d.num_nanoseconds().unwrap_or(if d < TimeDelta::zero() {
        i64::MIN
    } else {
        i64::MAX
    })
}

fn duration_seconds(d: TimeDelta) -> f64 {
    d.num_seconds() as f64 + f64::from(d.subsec_nanos()) / 1e9
}

pub(crate) fn duration_string(d: TimeDelta) -> String {
    let mut out = String::new();
    if d < TimeDelta::zero() {
        out.push('-');
    }
    let d = d.abs();
    out.push_str(&d.num_seconds().to_string());
    let nanos = d.subsec_nanos();
    if nanos > 0 {
        let frac = format!("{:09}", nanos);
        out.push('.');
        out.push_str(frac.trim_end_matches('0'));
    }
    out.push('s');
    out
}
