use std::collections::HashMap;
use std::fmt::{self, Display, Write};
use std::sync::mpsc::{sync_channel, Receiver};

use chrono::Utc;
use google_logging2::api::{MonitoredResource, WriteLogEntriesRequest};
use slog::{Drain, Key, Level, OwnedKVList, Record, KV};
use stackdriver_bufpool::Pool;

use crate::config::EncoderConfig;
use crate::core::Core;
use crate::entry::{Caller, Entry};
use crate::error::{Error, Result};
use crate::field::Field;
use crate::sink::{ChannelSink, Sink};

/// How many requests [`Builder::build`] buffers before entries are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Builder for the [`Logger`]
#[derive(Debug)]
pub struct Builder {
    log_name: String,
    log_level_label: Option<String>,
    resource_type: String,
    default_labels: HashMap<String, String>,
    resource_labels: Option<HashMap<String, String>>,
    logger_name: String,
    config: EncoderConfig,
    pool: Option<Pool>,
    channel_capacity: usize,
}

/// A slog drain that encodes every record as a Stackdriver JSON entry.
pub struct Logger<S> {
    core: Core<S>,
    logger_name: String,
}

impl Builder {
    /// Creates a Builder object.
    ///
    /// # Parameters
    /// - `log_name`: The `logName` string to be used in the [LogEntry](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry)
    /// - `resource_type`: The required `type` field set in the `resource` [MonitoredResource](https://cloud.google.com/logging/docs/reference/v2/rest/v2/MonitoredResource) object of the [LogEntry](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry). For example: `k8s_container`.
    ///
    /// # Example
    ///
    /// ```
    /// use slog_stackdriver::logger::Builder;
    /// let (drain, _) = Builder::new(
    ///     "projects/my-gcp-project/logs/my-log-id",
    ///     "k8s_container",
    /// )
    /// .build();
    /// ```
    #[must_use = "The builder must be used"]
    pub fn new(log_name: &str, resource_type: &str) -> Self {
        Self {
            log_name: log_name.to_string(),
            log_level_label: None,
            resource_type: resource_type.to_string(),
            default_labels: HashMap::new(),
            resource_labels: None,
            logger_name: String::new(),
            config: EncoderConfig::stackdriver(),
            pool: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Sets resource labels to be applied.
    ///
    /// These labels will populate the `labels` field in the `resource` [MonitoredResource](https://cloud.google.com/logging/docs/reference/v2/rest/v2/MonitoredResource) object of the [LogEntry](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry).
    ///
    /// # Example
    ///
    /// ```
    /// use serde_json::json;
    /// let resource_labels = json!(
    /// {
    ///     "location": "europe-west1-b",
    ///     "pod_name": std::env::var("HOSTNAME").unwrap_or_default(),
    ///     "container_name": "my-app",
    ///     "project_id": "my-gcp-project",
    ///     "cluster_name": "my-gke-cluster",
    ///     "namespace_name": "my-gke-namespace"
    /// });
    ///
    /// use slog_stackdriver::logger::Builder;
    /// let (drain, _) = Builder::new(
    ///     "projects/my-gcp-project/logs/my-log-id",
    ///     "k8s_container",
    /// )
    /// .with_resource_labels(resource_labels)
    /// .unwrap()
    /// .build();
    /// ```
    ///
    /// # Errors
    ///
    /// Will return `Err` if `labels` is not an object of strings.
    pub fn with_resource_labels(self, labels: serde_json::Value) -> Result<Self> {
        Ok(Self {
            resource_labels: Some(
                serde_json::from_value(labels).map_err(Error::ResourceLabelsError)?,
            ),
            ..self
        })
    }

    /// Sets default labels to be applied in the labels field.
    ///
    /// These will populate the `labels` top level field of the [LogEntry](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry).
    ///
    /// # Errors
    ///
    /// Will return `Err` if `labels` is not an object of strings.
    pub fn with_default_labels(self, labels: serde_json::Value) -> Result<Self> {
        Ok(Self {
            default_labels: serde_json::from_value(labels).map_err(Error::DefaultLabelsError)?,
            ..self
        })
    }

    /// Sets the label name to store the log level
    ///
    /// If set, the log level value is added under this label the `labels` top level field of the [LogEntry](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry)
    ///
    /// If not set, the log level is not propagated, but you will still have the [severity](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry#LogSeverity), which is always there.
    #[must_use = "The builder must be used"]
    pub fn with_log_level_label(self, log_level_label: &str) -> Self {
        Self {
            log_level_label: Some(log_level_label.into()),
            ..self
        }
    }

    /// Sets the name written under the logger key of every entry.
    #[must_use = "The builder must be used"]
    pub fn with_logger_name(self, logger_name: &str) -> Self {
        Self {
            logger_name: logger_name.into(),
            ..self
        }
    }

    #[must_use = "The builder must be used"]
    pub fn with_encoder_config(self, config: EncoderConfig) -> Self {
        Self { config, ..self }
    }

    /// Shares a buffer pool with other loggers. Without one, the logger gets a pool of its own.
    #[must_use = "The builder must be used"]
    pub fn with_pool(self, pool: Pool) -> Self {
        Self {
            pool: Some(pool),
            ..self
        }
    }

    #[must_use = "The builder must be used"]
    pub fn with_channel_capacity(self, channel_capacity: usize) -> Self {
        Self {
            channel_capacity,
            ..self
        }
    }

    /// This returns a tuple with a [`Logger`](struct@Logger), which can be passed to the slog root logger [as usual](https://docs.rs/slog/latest/slog/#where-to-start), and a [`std::sync::mpsc::Receiver`] channel.
    /// The `Logger` sends the [`WriteLogEntries`](https://cloud.google.com/logging/docs/reference/v2/rpc/google.logging.v2#google.logging.v2.LoggingServiceV2.WriteLogEntries) it creates to this channel.
    ///
    /// When the receiver falls behind, new entries are dropped rather than blocking the caller.
    #[must_use = "The logger and receiver must be used to handle logging correctly"]
    pub fn build(self) -> (Logger<ChannelSink>, Receiver<WriteLogEntriesRequest>) {
        let (sync_tx, sync_rx) = sync_channel::<WriteLogEntriesRequest>(self.channel_capacity);
        let sink = ChannelSink::new(
            self.log_name.clone(),
            self.log_level_label.clone(),
            self.default_labels.clone(),
            MonitoredResource {
                type_: Some(self.resource_type.clone()),
                labels: self.resource_labels.clone(),
            },
            sync_tx,
        );
        (self.build_with_sink(sink), sync_rx)
    }

    /// Builds a logger that sends its entries to `sink`. The log name, labels and resource
    /// only apply to [`Builder::build`].
    #[must_use = "The logger must be used"]
    pub fn build_with_sink<S: Sink>(self, sink: S) -> Logger<S> {
        let pool = self.pool.unwrap_or_default();
        Logger {
            core: Core::new(self.config, pool, sink),
            logger_name: self.logger_name,
        }
    }
}

impl<S: Sink> Logger<S> {
    pub fn core(&self) -> &Core<S> {
        &self.core
    }

    /// A logger that adds `fields` to every entry.
    #[must_use]
    pub fn with(&self, fields: Vec<Field>) -> Self {
        Self {
            core: self.core.with(fields),
            logger_name: self.logger_name.clone(),
        }
    }

    /// Flushes the underlying sink.
    pub fn sync(&self) -> Result<()> {
        self.core.sync()
    }
}

impl<S: Sink> Drain for Logger<S> {
    type Ok = ();
    type Err = Error;

    fn log(&self, record: &Record<'_>, values: &OwnedKVList) -> Result<()> {
        let mut serializer = FieldSerializer::default();
        record.kv().serialize(record, &mut serializer)?;
        values.serialize(record, &mut serializer)?;

        let entry = Entry {
            level: record.level().into(),
            time: Utc::now(),
            logger_name: self.logger_name.clone(),
            message: record.msg().to_string(),
            caller: Some(Caller::new(record.file(), record.line(), record.module())),
            stack: String::new(),
        };
        self.core.write(&entry, serializer.fields);
        Ok(())
    }
}

/// Collects slog key/value pairs as typed fields, keeping their order.
#[derive(Default)]
struct FieldSerializer {
    fields: Vec<Field>,
}

impl FieldSerializer {
    fn push(&mut self, field: Field) -> slog::Result {
        self.fields.push(field);
        Ok(())
    }
}

impl slog::Serializer for FieldSerializer {
    fn emit_arguments(&mut self, key: Key, val: &fmt::Arguments) -> slog::Result {
        let mut value = String::new();
        write!(value, "{val}")?;
        self.push(Field::string(key, value))
    }

    fn emit_str(&mut self, key: Key, val: &str) -> slog::Result {
        self.push(Field::string(key, val))
    }

    fn emit_char(&mut self, key: Key, val: char) -> slog::Result {
        self.push(Field::string(key, val.to_string()))
    }

    fn emit_bool(&mut self, key: Key, val: bool) -> slog::Result {
        self.push(Field::bool(key, val))
    }

    fn emit_unit(&mut self, key: Key) -> slog::Result {
        self.push(Field::reflected(key, ()))
    }

    fn emit_none(&mut self, key: Key) -> slog::Result {
        self.push(Field::reflected(key, ()))
    }

    fn emit_u8(&mut self, key: Key, val: u8) -> slog::Result {
        self.push(Field::uint64(key, u64::from(val)))
    }

    fn emit_u16(&mut self, key: Key, val: u16) -> slog::Result {
        self.push(Field::uint64(key, u64::from(val)))
    }

    fn emit_u32(&mut self, key: Key, val: u32) -> slog::Result {
        self.push(Field::uint64(key, u64::from(val)))
    }

    fn emit_u64(&mut self, key: Key, val: u64) -> slog::Result {
        self.push(Field::uint64(key, val))
    }

    fn emit_usize(&mut self, key: Key, val: usize) -> slog::Result {
        self.push(Field::uint64(key, val as u64))
    }

    fn emit_i8(&mut self, key: Key, val: i8) -> slog::Result {
        self.push(Field::int64(key, i64::from(val)))
    }

    fn emit_i16(&mut self, key: Key, val: i16) -> slog::Result {
        self.push(Field::int64(key, i64::from(val)))
    }

    fn emit_i32(&mut self, key: Key, val: i32) -> slog::Result {
        self.push(Field::int64(key, i64::from(val)))
    }

    fn emit_i64(&mut self, key: Key, val: i64) -> slog::Result {
        self.push(Field::int64(key, val))
    }

    fn emit_isize(&mut self, key: Key, val: isize) -> slog::Result {
        self.push(Field::int64(key, val as i64))
    }

    fn emit_f32(&mut self, key: Key, val: f32) -> slog::Result {
        self.push(Field::float32(key, val))
    }

    fn emit_f64(&mut self, key: Key, val: f64) -> slog::Result {
        self.push(Field::float64(key, val))
    }

    fn emit_error(&mut self, key: Key, val: &(dyn std::error::Error + 'static)) -> slog::Result {
        self.push(Field::named_error(key, val))
    }
}

/// Keeps a failing drain from failing the logger: errors are printed to stderr instead.
#[derive(Clone)]
pub struct FallbackToStderr<D: Drain> {
    drain: D,
}

impl<D: Drain> FallbackToStderr<D> {
    pub fn new(drain: D) -> Self {
        Self { drain }
    }
}

impl<D: Drain> Drain for FallbackToStderr<D>
where
    D::Err: Display,
{
    type Ok = ();
    type Err = ();

    fn log(&self, record: &Record, logger_values: &OwnedKVList) -> std::result::Result<(), ()> {
        if let Err(err) = self.drain.log(record, logger_values) {
            eprintln!("A drain could not log to its destination: {}", err);
        }
        Ok(())
    }

    #[inline]
    fn is_enabled(&self, level: Level) -> bool {
        self.drain.is_enabled(level)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use slog::{o, Logger as SlogLogger};

    use super::*;
    use crate::sink::SinkRecord;

    #[derive(Default, Clone)]
    struct Recorder(Arc<Mutex<Vec<Value>>>);

    impl Sink for Recorder {
        fn log(&self, record: &SinkRecord<'_>) -> Result<()> {
            let doc = serde_json::from_slice(record.payload).map_err(Error::PayloadError)?;
            self.0.lock().unwrap().push(doc);
            Ok(())
        }
    }

    #[test]
    fn rejects_labels_that_are_not_strings() {
        let res = Builder::new("log", "global").with_default_labels(json!({"n": 1}));
        assert!(matches!(res, Err(Error::DefaultLabelsError(_))));
        let res = Builder::new("log", "global").with_resource_labels(json!(["a"]));
        assert!(matches!(res, Err(Error::ResourceLabelsError(_))));
    }

    #[test]
    fn logs_records_with_their_fields() {
        let recorder = Recorder::default();
        let drain = Builder::new("log", "global")
            .with_logger_name("ftp")
            .build_with_sink(recorder.clone());
        let drain = Mutex::new(FallbackToStderr::new(drain)).fuse();
        let log = SlogLogger::root(drain, o!("instance" => "eu-1"));

        slog::warn!(log, "upload of {} failed", "a.txt"; "bytes" => 512u32, "retry" => true, "context.user" => "jane");

        let docs = recorder.0.lock().unwrap().clone();
        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc["severity"], json!("WARNING"));
        assert_eq!(doc["logger"], json!("ftp"));
        assert_eq!(doc["message"], json!("upload of a.txt failed"));
        assert_eq!(doc["bytes"], json!(512));
        assert_eq!(doc["retry"], json!(true));
        assert_eq!(doc["instance"], json!("eu-1"));
        assert_eq!(doc["context"]["user"], json!("jane"));
        assert_eq!(doc["context"]["reportLocation"]["filePath"], json!(file!()));
        assert!(doc["caller"].as_str().unwrap().contains("logger.rs:"));
    }

    #[test]
    fn build_sends_requests_to_the_channel() {
        let (drain, rx) = Builder::new("projects/p/logs/l", "k8s_container")
            .with_log_level_label("level")
            .with_channel_capacity(2)
            .build();
        let log = SlogLogger::root(Mutex::new(FallbackToStderr::new(drain)).fuse(), o!());

        slog::info!(log, "one");
        slog::info!(log, "two");
        slog::info!(log, "dropped, the channel is full");

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received.len(), 2);
        let entry = &received[0].entries.as_ref().unwrap()[0];
        assert_eq!(entry.severity.as_deref(), Some("INFO"));
        assert_eq!(
            entry.labels.as_ref().unwrap().get("level").map(String::as_str),
            Some("info")
        );
        assert_eq!(
            entry.resource.as_ref().unwrap().type_.as_deref(),
            Some("k8s_container")
        );
    }
}
