use std::sync::Arc;

use stackdriver_bufpool::Pool;

use crate::config::EncoderConfig;
use crate::context::{
    log_context, log_service_context, log_source_location, Context, ReportLocation,
    SourceLocation,
};
use crate::encoder::JsonEncoder;
use crate::entry::Entry;
use crate::error::Result;
use crate::field::Field;
use crate::level::Severity;
use crate::metrics;
use crate::sink::{Sink, SinkRecord};

/// Assembles entries: pulls the Stackdriver context out of the fields, encodes the result
/// and hands it to the sink.
pub struct Core<S> {
    encoder: JsonEncoder,
    context: Context,
    sink: Arc<S>,
}

impl<S: Sink> Core<S> {
    pub fn new(config: EncoderConfig, pool: Pool, sink: S) -> Self {
        Self {
            encoder: JsonEncoder::new(config, pool),
            context: Context::default(),
            sink: Arc::new(sink),
        }
    }

    pub fn config(&self) -> &EncoderConfig {
        self.encoder.config()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// A core that adds `fields` to every entry it writes. Context fields are merged into
    /// the persistent context, everything else is encoded once, up front.
    pub fn with(&self, fields: Vec<Field>) -> Self {
        let mut encoder = self.encoder.clone_encoder();
        let mut context = self.context.clone();
        for field in fields {
            if let Some(field) = context.absorb(field) {
                field.add_to(&mut encoder);
            }
        }
        Self {
            encoder,
            context,
            sink: Arc::clone(&self.sink),
        }
    }

    /// Encodes `entry` and passes it to the sink.
    ///
    /// Field errors end up in the entry itself (see [`Field::add_to`]). A sink that fails
    /// to take the entry is counted in [`metrics::SINK_ERRORS`]; logging should never take
    /// the application down.
    pub fn write(&self, entry: &Entry, fields: Vec<Field>) {
        let config = self.encoder.config();
        let mut context = self.context.clone();
        let mut output = Vec::with_capacity(fields.len());
        for field in fields {
            if let Some(field) = context.absorb(field) {
                if !config.drop_non_context_fields {
                    output.push(field);
                }
            }
        }

        // Written ahead of the persistent and per-call fields, so that no namespace opened
        // by those can enclose them.
        let mut top_level = Vec::with_capacity(3);
        if let Some(caller) = &entry.caller {
            if config.report_location && context.report_location.is_none() {
                context.report_location = Some(ReportLocation::from(caller));
            }
            if config.source_location {
                top_level.push(log_source_location(SourceLocation::from(caller)));
            }
        }
        if !context.is_empty() {
            top_level.push(log_context(context));
        }
        if let Some(service_context) = &config.service_context {
            top_level.push(log_service_context(service_context.clone()));
        }

        let buf = self
            .encoder
            .encode_entry_with_context(entry, &top_level, &output);
        metrics::ENTRIES_ENCODED.inc();
        let record = SinkRecord {
            timestamp: entry.time,
            level: entry.level,
            severity: Severity::from(entry.level),
            payload: buf.as_bytes(),
        };
        if self.sink.log(&record).is_err() {
            metrics::SINK_ERRORS.inc();
        }
        buf.free();
    }

    /// Flushes the sink.
    pub fn sync(&self) -> Result<()> {
        self.sink.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    use super::*;
    use crate::context::{log_http_request, log_user, HttpRequest, ServiceContext};
    use crate::entry::Caller;
    use crate::error::Error;
    use crate::level::Level;

    #[derive(Default)]
    struct Recorder {
        records: Mutex<Vec<(Severity, Value)>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<(Severity, Value)> {
            std::mem::take(&mut *self.records.lock().unwrap())
        }
    }

    impl Sink for Recorder {
        fn log(&self, record: &SinkRecord<'_>) -> Result<()> {
            let doc = serde_json::from_slice(record.payload).unwrap();
            self.records.lock().unwrap().push((record.severity, doc));
            Ok(())
        }
    }

    struct Failing;

    impl Sink for Failing {
        fn log(&self, _: &SinkRecord<'_>) -> Result<()> {
            Err(Error::SinkFull)
        }
    }

    fn entry(level: Level) -> Entry {
        Entry::new(level, "lob law")
            .with_logger_name("bob")
            .with_time(Utc.with_ymd_and_hms(2018, 6, 19, 16, 33, 42).unwrap())
    }

    fn core(config: EncoderConfig) -> Core<Recorder> {
        Core::new(config, Pool::new(), Recorder::default())
    }

    #[test]
    fn writes_entries_to_the_sink() {
        let core = core(EncoderConfig::stackdriver());
        core.write(
            &entry(Level::Info),
            vec![
                Field::string("so", "passes"),
                Field::int64("answer", 42),
                Field::float64("common_pie", 3.14),
            ],
        );
        let records = core.sink().take();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, Severity::Info);
        assert_eq!(
            records[0].1,
            json!({
                "eventTime": "2018-06-19T16:33:42.000Z",
                "severity": "INFO",
                "logger": "bob",
                "message": "lob law",
                "so": "passes",
                "answer": 42,
                "common_pie": 3.14,
            })
        );
    }

    #[test]
    fn context_fields_are_gathered_under_context() {
        let core = core(EncoderConfig::stackdriver());
        let req = HttpRequest {
            request_method: "PUT".to_string(),
            request_url: "/upload".to_string(),
            status: 201,
            ..HttpRequest::default()
        };
        core.write(
            &entry(Level::Error),
            vec![log_user("jane"), Field::bool("retry", false), log_http_request(req)],
        );
        let (severity, doc) = core.sink().take().remove(0);
        assert_eq!(severity, Severity::Error);
        assert_eq!(doc["retry"], json!(false));
        assert_eq!(
            doc["context"],
            json!({
                "user": "jane",
                "httpRequest": {"requestMethod": "PUT", "requestUrl": "/upload", "status": 201},
            })
        );
        assert!(doc.get("context.user").is_none());
    }

    #[test]
    fn persistent_context_is_merged() {
        let base = core(EncoderConfig::stackdriver());
        let child = base.with(vec![log_user("jane"), Field::string("session", "abc")]);
        child.write(&entry(Level::Warn), vec![Field::string("context.user", "joe")]);
        child.write(&entry(Level::Warn), vec![]);
        base.write(&entry(Level::Warn), vec![]);

        let records = base.sink().take();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].1["context"], json!({"user": "joe"}));
        assert_eq!(records[0].1["session"], json!("abc"));
        assert_eq!(records[1].1["context"], json!({"user": "jane"}));
        assert!(records[2].1.get("context").is_none());
        assert!(records[2].1.get("session").is_none());
    }

    #[test]
    fn call_site_becomes_report_and_source_location() {
        let config = EncoderConfig {
            source_location: true,
            caller_key: String::new(),
            ..EncoderConfig::stackdriver()
        };
        let core = core(config);
        let caller = Caller::new("src/storage/gcs.rs", 88, "unftp::storage::gcs");
        core.write(&entry(Level::Error).with_caller(caller), vec![]);
        let (_, doc) = core.sink().take().remove(0);
        assert_eq!(
            doc["context"]["reportLocation"],
            json!({"filePath": "src/storage/gcs.rs", "lineNumber": 88, "functionName": "unftp::storage::gcs"})
        );
        assert_eq!(
            doc["logging.googleapis.com/sourceLocation"],
            json!({"file": "src/storage/gcs.rs", "line": "88", "function": "unftp::storage::gcs"})
        );
        assert!(doc.get("caller").is_none());
    }

    #[test]
    fn service_context_is_added_when_configured() {
        let config = EncoderConfig::stackdriver().with_service_context(ServiceContext::new("unftp", "0.15"));
        let core = core(config);
        core.write(&entry(Level::Info), vec![]);
        let (_, doc) = core.sink().take().remove(0);
        assert_eq!(doc["serviceContext"], json!({"service": "unftp", "version": "0.15"}));
    }

    #[test]
    fn namespaces_do_not_swallow_the_context() {
        let config = EncoderConfig::stackdriver().with_service_context(ServiceContext::new("unftp", "0.15"));
        let base = core(config);
        let child = base.with(vec![Field::namespace("request")]);
        let caller = Caller::new("src/server.rs", 7, "unftp::server");
        child.write(
            &entry(Level::Error).with_caller(caller),
            vec![log_user("jane"), Field::namespace("upload"), Field::int64("n", 1)],
        );
        let (_, doc) = base.sink().take().remove(0);
        assert_eq!(doc["context"]["user"], json!("jane"));
        assert_eq!(doc["context"]["reportLocation"]["lineNumber"], json!(7));
        assert_eq!(doc["serviceContext"], json!({"service": "unftp", "version": "0.15"}));
        assert_eq!(doc["request"], json!({"upload": {"n": 1}}));
    }

    #[test]
    fn non_context_fields_can_be_dropped() {
        let config = EncoderConfig {
            drop_non_context_fields: true,
            ..EncoderConfig::stackdriver()
        };
        let core = core(config);
        core.write(&entry(Level::Info), vec![Field::int64("n", 1), log_user("jane")]);
        let (_, doc) = core.sink().take().remove(0);
        assert!(doc.get("n").is_none());
        assert_eq!(doc["context"]["user"], json!("jane"));
    }

    #[test]
    fn sink_errors_are_swallowed() {
        let pool = Pool::new();
        let core = Core::new(EncoderConfig::stackdriver(), pool.clone(), Failing);
        let before = metrics::SINK_ERRORS.get();
        core.write(&entry(Level::Fatal), vec![]);
        assert!(metrics::SINK_ERRORS.get() > before);
        // the encoded buffer went back to the pool regardless
        assert_eq!(pool.idle(), 1);
    }
}
