use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use slog::{crit, debug, error, info, o, warn, Drain};
use slog_async::Async;
use slog_stackdriver::context::ServiceContext;
use slog_stackdriver::{Builder, EncoderConfig, FallbackToStderr, Pool, WriterSink};

#[derive(Clone, Default)]
struct SharedOutput(Arc<Mutex<Vec<u8>>>);

impl SharedOutput {
    fn lines(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn async_logger(builder: Builder, output: &SharedOutput) -> (slog::Logger, slog_async::AsyncGuard) {
    let drain = builder.build_with_sink(WriterSink::new(output.clone()));
    let drain = FallbackToStderr::new(drain).fuse();
    let (drain, guard) = Async::new(drain).build_with_guard();
    (slog::Logger::root(drain.fuse(), o!("app" => "unftp")), guard)
}

#[test]
fn every_level_maps_to_a_severity() {
    let output = SharedOutput::default();
    let (log, guard) = async_logger(Builder::new("log", "global").with_logger_name("ftp"), &output);

    debug!(log, "debug");
    info!(log, "info");
    warn!(log, "warn");
    error!(log, "error");
    crit!(log, "crit");
    drop(log);
    drop(guard);

    let severities: Vec<Value> = output.lines().iter().map(|doc| doc["severity"].clone()).collect();
    assert_eq!(
        severities,
        vec![json!("DEBUG"), json!("INFO"), json!("WARNING"), json!("ERROR"), json!("CRITICAL")]
    );
}

#[test]
fn entries_carry_fields_and_context() {
    let output = SharedOutput::default();
    let config = EncoderConfig::stackdriver().with_service_context(ServiceContext::new("unftp", "0.15.1"));
    let (log, guard) = async_logger(
        Builder::new("log", "global")
            .with_logger_name("ftp")
            .with_encoder_config(config),
        &output,
    );

    let session = log.new(o!("session" => 42, "context.user" => "alice"));
    error!(session, "Failed to store \"{}\"", "report.csv"; "bytes" => 1024u64, "elapsed" => 0.5);
    drop(session);
    drop(log);
    drop(guard);

    let docs = output.lines();
    assert_eq!(docs.len(), 1);
    let doc = &docs[0];
    assert_eq!(doc["message"], json!("Failed to store \"report.csv\""));
    assert_eq!(doc["logger"], json!("ftp"));
    assert_eq!(doc["app"], json!("unftp"));
    assert_eq!(doc["session"], json!(42));
    assert_eq!(doc["bytes"], json!(1024));
    assert_eq!(doc["elapsed"], json!(0.5));
    assert_eq!(doc["context"]["user"], json!("alice"));
    assert_eq!(doc["context"]["reportLocation"]["filePath"], json!(file!()));
    assert_eq!(doc["serviceContext"], json!({"service": "unftp", "version": "0.15.1"}));
    assert!(doc["eventTime"].as_str().unwrap().ends_with('Z'));
}

#[test]
fn loggers_share_a_pool() {
    let pool = Pool::new();
    let first = SharedOutput::default();
    let second = SharedOutput::default();
    let (log1, guard1) = async_logger(Builder::new("a", "global").with_pool(pool.clone()), &first);
    let (log2, guard2) = async_logger(Builder::new("b", "global").with_pool(pool.clone()), &second);

    for i in 0..10 {
        info!(log1, "first"; "i" => i);
        info!(log2, "second"; "i" => i);
    }
    drop((log1, log2));
    drop((guard1, guard2));

    assert_eq!(first.lines().len(), 10);
    assert_eq!(second.lines().len(), 10);
    let stats = pool.stats();
    assert!(stats.hits > 0, "{:?}", stats);
}
