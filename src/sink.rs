//! Destinations for encoded entries.

use std::collections::HashMap;
use std::io::Write;
use std::sync::mpsc::SyncSender;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use google_logging2::api::{LogEntry, MonitoredResource, WriteLogEntriesRequest};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::level::{Level, Severity};

/// One encoded entry on its way out. `payload` is a complete JSON object, followed by the
/// configured line ending.
#[derive(Debug, Clone, Copy)]
pub struct SinkRecord<'a> {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub severity: Severity,
    pub payload: &'a [u8],
}

/// Receives encoded entries. Delivery, retries and backoff are up to the implementation.
pub trait Sink {
    fn log(&self, record: &SinkRecord<'_>) -> Result<()>;

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn log(&self, record: &SinkRecord<'_>) -> Result<()> {
        (**self).log(record)
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn log(&self, record: &SinkRecord<'_>) -> Result<()> {
        (**self).log(record)
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }
}

/// Turns records into Logging API [`WriteLogEntriesRequest`]s and puts them on a bounded
/// channel. Whoever holds the receiving end ships them.
///
/// Sending never blocks: when the channel is full the entry is dropped with
/// [`Error::SinkFull`].
pub struct ChannelSink {
    log_name: String,
    log_level_label: Option<String>,
    default_labels: HashMap<String, String>,
    resource: MonitoredResource,
    sync_tx: SyncSender<WriteLogEntriesRequest>,
}

impl ChannelSink {
    pub(crate) fn new(
        log_name: String,
        log_level_label: Option<String>,
        default_labels: HashMap<String, String>,
        resource: MonitoredResource,
        sync_tx: SyncSender<WriteLogEntriesRequest>,
    ) -> Self {
        Self {
            log_name,
            log_level_label,
            default_labels,
            resource,
            sync_tx,
        }
    }

    fn construct_log_entry(&self, record: &SinkRecord<'_>) -> Result<LogEntry> {
        let json_payload: HashMap<String, Value> =
            serde_json::from_slice(record.payload).map_err(Error::PayloadError)?;

        let mut labels = self.default_labels.clone();
        // We add the log level to the labels if requested
        if let Some(label) = &self.log_level_label {
            labels.insert(label.clone(), record.level.as_str().to_string());
        }

        Ok(LogEntry {
            json_payload: Some(json_payload),
            labels: Some(labels),
            severity: Some(record.severity.as_str().to_string()),
            timestamp: Some(record.timestamp),
            resource: Some(self.resource.clone()),
            ..Default::default()
        })
    }
}

impl Sink for ChannelSink {
    fn log(&self, record: &SinkRecord<'_>) -> Result<()> {
        let entry = self.construct_log_entry(record)?;
        let body = WriteLogEntriesRequest {
            log_name: Some(self.log_name.clone()),
            entries: Some(vec![entry]),
            ..Default::default()
        };
        self.sync_tx.try_send(body)?;
        Ok(())
    }
}

/// Writes every payload to `W`, for environments where an agent collects the process output.
pub struct WriterSink<W: Write> {
    writer: Mutex<W>,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write> Sink for WriterSink<W> {
    fn log(&self, record: &SinkRecord<'_>) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writer.write_all(record.payload).map_err(|source| Error::Io {
            context: "writing log entry".to_string(),
            source,
        })
    }

    fn flush(&self) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writer.flush().map_err(|source| Error::Io {
            context: "flushing log writer".to_string(),
            source,
        })
    }
}
