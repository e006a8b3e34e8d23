//! The payloads Google Cloud Logging and Error Reporting give special meaning to.
//!
//! <https://cloud.google.com/error-reporting/docs/formatting-error-messages>

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::config::duration_string;
use crate::entry::Caller;
use crate::error::{Error, Result};
use crate::field::{Field, FieldValue};
use crate::marshal::{ObjectEncoder, ObjectMarshaler};

pub const KEY_CONTEXT: &str = "context";
pub const KEY_CONTEXT_USER: &str = "context.user";
pub const KEY_CONTEXT_HTTP_REQUEST: &str = "context.httpRequest";
pub const KEY_CONTEXT_REPORT_LOCATION: &str = "context.reportLocation";
pub const KEY_SERVICE_CONTEXT: &str = "serviceContext";
pub const KEY_SOURCE_LOCATION: &str = "logging.googleapis.com/sourceLocation";

/// Identifies the service an error came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceContext {
    pub service: String,
    #[serde(default)]
    pub version: String,
}

impl ServiceContext {
    pub fn new(service: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            version: version.into(),
        }
    }
}

impl ObjectMarshaler for ServiceContext {
    fn marshal_log_object(&self, enc: &mut dyn ObjectEncoder) -> Result<()> {
        if self.service.is_empty() {
            return Err(Error::marshal("service name is mandatory"));
        }
        enc.add_string("service", &self.service);
        enc.add_string("version", &self.version);
        Ok(())
    }
}

/// An HTTP request associated with a log entry.
///
/// <https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry#httprequest>
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    /// E.g. `GET`, `HEAD`, `PUT`, `POST`.
    pub request_method: String,
    /// The scheme, host name, path and query of the requested URL.
    pub request_url: String,
    /// Size of the request in bytes, headers and body included.
    pub request_size: Option<i64>,
    pub status: i32,
    /// Size of the response in bytes, headers and body included.
    pub response_size: Option<i64>,
    pub user_agent: String,
    pub remote_ip: String,
    pub server_ip: String,
    pub referer: String,
    /// From the time the request was received until the response was sent.
    pub latency: Option<TimeDelta>,
    pub cache_lookup: bool,
    pub cache_hit: bool,
    /// Only meaningful when `cache_hit` is set.
    pub cache_validated_with_origin_server: bool,
    pub cache_fill_bytes: Option<i64>,
    /// E.g. `HTTP/1.1`, `HTTP/2`, `websocket`.
    pub protocol: String,
}

impl ObjectMarshaler for HttpRequest {
    fn marshal_log_object(&self, enc: &mut dyn ObjectEncoder) -> Result<()> {
        enc.add_string("requestMethod", &self.request_method);
        enc.add_string("requestUrl", &self.request_url);
        // int64 values are strings in the JSON mapping of the Logging API
        if let Some(size) = self.request_size {
            enc.add_string("requestSize", &size.to_string());
        }
        enc.add_int64("status", i64::from(self.status));
        if let Some(size) = self.response_size {
            enc.add_string("responseSize", &size.to_string());
        }
        add_non_empty(enc, "userAgent", &self.user_agent);
        add_non_empty(enc, "remoteIp", &self.remote_ip);
        add_non_empty(enc, "serverIp", &self.server_ip);
        add_non_empty(enc, "referer", &self.referer);
        if let Some(latency) = self.latency {
            enc.add_string("latency", &duration_string(latency));
        }
        if self.cache_lookup {
            enc.add_bool("cacheLookup", true);
        }
        if self.cache_hit {
            enc.add_bool("cacheHit", true);
        }
        if self.cache_validated_with_origin_server {
            enc.add_bool("cacheValidatedWithOriginServer", true);
        }
        if let Some(bytes) = self.cache_fill_bytes {
            enc.add_string("cacheFillBytes", &bytes.to_string());
        }
        add_non_empty(enc, "protocol", &self.protocol);
        Ok(())
    }
}

fn add_non_empty(enc: &mut dyn ObjectEncoder, key: &str, value: &str) {
    if !value.is_empty() {
        enc.add_string(key, value);
    }
}

/// Where in the code an error was reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportLocation {
    pub file_path: String,
    pub line_number: u32,
    pub function_name: String,
}

impl From<&Caller> for ReportLocation {
    fn from(caller: &Caller) -> Self {
        Self {
            file_path: caller.file.clone(),
            line_number: caller.line,
            function_name: caller.function.clone(),
        }
    }
}

impl ObjectMarshaler for ReportLocation {
    fn marshal_log_object(&self, enc: &mut dyn ObjectEncoder) -> Result<()> {
        enc.add_string("filePath", &self.file_path);
        enc.add_int64("lineNumber", i64::from(self.line_number));
        enc.add_string("functionName", &self.function_name);
        Ok(())
    }
}

/// The source code location that produced a log entry.
///
/// <https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry#logentrysourcelocation>
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    /// 1-based, "0" when unknown. A string, like all int64 values in the Logging API.
    pub line: String,
    pub function: String,
}

impl From<&Caller> for SourceLocation {
    fn from(caller: &Caller) -> Self {
        Self {
            file: caller.file.clone(),
            line: caller.line.to_string(),
            function: caller.function.clone(),
        }
    }
}

impl ObjectMarshaler for SourceLocation {
    fn marshal_log_object(&self, enc: &mut dyn ObjectEncoder) -> Result<()> {
        enc.add_string("file", &self.file);
        enc.add_string("line", &self.line);
        enc.add_string("function", &self.function);
        Ok(())
    }
}

/// The `context` object of an Error Reporting entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    pub user: String,
    pub http_request: Option<HttpRequest>,
    pub report_location: Option<ReportLocation>,
}

impl Context {
    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.http_request.is_none() && self.report_location.is_none()
    }

    /// Overwrites the parts of this context that are set in `other`.
    pub fn merge(&mut self, other: Context) {
        if !other.user.is_empty() {
            self.user = other.user;
        }
        if other.http_request.is_some() {
            self.http_request = other.http_request;
        }
        if other.report_location.is_some() {
            self.report_location = other.report_location;
        }
    }

    /// Takes `field` into this context when its key is one of the context keys. Any other
    /// field is handed back.
    pub fn absorb(&mut self, field: Field) -> Option<Field> {
        let Field { key, value } = field;
        let user_key = key == KEY_CONTEXT_USER;
        match value {
            FieldValue::Context(ctx) => self.merge(ctx),
            FieldValue::User(user) => self.user = user,
            FieldValue::String(user) if user_key => self.user = user,
            FieldValue::HttpRequest(req) => self.http_request = Some(req),
            FieldValue::ReportLocation(loc) => self.report_location = Some(loc),
            value => return Some(Field { key, value }),
        }
        None
    }
}

impl ObjectMarshaler for Context {
    fn marshal_log_object(&self, enc: &mut dyn ObjectEncoder) -> Result<()> {
        if !self.user.is_empty() {
            enc.add_string("user", &self.user);
        }
        if let Some(req) = &self.http_request {
            enc.add_object("httpRequest", req)?;
        }
        if let Some(loc) = &self.report_location {
            enc.add_object("reportLocation", loc)?;
        }
        Ok(())
    }
}

/// The user an entry is about, for Error Reporting's affected users count.
pub fn log_user(user: impl Into<String>) -> Field {
    Field::new(KEY_CONTEXT_USER, FieldValue::User(user.into()))
}

pub fn log_http_request(req: HttpRequest) -> Field {
    Field::new(KEY_CONTEXT_HTTP_REQUEST, FieldValue::HttpRequest(req))
}

pub fn log_report_location(loc: ReportLocation) -> Field {
    Field::new(KEY_CONTEXT_REPORT_LOCATION, FieldValue::ReportLocation(loc))
}

pub fn log_context(ctx: Context) -> Field {
    Field::new(KEY_CONTEXT, FieldValue::Context(ctx))
}

pub fn log_service_context(sc: ServiceContext) -> Field {
    Field::new(KEY_SERVICE_CONTEXT, FieldValue::ServiceContext(sc))
}

pub fn log_source_location(loc: SourceLocation) -> Field {
    Field::new(KEY_SOURCE_LOCATION, FieldValue::SourceLocation(loc))
}
