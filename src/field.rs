use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::context::{Context, HttpRequest, ReportLocation, ServiceContext, SourceLocation};
use crate::marshal::{ArrayMarshaler, ObjectEncoder, ObjectMarshaler, Reflect};
use crate::metrics;

/// The typed value of a [`Field`].
#[derive(Clone)]
pub enum FieldValue {
    /// Encodes nothing.
    Skip,
    Bool(bool),
    Int64(i64),
    Uint64(u64),
    Float64(f64),
    Float32(f32),
    Complex128(f64, f64),
    Complex64(f32, f32),
    String(String),
    /// Text that came in as bytes. Invalid UTF-8 is replaced while escaping.
    ByteString(Vec<u8>),
    /// Opaque bytes, written base64 encoded.
    Binary(Vec<u8>),
    Duration(TimeDelta),
    Time(DateTime<Utc>),
    Array(Arc<dyn ArrayMarshaler + Send + Sync>),
    Object(Arc<dyn ObjectMarshaler + Send + Sync>),
    Reflected(Arc<dyn Reflect + Send + Sync>),
    /// Opens a nested object that holds all fields that follow.
    Namespace,
    /// The message of an error.
    Error(String),
    User(String),
    HttpRequest(HttpRequest),
    ReportLocation(ReportLocation),
    Context(Context),
    ServiceContext(ServiceContext),
    SourceLocation(SourceLocation),
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Skip => f.write_str("Skip"),
            FieldValue::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            FieldValue::Int64(v) => f.debug_tuple("Int64").field(v).finish(),
            FieldValue::Uint64(v) => f.debug_tuple("Uint64").field(v).finish(),
            FieldValue::Float64(v) => f.debug_tuple("Float64").field(v).finish(),
            FieldValue::Float32(v) => f.debug_tuple("Float32").field(v).finish(),
            FieldValue::Complex128(re, im) => f.debug_tuple("Complex128").field(re).field(im).finish(),
            FieldValue::Complex64(re, im) => f.debug_tuple("Complex64").field(re).field(im).finish(),
            FieldValue::String(v) => f.debug_tuple("String").field(v).finish(),
            FieldValue::ByteString(v) => f.debug_tuple("ByteString").field(v).finish(),
            FieldValue::Binary(v) => f.debug_tuple("Binary").field(&v.len()).finish(),
            FieldValue::Duration(v) => f.debug_tuple("Duration").field(v).finish(),
            FieldValue::Time(v) => f.debug_tuple("Time").field(v).finish(),
            FieldValue::Array(_) => f.write_str("Array(..)"),
            FieldValue::Object(_) => f.write_str("Object(..)"),
            FieldValue::Reflected(_) => f.write_str("Reflected(..)"),
            FieldValue::Namespace => f.write_str("Namespace"),
            FieldValue::Error(v) => f.debug_tuple("Error").field(v).finish(),
            FieldValue::User(v) => f.debug_tuple("User").field(v).finish(),
            FieldValue::HttpRequest(v) => f.debug_tuple("HttpRequest").field(v).finish(),
            FieldValue::ReportLocation(v) => f.debug_tuple("ReportLocation").field(v).finish(),
            FieldValue::Context(v) => f.debug_tuple("Context").field(v).finish(),
            FieldValue::ServiceContext(v) => f.debug_tuple("ServiceContext").field(v).finish(),
            FieldValue::SourceLocation(v) => f.debug_tuple("SourceLocation").field(v).finish(),
        }
    }
}

/// A key and a typed value, attached to a log entry.
#[derive(Debug, Clone)]
pub struct Field {
    pub key: String,
    pub value: FieldValue,
}

impl Field {
    pub fn new(key: impl Into<String>, value: FieldValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    pub fn skip() -> Self {
        Self::new("", FieldValue::Skip)
    }

    pub fn bool(key: impl Into<String>, v: bool) -> Self {
        Self::new(key, FieldValue::Bool(v))
    }

    pub fn int64(key: impl Into<String>, v: i64) -> Self {
        Self::new(key, FieldValue::Int64(v))
    }

    pub fn uint64(key: impl Into<String>, v: u64) -> Self {
        Self::new(key, FieldValue::Uint64(v))
    }

    pub fn float64(key: impl Into<String>, v: f64) -> Self {
        Self::new(key, FieldValue::Float64(v))
    }

    pub fn float32(key: impl Into<String>, v: f32) -> Self {
        Self::new(key, FieldValue::Float32(v))
    }

    pub fn complex128(key: impl Into<String>, re: f64, im: f64) -> Self {
        Self::new(key, FieldValue::Complex128(re, im))
    }

    pub fn complex64(key: impl Into<String>, re: f32, im: f32) -> Self {
        Self::new(key, FieldValue::Complex64(re, im))
    }

    pub fn string(key: impl Into<String>, v: impl Into<String>) -> Self {
        Self::new(key, FieldValue::String(v.into()))
    }

    pub fn byte_string(key: impl Into<String>, v: impl Into<Vec<u8>>) -> Self {
        Self::new(key, FieldValue::ByteString(v.into()))
    }

    pub fn binary(key: impl Into<String>, v: impl Into<Vec<u8>>) -> Self {
        Self::new(key, FieldValue::Binary(v.into()))
    }

    pub fn duration(key: impl Into<String>, v: TimeDelta) -> Self {
        Self::new(key, FieldValue::Duration(v))
    }

    pub fn time(key: impl Into<String>, v: DateTime<Utc>) -> Self {
        Self::new(key, FieldValue::Time(v))
    }

    pub fn array(key: impl Into<String>, v: impl ArrayMarshaler + Send + Sync + 'static) -> Self {
        Self::new(key, FieldValue::Array(Arc::new(v)))
    }

    pub fn object(key: impl Into<String>, v: impl ObjectMarshaler + Send + Sync + 'static) -> Self {
        Self::new(key, FieldValue::Object(Arc::new(v)))
    }

    /// Any serde-serializable value. Prefer the typed constructors; this one is slow.
    pub fn reflected(key: impl Into<String>, v: impl Serialize + Send + Sync + 'static) -> Self {
        Self::new(key, FieldValue::Reflected(Arc::new(v)))
    }

    pub fn namespace(key: impl Into<String>) -> Self {
        Self::new(key, FieldValue::Namespace)
    }

    /// The message of `err`, under the key `error`.
    pub fn error(err: &dyn std::error::Error) -> Self {
        Self::named_error("error", err)
    }

    pub fn named_error(key: impl Into<String>, err: &dyn std::error::Error) -> Self {
        Self::new(key, FieldValue::Error(err.to_string()))
    }

    /// Whether this field is one of the Stackdriver context values.
    pub fn is_context(&self) -> bool {
        matches!(
            self.value,
            FieldValue::User(_)
                | FieldValue::HttpRequest(_)
                | FieldValue::ReportLocation(_)
                | FieldValue::Context(_)
        )
    }

    /// Writes the field to `enc`.
    ///
    /// When a marshaler fails, whatever it wrote stays and its message is added under
    /// `<key>Error`, so the output remains a valid JSON document.
    pub fn add_to(&self, enc: &mut dyn ObjectEncoder) {
        let key = self.key.as_str();
        let res = match &self.value {
            FieldValue::Skip => Ok(()),
            FieldValue::Array(arr) => enc.add_array(key, arr.as_ref()),
            FieldValue::Object(obj) => enc.add_object(key, obj.as_ref()),
            FieldValue::Reflected(v) => enc.add_reflected(key, v.as_ref()),
            FieldValue::HttpRequest(req) => enc.add_object(key, req),
            FieldValue::ReportLocation(loc) => enc.add_object(key, loc),
            FieldValue::Context(ctx) => enc.add_object(key, ctx),
            FieldValue::ServiceContext(sc) => enc.add_object(key, sc),
            FieldValue::SourceLocation(loc) => enc.add_object(key, loc),
            value => {
                add_primitive(key, value, enc);
                Ok(())
            }
        };
        if let Err(err) = res {
            metrics::FIELD_ERRORS.inc();
            enc.add_string(&format!("{}Error", key), &err.to_string());
        }
    }
}

fn add_primitive(key: &str, value: &FieldValue, enc: &mut dyn ObjectEncoder) {
    match value {
        FieldValue::Bool(v) => enc.add_bool(key, *v),
        FieldValue::Int64(v) => enc.add_int64(key, *v),
        FieldValue::Uint64(v) => enc.add_uint64(key, *v),
        FieldValue::Float64(v) => enc.add_float64(key, *v),
        FieldValue::Float32(v) => enc.add_float32(key, *v),
        FieldValue::Complex128(re, im) => enc.add_complex128(key, *re, *im),
        FieldValue::Complex64(re, im) => enc.add_complex64(key, *re, *im),
        FieldValue::String(v) | FieldValue::User(v) | FieldValue::Error(v) => enc.add_string(key, v),
        FieldValue::ByteString(v) => enc.add_byte_string(key, v),
        FieldValue::Binary(v) => enc.add_binary(key, v),
        FieldValue::Duration(v) => enc.add_duration(key, *v),
        FieldValue::Time(v) => enc.add_time(key, *v),
        FieldValue::Namespace => enc.open_namespace(key),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use stackdriver_bufpool::Pool;

    use super::*;
    use crate::config::EncoderConfig;
    use crate::encoder::JsonEncoder;
    use crate::marshal::{ArrayMarshalerFn, PrimitiveArrayEncoder};

    fn encode(fields: &[Field]) -> String {
        let mut enc = JsonEncoder::new(EncoderConfig::stackdriver(), Pool::new());
        for field in fields {
            field.add_to(&mut enc);
        }
        enc.close_open_namespaces();
        enc.buffer().as_str().into_owned()
    }

    #[derive(Serialize)]
    struct Upload {
        path: &'static str,
        size: u64,
    }

    #[test]
    fn every_kind_of_field() {
        let fields = [
            Field::skip(),
            Field::bool("ok", true),
            Field::int64("i", -1),
            Field::uint64("u", 1),
            Field::float64("f", 1.5),
            Field::float32("f32", 0.25),
            Field::complex128("c", 1.0, -1.0),
            Field::string("s", "x"),
            Field::byte_string("bs", b"y".to_vec()),
            Field::binary("bin", vec![0u8, 1, 2]),
            Field::duration("d", TimeDelta::milliseconds(250)),
            Field::time("t", Utc.with_ymd_and_hms(2018, 6, 19, 16, 33, 42).unwrap()),
            Field::array(
                "arr",
                ArrayMarshalerFn::new(|arr| {
                    arr.append_uint64(7);
                    Ok(())
                }),
            ),
            Field::reflected("upload", Upload { path: "/tmp/a", size: 3 }),
            Field::error(&io::Error::new(io::ErrorKind::Other, "disk full")),
            Field::namespace("ns"),
            Field::string("inner", "z"),
        ];
        assert_eq!(
            encode(&fields),
            concat!(
                r#""ok":true,"i":-1,"u":1,"f":1.5,"f32":0.25,"c":"1.0+-1.0i","s":"x","bs":"y","#,
                r#""bin":"AAEC","d":0.25,"t":"2018-06-19T16:33:42.000Z","arr":[7],"#,
                r#""upload":{"path":"/tmp/a","size":3},"error":"disk full","ns":{"inner":"z"}"#
            )
        );
    }

    #[test]
    fn failing_reflection_adds_an_error_key() {
        let mut bad = std::collections::BTreeMap::new();
        bad.insert((1, 2), "tuple keys are not strings");
        let out = encode(&[Field::reflected("bad", bad)]);
        assert!(out.starts_with(r#""badError":"Serde JSON serialization failed"#), "{}", out);
    }

    #[test]
    fn context_fields_are_recognized() {
        assert!(crate::context::log_user("jane").is_context());
        assert!(!Field::string("user", "jane").is_context());
    }
}
