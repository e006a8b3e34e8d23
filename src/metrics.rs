//! Prometheus counters for the encoder and its sinks, registered in the default registry.

use lazy_static::lazy_static;
use prometheus::{register_int_counter, Encoder, IntCounter, TextEncoder};

lazy_static! {
    pub static ref ENTRIES_ENCODED: IntCounter = register_int_counter!(
        "stackdriver_entries_encoded_total",
        "Log entries encoded and handed to a sink."
    )
    .expect("entries counter can be registered");
    pub static ref FIELD_ERRORS: IntCounter = register_int_counter!(
        "stackdriver_field_errors_total",
        "Fields whose value failed to encode."
    )
    .expect("field error counter can be registered");
    pub static ref SINK_ERRORS: IntCounter = register_int_counter!(
        "stackdriver_sink_errors_total",
        "Encoded entries a sink failed to accept."
    )
    .expect("sink error counter can be registered");
}

/// Renders all metrics of the default registry in the Prometheus text format.
pub fn gather() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        eprintln!("could not encode metrics: {}", err);
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_the_exposition() {
        ENTRIES_ENCODED.inc();
        SINK_ERRORS.inc_by(0);
        let text = String::from_utf8(gather()).unwrap();
        assert!(text.contains("# TYPE stackdriver_entries_encoded_total counter"));
        assert!(text.contains("stackdriver_sink_errors_total"));
    }
}
