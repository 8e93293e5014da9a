use cached::proc_macro::cached;
use opentelemetry::KeyValue;

const METER_NAME: &str = "intuis";

pub fn increment(name: &'static str, labels: &[(&str, &str)]) {
    counter(name).add(1, &to_key_values(labels))
}

pub fn set(name: &'static str, value: f64, labels: &[(&str, &str)]) {
    gauge(name).record(value, &to_key_values(labels))
}

fn to_key_values(labels: &[(&str, &str)]) -> Vec<KeyValue> {
    labels
        .iter()
        .map(|(k, v)| KeyValue::new(k.to_string(), v.to_string()))
        .collect()
}

//instruments are registered once per name, the global provider may be swapped before first use
#[cached]
fn counter(name: &'static str) -> opentelemetry::metrics::Counter<u64> {
    opentelemetry::global::meter(METER_NAME).u64_counter(name).build()
}

#[cached]
fn gauge(name: &'static str) -> opentelemetry::metrics::Gauge<f64> {
    opentelemetry::global::meter(METER_NAME).f64_gauge(name).build()
}
