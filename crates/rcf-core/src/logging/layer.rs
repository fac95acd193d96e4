//! Custom tracing layer for JSONL output.
//!
//! Writes one JSON object per event on stderr, keeping stdout clean for
//! score records.

use std::io::{self, Write};
use std::sync::Mutex;

use chrono::Utc;
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::events::Level;

/// Correlation fields recorded on a span.
#[derive(Debug, Clone, Default)]
struct SpanContext {
    run_id: Option<String>,
    model_id: Option<String>,
    host_id: Option<String>,
    stage: Option<String>,
}

impl SpanContext {
    fn set(&mut self, name: &str, value: String) {
        match name {
            "run_id" => self.run_id = Some(value),
            "model_id" => self.model_id = Some(value),
            "host_id" => self.host_id = Some(value),
            "stage" => self.stage = Some(value),
            _ => {}
        }
    }
}

/// Extracts field values from tracing events.
struct JsonFieldVisitor {
    fields: serde_json::Map<String, serde_json::Value>,
    message: Option<String>,
}

impl JsonFieldVisitor {
    fn new() -> Self {
        JsonFieldVisitor {
            fields: serde_json::Map::new(),
            message: None,
        }
    }

    fn record_string(&mut self, name: &str, value: String) {
        if name == "message" {
            self.message = Some(value);
        } else {
            self.fields
                .insert(name.to_string(), serde_json::Value::String(value));
        }
    }
}

impl tracing::field::Visit for JsonFieldVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.record_string(field.name(), value.to_string());
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.record_string(field.name(), format!("{:?}", value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::Number(value.into()),
        );
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::Number(value.into()),
        );
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        // JSON has no NaN; non-finite values are kept as text.
        let json = serde_json::Number::from_f64(value)
            .map(serde_json::Value::Number)
            .unwrap_or_else(|| serde_json::Value::String(value.to_string()));
        self.fields.insert(field.name().to_string(), json);
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }
}

struct SpanContextVisitor {
    context: SpanContext,
}

impl tracing::field::Visit for SpanContextVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.context.set(field.name(), value.to_string());
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.context.set(field.name(), format!("{:?}", value));
    }
}

/// JSONL tracing layer, stderr by default.
pub struct JsonlLayer<W = io::Stderr> {
    writer: Mutex<W>,
}

impl JsonlLayer<io::Stderr> {
    pub fn stderr() -> Self {
        JsonlLayer {
            writer: Mutex::new(io::stderr()),
        }
    }
}

impl<W: Write> JsonlLayer<W> {
    /// Layer writing to a custom sink.
    pub fn new(writer: W) -> Self {
        JsonlLayer {
            writer: Mutex::new(writer),
        }
    }
}

impl<S, W> Layer<S> for JsonlLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: Write + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = SpanContextVisitor {
            context: SpanContext::default(),
        };
        attrs.record(&mut visitor);

        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(visitor.context);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let ts = Utc::now();

        // Innermost span wins for each correlation field.
        let mut inherited = SpanContext::default();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(span_ctx) = span.extensions().get::<SpanContext>() {
                    if inherited.run_id.is_none() {
                        inherited.run_id.clone_from(&span_ctx.run_id);
                    }
                    if inherited.model_id.is_none() {
                        inherited.model_id.clone_from(&span_ctx.model_id);
                    }
                    if inherited.host_id.is_none() {
                        inherited.host_id.clone_from(&span_ctx.host_id);
                    }
                    if inherited.stage.is_none() {
                        inherited.stage.clone_from(&span_ctx.stage);
                    }
                }
            }
        }

        let mut visitor = JsonFieldVisitor::new();
        event.record(&mut visitor);

        // Correlation fields given on the event itself are promoted; empty
        // values fall back to the span.
        let mut take = |name: &str, fallback: Option<String>| -> Option<String> {
            match visitor.fields.remove(name) {
                Some(serde_json::Value::String(s)) if s.is_empty() => fallback,
                Some(serde_json::Value::String(s)) => Some(s),
                Some(other) => Some(other.to_string()),
                None => fallback,
            }
        };
        let run_id = take("run_id", inherited.run_id);
        let model_id = take("model_id", inherited.model_id);
        let host_id = take("host_id", inherited.host_id);
        let stage = take("stage", inherited.stage);

        let level: Level = (*event.metadata().level()).into();
        let mut obj = serde_json::Map::new();

        obj.insert("ts".to_string(), serde_json::json!(ts.to_rfc3339()));
        obj.insert("level".to_string(), serde_json::json!(level));
        obj.insert(
            "event".to_string(),
            serde_json::json!(event.metadata().target()),
        );

        for (key, value) in [
            ("run_id", run_id),
            ("model_id", model_id),
            ("host_id", host_id),
            ("stage", stage),
            ("message", visitor.message),
        ] {
            if let Some(v) = value {
                obj.insert(key.to_string(), serde_json::json!(v));
            }
        }

        if !visitor.fields.is_empty() {
            obj.insert(
                "fields".to_string(),
                serde_json::Value::Object(visitor.fields),
            );
        }

        let json = serde_json::to_string(&serde_json::Value::Object(obj)).unwrap_or_default();
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    struct BufWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for BufWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(f: impl FnOnce()) -> Vec<serde_json::Value> {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let layer = JsonlLayer::new(BufWriter(buffer.clone()));
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, f);

        let output = buffer.lock().unwrap();
        String::from_utf8_lossy(&output)
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn layer_writes_level_and_message() {
        let lines = capture(|| {
            tracing::warn!(target: "stream.point_rejected", message = "danger");
        });
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["level"], "warn");
        assert_eq!(lines[0]["message"], "danger");
        assert_eq!(lines[0]["event"], "stream.point_rejected");
        assert!(lines[0]["ts"].is_string());
    }

    #[test]
    fn layer_records_extra_fields() {
        let lines = capture(|| {
            tracing::info!(target: "train.finished", trees = 42u64, parallel = true, score = 1.5, "done");
        });
        let fields = &lines[0]["fields"];
        assert_eq!(fields["trees"], 42);
        assert_eq!(fields["parallel"], true);
        assert_eq!(fields["score"], 1.5);
        assert_eq!(lines[0]["message"], "done");
    }

    #[test]
    fn non_finite_floats_stay_valid_json() {
        let lines = capture(|| {
            tracing::info!(target: "t", value = f64::NAN, "nan");
        });
        assert_eq!(lines[0]["fields"]["value"], "NaN");
    }

    #[test]
    fn correlation_fields_promoted_from_event() {
        let lines = capture(|| {
            tracing::info!(target: "run.started", run_id = "run-1", stage = %"init", "go");
        });
        assert_eq!(lines[0]["run_id"], "run-1");
        assert_eq!(lines[0]["stage"], "init");
        assert!(lines[0].get("fields").is_none());
    }

    #[test]
    fn span_context_inherited() {
        let lines = capture(|| {
            let span = tracing::info_span!("run", run_id = "run-outer", host_id = "host-1");
            let _guard = span.enter();
            tracing::info!(target: "score.finished", "inside");
        });
        assert_eq!(lines[0]["run_id"], "run-outer");
        assert_eq!(lines[0]["host_id"], "host-1");
    }
}
