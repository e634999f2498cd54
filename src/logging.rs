use std::fmt::{self, Write as _};
use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::Result;

/// Initialize tracing: a human-readable layer on stderr, plus an optional
/// layer appending one flat JSON record per line to the configured file.
/// `RUST_LOG` overrides the configured level when set.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(&config.level)));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match &config.output_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let json_layer = tracing_subscriber::fmt::layer()
                .event_format(FlatJsonFormat)
                .with_writer(Mutex::new(file));
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(json_layer)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
        }
    }
    Ok(())
}

fn level_directive(level: &str) -> &str {
    match level {
        "debug" | "info" | "warn" | "error" => level,
        other => {
            eprintln!("unrecognized logging.level '{other}', falling back to 'info'");
            "info"
        }
    }
}

/// One flat JSON object per line: `{timestamp, level, message, data?}`,
/// where `data` carries the event's remaining fields at the top level.
struct FlatJsonFormat;

impl<S, N> FormatEvent<S, N> for FlatJsonFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let mut record = serde_json::Map::new();
        record.insert(
            "timestamp".to_string(),
            serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
        );
        record.insert(
            "level".to_string(),
            serde_json::Value::String(event.metadata().level().to_string()),
        );
        record.insert(
            "message".to_string(),
            serde_json::Value::String(fields.message),
        );
        if !fields.data.is_empty() {
            record.insert("data".to_string(), serde_json::Value::Object(fields.data));
        }

        writeln!(writer, "{}", serde_json::Value::Object(record))
    }
}

#[derive(Default)]
struct FieldCollector {
    message: String,
    data: serde_json::Map<String, serde_json::Value>,
}

impl FieldCollector {
    fn put(&mut self, field: &Field, value: serde_json::Value) {
        self.data.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.put(field, serde_json::Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, value.into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.put(field, serde_json::Value::String(format!("{value:?}")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;

    #[test]
    fn test_level_directive_accepts_known_levels() {
        assert_eq!(level_directive("debug"), "debug");
        assert_eq!(level_directive("error"), "error");
    }

    #[test]
    fn test_level_directive_falls_back_to_info() {
        assert_eq!(level_directive("chatty"), "info");
    }

    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_json_records_are_flat() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .event_format(FlatJsonFormat)
                .with_writer(move || SharedBuffer(Arc::clone(&sink))),
        );

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(iteration = 3, suite = "API", "Starting iteration");
        });

        let text = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        let record: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(record["message"], "Starting iteration");
        assert_eq!(record["level"], "INFO");
        assert_eq!(record["data"]["iteration"], 3);
        assert_eq!(record["data"]["suite"], "API");
        assert!(record["timestamp"].is_string());
        assert!(record.get("fields").is_none(), "no nested fields object");
    }
}
