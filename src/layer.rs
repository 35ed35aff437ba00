use crate::driver::LogDriver;
use crate::record::LogRecord;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;
use uuid::Uuid;

// Events emitted by the drivers themselves never re-enter the pipeline.
const OWN_TARGET: &str = "edd_logger";

/// `tracing_subscriber` layer that turns events into [`LogRecord`]s and
/// hands them to a [`LogDriver`] via a bounded channel and background task.
///
/// Only events at `min_level` or more severe are captured. The background
/// task calls `send` once per record, in order; a failed send is reported
/// on stderr and the record is dropped.
///
/// Every record carries a trace id, a service and a level, so it satisfies
/// the persistence driver's NOT NULL columns: an event without a `trace_id`
/// field gets a fresh UUID, and without a configured service name the root
/// segment of the event target (the emitting crate) is used.
pub struct DriverLayer {
    sender: mpsc::Sender<LogRecord>,
    min_level: Level,
    service: Option<String>,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Dropped because the channel was full.
    pub dropped_events: Arc<AtomicU64>,
}

impl DriverLayer {
    /// Create a new layer and spawn the task that forwards records to
    /// `driver`. The driver is closed once every sender is gone.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        driver: Arc<dyn LogDriver>,
        buffer: usize,
        min_level: Level,
        service: Option<String>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<LogRecord>(buffer.max(16));

        let handle = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                if let Err(e) = driver.send(&record).await {
                    eprintln!("[digital-edd-logger] failed to deliver log record: {}", e);
                }
            }
            if let Err(e) = driver.close().await {
                eprintln!("[digital-edd-logger] failed to close log driver: {}", e);
            }
        });

        (Self {
            sender: tx,
            min_level,
            service,
            total_events: Arc::new(AtomicU64::new(0)),
            dropped_events: Arc::new(AtomicU64::new(0)),
        }, handle)
    }

    fn to_record(&self, event: &Event<'_>) -> LogRecord {
        let mut fields = BTreeMap::new();
        let mut message: Option<String> = None;
        event.record(&mut FieldVisitor { fields: &mut fields, message: &mut message });

        let meta = event.metadata();
        let mut take_text = |keys: &[&str]| {
            keys.iter().find_map(|k| fields.remove(*k)).map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
        };

        let trace_id = take_text(&["trace_id", "traceId"])
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let user = take_text(&["user"]);
        let action = take_text(&["action"]);
        let context = take_text(&["context"]).or_else(|| Some(meta.target().to_string()));
        let duration_ms = ["duration_ms", "durationMs"]
            .iter()
            .find_map(|k| fields.remove(*k))
            .and_then(|v| v.as_f64());

        let service = self
            .service
            .clone()
            .unwrap_or_else(|| target_root(meta.target()).to_string());

        LogRecord {
            trace_id: Some(trace_id),
            service: Some(service),
            level: Some(meta.level().to_string()),
            user,
            action,
            context,
            duration_ms,
            message_info: message,
            extra: fields,
            ..Default::default()
        }
    }
}

fn target_root(target: &str) -> &str {
    target.split("::").next().unwrap_or(target)
}

impl<S> Layer<S> for DriverLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        let meta = event.metadata();
        if *meta.level() > self.min_level || meta.target().starts_with(OWN_TARGET) {
            return;
        }

        let record = self.to_record(event);
        if let Err(_e) = self.sender.try_send(record) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
            eprintln!("log channel full, dropping log record");
        }
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, Value>,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), Value::String(format!("{:?}", value)));
        }
    }
}
