use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// One structured log event submitted by application code.
///
/// Every recognized field is optional. Keys that are not recognized are
/// kept in [`LogRecord::extra`]; the console driver prints them, the
/// persistence driver ignores them.
///
/// Serializing fails when `duration_ms` is NaN or infinite. Entries of
/// `extra` whose key is one of the recognized wire names are not written.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub request: Option<Value>,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub duration_ms: Option<f64>,
    /// Free-form labels. A non-list value on input degrades to `None`.
    #[serde(default, deserialize_with = "lenient_tags")]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub message_info: Option<String>,
    #[serde(default)]
    pub message_raw: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Wire names of the recognized fields.
pub const RECOGNIZED_FIELDS: [&str; 12] = [
    "traceId",
    "service",
    "level",
    "user",
    "action",
    "context",
    "request",
    "response",
    "durationMs",
    "tags",
    "messageInfo",
    "messageRaw",
];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRecord<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    level: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "finite_duration")]
    duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_info: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_raw: Option<&'a str>,
    #[serde(flatten)]
    extra: ExtraFields<'a>,
}

struct ExtraFields<'a>(&'a BTreeMap<String, Value>);

impl Serialize for ExtraFields<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(
            self.0
                .iter()
                .filter(|(key, _)| !RECOGNIZED_FIELDS.contains(&key.as_str())),
        )
    }
}

fn finite_duration<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(ms) if !ms.is_finite() => Err(S::Error::custom(format!(
            "durationMs must be a finite number, got {}",
            ms
        ))),
        _ => value.serialize(serializer),
    }
}

impl Serialize for LogRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireRecord {
            trace_id: self.trace_id.as_deref(),
            service: self.service.as_deref(),
            level: self.level.as_deref(),
            user: self.user.as_deref(),
            action: self.action.as_deref(),
            context: self.context.as_deref(),
            request: self.request.as_ref(),
            response: self.response.as_ref(),
            duration_ms: self.duration_ms,
            tags: self.tags.as_deref(),
            message_info: self.message_info.as_deref(),
            message_raw: self.message_raw.as_deref(),
            extra: ExtraFields(&self.extra),
        }
        .serialize(serializer)
    }
}

fn lenient_tags<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value::<Vec<String>>(v).ok()))
}

/// Column values bound by a single persistence insert, in statement order.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRow {
    pub trace_id: Option<String>,
    pub time_local: NaiveDateTime,
    pub time_utc: NaiveDateTime,
    pub service: Option<String>,
    pub level: Option<String>,
    pub user: Option<String>,
    pub action: Option<String>,
    pub context: Option<String>,
    pub request: Option<String>,
    pub response: Option<String>,
    pub duration_ms: Option<f64>,
    pub tags: Option<String>,
    pub message_info: Option<String>,
    pub message_raw: Option<String>,
    pub flag_summary: i32,
}

impl LogRow {
    /// Build a row stamped with the current local and UTC wall-clock time.
    pub fn from_record(record: &LogRecord) -> Self {
        Self::at(record, Local::now(), Utc::now())
    }

    /// Build a row with explicit insert timestamps.
    pub fn at(record: &LogRecord, local: DateTime<Local>, utc: DateTime<Utc>) -> Self {
        LogRow {
            trace_id: record.trace_id.clone(),
            time_local: local.naive_local(),
            time_utc: utc.naive_utc(),
            service: record.service.clone(),
            level: record.level.clone(),
            user: record.user.clone(),
            action: record.action.clone(),
            context: record.context.clone(),
            request: json_text(record.request.as_ref()),
            response: json_text(record.response.as_ref()),
            duration_ms: record.duration_ms,
            tags: joined_tags(record.tags.as_deref()),
            message_info: record.message_info.clone(),
            message_raw: record.message_raw.clone(),
            flag_summary: 0,
        }
    }
}

// Optional enrichment: anything that cannot be encoded is stored as NULL.
fn json_text(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(v) => serde_json::to_string(v).ok(),
    }
}

fn joined_tags(tags: Option<&[String]>) -> Option<String> {
    match tags {
        Some(tags) if !tags.is_empty() => Some(tags.join(",")),
        _ => None,
    }
}
