use edd_logger::{ConsoleDriver, LogDriver, LogRecord};
use serde_json::json;

#[tokio::main]
async fn main() {
    let driver = ConsoleDriver::new();

    let record = LogRecord {
        trace_id: Some("trace-123".into()),
        service: Some("checkout".into()),
        level: Some("INFO".into()),
        action: Some("create-order".into()),
        request: Some(json!({ "sku": "A-1", "qty": 2 })),
        duration_ms: Some(42.0),
        tags: Some(vec!["orders".into(), "web".into()]),
        message_info: Some("order created".into()),
        ..Default::default()
    };

    match driver.send(&record).await {
        Ok(id) => println!("delivered: {}", id),
        Err(e) => eprintln!("delivery failed: {}", e),
    }
}
