//! Memory records and the harvested-page payload they are built from.

use serde::{Deserialize, Serialize};

/// One remembered page. The URL is the identity: re-harvesting a URL
/// replaces the whole record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub url: String,
    pub title: String,
    pub text: String,
    pub vector: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    /// Harvest time in epoch milliseconds
    pub timestamp: i64,
}

impl MemoryRecord {
    /// Build a record stamped with the current time.
    pub fn new(payload: PagePayload, vector: Vec<f32>) -> Self {
        Self::with_timestamp(payload, vector, now_millis())
    }

    pub fn with_timestamp(payload: PagePayload, vector: Vec<f32>, timestamp: i64) -> Self {
        Self {
            url: payload.url,
            title: payload.title,
            text: payload.text,
            vector,
            favicon: payload.favicon,
            timestamp,
        }
    }
}

/// What the harvester sends for a page it decided to remember.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagePayload {
    pub url: String,
    pub title: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_without_favicon() {
        let payload: PagePayload = serde_json::from_str(
            r#"{"url":"https://example.com","title":"Example","text":"Title: Example."}"#,
        )
        .unwrap();
        assert_eq!(payload.favicon, None);

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("favicon").is_none());
    }

    #[test]
    fn test_new_record_is_stamped_now() {
        let before = now_millis();
        let record = MemoryRecord::new(
            PagePayload {
                url: "https://example.com".to_string(),
                title: "Example".to_string(),
                text: "text".to_string(),
                favicon: Some("https://example.com/favicon.ico".to_string()),
            },
            vec![1.0, 0.0],
        );
        let after = now_millis();

        assert!(record.timestamp >= before && record.timestamp <= after);
        assert_eq!(record.favicon.as_deref(), Some("https://example.com/favicon.ico"));
    }
}
