use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn local_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Severity {
    Critical,
    High,
}

/// A threat entry as kept in the history file.
///
/// Clients own the shape of these records, so the object is stored exactly
/// as submitted. The known fields are read through accessors that treat a
/// missing, null or non-string value as absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ThreatRecord(Map<String, Value>);

impl ThreatRecord {
    pub const STRING_FIELDS: [&'static str; 7] =
        ["threat", "severity", "type", "subtype", "site", "timestamp", "logId"];

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    #[cfg(test)]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.fields().get(key).and_then(Value::as_str)
    }

    pub fn threat(&self) -> Option<&str> {
        self.text("threat")
    }

    pub fn log_id(&self) -> Option<&str> {
        self.text("logId")
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.text("timestamp")
    }
}

/// What the detection endpoints hand back for a flagged URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionRecord {
    pub label: String,
    pub severity: Severity,
    #[serde(rename = "type")]
    pub kind: String,
    pub subtype: String,
    pub timestamp: String,
}

impl DetectionRecord {
    pub fn new(label: &str, severity: Severity, kind: &str, subtype: &str) -> Self {
        Self {
            label: label.to_string(),
            severity,
            kind: kind.to_string(),
            subtype: subtype.to_string(),
            timestamp: local_timestamp(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub prediction: String,
    pub confidence: f64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalyzeResponse {
    Detections(Vec<DetectionRecord>),
    Prediction(Classification),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ThreatLevel {
    High,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedReport {
    pub url: String,
    pub domain: String,
    pub threat_level: ThreatLevel,
    pub details: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreatIntelRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeImageRequest {
    #[serde(default)]
    pub images: Vec<String>,
}

/// `threatHistory` stays untyped until the handler has checked it is a list.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitHistoryRequest {
    #[serde(rename = "threatHistory", default = "empty_list")]
    pub threat_history: Value,
}

fn empty_list() -> Value {
    Value::Array(Vec::new())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitHistoryResponse {
    pub message: String,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_threat_record_is_stored_verbatim() {
        let raw = json!({
            "threat": "Phishing",
            "severity": "High",
            "type": "Reputation",
            "site": "http://example.com",
            "subtype": null,
            "pageTitle": "Sign in"
        });

        let record: ThreatRecord = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(record.text("type"), Some("Reputation"));
        assert_eq!(record.text("subtype"), None);
        assert_eq!(record.fields().get("pageTitle"), Some(&json!("Sign in")));
        assert_eq!(serde_json::to_value(&record).unwrap(), raw);
    }

    #[test]
    fn test_threat_record_tolerates_non_string_fields() {
        let record: ThreatRecord =
            serde_json::from_value(json!({"threat": "XSS", "severity": 3})).unwrap();
        assert_eq!(record.threat(), Some("XSS"));
        assert_eq!(record.text("severity"), None);
        assert_eq!(record.fields()["severity"], json!(3));
    }

    #[test]
    fn test_detection_record_wire_names() {
        let record = DetectionRecord::new(
            "Suspicious Image Detected",
            Severity::High,
            "Malware Image",
            "Infection/Exploitation",
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "Malware Image");
        assert_eq!(value["severity"], "High");
        assert!(chrono::NaiveDateTime::parse_from_str(&record.timestamp, TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn test_submit_history_defaults_to_empty_list() {
        let request: SubmitHistoryRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(request.threat_history, json!([]));
    }
}
