use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Metadata captured for one simulation or analysis run.
///
/// `executable`, `repository`, `launch_mode` and the entries of the list
/// fields are structured JSON whose shape belongs to the orchestration
/// layer; the store carries them opaquely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub label: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub executable: Value,
    #[serde(default)]
    pub repository: Value,
    #[serde(default)]
    pub main_file: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub launch_mode: Value,
    #[serde(default)]
    pub platforms: Vec<Value>,
    #[serde(default)]
    pub input_data: Vec<Value>,
    #[serde(default)]
    pub output_data: Vec<Value>,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub script_arguments: String,
    #[serde(default)]
    pub dependencies: Vec<Value>,
    #[serde(default)]
    pub stdout_stderr: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub input_datastore: Value,
    #[serde(default)]
    pub datastore: Value,
}

impl Record {
    pub fn new(label: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            label: label.into(),
            timestamp,
            reason: String::new(),
            outcome: String::new(),
            tags: BTreeSet::new(),
            executable: Value::Null,
            repository: Value::Null,
            main_file: String::new(),
            version: String::new(),
            launch_mode: Value::Null,
            platforms: Vec::new(),
            input_data: Vec::new(),
            output_data: Vec::new(),
            parameters: Value::Null,
            script_arguments: String::new(),
            dependencies: Vec::new(),
            stdout_stderr: String::new(),
            user: String::new(),
            duration: None,
            input_datastore: Value::Null,
            datastore: Value::Null,
        }
    }
}

pub fn encode_record(record: &Record) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(record)?)
}

pub fn encode_record_pretty(record: &Record) -> Result<String, CodecError> {
    Ok(serde_json::to_string_pretty(record)?)
}

pub fn decode_record(bytes: &[u8]) -> Result<Record, CodecError> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample_record() -> Record {
        let mut record = Record::new(
            "run_20260805_001",
            Utc.with_ymd_and_hms(2026, 8, 5, 12, 30, 0).unwrap(),
        );
        record.reason = "parameter sweep over dt".to_string();
        record.outcome = "converged".to_string();
        record.tags.insert("sweep".to_string());
        record.tags.insert("baseline".to_string());
        record.executable = json!({"name": "python", "path": "/usr/bin/python", "version": "3.11"});
        record.repository = json!({"url": "https://example.org/sim.git", "type": "git"});
        record.main_file = "main.py".to_string();
        record.version = "a1b2c3d".to_string();
        record.launch_mode = json!({"type": "serial", "working_directory": "/work"});
        record.platforms = vec![json!({"system_name": "Linux", "release": "6.1"})];
        record.input_data = vec![json!({"path": "in.dat", "digest": "d41d8cd9"})];
        record.output_data = vec![json!({"path": "out.dat", "digest": "98f13708"})];
        record.parameters = json!({"dt": 0.01, "n_steps": 1000});
        record.script_arguments = "--fast".to_string();
        record.dependencies = vec![json!({"name": "numpy", "version": "1.26"})];
        record.stdout_stderr = "step 1000 done\n".to_string();
        record.user = "ada".to_string();
        record.duration = Some(12.5);
        record
    }

    #[test]
    fn encode_decode_roundtrip_preserves_every_field() {
        let record = sample_record();
        let bytes = encode_record(&record).expect("encode");
        let decoded = decode_record(&bytes).expect("decode");
        assert_eq!(decoded, record);
    }

    #[test]
    fn pretty_encoding_decodes_to_the_same_record() {
        let record = sample_record();
        let pretty = encode_record_pretty(&record).expect("encode pretty");
        let decoded = decode_record(pretty.as_bytes()).expect("decode");
        assert_eq!(decoded, record);
    }

    #[test]
    fn decode_rejects_invalid_json() {
        let err = decode_record(b"{not json").expect_err("must fail");
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn decode_rejects_missing_label() {
        let err = decode_record(br#"{"timestamp": "2026-08-05T12:30:00Z"}"#).expect_err("must fail");
        assert!(err.to_string().contains("malformed record"));
    }

    #[test]
    fn decode_rejects_missing_timestamp() {
        decode_record(br#"{"label": "run_1"}"#).expect_err("must fail");
    }

    #[test]
    fn decode_fills_optional_fields_with_defaults() {
        let decoded = decode_record(
            br#"{"label": "run_1", "timestamp": "2026-08-05T12:30:00Z"}"#,
        )
        .expect("decode sparse record");
        assert!(decoded.tags.is_empty());
        assert!(decoded.platforms.is_empty());
        assert_eq!(decoded.parameters, Value::Null);
        assert_eq!(decoded.duration, None);
        assert_eq!(decoded.stdout_stderr, "");
    }

    #[test]
    fn encoding_is_deterministic() {
        let record = sample_record();
        let first = encode_record(&record).expect("encode");
        let second = encode_record(&record).expect("encode");
        assert_eq!(first, second);
    }
}
