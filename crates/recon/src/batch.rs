//! Batch envelope and per-record extraction.
//!
//! The envelope shape (`data` array) is checked once per run; a bad envelope
//! fails the whole run. Records are extracted one at a time inside the
//! per-record boundary, so a bad record only fails itself.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SyncError;
use crate::model::{IncomingLead, LeadFields};

static NULL: Value = Value::Null;

/// Label used in error strings when a record carries no usable id.
pub const UNKNOWN_ID: &str = "unknown";

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Pagination block supplied by the origin. Carried for logging only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BatchInfo {
    #[serde(default)]
    pub per_page: Option<u64>,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub more_records: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Batch {
    pub data: Vec<Value>,
    #[serde(default)]
    pub info: Option<Value>,
}

impl Batch {
    pub fn from_value(value: &Value) -> Result<Self, SyncError> {
        if !value.is_object() {
            return Err(SyncError::InvalidBatch("batch must be a JSON object".into()));
        }
        Batch::deserialize(value).map_err(|e| SyncError::InvalidBatch(e.to_string()))
    }

    pub fn from_json(input: &str) -> Result<Self, SyncError> {
        let value: Value =
            serde_json::from_str(input).map_err(|e| SyncError::InvalidBatch(e.to_string()))?;
        Self::from_value(&value)
    }

    /// `info` decoded best-effort; a malformed block is ignored.
    pub fn info(&self) -> Option<BatchInfo> {
        self.info
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct LeadExtras<'a> {
    #[serde(rename = "Lead_Status")]
    lead_status: &'a Value,
    #[serde(rename = "Owner")]
    owner: &'a Value,
    #[serde(rename = "Created_Time")]
    created_time: &'a Value,
}

impl IncomingLead {
    /// Build a lead from one `data` entry. Absent and `null` fields become
    /// `None`; only a missing id or a non-scalar field is rejected.
    pub fn from_value(value: &Value) -> Result<Self, SyncError> {
        let obj = value
            .as_object()
            .ok_or_else(|| SyncError::MalformedRecord("record is not a JSON object".into()))?;

        let id = scalar_text(obj, "id")?
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| SyncError::MalformedRecord("missing required field 'id'".into()))?;

        let extras = LeadExtras {
            lead_status: obj.get("Lead_Status").unwrap_or(&NULL),
            owner: obj.get("Owner").unwrap_or(&NULL),
            created_time: obj.get("Created_Time").unwrap_or(&NULL),
        };

        Ok(Self {
            id,
            fields: LeadFields {
                first_name: scalar_text(obj, "First_Name")?,
                last_name: scalar_text(obj, "Last_Name")?,
                email: scalar_text(obj, "Email")?,
                phone: scalar_text(obj, "Phone")?,
                company: scalar_text(obj, "Company")?,
                lead_source: scalar_text(obj, "Lead_Source")?,
                description: Some(serde_json::to_string(&extras)?),
                source_modified_time: scalar_text(obj, "Modified_Time")?,
            },
        })
    }
}

/// Best-effort id for error labels, even when the record is otherwise invalid.
/// Follows the same coercion as extraction, so the label matches the id the
/// record would have been stored under.
pub fn record_id(value: &Value) -> String {
    value
        .as_object()
        .and_then(|obj| scalar_text(obj, "id").ok().flatten())
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_ID.to_string())
}

fn scalar_text(obj: &Map<String, Value>, key: &str) -> Result<Option<String>, SyncError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(Value::Array(_)) => Err(SyncError::MalformedRecord(format!(
            "field '{key}' must be a scalar, got an array"
        ))),
        Some(Value::Object(_)) => Err(SyncError::MalformedRecord(format!(
            "field '{key}' must be a scalar, got an object"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_requires_data() {
        let err = Batch::from_value(&json!({ "info": { "page": 1 } })).unwrap_err();
        assert!(matches!(err, SyncError::InvalidBatch(_)));
        assert!(err.to_string().contains("data"));

        let err = Batch::from_value(&json!({ "data": "nope" })).unwrap_err();
        assert!(matches!(err, SyncError::InvalidBatch(_)));

        let err = Batch::from_value(&json!([1, 2, 3])).unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }

    #[test]
    fn envelope_info_is_optional_and_lenient() {
        let batch = Batch::from_value(&json!({ "data": [] })).unwrap();
        assert!(batch.data.is_empty());
        assert!(batch.info().is_none());

        let batch = Batch::from_json(
            r#"{"data": [], "info": {"per_page": 200, "count": 1, "page": 1, "more_records": false}}"#,
        )
        .unwrap();
        let info = batch.info().unwrap();
        assert_eq!(info.per_page, Some(200));
        assert_eq!(info.more_records, Some(false));

        let batch = Batch::from_value(&json!({ "data": [], "info": "garbage" })).unwrap();
        assert!(batch.info().is_none());
    }

    #[test]
    fn extract_full_record() {
        let lead = IncomingLead::from_value(&json!({
            "id": "000000000000000001",
            "First_Name": "Jane",
            "Last_Name": "Doe",
            "Email": "jane.doe@example.com",
            "Phone": "+1234567890",
            "Company": "Example Corp",
            "Lead_Source": "website",
            "Lead_Status": null,
            "Owner": { "name": "Owner Name", "id": "000000000000000000" },
            "Created_Time": "2025-01-01T12:00:00+00:00",
            "Modified_Time": "2025-01-01T12:00:00+00:00"
        }))
        .unwrap();

        assert_eq!(lead.id, "000000000000000001");
        assert_eq!(lead.fields.first_name.as_deref(), Some("Jane"));
        assert_eq!(lead.fields.lead_source.as_deref(), Some("website"));
        assert_eq!(
            lead.fields.source_modified_time.as_deref(),
            Some("2025-01-01T12:00:00+00:00")
        );

        let description: Value =
            serde_json::from_str(lead.fields.description.as_deref().unwrap()).unwrap();
        assert_eq!(description["Lead_Status"], Value::Null);
        assert_eq!(description["Owner"]["name"], "Owner Name");
        assert_eq!(description["Created_Time"], "2025-01-01T12:00:00+00:00");
    }

    #[test]
    fn absent_fields_are_none() {
        let lead = IncomingLead::from_value(&json!({ "id": "7" })).unwrap();
        assert_eq!(lead.fields.first_name, None);
        assert_eq!(lead.fields.source_modified_time, None);
        assert_eq!(
            lead.fields.description.as_deref(),
            Some(r#"{"Lead_Status":null,"Owner":null,"Created_Time":null}"#)
        );
    }

    #[test]
    fn numeric_scalars_become_text() {
        let lead = IncomingLead::from_value(&json!({ "id": 42, "Phone": 5551234 })).unwrap();
        assert_eq!(lead.id, "42");
        assert_eq!(lead.fields.phone.as_deref(), Some("5551234"));
    }

    #[test]
    fn missing_or_blank_id_rejected() {
        for record in [json!({ "First_Name": "X" }), json!({ "id": null }), json!({ "id": "  " })] {
            let err = IncomingLead::from_value(&record).unwrap_err();
            assert!(err.to_string().contains("missing required field 'id'"));
        }
    }

    #[test]
    fn non_scalar_field_rejected() {
        let err = IncomingLead::from_value(&json!({ "id": "1", "Email": ["a", "b"] })).unwrap_err();
        assert!(matches!(err, SyncError::MalformedRecord(_)));
        assert!(err.to_string().contains("'Email'"));

        let err = IncomingLead::from_value(&json!("just a string")).unwrap_err();
        assert!(err.to_string().contains("not a JSON object"));
    }

    #[test]
    fn record_id_labels() {
        assert_eq!(record_id(&json!({ "id": "abc" })), "abc");
        assert_eq!(record_id(&json!({ "id": 9 })), "9");
        assert_eq!(record_id(&json!({ "id": "" })), UNKNOWN_ID);
        assert_eq!(record_id(&json!({})), UNKNOWN_ID);
        assert_eq!(record_id(&json!(null)), UNKNOWN_ID);
        assert_eq!(record_id(&json!({ "id": [1] })), UNKNOWN_ID);
    }

    #[test]
    fn boolean_id_labels_its_own_failure() {
        let record = json!({ "id": true, "Email": ["a@example.com"] });
        assert_eq!(record_id(&record), "true");
        let err = IncomingLead::from_value(&record).unwrap_err();
        assert!(err.to_string().contains("field 'Email' must be a scalar"));
    }
}
