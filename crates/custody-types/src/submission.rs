use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::digest::Digest;
use crate::error::TypeError;
use crate::payload::{BlockData, ChainOfCustody, Payload};

/// Record type that maps onto [`Payload::PolicyFinding`].
pub const POLICY_FINDING_TYPE: &str = "policy_finding";

const RESERVED_TYPES: &[&str] = &["genesis"];

/// An untrusted record submitted by a collaborator.
///
/// Known keys are lifted into typed fields; every other key is kept in
/// `fields` and stored verbatim with the record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSubmission {
    #[serde(rename = "type", default)]
    pub record_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_study_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_impact: Option<Value>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

/// Chain-of-custody values used when the submitter omits them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustodyDefaults {
    pub uploader: String,
    pub origin: String,
    pub toolchain_version: String,
}

impl CustodyDefaults {
    /// Defaults for a submission arriving from `origin`.
    pub fn for_origin(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Self::default()
        }
    }
}

impl Default for CustodyDefaults {
    fn default() -> Self {
        Self {
            uploader: "anonymous".into(),
            origin: "unknown".into(),
            toolchain_version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

impl RecordSubmission {
    /// Parse a submission from an arbitrary JSON value.
    pub fn from_value(value: Value) -> Result<Self, TypeError> {
        if !value.is_object() {
            return Err(TypeError::Rejected("record must be a JSON object".into()));
        }
        serde_json::from_value(value).map_err(|e| TypeError::Rejected(e.to_string()))
    }

    /// Validate the submission and convert it into block data.
    ///
    /// Missing custody fields are filled from `defaults`; a missing evidence
    /// hash becomes the digest of the submission itself.
    pub fn into_block_data(self, defaults: &CustodyDefaults) -> Result<BlockData, TypeError> {
        let record_type = match self.record_type.as_deref().map(str::trim) {
            None | Some("") => return Err(TypeError::Rejected("missing record type".into())),
            Some(t) if RESERVED_TYPES.contains(&t) => {
                return Err(TypeError::Rejected(format!("record type `{t}` is reserved")))
            }
            Some(t) => t.to_string(),
        };
        let session_id = non_blank("sessionId", self.session_id.clone())?;
        let analysis_id = non_blank("analysisId", self.analysis_id.clone())?;

        let evidence_hash = match self.evidence_hash.clone().filter(|h| !h.trim().is_empty()) {
            Some(hash) => hash,
            None => {
                let encoded = serde_json::to_vec(&self)
                    .map_err(|e| TypeError::Serialization(e.to_string()))?;
                Digest::of(&encoded).to_hex()
            }
        };

        let custody = ChainOfCustody {
            uploader: or_default(self.uploader, &defaults.uploader),
            origin: or_default(self.origin, &defaults.origin),
            toolchain_version: or_default(self.toolchain_version, &defaults.toolchain_version),
            evidence_hash,
        };

        let payload = if record_type == POLICY_FINDING_TYPE {
            Payload::PolicyFinding {
                case_study_id: self.case_study_id,
                policy_impact: self.policy_impact,
                details: self.fields,
            }
        } else {
            let mut fields = self.fields;
            if let Some(id) = self.case_study_id {
                fields.insert("caseStudyId".into(), Value::String(id));
            }
            if let Some(impact) = self.policy_impact {
                fields.insert("policyImpact".into(), impact);
            }
            Payload::GenericRecord {
                record_type,
                fields,
            }
        };

        Ok(BlockData {
            payload,
            session_id,
            analysis_id,
            custody,
        })
    }
}

fn non_blank(name: &str, value: Option<String>) -> Result<Option<String>, TypeError> {
    match value {
        Some(v) if v.trim().is_empty() => Err(TypeError::Rejected(format!("{name} is blank"))),
        other => Ok(other),
    }
}

fn or_default(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn submit(value: Value) -> Result<BlockData, TypeError> {
        RecordSubmission::from_value(value)?.into_block_data(&CustodyDefaults::for_origin("127.0.0.1"))
    }

    #[test]
    fn policy_finding_example() {
        let data = submit(json!({
            "type": "policy_finding",
            "sessionId": "s1",
            "evidenceHash": "abc123"
        }))
        .unwrap();
        assert!(matches!(data.payload, Payload::PolicyFinding { .. }));
        assert_eq!(data.session_id.as_deref(), Some("s1"));
        assert_eq!(data.custody.evidence_hash, "abc123");
        assert_eq!(data.custody.uploader, "anonymous");
        assert_eq!(data.custody.origin, "127.0.0.1");
    }

    #[test]
    fn generic_record_keeps_unknown_fields() {
        let data = submit(json!({
            "type": "taxonomy_call",
            "analysisId": "run-7",
            "uploader": "lab-3",
            "taxon": "Quercus robur",
            "confidence": 97
        }))
        .unwrap();
        match data.payload {
            Payload::GenericRecord {
                record_type,
                fields,
            } => {
                assert_eq!(record_type, "taxonomy_call");
                assert_eq!(fields["taxon"], "Quercus robur");
                assert_eq!(fields["confidence"], 97);
                assert!(!fields.contains_key("uploader"));
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert_eq!(data.custody.uploader, "lab-3");
    }

    #[test]
    fn missing_evidence_hash_is_derived() {
        let a = submit(json!({"type": "note", "text": "one"})).unwrap();
        let b = submit(json!({"type": "note", "text": "two"})).unwrap();
        assert_eq!(a.custody.evidence_hash.len(), 64);
        assert_ne!(a.custody.evidence_hash, b.custody.evidence_hash);
    }

    #[test]
    fn missing_type_is_rejected() {
        let err = submit(json!({"sessionId": "s1"})).unwrap_err();
        assert_eq!(err, TypeError::Rejected("missing record type".into()));
        assert!(submit(json!({"type": "  "})).is_err());
    }

    #[test]
    fn reserved_type_is_rejected() {
        assert!(submit(json!({"type": "genesis"})).is_err());
    }

    #[test]
    fn blank_session_is_rejected() {
        assert!(submit(json!({"type": "note", "sessionId": ""})).is_err());
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(RecordSubmission::from_value(json!([1, 2, 3])).is_err());
        assert!(RecordSubmission::from_value(json!("text")).is_err());
    }

    #[test]
    fn wrongly_typed_known_field_is_rejected() {
        assert!(RecordSubmission::from_value(json!({"type": "note", "sessionId": 5})).is_err());
    }
}
