use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Domain content carried by a block.
///
/// Serialized internally tagged (`"kind": "policy_finding"`) so the persisted
/// log is self-describing. All maps are `BTreeMap`s, which keeps the JSON
/// encoding canonical for hashing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Payload {
    /// The first block of every ledger.
    Genesis,
    /// A policy decision derived from a case study.
    PolicyFinding {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        case_study_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        policy_impact: Option<Value>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        details: BTreeMap<String, Value>,
    },
    /// Any other finding, keyed by the submitter's record type.
    GenericRecord {
        record_type: String,
        #[serde(default)]
        fields: BTreeMap<String, Value>,
    },
}

impl Payload {
    /// Record type as submitted (`"genesis"`, `"policy_finding"`, or the
    /// caller-supplied type of a generic record).
    pub fn record_type(&self) -> &str {
        match self {
            Self::Genesis => "genesis",
            Self::PolicyFinding { .. } => crate::submission::POLICY_FINDING_TYPE,
            Self::GenericRecord { record_type, .. } => record_type,
        }
    }
}

/// Provenance metadata attached to every record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainOfCustody {
    /// Identity of the submitting user or service.
    pub uploader: String,
    /// Where the submission came from (usually a network address).
    pub origin: String,
    /// Version of the toolchain that produced the finding.
    pub toolchain_version: String,
    /// Fingerprint of the underlying evidence artifact.
    pub evidence_hash: String,
}

/// The `data` field of a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockData {
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<String>,
    pub custody: ChainOfCustody,
}

impl BlockData {
    /// Data for the genesis block.
    pub fn genesis(toolchain_version: impl Into<String>) -> Self {
        Self {
            payload: Payload::Genesis,
            session_id: None,
            analysis_id: None,
            custody: ChainOfCustody {
                uploader: "system".into(),
                origin: "local".into(),
                toolchain_version: toolchain_version.into(),
                evidence_hash: String::new(),
            },
        }
    }

    /// Returns `true` if this record belongs to the given session or analysis.
    pub fn matches_session(&self, id: &str) -> bool {
        self.session_id.as_deref() == Some(id) || self.analysis_id.as_deref() == Some(id)
    }
}
