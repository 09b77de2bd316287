use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The `ExecCredential` document a Kubernetes client reads from an exec
/// plugin, e.g.
/// `{"kind": "ExecCredential", "apiVersion": "client.authentication.k8s.io/v1beta1",
///   "spec": {}, "status": {"expirationTimestamp": "2021-08-04T07:57:20Z", "token": "k8s-aws-v1..."}}`
#[derive(Debug, Deserialize, Serialize)]
pub struct ExecCredential {
    pub kind: String,
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<Value>,
    pub status: ExecCredentialStatus,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ExecCredentialStatus {
    #[serde(rename = "expirationTimestamp")]
    pub expiration_timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Failed to parse ExecCredential payload: {source}")]
    Parse { source: serde_json::Error },

    #[error("Invalid expirationTimestamp {timestamp:?}: {source}")]
    Timestamp {
        timestamp: String,
        source: chrono::ParseError,
    },
}

impl ExecCredential {
    pub fn from_slice(payload: &[u8]) -> Result<Self, CredentialError> {
        serde_json::from_slice(payload).map_err(|source| CredentialError::Parse { source })
    }

    pub fn expires_at(&self) -> Result<DateTime<FixedOffset>, CredentialError> {
        let timestamp = &self.status.expiration_timestamp;
        DateTime::parse_from_rfc3339(timestamp).map_err(|source| CredentialError::Timestamp {
            timestamp: timestamp.clone(),
            source,
        })
    }
}
