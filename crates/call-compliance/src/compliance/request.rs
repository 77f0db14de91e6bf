use serde::{Deserialize, Deserializer, Serialize};

use super::domain::{CallSignals, OrganizationId};

/// Rejection of a malformed evaluate request, raised before any rule fetch.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("organizationId is required")]
    MissingOrganizationId,
    #[error("callData is required")]
    MissingCallData,
    #[error("malformed evaluate request: {0}")]
    MalformedBody(String),
}

/// Inbound evaluate payload. Fields are optional so absence maps to a validation error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateRequest {
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub call_data: Option<CallData>,
}

/// Signals derived from a recorded interaction by the upstream analysis pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallData {
    #[serde(default)]
    pub transcript: Option<TranscriptData>,
    #[serde(default)]
    pub sentiment: Option<SentimentData>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptData {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentData {
    #[serde(default)]
    pub score: Option<f64>,
}

/// Upstream analysers send `null` for lists they produced nothing for.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl CallData {
    pub fn into_signals(self) -> CallSignals {
        CallSignals {
            keywords: self
                .transcript
                .map(|transcript| transcript.keywords.into_iter().collect())
                .unwrap_or_default(),
            sentiment: self.sentiment.and_then(|sentiment| sentiment.score),
            // Fractional seconds truncate; negative or NaN durations read as zero.
            duration: self
                .duration
                .filter(|seconds| seconds.is_finite())
                .map(|seconds| seconds.max(0.0) as u64),
            topics: self.topics.into_iter().collect(),
        }
    }
}

impl EvaluateRequest {
    pub fn into_parts(self) -> Result<(OrganizationId, CallSignals), ValidationError> {
        let organization_id = self
            .organization_id
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .ok_or(ValidationError::MissingOrganizationId)?;
        let call_data = self.call_data.ok_or(ValidationError::MissingCallData)?;

        Ok((OrganizationId(organization_id), call_data.into_signals()))
    }
}
