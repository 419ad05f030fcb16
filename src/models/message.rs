//! Request/response messages exchanged with the UI and background triggers

use serde::{Deserialize, Serialize};

use crate::models::ApiKey;
use crate::scoring::ScoreBreakdown;

/// Actions the key service can be asked to perform
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    /// Rank every key for the page at `url`
    UpdateRanking { url: String },
    /// A key was copied/used on the page at `url`
    #[serde(rename_all = "camelCase")]
    TrackUsage { key_id: String, url: String },
    /// Store a new key
    AddApiKey { name: String, key: String },
    #[serde(rename_all = "camelCase")]
    DeleteApiKey { key_id: String },
    ListKeys,
    /// Drop usage older than the retention horizon
    Prune,
}

/// A key with its score, as returned by ranking
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedKeyView {
    pub id: String,
    pub name: String,
    /// Truncated secret
    pub preview: String,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranked: Option<Vec<RankedKeyView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<ApiKey>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<ApiKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<usize>,
    /// Set when the write landed in the fallback store
    pub degraded: bool,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failed(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            error_kind: Some(kind),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_extension_messages() {
        let r: Request =
            serde_json::from_str(r#"{"action":"trackUsage","keyId":"k1","url":"https://a.b/"}"#)
                .unwrap();
        assert_eq!(
            r,
            Request::TrackUsage {
                key_id: "k1".into(),
                url: "https://a.b/".into()
            }
        );

        let r: Request =
            serde_json::from_str(r#"{"action":"addApiKey","name":"n","key":"s"}"#).unwrap();
        assert!(matches!(r, Request::AddApiKey { .. }));

        let r: Request = serde_json::from_str(r#"{"action":"listKeys"}"#).unwrap();
        assert_eq!(r, Request::ListKeys);
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(serde_json::from_str::<Request>(r#"{"action":"explode"}"#).is_err());
    }

    #[test]
    fn failure_shape() {
        let v = serde_json::to_value(Response::failed("invalid_url", "bad")).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["errorKind"], "invalid_url");
        assert!(v.get("keys").is_none());
    }
}
