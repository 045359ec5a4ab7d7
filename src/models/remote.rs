use serde::Deserialize;
use strum::Display;

/// Job state as reported by the transformation API.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteStatus {
    InQueue,
    InProgress,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

/// Body of `GET <status-base-url>/<job_id>`. Extra fields are ignored.
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub status: RemoteStatus,
}
