//! Request/response boundary for the rewarded-ad claim call.
//!
//! # Responsibility
//! - Decode the `{ "userId": string }` payload and attach the verified caller
//!   identity supplied out of band by the authentication layer.
//! - Encode success as `{ "extraWords": [...] }` and failure as
//!   `{ "code": ..., "message": ... }`.
//!
//! # Invariants
//! - No partial-success shape exists.
//! - Identity checks keep their order: an unauthenticated caller is reported
//!   as such even when the payload is malformed.

use crate::clock::Clock;
use crate::model::ids::WordId;
use crate::random::RandomSource;
use crate::repo::daily_repo::DailyRepository;
use crate::service::reward_service::{RewardError, RewardErrorKind, RewardService};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Success payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub extra_words: Vec<WordId>,
}

/// Failure payload with a machine-readable kind code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    fn new(kind: RewardErrorKind, message: impl Into<String>) -> Self {
        Self {
            code: kind.code().to_string(),
            message: message.into(),
        }
    }
}

impl From<&RewardError> for ApiError {
    fn from(value: &RewardError) -> Self {
        let message = match value {
            // Storage internals stay in logs.
            RewardError::Repo(_) => "internal error while granting reward".to_string(),
            other => other.to_string(),
        };
        Self::new(value.kind(), message)
    }
}

/// Extracts `userId` from a raw payload.
///
/// Returns `None` when the payload is not a JSON object or `userId` is
/// missing or not a string.
pub fn extract_user_id(payload: &str) -> Option<String> {
    let value: Value = serde_json::from_str(payload).ok()?;
    value.get("userId")?.as_str().map(str::to_string)
}

/// Handles one claim call.
pub fn handle_claim<R, C, G>(
    service: &RewardService<R, C, G>,
    caller: Option<&str>,
    payload: &str,
) -> Result<ClaimResponse, ApiError>
where
    R: DailyRepository,
    C: Clock,
    G: RandomSource,
{
    // A missing or non-string id flows through as blank so the service
    // applies its own precondition order.
    let user_id = extract_user_id(payload).unwrap_or_default();
    service
        .claim_daily_reward(caller, &user_id)
        .map(|claim| ClaimResponse {
            extra_words: claim.extra_word_ids,
        })
        .map_err(|err| ApiError::from(&err))
}

/// Handles one claim call and always returns a JSON document.
pub fn handle_claim_json<R, C, G>(
    service: &RewardService<R, C, G>,
    caller: Option<&str>,
    payload: &str,
) -> String
where
    R: DailyRepository,
    C: Clock,
    G: RandomSource,
{
    let encoded = match handle_claim(service, caller, payload) {
        Ok(response) => serde_json::to_string(&response),
        Err(err) => serde_json::to_string(&err),
    };
    encoded.unwrap_or_else(|_| {
        r#"{"code":"internal","message":"failed to encode response"}"#.to_string()
    })
}
