use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OracleCallCategory {
    StockPrediction,
    PriceSuggestion,
    General,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OracleCallOutcome {
    Success,
    RateLimited,
    TransientError,
    Fallback,
}

/// Append-only audit record of one attempt against the external prediction
/// service. Written for every attempt, including failures, so the trail is
/// complete even when the caller only ever sees a fallback value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OracleCallRecord {
    pub id: Uuid,
    pub model: String,
    pub category: OracleCallCategory,
    pub related_id: Option<Uuid>,
    pub request: String,
    /// Raw response text on success, error detail otherwise.
    pub response: String,
    pub outcome: OracleCallOutcome,
    pub created_at: DateTime<Utc>,
}

impl OracleCallRecord {
    pub fn new(
        model: impl Into<String>,
        category: OracleCallCategory,
        related_id: Option<Uuid>,
        request: impl Into<String>,
        response: impl Into<String>,
        outcome: OracleCallOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            model: model.into(),
            category,
            related_id,
            request: request.into(),
            response: response.into(),
            outcome,
            created_at: Utc::now(),
        }
    }
}
