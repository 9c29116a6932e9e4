use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::map::FieldChange;
use crate::models::{FormatId, UserId};

/// Request payload for submitting a new run
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SubmitCompletionRequest {
    #[validate(length(min = 1, max = 10))]
    pub map: String,

    pub format: FormatId,

    #[serde(default)]
    pub black_border: bool,

    #[serde(default)]
    pub no_geraldo: bool,

    #[validate(range(min = 0, message = "Leftover cannot be negative"))]
    pub lcc_leftover: Option<i32>,

    #[validate(length(min = 1, message = "A completion needs at least one player"))]
    pub players: Vec<UserId>,

    #[validate(length(max = 5000))]
    pub subm_notes: Option<String>,
}

/// Request payload for changing a completion's judging metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateCompletionRequest {
    pub format: Option<FormatId>,

    pub black_border: Option<bool>,

    pub no_geraldo: Option<bool>,

    #[serde(default, skip_serializing_if = "FieldChange::is_keep")]
    #[schema(value_type = Option<i32>)]
    pub lcc_leftover: FieldChange<i32>,

    #[validate(length(min = 1, message = "A completion needs at least one player"))]
    pub players: Option<Vec<UserId>>,
}
