use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::ListField;

/// A requested change to one nullable field.
///
/// In JSON an absent key keeps the value, `null` clears it and any other
/// value sets it. Use `#[serde(default)]` on the containing field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldChange<T> {
    Keep,
    Clear,
    Set(T),
}

impl<T> Default for FieldChange<T> {
    fn default() -> Self {
        FieldChange::Keep
    }
}

impl<T> FieldChange<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, FieldChange::Keep)
    }

    /// Applies the change on top of a current value.
    pub fn apply(self, current: Option<T>) -> Option<T> {
        match self {
            FieldChange::Keep => current,
            FieldChange::Clear => None,
            FieldChange::Set(value) => Some(value),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for FieldChange<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => FieldChange::Set(value),
            None => FieldChange::Clear,
        })
    }
}

impl<T: Serialize> Serialize for FieldChange<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldChange::Set(value) => serializer.serialize_some(value),
            FieldChange::Keep | FieldChange::Clear => serializer.serialize_none(),
        }
    }
}

/// One list field of a map and what a request wants done to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldEdit {
    pub field: ListField,
    pub change: FieldChange<i32>,
}

/// Request payload for adding a new map to one or more lists
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateMapRequest {
    #[validate(length(min = 1, max = 10, message = "Code must be between 1 and 10 characters"))]
    pub code: String,

    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,

    #[validate(url)]
    pub preview_url: Option<String>,

    #[validate(length(max = 5000))]
    pub notes: Option<String>,

    pub placement_curver: Option<i32>,
    pub placement_allver: Option<i32>,
    pub difficulty: Option<i32>,
    pub botb_difficulty: Option<i32>,
    pub remake_of: Option<i32>,
}

impl CreateMapRequest {
    pub fn edits(&self) -> Vec<FieldEdit> {
        ListField::ALL
            .into_iter()
            .filter_map(|field| {
                let value = match field {
                    ListField::PlacementCurver => self.placement_curver,
                    ListField::PlacementAllver => self.placement_allver,
                    ListField::Difficulty => self.difficulty,
                    ListField::BotbDifficulty => self.botb_difficulty,
                    ListField::RemakeOf => self.remake_of,
                };
                value.map(|v| FieldEdit {
                    field,
                    change: FieldChange::Set(v),
                })
            })
            .collect()
    }
}

/// Request payload for changing a map's list membership
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateMapRequest {
    #[serde(default, skip_serializing_if = "FieldChange::is_keep")]
    #[schema(value_type = Option<i32>)]
    pub placement_curver: FieldChange<i32>,

    #[serde(default, skip_serializing_if = "FieldChange::is_keep")]
    #[schema(value_type = Option<i32>)]
    pub placement_allver: FieldChange<i32>,

    #[serde(default, skip_serializing_if = "FieldChange::is_keep")]
    #[schema(value_type = Option<i32>)]
    pub difficulty: FieldChange<i32>,

    #[serde(default, skip_serializing_if = "FieldChange::is_keep")]
    #[schema(value_type = Option<i32>)]
    pub botb_difficulty: FieldChange<i32>,

    #[serde(default, skip_serializing_if = "FieldChange::is_keep")]
    #[schema(value_type = Option<i32>)]
    pub remake_of: FieldChange<i32>,
}

impl UpdateMapRequest {
    pub fn edits(&self) -> Vec<FieldEdit> {
        ListField::ALL
            .into_iter()
            .map(|field| FieldEdit {
                field,
                change: match field {
                    ListField::PlacementCurver => self.placement_curver,
                    ListField::PlacementAllver => self.placement_allver,
                    ListField::Difficulty => self.difficulty,
                    ListField::BotbDifficulty => self.botb_difficulty,
                    ListField::RemakeOf => self.remake_of,
                },
            })
            .filter(|edit| !edit.change.is_keep())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(default)]
        value: FieldChange<i32>,
    }

    #[test]
    fn test_absent_null_and_value_are_distinct() {
        let absent: Probe = serde_json::from_str("{}").unwrap();
        let null: Probe = serde_json::from_str(r#"{"value": null}"#).unwrap();
        let set: Probe = serde_json::from_str(r#"{"value": 4}"#).unwrap();

        assert_eq!(absent.value, FieldChange::Keep);
        assert_eq!(null.value, FieldChange::Clear);
        assert_eq!(set.value, FieldChange::Set(4));
    }

    #[test]
    fn test_update_edits_skip_untouched_fields() {
        let request: UpdateMapRequest =
            serde_json::from_str(r#"{"placement_curver": 3, "remake_of": null}"#).unwrap();

        assert_eq!(
            request.edits(),
            vec![
                FieldEdit {
                    field: ListField::PlacementCurver,
                    change: FieldChange::Set(3)
                },
                FieldEdit {
                    field: ListField::RemakeOf,
                    change: FieldChange::Clear
                },
            ]
        );
    }

    #[test]
    fn test_apply() {
        assert_eq!(FieldChange::Keep.apply(Some(2)), Some(2));
        assert_eq!(FieldChange::<i32>::Clear.apply(Some(2)), None);
        assert_eq!(FieldChange::Set(5).apply(None), Some(5));
    }
}
