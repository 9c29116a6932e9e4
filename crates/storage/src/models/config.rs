use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::error::{Result, StorageError};

/// A row of the `config` table as stored: the value is text, `type` says how
/// to read it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ConfigEntry {
    pub name: String,
    pub value: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub value_type: String,
    pub description: Option<String>,
}

impl ConfigEntry {
    pub fn typed(&self) -> Result<ConfigValue> {
        let invalid = || {
            StorageError::InvalidConfig(format!(
                "{} is not a valid {} ({:?})",
                self.name, self.value_type, self.value
            ))
        };

        match self.value_type.as_str() {
            "int" => self
                .value
                .trim()
                .parse()
                .map(ConfigValue::Int)
                .map_err(|_| invalid()),
            "float" => self
                .value
                .trim()
                .parse()
                .map(ConfigValue::Float)
                .map_err(|_| invalid()),
            "string" => Ok(ConfigValue::Str(self.value.clone())),
            other => Err(StorageError::InvalidConfig(format!(
                "{} has unknown type {}",
                self.name, other
            ))),
        }
    }
}

/// A typed configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum ConfigValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl ConfigValue {
    pub fn as_i64(&self, name: &str) -> Result<i64> {
        match self {
            Self::Int(v) => Ok(*v),
            _ => Err(StorageError::InvalidConfig(format!("{name} must be an int"))),
        }
    }

    pub fn as_f64(&self, name: &str) -> Result<f64> {
        match self {
            Self::Int(v) => Ok(*v as f64),
            Self::Float(v) => Ok(*v),
            Self::Str(_) => Err(StorageError::InvalidConfig(format!(
                "{name} must be a number"
            ))),
        }
    }

    pub fn as_decimal(&self, name: &str) -> Result<Decimal> {
        match self {
            Self::Int(v) => Ok(Decimal::from(*v)),
            Self::Float(v) => Decimal::from_f64(*v).ok_or_else(|| {
                StorageError::InvalidConfig(format!("{name} is out of range"))
            }),
            Self::Str(_) => Err(StorageError::InvalidConfig(format!(
                "{name} must be a number"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(value: &str, value_type: &str) -> ConfigEntry {
        ConfigEntry {
            name: "points_multi_bb".to_string(),
            value: value.to_string(),
            value_type: value_type.to_string(),
            description: None,
        }
    }

    #[test]
    fn test_typed_parses_by_declared_type() {
        assert_eq!(entry("50", "int").typed().unwrap(), ConfigValue::Int(50));
        assert_eq!(entry("1.5", "float").typed().unwrap(), ConfigValue::Float(1.5));
        assert_eq!(
            entry("hello", "string").typed().unwrap(),
            ConfigValue::Str("hello".to_string())
        );
    }

    #[test]
    fn test_mistyped_value_is_invalid_config() {
        assert!(matches!(
            entry("abc", "int").typed(),
            Err(StorageError::InvalidConfig(_))
        ));
        assert!(matches!(
            entry("1", "bool").typed(),
            Err(StorageError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_int_widens_to_decimal() {
        let value = ConfigValue::Int(3);
        assert_eq!(value.as_decimal("x").unwrap(), Decimal::from(3));
        assert!(ConfigValue::Str("3".into()).as_decimal("x").is_err());
        assert!(ConfigValue::Float(2.0).as_i64("x").is_err());
    }
}
