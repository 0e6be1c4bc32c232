//! Custom field definitions and values.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ValidationError;

/// Shape of a user-defined field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    SingleSelect { options: Vec<String> },
    MultiSelect { options: Vec<String> },
}

impl FieldKind {
    fn name(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::SingleSelect { .. } => "single-select",
            FieldKind::MultiSelect { .. } => "multi-select",
        }
    }
}

/// A user-defined field attached to client records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldDefinition {
    pub id: String,
    pub label: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
}

/// Value stored for a custom field.
///
/// `Other` carries values whose shape is not one of the known kinds so they
/// survive a round trip untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CustomFieldValue {
    Text(String),
    SingleSelect(String),
    MultiSelect(Vec<String>),
    Other(Value),
}

impl CustomFieldValue {
    /// Checks the value on its own, without a definition.
    pub fn validate_shape(&self, field: &str) -> Result<(), ValidationError> {
        match self {
            CustomFieldValue::SingleSelect(option) if option.trim().is_empty() => Err(
                ValidationError::invalid(field, "selected option must not be empty"),
            ),
            CustomFieldValue::MultiSelect(options) => {
                let mut seen = HashSet::new();
                for option in options {
                    if option.trim().is_empty() {
                        return Err(ValidationError::invalid(
                            field,
                            "selected options must not be empty",
                        ));
                    }
                    if !seen.insert(option.as_str()) {
                        return Err(ValidationError::invalid(
                            field,
                            format!("option '{}' selected twice", option),
                        ));
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl CustomFieldDefinition {
    /// Checks that `value` fits this definition.
    pub fn validate(&self, value: &CustomFieldValue) -> Result<(), ValidationError> {
        value.validate_shape(&self.id)?;
        match (&self.kind, value) {
            (FieldKind::Text, CustomFieldValue::Text(_)) => Ok(()),
            (FieldKind::SingleSelect { options }, CustomFieldValue::SingleSelect(selected)) => {
                self.check_option(options, selected)
            }
            (FieldKind::MultiSelect { options }, CustomFieldValue::MultiSelect(selected)) => {
                selected
                    .iter()
                    .try_for_each(|option| self.check_option(options, option))
            }
            (kind, _) => Err(ValidationError::KindMismatch {
                field: self.id.clone(),
                expected: kind.name().to_string(),
            }),
        }
    }

    fn check_option(&self, options: &[String], selected: &str) -> Result<(), ValidationError> {
        if options.iter().any(|o| o == selected) {
            Ok(())
        } else {
            Err(ValidationError::UnknownOption {
                field: self.id.clone(),
                option: selected.to_string(),
            })
        }
    }
}

/// Validates a record's custom values against the known definitions.
///
/// Values without a definition are kept as-is; required definitions must be
/// present.
pub fn validate_custom_fields(
    values: &BTreeMap<String, CustomFieldValue>,
    definitions: &[CustomFieldDefinition],
) -> Result<(), ValidationError> {
    for definition in definitions {
        match values.get(&definition.id) {
            Some(value) => definition.validate(value)?,
            None if definition.required => {
                return Err(ValidationError::MissingField(definition.id.clone()))
            }
            None => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stage_field() -> CustomFieldDefinition {
        CustomFieldDefinition {
            id: "stage".to_string(),
            label: "Pipeline stage".to_string(),
            kind: FieldKind::SingleSelect {
                options: vec!["new".to_string(), "qualified".to_string()],
            },
            required: true,
        }
    }

    fn tags_field() -> CustomFieldDefinition {
        CustomFieldDefinition {
            id: "tags".to_string(),
            label: "Tags".to_string(),
            kind: FieldKind::MultiSelect {
                options: vec!["vip".to_string(), "newsletter".to_string()],
            },
            required: false,
        }
    }

    #[test]
    fn test_value_serialization_is_tagged() {
        let value = CustomFieldValue::MultiSelect(vec!["vip".to_string()]);
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            json!({ "kind": "multi_select", "value": ["vip"] })
        );

        let other: CustomFieldValue =
            serde_json::from_value(json!({ "kind": "other", "value": { "x": 1 } })).unwrap();
        assert_eq!(other, CustomFieldValue::Other(json!({ "x": 1 })));
    }

    #[test]
    fn test_definition_accepts_known_option() {
        let value = CustomFieldValue::SingleSelect("qualified".to_string());
        assert!(stage_field().validate(&value).is_ok());
    }

    #[test]
    fn test_definition_rejects_unknown_option() {
        let value = CustomFieldValue::MultiSelect(vec!["vip".to_string(), "gold".to_string()]);
        assert_eq!(
            tags_field().validate(&value),
            Err(ValidationError::UnknownOption {
                field: "tags".to_string(),
                option: "gold".to_string(),
            })
        );
    }

    #[test]
    fn test_definition_rejects_kind_mismatch() {
        let value = CustomFieldValue::Text("qualified".to_string());
        assert!(matches!(
            stage_field().validate(&value),
            Err(ValidationError::KindMismatch { .. })
        ));
    }

    #[test]
    fn test_multi_select_rejects_duplicates() {
        let value = CustomFieldValue::MultiSelect(vec!["vip".to_string(), "vip".to_string()]);
        assert!(value.validate_shape("tags").is_err());
    }

    #[test]
    fn test_required_field_must_be_present() {
        let values = BTreeMap::new();
        assert_eq!(
            validate_custom_fields(&values, &[stage_field(), tags_field()]),
            Err(ValidationError::MissingField("stage".to_string()))
        );

        let mut values = BTreeMap::new();
        values.insert(
            "stage".to_string(),
            CustomFieldValue::SingleSelect("new".to_string()),
        );
        values.insert("legacy".to_string(), CustomFieldValue::Other(json!(3)));
        assert!(validate_custom_fields(&values, &[stage_field(), tags_field()]).is_ok());
    }
}
