//! Field-level validation failures shared by the JSON endpoints.

use std::collections::BTreeMap;

use axum::extract::rejection::JsonRejection;
use serde::Serialize;
use validator::{ValidationError, ValidationErrors};

/// Messages keyed by the offending field, rendered as `{"fields": {...}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("invalid input ({})", .fields.keys().cloned().collect::<Vec<_>>().join(", "))]
pub struct ValidationFailure {
    pub fields: BTreeMap<String, Vec<String>>,
}

impl ValidationFailure {
    pub fn field(name: impl Into<String>, message: impl Into<String>) -> Self {
        let mut failure = Self::default();
        failure.add(name, message);
        failure
    }

    pub fn add(&mut self, name: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(name.into())
            .or_default()
            .push(message.into());
    }

    /// Fold errors from a nested value under `prefix`, e.g. `choices[1].choice_text`.
    pub fn merge_nested(&mut self, prefix: &str, errors: ValidationErrors) {
        for (field, messages) in ValidationFailure::from(errors).fields {
            for message in messages {
                self.add(format!("{prefix}.{field}"), message);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<ValidationErrors> for ValidationFailure {
    fn from(errors: ValidationErrors) -> Self {
        let mut failure = Self::default();
        for (field, errors) in errors.field_errors() {
            for error in errors.iter() {
                failure.add(field, message_for(error));
            }
        }
        failure
    }
}

impl From<JsonRejection> for ValidationFailure {
    fn from(rejection: JsonRejection) -> Self {
        Self::field("body", rejection.body_text())
    }
}

fn message_for(error: &ValidationError) -> String {
    match &error.message {
        Some(message) => message.to_string(),
        None => format!("failed '{}' check", error.code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 1, message = "This field may not be blank."))]
        name: String,
        #[validate(range(max = 3))]
        count: u8,
    }

    #[test]
    fn collects_messages_per_field() {
        let sample = Sample {
            name: String::new(),
            count: 9,
        };
        let failure = ValidationFailure::from(sample.validate().expect_err("invalid sample"));

        assert_eq!(
            failure.fields.get("name"),
            Some(&vec!["This field may not be blank.".to_string()])
        );
        assert_eq!(
            failure.fields.get("count"),
            Some(&vec!["failed 'range' check".to_string()])
        );
        assert_eq!(failure.to_string(), "invalid input (count, name)");
    }

    #[test]
    fn nested_errors_are_prefixed() {
        let sample = Sample {
            name: String::new(),
            count: 1,
        };
        let mut failure = ValidationFailure::default();
        failure.merge_nested("items[2]", sample.validate().expect_err("invalid sample"));

        assert!(failure.fields.contains_key("items[2].name"));
        assert!(failure.clone().into_result().is_err());
        assert!(ValidationFailure::default().into_result().is_ok());
    }
}
