//! Custom fields module - user-defined client attributes.

mod custom_fields_model;

pub use custom_fields_model::{
    validate_custom_fields, CustomFieldDefinition, CustomFieldValue, FieldKind,
};
