//! Maps [`crate::error::EngineError`] to an HTTP status code and a JSON
//! error body for the reference server, the same family/status split the
//! teacher's REST error layer used for its own command surface.

use crate::error::{EngineError, HandleError, PlanError, RuntimeError, SchemaError, ValidationError};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// HTTP status code paired with the JSON body the server writes.
pub fn to_http(err: &EngineError) -> (u16, ErrorBody) {
    let (status, kind) = match err {
        EngineError::Schema(SchemaError::UnknownTable(_)) => (404, "unknown_table"),
        EngineError::Schema(SchemaError::UnknownColumn { .. }) => (404, "unknown_column"),
        EngineError::Schema(SchemaError::SchemaConflict(_)) => (409, "schema_conflict"),
        EngineError::Schema(SchemaError::InvalidPrimaryKey(_)) => (400, "invalid_primary_key"),
        EngineError::Validation(ValidationError::TypeMismatch { .. }) => (400, "type_mismatch"),
        EngineError::Validation(ValidationError::NotNullViolation { .. }) => (400, "not_null_violation"),
        EngineError::Validation(ValidationError::UniqueViolation { .. }) => (409, "unique_violation"),
        EngineError::Plan(PlanError::InvalidExpression(_)) => (400, "invalid_expression"),
        EngineError::Plan(PlanError::UnsupportedOperation(_)) => (400, "unsupported_operation"),
        EngineError::Plan(PlanError::NotIncrementalizable(_)) => (400, "not_incrementalizable"),
        EngineError::Runtime(RuntimeError::ArithmeticOverflow(_)) => (400, "arithmetic_overflow"),
        EngineError::Runtime(RuntimeError::ReentrantWrite) => (409, "reentrant_write"),
        EngineError::Handle(HandleError::UseAfterDispose) => (410, "handle_disposed"),
    };
    (
        status,
        ErrorBody {
            error: kind.to_string(),
            message: err.to_string(),
        },
    )
}
