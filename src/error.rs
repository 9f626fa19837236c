//! Error taxonomy for the engine.
//!
//! Split by family, mirroring the storage/protocol error split the rest of
//! this codebase grew up with, then folded into a single [`EngineError`]
//! at the command boundary so host call sites only need to match one type.

use thiserror::Error;

/// Schema and catalog errors: table/column/index resolution.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaError {
    #[error("table already exists: {0}")]
    SchemaConflict(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("unknown column '{column}' on table '{table}'")]
    UnknownColumn { table: String, column: String },
    #[error("invalid primary key: {0}")]
    InvalidPrimaryKey(String),
}

/// Row/value validation errors raised during `insert`/`update`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("type mismatch on column '{column}': expected {expected}, got {got}")]
    TypeMismatch {
        column: String,
        expected: String,
        got: String,
    },
    #[error("null value not allowed in column '{column}'")]
    NotNullViolation { column: String },
    #[error("unique constraint violated on index '{index}' for value {value}")]
    UniqueViolation { index: String, value: String },
}

/// Errors raised while building or compiling a plan.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlanError {
    #[error("invalid expression: {0}")]
    InvalidExpression(String),
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("plan cannot be incrementalized: {0}")]
    NotIncrementalizable(String),
}

/// Errors raised while a query or write batch is running.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuntimeError {
    #[error("arithmetic overflow computing {0}")]
    ArithmeticOverflow(String),
    #[error("write rejected: a subscriber callback attempted a re-entrant write")]
    ReentrantWrite,
}

/// Errors raised by operations on a disposed handle.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HandleError {
    #[error("handle used after dispose")]
    UseAfterDispose,
}

/// Top-level error type returned at the command boundary (§6.2/§7).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Handle(#[from] HandleError),
}

pub type EngineResult<T> = Result<T, EngineError>;
