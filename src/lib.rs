//! An embeddable, in-memory, reactive relational database engine.
//!
//! ```text
//! Fluent query builder ──▶ Logical plan ──▶ Optimizer ──▶ Pull-based executor ──▶ Rows
//!                                │                              │
//!                                ▼                              ▼
//!                          IVM dataflow graph           Re-execution observer
//! ```
//!
//! - [`schema`] — typed table/column/index declarations and the catalog.
//! - [`value`] — the scalar `Value`/`DataType` domain and three-valued logic.
//! - [`storage`] — in-memory row store plus secondary/ordered/GIN indexes.
//! - [`expr`] — scalar expression tree and its evaluator.
//! - [`plan`] — logical query plan and the fluent [`plan::PlanBuilder`].
//! - [`optimizer`] — fixpoint rewrite rules, including access-path selection.
//! - [`executor`] — pull-based physical operators.
//! - [`codec`] — the binary result buffer wire format.
//! - [`observer`] — naive re-execution live queries.
//! - [`ivm`] — incremental view maintenance over a restricted operator set.
//! - [`changelog`] — per-write table deltas shared by `observer` and `ivm`.
//! - [`engine`] — the top-level host call surface ([`engine::Engine`]).
//! - [`config`] — `figment`-backed configuration for embedding hosts.
//! - [`protocol`] / [`auth`] — wire types and auth for the reference server.

pub mod auth;
pub mod changelog;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod expr;
pub mod ivm;
pub mod observer;
pub mod optimizer;
pub mod plan;
pub mod protocol;
pub mod schema;
pub mod storage;
pub mod value;

pub use engine::{Assignment, BenchmarkResult, Engine, ExplainOutput};
pub use error::EngineError;
pub use plan::{Plan, PlanBuilder};
pub use schema::{Catalog, ColumnDef, IndexDef, TableSchema};
pub use value::{DataType, Value};
