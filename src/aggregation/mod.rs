//! # Platform Aggregation
//!
//! Rolls fresh per-tenant metric rows up into one platform record per period,
//! and audits the persisted rollups for drift.

pub mod engine;
pub mod validator;

pub use engine::{
    aggregate_rows, select_calculation_method, AggregationRunReport, PlatformAggregationEngine,
};
pub use validator::{
    diff_records, relative_delta, ConsistencyReport, ConsistencyValidator, Discrepancy,
    RELATIVE_TOLERANCE,
};
