//! # Database Layer
//!
//! Pool management and typed SQL function execution. All database work in the
//! pipeline goes through [`PoolManager`], so the pool's hard cap bounds total
//! concurrent load on the store.

pub mod pool;
pub mod sql_functions;

pub use pool::{PoolHealth, PoolManager};
pub use sql_functions::SqlFunctionExecutor;
