//! Summary row returned by the bulk metrics computation routine.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// What the stored routine reports after one bulk pass. A single call covers
/// every enumerated period for the requested tenant set.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct BulkComputationSummary {
    pub success: bool,
    pub processed_tenants: i64,
    pub periods_processed: i64,
    pub metrics_created: i64,
    pub execution_time_ms: i64,
}

impl BulkComputationSummary {
    /// Expected row count when every processed tenant produced one row per
    /// period. Used by the calculator to sanity-check the summary.
    pub fn expected_metrics(&self) -> i64 {
        self.processed_tenants * self.periods_processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_metrics() {
        let summary = BulkComputationSummary {
            success: true,
            processed_tenants: 40,
            periods_processed: 3,
            metrics_created: 120,
            execution_time_ms: 950,
        };
        assert_eq!(summary.expected_metrics(), 120);
    }
}
