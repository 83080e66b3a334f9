//! # Tenant Model
//!
//! Identity unit of the business. Tenants are created by provisioning and are
//! read-only to this pipeline: we list the active ones, compute metrics for
//! them, and read their subscription tier for the MRR fallback path.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Tenant lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Inactive,
    Suspended,
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TenantStatus::Active => "active",
            TenantStatus::Inactive => "inactive",
            TenantStatus::Suspended => "suspended",
        };
        f.write_str(s)
    }
}

impl FromStr for TenantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TenantStatus::Active),
            "inactive" => Ok(TenantStatus::Inactive),
            "suspended" => Ok(TenantStatus::Suspended),
            other => Err(format!("unknown tenant status: {other}")),
        }
    }
}

/// Subscription plan. Each plan maps to a fixed monthly price used by the
/// platform MRR fallback when no platform_cost metric rows exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Free,
    Basico,
    Profissional,
    Enterprise,
    /// Plans outside the closed set price at zero rather than failing
    #[serde(untagged)]
    Other(String),
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Basico => "basico",
            SubscriptionTier::Profissional => "profissional",
            SubscriptionTier::Enterprise => "enterprise",
            SubscriptionTier::Other(name) => name,
        }
    }

    /// Monthly price from the configured plan price table; unknown plans
    /// contribute zero to the fallback MRR
    pub fn monthly_price(&self, plan_prices: &HashMap<String, f64>) -> f64 {
        plan_prices.get(self.as_str()).copied().unwrap_or(0.0)
    }
}

impl From<&str> for SubscriptionTier {
    fn from(s: &str) -> Self {
        match s {
            "free" => SubscriptionTier::Free,
            "basico" => SubscriptionTier::Basico,
            "profissional" => SubscriptionTier::Profissional,
            "enterprise" => SubscriptionTier::Enterprise,
            other => SubscriptionTier::Other(other.to_string()),
        }
    }
}

/// One customer organization on the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub business_name: String,
    pub status: TenantStatus,
    pub subscription_tier: SubscriptionTier,
}

/// Raw tenant row as stored; converted into [`Tenant`] with tolerant
/// status/plan parsing
#[derive(Debug, Clone, FromRow)]
pub struct TenantRow {
    pub id: Uuid,
    pub business_name: String,
    pub status: String,
    pub subscription_plan: Option<String>,
}

impl From<TenantRow> for Tenant {
    fn from(row: TenantRow) -> Self {
        let status = row.status.parse().unwrap_or(TenantStatus::Inactive);
        let tier = row
            .subscription_plan
            .as_deref()
            .map(SubscriptionTier::from)
            .unwrap_or(SubscriptionTier::Free);
        Tenant {
            id: row.id,
            business_name: row.business_name,
            status,
            subscription_tier: tier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AggregationConfig;

    #[test]
    fn test_tier_prices_from_default_table() {
        let prices = AggregationConfig::default().plan_prices;
        assert_eq!(SubscriptionTier::Basico.monthly_price(&prices), 58.00);
        assert_eq!(SubscriptionTier::Profissional.monthly_price(&prices), 116.00);
        assert_eq!(SubscriptionTier::Free.monthly_price(&prices), 0.0);
        assert_eq!(
            SubscriptionTier::Other("legacy".to_string()).monthly_price(&prices),
            0.0
        );
    }

    #[test]
    fn test_row_conversion_tolerates_unknown_status() {
        let row = TenantRow {
            id: Uuid::new_v4(),
            business_name: "Salon A".to_string(),
            status: "weird".to_string(),
            subscription_plan: None,
        };
        let tenant = Tenant::from(row);
        assert_eq!(tenant.status, TenantStatus::Inactive);
        assert_eq!(tenant.subscription_tier, SubscriptionTier::Free);
    }
}
