use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GrowthRange {
    Daily,
    #[default]
    Monthly,
    Yearly,
}

impl GrowthRange {
    pub fn bucket_count(&self) -> usize {
        match self {
            GrowthRange::Daily => 31,
            GrowthRange::Monthly => 12,
            GrowthRange::Yearly => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthBucket {
    pub label: String,
    pub bucket_end: DateTime<Utc>,
    pub users: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueByPlan {
    pub pro: f64,
    pub enterprise: f64,
    pub add_ons: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub total_users: usize,
    pub active_users: usize,
    pub cancelled_users: usize,
    /// Percentage with one decimal, e.g. "33.3".
    pub churn_rate: String,
    pub mrr: f64,
    pub range: GrowthRange,
    /// Breakdown and growth chart; leadership only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue_by_plan: Option<RevenueByPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_growth: Option<Vec<GrowthBucket>>,
}

impl AnalyticsReport {
    /// Keeps the stat-card metrics: totals, MRR and churn.
    pub fn headline_only(mut self) -> Self {
        self.revenue_by_plan = None;
        self.user_growth = None;
        self
    }
}
