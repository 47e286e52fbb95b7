//! SaaS metrics over a startup's `users` snapshot. Everything here except
//! [`AnalyticsService`] is a pure function of its inputs.

use std::sync::Arc;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use uuid::Uuid;

use crate::domain::models::{
    analytics::{AnalyticsReport, GrowthBucket, GrowthRange, RevenueByPlan},
    document::{Collection, Query, Snapshot},
    user::{Actor, Plan, Role, UserProfile},
};
use crate::domain::services::document_service::{DocumentService, Subscription};
use crate::error::AppError;

pub fn compute_report(users: &[UserProfile], range: GrowthRange, now: DateTime<Utc>) -> AnalyticsReport {
    let total_users = users.len();
    let active: Vec<&UserProfile> = users.iter().filter(|u| u.is_active()).collect();
    let cancelled_users = users.iter().filter(|u| u.is_cancelled()).count();

    let churn = if total_users == 0 {
        0.0
    } else {
        cancelled_users as f64 / total_users as f64 * 100.0
    };

    let plan_revenue = |plan: Plan| -> f64 {
        active.iter().filter(|u| u.plan == Some(plan)).map(|u| u.price.unwrap_or(0.0)).sum()
    };
    let add_ons: f64 = active.iter().map(|u| u.add_on_total()).sum();
    let mrr: f64 = active.iter().map(|u| u.price.unwrap_or(0.0) + u.add_on_total()).sum();

    AnalyticsReport {
        total_users,
        active_users: active.len(),
        cancelled_users,
        churn_rate: format!("{:.1}", churn),
        mrr,
        range,
        revenue_by_plan: Some(RevenueByPlan {
            pro: plan_revenue(Plan::Pro),
            enterprise: plan_revenue(Plan::Enterprise),
            add_ons,
        }),
        user_growth: Some(user_growth(users, range, now)),
    }
}

/// Founders and Co-Founders get the full report, other members the headline metrics.
pub fn report_for_role(report: AnalyticsReport, role: Role) -> AnalyticsReport {
    if role.is_leadership() {
        report
    } else {
        report.headline_only()
    }
}

fn month_start(year: i32, month0: i32) -> Option<NaiveDate> {
    let total = year * 12 + month0;
    NaiveDate::from_ymd_opt(total.div_euclid(12), (total.rem_euclid(12) + 1) as u32, 1)
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Cumulative user counts, oldest bucket first, the last bucket containing `now`.
pub fn user_growth(users: &[UserProfile], range: GrowthRange, now: DateTime<Utc>) -> Vec<GrowthBucket> {
    let today = now.date_naive();
    let count = range.bucket_count() as i32;

    // (label, exclusive end of bucket)
    let windows: Vec<(String, NaiveDate)> = (0..count)
        .rev()
        .filter_map(|back| match range {
            GrowthRange::Daily => {
                let day = today - Duration::days(back as i64);
                Some((day.format("%Y-%m-%d").to_string(), day + Duration::days(1)))
            }
            GrowthRange::Monthly => {
                let start = month_start(today.year(), today.month0() as i32 - back)?;
                let next = month_start(start.year(), start.month0() as i32 + 1)?;
                Some((start.format("%b %Y").to_string(), next))
            }
            GrowthRange::Yearly => {
                let year = today.year() - back;
                Some((year.to_string(), NaiveDate::from_ymd_opt(year + 1, 1, 1)?))
            }
        })
        .collect();

    windows
        .into_iter()
        .map(|(label, next)| {
            let end = midnight(next);
            GrowthBucket {
                label,
                bucket_end: end - Duration::microseconds(1),
                users: users.iter().filter(|u| u.created_at < end).count(),
            }
        })
        .collect()
}

/// Metrics of the caller's startup, shaped by the caller's role.
pub struct AnalyticsService {
    documents: Arc<DocumentService>,
}

impl AnalyticsService {
    pub fn new(documents: Arc<DocumentService>) -> Self {
        Self { documents }
    }

    fn users_query(actor: &Actor) -> Result<Query, AppError> {
        let principal = actor.principal().ok_or(AppError::Unauthenticated)?;
        Ok(Query::new(Collection::Users).where_eq("startupId", principal.startup_id.as_str()))
    }

    pub async fn report(&self, actor: &Actor, range: GrowthRange) -> Result<AnalyticsReport, AppError> {
        let role = actor.principal().ok_or(AppError::Unauthenticated)?.role;
        let query = Self::users_query(actor)?;
        let users: Vec<UserProfile> = self.documents
            .query(actor, query)
            .await?
            .iter()
            .map(|d| d.decode())
            .collect::<Result<_, _>>()?;
        Ok(report_for_role(compute_report(&users, range, Utc::now()), role))
    }

    /// Live users snapshots; recompute with [`report_from_snapshot`].
    pub async fn subscribe(&self, actor: &Actor, session_id: Option<Uuid>) -> Result<Subscription, AppError> {
        let query = Self::users_query(actor)?;
        self.documents.subscribe(actor.clone(), session_id, query, None).await
    }
}

pub fn report_from_snapshot(snapshot: &Snapshot, range: GrowthRange, now: DateTime<Utc>) -> Result<AnalyticsReport, AppError> {
    let users: Vec<UserProfile> = snapshot.decode_all()?;
    Ok(compute_report(&users, range, now))
}
