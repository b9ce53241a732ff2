//! Ticket metrics over a trailing window of days

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::cache::QueryKey;
use crate::error::{Error, Result};
use crate::models::{DashboardStats, PriorityCount, StatusCount, TicketStatus};
use crate::Crm;

const TABLE: &str = "tickets";

#[derive(Debug, Deserialize)]
struct Resolution {
    created_at: DateTime<Utc>,
    resolved_at: DateTime<Utc>,
}

/// First day of a window ending today, `yyyy-mm-dd`. Fails when the
/// window reaches past the earliest representable date.
pub fn start_date(today: NaiveDate, days: u32) -> Result<String> {
    today
        .checked_sub_signed(Duration::days(i64::from(days)))
        .map(|start| start.format("%Y-%m-%d").to_string())
        .ok_or_else(|| Error::validation(format!("window of {} days is out of range", days)))
}

fn resolution_rate(total: u64, resolved: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        resolved as f64 / total as f64 * 100.0
    }
}

fn average_hours(resolutions: &[Resolution]) -> f64 {
    if resolutions.is_empty() {
        return 0.0;
    }
    let total_seconds: i64 = resolutions
        .iter()
        .map(|r| (r.resolved_at - r.created_at).num_seconds())
        .sum();
    total_seconds as f64 / resolutions.len() as f64 / 3600.0
}

pub struct Dashboard<'a> {
    crm: &'a Crm,
}

impl<'a> Dashboard<'a> {
    pub(crate) fn new(crm: &'a Crm) -> Self {
        Self { crm }
    }

    fn since(&self, days: u32) -> Result<String> {
        start_date(Utc::now().date_naive(), days)
    }

    /// Totals, resolution rate and mean time to resolve for tickets created
    /// in the last `days` days
    pub async fn stats(&self, days: u32) -> Result<DashboardStats> {
        let start = self.since(days)?;
        let key = QueryKey::new("dashboard").with("stats").with(&start);

        self.crm
            .cache()
            .get_or_fetch(key, || async {
                let total = self.crm.from(TABLE).gte("created_at", &start);
                let open = self
                    .crm
                    .from(TABLE)
                    .in_list("status", TicketStatus::UNRESOLVED)
                    .gte("created_at", &start);
                let resolved = self
                    .crm
                    .from(TABLE)
                    .eq("status", TicketStatus::Resolved)
                    .gte("created_at", &start);
                let resolutions = self
                    .crm
                    .from(TABLE)
                    .select("created_at, resolved_at")
                    .not_null("resolved_at")
                    .gte("created_at", &start);

                let (total_tickets, open_tickets, resolved_tickets, resolutions) = tokio::try_join!(
                    total.count(),
                    open.count(),
                    resolved.count(),
                    resolutions.execute::<Resolution>()
                )?;
                debug!(%start, total_tickets, resolved = resolutions.len(), "dashboard stats");

                Ok(DashboardStats {
                    total_tickets,
                    open_tickets,
                    resolved_tickets,
                    resolution_rate: resolution_rate(total_tickets, resolved_tickets),
                    avg_response_hours: average_hours(&resolutions),
                })
            })
            .await
    }

    pub async fn tickets_by_priority(&self, days: u32) -> Result<Vec<PriorityCount>> {
        let start = self.since(days)?;
        self.crm
            .cache()
            .get_or_fetch(QueryKey::new("dashboard").with("priority").with(&start), || async {
                self.crm
                    .postgrest()
                    .rpc_rows("get_tickets_by_priority", &json!({ "start_date": start }))
                    .await
            })
            .await
    }

    pub async fn tickets_by_status(&self, days: u32) -> Result<Vec<StatusCount>> {
        let start = self.since(days)?;
        self.crm
            .cache()
            .get_or_fetch(QueryKey::new("dashboard").with("status").with(&start), || async {
                self.crm
                    .postgrest()
                    .rpc_rows("get_tickets_by_status", &json!({ "start_date": start }))
                    .await
            })
            .await
    }
}
