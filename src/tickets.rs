//! Ticket list, detail and lifecycle

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::QueryKey;
use crate::error::{Error, Result};
use crate::models::{
    Employee, NewTicket, Ticket, TicketDetail, TicketPriority, TicketStatus, TicketSummary,
    TicketUpdate, UserProfile,
};
use crate::Crm;

const TABLE: &str = "tickets";

const LIST_COLUMNS: &str = "id, created_at, title, status, priority,
    customer:customers!customer_id(name,email),
    assigned_to:employees!assigned_to(full_name)";

const DETAIL_COLUMNS: &str = "id, created_at, title, description, status, priority,
    resolved_at, resolution_notes,
    customer:customers!customer_id(id,name,email,company_name,phone),
    assigned_to:employees!assigned_to(id,full_name),
    created_by:employees!created_by(id,full_name)";

/// Filters and page of the ticket list
#[derive(Debug, Clone, PartialEq)]
pub struct TicketQuery {
    /// Zero based page index
    pub page: u64,
    pub rows_per_page: u64,
    /// Case-insensitive substring of the title
    pub search: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
}

impl Default for TicketQuery {
    fn default() -> Self {
        Self {
            page: 0,
            rows_per_page: 10,
            search: None,
            status: None,
            priority: None,
        }
    }
}

impl TicketQuery {
    fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    fn cache_key(&self) -> QueryKey {
        QueryKey::new("tickets")
            .with(self.page)
            .with(self.rows_per_page)
            .with(self.search_term().unwrap_or_default())
            .with(self.status.map(|s| s.as_str()).unwrap_or("all"))
            .with(self.priority.map(|p| p.as_str()).unwrap_or("all"))
    }
}

/// One page of the ticket list and the number of matching tickets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketPage {
    pub tickets: Vec<TicketSummary>,
    pub total_count: u64,
}

#[derive(Serialize)]
struct TicketInsert<'t> {
    #[serde(flatten)]
    ticket: &'t NewTicket,
    status: TicketStatus,
}

pub struct Tickets<'a> {
    crm: &'a Crm,
}

impl<'a> Tickets<'a> {
    pub(crate) fn new(crm: &'a Crm) -> Self {
        Self { crm }
    }

    /// Newest tickets first, filtered and paged on the server
    pub async fn list(&self, params: &TicketQuery) -> Result<TicketPage> {
        if params.rows_per_page == 0 {
            return Err(Error::validation("rows per page must be positive"));
        }
        let from = params
            .page
            .checked_mul(params.rows_per_page)
            .ok_or_else(|| Error::validation("page is out of range"))?;
        let to = from
            .checked_add(params.rows_per_page - 1)
            .ok_or_else(|| Error::validation("page is out of range"))?;

        self.crm
            .cache()
            .get_or_fetch(params.cache_key(), || async {
                let mut query = self.crm.from(TABLE).select(LIST_COLUMNS);
                if let Some(term) = params.search_term() {
                    query = query.ilike("title", &format!("%{}%", term));
                }
                if let Some(status) = params.status {
                    query = query.eq("status", status);
                }
                if let Some(priority) = params.priority {
                    query = query.eq("priority", priority);
                }

                let page = query
                    .order("created_at", false)
                    .range(from, to)
                    .execute_with_count::<TicketSummary>()
                    .await?;
                debug!(page = params.page, total = page.total, "tickets listed");

                Ok(TicketPage {
                    tickets: page.rows,
                    total_count: page.total,
                })
            })
            .await
    }

    pub async fn get(&self, id: &str) -> Result<TicketDetail> {
        self.crm
            .cache()
            .get_or_fetch(QueryKey::new("ticket").with(id), || async {
                self.crm
                    .from(TABLE)
                    .select(DETAIL_COLUMNS)
                    .eq("id", id)
                    .single()
                    .await
            })
            .await
    }

    /// Open a new ticket. The status is always `open`.
    pub async fn create(&self, ticket: &NewTicket) -> Result<Ticket> {
        if ticket.title.trim().is_empty() {
            return Err(Error::validation("ticket title is required"));
        }
        if ticket.description.trim().is_empty() {
            return Err(Error::validation("ticket description is required"));
        }
        if ticket.customer_id.trim().is_empty() {
            return Err(Error::validation("ticket customer is required"));
        }

        let payload = TicketInsert {
            ticket,
            status: TicketStatus::Open,
        };
        let created = self
            .crm
            .from(TABLE)
            .insert_returning::<_, Ticket>(&payload)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found("inserted ticket was not returned"))?;
        info!(ticket_id = %created.id, "ticket opened");
        self.invalidate().await;
        Ok(created)
    }

    /// Open a ticket authored by the signed-in agent
    pub async fn create_as_current_user(&self, ticket: &NewTicket) -> Result<Ticket> {
        let session = self.crm.auth().get_session().ok_or(Error::MissingSession)?;
        let user_id = session.user_id().ok_or(Error::MissingSession)?;

        let employee = self
            .crm
            .from("employees")
            .select("*")
            .eq("id", user_id)
            .maybe_single::<Employee>()
            .await?
            .ok_or_else(|| Error::not_found("Employee record not found"))?;

        let ticket = NewTicket {
            created_by: Some(employee.id),
            ..ticket.clone()
        };
        self.create(&ticket).await
    }

    /// Move a ticket through its lifecycle
    pub async fn update_status(&self, id: &str, status: TicketStatus) -> Result<()> {
        self.update(
            id,
            &TicketUpdate {
                status: Some(status),
                ..Default::default()
            },
        )
        .await
    }

    /// Hand a ticket to an agent, or clear the assignee with `None`
    pub async fn assign(&self, id: &str, assignee: Option<&str>) -> Result<()> {
        self.update(
            id,
            &TicketUpdate {
                assigned_to: Some(assignee.map(str::to_string)),
                ..Default::default()
            },
        )
        .await
    }

    /// Apply a partial edit. Resolving a ticket stamps `resolved_at` unless
    /// the edit carries one.
    pub async fn update(&self, id: &str, changes: &TicketUpdate) -> Result<()> {
        if changes.is_empty() {
            return Err(Error::validation("nothing to update"));
        }

        let mut changes = changes.clone();
        if changes.status == Some(TicketStatus::Resolved) && changes.resolved_at.is_none() {
            changes.resolved_at = Some(Some(Utc::now()));
        }

        self.crm.from(TABLE).eq("id", id).update(&changes).await?;
        self.invalidate().await;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.crm.from(TABLE).eq("id", id).delete().await?;
        self.invalidate().await;
        Ok(())
    }

    /// People a ticket can be assigned to
    pub async fn assignable_users(&self) -> Result<Vec<UserProfile>> {
        self.crm
            .cache()
            .get_or_fetch(QueryKey::new("users").with("assignable"), || async {
                self.crm
                    .from("users")
                    .select("id, full_name")
                    .order("full_name", true)
                    .execute()
                    .await
            })
            .await
    }

    async fn invalidate(&self) {
        let cache = self.crm.cache();
        cache.invalidate(&QueryKey::new("tickets")).await;
        cache.invalidate(&QueryKey::new("ticket")).await;
        cache.invalidate(&QueryKey::new("dashboard")).await;
    }
}
