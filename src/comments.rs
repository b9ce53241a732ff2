//! Ticket conversation threads

use serde_json::json;

use crate::cache::QueryKey;
use crate::error::{Error, Result};
use crate::models::{NewComment, TicketComment};
use crate::Crm;

const TABLE: &str = "ticket_comments";

const COLUMNS: &str = "id, created_at, ticket_id, user_id, comment, is_internal,
    user:users!user_id(full_name)";

fn thread_key(ticket_id: &str) -> QueryKey {
    QueryKey::new("ticketComments").with(ticket_id)
}

fn require_text(comment: &str) -> Result<()> {
    if comment.trim().is_empty() {
        Err(Error::validation("comment cannot be empty"))
    } else {
        Ok(())
    }
}

pub struct Comments<'a> {
    crm: &'a Crm,
}

impl<'a> Comments<'a> {
    pub(crate) fn new(crm: &'a Crm) -> Self {
        Self { crm }
    }

    /// Oldest first
    pub async fn list(&self, ticket_id: &str) -> Result<Vec<TicketComment>> {
        self.crm
            .cache()
            .get_or_fetch(thread_key(ticket_id), || async {
                self.crm
                    .from(TABLE)
                    .select(COLUMNS)
                    .eq("ticket_id", ticket_id)
                    .order("created_at", true)
                    .execute()
                    .await
            })
            .await
    }

    pub async fn add(&self, comment: &NewComment) -> Result<()> {
        require_text(&comment.comment)?;
        self.crm.from(TABLE).insert(comment).await?;
        self.crm.cache().invalidate(&thread_key(&comment.ticket_id)).await;
        Ok(())
    }

    pub async fn edit(&self, id: &str, ticket_id: &str, comment: &str, is_internal: bool) -> Result<()> {
        require_text(comment)?;
        self.crm
            .from(TABLE)
            .eq("id", id)
            .update(&json!({ "comment": comment, "is_internal": is_internal }))
            .await?;
        self.crm.cache().invalidate(&thread_key(ticket_id)).await;
        Ok(())
    }

    pub async fn delete(&self, id: &str, ticket_id: &str) -> Result<()> {
        self.crm.from(TABLE).eq("id", id).delete().await?;
        self.crm.cache().invalidate(&thread_key(ticket_id)).await;
        Ok(())
    }
}
