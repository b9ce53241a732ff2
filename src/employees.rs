//! Support staff and their roles

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cache::QueryKey;
use crate::error::Result;
use crate::models::{AuthUser, Employee, EmployeeRole, NewEmployee};
use crate::Crm;

const TABLE: &str = "employees";

/// An account and, if promoted, its employee record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffMember {
    pub user: AuthUser,
    pub employee: Option<Employee>,
}

impl StaffMember {
    pub fn is_employee(&self) -> bool {
        self.employee.is_some()
    }
}

pub struct Employees<'a> {
    crm: &'a Crm,
}

impl<'a> Employees<'a> {
    pub(crate) fn new(crm: &'a Crm) -> Self {
        Self { crm }
    }

    pub async fn list(&self) -> Result<Vec<Employee>> {
        self.crm
            .cache()
            .get_or_fetch(QueryKey::new("employees"), || async {
                self.crm
                    .from(TABLE)
                    .select("*")
                    .order("full_name", true)
                    .execute()
                    .await
            })
            .await
    }

    /// Every account known to the identity provider, oldest first
    pub async fn auth_users(&self) -> Result<Vec<AuthUser>> {
        self.crm
            .cache()
            .get_or_fetch(QueryKey::new("auth-users"), || async {
                self.crm
                    .from("auth_users")
                    .select("*")
                    .order("created_at", true)
                    .execute()
                    .await
            })
            .await
    }

    /// Accounts paired with their employee record
    pub async fn roster(&self) -> Result<Vec<StaffMember>> {
        let (users, employees) = tokio::try_join!(self.auth_users(), self.list())?;
        Ok(users
            .into_iter()
            .map(|user| {
                let employee = employees.iter().find(|e| e.id == user.id).cloned();
                StaffMember { user, employee }
            })
            .collect())
    }

    /// Give an account an employee record. The name comes from the provider
    /// profile, or the email when the profile has none.
    pub async fn promote(&self, user: &AuthUser, role: Option<EmployeeRole>) -> Result<()> {
        let employee = NewEmployee {
            id: user.id.clone(),
            email: user.email().to_string(),
            full_name: user.display_name().to_string(),
            avatar_url: user.avatar_url().map(str::to_string),
            role: role.unwrap_or_default(),
        };
        self.crm.from(TABLE).insert(&[employee]).await?;
        self.invalidate().await;
        Ok(())
    }

    pub async fn set_role(&self, id: &str, role: EmployeeRole) -> Result<()> {
        self.crm
            .from(TABLE)
            .eq("id", id)
            .update(&json!({ "role": role }))
            .await?;
        self.invalidate().await;
        Ok(())
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        self.crm.from(TABLE).eq("id", id).delete().await?;
        self.invalidate().await;
        Ok(())
    }

    async fn invalidate(&self) {
        self.crm.cache().invalidate(&QueryKey::new("employees")).await;
    }
}
