//! Row types mirroring the CRM tables

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Closed set of values stored as snake_case text
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::validation(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

text_enum!(
    /// Lifecycle of a ticket
    TicketStatus {
        Open => "open",
        InProgress => "in_progress",
        Resolved => "resolved",
        Closed => "closed",
    }
);

text_enum!(
    TicketPriority {
        Low => "low",
        Medium => "medium",
        High => "high",
        Urgent => "urgent",
    }
);

text_enum!(
    /// Relationship stage of a customer
    CustomerStatus {
        Active => "active",
        Inactive => "inactive",
        Lead => "lead",
    }
);

text_enum!(
    /// Role tag of an employee
    EmployeeRole {
        Support => "support",
        Admin => "admin",
        Manager => "manager",
    }
);

impl Default for TicketPriority {
    fn default() -> Self {
        TicketPriority::Medium
    }
}

impl Default for CustomerStatus {
    fn default() -> Self {
        CustomerStatus::Lead
    }
}

impl Default for EmployeeRole {
    fn default() -> Self {
        EmployeeRole::Support
    }
}

impl TicketStatus {
    /// Statuses counted as open work on the dashboard
    pub const UNRESOLVED: &'static [TicketStatus] = &[TicketStatus::Open, TicketStatus::InProgress];
}

/// Profile names are filled in by a trigger and may still be null.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A to-one embed may arrive as an object, a one-element array or null.
pub(crate) fn embedded<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        None => None,
        Some(OneOrMany::One(value)) => Some(value),
        Some(OneOrMany::Many(values)) => values.into_iter().next(),
    })
}

/// Embedded employee or user, e.g. `assigned_to:users!assigned_to(id,full_name)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub full_name: String,
}

/// Embedded customer, e.g. `customer:customers!customer_id(name,email)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRef {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub status: CustomerStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub custom_fields: Option<Value>,
    #[serde(default, deserialize_with = "embedded")]
    pub assigned_to: Option<PersonRef>,
}

impl Customer {
    /// Case-insensitive match on name, email and company; substring match
    /// on phone.
    pub fn matches(&self, term: &str) -> bool {
        let needle = term.to_lowercase();
        self.name.to_lowercase().contains(&needle)
            || self.email.to_lowercase().contains(&needle)
            || self
                .company_name
                .as_deref()
                .is_some_and(|c| c.to_lowercase().contains(&needle))
            || self.phone.as_deref().is_some_and(|p| p.contains(term))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    pub status: CustomerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
}

/// Partial customer edit; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CustomerUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CustomerStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Option<String>>,
}

impl CustomerUpdate {
    pub fn is_empty(&self) -> bool {
        self == &CustomerUpdate::default()
    }
}

/// Raw `tickets` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub customer_id: String,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Row of the ticket list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    #[serde(default, deserialize_with = "embedded")]
    pub customer: Option<CustomerRef>,
    #[serde(default, deserialize_with = "embedded")]
    pub assigned_to: Option<PersonRef>,
}

/// A ticket with its customer, assignee and author resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketDetail {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    #[serde(default, deserialize_with = "embedded")]
    pub customer: Option<CustomerRef>,
    #[serde(default, deserialize_with = "embedded")]
    pub assigned_to: Option<PersonRef>,
    #[serde(default, deserialize_with = "embedded")]
    pub created_by: Option<PersonRef>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolution_notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub priority: TicketPriority,
    pub customer_id: String,
    pub assigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

/// Partial ticket edit; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TicketUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TicketStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TicketPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
}

impl TicketUpdate {
    pub fn is_empty(&self) -> bool {
        self == &TicketUpdate::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketComment {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub ticket_id: String,
    pub user_id: String,
    pub comment: String,
    #[serde(default)]
    pub is_internal: bool,
    #[serde(default, deserialize_with = "embedded")]
    pub user: Option<PersonRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewComment {
    pub ticket_id: String,
    pub user_id: String,
    pub comment: String,
    pub is_internal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub role: EmployeeRole,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewEmployee {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
    pub role: EmployeeRole,
}

/// Row of the `auth_users` view over the identity provider's users
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub raw_user_meta_data: Value,
    pub created_at: DateTime<Utc>,
}

impl AuthUser {
    fn meta(&self, field: &str) -> Option<&str> {
        self.raw_user_meta_data.get(field).and_then(Value::as_str)
    }

    pub fn email(&self) -> &str {
        self.email.as_deref().unwrap_or_default()
    }

    /// Name from the provider profile, falling back to the email address
    pub fn display_name(&self) -> &str {
        self.meta("full_name")
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.email())
    }

    pub fn avatar_url(&self) -> Option<&str> {
        self.meta("avatar_url")
    }
}

/// Row of the `users` profile table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityCount {
    pub priority: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_tickets: u64,
    pub open_tickets: u64,
    pub resolved_tickets: u64,
    /// Percentage of tickets in the window that are resolved
    pub resolution_rate: f64,
    /// Mean hours from creation to resolution
    pub avg_response_hours: f64,
}
