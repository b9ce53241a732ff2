//! Account directory: every sign-in and what it is to the CRM

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{AuthUser, Customer, CustomerStatus, Employee, EmployeeRole, NewCustomer};
use crate::Crm;

/// An account with its employee record and its customer record, matched by
/// id and by email respectively
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub user: AuthUser,
    pub employee: Option<Employee>,
    pub customer: Option<Customer>,
}

pub struct UserDirectory<'a> {
    crm: &'a Crm,
}

impl<'a> UserDirectory<'a> {
    pub(crate) fn new(crm: &'a Crm) -> Self {
        Self { crm }
    }

    pub async fn overview(&self) -> Result<Vec<DirectoryEntry>> {
        let employees = self.crm.employees();
        let customers = self.crm.customers();
        let (users, staff, clients) =
            tokio::try_join!(employees.auth_users(), employees.list(), customers.list())?;

        Ok(users
            .into_iter()
            .map(|user| {
                let employee = staff.iter().find(|e| e.id == user.id).cloned();
                let customer = user
                    .email
                    .as_deref()
                    .and_then(|email| clients.iter().find(|c| c.email == email))
                    .cloned();
                DirectoryEntry {
                    user,
                    employee,
                    customer,
                }
            })
            .collect())
    }

    /// Create a customer record for an account, `lead` unless told otherwise
    pub async fn convert_to_customer(
        &self,
        user: &AuthUser,
        status: Option<CustomerStatus>,
    ) -> Result<Customer> {
        self.crm
            .customers()
            .create(&NewCustomer {
                name: user.display_name().to_string(),
                email: user.email().to_string(),
                status: status.unwrap_or_default(),
                ..Default::default()
            })
            .await
    }

    pub async fn remove_customer(&self, email: &str) -> Result<()> {
        self.crm.customers().delete_by_email(email).await
    }

    pub async fn convert_to_employee(&self, user: &AuthUser, role: Option<EmployeeRole>) -> Result<()> {
        self.crm.employees().promote(user, role).await
    }

    pub async fn remove_employee(&self, id: &str) -> Result<()> {
        self.crm.employees().remove(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::test_support;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_directory(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/auth_users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "id": "u1",
                    "email": "sam@example.com",
                    "raw_user_meta_data": { "full_name": "Sam Lead" },
                    "created_at": "2024-01-10T12:00:00+00:00"
                },
                {
                    "id": "u2",
                    "email": "wile@acme.test",
                    "raw_user_meta_data": {},
                    "created_at": "2024-01-11T12:00:00+00:00"
                }
            ])))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/employees"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": "u1",
                "email": "sam@example.com",
                "full_name": "Sam Lead",
                "role": "manager"
            }])))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/customers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": "c1",
                "created_at": "2024-02-01T09:00:00+00:00",
                "name": "Wile E. Coyote",
                "email": "wile@acme.test",
                "status": "active"
            }])))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_overview_matches_customers_by_email() {
        let mock_server = MockServer::start().await;
        mount_directory(&mock_server).await;

        let entries = test_support::crm(&mock_server).users().overview().await.unwrap();
        assert_eq!(entries.len(), 2);

        assert!(entries[0].employee.is_some());
        assert!(entries[0].customer.is_none());

        assert!(entries[1].employee.is_none());
        assert_eq!(entries[1].customer.as_ref().unwrap().id, "c1");
    }

    #[tokio::test]
    async fn test_convert_to_customer_defaults_to_lead() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/customers"))
            .and(body_partial_json(json!({
                "name": "kim@example.com",
                "email": "kim@example.com",
                "status": "lead"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
                "id": "c9",
                "created_at": "2024-02-01T09:00:00+00:00",
                "name": "kim@example.com",
                "email": "kim@example.com",
                "status": "lead"
            }])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let user: AuthUser = serde_json::from_value(json!({
            "id": "u3",
            "email": "kim@example.com",
            "raw_user_meta_data": {},
            "created_at": "2024-01-12T12:00:00+00:00"
        }))
        .unwrap();

        let customer = test_support::crm(&mock_server)
            .users()
            .convert_to_customer(&user, None)
            .await
            .unwrap();
        assert_eq!(customer.status, CustomerStatus::Lead);
    }

    #[tokio::test]
    async fn test_account_without_email_cannot_become_customer() {
        let mock_server = MockServer::start().await;

        let user: AuthUser = serde_json::from_value(json!({
            "id": "u4",
            "email": null,
            "raw_user_meta_data": { "full_name": "Phone Only" },
            "created_at": "2024-01-12T12:00:00+00:00"
        }))
        .unwrap();

        let result = test_support::crm(&mock_server)
            .users()
            .convert_to_customer(&user, Some(CustomerStatus::Active))
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
