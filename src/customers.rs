//! Customer records

use tracing::debug;

use crate::cache::QueryKey;
use crate::error::{Error, Result};
use crate::models::{Customer, CustomerRef, CustomerUpdate, NewCustomer};
use crate::postgrest::Counted;
use crate::Crm;

const TABLE: &str = "customers";

const LIST_COLUMNS: &str = "id, created_at, name, email, phone, company_name, status, notes,
    assigned_to:users!assigned_to(full_name)";

const DETAIL_COLUMNS: &str = "id, created_at, name, email, phone, company_name, status, notes,
    website, industry, address, custom_fields,
    assigned_to:users!assigned_to(id,full_name)";

const PICKER_COLUMNS: &str = "id, name, email, company_name";

fn root() -> QueryKey {
    QueryKey::new("customers")
}

pub struct Customers<'a> {
    crm: &'a Crm,
}

impl<'a> Customers<'a> {
    pub(crate) fn new(crm: &'a Crm) -> Self {
        Self { crm }
    }

    /// Every customer ordered by name
    pub async fn list(&self) -> Result<Vec<Customer>> {
        self.crm
            .cache()
            .get_or_fetch(root().with("list"), || async {
                self.crm
                    .from(TABLE)
                    .select(LIST_COLUMNS)
                    .order("name", true)
                    .execute()
                    .await
            })
            .await
    }

    /// Filter the customer list locally and return one page of matches
    /// together with the number of matches overall.
    pub async fn search(&self, term: &str, page: u64, rows_per_page: u64) -> Result<Counted<Customer>> {
        let term = term.trim();
        let matches: Vec<Customer> = self
            .list()
            .await?
            .into_iter()
            .filter(|c| term.is_empty() || c.matches(term))
            .collect();

        let total = matches.len() as u64;
        let start = page.saturating_mul(rows_per_page) as usize;
        let rows = matches
            .into_iter()
            .skip(start)
            .take(rows_per_page as usize)
            .collect();
        debug!(term, total, "customer search");
        Ok(Counted { rows, total })
    }

    pub async fn get(&self, id: &str) -> Result<Customer> {
        self.crm
            .cache()
            .get_or_fetch(root().with(id), || async {
                self.crm
                    .from(TABLE)
                    .select(DETAIL_COLUMNS)
                    .eq("id", id)
                    .single()
                    .await
            })
            .await
    }

    /// Minimal rows for choosing a customer on the ticket form
    pub async fn picker(&self) -> Result<Vec<CustomerRef>> {
        self.crm
            .cache()
            .get_or_fetch(root().with("picker"), || async {
                self.crm
                    .from(TABLE)
                    .select(PICKER_COLUMNS)
                    .order("name", true)
                    .execute()
                    .await
            })
            .await
    }

    pub async fn create(&self, customer: &NewCustomer) -> Result<Customer> {
        if customer.name.trim().is_empty() {
            return Err(Error::validation("customer name is required"));
        }
        if customer.email.trim().is_empty() {
            return Err(Error::validation("customer email is required"));
        }

        let created = self
            .crm
            .from(TABLE)
            .select(DETAIL_COLUMNS)
            .insert_returning::<_, Customer>(customer)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found("inserted customer was not returned"))?;
        self.invalidate().await;
        Ok(created)
    }

    pub async fn update(&self, id: &str, changes: &CustomerUpdate) -> Result<()> {
        if changes.is_empty() {
            return Err(Error::validation("nothing to update"));
        }
        self.crm.from(TABLE).eq("id", id).update(changes).await?;
        self.invalidate().await;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.crm.from(TABLE).eq("id", id).delete().await?;
        self.invalidate().await;
        Ok(())
    }

    /// Remove the customer record that shares an account's email
    pub async fn delete_by_email(&self, email: &str) -> Result<()> {
        self.crm.from(TABLE).eq("email", email).delete().await?;
        self.invalidate().await;
        Ok(())
    }

    async fn invalidate(&self) {
        self.crm.cache().invalidate(&root()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrmConfig;
    use crate::models::CustomerStatus;
    use crate::test_support;
    use serde_json::{json, Value};
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn customer(id: &str, name: &str, email: &str, company: &str, phone: &str) -> Value {
        json!({
            "id": id,
            "created_at": "2024-02-01T09:00:00+00:00",
            "name": name,
            "email": email,
            "phone": phone,
            "company_name": company,
            "status": "active",
            "notes": null,
            "assigned_to": null
        })
    }

    fn roster() -> Value {
        json!([
            customer("c1", "Alice Archer", "alice@acme.test", "Acme", "+1 555 0101"),
            customer("c2", "Bob Baker", "bob@globex.test", "Globex", "+1 555 0102"),
            customer("c3", "Carol Cook", "carol@acme.test", "Acme", "+44 20 7946"),
        ])
    }

    #[tokio::test]
    async fn test_list_orders_by_name_and_embeds_assignee() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/customers"))
            .and(query_param("order", "name.asc"))
            .and(query_param(
                "select",
                "id,created_at,name,email,phone,company_name,status,notes,assigned_to:users!assigned_to(full_name)",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(roster()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let customers = test_support::crm(&mock_server).customers().list().await.unwrap();
        assert_eq!(customers.len(), 3);
        assert_eq!(customers[1].company_name.as_deref(), Some("Globex"));
    }

    #[tokio::test]
    async fn test_search_filters_then_pages() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/customers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(roster()))
            .mount(&mock_server)
            .await;

        let crm = test_support::crm(&mock_server);

        let page = crm.customers().search("ACME", 0, 1).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.rows[0].id, "c1");

        let page = crm.customers().search("acme", 1, 1).await.unwrap();
        assert_eq!(page.rows[0].id, "c3");

        let page = crm.customers().search("7946", 0, 10).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.rows[0].name, "Carol Cook");

        let page = crm.customers().search("", 0, 10).await.unwrap();
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn test_create_requires_name_and_email() {
        let mock_server = MockServer::start().await;
        let crm = test_support::crm(&mock_server);

        let missing_email = NewCustomer {
            name: "Dora".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            crm.customers().create(&missing_email).await,
            Err(Error::Validation(_))
        ));
        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_defaults_to_lead_and_invalidates_list() {
        let mock_server = MockServer::start().await;
        let config = CrmConfig::new(&mock_server.uri(), "anon")
            .unwrap()
            .with_stale_time(Duration::from_secs(300));
        let crm = Crm::new(config).unwrap();

        Mock::given(method("GET"))
            .and(path("/rest/v1/customers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(roster()))
            .expect(2)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/customers"))
            .and(body_json(json!({
                "name": "Dora Explorer",
                "email": "dora@example.com",
                "status": "lead"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([
                customer("c4", "Dora Explorer", "dora@example.com", "", "")
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        crm.customers().list().await.unwrap();
        crm.customers().list().await.unwrap();

        let created = crm
            .customers()
            .create(&NewCustomer {
                name: "Dora Explorer".to_string(),
                email: "dora@example.com".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(created.id, "c4");
        assert_eq!(NewCustomer::default().status, CustomerStatus::Lead);

        crm.customers().list().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_update_is_rejected() {
        let mock_server = MockServer::start().await;
        let result = test_support::crm(&mock_server)
            .customers()
            .update("c1", &CustomerUpdate::default())
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_by_email() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/rest/v1/customers"))
            .and(query_param("email", "eq.bob@globex.test"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        test_support::crm(&mock_server)
            .customers()
            .delete_by_email("bob@globex.test")
            .await
            .unwrap();
    }
}
