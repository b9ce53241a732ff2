//! Test data for a fresh project: one customer, one agent and a spread of
//! tickets over the last 90 days

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::auth::AdminUserAttributes;
use crate::error::{Error, Result};
use crate::models::{CustomerStatus, NewCustomer, TicketPriority, TicketStatus};
use crate::Crm;

pub const CUSTOMER_EMAIL: &str = "test.customer@example.com";
pub const USER_EMAIL: &str = "test.user@example.com";
pub const USER_PASSWORD: &str = "test123456";

pub const TICKET_COUNT: usize = 100;
pub const BATCH_SIZE: usize = 20;
const WINDOW_DAYS: i64 = 90;
const ASSIGNED_SHARE: f64 = 0.7;

/// Time the profile trigger gets to create the `users` row
const PROFILE_TRIGGER_DELAY: std::time::Duration = std::time::Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct IdRow {
    id: String,
}

/// Ticket row written directly, bypassing the `open` default of the
/// regular create path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeedTicket {
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub customer_id: String,
    pub created_by: String,
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub customer_id: String,
    pub user_id: String,
    pub inserted: usize,
}

/// Id of the test customer, creating it when missing
pub async fn ensure_test_customer(crm: &Crm) -> Result<String> {
    let existing = crm
        .from("customers")
        .select("id")
        .eq("email", CUSTOMER_EMAIL)
        .limit(1)
        .execute::<IdRow>()
        .await?;
    if let Some(row) = existing.into_iter().next() {
        return Ok(row.id);
    }

    let customer = crm
        .customers()
        .create(&NewCustomer {
            name: "Test Customer".to_string(),
            email: CUSTOMER_EMAIL.to_string(),
            phone: Some("+1234567890".to_string()),
            company_name: Some("Test Company".to_string()),
            status: CustomerStatus::Active,
            ..Default::default()
        })
        .await?;
    info!(customer_id = %customer.id, "created test customer");
    Ok(customer.id)
}

/// Id of the test agent, creating the account when missing
pub async fn ensure_test_user(crm: &Crm) -> Result<String> {
    let existing = crm
        .from("users")
        .select("id")
        .eq("email", USER_EMAIL)
        .limit(1)
        .execute::<IdRow>()
        .await?;
    if let Some(row) = existing.into_iter().next() {
        return Ok(row.id);
    }

    let user = crm
        .admin()?
        .create_user(&AdminUserAttributes {
            email: USER_EMAIL.to_string(),
            password: Some(USER_PASSWORD.to_string()),
            email_confirm: true,
            user_metadata: Some(json!({ "full_name": "Test User" })),
        })
        .await?;
    info!(user_id = %user.id, "created auth user");

    tokio::time::sleep(PROFILE_TRIGGER_DELAY).await;

    crm.from("users")
        .eq("id", &user.id)
        .update(&json!({ "role": "support" }))
        .await?;
    Ok(user.id)
}

/// `count` tickets with random status and priority, about 70% assigned to
/// `user_id`, created at uniformly random times in the last 90 days
pub fn generate_tickets<R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    customer_id: &str,
    user_id: &str,
    now: DateTime<Utc>,
) -> Vec<SeedTicket> {
    let window_ms = Duration::days(WINDOW_DAYS).num_milliseconds();
    (1..=count)
        .map(|i| {
            let status = *TicketStatus::ALL.choose(rng).unwrap_or(&TicketStatus::Open);
            let priority = *TicketPriority::ALL
                .choose(rng)
                .unwrap_or(&TicketPriority::Medium);
            let assigned_to = rng.gen_bool(ASSIGNED_SHARE).then(|| user_id.to_string());
            let age = Duration::milliseconds(rng.gen_range(0..window_ms));

            SeedTicket {
                title: format!("Test Ticket {}", i),
                description: format!("This is a test ticket {} for performance testing", i),
                status,
                priority,
                customer_id: customer_id.to_string(),
                created_by: user_id.to_string(),
                assigned_to,
                created_at: now - age,
            }
        })
        .collect()
}

/// Insert in batches, stopping at the first batch that fails. Returns how
/// many tickets were stored.
pub async fn insert_batches(crm: &Crm, tickets: &[SeedTicket], batch_size: usize) -> usize {
    let mut inserted = 0;
    for batch in tickets.chunks(batch_size.max(1)) {
        if let Err(e) = crm.from("tickets").insert(batch).await {
            error!(error = %e, "error inserting batch");
            break;
        }
        info!("inserted tickets {} to {}", inserted + 1, inserted + batch.len());
        inserted += batch.len();
    }
    inserted
}

pub async fn run(crm: &Crm) -> Result<SeedReport> {
    if crm.config().service_role_key.is_none() {
        return Err(Error::config("seeding needs the service role key"));
    }

    let customer_id = ensure_test_customer(crm).await?;
    let user_id = ensure_test_user(crm).await?;

    let tickets = generate_tickets(
        &mut rand::thread_rng(),
        TICKET_COUNT,
        &customer_id,
        &user_id,
        Utc::now(),
    );
    let inserted = insert_batches(crm, &tickets, BATCH_SIZE).await;
    if inserted == tickets.len() {
        info!(inserted, "generated test data");
    }

    Ok(SeedReport {
        customer_id,
        user_id,
        inserted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrmConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::Value;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service_crm(server: &MockServer) -> Crm {
        let config = CrmConfig::new(&server.uri(), "service")
            .unwrap()
            .with_service_role_key("service");
        Crm::new(config).unwrap()
    }

    #[test]
    fn test_generated_tickets() {
        let mut rng = StdRng::seed_from_u64(7);
        let now = Utc::now();
        let tickets = generate_tickets(&mut rng, TICKET_COUNT, "c1", "u1", now);

        assert_eq!(tickets.len(), 100);
        assert_eq!(tickets[0].title, "Test Ticket 1");
        assert_eq!(tickets[99].title, "Test Ticket 100");

        let oldest = now - Duration::days(90);
        assert!(tickets.iter().all(|t| t.created_at <= now && t.created_at > oldest));
        assert!(tickets.iter().all(|t| t.created_by == "u1" && t.customer_id == "c1"));

        let assigned = tickets.iter().filter(|t| t.assigned_to.is_some()).count();
        assert!((40..=95).contains(&assigned), "assigned {}", assigned);
        assert!(tickets.iter().any(|t| t.status != tickets[0].status));
    }

    #[tokio::test]
    async fn test_existing_records_are_reused() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/customers"))
            .and(query_param("email", "eq.test.customer@example.com"))
            .and(query_param("limit", "1"))
            .and(header("authorization", "Bearer service"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "c1" }])))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .and(query_param("email", "eq.test.user@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "u1" }])))
            .mount(&mock_server)
            .await;

        let crm = service_crm(&mock_server);
        assert_eq!(ensure_test_customer(&crm).await.unwrap(), "c1");
        assert_eq!(ensure_test_user(&crm).await.unwrap(), "u1");
    }

    #[tokio::test]
    async fn test_missing_user_is_created_and_given_support_role() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/admin/users"))
            .and(body_partial_json(json!({
                "email": "test.user@example.com",
                "email_confirm": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "u-new",
                "email": "test.user@example.com"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/users"))
            .and(query_param("id", "eq.u-new"))
            .and(body_partial_json(json!({ "role": "support" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let crm = service_crm(&mock_server);
        assert_eq!(ensure_test_user(&crm).await.unwrap(), "u-new");
    }

    #[tokio::test]
    async fn test_failed_batch_stops_insertion() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/tickets"))
            .respond_with(ResponseTemplate::new(201))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/tickets"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "23503",
                "message": "insert or update on table \"tickets\" violates foreign key constraint"
            })))
            .mount(&mock_server)
            .await;

        let crm = service_crm(&mock_server);
        let tickets = generate_tickets(&mut StdRng::seed_from_u64(1), 100, "c1", "u1", Utc::now());
        let inserted = insert_batches(&crm, &tickets, BATCH_SIZE).await;
        assert_eq!(inserted, 40);

        let requests = mock_server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3);
        let first: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(first.as_array().unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_run_requires_service_key() {
        let mock_server = MockServer::start().await;
        let crm = Crm::new(CrmConfig::new(&mock_server.uri(), "anon").unwrap()).unwrap();
        assert!(matches!(run(&crm).await, Err(Error::Config(_))));
    }
}
