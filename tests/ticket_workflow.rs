use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use helpdesk_crm::auth::{AuthChangeEvent, OAuthProvider};
use helpdesk_crm::config::CrmConfig;
use helpdesk_crm::prelude::*;

fn crm(server: &MockServer) -> Crm {
    let config = CrmConfig::new(&server.uri(), "anon-key")
        .unwrap()
        .with_oauth_redirect_to("http://localhost:5173/");
    Crm::new(config).unwrap()
}

fn access_token(user_id: &str) -> String {
    encode(
        &Header::default(),
        &json!({
            "sub": user_id,
            "email": "agent@example.com",
            "exp": Utc::now().timestamp() + 3600,
            "role": "authenticated",
            "user_metadata": { "full_name": "Avery Agent" }
        }),
        &EncodingKey::from_secret(b"integration"),
    )
    .unwrap()
}

#[tokio::test]
async fn new_ticket_is_inserted_once_with_open_status() {
    let mock_server = MockServer::start().await;
    let customer_id = Uuid::new_v4().to_string();
    let ticket_id = Uuid::new_v4().to_string();

    Mock::given(method("POST"))
        .and(path("/rest/v1/tickets"))
        .and(header("prefer", "return=representation"))
        .and(body_json(json!({
            "title": "Cannot log in",
            "description": "Password reset mail never arrives",
            "priority": "high",
            "customer_id": customer_id,
            "assigned_to": null,
            "status": "open"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": ticket_id,
            "created_at": "2024-05-01T12:00:00+00:00",
            "title": "Cannot log in",
            "description": "Password reset mail never arrives",
            "status": "open",
            "priority": "high",
            "customer_id": customer_id
        }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let ticket = crm(&mock_server)
        .tickets()
        .create(&NewTicket {
            title: "Cannot log in".to_string(),
            description: "Password reset mail never arrives".to_string(),
            priority: TicketPriority::High,
            customer_id: customer_id.clone(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(ticket.id, ticket_id);
    assert_eq!(ticket.status, TicketStatus::Open);
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn signed_in_agent_works_a_ticket() {
    let mock_server = MockServer::start().await;
    let crm = crm(&mock_server);
    let user_id = Uuid::new_v4().to_string();
    let token = access_token(&user_id);
    let bearer = format!("Bearer {}", token);

    let login = crm.auth().sign_in_with_oauth_url(OAuthProvider::Google, None);
    assert!(login.starts_with(&format!("{}/auth/v1/authorize?provider=google", mock_server.uri())));

    let mut events = crm.auth().on_auth_state_change();
    let session = crm
        .auth()
        .session_from_redirect(&format!(
            "http://localhost:5173/#access_token={}&refresh_token=r1&expires_in=3600&token_type=bearer",
            token
        ))
        .unwrap();
    assert_eq!(session.user_id(), Some(user_id.as_str()));
    assert_eq!(events.recv().await.unwrap().kind, AuthChangeEvent::SignedIn);

    Mock::given(method("GET"))
        .and(path("/rest/v1/tickets"))
        .and(header("authorization", bearer.as_str()))
        .and(query_param("status", "eq.open"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-range", "0-0/1")
                .set_body_json(json!([{
                    "id": "t1",
                    "created_at": "2024-05-01T12:00:00+00:00",
                    "title": "Cannot log in",
                    "status": "open",
                    "priority": "high",
                    "customer": { "name": "Acme", "email": "ops@acme.test" },
                    "assigned_to": null
                }])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/tickets"))
        .and(query_param("id", "eq.t1"))
        .and(body_json(json!({ "assigned_to": user_id })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/ticket_comments"))
        .and(body_json(json!({
            "ticket_id": "t1",
            "user_id": user_id,
            "comment": "Resent the reset mail",
            "is_internal": false
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .and(header("authorization", bearer.as_str()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let page = crm
        .tickets()
        .list(&TicketQuery {
            status: Some(TicketStatus::Open),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total_count, 1);

    let ticket = &page.tickets[0];
    crm.tickets().assign(&ticket.id, Some(user_id.as_str())).await.unwrap();
    crm.comments()
        .add(&NewComment {
            ticket_id: ticket.id.clone(),
            user_id: user_id.clone(),
            comment: "Resent the reset mail".to_string(),
            is_internal: false,
        })
        .await
        .unwrap();

    crm.auth().sign_out().await.unwrap();
    assert!(crm.auth().get_session().is_none());
}

#[tokio::test]
async fn api_errors_carry_postgrest_details() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/tickets"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "code": "42501",
            "message": "new row violates row-level security policy",
            "details": null,
            "hint": null
        })))
        .mount(&mock_server)
        .await;

    let err = crm(&mock_server)
        .tickets()
        .update_status("t1", TicketStatus::Closed)
        .await
        .unwrap_err();

    match err {
        Error::Api { status, details } => {
            assert_eq!(status.as_u16(), 403);
            assert_eq!(details.code.as_deref(), Some("42501"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn dashboard_breakdown_of_empty_project_is_empty() {
    tokio_test::block_on(async {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/get_tickets_by_priority"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Value::Null))
            .mount(&mock_server)
            .await;

        let rows = crm(&mock_server)
            .dashboard()
            .tickets_by_priority(30)
            .await
            .unwrap();
        assert!(rows.is_empty());
    });
}
