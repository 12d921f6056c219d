//! Integration tests for the topic binder and fan-out service.
//!
//! These run against an in-memory SQLite database with the real schema.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use event_push::api::{ApiServer, ApiServerConfig, AppState};
use event_push::binder::BindOutcome;
use event_push::database::{
    DbPool, SqlxTopicBindingRepository, TopicBindingRepository, init_pool_with_size,
    run_migrations,
};
use event_push::domain::EventId;
use event_push::notification::{
    Announcement, FanoutReport, FanoutService, NotificationPayload, PushSender, SendError,
};

/// Helper to create a test database pool with migrations applied.
async fn setup_test_db() -> DbPool {
    // One connection: every in-memory connection is its own database.
    let pool = init_pool_with_size("sqlite::memory:", 1)
        .await
        .expect("Failed to create test pool");

    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

fn gala() -> EventId {
    EventId::new("spring-gala").unwrap()
}

/// Sender that records deliveries and reports some tokens as gone.
#[derive(Default)]
struct RecordingSender {
    gone: HashSet<String>,
    failing: HashSet<String>,
    delivered: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl PushSender for RecordingSender {
    async fn send(&self, token: &str, data: &Value) -> Result<(), SendError> {
        if self.gone.contains(token) {
            return Err(SendError::Unregistered);
        }
        if self.failing.contains(token) {
            return Err(SendError::Rejected {
                status: 500,
                body: "boom".to_string(),
            });
        }
        self.delivered
            .lock()
            .unwrap()
            .push((token.to_string(), data.clone()));
        Ok(())
    }
}

mod repository_tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_create_topic_binding() {
        let pool = setup_test_db().await;
        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .expect("Failed to query tables");
        assert!(tables.iter().any(|t| t.0 == "topic_binding"));
    }

    #[tokio::test]
    async fn test_rebinding_creates_one_binding() {
        let pool = setup_test_db().await;
        let repo = SqlxTopicBindingRepository::new(pool);
        let event = gala();

        assert_eq!(repo.bind("tok-1", &event).await.unwrap(), BindOutcome::Created);
        assert_eq!(
            repo.bind("tok-1", &event).await.unwrap(),
            BindOutcome::AlreadyBound
        );
        assert_eq!(repo.count_for_topic(&event).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_devices_bind_independently() {
        let pool = setup_test_db().await;
        let repo = SqlxTopicBindingRepository::new(pool);
        let gala = gala();
        let fair = EventId::new("harvest-fair").unwrap();

        repo.bind("phone", &gala).await.unwrap();
        repo.bind("laptop", &gala).await.unwrap();
        repo.bind("phone", &fair).await.unwrap();

        let mut tokens = repo.tokens_for_topic(&gala).await.unwrap();
        tokens.sort();
        assert_eq!(tokens, vec!["laptop".to_string(), "phone".to_string()]);
        assert_eq!(repo.count_for_topic(&fair).await.unwrap(), 1);

        assert!(repo.unbind("laptop", &gala).await.unwrap());
        assert!(!repo.unbind("laptop", &gala).await.unwrap());

        assert_eq!(repo.remove_token("phone").await.unwrap(), 2);
        assert_eq!(repo.count_for_topic(&gala).await.unwrap(), 0);
        assert_eq!(repo.count_for_topic(&fair).await.unwrap(), 0);
    }
}

mod fanout_tests {
    use super::*;

    #[tokio::test]
    async fn test_announce_reaches_bound_devices_and_prunes_dead_tokens() {
        let pool = setup_test_db().await;
        let repo = Arc::new(SqlxTopicBindingRepository::new(pool));
        let event = gala();
        for token in ["alive-1", "alive-2", "gone", "flaky"] {
            repo.bind(token, &event).await.unwrap();
        }
        repo.bind("other-event", &EventId::new("harvest-fair").unwrap())
            .await
            .unwrap();

        let sender = Arc::new(RecordingSender {
            gone: HashSet::from(["gone".to_string()]),
            failing: HashSet::from(["flaky".to_string()]),
            ..Default::default()
        });
        let fanout = FanoutService::new(repo.clone(), sender.clone()).with_concurrency(2);

        let report = fanout
            .announce(&Announcement {
                event_id: event.clone(),
                event_name: "Spring Gala".to_string(),
                message: "Doors open at 7".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(
            report,
            FanoutReport {
                sent: 2,
                failed: 1,
                removed: 1
            }
        );

        let delivered = sender.delivered.lock().unwrap().clone();
        assert_eq!(delivered.len(), 2);
        let payload = NotificationPayload::from_value(&delivered[0].1);
        assert_eq!(payload.title, "Spring Gala");
        assert_eq!(payload.body, "Doors open at 7");
        assert_eq!(payload.deep_link_url, "/event/spring-gala");

        let remaining = repo.tokens_for_topic(&event).await.unwrap();
        assert!(!remaining.contains(&"gone".to_string()));
        assert!(remaining.contains(&"flaky".to_string()));
    }

    #[tokio::test]
    async fn test_announce_without_bindings_is_empty() {
        let pool = setup_test_db().await;
        let repo = Arc::new(SqlxTopicBindingRepository::new(pool));
        let sender = Arc::new(RecordingSender::default());
        let fanout = FanoutService::new(repo, sender.clone());

        let report = fanout
            .announce(&Announcement {
                event_id: gala(),
                event_name: String::new(),
                message: "hello".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(report, FanoutReport::default());
        assert!(sender.delivered.lock().unwrap().is_empty());
    }
}

mod api_tests {
    use super::*;

    async fn router(with_fanout: bool) -> (axum::Router, Arc<SqlxTopicBindingRepository>) {
        let pool = setup_test_db().await;
        let repo = Arc::new(SqlxTopicBindingRepository::new(pool));
        let mut state = AppState::new(repo.clone());
        if with_fanout {
            let fanout = FanoutService::new(repo.clone(), Arc::new(RecordingSender::default()));
            state = state.with_fanout(Arc::new(fanout));
        }
        let server = ApiServer::new(ApiServerConfig::default(), state);
        (server.build_router(), repo)
    }

    async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _) = router(false).await;
        let request = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["fanout_enabled"], false);
    }

    #[tokio::test]
    async fn test_bind_is_idempotent_over_http() {
        let (router, repo) = router(false).await;
        let uri = "/api/topics/spring-gala/bindings";

        let (status, body) = send(&router, post_json(uri, json!({"token": "tok-123"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["outcome"], "created");
        assert_eq!(body["topic"], "event_spring-gala");

        let (status, body) = send(&router, post_json(uri, json!({"token": "tok-123"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "already_bound");

        assert_eq!(repo.count_for_topic(&gala()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bind_validation() {
        let (router, _) = router(false).await;

        let (status, body) = send(
            &router,
            post_json("/api/topics/spring-gala/bindings", json!({"token": "  "})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let (status, _) = send(
            &router,
            post_json("/api/topics/bad.id/bindings", json!({"token": "tok"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unbind() {
        let (router, repo) = router(false).await;
        repo.bind("tok-123", &gala()).await.unwrap();

        let delete = || {
            Request::builder()
                .method("DELETE")
                .uri("/api/topics/spring-gala/bindings/tok-123")
                .body(Body::empty())
                .unwrap()
        };

        let (status, _) = send(&router, delete()).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&router, delete()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_announce_requires_gateway() {
        let (router, _) = router(false).await;
        let (status, body) = send(
            &router,
            post_json(
                "/api/events/spring-gala/announcements",
                json!({"event_name": "Spring Gala", "message": "hi"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_announce_reports_fanout() {
        let (router, repo) = router(true).await;
        repo.bind("tok-1", &gala()).await.unwrap();
        repo.bind("tok-2", &gala()).await.unwrap();

        let (status, body) = send(
            &router,
            post_json(
                "/api/events/spring-gala/announcements",
                json!({"event_name": "Spring Gala", "message": "Doors open at 7"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sent"], 2);
        assert_eq!(body["failed"], 0);
        assert_eq!(body["removed"], 0);
    }

    #[tokio::test]
    async fn test_logging_route_without_handle() {
        let (router, _) = router(false).await;
        let request = Request::builder()
            .uri("/api/logging")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&router, request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
