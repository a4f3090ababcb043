use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use herqles_api::{create_routes, AppState, BusTokenValidator, LocalTokenValidator, TokenValidator};
use herqles_auth::{AssignmentBackend, AuthBackends, AuthorizationService, UserService};
use herqles_core::config::{AssignmentConfig, IdentityConfig};
use herqles_core::models::{Action, NewJob, NewJobTarget, NewTask, WorkerRegistration};
use herqles_core::traits::MessageBus;
use herqles_core::ServiceContext;
use herqles_dispatcher::{control_plane_handlers, SubscriberSet};
use herqles_infrastructure::{sqlite_context, DatabaseManager, InMemoryMessageBus, RpcClient};
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    ctx: ServiceContext,
    bus: Arc<InMemoryMessageBus>,
    backends: AuthBackends,
    admin_token: String,
}

async fn test_app(bus_validation: bool) -> (TestApp, Option<SubscriberSet>) {
    let db = DatabaseManager::in_memory().await.unwrap();
    let bus = Arc::new(InMemoryMessageBus::new());
    let ctx = sqlite_context(&db, bus.clone(), Duration::from_millis(500));
    let backends = AuthBackends::load(&ctx, &IdentityConfig::default(), &AssignmentConfig::default())
        .await
        .unwrap();
    let users = UserService::new(&backends);

    let (validator, subscribers) = if bus_validation {
        let mut subscribers = SubscriberSet::new(bus.clone());
        subscribers
            .start_all(control_plane_handlers(
                &ctx,
                AuthorizationService::new(backends.assignment.clone()),
            ))
            .await
            .unwrap();
        let rpc = RpcClient::new(bus.clone(), Duration::from_secs(2));
        (
            Arc::new(BusTokenValidator::new(rpc)) as Arc<dyn TokenValidator>,
            Some(subscribers),
        )
    } else {
        (
            Arc::new(LocalTokenValidator::new(users.authorization().clone())) as Arc<dyn TokenValidator>,
            None,
        )
    };

    let admin_token = backends
        .assignment
        .issue_token("admin", false)
        .await
        .unwrap()
        .token;

    let app = TestApp {
        router: create_routes(AppState::new(ctx.clone(), users, validator)),
        ctx,
        bus,
        backends,
        admin_token,
    };
    (app, subscribers)
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("X-Auth-Token", token);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn seed_worker(app: &TestApp, target: &str, framework: &str) -> i64 {
    app.ctx
        .workers
        .upsert(&WorkerRegistration {
            target: target.to_string(),
            framework: framework.to_string(),
            datacenter: "dc1".to_string(),
            tags: json!({"a": "b"}).as_object().cloned().unwrap(),
        })
        .await
        .unwrap()
}

async fn seed_job(app: &TestApp, worker_id: i64) -> i64 {
    app.ctx
        .jobs
        .create(&NewJob {
            name: "deploy".to_string(),
            datacenter: "dc1".to_string(),
            targets: vec![NewJobTarget {
                worker_id,
                tags: None,
                tasks: vec![NewTask {
                    name: "t1".to_string(),
                    actions: vec![Action {
                        processor: "shell".to_string(),
                        arguments: None,
                    }],
                }],
            }],
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_missing_and_invalid_tokens() {
    let (app, _) = test_app(false).await;

    let (status, body) = send(&app, request("GET", "/worker", None, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], json!(400));
    assert!(body["message"].is_string());

    let (status, _) = send(&app, request("GET", "/worker", Some("bogus"), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_health_endpoints() {
    let (app, _) = test_app(false).await;

    let (status, body) = send(&app, request("GET", "/_ping", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"sql": "ok", "rabbitmq": "ok"}));

    app.bus.close().await.unwrap();
    let (status, body) = send(&app, request("GET", "/_heartbeat", None, None)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["sql"], json!("ok"));
    assert_ne!(body["rabbitmq"], json!("ok"));
}

#[tokio::test]
async fn test_worker_listing_and_soft_delete() {
    let (app, _) = test_app(false).await;
    let token = app.admin_token.clone();
    let id = seed_worker(&app, "w1", "f1").await;
    seed_worker(&app, "w2", "f2").await;

    let (status, body) = send(&app, request("GET", "/worker?framework=f1", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    let workers = body["workers"].as_array().unwrap();
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0]["target"], json!("w1"));
    assert!(workers[0]["created_at"].is_i64());

    let uri = format!("/worker/{id}");
    let (status, body) = send(&app, request("DELETE", &uri, Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "1": "deleted" }));

    let (status, _) = send(&app, request("DELETE", &uri, Some(&token), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(
        &app,
        request("GET", "/worker?include_deleted=true", Some(&token), None),
    )
    .await;
    assert_eq!(body["workers"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_job_and_task_reads() {
    let (app, _) = test_app(false).await;
    let token = app.admin_token.clone();
    let worker_id = seed_worker(&app, "w1", "f1").await;
    let job_id = seed_job(&app, worker_id).await;

    let (status, job) = send(&app, request("GET", &format!("/job/{job_id}"), Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], json!("PENDING"));
    assert_eq!(job["targets"][0]["target"], json!("w1"));
    let task_id = job["targets"][0]["tasks"][0]["id"].as_i64().unwrap();

    let (status, page) = send(
        &app,
        request("GET", &format!("/task?job_id={job_id}"), Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["page"], json!(1));
    assert_eq!(page["tasks"][0]["id"], json!(task_id));

    let (status, task) = send(&app, request("GET", &format!("/task/{task_id}"), Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["actions"][0]["processor"], json!("shell"));
    assert_eq!(task["stopped_at"], Value::Null);

    let (status, _) = send(&app, request("GET", "/task/9999", Some(&token), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, request("GET", "/job/9999", Some(&token), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, request("GET", "/task?page=0", Some(&token), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_user_lifecycle() {
    let (app, _) = test_app(false).await;
    let admin = app.admin_token.clone();

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/user/add",
            Some(&admin),
            Some(json!({"username": "alice", "password": "pw"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"username": "alice", "identity": true, "assignment": true}));

    let (status, _) = send(
        &app,
        request(
            "PUT",
            "/user/token",
            None,
            Some(json!({"username": "alice", "password": "wrong"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, issued) = send(
        &app,
        request(
            "PUT",
            "/user/token",
            None,
            Some(json!({"username": "alice", "password": "pw"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(issued["expire_at"].is_i64());
    let alice = issued["token"].as_str().unwrap().to_string();

    let (status, me) = send(&app, request("GET", "/user/alice", Some(&alice), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["permissions"], json!([]));

    let (status, _) = send(&app, request("GET", "/worker", Some(&alice), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let grant = json!({"username": "alice", "permission": "herqles.worker.*"});
    let (status, _) = send(&app, request("PUT", "/user/permission", Some(&admin), Some(grant.clone()))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, request("PUT", "/user/permission", Some(&admin), Some(grant.clone()))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, request("GET", "/worker", Some(&alice), None)).await;
    assert_eq!(status, StatusCode::OK);

    let literal = json!({"username": "alice", "permission": "herqles.worker.get"});
    let (status, _) = send(&app, request("DELETE", "/user/permission", Some(&admin), Some(literal))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, request("DELETE", "/user/permission", Some(&admin), Some(grant))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, request("GET", "/worker", Some(&alice), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, rotated) = send(
        &app,
        request(
            "PUT",
            "/user/password",
            Some(&alice),
            Some(json!({"username": "alice", "password": "new-pw"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(rotated["token"], json!(alice));

    let (status, _) = send(&app, request("DELETE", "/user/alice", Some(&admin), None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, request("GET", "/user/alice", Some(&admin), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bus_token_validation() {
    let (app, subscribers) = test_app(true).await;
    let token = app.admin_token.clone();

    let (status, _) = send(&app, request("GET", "/worker", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, request("GET", "/worker", Some("bogus"), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], json!(403));

    app.backends
        .assignment
        .create_assignment("bob")
        .await
        .unwrap();
    let bob = app
        .backends
        .assignment
        .issue_token("bob", false)
        .await
        .unwrap()
        .token;
    let (status, _) = send(&app, request("GET", "/worker", Some(&bob), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    if let Some(subscribers) = subscribers {
        subscribers.stop_all().await;
    }
}
