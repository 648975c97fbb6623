//! End-to-end tests of the REST routes over the in-memory store and a mock platform.

use api_lib::adapters::platform::HttpAgentPlatform;
use api_lib::config::Config;
use api_lib::web::{build_router, state::AppState};
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use classroom_agent_core::domain::{NewCourse, Readiness, Role, User};
use classroom_agent_core::health::HealthMonitor;
use classroom_agent_core::memory::InMemoryStore;
use classroom_agent_core::ports::ClassroomStore;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestApp {
    router: Router,
    store: Arc<InMemoryStore>,
    teacher_id: Uuid,
    student_id: Uuid,
}

fn config(platform_url: String, sync_course_id: Option<Uuid>) -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: "postgresql://unused".to_string(),
        log_level: tracing::Level::INFO,
        platform_url,
        platform_timeout: Duration::from_secs(5),
        sync_course_id,
        voice_agent_id: Some("agent_7".to_string()),
        sync_max_attempts: 1,
        sync_backoff: Duration::from_millis(1),
        health_poll_interval: Duration::from_secs(30),
        cors_origin: "http://localhost:5173".to_string(),
    }
}

/// Inserts a teacher and a student, returned in that order.
fn seed_users(store: &InMemoryStore) -> (Uuid, Uuid) {
    let teacher_id = Uuid::new_v4();
    let student_id = Uuid::new_v4();
    store.insert_user(User {
        id: teacher_id,
        role: Role::Teacher,
        display_name: "Ada".to_string(),
        email: Some("ada@example.edu".to_string()),
    });
    store.insert_user(User {
        id: student_id,
        role: Role::Student,
        display_name: "Grace".to_string(),
        email: None,
    });
    (teacher_id, student_id)
}

fn build(
    server: &MockServer,
    store: Arc<InMemoryStore>,
    users: (Uuid, Uuid),
    sync_course_id: Option<Uuid>,
) -> TestApp {
    let platform = Arc::new(HttpAgentPlatform::new(server.uri(), Duration::from_secs(5)).unwrap());
    let health = Arc::new(HealthMonitor::new(platform.clone()));
    let (_, readiness) = watch::channel(Readiness::Ready);
    let (state, _failures) = AppState::new(
        store.clone(),
        store.clone(),
        platform,
        health,
        readiness,
        Arc::new(config(server.uri(), sync_course_id)),
    );

    TestApp {
        router: build_router(Arc::new(state)),
        store,
        teacher_id: users.0,
        student_id: users.1,
    }
}

async fn app(server: &MockServer) -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let users = seed_users(&store);
    build(server, store, users, None)
}

async fn call(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, user: Uuid, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", user.to_string())
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str, user: Uuid) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-user-id", user.to_string())
        .body(Body::empty())
        .unwrap()
}

async fn mount_title(server: &MockServer, title: &str) {
    Mock::given(method("POST"))
        .and(path("/agent/generate-thread-title"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "success": true, "title": title })),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_requests_without_a_known_user_are_rejected() {
    let server = MockServer::start().await;
    let app = app(&server).await;

    let request = Request::builder().uri("/threads").body(Body::empty()).unwrap();
    let (status, _) = call(&app.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app.router, get("/threads", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(&app.router, get("/profile", app.teacher_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "teacher");
}

#[tokio::test]
async fn test_first_message_creates_titled_thread() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/agent/process"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "Quiz 1 created for CS101.",
            "success": true,
            "action_taken": "create_assignment"
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_title(&server, "CS101 Quiz Setup").await;
    let app = app(&server).await;

    let (status, body) = call(
        &app.router,
        json_request(
            "POST",
            "/messages",
            app.teacher_id,
            json!({ "message": "Create assignment 'Quiz 1' for CS101" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["answered_by"], "primary");
    assert_eq!(body["message"]["response"], "Quiz 1 created for CS101.");
    assert_eq!(body["thread"]["title"], "CS101 Quiz Setup");
    assert_eq!(body["thread"]["message_count"], 1);

    let (_, threads) = call(&app.router, get("/threads", app.teacher_id)).await;
    assert_eq!(threads["threads"].as_array().unwrap().len(), 1);
    assert_eq!(threads["active_thread_id"], body["thread"]["id"]);
}

#[tokio::test]
async fn test_reported_error_falls_back_to_test_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/agent/process"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "Something broke.",
            "success": false,
            "action_taken": "error"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/agent/test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "Fallback says hi.",
            "success": true
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_title(&server, "Greeting").await;
    let app = app(&server).await;

    let (status, body) = call(
        &app.router,
        json_request("POST", "/messages", app.student_id, json!({ "message": "hello" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["answered_by"], "test");
    assert_eq!(body["message"]["response"], "Fallback says hi.");
}

#[tokio::test]
async fn test_total_failure_persists_apology_and_reports_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/agent/process"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/agent/test"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let app = app(&server).await;

    let (status, body) = call(
        &app.router,
        json_request("POST", "/messages", app.student_id, json!({ "message": "hello there friend" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"], "platform_error");
    assert!(body["message"]["response"].as_str().unwrap().len() > 0);
    assert_eq!(body["thread"]["message_count"], 1);
    // Both title endpoints are unmocked, so the local fallback names the thread.
    assert_eq!(body["thread"]["title"], "hello there friend");

    let (_, status_body) = call(&app.router, get("/agent/status", app.student_id)).await;
    assert_eq!(status_body["status"], "error");
}

#[tokio::test]
async fn test_assignment_in_synced_course_pushes_knowledge_base() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/voice-agent/update-context"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "updated",
            "knowledge_base_updated": true
        })))
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryStore::new());
    let users = seed_users(&store);
    let course = store
        .create_course(NewCourse {
            title: "CS101".to_string(),
            description: None,
            teacher_id: users.0,
        })
        .await
        .unwrap();
    store.set_sync_scoped(course.id);
    let app = build(&server, store, users, Some(course.id));

    let (status, body) = call(
        &app.router,
        json_request(
            "POST",
            "/assignments",
            app.teacher_id,
            json!({ "course_id": course.id, "title": "Quiz 1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "draft");
    assert_eq!(body["total_points"], 100);
    assert_eq!(app.store.list_assignments(course.id).await.unwrap().len(), 1);

    let mut pushes = Vec::new();
    for _ in 0..50 {
        pushes = server.received_requests().await.unwrap_or_default();
        if !pushes.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(pushes.len(), 1);
    let body: Value = serde_json::from_slice(&pushes[0].body).unwrap();
    assert_eq!(body["student_id"], "broadcast");
    assert_eq!(body["course_id"], course.id.to_string());
    assert_eq!(body["agent_id"], "agent_7");
    assert_eq!(body["context"]["course"]["assignments"][0]["title"], "Quiz 1");
}

#[tokio::test]
async fn test_context_snapshot_requires_enrollment() {
    let server = MockServer::start().await;
    let app = app(&server).await;

    let (status, course) = call(
        &app.router,
        json_request("POST", "/courses", app.teacher_id, json!({ "title": "CS101" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let course_id = course["id"].as_str().unwrap().to_string();

    let uri = format!("/voice-agent/context/{}/{}", app.student_id, course_id);
    let (status, _) = call(&app.router, get(&uri, app.teacher_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app.router,
        json_request(
            "POST",
            "/enrollments",
            app.teacher_id,
            json!({ "student_id": app.student_id, "course_id": course_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call(&app.router, get(&uri, app.teacher_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["context"]["student"]["name"], "Grace");
    assert_eq!(body["context"]["course"]["title"], "CS101");
}

#[tokio::test]
async fn test_context_is_limited_to_the_student_and_course_teacher() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/voice-agent/update-context"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "updated",
            "knowledge_base_updated": true
        })))
        .expect(1)
        .mount(&server)
        .await;
    let app = app(&server).await;
    let classmate = Uuid::new_v4();
    app.store.insert_user(User {
        id: classmate,
        role: Role::Student,
        display_name: "Linus".to_string(),
        email: None,
    });
    let other_teacher = Uuid::new_v4();
    app.store.insert_user(User {
        id: other_teacher,
        role: Role::Teacher,
        display_name: "Barbara".to_string(),
        email: None,
    });

    let (_, course) = call(
        &app.router,
        json_request("POST", "/courses", app.teacher_id, json!({ "title": "CS101" })),
    )
    .await;
    let course_id = course["id"].as_str().unwrap().to_string();
    for student in [app.student_id, classmate] {
        let (status, _) = call(
            &app.router,
            json_request(
                "POST",
                "/enrollments",
                student,
                json!({ "student_id": student, "course_id": course_id }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    let uri = format!("/voice-agent/context/{}/{}", app.student_id, course_id);
    let (status, _) = call(&app.router, get(&uri, classmate)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app.router, get(&uri, other_teacher)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = call(&app.router, get(&uri, app.student_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["context"]["student"]["name"], "Grace");

    let knowledge = format!("/voice-agent/knowledge/{}/{}", app.student_id, course_id);
    let (status, _) = call(&app.router, get(&knowledge, classmate)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let push = |user: Uuid, student: Option<Uuid>| {
        json_request(
            "POST",
            "/voice-agent/update-context",
            user,
            json!({ "student_id": student, "course_id": course_id }),
        )
    };
    let (status, _) = call(&app.router, push(classmate, Some(app.student_id))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app.router, push(app.student_id, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = call(&app.router, push(app.student_id, Some(app.student_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["knowledge_base_updated"], true);
}

#[tokio::test]
async fn test_logout_ends_the_conversation_session() {
    let server = MockServer::start().await;
    let app = app(&server).await;

    let (status, thread) = call(
        &app.router,
        json_request("POST", "/threads", app.student_id, json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(thread["title"], "New Chat");

    let (status, _) = call(
        &app.router,
        json_request("POST", "/auth/logout", app.student_id, json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, threads) = call(&app.router, get("/threads", app.student_id)).await;
    assert_eq!(threads["active_thread_id"], Value::Null);
    assert_eq!(threads["threads"].as_array().unwrap().len(), 1);
}
