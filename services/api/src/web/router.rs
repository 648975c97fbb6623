//! services/api/src/web/router.rs
//!
//! Assembles the API routes. Everything except the health check requires a session.

use crate::web::middleware::require_session;
use crate::web::rest::{
    agent_health_handler, agent_status_handler, create_assignment_handler, create_course_handler,
    create_submission_handler, create_thread_handler, delete_assignment_handler,
    delete_course_handler, delete_submission_handler, delete_thread_handler, enroll_handler,
    get_context_handler, get_knowledge_handler, get_profile_handler, grade_submission_handler,
    list_messages_handler, list_threads_handler, logout_handler, select_thread_handler,
    send_message_handler, unenroll_handler, update_assignment_handler, update_context_handler,
    update_course_handler,
};
use crate::web::state::AppState;
use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

pub fn build_router(app_state: Arc<AppState>) -> Router {
    // Public routes (no session required)
    let public_routes = Router::new().route("/agent/health", get(agent_health_handler));

    // Protected routes (session required)
    let protected_routes = Router::new()
        .route("/profile", get(get_profile_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/threads", get(list_threads_handler).post(create_thread_handler))
        .route("/threads/{id}", axum::routing::delete(delete_thread_handler))
        .route("/threads/{id}/select", post(select_thread_handler))
        .route("/threads/{id}/messages", get(list_messages_handler))
        .route("/messages", post(send_message_handler))
        .route("/agent/status", get(agent_status_handler))
        .route("/courses", post(create_course_handler))
        .route(
            "/courses/{id}",
            put(update_course_handler).delete(delete_course_handler),
        )
        .route("/assignments", post(create_assignment_handler))
        .route(
            "/assignments/{id}",
            put(update_assignment_handler).delete(delete_assignment_handler),
        )
        .route("/submissions", post(create_submission_handler))
        .route("/submissions/{id}", axum::routing::delete(delete_submission_handler))
        .route("/submissions/{id}/grade", put(grade_submission_handler))
        .route("/enrollments", post(enroll_handler).delete(unenroll_handler))
        .route("/voice-agent/update-context", post(update_context_handler))
        .route(
            "/voice-agent/context/{student_id}/{course_id}",
            get(get_context_handler),
        )
        .route(
            "/voice-agent/knowledge/{student_id}/{course_id}",
            get(get_knowledge_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_session,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state)
}
