// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, attempt, auth, olympiad, question, review},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware, staff_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, olympiads, questions, review, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (pool, config, session store).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let olympiad_routes = Router::new()
        .route("/", get(olympiad::list_olympiads))
        .route("/{id}", get(olympiad::get_olympiad))
        // Protected attempt routes
        .merge(
            Router::new()
                .route(
                    "/{id}/attempt",
                    post(attempt::start_attempt).get(attempt::get_attempt),
                )
                .route("/{id}/attempt/answer", post(attempt::record_answer))
                .route("/{id}/attempt/advance", post(attempt::advance))
                .route("/{id}/attempt/submit", post(attempt::submit_attempt))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    let question_routes = Router::new()
        .route(
            "/",
            post(question::create_question).get(question::list_questions),
        )
        .layer(middleware::from_fn(staff_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let review_routes = Router::new()
        .route("/pending", get(review::list_pending))
        .route("/attempts/{id}", get(review::get_attempt_review))
        .route("/answers/{id}/score", post(review::add_manual_score))
        .layer(middleware::from_fn(staff_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users).post(admin::create_user))
        .route(
            "/users/{id}",
            put(admin::update_user).delete(admin::delete_user),
        )
        .route(
            "/questions/{id}",
            put(question::update_question).delete(question::delete_question),
        )
        .route(
            "/packages",
            get(admin::list_packages).post(admin::create_package),
        )
        .route(
            "/packages/{id}",
            get(admin::get_package)
                .put(admin::update_package)
                .delete(admin::delete_package),
        )
        .route("/packages/{id}/reorder", put(admin::reorder_package))
        .route("/olympiads", post(admin::create_olympiad))
        .route(
            "/olympiads/{id}",
            put(admin::update_olympiad).delete(admin::delete_olympiad),
        )
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/olympiads", olympiad_routes)
        .nest("/api/questions", question_routes)
        .nest("/api/review", review_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
