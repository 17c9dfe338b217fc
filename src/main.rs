mod auth;
mod config;
mod db;
mod error;
mod gateway;
mod handlers;
mod lifecycle;
mod models;
mod notify;
mod state;

use axum::extract::MatchedPath;
use axum::http::{header, header::HeaderName, Method, StatusCode};
use axum::routing::{get, patch, post};
use axum::Router;
use config::Config;
use gateway::Gateway;
use lifecycle::Lifecycle;
use notify::Notifier;
use state::AppState;
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let pool = match db::connect(&cfg.db_url).await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "db connect failed");
            std::process::exit(2);
        }
    };
    if let Err(e) = db::ensure_schema(&pool, &cfg.db_schema).await {
        tracing::error!(error = %e, "db ensure_schema failed");
        std::process::exit(2);
    }

    let http = match reqwest::Client::builder()
        .timeout(Duration::from_secs(20))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "http client init failed");
            std::process::exit(2);
        }
    };

    let engine = Lifecycle::new(pool.clone(), cfg.db_schema.clone());
    let notifier = Notifier::new(
        cfg.notify_base_url.clone(),
        cfg.notify_from.clone(),
        cfg.notify_token.clone(),
        http.clone(),
    );
    let gateway = match (
        cfg.gateway_base_url.clone(),
        cfg.gateway_key_id.clone(),
        cfg.gateway_key_secret.clone(),
    ) {
        (Some(base), Some(key_id), Some(key_secret)) => {
            Some(Gateway::new(base, key_id, key_secret, http.clone()))
        }
        _ => None,
    };

    let state = AppState {
        pool,
        db_schema: cfg.db_schema.clone(),
        env_name: cfg.env_name.clone(),
        jwt_secret: cfg.jwt_secret.clone(),
        engine,
        notifier,
        gateway,
        gateway_provider: cfg.gateway_provider.clone(),
    };

    let api = Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/me", get(handlers::me))
        .route("/auth/password/forgot", post(handlers::forgot_password))
        .route("/auth/password/reset", post(handlers::reset_password))
        .route(
            "/bookings/after-payment",
            post(handlers::create_booking_after_payment),
        )
        .route("/bookings/my", get(handlers::my_bookings))
        .route("/payments/create-order", post(handlers::create_order))
        .route("/payments/verify-and-book", post(handlers::verify_and_book))
        .route("/admin/me", get(handlers::admin_me))
        .route("/admin/bookings", get(handlers::admin_list_bookings))
        .route(
            "/admin/bookings/:booking_id",
            get(handlers::admin_booking_ticket),
        )
        .route(
            "/admin/bookings/:booking_id/assign-taxi",
            post(handlers::admin_assign_taxi),
        )
        .route(
            "/admin/bookings/:booking_id/status",
            patch(handlers::admin_update_status),
        )
        .route(
            "/admin/bookings/:booking_id/complete",
            post(handlers::admin_complete_trip),
        )
        .route(
            "/admin/bookings/:booking_id/cancel",
            post(handlers::admin_cancel_booking),
        )
        .route(
            "/admin/bookings/:booking_id/notes",
            get(handlers::admin_list_notes).post(handlers::admin_add_note),
        )
        .route(
            "/admin/history/completed",
            get(handlers::admin_completed_history),
        )
        .route(
            "/admin/history/cancelled",
            get(handlers::admin_cancelled_history),
        )
        .route(
            "/admin/pending-payments",
            get(handlers::admin_pending_payments),
        )
        .route(
            "/admin/maintenance/clean-bookings",
            post(handlers::admin_clean_bookings),
        )
        .route("/fleet/public", get(handlers::fleet_public_list))
        .route(
            "/fleet",
            get(handlers::fleet_list).post(handlers::fleet_create),
        )
        .route(
            "/fleet/:vehicle_id",
            get(handlers::fleet_get)
                .put(handlers::fleet_update)
                .delete(handlers::fleet_delete),
        );

    let cors = if cfg.allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers(cors_allowed_headers())
            .allow_credentials(false)
    } else {
        let origins: Vec<axum::http::HeaderValue> = cfg
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers(cors_allowed_headers())
            // Bearer-token API, no cookies or session credentials.
            .allow_credentials(false)
            .allow_origin(AllowOrigin::list(origins))
    };

    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(api)
        .fallback(|| async { StatusCode::NOT_FOUND })
        .with_state(state)
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(cfg.max_body_bytes))
        // Avoid logging sensitive query parameters. We log the matched route
        // template when available, otherwise just the path (no query string).
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(MatchedPath::as_str)
                    .unwrap_or_else(|| req.uri().path());
                tracing::span!(
                    tracing::Level::INFO,
                    "http_request",
                    method = %req.method(),
                    path = %path
                )
            }),
        );

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], cfg.port)));
    tracing::info!(%addr, "starting taxi_service");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

fn cors_allowed_headers() -> Vec<HeaderName> {
    vec![
        header::ACCEPT,
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        HeaderName::from_static("x-request-id"),
    ]
}

#[cfg(test)]
mod router_fallback_tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn ok_handler() -> &'static str {
        "ok"
    }

    #[tokio::test]
    async fn unknown_routes_return_404() {
        let app = Router::new()
            .route("/health", get(ok_handler))
            .fallback(|| async { StatusCode::NOT_FOUND });

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/does_not_exist")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn cors_whitelist_excludes_proxy_headers() {
        let headers = cors_allowed_headers();
        let has = |name: &str| {
            headers
                .iter()
                .any(|h| h.as_str().eq_ignore_ascii_case(name))
        };

        assert!(has("content-type"));
        assert!(has("authorization"));
        assert!(has("x-request-id"));

        assert!(!has("x-forwarded-for"));
        assert!(!has("x-forwarded-host"));
        assert!(!has("x-real-ip"));
        assert!(!has("cookie"));
    }
}
