use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::{self, AuthService};
use crate::error::AppResult;
use crate::middleware::create_cors_layer;
use crate::orders::{handlers as orders, OrderService};
use crate::shutdown::Shutdown;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub orders: Arc<OrderService>,
}

pub fn create_app(state: AppState, cors_allowed_origins: &[String]) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let protected = Router::new()
        .route(
            "/orders",
            post(orders::register_accrual_order).get(orders::list_accrual_orders),
        )
        .route("/balance", get(orders::get_balance))
        .route("/balance/withdraw", post(orders::withdraw))
        .route("/withdrawals", get(orders::list_withdrawals))
        .route_layer(from_fn_with_state(state.clone(), auth::jwt_auth));

    let user_api = Router::new()
        .route("/register", post(auth::handlers::register))
        .route("/login", post(auth::handlers::login))
        .merge(protected);

    let app = Router::new()
        .route("/health", get(health_check))
        .nest("/api/user", user_api)
        .layer(create_cors_layer(cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

/// GET /health
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Serves until `shutdown` fires, then drains in-flight requests.
pub async fn run_server(app: Router, bind_address: &str, mut shutdown: Shutdown) -> AppResult<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.recv().await })
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenConfig;
    use crate::ledger::memory::MemoryStore;
    use crate::ledger::models::OrderStatus;
    use crate::ledger::OrderStore;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        response::Response,
    };
    use rust_decimal_macros::dec;
    use tower::ServiceExt;

    fn app(store: &MemoryStore) -> (Router, Arc<AuthService>) {
        let store: Arc<dyn OrderStore> = Arc::new(store.clone());
        let auth = Arc::new(AuthService::new(
            store.clone(),
            TokenConfig {
                secret: "test-secret".to_string(),
                expires_in: chrono::Duration::minutes(5),
            },
        ));
        let state = AppState {
            auth: auth.clone(),
            orders: Arc::new(OrderService::new(store)),
        };
        (create_app(state, &[]), auth)
    }

    fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _) = app(&MemoryStore::new());

        let response = app
            .oneshot(request(Method::GET, "/health", None, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let (app, auth) = app(&MemoryStore::new());
        let credentials = json!({ "login": "alice", "password": "pw" });

        let response = app
            .clone()
            .oneshot(request(Method::POST, "/api/user/register", None, Some(credentials.clone())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let token = json_body(response).await["token"].as_str().unwrap().to_string();
        assert!(auth.verify_token(&token).is_ok());

        let response = app
            .clone()
            .oneshot(request(Method::POST, "/api/user/register", None, Some(credentials.clone())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(request(Method::POST, "/api/user/login", None, Some(credentials)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(request(
                Method::POST,
                "/api/user/login",
                None,
                Some(json!({ "login": "alice", "password": "nope" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_rejects_empty_fields() {
        let (app, _) = app(&MemoryStore::new());

        let response = app
            .oneshot(request(
                Method::POST,
                "/api/user/register",
                None,
                Some(json!({ "login": "", "password": "pw" })),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        let (app, _) = app(&MemoryStore::new());

        for uri in ["/api/user/orders", "/api/user/balance", "/api/user/withdrawals"] {
            let response = app
                .clone()
                .oneshot(request(Method::GET, uri, None, None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }

        let response = app
            .oneshot(request(Method::GET, "/api/user/orders", Some("garbage"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_accrual_order_upload_flow() {
        let store = MemoryStore::new();
        let alice = store.seed_user("alice", None).await;
        let bob = store.seed_user("bob", None).await;
        let (app, auth) = app(&store);
        let alice_token = auth.issue_token(alice.id).unwrap().token;
        let bob_token = auth.issue_token(bob.id).unwrap().token;
        let upload = json!({ "order_id": "12345678903" });

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/api/user/orders", Some(&alice_token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .clone()
            .oneshot(request(Method::POST, "/api/user/orders", Some(&alice_token), Some(upload.clone())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = app
            .clone()
            .oneshot(request(Method::POST, "/api/user/orders", Some(&alice_token), Some(upload.clone())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(request(Method::POST, "/api/user/orders", Some(&bob_token), Some(upload)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/api/user/orders",
                Some(&alice_token),
                Some(json!({ "order_id": "12ab" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = app
            .oneshot(request(Method::GET, "/api/user/orders", Some(&alice_token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body[0]["number"], "12345678903");
        assert_eq!(body[0]["status"], "NEW");
        assert!(body[0].get("accrual").is_none());
    }

    #[tokio::test]
    async fn test_balance_and_withdrawals() {
        let store = MemoryStore::new();
        let alice = store.seed_user("alice", Some(dec!(500))).await;
        store.seed_order(alice.id, "1", OrderStatus::Processed).await;
        let (app, auth) = app(&store);
        let token = auth.issue_token(alice.id).unwrap().token;

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/api/user/withdrawals", Some(&token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/api/user/balance/withdraw",
                Some(&token),
                Some(json!({ "order": "2377225624", "sum": 751 })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/api/user/balance/withdraw",
                Some(&token),
                Some(json!({ "order": "2377225624", "sum": 100 })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/api/user/balance", Some(&token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["current"].as_f64(), Some(400.0));
        assert_eq!(body["withdrawn"].as_f64(), Some(100.0));

        let response = app
            .oneshot(request(Method::GET, "/api/user/withdrawals", Some(&token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body[0]["order"], "2377225624");
        assert_eq!(body[0]["sum"].as_f64(), Some(100.0));
    }
}
