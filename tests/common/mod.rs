#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use campusgate::{
    ServerConfig,
    auth::FederatedVerifier,
    clock::ManualClock,
    create_app,
    db::Database,
    rate_limit::RateLimitConfig,
    realtime::ConnectionRegistry,
};
use chrono::Duration;
use tower::ServiceExt;

pub const PASSWORD: &str = "correct horse battery";

pub struct TestApp {
    pub router: Router,
    pub db: Database,
    pub clock: Arc<ManualClock>,
    pub registry: Arc<ConnectionRegistry>,
}

/// Credentials returned by signup or login.
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: String,
    /// `refreshToken=<signed>` ready for a Cookie header
    pub cookie: String,
    pub user_id: i64,
    pub username: String,
}

pub async fn setup() -> TestApp {
    setup_with_federated(None).await
}

pub async fn setup_with_federated(federated: Option<Arc<dyn FederatedVerifier>>) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let clock = Arc::new(ManualClock::starting_now());
    let registry = Arc::new(ConnectionRegistry::new());

    let config = ServerConfig {
        db: db.clone(),
        access_secret: b"integration-access-secret-0123456789".to_vec(),
        access_ttl: Duration::minutes(15),
        refresh_secret: b"integration-refresh-secret-0123456789".to_vec(),
        refresh_ttl: Duration::days(7),
        cookie_secret: b"integration-cookie-secret-0123456789".to_vec(),
        secure_cookies: false,
        bcrypt_cost: 4,
        federated,
        clock: clock.clone(),
        registry: registry.clone(),
        rate_limits: RateLimitConfig::with_limits(1000, 1000, 1000),
    };

    TestApp {
        router: create_app(&config),
        db,
        clock,
        registry,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed")
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response {
        self.send(json_request("POST", uri, body)).await
    }

    /// Sign up `email` with [`PASSWORD`] and return the issued credentials.
    pub async fn signup(&self, email: &str, name: &str) -> Session {
        let response = self
            .post_json(
                "/api/auth/signup",
                serde_json::json!({
                    "email": email,
                    "name": name,
                    "password": PASSWORD,
                    "organization": "State University",
                    "department": "Physics",
                    "academicYear": 2,
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "signup failed");
        session_from(response).await
    }

    /// GET `/api/auth/me` with the given credentials.
    pub async fn me(&self, access_token: Option<&str>, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().method("GET").uri("/api/auth/me");
        if let Some(token) = access_token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn refresh(&self, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().method("POST").uri("/api/auth/refresh");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn logout(&self, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().method("POST").uri("/api/auth/logout");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Attach bearer and cookie credentials to a JSON request.
pub fn authed_json_request(
    method: &str,
    uri: &str,
    session: &Session,
    body: serde_json::Value,
) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", session.access_token),
        )
        .header(header::COOKIE, &session.cookie)
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// The `Set-Cookie` header of a response, if any.
pub fn set_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .map(|v| v.to_str().unwrap().to_string())
}

/// Turn a token response into credentials for later requests.
pub async fn session_from(response: Response) -> Session {
    let cookie = set_cookie(&response).expect("missing Set-Cookie");
    let cookie = cookie.split(';').next().unwrap().to_string();
    assert!(cookie.starts_with("refreshToken="));

    let json = body_json(response).await;
    Session {
        access_token: json["accessToken"].as_str().unwrap().to_string(),
        cookie,
        user_id: json["user"]["id"].as_i64().unwrap(),
        username: json["user"]["username"].as_str().unwrap().to_string(),
    }
}
