use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use forkful::config::{AggregateScope, Config};
use forkful::db;
use forkful::routes;
use forkful::state::AppState;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

/// A router over a fresh database and upload directory.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _dir: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub cookie: Option<String>,
    pub location: Option<String>,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("Response body should be JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_scope(AggregateScope::All)
    }

    pub fn with_scope(scope: AggregateScope) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = Config::default();
        config.resolve_paths(dir.path());
        config.auth.bcrypt_cost = 4;
        config.reviews.aggregate_scope = scope;
        std::fs::create_dir_all(config.uploads_path()).expect("Failed to create uploads dir");

        let pool = db::create_pool(&config.db_path()).expect("Failed to create test database");
        db::run_migrations(&pool).expect("Failed to run migrations");

        let state = AppState::new(pool, config);
        Self {
            router: routes::router(state.clone()),
            state,
            _dir: dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Router should not fail");
        let status = response.status();
        let header_value = |name| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let cookie = header_value(header::SET_COOKIE)
            .and_then(|c| c.split(';').next().map(str::to_string));
        let location = header_value(header::LOCATION);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body")
            .to_vec();
        TestResponse {
            status,
            cookie,
            location,
            body,
        }
    }

    pub async fn json(
        &self,
        method: &str,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        };
        self.send(request.expect("Invalid request")).await
    }

    pub async fn form(&self, uri: &str, cookie: Option<&str>, body: &str) -> TestResponse {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).expect("Invalid request"))
            .await
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.json("GET", uri, cookie, None).await
    }

    /// Register through the API and return the session cookie and user id.
    pub async fn register(&self, name: &str, email: &str) -> (String, String) {
        let response = self
            .json(
                "POST",
                "/api/auth/register",
                None,
                Some(serde_json::json!({
                    "name": name,
                    "email": email,
                    "password": "correct-horse",
                    "password_confirmation": "correct-horse",
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());
        let id = response.json()["data"]["id"]
            .as_str()
            .expect("User id")
            .to_string();
        (response.cookie.expect("Session cookie"), id)
    }

    /// Register a user and promote them to admin.
    pub async fn admin(&self) -> (String, String) {
        let (cookie, id) = self.register("Ada Admin", "admin@example.com").await;
        let conn = self.state.db.get().expect("Failed to get connection");
        conn.execute(
            "UPDATE users SET role = 'admin', is_admin = 1 WHERE id = ?1",
            rusqlite::params![id],
        )
        .expect("Failed to promote admin");
        (cookie, id)
    }

    pub async fn create_restaurant(&self, admin_cookie: &str, name: &str) -> String {
        let response = self
            .json(
                "POST",
                "/api/admin/restaurants",
                Some(admin_cookie),
                Some(serde_json::json!({
                    "name": name,
                    "cuisine": "Italian",
                    "price_range": "$$",
                    "location": "Lisbon",
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());
        response.json()["data"]["id"]
            .as_str()
            .expect("Restaurant id")
            .to_string()
    }

    pub async fn submit_review(&self, cookie: &str, restaurant_id: &str) -> String {
        let response = self
            .json(
                "POST",
                &format!("/api/restaurants/{}/reviews", restaurant_id),
                Some(cookie),
                Some(serde_json::json!({
                    "food_rating": 5,
                    "service_rating": 4,
                    "ambiance_rating": 4,
                    "value_rating": 3,
                    "title": "Lovely dinner",
                    "content": "The pasta was fresh and the staff were attentive.",
                    "recommend": true,
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());
        response.json()["data"]["id"]
            .as_str()
            .expect("Review id")
            .to_string()
    }
}
