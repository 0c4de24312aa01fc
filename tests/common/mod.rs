#![allow(dead_code)]

use agora::config::rate_limit::RateLimitConfig;
use agora::services::{email::EmailService, session::SessionStore, upload::UploadConfig};
use reqwest::{Client, StatusCode};
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use sea_orm_migration::MigratorTrait;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use tokio::sync::OnceCell;

static INIT: Once = Once::new();
static SCHEMA_READY: OnceCell<()> = OnceCell::const_new();
static COUNTER: AtomicUsize = AtomicUsize::new(0);

pub const PASSWORD: &str = "Secret123";

fn init_env() {
    INIT.call_once(|| {
        dotenv::dotenv().ok();
        std::env::set_var("BCRYPT_COST", "4");
        std::env::set_var("UPLOAD_DIR", "./test_uploads");
    });
}

/// Unique suffix for usernames, emails and category names.
pub fn unique(prefix: &str) -> String {
    format!("{}_{}_{}", prefix, std::process::id(), COUNTER.fetch_add(1, Ordering::SeqCst))
}

pub struct TestApp {
    pub addr: String,
    pub db: DatabaseConnection,
}

pub struct TestUser {
    pub id: i32,
    pub username: String,
    pub client: Client,
}

impl TestApp {
    pub fn api(&self, group: &str, action: &str) -> String {
        format!("{}/api/{}?action={}", self.addr, group, action)
    }

    /// A fresh client with its own cookie jar.
    pub fn client(&self) -> Client {
        Client::builder()
            .cookie_store(true)
            .build()
            .expect("Failed to build client")
    }

    pub async fn exec(&self, sql: &str, values: Vec<sea_orm::Value>) {
        self.db
            .execute(Statement::from_sql_and_values(
                sea_orm::DatabaseBackend::Postgres,
                sql,
                values,
            ))
            .await
            .unwrap_or_else(|e| panic!("SQL failed: {sql}: {e}"));
    }

    pub async fn scalar(&self, sql: &str, values: Vec<sea_orm::Value>) -> i64 {
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                sea_orm::DatabaseBackend::Postgres,
                sql,
                values,
            ))
            .await
            .expect("query failed")
            .expect("no row");
        row.try_get_by_index::<i64>(0).expect("not an integer")
    }

    /// Registers and logs in a regular user.
    pub async fn user(&self, prefix: &str) -> TestUser {
        let username = unique(prefix);
        let client = self.client();

        let (status, body) = send(client.post(self.api("auth", "register")).json(&json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": PASSWORD,
        })))
        .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        let id = body["data"]["id"].as_i64().expect("missing user id") as i32;

        self.login(&client, &username).await;
        TestUser {
            id,
            username,
            client,
        }
    }

    /// Registers a user, promotes it in SQL, then logs in so the session
    /// carries the admin role.
    pub async fn admin(&self) -> TestUser {
        let username = unique("admin");
        let client = self.client();
        let (status, body) = send(client.post(self.api("auth", "register")).json(&json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": PASSWORD,
        })))
        .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        let id = body["data"]["id"].as_i64().expect("missing user id") as i32;

        self.exec(
            "UPDATE users SET role = 'admin' WHERE id = $1",
            vec![id.into()],
        )
        .await;
        self.login(&client, &username).await;
        TestUser {
            id,
            username,
            client,
        }
    }

    pub async fn login(&self, client: &Client, username: &str) {
        let (status, body) = send(client.post(self.api("auth", "login")).json(&json!({
            "username": username,
            "password": PASSWORD,
        })))
        .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
    }

    pub async fn category(&self, admin: &TestUser) -> i32 {
        let (status, body) = send(
            admin
                .client
                .post(self.api("categories", "create"))
                .json(&json!({ "name": unique("Danh mục") })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "category failed: {body}");
        body["data"]["id"].as_i64().expect("missing category id") as i32
    }

    pub async fn post(&self, author: &TestUser, category_id: i32, title: &str) -> i32 {
        let (status, body) = send(author.client.post(self.api("posts", "create")).json(&json!({
            "title": title,
            "content": "Nội dung **markdown**",
            "category_id": category_id,
        })))
        .await;
        assert_eq!(status, StatusCode::CREATED, "post failed: {body}");
        body["data"]["post_id"].as_i64().expect("missing post_id") as i32
    }

    pub async fn product(&self, owner: &TestUser, category_id: i32) -> i32 {
        let (status, body) = send(owner.client.post(self.api("products", "create")).json(&json!({
            "name": unique("Sản phẩm"),
            "description": "Mô tả",
            "price": "199000",
            "category_id": category_id,
        })))
        .await;
        assert_eq!(status, StatusCode::CREATED, "product failed: {body}");
        body["data"]["id"].as_i64().expect("missing product id") as i32
    }
}

/// Sends the request and returns the status with the parsed envelope.
pub async fn send(request: reqwest::RequestBuilder) -> (StatusCode, Value) {
    let resp = request.send().await.expect("request failed");
    let status = resp.status();
    let body = resp.json().await.unwrap_or(Value::Null);
    (status, body)
}

/// Migrates and empties the schema once per test binary, then serves the
/// real router on a random port.
pub async fn spawn_app() -> TestApp {
    init_env();

    let database_url = std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .expect("TEST_DATABASE_URL must be set");

    let db = sea_orm::Database::connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    SCHEMA_READY
        .get_or_init(|| async {
            agora::migration::Migrator::up(&db, None)
                .await
                .expect("Failed to run migrations");
            db.execute_unprepared(
                "TRUNCATE TABLE sessions, followers, reviews, comments, posts, products, \
                 categories, users RESTART IDENTITY CASCADE",
            )
            .await
            .expect("Failed to clean tables");
        })
        .await;

    let mut limits = RateLimitConfig::default();
    limits.enabled = false;
    let app = agora::routes::create_app("./test_uploads", &limits)
        .expect("Failed to build router")
        .layer(axum::extract::Extension(db.clone()))
        .layer(axum::extract::Extension(SessionStore::database(db.clone(), 3600)))
        .layer(axum::extract::Extension(EmailService::disabled()))
        .layer(axum::extract::Extension(UploadConfig {
            upload_dir: "./test_uploads".to_string(),
        }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestApp {
        addr: format!("http://{}", addr),
        db,
    }
}
