#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::{
    async_trait,
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use http_body_util::BodyExt;
use rms_server::{
    build_router,
    config::Config,
    db::Database,
    services::{
        clock::ManualClock,
        notifier::{Notification, Notifier},
    },
    AppState,
};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const PASSWORD: &str = "anchors-away";

/// Keeps every notification it is asked to deliver, optionally failing.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.fail {
            anyhow::bail!("mail server unreachable");
        }
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(Config::for_tests(), false).await
    }

    pub async fn with_config(config: Config) -> Self {
        Self::build(config, false).await
    }

    pub async fn with_failing_mail() -> Self {
        Self::build(Config::for_tests(), true).await
    }

    async fn build(config: Config, fail_mail: bool) -> Self {
        let db = Database::connect(&config.database_url).await.unwrap();
        db.run_migrations().await.unwrap();

        // Tokens are checked against the real time, so start from it.
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let notifier = Arc::new(RecordingNotifier {
            fail: fail_mail,
            ..Default::default()
        });

        let state = AppState::new(db, config, notifier.clone()).with_clock(clock.clone());

        Self {
            router: build_router(state.clone()),
            state,
            clock,
            notifier,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, body)
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.send(json_request(method, uri, token, body, None)).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.json(Method::GET, uri, token, None).await
    }

    /// Registers an account and returns its JSON representation.
    pub async fn register(&self, username: &str, role: &str) -> Value {
        let (status, body) = self
            .json(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": PASSWORD,
                    "role": role,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        body["data"]["user"].clone()
    }

    pub async fn login(&self, username: &str) -> String {
        let (status, body) = self
            .json(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({
                    "email": format!("{username}@example.com"),
                    "password": PASSWORD,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["data"]["token"].as_str().unwrap().to_string()
    }

    /// Registers `username` with `role` and logs in.
    pub async fn token_for(&self, username: &str, role: &str) -> String {
        self.register(username, role).await;
        self.login(username).await
    }
}

/// A JSON request, optionally authenticated and arriving from `peer`.
pub fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
    peer: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let mut request = builder.body(body).unwrap();
    if let Some(peer) = peer {
        let addr: SocketAddr = peer.parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
    }
    request
}

pub struct FilePart<'a> {
    pub name: &'a str,
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub bytes: &'a [u8],
}

/// A `multipart/form-data` request with text fields and an optional file.
pub fn multipart_request(
    method: Method,
    uri: &str,
    token: &str,
    fields: &[(&str, &str)],
    file: Option<FilePart<'_>>,
) -> Request<Body> {
    const BOUNDARY: &str = "----rms-test-boundary";

    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(file) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                file.name, file.file_name, file.content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(file.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn project_json(name: &str) -> Value {
    json!({
        "name": name,
        "description": "Full hull survey and antifouling",
        "client": "Blue Line Ferries",
        "startDate": "2024-03-01",
        "endDate": "2024-04-15",
    })
}
