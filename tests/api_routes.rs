//! Router-level tests: every request goes through `build_router` with
//! in-memory backends.

#![allow(clippy::panic, clippy::indexing_slicing)]

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use chrono::{Duration, NaiveDate};
use serde_json::{Value, json};
use tower::ServiceExt;

use occasion_keeper::api::build_router;
use occasion_keeper::app_state::{AppState, Backends};
use occasion_keeper::config::AppConfig;
use occasion_keeper::mail::LogMailer;
use occasion_keeper::persistence::memory::MemoryStore;
use occasion_keeper::service::Passwords;
use occasion_keeper::storage::MemoryStorage;

const CRON_SECRET: &str = "cron-secret";
const PASSWORD: &str = "correct-horse";
const BOUNDARY: &str = "occasion-keeper-test-boundary";

struct TestApp {
    router: Router,
    mailer: Arc<LogMailer>,
    storage: Arc<MemoryStorage>,
    today: NaiveDate,
}

struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn app_with(cron_secret: Option<&str>) -> TestApp {
    let secret = cron_secret.map(str::to_string);
    let Ok(config) = AppConfig::from_lookup(|key| match key {
        "JWT_SECRET" => Some("test-jwt-secret".to_string()),
        "EMAIL_RETRY_DELAY_MS" => Some("0".to_string()),
        "PUBLIC_BASE_URL" => Some("https://cards.example.com".to_string()),
        "REMINDER_CRON_SECRET" => secret.clone(),
        _ => None,
    }) else {
        panic!("test configuration should load");
    };
    let mailer = Arc::new(LogMailer::new());
    let storage = Arc::new(MemoryStorage::new("event-media"));
    let backends = Backends {
        store: Arc::new(MemoryStore::new()),
        storage: Arc::clone(&storage) as _,
        mailer: Arc::clone(&mailer) as _,
        passwords: Passwords::low_cost(),
    };
    let state = AppState::new(&config, backends);
    TestApp {
        router: build_router().with_state(state),
        mailer,
        storage,
        today: config.calendar().today(),
    }
}

fn app() -> TestApp {
    app_with(Some(CRON_SECRET))
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> Response {
        let Ok(response) = self.router.clone().oneshot(request).await;
        let status = response.status();
        let headers = response.headers().clone();
        let Ok(body) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
            panic!("body should be readable");
        };
        Response {
            status,
            headers,
            body,
        }
    }

    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
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
        let Ok(request) = builder.body(body) else {
            panic!("request should build");
        };
        self.send(request).await
    }

    async fn upload(&self, uri: &str, token: &str, field: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Response {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        let Ok(request) = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
        else {
            panic!("request should build");
        };
        self.send(request).await
    }

    async fn trigger(&self, stage: &str, token: &str) -> Response {
        let Ok(request) = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/v1/jobs/{stage}"))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("token={token}")))
        else {
            panic!("request should build");
        };
        self.send(request).await
    }

    /// Registers, verifies and logs in `username`; returns the bearer token.
    async fn sign_up(&self, username: &str) -> String {
        let email = format!("{username}@example.com");
        let res = self
            .call(
                Method::POST,
                "/api/v1/auth/register",
                None,
                Some(json!({ "username": username, "email": email, "password": PASSWORD })),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "{}", res.text());

        let code = self.last_code_for(&email).await;
        let res = self
            .call(
                Method::POST,
                "/api/v1/auth/verify",
                None,
                Some(json!({ "email": email, "code": code })),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.text());

        let res = self
            .call(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(json!({ "username": username, "password": PASSWORD })),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.text());
        let Some(token) = res.json()["token"].as_str().map(str::to_string) else {
            panic!("login should return a token");
        };
        token
    }

    async fn last_code_for(&self, email: &str) -> String {
        let sent = self.mailer.sent().await;
        let Some(message) = sent.iter().rev().find(|m| m.to == email) else {
            panic!("no verification email for {email}");
        };
        let Some((_, rest)) = message.text.split_once("code is: ") else {
            panic!("verification email has no code");
        };
        rest.chars().take(6).collect()
    }

    async fn create_event(&self, token: &str, body: Value) -> Value {
        let res = self
            .call(Method::POST, "/api/v1/events", Some(token), Some(body))
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "{}", res.text());
        res.json()
    }
}

#[tokio::test]
async fn health_is_public() {
    let app = app();
    let res = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["status"], "healthy");
}

#[tokio::test]
async fn event_routes_require_a_bearer_token() {
    let app = app();
    let res = app.call(Method::GET, "/api/v1/events", None, None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.json()["error"]["code"], 1101);

    let res = app
        .call(Method::GET, "/api/v1/events", Some("not-a-jwt"), None)
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unverified_accounts_cannot_log_in() {
    let app = app();
    let res = app
        .call(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({ "username": "ravi", "email": "Ravi@Example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.json()["email"], "ravi@example.com");
    assert_eq!(res.json()["is_verified"], false);

    let res = app
        .call(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "ravi@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = app
        .call(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({ "username": "ravi", "email": "other@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn repeated_bad_passwords_lock_the_account() {
    let app = app();
    app.sign_up("meera").await;
    for _ in 0..5 {
        let res = app
            .call(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(json!({ "username": "meera", "password": "wrong-password" })),
            )
            .await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    }
    let res = app
        .call(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "username": "meera", "password": PASSWORD })),
        )
        .await;
    assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn profile_updates_notification_preference() {
    let app = app();
    let token = app.sign_up("kiran").await;
    let res = app
        .call(
            Method::PUT,
            "/api/v1/profile",
            Some(&token),
            Some(json!({ "notification_email": false })),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["notification_email"], false);

    let res = app.call(Method::GET, "/api/v1/profile", Some(&token), None).await;
    assert_eq!(res.json()["username"], "kiran");
    assert_eq!(res.json()["notification_email"], false);
}

#[tokio::test]
async fn events_are_private_to_their_owner() {
    let app = app();
    let asha = app.sign_up("asha").await;
    let bala = app.sign_up("bala").await;
    let date = app.today + Duration::days(30);
    let event = app
        .create_event(
            &asha,
            json!({ "name": "Asha Rao", "event_type": "birthday", "date": date }),
        )
        .await;
    assert_eq!(event["is_recurring"], true);
    assert_eq!(event["remind_days_before"], 1);
    let uri = format!("/api/v1/events/{}", event["id"].as_str().unwrap_or_default());

    let res = app.call(Method::GET, &uri, Some(&bala), None).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = app.call(Method::GET, "/api/v1/events", Some(&bala), None).await;
    assert_eq!(res.json().as_array().map(Vec::len), Some(0));

    let res = app.call(Method::GET, &uri, Some(&asha), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["event"]["name"], "Asha Rao");
    assert_eq!(res.json()["media"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn event_rules_are_enforced_on_create_and_toggle() {
    let app = app();
    let token = app.sign_up("devi").await;
    let res = app
        .call(
            Method::POST,
            "/api/v1/events",
            Some(&token),
            Some(json!({
                "name": "Old",
                "event_type": "birthday",
                "date": app.today - Duration::days(1),
            })),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.json()["error"]["details"], "date");

    let res = app
        .call(
            Method::POST,
            "/api/v1/events",
            Some(&token),
            Some(json!({
                "name": "Party",
                "event_type": "other",
                "date": app.today + Duration::days(3),
            })),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.json()["error"]["details"], "custom_label");

    let event = app
        .create_event(
            &token,
            json!({
                "name": "Party",
                "event_type": "other",
                "custom_label": "Housewarming",
                "date": app.today + Duration::days(3),
            }),
        )
        .await;
    assert_eq!(event["occasion"], "Housewarming");
    let uri = format!(
        "/api/v1/events/{}/recurring",
        event["id"].as_str().unwrap_or_default()
    );
    let res = app.call(Method::POST, &uri, Some(&token), None).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upcoming_list_sorts_and_hides_archived() {
    let app = app();
    let token = app.sign_up("farah").await;
    let later = app
        .create_event(
            &token,
            json!({ "name": "Aarav", "event_type": "birthday", "date": app.today + Duration::days(20) }),
        )
        .await;
    app.create_event(
        &token,
        json!({ "name": "Zoya", "event_type": "anniversary", "date": app.today + Duration::days(2) }),
    )
    .await;

    let res = app.call(Method::GET, "/api/v1/events", Some(&token), None).await;
    assert_eq!(res.json()[0]["name"], "Zoya");
    let res = app
        .call(Method::GET, "/api/v1/events?sort_by=name", Some(&token), None)
        .await;
    assert_eq!(res.json()[0]["name"], "Aarav");

    let uri = format!(
        "/api/v1/events/{}/archive",
        later["id"].as_str().unwrap_or_default()
    );
    let res = app.call(Method::POST, &uri, Some(&token), None).await;
    assert_eq!(res.json()["is_archived"], true);
    let res = app.call(Method::GET, "/api/v1/events", Some(&token), None).await;
    assert_eq!(res.json().as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn media_upload_feeds_card_pages_and_shares() {
    let app = app();
    let token = app.sign_up("gita").await;
    let event = app
        .create_event(
            &token,
            json!({ "name": "Gita Menon", "event_type": "birthday", "date": app.today + Duration::days(5) }),
        )
        .await;
    let event_id = event["id"].as_str().unwrap_or_default().to_string();

    let res = app
        .upload(
            &format!("/api/v1/events/{event_id}/media"),
            &token,
            "media_files",
            "cake.png",
            "image/png",
            &[0x89, b'P', b'N', b'G'],
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED, "{}", res.text());
    let media_id = res.json()["media"][0]["id"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    assert_eq!(app.storage.len().await, 1);

    let res = app
        .upload(
            &format!("/api/v1/events/{event_id}/media"),
            &token,
            "media_files",
            "notes.txt",
            "text/plain",
            b"hello",
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    // First view creates the welcome page.
    let res = app
        .call(Method::GET, &format!("/api/v1/events/{event_id}/card"), Some(&token), None)
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["pages"].as_array().map(Vec::len), Some(1));

    let res = app
        .call(
            Method::PUT,
            &format!("/api/v1/events/{event_id}/card/pages/2"),
            Some(&token),
            Some(json!({ "image_id": media_id, "caption": "  Cake time  " })),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.text());
    assert_eq!(res.json()["caption"], "Cake time");

    let res = app
        .call(
            Method::PUT,
            &format!("/api/v1/events/{event_id}/card/pages/2"),
            Some(&token),
            Some(json!({ "audio_id": media_id })),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app
        .call(
            Method::POST,
            &format!("/api/v1/events/{event_id}/card/password"),
            Some(&token),
            Some(json!({ "password": "  GITA " })),
        )
        .await;
    assert_eq!(res.json()["valid"], true);

    let res = app
        .call(
            Method::POST,
            &format!("/api/v1/events/{event_id}/shares"),
            Some(&token),
            Some(json!({ "password": "sesame", "recipient_email": "friend@example.com" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    let share = res.json();
    assert_eq!(share["protected"], true);
    assert_eq!(share["emailed"], true);
    let share_token = share["token"].as_str().unwrap_or_default().to_string();
    assert_eq!(
        share["url"],
        format!("https://cards.example.com/share/{share_token}")
    );

    let res = app
        .call(Method::GET, &format!("/share/{share_token}"), None, None)
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = app
        .call(
            Method::POST,
            &format!("/share/{share_token}/unlock"),
            None,
            Some(json!({ "password": "wrong" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = app
        .call(
            Method::POST,
            &format!("/share/{share_token}/unlock"),
            None,
            Some(json!({ "password": "sesame" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.text());
    let card = res.json();
    assert_eq!(card["card"]["name"], "Gita Menon");
    assert_eq!(card["card"]["pages"].as_array().map(Vec::len), Some(2));
    assert!(card["card"]["pages"][1]["image_url"].is_string());

    let res = app
        .call(Method::GET, &format!("/share/{}", uuid::Uuid::new_v4()), None, None)
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_an_event_removes_its_media() {
    let app = app();
    let token = app.sign_up("hari").await;
    let event = app
        .create_event(
            &token,
            json!({ "name": "Hari", "event_type": "birthday", "date": app.today + Duration::days(5) }),
        )
        .await;
    let event_id = event["id"].as_str().unwrap_or_default().to_string();
    let res = app
        .upload(
            &format!("/api/v1/events/{event_id}/media"),
            &token,
            "media_files",
            "song.mp3",
            "audio/mpeg",
            b"ID3",
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED);

    app.storage.fail_removals(true);
    let uri = format!("/api/v1/events/{event_id}");
    let res = app.call(Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(res.status, StatusCode::BAD_GATEWAY);
    let res = app.call(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(res.status, StatusCode::OK);

    app.storage.fail_removals(false);
    let res = app.call(Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(res.status, StatusCode::NO_CONTENT);
    assert!(app.storage.is_empty().await);
    let res = app.call(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn csv_import_reports_rejected_rows() {
    let app = app();
    let token = app.sign_up("isha").await;
    let good = app.today + Duration::days(40);
    let csv = format!(
        "name,event_type,date,remind_days_before,message,custom_label,is_recurring\n\
         Isha,birthday,{good},2,Call early,,true\n\
         Nope,birthday,not-a-date,1,,,\n\
         Fest,other,{good},1,,,\n"
    );
    let res = app
        .upload(
            "/api/v1/imports",
            &token,
            "file",
            "events.csv",
            "text/csv",
            csv.as_bytes(),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED, "{}", res.text());
    let log = res.json();
    assert_eq!(log["success_count"], 1);
    assert_eq!(log["failure_count"], 2);
    assert!(
        log["errors"][0]
            .as_str()
            .is_some_and(|e| e.starts_with("Row 3"))
    );

    let res = app.call(Method::GET, "/api/v1/events", Some(&token), None).await;
    assert_eq!(res.json().as_array().map(Vec::len), Some(1));

    let res = app
        .upload("/api/v1/imports", &token, "file", "events.txt", "text/plain", csv.as_bytes())
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app
        .call(Method::GET, "/api/v1/imports/template", Some(&token), None)
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.text().starts_with("name,event_type,date"));
    assert!(
        res.headers
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("events_template.csv"))
    );
}

#[tokio::test]
async fn analytics_and_exports_are_csv_downloads() {
    let app = app();
    let token = app.sign_up("jaya").await;
    app.create_event(
        &token,
        json!({ "name": "Jaya", "event_type": "anniversary", "date": app.today + Duration::days(9) }),
    )
    .await;

    let res = app.call(Method::GET, "/api/v1/analytics", Some(&token), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["events"]["total"], 1);
    assert_eq!(res.json()["events"]["upcoming"], 1);

    let res = app
        .call(Method::GET, "/api/v1/analytics/report", Some(&token), None)
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.text().starts_with("Section,Metric,Value"));

    let res = app
        .call(Method::GET, "/api/v1/events/past/export", Some(&token), None)
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(
        res.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/csv"))
    );

    let res = app
        .call(
            Method::GET,
            &format!(
                "/api/v1/events/past?from={}&to={}",
                app.today,
                app.today - Duration::days(1)
            ),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn job_endpoints_need_the_cron_secret() {
    let app = app();
    let res = app.trigger("reminders", "wrong").await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = app.trigger("reminders", CRON_SECRET).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.text());
    assert_eq!(res.json()["due"], 0);

    let res = app.trigger("run-all", CRON_SECRET).await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.json()["media_cleanup"].is_object());

    let res = app.trigger("not-a-stage", CRON_SECRET).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn job_endpoints_are_disabled_without_a_secret() {
    let app = app_with(None);
    let res = app.trigger("reminders", "").await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn reminder_job_emails_due_events_once() {
    let app = app();
    let token = app.sign_up("lata").await;
    app.create_event(
        &token,
        json!({
            "name": "Lata",
            "event_type": "birthday",
            "date": app.today + Duration::days(1),
            "remind_days_before": 1,
        }),
    )
    .await;

    let res = app.trigger("reminders", CRON_SECRET).await;
    assert_eq!(res.json()["sent"], 1);
    let res = app.trigger("reminders", CRON_SECRET).await;
    assert_eq!(res.json()["sent"], 0);

    let reminders = app
        .mailer
        .sent()
        .await
        .into_iter()
        .filter(|m| m.to == "lata@example.com" && m.subject.contains("Lata"))
        .count();
    assert_eq!(reminders, 1);
}
