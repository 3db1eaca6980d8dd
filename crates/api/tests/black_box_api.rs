use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use datalink_api::app::{build_app, services::AppServices};
use datalink_auth::JwtClaims;
use datalink_core::UserId;
use datalink_infra::seed::ensure_defaults;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

const JWT_SECRET: &str = "test-secret";
const ADMIN_PASSWORD: &str = "admin-pass";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory storage, bound to an ephemeral port.
        let services = AppServices::in_memory(JWT_SECRET);
        ensure_defaults(&*services.store, Some(ADMIN_PASSWORD))
            .await
            .expect("seeding failed");
        let app = build_app(Arc::new(services));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn login(&self, username: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/users/token"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .unwrap()
    }

    async fn token(&self, username: &str, password: &str) -> String {
        let res = self.login(username, password).await;
        assert_eq!(res.status(), StatusCode::OK, "login as {username} failed");
        let body: Value = res.json().await.unwrap();
        body["access_token"].as_str().unwrap().to_string()
    }

    async fn get(&self, token: &str, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).bearer_auth(token).send().await.unwrap()
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn put(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn delete(&self, token: &str, path: &str) -> reqwest::Response {
        self.client.delete(self.url(path)).bearer_auth(token).send().await.unwrap()
    }

    /// Create a user holding the named default role and return its id and token.
    async fn user_with_role(&self, admin: &str, name: &str, role: &str) -> (i64, String) {
        let roles: Value = self.get(admin, "/simple-roles").await.json().await.unwrap();
        let role_id = roles
            .as_array()
            .unwrap()
            .iter()
            .find(|r| r["name"] == role)
            .map(|r| r["id"].clone())
            .expect("default role missing");

        let res = self
            .post(
                admin,
                "/users",
                json!({ "name": name, "password": "pw-123456", "role_ids": [role_id] }),
            )
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = res.json().await.unwrap();
        let id = body["id"].as_i64().unwrap();
        (id, self.token(name, "pw-123456").await)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(user_id: i64, issued_at: chrono::DateTime<Utc>, ttl: ChronoDuration) -> String {
    let claims = JwtClaims {
        sub: UserId::new(user_id),
        name: "someone".to_string(),
        issued_at,
        expires_at: issued_at + ttl,
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

// ─── authentication ───

#[tokio::test]
async fn health_is_public_and_tagged_with_request_id() {
    let srv = TestServer::spawn().await;
    let res = srv
        .client
        .get(srv.url("/health"))
        .header("x-request-id", "abc-123")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-request-id"], "abc-123");
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/users/me")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthenticated");

    let res = srv.get("not-a-jwt", "/users/me").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_issues_bearer_token() {
    let srv = TestServer::spawn().await;

    let res = srv.login("admin", "wrong").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let res = srv.login("nobody", ADMIN_PASSWORD).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv.login("admin", ADMIN_PASSWORD).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["user_name"], "admin");
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "super_admin"));

    let token = body["access_token"].as_str().unwrap();
    let me: Value = srv.get(token, "/users/me").await.json().await.unwrap();
    assert_eq!(me["user_name"], "admin");
    assert_eq!(me["is_active"], true);
}

#[tokio::test]
async fn expired_and_orphaned_tokens_are_rejected() {
    let srv = TestServer::spawn().await;
    let admin = srv.token("admin", ADMIN_PASSWORD).await;
    let me: Value = srv.get(&admin, "/users/me").await.json().await.unwrap();
    let admin_id = me["user_id"].as_i64().unwrap();

    let expired = mint_jwt(admin_id, Utc::now() - ChronoDuration::hours(3), ChronoDuration::minutes(10));
    assert_eq!(srv.get(&expired, "/users/me").await.status(), StatusCode::UNAUTHORIZED);

    let unknown = mint_jwt(9_999, Utc::now(), ChronoDuration::minutes(10));
    assert_eq!(srv.get(&unknown, "/users/me").await.status(), StatusCode::UNAUTHORIZED);

    let valid = mint_jwt(admin_id, Utc::now(), ChronoDuration::minutes(10));
    assert_eq!(srv.get(&valid, "/users/me").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn deactivated_user_loses_access_immediately() {
    let srv = TestServer::spawn().await;
    let admin = srv.token("admin", ADMIN_PASSWORD).await;
    let (id, token) = srv.user_with_role(&admin, "operator", "user").await;
    assert_eq!(srv.get(&token, "/users/me").await.status(), StatusCode::OK);

    let res = srv.put(&admin, &format!("/users/{id}"), json!({ "is_active": false })).await;
    assert_eq!(res.status(), StatusCode::OK);

    assert_eq!(srv.get(&token, "/users/me").await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(srv.login("operator", "pw-123456").await.status(), StatusCode::UNAUTHORIZED);
}

// ─── per-role authorization ───

#[tokio::test]
async fn read_only_role_can_read_but_not_write() {
    let srv = TestServer::spawn().await;
    let admin = srv.token("admin", ADMIN_PASSWORD).await;
    let (_, reader) = srv.user_with_role(&admin, "reader", "user").await;

    assert_eq!(srv.get(&reader, "/qa").await.status(), StatusCode::OK);
    assert_eq!(srv.get(&reader, "/events").await.status(), StatusCode::OK);
    assert_eq!(srv.get(&reader, "/maint/metrics").await.status(), StatusCode::OK);

    let res = srv
        .post(
            &reader,
            "/qa",
            json!({ "line": "L1", "day": 3, "month": 5, "year": 2024, "value": 2.0 }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");

    let res = srv.post(&reader, "/departments", json!({ "name": "Quality" })).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let res = srv.post(&reader, "/roles", json!({ "name": "custom" })).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn system_admin_manages_users_but_not_plant_data() {
    let srv = TestServer::spawn().await;
    let admin = srv.token("admin", ADMIN_PASSWORD).await;
    let (_, sysadmin) = srv.user_with_role(&admin, "sysadmin", "system_admin").await;

    let res = srv.post(&sysadmin, "/departments", json!({ "name": "Assembly" })).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(srv.get(&sysadmin, "/users").await.status(), StatusCode::OK);

    assert_eq!(srv.get(&sysadmin, "/qa").await.status(), StatusCode::FORBIDDEN);
    assert_eq!(srv.get(&sysadmin, "/activities").await.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn users_see_themselves_but_not_others() {
    let srv = TestServer::spawn().await;
    let admin = srv.token("admin", ADMIN_PASSWORD).await;
    let res = srv.post(&admin, "/roles", json!({ "name": "guest" })).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let (alice_id, alice) = srv.user_with_role(&admin, "alice", "guest").await;
    let (bob_id, _) = srv.user_with_role(&admin, "bob", "guest").await;

    assert_eq!(srv.get(&alice, &format!("/users/{alice_id}")).await.status(), StatusCode::OK);
    assert_eq!(
        srv.get(&alice, &format!("/users/{bob_id}")).await.status(),
        StatusCode::FORBIDDEN
    );

    let res = srv
        .put(&alice, &format!("/users/{alice_id}"), json!({ "password": "new-secret" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(srv.login("alice", "new-secret").await.status(), StatusCode::OK);

    // Role changes need USER ADMIN even on one's own account.
    let res = srv
        .put(&alice, &format!("/users/{alice_id}"), json!({ "role_ids": [] }))
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn permission_check_and_explain_answer_for_the_caller() {
    let srv = TestServer::spawn().await;
    let admin = srv.token("admin", ADMIN_PASSWORD).await;
    let (_, reader) = srv.user_with_role(&admin, "reader", "user").await;

    let body: Value = srv
        .post(&reader, "/check-permission", json!({ "module": "QA", "level": "READ" }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["has_permission"], true);

    let body: Value = srv
        .post(&reader, "/check-permission", json!({ "module": "qa", "level": "write" }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["has_permission"], false);

    let res = srv.get(&reader, "/permissions/explain?module=QA&level=WRITE").await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["granted"], false);
    assert_eq!(body["required_permission"], "QA:WRITE");

    let res = srv.post(&reader, "/check-permission", json!({ "module": "NOPE", "level": "READ" })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

// ─── administration contracts ───

#[tokio::test]
async fn reserved_roles_and_self_delete_are_refused() {
    let srv = TestServer::spawn().await;
    let admin = srv.token("admin", ADMIN_PASSWORD).await;
    let me: Value = srv.get(&admin, "/users/me").await.json().await.unwrap();
    let admin_id = me["user_id"].as_i64().unwrap();

    let res = srv.delete(&admin, &format!("/users/{admin_id}")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let roles: Value = srv.get(&admin, "/simple-roles").await.json().await.unwrap();
    let super_admin = roles
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == "super_admin")
        .unwrap()["id"]
        .as_i64()
        .unwrap();
    let res = srv.delete(&admin, &format!("/roles/{super_admin}")).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = srv.post(&admin, "/roles", json!({ "name": "auditor" })).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let role: Value = res.json().await.unwrap();
    let res = srv.delete(&admin, &format!("/roles/{}", role["id"])).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn duplicate_user_names_conflict() {
    let srv = TestServer::spawn().await;
    let admin = srv.token("admin", ADMIN_PASSWORD).await;
    srv.user_with_role(&admin, "carol", "user").await;

    let res = srv
        .post(&admin, "/users", json!({ "name": "carol", "password": "x-123456" }))
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn custom_role_grants_exactly_its_permissions() {
    let srv = TestServer::spawn().await;
    let admin = srv.token("admin", ADMIN_PASSWORD).await;

    let res = srv.post(&admin, "/permissions", json!({ "module": "PCL", "level": "WRITE" })).await;
    let permission: Value = if res.status() == StatusCode::CREATED {
        res.json().await.unwrap()
    } else {
        // The default catalog already holds PCL:WRITE.
        let all: Value = srv.get(&admin, "/permissions?limit=1000").await.json().await.unwrap();
        all.as_array()
            .unwrap()
            .iter()
            .find(|p| p["module"] == "PCL" && p["level"] == "WRITE" && p["department_id"].is_null())
            .cloned()
            .unwrap()
    };

    let res = srv
        .post(
            &admin,
            "/roles",
            json!({ "name": "logistics", "permission_ids": [permission["id"]] }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let (_, clerk) = srv.user_with_role(&admin, "clerk", "logistics").await;

    let res = srv
        .post(&clerk, "/pcl", json!({ "line": "L2", "downtime_minutes": 15, "date": "2024-05-03" }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(srv.get(&clerk, "/pcl").await.status(), StatusCode::OK);
    assert_eq!(srv.get(&clerk, "/qa").await.status(), StatusCode::FORBIDDEN);
}

// ─── data contracts ───

#[tokio::test]
async fn qa_entry_lifecycle() {
    let srv = TestServer::spawn().await;
    let admin = srv.token("admin", ADMIN_PASSWORD).await;
    let entry = json!({ "line": "L1", "day": 3, "month": 5, "year": 2024, "value": 2.5, "scrapflag": false });

    let res = srv.post(&admin, "/qa", entry.clone()).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    let id = created["id"].as_i64().unwrap();

    let res = srv.post(&admin, "/qa", entry.clone()).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = srv
        .put(
            &admin,
            "/qa",
            json!([
                { "line": "L1", "day": 3, "month": 5, "year": 2024, "value": 4.0, "scrapflag": false },
                { "line": "L1", "day": 3, "month": 5, "year": 2024, "value": 1.0, "scrapflag": true }
            ]),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let report: Value = res.json().await.unwrap();
    assert_eq!(report["updated"], 1);
    assert_eq!(report["created"], 1);

    let list: Value = srv.get(&admin, "/qa?year=2024&month=5").await.json().await.unwrap();
    assert_eq!(list.as_array().unwrap().len(), 2);
    let scrap: Value = srv
        .get(&admin, "/qa?year=2024&month=5&scrap=true")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(scrap.as_array().unwrap().len(), 1);

    assert_eq!(srv.delete(&admin, &format!("/qa/{id}")).await.status(), StatusCode::NO_CONTENT);
    assert_eq!(srv.delete(&admin, &format!("/qa/{id}")).await.status(), StatusCode::NOT_FOUND);

    let res = srv
        .post(&admin, "/qa", json!({ "line": "L1", "day": 40, "month": 5, "year": 2024, "value": 1.0 }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn kpi_sheet_is_created_once_then_replaced() {
    let srv = TestServer::spawn().await;
    let admin = srv.token("admin", ADMIN_PASSWORD).await;
    let sheet = json!({
        "month": 4,
        "year": 2024,
        "items": [
            { "area": "Assembly", "description": "FTT", "new_factory": 97.0, "old_factory": 95.0, "total": 96.0 }
        ]
    });

    assert_eq!(srv.post(&admin, "/qa/kpi", sheet.clone()).await.status(), StatusCode::CREATED);
    assert_eq!(srv.post(&admin, "/qa/kpi", sheet).await.status(), StatusCode::CONFLICT);

    let replacement = json!({
        "month": 4,
        "year": 2024,
        "items": [
            { "area": "Assembly", "description": "FTT", "new_factory": 98.0, "old_factory": 96.0, "total": 97.0 },
            { "area": "Paint", "description": "Scrap", "new_factory": 1.0, "old_factory": 2.0, "total": 1.5 }
        ]
    });
    assert_eq!(srv.put(&admin, "/qa/kpi", replacement).await.status(), StatusCode::OK);

    let rows: Value = srv.get(&admin, "/qa/kpi?year=2024&month=4").await.json().await.unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn quality_figures_are_one_sheet_per_month() {
    let srv = TestServer::spawn().await;
    let admin = srv.token("admin", ADMIN_PASSWORD).await;
    let figures = |month: i32, defects: i64| {
        json!({ "month": month, "year": 2024, "supplier_defect": defects, "formal_amount": 12, "Ftt_tjm": 98.5 })
    };

    let res = srv.post(&admin, "/qa/qad", figures(3, 1)).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let march: Value = res.json().await.unwrap();
    assert_eq!(srv.post(&admin, "/qa/qad", figures(3, 2)).await.status(), StatusCode::CONFLICT);

    let april: Value = srv.post(&admin, "/qa/qad", figures(4, 5)).await.json().await.unwrap();
    let res = srv.put(&admin, &format!("/qa/qad/{}", april["id"]), figures(3, 5)).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let res = srv.put(&admin, &format!("/qa/qad/{}", march["id"]), figures(3, 9)).await;
    assert_eq!(res.status(), StatusCode::OK);

    let rows: Value = srv.get(&admin, "/qa/qad?year=2024&month=3").await.json().await.unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["supplier_defect"], 9);
}

#[tokio::test]
async fn monthly_totals_upsert_per_line() {
    let srv = TestServer::spawn().await;
    let admin = srv.token("admin", ADMIN_PASSWORD).await;

    let res = srv
        .put(
            &admin,
            "/qa/monthly",
            json!([
                { "line": "L1", "month": 2, "year": 2024, "amount": 100.0 },
                { "line": "L2", "month": 2, "year": 2024, "amount": 80.0 }
            ]),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let report: Value = res.json().await.unwrap();
    assert_eq!((report["created"].as_u64(), report["updated"].as_u64()), (Some(2), Some(0)));

    let res = srv
        .put(&admin, "/qa/monthly", json!({ "line": "L1", "month": 2, "year": 2024, "amount": 120.0 }))
        .await;
    let report: Value = res.json().await.unwrap();
    assert_eq!((report["created"].as_u64(), report["updated"].as_u64()), (Some(0), Some(1)));

    let rows: Value = srv.get(&admin, "/qa/monthly?year=2024&month=2").await.json().await.unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    let l1 = rows.iter().find(|r| r["line"] == "L1").unwrap();
    assert_eq!(l1["amount"].as_f64(), Some(120.0));
}

#[tokio::test]
async fn event_crud_and_validation() {
    let srv = TestServer::spawn().await;
    let admin = srv.token("admin", ADMIN_PASSWORD).await;

    let res = srv
        .post(
            &admin,
            "/events",
            json!({ "name": "Audit", "department": "QA", "start_time": "2024-06-10", "end_time": "2024-06-09" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv
        .post(
            &admin,
            "/events",
            json!({ "name": "Audit", "department": "QA", "start_time": "2024-06-10", "end_time": "2024-06-11" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let event: Value = res.json().await.unwrap();
    let path = format!("/events/{}", event["id"]);

    let res = srv
        .put(
            &admin,
            &path,
            json!({ "name": "Customer audit", "department": "QA", "start_time": "2024-06-12" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let updated: Value = srv.get(&admin, &path).await.json().await.unwrap();
    assert_eq!(updated["name"], "Customer audit");

    let listed: Value = srv.get(&admin, "/events?department=QA").await.json().await.unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    let other: Value = srv.get(&admin, "/events?department=EHS").await.json().await.unwrap();
    assert!(other.as_array().unwrap().is_empty());

    assert_eq!(srv.delete(&admin, &path).await.status(), StatusCode::NO_CONTENT);
    assert_eq!(srv.get(&admin, &path).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ehs_lwd_upsert_lands_in_current_year() {
    let srv = TestServer::spawn().await;
    let admin = srv.token("admin", ADMIN_PASSWORD).await;

    let res = srv
        .put(&admin, "/ehs/lwd", json!([{ "week": 7, "year": 2001, "lwd": 2 }]))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let weeks: Value = srv.get(&admin, "/ehs/lwd").await.json().await.unwrap();
    let weeks = weeks.as_array().unwrap();
    assert_eq!(weeks.len(), 1);
    assert_eq!(weeks[0]["week"], 7);
    assert_eq!(weeks[0]["lwd"], 2);

    let res = srv.put(&admin, "/ehs/lwd", json!([{ "week": 7, "lwd": 3 }])).await;
    let report: Value = res.json().await.unwrap();
    assert_eq!(report["updated"], 1);
    assert_eq!(report["created"], 0);
}

#[tokio::test]
async fn maintenance_metrics_feed_stats_and_charts() {
    let srv = TestServer::spawn().await;
    let admin = srv.token("admin", ADMIN_PASSWORD).await;
    let today = Utc::now().date_naive();

    let res = srv
        .post(
            &admin,
            "/maint/metrics",
            json!({
                "equipment_type": "press",
                "shift": "day",
                "date": today,
                "downtime_count": 2,
                "downtime_minutes": 144,
                "parts_produced": 500
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let metric: Value = res.json().await.unwrap();
    assert!((metric["availability"].as_f64().unwrap() - 0.9).abs() < 1e-9);

    let stats: Value = srv.get(&admin, "/maint/metrics/stats").await.json().await.unwrap();
    assert!((stats["mttr"].as_f64().unwrap() - 72.0).abs() < 1e-9);
    assert_eq!(stats["total_downtime_count"], 2);

    let trend: Value = srv.get(&admin, "/maint/charts/oee-trend").await.json().await.unwrap();
    assert_eq!(trend["trend_data"].as_array().unwrap().len(), 1);

    let comparison: Value = srv
        .get(&admin, "/maint/charts/line-comparison")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(comparison["comparison_data"][0]["equipment_type"], "press");
}

#[tokio::test]
async fn downtime_cannot_close_without_resolution() {
    let srv = TestServer::spawn().await;
    let admin = srv.token("admin", ADMIN_PASSWORD).await;

    let res = srv
        .post(
            &admin,
            "/maint/downtime-records",
            json!({
                "line": "L3",
                "date": "2024-05-03",
                "equipment_name": "robot 4",
                "fault_description": "gripper jam",
                "reporter_name": "op1",
                "downtime_minutes": 30
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let record: Value = res.json().await.unwrap();
    assert_eq!(record["status"], "pending");
    let path = format!("/maint/downtime-records/{}", record["id"]);

    let res = srv.put(&admin, &path, json!({ "status": "closed" })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv
        .put(&admin, &path, json!({ "status": "closed", "resolution": "replaced gripper" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let closed: Value = srv
        .get(&admin, "/maint/downtime-records?status=closed")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(closed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn weekly_tasks_are_also_served_as_issues() {
    let srv = TestServer::spawn().await;
    let admin = srv.token("admin", ADMIN_PASSWORD).await;

    let res = srv
        .post(
            &admin,
            "/maint/issues",
            json!({ "date": "2024-05-06", "title": "Leak", "location": "L1", "content": "oil leak", "degree": "high" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let issue: Value = res.json().await.unwrap();

    let weekly: Value = srv
        .get(&admin, &format!("/maint/weekly/{}", issue["id"]))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(weekly["title"], "Leak");

    let open: Value = srv.get(&admin, "/maint/issues?solved=false").await.json().await.unwrap();
    assert_eq!(open.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn daily_task_lifecycle() {
    let srv = TestServer::spawn().await;
    let admin = srv.token("admin", ADMIN_PASSWORD).await;

    let res = srv
        .post(
            &admin,
            "/maint/daily",
            json!({ "date": "2024-05-06", "title": "Lube", "wheres": "press 2", "type": 1, "content_daily": "greased" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let task: Value = res.json().await.unwrap();
    assert_eq!(task["location"], "press 2");
    assert_eq!(task["solved"], false);
    let path = format!("/maint/daily/{}", task["id"]);

    let open: Value = srv.get(&admin, "/maint/daily?solved=false").await.json().await.unwrap();
    assert_eq!(open.as_array().unwrap().len(), 1);

    let res = srv.put(&admin, &path, json!({ "solved": true })).await;
    assert_eq!(res.status(), StatusCode::OK);
    let open: Value = srv.get(&admin, "/maint/daily?solved=false").await.json().await.unwrap();
    assert!(open.as_array().unwrap().is_empty());
    let later: Value = srv.get(&admin, "/maint/daily?start_date=2024-05-07").await.json().await.unwrap();
    assert!(later.as_array().unwrap().is_empty());

    assert_eq!(srv.delete(&admin, &path).await.status(), StatusCode::NO_CONTENT);
    assert_eq!(srv.get(&admin, &path).await.status(), StatusCode::NOT_FOUND);
}

// ─── activity log and navigation ───

#[tokio::test]
async fn mutations_are_recorded_in_activity_log() {
    let srv = TestServer::spawn().await;
    let admin = srv.token("admin", ADMIN_PASSWORD).await;

    let res = srv
        .post(&admin, "/assy", json!({ "line": "A1", "date": "2024-05-03", "planned": 100, "actual": 90 }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let output: Value = res.json().await.unwrap();
    assert!((output["attainment"].as_f64().unwrap() - 0.9).abs() < 1e-9);

    let feed: Value = srv.get(&admin, "/activities?type=ASSY_CREATE").await.json().await.unwrap();
    let feed = feed.as_array().unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0]["user"], "admin");
    assert_eq!(feed[0]["icon"], "mdi-plus-circle");
    assert_eq!(feed[0]["time"], "just now");
    assert_eq!(feed[0]["changes"]["after"]["line"], "A1");

    let res = srv
        .post(
            &admin,
            "/activities/data-change",
            json!({ "module": "qa", "type": "EXPORT", "title": "Exported", "description": "exported May" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let entry: Value = res.json().await.unwrap();
    assert_eq!(entry["type"], "QA_EXPORT");
    assert_eq!(entry["target"], "/qa");

    let fetched = srv.get(&admin, &format!("/activities/{}", entry["id"])).await;
    assert_eq!(fetched.status(), StatusCode::OK);
}

#[tokio::test]
async fn activity_window_is_bounded() {
    let srv = TestServer::spawn().await;
    let admin = srv.token("admin", ADMIN_PASSWORD).await;
    let res = srv
        .post(&admin, "/assy", json!({ "line": "A2", "date": "2024-05-03", "planned": 10, "actual": 10 }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = srv.get(&admin, "/activities?days=7&type=ASSY_CREATE").await;
    assert_eq!(res.status(), StatusCode::OK);
    let feed: Value = res.json().await.unwrap();
    assert_eq!(feed.as_array().unwrap().len(), 1);

    for days in ["0", "1000000000", "-3"] {
        let res = srv.get(&admin, &format!("/activities?days={days}")).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "days={days}");
    }
}

#[tokio::test]
async fn navigation_tree_follows_route_visibility() {
    let srv = TestServer::spawn().await;
    let admin = srv.token("admin", ADMIN_PASSWORD).await;
    let (_, reader) = srv.user_with_role(&admin, "reader", "user").await;

    let res = srv
        .post(
            &admin,
            "/routes",
            json!({ "path": "/secret", "name": "Secret", "meta": { "permission": "NOPE" }, "sort_order": 99 }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let secret: Value = res.json().await.unwrap();
    assert_eq!(secret["meta"]["permissions"], json!([]));

    let admin_tree: Value = srv.get(&admin, "/navigation").await.json().await.unwrap();
    assert!(admin_tree.as_array().unwrap().iter().any(|r| r["name"] == "Secret"));

    let reader_tree: Value = srv.get(&reader, "/permissions/routes").await.json().await.unwrap();
    assert!(!reader_tree.as_array().unwrap().iter().any(|r| r["name"] == "Secret"));

    let access: Value = srv
        .get(&reader, &format!("/routes/check-access/{}", secret["id"]))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(access["has_access"], false);

    // Granting the route to the reader's role makes it visible.
    let roles: Value = srv.get(&admin, "/simple-roles").await.json().await.unwrap();
    let user_role = roles.as_array().unwrap().iter().find(|r| r["name"] == "user").unwrap()["id"].clone();
    let res = srv
        .post(
            &admin,
            &format!("/routes/{}/permissions", secret["id"]),
            json!({ "role_ids": [user_role] }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let reader_tree: Value = srv.get(&reader, "/navigation").await.json().await.unwrap();
    assert!(reader_tree.as_array().unwrap().iter().any(|r| r["name"] == "Secret"));
}

#[tokio::test]
async fn route_with_children_cannot_be_deleted() {
    let srv = TestServer::spawn().await;
    let admin = srv.token("admin", ADMIN_PASSWORD).await;

    let parent: Value = srv
        .post(&admin, "/routes", json!({ "path": "/reports", "name": "Reports" }))
        .await
        .json()
        .await
        .unwrap();
    let child: Value = srv
        .post(
            &admin,
            "/routes",
            json!({ "path": "/reports/daily", "name": "Daily", "parent_id": parent["id"] }),
        )
        .await
        .json()
        .await
        .unwrap();

    let res = srv.delete(&admin, &format!("/routes/{}", parent["id"])).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // Re-parenting the parent under its own child would loop.
    let res = srv
        .client
        .patch(srv.url(&format!("/routes/{}", parent["id"])))
        .bearer_auth(&admin)
        .json(&json!({ "parent_id": child["id"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    assert_eq!(
        srv.delete(&admin, &format!("/routes/{}", child["id"])).await.status(),
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        srv.delete(&admin, &format!("/routes/{}", parent["id"])).await.status(),
        StatusCode::NO_CONTENT
    );
}
