use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use caro_portal::backend::Backend;
use caro_portal::config::PortalConfig;
use caro_portal::db::Database;
use caro_portal::models::{Client, CreateClientPayload, UserRole};
use caro_portal::server::{router, AppState};
use caro_portal::storage::{LocalObjectStore, UrlSigner};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "portal-test-boundary";

struct Harness {
    _dir: TempDir,
    app: Router,
    state: AppState,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Arc::new(Database::new(&dir.path().join("portal.db")).expect("db"));
        let storage = Arc::new(LocalObjectStore::new(dir.path().join("objects")).expect("store"));
        let backend = Backend::new(
            db,
            storage,
            UrlSigner::new([9u8; 32], chrono::Duration::minutes(10)),
            "http://portal.test",
        );
        let config = PortalConfig {
            data_dir: dir.path().to_path_buf(),
            site_url: "https://caro.example".to_string(),
            ..PortalConfig::default()
        };
        let state = AppState::new(backend, config);
        Self {
            app: router(state.clone()),
            state,
            _dir: dir,
        }
    }

    fn client(&self, name: &str, owner: Option<&str>) -> Client {
        self.state
            .backend()
            .db()
            .insert_client(&CreateClientPayload {
                company_name: name.to_string(),
                subscription_status: Some("active".to_string()),
                auth_user_id: owner.map(ToString::to_string),
                ..CreateClientPayload::default()
            })
            .expect("client")
    }

    fn user(&self, email: &str, role: UserRole) -> String {
        self.state
            .auth()
            .register(email, "correct-horse", role)
            .expect("register")
            .id
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.expect("response")
    }

    async fn login(&self, email: &str) -> String {
        let response = self
            .send(json_request(
                "POST",
                "/api/auth/login",
                None,
                json!({ "email": email, "password": "correct-horse" }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .expect("session cookie")
            .to_string();
        assert!(cookie.contains("HttpOnly"));
        cookie.split(';').next().expect("cookie pair").to_string()
    }
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).expect("request")
}

fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

fn multipart(uri: &str, cookie: Option<&str>, fields: &[(&str, &str)], files: &[(&str, &str, &str)]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes(),
        );
    }
    for (name, file_name, contents) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(contents.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"));
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).expect("request")
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

#[tokio::test]
async fn protected_pages_redirect_anonymous_visitors() {
    let harness = Harness::new();
    for path in ["/dashboard", "/admin"] {
        let response = harness.send(get(path, None)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{path}");
        assert_eq!(
            response.headers().get(header::LOCATION).and_then(|v| v.to_str().ok()),
            Some("/login")
        );
    }

    let response = harness.send(get("/", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Tubexa"));
}

#[tokio::test]
async fn robots_and_sitemap_use_site_url() {
    let harness = Harness::new();
    let robots = body_text(harness.send(get("/robots.txt", None)).await).await;
    assert!(robots.contains("Disallow: /dashboard/"));
    assert!(robots.contains("Sitemap: https://caro.example/sitemap.xml"));

    let response = harness.send(get("/sitemap.xml", None)).await;
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
        Some("application/xml")
    );
    let xml = body_text(response).await;
    assert!(xml.contains("<loc>https://caro.example/legal/terminos</loc>"));
}

#[tokio::test]
async fn member_reads_own_dashboard_and_nothing_else() {
    let harness = Harness::new();
    let member_id = harness.user("ana@tubexa.cl", UserRole::Member);
    let own = harness.client("Tubexa", Some(&member_id));
    let other = harness.client("Otra SpA", None);
    let cookie = harness.login("Ana@Tubexa.cl").await;

    let response = harness.send(get("/dashboard", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);

    harness.user("ops@caro.cl", UserRole::Operator);
    let ops_cookie = harness.login("ops@caro.cl").await;
    for (client, name) in [(&own, "informe.pdf"), (&other, "secreto.pdf")] {
        let response = harness
            .send(multipart(
                &format!("/api/admin/clients/{}/documents", client.id),
                Some(&ops_cookie),
                &[("category", "Finanzas")],
                &[("file", name, "%PDF-1.4")],
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let documents = body_json(harness.send(get("/api/dashboard/documents", Some(&cookie))).await).await;
    let documents = documents.as_array().expect("array");
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0]["name"], "informe.pdf");
    assert_eq!(documents[0]["action"]["kind"], "view");

    let filtered = body_json(
        harness
            .send(get("/api/dashboard/documents?category=Legal", Some(&cookie)))
            .await,
    )
    .await;
    assert_eq!(filtered.as_array().map(Vec::len), Some(0));

    let foreign = harness
        .send(get(&format!("/api/dashboard/documents?clientId={}", other.id), Some(&cookie)))
        .await;
    assert_eq!(foreign.status(), StatusCode::OK);
    assert_eq!(body_json(foreign).await.as_array().map(Vec::len), Some(0));

    let overview = harness
        .send(get(&format!("/api/dashboard/overview?clientId={}", other.id), Some(&cookie)))
        .await;
    assert_eq!(overview.status(), StatusCode::FORBIDDEN);

    let admin = harness.send(get("/api/admin/clients", Some(&cookie))).await;
    assert_eq!(admin.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn uploaded_document_is_served_from_public_bucket() {
    let harness = Harness::new();
    harness.user("ops@caro.cl", UserRole::Operator);
    let cookie = harness.login("ops@caro.cl").await;
    let client = harness.client("Tubexa", None);

    let response = harness
        .send(multipart(
            &format!("/api/admin/clients/{}/documents", client.id),
            Some(&cookie),
            &[],
            &[("file", "Balance 2024.pdf", "%PDF-balance")],
        ))
        .await;
    let document = body_json(response).await;
    assert_eq!(document["fileType"], "PDF");
    assert_eq!(document["category"], "General");
    let url = document["fileUrl"].as_str().expect("url");
    let path = url.strip_prefix("http://portal.test").expect("public base");

    let response = harness.send(get(path, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
        Some("application/pdf")
    );
    assert_eq!(body_text(response).await, "%PDF-balance");

    let private = harness
        .send(get("/storage/public/form_uploads/anonymous/x.bin", None))
        .await;
    assert_eq!(private.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn phase_removal_needs_a_confirm_ticket() {
    let harness = Harness::new();
    harness.user("ops@caro.cl", UserRole::Operator);
    let cookie = harness.login("ops@caro.cl").await;
    let client = harness.client("Tubexa", None);

    let phase = body_json(
        harness
            .send(json_request(
                "POST",
                &format!("/api/admin/clients/{}/phases", client.id),
                Some(&cookie),
                json!({ "phaseName": "Diagnóstico", "status": "current", "dueDate": "2025-03-31" }),
            ))
            .await,
    )
    .await;
    let phase_id = phase["id"].as_str().expect("phase id").to_string();

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/admin/phases/{phase_id}"))
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .expect("request");
    let response = harness.send(request).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let ticket = body_json(response).await;
    assert_eq!(ticket["confirm"]["phaseName"], "Diagnóstico");
    let token = ticket["confirm"]["token"].as_str().expect("token").to_string();

    let wrong = body_json(
        harness
            .send(json_request(
                "POST",
                &format!("/api/admin/phases/{phase_id}/confirm-delete"),
                Some(&cookie),
                json!({ "token": "forged" }),
            ))
            .await,
    )
    .await;
    assert_eq!(wrong["outcome"], "cancelled");

    let confirmed = body_json(
        harness
            .send(json_request(
                "POST",
                &format!("/api/admin/phases/{phase_id}/confirm-delete"),
                Some(&cookie),
                json!({ "token": token }),
            ))
            .await,
    )
    .await;
    assert_eq!(confirmed["outcome"], "removed");

    let phases = body_json(
        harness
            .send(get(&format!("/api/admin/clients/{}/phases", client.id), Some(&cookie)))
            .await,
    )
    .await;
    assert_eq!(phases.as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn content_export_feeds_import() {
    let harness = Harness::new();
    harness.user("ops@caro.cl", UserRole::Operator);
    let cookie = harness.login("ops@caro.cl").await;

    let response = harness
        .send(json_request(
            "PUT",
            "/api/admin/content/hero",
            Some(&cookie),
            json!({ "title": "Nuevo", "subtitle": "s", "tagline": "t", "ctaPrimary": "a", "ctaSecondary": "b" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = harness.send(get("/api/admin/content/export", Some(&cookie))).await;
    assert!(response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|value| value.contains("caro_consulting_content.json")));
    let exported = body_json(response).await;
    assert_eq!(exported["hero"]["title"], "Nuevo");

    let request = Request::builder()
        .method("POST")
        .uri("/api/admin/content/import")
        .header(header::COOKIE, &cookie)
        .body(Body::from(json!({ "hero": exported["hero"], "extra": [1, 2] }).to_string()))
        .expect("request");
    let outcome = body_json(harness.send(request).await).await;
    assert_eq!(outcome["succeeded"].as_array().map(Vec::len), Some(2));

    let request = Request::builder()
        .method("POST")
        .uri("/api/admin/content/import")
        .header(header::COOKIE, &cookie)
        .body(Body::from("[1, 2, 3]"))
        .expect("request");
    assert_eq!(harness.send(request).await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn intake_form_accepts_anonymous_multipart() {
    let harness = Harness::new();
    let response = harness
        .send(multipart(
            "/api/forms",
            None,
            &[
                ("formType", "INICIAL"),
                ("empresa", "Tubexa"),
                ("industria", "Manufactura"),
                ("facturacion", "10-50MM"),
                ("desafio", "Márgenes"),
            ],
            &[("files", "balance.xlsx", "sheet"), ("files", "", "")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let receipt = body_json(response).await;
    let paths = receipt["submission"]["fileUrls"].as_array().expect("paths");
    assert_eq!(paths.len(), 1);
    assert!(paths[0].as_str().is_some_and(|path| path.starts_with("anonymous/")));

    harness.user("ops@caro.cl", UserRole::Operator);
    let cookie = harness.login("ops@caro.cl").await;
    let forms = body_json(harness.send(get("/api/admin/forms", Some(&cookie))).await).await;
    let url = forms[0]["attachmentUrls"][0].as_str().expect("signed url");
    let path = url.strip_prefix("http://portal.test").expect("signed base");
    let response = harness.send(get(path, None)).await;
    assert_eq!(body_text(response).await, "sheet");

    let missing = harness
        .send(multipart("/api/forms", None, &[("formType", "PRICING")], &[]))
        .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn logout_clears_session() {
    let harness = Harness::new();
    harness.user("ops@caro.cl", UserRole::Operator);
    let cookie = harness.login("ops@caro.cl").await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/logout")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .expect("request");
    let response = harness.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["redirect"], "/login");

    let response = harness.send(get("/admin", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let bad = harness
        .send(json_request(
            "POST",
            "/api/auth/login",
            None,
            json!({ "email": "ops@caro.cl", "password": "wrong-password" }),
        ))
        .await;
    assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_bodies_and_queries_get_json_errors() {
    let harness = Harness::new();

    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"email\": "))
        .expect("request");
    let response = harness.send(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().is_some_and(|message| message.starts_with("VALIDATION")));

    let response = harness
        .send(get("/api/dashboard/timeline?clientId=a&clientId=b", None))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn operator_dashboard_needs_a_client_id() {
    let harness = Harness::new();
    harness.user("ops@caro.cl", UserRole::Operator);
    let cookie = harness.login("ops@caro.cl").await;

    let response = harness.send(get("/api/dashboard/timeline", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let client = harness.client("Acme", None);
    let uri = format!("/api/dashboard/timeline?clientId={}", client.id);
    let response = harness.send(get(&uri, Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!([]));
}
