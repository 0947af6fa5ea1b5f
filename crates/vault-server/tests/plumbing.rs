use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use vault_api::auth::AppStateInner;
use vault_db::Database;
use vault_db::attachments::AttachmentFilter;
use vault_db::notes::{NewNote, Page};
use vault_db::users::NewUser;
use vault_ingest::{IngestConfig, Ingestor, run_event_loop};
use vault_server::events::INGEST_TOKEN_HEADER;
use vault_server::{ServerState, router};
use vault_storage::{LocalObjectStore, ObjectStore, PRESIGN_TTL, Presigner};

const BUCKET: &str = "vault-attachments";
const ORIGIN: &str = "http://vault.test";

struct Harness {
    router: Router,
    db: Arc<Database>,
    store: Arc<LocalObjectStore>,
    _dir: TempDir,
}

async fn harness(ingest_token: Option<&str>, events: Option<mpsc::UnboundedSender<vault_types::events::ObjectCreated>>) -> Harness {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(Database::open_in_memory().unwrap());
    let mut store = LocalObjectStore::new(
        dir.path().to_path_buf(),
        BUCKET,
        Presigner::new("presign-secret", format!("{ORIGIN}/objects")),
    )
    .await
    .unwrap();
    if let Some(events) = events {
        store = store.with_events(events);
    }
    let store = Arc::new(store);

    let ingestor = Arc::new(Ingestor::new(
        db.clone(),
        store.clone(),
        IngestConfig {
            public_base_url: format!("{ORIGIN}/public"),
            record_timeout: Duration::from_secs(5),
        },
    ));
    let api = Arc::new(AppStateInner {
        db: db.clone(),
        store: store.clone(),
        bucket: BUCKET.into(),
        jwt_secret: "jwt-secret".into(),
        access_token_ttl: chrono::Duration::minutes(5),
        refresh_token_ttl: chrono::Duration::minutes(60),
    });
    let server = ServerState {
        store: store.clone(),
        ingestor,
        ingest_token: ingest_token.map(str::to_string),
    };

    Harness {
        router: router(api, server),
        db,
        store,
        _dir: dir,
    }
}

impl Harness {
    fn note(&self) -> (Uuid, Uuid) {
        let user = self
            .db
            .create_user(NewUser {
                username: "alice",
                email: "alice@x.com",
                password_hash: None,
                federated_uid: None,
            })
            .unwrap();
        let note = self
            .db
            .create_note(
                user.id,
                NewNote {
                    title: "files".into(),
                    content: "c".into(),
                    encrypted: false,
                    archived: false,
                },
            )
            .unwrap();
        (user.id, note.note.id)
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn post_events(&self, token: Option<&str>, keys: &[&str]) -> (StatusCode, Value) {
        let records: Vec<Value> = keys
            .iter()
            .map(|key| {
                json!({
                    "eventName": "ObjectCreated:Put",
                    "s3": { "bucket": { "name": BUCKET }, "object": { "key": key } }
                })
            })
            .collect();
        let mut builder = Request::builder()
            .method("POST")
            .uri("/events")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(INGEST_TOKEN_HEADER, token);
        }
        let (status, bytes) = self
            .send(builder.body(Body::from(json!({ "Records": records }).to_string())).unwrap())
            .await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }
}

fn local(url: &str) -> String {
    url.strip_prefix(ORIGIN).unwrap().to_string()
}

#[tokio::test]
async fn health_answers_ok() {
    let h = harness(None, None).await;
    let (status, body) = h
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn presigned_put_then_get() {
    let h = harness(None, None).await;
    let key = "attachments/n1/report.pdf";

    let put_url = h.store.presigned_put_url(key, "application/pdf", PRESIGN_TTL).unwrap();
    let (status, _) = h
        .send(
            Request::builder()
                .method("PUT")
                .uri(local(&put_url))
                .header(header::CONTENT_TYPE, "application/pdf")
                .body(Body::from(vec![7u8; 2048]))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let head = h.store.head_object(BUCKET, key).await.unwrap();
    assert_eq!(head.content_length, 2048);
    assert_eq!(head.content_type.as_deref(), Some("application/pdf"));

    let get_url = h.store.presigned_get_url(key, PRESIGN_TTL).unwrap();
    let response = h
        .router
        .clone()
        .oneshot(Request::builder().uri(local(&get_url)).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.len(), 2048);
}

#[tokio::test]
async fn tampered_or_mismatched_requests_are_forbidden() {
    let h = harness(None, None).await;
    let key = "attachments/n1/report.pdf";
    let put_url = local(&h.store.presigned_put_url(key, "application/pdf", PRESIGN_TTL).unwrap());

    // Content type differs from the signed one.
    let (status, _) = h
        .send(
            Request::builder()
                .method("PUT")
                .uri(&put_url)
                .header(header::CONTENT_TYPE, "text/plain")
                .body(Body::from("x"))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // A PUT URL does not authorize a GET.
    let (status, _) = h
        .send(Request::builder().uri(&put_url).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Another key under the same signature.
    let other = put_url.replace("report.pdf", "other.pdf");
    let (status, _) = h
        .send(
            Request::builder()
                .method("PUT")
                .uri(&other)
                .header(header::CONTENT_TYPE, "application/pdf")
                .body(Body::from("x"))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = h
        .send(Request::builder().uri("/objects/attachments/n1/report.pdf").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn event_webhook_registers_attachments() {
    let h = harness(Some("hook-token"), None).await;
    let (user, note) = h.note();
    let key = format!("attachments/{note}/report.pdf");
    h.store.put_object(&key, "application/pdf", &[1u8; 2048]).await.unwrap();

    let (status, body) = h.post_events(None, &[&key]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "Unauthorized");

    let (status, body) = h.post_events(Some("hook-token"), &[&key, "unrelated/key"]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["attachments_created"], 1);
    assert_eq!(body["skipped"], 1);

    let (status, body) = h.post_events(Some("hook-token"), &[&key]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["duplicates"], 1);

    let (entries, total) = h
        .db
        .list_attachments(user, &AttachmentFilter::default(), Page::default())
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(entries[0].attachment.size, 2048);
    assert_eq!(entries[0].attachment.mime_type, "application/pdf");
}

#[tokio::test]
async fn malformed_key_is_a_bad_request() {
    let h = harness(None, None).await;
    let (status, body) = h.post_events(None, &["attachments%zz/broken"]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "ValidationError");
}

#[tokio::test]
async fn avatar_upload_is_ingested_and_served_publicly() {
    let (tx, rx) = mpsc::unbounded_channel();
    let h = harness(None, Some(tx)).await;
    let (user, _) = h.note();

    let ingestor = Arc::new(Ingestor::new(
        h.db.clone(),
        h.store.clone(),
        IngestConfig {
            public_base_url: format!("{ORIGIN}/public"),
            record_timeout: Duration::from_secs(5),
        },
    ));
    tokio::spawn(run_event_loop(rx, ingestor, 8));

    let key = format!("avatars/{user}");
    let put_url = h.store.presigned_put_url(&key, "image/png", PRESIGN_TTL).unwrap();
    let (status, _) = h
        .send(
            Request::builder()
                .method("PUT")
                .uri(local(&put_url))
                .header(header::CONTENT_TYPE, "image/png")
                .body(Body::from(vec![1u8; 512]))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let expected = format!("{ORIGIN}/public/avatars/{user}");
    let mut avatar = None;
    for _ in 0..100 {
        avatar = h.db.get_user_by_id(user).unwrap().and_then(|u| u.avatar_url);
        if avatar.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(avatar.as_deref(), Some(expected.as_str()));

    let (status, body) = h.send(Request::builder().uri(local(&expected)).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.len(), 512);

    let (status, _) = h
        .send(
            Request::builder()
                .uri(format!("/public/avatars/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
