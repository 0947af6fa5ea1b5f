use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use vault_api::auth::{AppStateInner, create_token};
use vault_db::Database;
use vault_db::attachments::NewAttachment;
use vault_db::users::NewUser;
use vault_storage::{ObjectHead, ObjectStore, StorageError};
use vault_types::api::TokenKind;

const SECRET: &str = "test-jwt-secret";

#[derive(Default)]
struct RecordingStore {
    deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn head_object(&self, _bucket: &str, key: &str) -> Result<ObjectHead, StorageError> {
        Err(StorageError::NotFound(key.to_string()))
    }

    async fn delete_object(&self, _bucket: &str, key: &str) -> Result<(), StorageError> {
        self.deleted.lock().unwrap().push(key.to_string());
        Ok(())
    }

    fn presigned_put_url(&self, key: &str, content_type: &str, _ttl: Duration) -> Result<String, StorageError> {
        Ok(format!("https://objects.test/{key}?method=PUT&ct={content_type}"))
    }

    fn presigned_get_url(&self, key: &str, _ttl: Duration) -> Result<String, StorageError> {
        Ok(format!("https://objects.test/{key}?method=GET"))
    }
}

struct TestApp {
    router: Router,
    db: Arc<Database>,
    store: Arc<RecordingStore>,
}

fn app() -> TestApp {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let store = Arc::new(RecordingStore::default());
    let state = Arc::new(AppStateInner {
        db: db.clone(),
        store: store.clone(),
        bucket: "vault-attachments".into(),
        jwt_secret: SECRET.into(),
        access_token_ttl: chrono::Duration::minutes(5),
        refresh_token_ttl: chrono::Duration::minutes(60),
    });
    TestApp {
        router: vault_api::router(state),
        db,
        store,
    }
}

impl TestApp {
    /// Seed a user directly and mint an access token for it.
    fn user(&self, name: &str) -> (Uuid, String) {
        let user = self
            .db
            .create_user(NewUser {
                username: name,
                email: &format!("{name}@x.com"),
                password_hash: None,
                federated_uid: None,
            })
            .unwrap();
        let token = create_token(SECRET, user.id, TokenKind::Access, chrono::Duration::minutes(5)).unwrap();
        (user.id, token)
    }

    async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self.router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn create_note(&self, token: &str, title: &str) -> Uuid {
        let (status, body) = self
            .call("POST", "/notes", Some(token), Some(json!({"title": title, "content": "c"})))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().parse().unwrap()
    }
}

#[tokio::test]
async fn register_login_refresh_me() {
    let app = app();

    let (status, body) = app
        .call(
            "POST",
            "/register",
            None,
            Some(json!({"email": "A@X.com", "username": "alice", "password": "hunter22"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["email"], "a@x.com");

    let (status, _) = app
        .call(
            "POST",
            "/register",
            None,
            Some(json!({"email": "a@x.com", "username": "other", "password": "hunter22"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .call("POST", "/login", None, Some(json!({"email": "a@x.com", "password": "wrong-pass"})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "Unauthorized");

    let (status, body) = app
        .call("POST", "/login", None, Some(json!({"email": "a@x.com", "password": "hunter22"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    let access = body["session"]["token"].as_str().unwrap().to_string();
    let refresh = body["session"]["refresh"].as_str().unwrap().to_string();

    // A refresh token is not an access token.
    let (status, _) = app.call("GET", "/me", Some(&refresh), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.call("GET", "/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["notes_count"], 0);

    let (status, body) = app
        .call("POST", "/refresh", None, Some(json!({"refresh_token": refresh})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());

    let (status, _) = app
        .call("POST", "/refresh", None, Some(json!({"refresh_token": access})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_routes_need_a_token() {
    let app = app();
    let (status, body) = app.call("GET", "/notes", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "Unauthorized");
}

#[tokio::test]
async fn note_lifecycle_over_http() {
    let app = app();
    let (_, token) = app.user("alice");
    let note = app.create_note(&token, "first").await;

    let (status, body) = app.call("GET", "/notes", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["notes"][0]["author"]["username"], "alice");

    let (status, body) = app
        .call(
            "PUT",
            &format!("/notes/{note}"),
            Some(&token),
            Some(json!({"title": "renamed", "content": "new", "archived": true})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "renamed");
    assert_eq!(body["archived"], true);

    let (status, body) = app.call("GET", "/notes?archived=false", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);

    let (status, _) = app.call("DELETE", &format!("/notes/{note}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = app.call("GET", &format!("/notes/{note}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NotFound");

    let (_, body) = app.call("GET", "/notes/deleted", Some(&token), None).await;
    assert_eq!(body["total"], 1);

    let (status, _) = app.call("POST", &format!("/notes/{note}/restore"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call("DELETE", &format!("/notes/{note}?hard=true"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = app.call("GET", "/notes/deleted", Some(&token), None).await;
    assert_eq!(body["total"], 0);
    let (_, body) = app.call("GET", "/notes", Some(&token), None).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn blank_title_is_a_validation_error() {
    let app = app();
    let (_, token) = app.user("alice");
    let (status, body) = app
        .call("POST", "/notes", Some(&token), Some(json!({"title": " ", "content": "c"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "ValidationError");
}

#[tokio::test]
async fn notes_of_other_users_are_not_found() {
    let app = app();
    let (_, alice) = app.user("alice");
    let (_, mallory) = app.user("mallory");
    let note = app.create_note(&alice, "private").await;

    for (method, uri) in [
        ("GET", format!("/notes/{note}")),
        ("DELETE", format!("/notes/{note}")),
        ("GET", format!("/notes/{note}/share")),
    ] {
        let (status, _) = app.call(method, &uri, Some(&mallory), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
    }
    let (status, _) = app
        .call(
            "POST",
            &format!("/notes/{note}/attachments"),
            Some(&mallory),
            Some(json!({"filename": "x.txt", "content_type": "text/plain"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn presigned_uploads_use_exact_keys() {
    let app = app();
    let (user, token) = app.user("alice");
    let note = app.create_note(&token, "files").await;

    let (status, body) = app
        .call(
            "POST",
            &format!("/notes/{note}/attachments"),
            Some(&token),
            Some(json!({"filename": "report.pdf", "content_type": "application/pdf"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["key"], format!("attachments/{note}/report.pdf"));

    let (status, _) = app
        .call(
            "POST",
            &format!("/notes/{note}/attachments"),
            Some(&token),
            Some(json!({"filename": "../escape", "content_type": "text/plain"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(
            "POST",
            "/me/avatar",
            Some(&token),
            Some(json!({"filename": "me.png", "content_type": "image/png"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["key"], format!("avatars/{user}"));

    let (status, _) = app
        .call(
            "POST",
            "/me/avatar",
            Some(&token),
            Some(json!({"filename": "me.exe", "content_type": "application/octet-stream"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn attachment_download_delete_and_listing() {
    let app = app();
    let (_, token) = app.user("alice");
    let note = app.create_note(&token, "files").await;
    let key = format!("attachments/{note}/report.pdf");
    app.db
        .register_attachment(NewAttachment {
            note_id: note,
            object_key: &key,
            file_name: "report.pdf",
            mime_type: "application/pdf",
            size: 2048,
        })
        .unwrap();

    let (status, body) = app.call("GET", "/notes/attachments", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["attachments"][0]["note"]["id"], note.to_string());
    let attachment = body["attachments"][0]["attachment"]["id"].as_str().unwrap().to_string();

    let (_, body) = app
        .call("GET", "/notes/attachments?mime_type=image/", Some(&token), None)
        .await;
    assert_eq!(body["total"], 0);

    let (status, body) = app
        .call("GET", &format!("/notes/{note}/attachments/{attachment}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url"], format!("https://objects.test/{key}?method=GET"));

    let (status, _) = app
        .call("DELETE", &format!("/notes/{note}/attachments/{attachment}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(*app.store.deleted.lock().unwrap(), vec![key]);

    let (status, _) = app
        .call("GET", &format!("/notes/{note}/attachments/{attachment}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sharing_upserts_lists_and_revokes() {
    let app = app();
    let (_, alice) = app.user("alice");
    let (bob_id, bob) = app.user("bob");
    let note = app.create_note(&alice, "plans").await;
    let share_uri = format!("/notes/{note}/share");

    let (status, _) = app
        .call("POST", &share_uri, Some(&alice), Some(json!({"shared_with": "bob@x.com", "permission": "read"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = app
        .call("POST", &share_uri, Some(&alice), Some(json!({"shared_with": "bob@x.com", "permission": "write"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["shared"].as_array().unwrap().len(), 1);
    assert_eq!(body["shared"][0]["permission"], "write");
    assert_eq!(body["shared"][0]["with"]["username"], "bob");

    let (status, body) = app
        .call("POST", &share_uri, Some(&alice), Some(json!({"shared_with": "bob", "permission": "owner"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "ValidationError");

    let (status, _) = app
        .call("POST", &share_uri, Some(&alice), Some(json!({"shared_with": "nobody", "permission": "read"})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app.call("GET", "/notes/shared", Some(&bob), None).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["notes"][0]["title"], "plans");
    assert_eq!(body["notes"][0]["permission"], "write");

    let revoke = format!("/notes/{note}/share/{bob_id}");
    let (status, _) = app.call("DELETE", &revoke, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.call("DELETE", &revoke, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = app.call("GET", &share_uri, Some(&alice), None).await;
    assert_eq!(body["shared"].as_array().unwrap().len(), 0);
    let (_, body) = app.call("GET", "/notes/shared", Some(&bob), None).await;
    assert_eq!(body["total"], 0);
}
