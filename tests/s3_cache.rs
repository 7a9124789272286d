//! S3 cache store against a local S3-compatible endpoint.

use autodoc::aws::{hex_sha256, AwsCredentials};
use autodoc::cache::{CacheStore, S3CacheStore};
use autodoc::config::CacheConfig;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const NO_SUCH_KEY: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message></Error>";

struct StoredObject {
    content_type: String,
    payload_hash: String,
    body: String,
}

/// Bucket `docs` served path-style. `denied.html` answers the way S3 does
/// without ListBucket permission; `broken.html` fails with a server error.
#[derive(Clone, Default)]
struct FakeS3 {
    objects: Arc<Mutex<HashMap<String, StoredObject>>>,
    authorizations: Arc<Mutex<Vec<String>>>,
}

impl FakeS3 {
    fn record_auth(&self, headers: &HeaderMap) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        self.authorizations.lock().unwrap().push(auth);
    }
}

async fn get_object(State(s3): State<FakeS3>, Path(key): Path<String>, headers: HeaderMap) -> Response {
    s3.record_auth(&headers);
    match key.as_str() {
        "denied.html" => (StatusCode::FORBIDDEN, NO_SUCH_KEY).into_response(),
        "broken.html" => (StatusCode::INTERNAL_SERVER_ERROR, "<Error><Code>InternalError</Code></Error>")
            .into_response(),
        _ => match s3.objects.lock().unwrap().get(&key) {
            Some(obj) => (StatusCode::OK, obj.body.clone()).into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        },
    }
}

async fn put_object(
    State(s3): State<FakeS3>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    s3.record_auth(&headers);
    if key == "broken.html" {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    s3.objects.lock().unwrap().insert(
        key,
        StoredObject {
            content_type: header("content-type"),
            payload_hash: header("x-amz-content-sha256"),
            body,
        },
    );
    StatusCode::OK
}

async fn spawn_s3() -> (S3CacheStore, FakeS3) {
    let s3 = FakeS3::default();
    let app = Router::new()
        .route("/docs/{key}", get(get_object).put(put_object))
        .with_state(s3.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = CacheConfig {
        backend: "s3".to_string(),
        bucket: Some("docs".to_string()),
        endpoint_url: Some(format!("http://{}", addr)),
        ..CacheConfig::default()
    };
    let creds = AwsCredentials {
        access_key_id: "AKIDEXAMPLE".to_string(),
        secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
        session_token: None,
    };
    let store = S3CacheStore::with_credentials(&config, creds).unwrap();
    (store, s3)
}

#[tokio::test]
async fn test_missing_object_is_a_miss() {
    let (store, s3) = spawn_s3().await;

    assert_eq!(store.get("abc123").await.unwrap(), None);
    let auths = s3.authorizations.lock().unwrap();
    assert!(auths[0].starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
    assert!(auths[0].contains("/us-east-1/s3/aws4_request"));
}

#[tokio::test]
async fn test_forbidden_no_such_key_is_a_miss() {
    let (store, _s3) = spawn_s3().await;
    assert_eq!(store.get("denied").await.unwrap(), None);
}

#[tokio::test]
async fn test_server_error_is_an_error() {
    let (store, _s3) = spawn_s3().await;

    let err = store.get("broken").await.unwrap_err().to_string();
    assert!(err.contains("500"), "{}", err);
    assert!(err.contains("InternalError"), "{}", err);

    let err = store.put("broken", "<p>doc</p>").await.unwrap_err().to_string();
    assert!(err.contains("503"), "{}", err);
}

#[tokio::test]
async fn test_put_then_get() {
    let (store, s3) = spawn_s3().await;
    let html = "<style>h2{}</style>\n<h2>Service Overview</h2>";

    store.put("abc123", html).await.unwrap();
    {
        let objects = s3.objects.lock().unwrap();
        let obj = objects.get("abc123.html").unwrap();
        assert_eq!(obj.content_type, "text/html");
        assert_eq!(obj.payload_hash, hex_sha256(html.as_bytes()));
        assert_eq!(obj.body, html);
    }

    assert_eq!(store.get("abc123").await.unwrap().as_deref(), Some(html));
    assert_eq!(store.get("def456").await.unwrap(), None);
}
