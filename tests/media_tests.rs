//! Media upload/download through the dispatcher and the read-through cache.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use wechat_mp_client::api::MediaType;
use wechat_mp_client::storage::{LocalStorage, MediaStorage};
use wechat_mp_client::types::{AppId, AppSecret};
use wechat_mp_client::{ErrorKind, WechatMp};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn builder(base_url: &str, cache_dir: &Path) -> wechat_mp_client::WechatMpBuilder {
    WechatMp::builder()
        .appid(AppId::new("wx1234567890abcdef").unwrap())
        .secret(AppSecret::new("secret1234567890ab").unwrap())
        .base_url(base_url)
        .media_cache_dir(cache_dir)
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/cgi-bin/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "MEDIA_TOKEN",
            "expires_in": 7200
        })))
        .mount(server)
        .await;
}

async fn mount_download(server: &MockServer, media_id: &str, body: &[u8], expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/cgi-bin/media/get"))
        .and(query_param("access_token", "MEDIA_TOKEN"))
        .and(query_param("media_id", media_id))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_vec(), "text/plain"))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Writes part of the data, then fails like a full disk.
struct DiskFullStorage;

impl MediaStorage for DiskFullStorage {
    fn exists(&self, path: &Path) -> bool {
        LocalStorage.exists(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        LocalStorage.create_dir_all(path)
    }

    fn write_new(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let mut file = File::options().write(true).create_new(true).open(path)?;
        file.write_all(&data[..data.len() / 2])?;
        Err(io::Error::new(io::ErrorKind::Other, "no space left on device"))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        LocalStorage.rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        LocalStorage.remove_file(path)
    }
}

#[tokio::test]
async fn test_upload_then_download_round_trip() {
    let server = MockServer::start().await;
    let cache = tempfile::tempdir().unwrap();
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/cgi-bin/media/upload"))
        .and(query_param("access_token", "MEDIA_TOKEN"))
        .and(query_param("type", "image"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "type": "image",
            "media_id": "MEDIA123",
            "created_at": 1_700_000_000
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_download(&server, "MEDIA123", b"hello", 1).await;

    let wechat = builder(&server.uri(), cache.path()).build().unwrap();

    // `.txt` maps to no media type, so the type is declared explicitly.
    let media_id = wechat
        .upload_media_as("a.txt", b"hello", MediaType::Image)
        .await
        .unwrap();
    assert_eq!(media_id, "MEDIA123");

    let cached = wechat.download_media(&media_id, "txt").await.unwrap();

    assert_eq!(cached, cache.path().join("MEDIA123.txt"));
    assert_eq!(fs::read(&cached).unwrap(), b"hello");
    assert_eq!(entries(cache.path()), vec!["MEDIA123.txt".to_string()]);
}

/// The second download of the same id is served from disk.
#[tokio::test]
async fn test_download_cache_hit_makes_no_request() {
    let server = MockServer::start().await;
    let cache = tempfile::tempdir().unwrap();
    mount_token(&server).await;
    mount_download(&server, "VOICE1", b"#!AMR\n0000", 1).await;

    let wechat = builder(&server.uri(), cache.path()).build().unwrap();

    let first = wechat.download_media("VOICE1", "amr").await.unwrap();
    let first_bytes = fs::read(&first).unwrap();
    let second = wechat.download_media("VOICE1", "amr").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(fs::read(&second).unwrap(), first_bytes);
}

/// An existing file wins even if it differs from what the server would send.
#[tokio::test]
async fn test_existing_cache_file_is_not_verified() {
    let server = MockServer::start().await;
    let cache = tempfile::tempdir().unwrap();
    fs::write(cache.path().join("STALE.jpg"), b"old bytes").unwrap();
    mount_token(&server).await;
    mount_download(&server, "STALE", b"new bytes", 0).await;

    let wechat = builder(&server.uri(), cache.path()).build().unwrap();
    let path = wechat.download_media("STALE", "jpg").await.unwrap();

    assert_eq!(fs::read(path).unwrap(), b"old bytes");
}

/// Two concurrent misses on one id may both fetch; the survivor is complete.
#[tokio::test]
async fn test_concurrent_downloads_leave_one_complete_file() {
    let server = MockServer::start().await;
    let cache = tempfile::tempdir().unwrap();
    mount_token(&server).await;

    let body: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
    Mock::given(method("GET"))
        .and(path("/cgi-bin/media/get"))
        .and(query_param("media_id", "X"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(body.clone(), "application/octet-stream")
                .set_delay(std::time::Duration::from_millis(100)),
        )
        .expect(1..=2)
        .mount(&server)
        .await;

    let wechat = builder(&server.uri(), cache.path()).build().unwrap();

    let (first, second) = tokio::join!(
        wechat.download_media("X", "bin"),
        wechat.download_media("X", "bin")
    );
    let first = first.unwrap();

    assert_eq!(first, second.unwrap());
    assert_eq!(fs::read(&first).unwrap(), body);
    assert_eq!(entries(cache.path()), vec!["X.bin".to_string()]);
}

#[tokio::test]
async fn test_failed_cache_write_leaves_no_file() {
    let server = MockServer::start().await;
    let cache = tempfile::tempdir().unwrap();
    mount_token(&server).await;
    mount_download(&server, "BIG", b"0123456789abcdef", 1).await;

    let wechat = builder(&server.uri(), cache.path())
        .storage(Arc::new(DiskFullStorage))
        .build()
        .unwrap();

    let err = wechat.download_media("BIG", "mp4").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(!cache.path().join("BIG.mp4").exists());
    assert!(entries(cache.path()).is_empty());
}

#[tokio::test]
async fn test_download_error_body_is_rejection() {
    let server = MockServer::start().await;
    let cache = tempfile::tempdir().unwrap();
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/cgi-bin/media/get"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"errcode":40007,"errmsg":"invalid media_id"}"#,
            "application/json",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let wechat = builder(&server.uri(), cache.path()).build().unwrap();
    let err = wechat.download_media("GONE", "jpg").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RemoteRejected);
    assert_eq!(err.code(), 40007);
    assert!(!cache.path().join("GONE.jpg").exists());
}

#[tokio::test]
async fn test_upload_auto_classifies_by_content() {
    let server = MockServer::start().await;
    let cache = tempfile::tempdir().unwrap();
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/cgi-bin/media/upload"))
        .and(query_param("type", "image"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "type": "image",
            "media_id": "PNG1",
            "created_at": 1_700_000_000
        })))
        .expect(1)
        .mount(&server)
        .await;

    let wechat = builder(&server.uri(), cache.path()).build().unwrap();
    let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    assert_eq!(wechat.upload_media("upload", &png).await.unwrap(), "PNG1");
}

#[tokio::test]
async fn test_upload_unknown_type_fails_fast() {
    let server = MockServer::start().await;
    let cache = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let wechat = builder(&server.uri(), cache.path()).build().unwrap();
    let err = wechat.upload_media("notes.txt", b"hello").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::LocalValidation);
}

#[tokio::test]
async fn test_thumb_upload_reads_thumb_media_id() {
    let server = MockServer::start().await;
    let cache = tempfile::tempdir().unwrap();
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/cgi-bin/media/upload"))
        .and(query_param("type", "thumb"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "type": "thumb",
            "thumb_media_id": "THUMB1",
            "created_at": 1_700_000_000
        })))
        .expect(1)
        .mount(&server)
        .await;

    let wechat = builder(&server.uri(), cache.path()).build().unwrap();
    let id = wechat
        .upload_media_as("t.jpg", &[0xFF, 0xD8, 0xFF, 0xE0], MediaType::Thumb)
        .await
        .unwrap();

    assert_eq!(id, "THUMB1");
}

#[tokio::test]
async fn test_upload_file_from_disk() {
    let server = MockServer::start().await;
    let cache = tempfile::tempdir().unwrap();
    let source = tempfile::tempdir().unwrap();
    let file = source.path().join("clip.mp4");
    fs::write(&file, b"\x00\x00\x00\x18ftypmp42").unwrap();
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/cgi-bin/media/upload"))
        .and(query_param("type", "video"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "type": "video",
            "media_id": "VIDEO1",
            "created_at": 1_700_000_000
        })))
        .expect(1)
        .mount(&server)
        .await;

    let wechat = builder(&server.uri(), cache.path()).build().unwrap();

    assert_eq!(wechat.upload_media_file(&file).await.unwrap(), "VIDEO1");
}

#[tokio::test]
async fn test_invalid_media_id_fails_fast() {
    let server = MockServer::start().await;
    let cache = tempfile::tempdir().unwrap();

    let wechat = builder(&server.uri(), cache.path()).build().unwrap();

    for media_id in ["", "../escape", "a/b", ".hidden"] {
        let err = wechat.download_media(media_id, "jpg").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LocalValidation, "{media_id:?}");
    }
}
