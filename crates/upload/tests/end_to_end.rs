use std::sync::Arc;

use blossom_client::{BlobServer, Client};
use blossom_protocol::{
    BlobDescriptor, ServerEndpoint, ServerRole, SignedEvent, Signer, SignerError,
};
use blossom_transfer::{FileSource, MemorySource, checksum_bytes};
use blossom_upload::{
    FallbackPolicy, MirrorCoordinator, OrchestratorConfig, SessionConfig, UploadBlob,
    UploadMethod, UploadOrchestrator,
};
use chrono::{TimeZone, Utc};
use futures_util::future::BoxFuture;
use httpmock::Method::{HEAD, OPTIONS, PATCH, PUT};
use httpmock::MockServer;
use serde_json::json;

const MIB: u64 = 1024 * 1024;

struct TestSigner;

impl Signer for TestSigner {
    fn create_upload_auth<'a>(
        &'a self,
        sha256: &'a str,
    ) -> BoxFuture<'a, Result<SignedEvent, SignerError>> {
        Box::pin(async move {
            Ok(SignedEvent(json!({
                "kind": 24242,
                "content": "Upload",
                "tags": [["t", "upload"], ["x", sha256]],
            })))
        })
    }
}

fn server_for(mock: &MockServer, role: ServerRole) -> Arc<dyn BlobServer> {
    let endpoint = ServerEndpoint::parse(&mock.base_url(), role).unwrap();
    Arc::new(Client::new(endpoint).unwrap())
}

#[tokio::test]
async fn seventeen_mib_upload_in_three_chunks() {
    let data: Vec<u8> = (0..17 * MIB).map(|i| (i % 251) as u8).collect();
    let sha = checksum_bytes(&data);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.mp4");
    std::fs::write(&path, &data).unwrap();

    let server = MockServer::start_async().await;
    let head = server
        .mock_async(|when, then| {
            when.method(HEAD).path(format!("/{sha}"));
            then.status(404);
        })
        .await;
    let options = server
        .mock_async(|when, then| {
            when.method(OPTIONS).path("/upload");
            then.status(204)
                .header("Accept-Patch", "application/octet-stream")
                .header("Max-Chunk-Size", "8388608");
        })
        .await;

    let mut leading = Vec::new();
    for offset in [0, 8 * MIB] {
        leading.push(
            server
                .mock_async(|when, then| {
                    when.method(PATCH)
                        .path("/upload")
                        .header("upload-offset", offset.to_string())
                        .header("upload-length", (17 * MIB).to_string())
                        .header("content-length", (8 * MIB).to_string())
                        .header("x-sha-256", sha.as_str())
                        .header("upload-type", "video/mp4");
                    then.status(204);
                })
                .await,
        );
    }
    let last = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path("/upload")
                .header("upload-offset", (16 * MIB).to_string())
                .header("content-length", MIB.to_string());
            then.status(200).json_body(json!({
                "url": server.url(format!("/{sha}.mp4")),
                "sha256": sha,
                "size": 17 * MIB,
                "type": "video/mp4",
                "uploaded": 1725105921
            }));
        })
        .await;

    let source = FileSource::open(&path).await.unwrap();
    let blob = UploadBlob::new(Arc::new(source), "video/mp4");
    let orchestrator = UploadOrchestrator::new(
        Arc::new(TestSigner),
        OrchestratorConfig {
            session: SessionConfig {
                chunk_size: 8 * MIB,
                ..SessionConfig::default()
            },
            fallback: FallbackPolicy::Strict,
        },
    );

    let results = orchestrator
        .upload_to_servers(&blob, &[server_for(&server, ServerRole::Upload)])
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].method, UploadMethod::Chunked);
    let desc = results[0].descriptor().expect("upload succeeded");
    assert_eq!(desc.size, 17_825_792);
    assert_eq!(desc.sha256, sha);

    head.assert_async().await;
    options.assert_async().await;
    for mock in &leading {
        mock.assert_async().await;
    }
    last.assert_async().await;
}

#[tokio::test]
async fn mirror_to_server_that_already_has_blob() {
    let sha = "b1674191a88ec5cdd733e4240a81803105dc412d6c6708d53ab94fc248f4f553";
    let mirror = MockServer::start_async().await;
    let head = mirror
        .mock_async(|when, then| {
            when.method(HEAD).path(format!("/{sha}"));
            then.status(200);
        })
        .await;
    let put_mirror = mirror
        .mock_async(|when, then| {
            when.method(PUT).path("/mirror");
            then.status(200);
        })
        .await;

    let original = BlobDescriptor {
        url: format!("https://origin.example.com/{sha}.mp4"),
        sha256: sha.into(),
        size: 184_292,
        mime_type: "video/mp4".into(),
        uploaded_at: Utc.timestamp_opt(1725105921, 0).unwrap(),
    };

    let coordinator = MirrorCoordinator::new(Arc::new(TestSigner));
    let mirrored = coordinator
        .mirror(&original, &[server_for(&mirror, ServerRole::Mirror)])
        .await;

    assert_eq!(mirrored.len(), 1);
    assert_eq!(mirrored[0].sha256, original.sha256);
    assert_eq!(mirrored[0].size, original.size);
    assert_eq!(mirrored[0].url, format!("{}/{sha}.mp4", mirror.base_url()));

    head.assert_async().await;
    assert_eq!(put_mirror.hits_async().await, 0);
}

#[tokio::test]
async fn server_without_chunked_support_gets_single_put() {
    let data = b"subtitle track contents".to_vec();
    let sha = checksum_bytes(&data);

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(HEAD).path(format!("/{sha}"));
            then.status(404);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(OPTIONS).path("/upload");
            then.status(405);
        })
        .await;
    let put = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/upload")
                .header("x-sha-256", sha.as_str())
                .body("subtitle track contents");
            then.status(201).json_body(json!({
                "url": server.url(format!("/{sha}.vtt")),
                "sha256": sha,
                "size": data.len(),
                "type": "text/vtt",
                "uploaded": 1725105921
            }));
        })
        .await;

    let blob = UploadBlob::new(Arc::new(MemorySource::new(data.clone())), "text/vtt");
    let orchestrator = UploadOrchestrator::new(Arc::new(TestSigner), OrchestratorConfig::default());

    let results = orchestrator
        .upload_to_servers(&blob, &[server_for(&server, ServerRole::Upload)])
        .await
        .unwrap();

    assert_eq!(results[0].method, UploadMethod::SingleShot);
    assert!(results[0].is_success());
    put.assert_async().await;
}
