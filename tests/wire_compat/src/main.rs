fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use blossom_media::{ResolvedUrl, ServerAvailability, resolve};
    use blossom_protocol::{
        BlobDescriptor, ChunkedSupport, MirrorRequest, ServerEndpoint, ServerRole, SignedEvent,
        UploadCapabilities, authorization_header,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture into `T`, re-serializes it, and requires the
    /// JSON to come back unchanged (key order aside).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  wire: {fixture}\n  Rust: {reserialized}"
        );
        parsed
    }

    // --- Server responses ---

    #[test]
    fn fixture_blob_descriptor() {
        let desc = roundtrip_test::<BlobDescriptor>("blob_descriptor.json");
        assert_eq!(desc.size, 184_292);
        assert_eq!(desc.mime_type, "video/mp4");
        assert_eq!(desc.uploaded_at.timestamp(), 1_725_105_921);
        assert_eq!(desc.extension().as_deref(), Some("mp4"));
    }

    #[test]
    fn fixture_blob_descriptor_list() {
        let list = roundtrip_test::<Vec<BlobDescriptor>>("blob_descriptor_list.json");
        assert_eq!(list.len(), 2);
        assert!(list[1].mime_type.is_empty(), "missing type stays empty");
        assert_eq!(list[1].size, 0);
    }

    #[test]
    fn legacy_descriptor_without_uploaded() {
        let json = serde_json::json!({
            "url": "https://cdn.satellite.earth/b1674191a88ec5cdd733e4240a81803105dc412d6c6708d53ab94fc248f4f553.png",
            "sha256": "b1674191a88ec5cdd733e4240a81803105dc412d6c6708d53ab94fc248f4f553",
            "size": 42,
            "type": "image/png"
        });
        let desc: BlobDescriptor =
            serde_json::from_value(json).expect("descriptor without uploaded should parse");
        assert_eq!(desc.size, 42);
        assert!(desc.uploaded_at.timestamp() > 0, "uploaded defaults to now");
    }

    #[test]
    fn descriptor_with_unknown_fields() {
        // Servers add NIP-94 tags and other extras; they must be ignored.
        let mut json = load_fixture("blob_descriptor.json");
        json["nip94"] = serde_json::json!([["x", "abc"]]);
        json["owner"] = serde_json::json!("someone");
        let desc: BlobDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(desc.size, 184_292);
    }

    // --- Request bodies and client state ---

    #[test]
    fn fixture_mirror_request() {
        let req = roundtrip_test::<MirrorRequest>("mirror_request.json");
        assert!(req.url.ends_with(".mp4"));
    }

    #[test]
    fn fixture_upload_capabilities() {
        let caps = roundtrip_test::<UploadCapabilities>("upload_capabilities.json");
        assert!(caps.supports_chunked());
        assert_eq!(caps.max_chunk_size, Some(8_388_608));
    }

    #[test]
    fn fixture_upload_capabilities_unknown() {
        let caps = roundtrip_test::<UploadCapabilities>("upload_capabilities_unknown.json");
        assert!(!caps.supports_chunked());
        assert!(matches!(caps.chunked, ChunkedSupport::Unknown(ref c) if c.contains("refused")));
        assert_eq!(caps.max_chunk_size, None);
    }

    #[test]
    fn fixture_server_endpoint() {
        let ep = roundtrip_test::<ServerEndpoint>("server_endpoint.json");
        assert_eq!(ep.role(), ServerRole::Mirror);
        assert_eq!(ep.host(), "blossom.example.com");
    }

    #[test]
    fn legacy_server_endpoint_is_normalized() {
        let json = serde_json::json!({
            "url": "HTTPS://Blossom.Example.com/upload/",
            "role": "upload-initial"
        });
        let ep: ServerEndpoint = serde_json::from_value(json).unwrap();
        assert_eq!(ep.base_url(), "https://blossom.example.com");
        assert_eq!(ep.role(), ServerRole::Upload);

        let out = serde_json::to_value(&ep).unwrap();
        assert_eq!(out["role"], "upload");
    }

    #[test]
    fn fixture_signed_event() {
        let event = roundtrip_test::<SignedEvent>("signed_event.json");
        let header = authorization_header(&event).unwrap();
        assert!(header.starts_with("Nostr "));
    }

    // --- Media ---

    #[test]
    fn fixture_server_availability() {
        let availability = roundtrip_test::<ServerAvailability>("server_availability.json");
        assert_eq!(availability.http_status, Some(200));
        assert_eq!(availability.content_length, Some(184_292));
    }

    #[test]
    fn fixture_resolved_urls() {
        let fixture = roundtrip_test::<Vec<ResolvedUrl>>("resolved_urls.json");

        let mirrors =
            [ServerEndpoint::parse("https://blossom.example.com", ServerRole::Mirror).unwrap()];
        let proxies =
            [ServerEndpoint::parse("https://proxy.example.com", ServerRole::Proxy).unwrap()];
        let resolved = resolve(
            &[fixture[1].url.as_str()],
            &mirrors,
            &proxies,
            None,
            Some("3BF0C63FCB93463407AF97A5E5EE64FA883D107EF9E558472C4EB9AAAEFA459D"),
        );
        assert_eq!(resolved.into_vec(), fixture);
    }
}
