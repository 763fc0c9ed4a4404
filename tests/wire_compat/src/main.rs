fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use shardlift_protocol::{
        CancelRequest, CheckRequest, CheckResponse, ChunkFields, ChunkResponse, CompleteRequest,
        CompleteResponse, InitRequest, InitResponse, parse_chunk_identifier,
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

    /// Normalizes numbers so that `60` and `60.0` compare equal; backends
    /// written in dynamically typed languages emit integral floats bare.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => serde_json::json!(f),
                None => v.clone(),
            },
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect(),
            ),
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    /// Deserializes a fixture, re-serializes it and compares the JSON values.
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
            normalize_value(&fixture),
            normalize_value(&reserialized),
            "roundtrip mismatch for {name}:\n  wire: {fixture}\n  Rust: {reserialized}"
        );
        parsed
    }

    // --- Requests ---

    #[test]
    fn fixture_check_request() {
        let req = roundtrip_test::<CheckRequest>("check_request.json");
        assert_eq!(req.file_size, 24_117_248);
    }

    #[test]
    fn fixture_init_request() {
        let req = roundtrip_test::<InitRequest>("init_request.json");
        assert_eq!(req.total_chunks, 5);
        assert_eq!(req.chunk_size, 5 * 1024 * 1024);
    }

    #[test]
    fn fixture_chunk_fields() {
        let fields = roundtrip_test::<ChunkFields>("chunk_fields.json");
        assert_eq!(fields.chunk_index, 3);
        assert_eq!(fields.chunk_fingerprint.len(), 64);
    }

    #[test]
    fn fixture_complete_request() {
        roundtrip_test::<CompleteRequest>("complete_request.json");
    }

    #[test]
    fn fixture_cancel_request() {
        roundtrip_test::<CancelRequest>("cancel_request.json");
    }

    // --- Responses ---

    #[test]
    fn fixture_check_response_resume() {
        let resp = roundtrip_test::<CheckResponse>("check_response_resume.json");
        let fp = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";
        let indices: Vec<u32> = resp
            .satisfied_chunk_identifiers
            .unwrap()
            .iter()
            .filter_map(|id| parse_chunk_identifier(fp, id))
            .collect();
        assert_eq!(indices, vec![0, 2, 4]);
        assert_eq!(resp.session.unwrap().total_chunks, 5);
    }

    #[test]
    fn fixture_check_response_legacy() {
        let resp = roundtrip_test::<CheckResponse>("check_response_legacy.json");
        assert!(resp.satisfied_chunk_identifiers.is_none());
        assert_eq!(resp.resume_meta.unwrap().uploaded_count, 2);
    }

    #[test]
    fn fixture_check_response_instant() {
        let resp = roundtrip_test::<CheckResponse>("check_response_instant.json");
        assert!(resp.exists && resp.complete);
        assert!(resp.url.is_some());
    }

    #[test]
    fn fixture_init_response() {
        let resp = roundtrip_test::<InitResponse>("init_response.json");
        assert!(resp.success);
        assert_eq!(resp.session.unwrap().session_id, "sess-7f3a");
    }

    #[test]
    fn fixture_chunk_response() {
        let resp = roundtrip_test::<ChunkResponse>("chunk_response.json");
        assert!(resp.part_tag.is_some());
    }

    #[test]
    fn fixture_complete_response_failed() {
        let resp = roundtrip_test::<CompleteResponse>("complete_response_failed.json");
        assert!(!resp.success);
        assert!(resp.url.is_none());
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let json = r#"{"exists":false,"complete":false,"serverVersion":"2.1"}"#;
        let resp: CheckResponse = serde_json::from_str(json).unwrap();
        assert!(!resp.exists);
    }
}
