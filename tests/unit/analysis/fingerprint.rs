use super::*;

fn params() -> AnalysisParams {
    AnalysisParams {
        large_file_bytes: 200 * 1024 * 1024,
        long_duration_secs: 600.0,
        long_file_hop_factor: 4,
        reduced_sample_rate: 22_050,
    }
}

fn temp_file(name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!(
        "beatviz_fp_{}_{}_{name}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
    ));
    std::fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn content_hash_depends_only_on_bytes() {
    let a = temp_file("a.bin", b"same bytes");
    let b = temp_file("b.bin", b"same bytes");
    let c = temp_file("c.bin", b"other bytes");
    assert_eq!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    assert_ne!(content_hash(&a).unwrap(), content_hash(&c).unwrap());
    for p in [a, b, c] {
        let _ = std::fs::remove_file(p);
    }
}

#[test]
fn missing_file_is_a_decode_error() {
    let err = content_hash(std::path::Path::new("/definitely/not/here.wav")).unwrap_err();
    assert!(matches!(err, BeatvizError::Decode(_)));
}

#[test]
fn cache_key_changes_with_fps_and_schema() {
    let content = Fingerprint { hi: 1, lo: 2 };
    let fps30 = Fps::integer(30).unwrap();
    let fps60 = Fps::integer(60).unwrap();
    let base = cache_key(content, fps30, 1, &params());
    assert_eq!(base, cache_key(content, fps30, 1, &params()));
    assert_ne!(base, cache_key(content, fps60, 1, &params()));
    assert_ne!(base, cache_key(content, fps30, 2, &params()));

    let mut p = params();
    p.reduced_sample_rate = 16_000;
    assert_ne!(base, cache_key(content, fps30, 1, &p));
}

#[test]
fn hex_round_trips() {
    let fp = Fingerprint {
        hi: 0x0123_4567_89ab_cdef,
        lo: 42,
    };
    let hex = fp.to_hex();
    assert_eq!(hex.len(), 32);
    assert_eq!(Fingerprint::from_hex(&hex), Some(fp));
    assert_eq!(Fingerprint::from_hex("xyz"), None);
}
