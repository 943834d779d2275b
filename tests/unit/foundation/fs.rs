use super::*;

fn scratch(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("beatviz_fs_{tag}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[test]
fn ensure_parent_dir_creates_missing_directories() {
    let dir = scratch("parent");
    let file = dir.join("a/b/out.mp4");
    ensure_parent_dir(&file).unwrap();
    assert!(dir.join("a/b").is_dir());
    ensure_parent_dir(Path::new("bare.mp4")).unwrap();
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn temp_paths_are_unique_hidden_siblings() {
    let dir = Path::new("/some/dir");
    let a = unique_temp_path(dir, "clip", "video.mp4");
    let b = unique_temp_path(dir, "clip", "video.mp4");
    assert_ne!(a, b);
    assert_eq!(a.parent(), Some(dir));
    let name = a.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with(".clip."));
    assert!(name.ends_with(".video.mp4"));
}

#[test]
fn guard_removes_file_unless_disarmed() {
    let dir = scratch("guard");
    std::fs::create_dir_all(&dir).unwrap();

    let doomed = dir.join("doomed.tmp");
    std::fs::write(&doomed, b"x").unwrap();
    {
        let guard = TempFileGuard::new(doomed.clone());
        assert_eq!(guard.path(), Some(doomed.as_path()));
    }
    assert!(!doomed.exists());

    let kept = dir.join("kept.tmp");
    std::fs::write(&kept, b"x").unwrap();
    {
        let mut guard = TempFileGuard::new(kept.clone());
        guard.disarm();
        assert_eq!(guard.path(), None);
    }
    assert!(kept.exists());
    let _ = std::fs::remove_dir_all(&dir);
}
