//! Filesystem Integration Tests
//!
//! Tests for crawling with exclusions, recursive delete, copy, link,
//! metadata and debounced watching.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use filetime::FileTime;
use kiln::fs::{crawl, Depth, Exclusions, FileSystem, PathResolver};
use tempfile::TempDir;

fn touch(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn service(root: &Path) -> FileSystem {
    FileSystem::new(PathResolver::new(root))
}

#[tokio::test]
async fn test_get_files_prunes_excluded_directory() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    touch(&root.join("src/a.js"), "a");
    touch(&root.join("src/sub/b.js"), "b");

    let fs = service(root);
    let exclusions = Exclusions::from_entries(fs.resolver(), ["sub"]);
    let listing = fs
        .get_files("./src", "./.kiln/tmp", &exclusions, Depth::Unlimited)
        .await;

    assert_eq!(listing.files.len(), 1);
    let record = &listing.files[0];
    assert_eq!(record.name, "a.js");
    assert_eq!(record.full_path, root.join("src/a.js"));
    assert_eq!(record.working_path, root.join(".kiln/tmp/src"));
    assert!(!listing.directories.contains(&root.join("src/sub")));
}

#[tokio::test]
async fn test_crawl_never_returns_files_under_excluded_paths() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    for file in ["x/1.txt", "x/d/2.txt", "y/3.txt", "y/d/4.txt", "y/d/e/5.txt", "6.txt"] {
        touch(&root.join(file), "");
    }

    let resolver = PathResolver::new(root);
    for excluded in ["./x", "./y/d", "d"] {
        let exclusions = Exclusions::from_entries(&resolver, [excluded]);
        let result = crawl(root, &exclusions, Depth::Unlimited).await;
        let dir = resolver.absolute(excluded);

        for file in &result.files {
            assert!(!file.starts_with(&dir), "{} leaked for {}", file.display(), excluded);
        }
        assert!(!result.directories.contains(&dir));
    }
}

#[tokio::test]
async fn test_excluded_name_is_pruned_at_every_depth() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    touch(&root.join("src/a.js"), "a");
    touch(&root.join("src/vendor/v.js"), "v");
    touch(&root.join("src/lib/b.js"), "b");
    touch(&root.join("src/lib/deep/vendor/w.js"), "w");

    let resolver = PathResolver::new(root);
    let exclusions = Exclusions::from_entries(&resolver, ["vendor"]);
    let result = crawl(&root.join("src"), &exclusions, Depth::Unlimited).await;

    let mut files = result.files.clone();
    files.sort();
    assert_eq!(files, vec![root.join("src/a.js"), root.join("src/lib/b.js")]);
    assert!(result.directories.contains(&root.join("src/lib/deep")));
    assert!(!result.directories.contains(&root.join("src/vendor")));
    assert!(!result.directories.contains(&root.join("src/lib/deep/vendor")));
}

#[tokio::test]
async fn test_delete_nested_tree_and_missing_path() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    touch(&root.join("tree/a.txt"), "a");
    touch(&root.join("tree/one/b.txt"), "b");
    touch(&root.join("tree/one/two/c.txt"), "c");
    std::fs::create_dir_all(root.join("tree/empty")).unwrap();

    let fs = service(root);
    fs.delete("./tree").await.unwrap();
    assert!(!root.join("tree").exists());

    // Missing paths are not an error
    fs.delete("./tree").await.unwrap();
    fs.delete(vec!["./nothing", "here.txt"]).await.unwrap();
}

#[tokio::test]
async fn test_copy_creates_parents() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    touch(&root.join("src/a.js"), "content");

    let fs = service(root);
    let dest = fs.copy("./src/a.js", "./out/deep/er/a.js").await.unwrap();

    assert_eq!(dest, root.join("out/deep/er/a.js"));
    assert_eq!(std::fs::read_to_string(dest).unwrap(), "content");
}

#[tokio::test]
async fn test_metadata_reports_modification_time() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let file = root.join("old.txt");
    touch(&file, "x");

    let an_hour_ago = SystemTime::now() - Duration::from_secs(3600);
    filetime::set_file_mtime(&file, FileTime::from_system_time(an_hour_ago)).unwrap();

    let fs = service(root);
    let metadata = fs.metadata("./old.txt").await.unwrap();
    let age = chrono::Utc::now() - metadata.last_modified;
    assert!(age.num_minutes() >= 59);
    assert!(!metadata.is_dir);

    assert!(fs.metadata("./missing.txt").await.is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn test_link_directory_and_failure_is_value() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    touch(&root.join("real/a.txt"), "a");

    let fs = service(root);
    fs.link("./real", "./alias").await.unwrap();
    assert_eq!(std::fs::read_to_string(root.join("alias/a.txt")).unwrap(), "a");

    // The link already exists
    assert!(fs.link("./real", "./alias").await.is_err());
}

#[tokio::test]
async fn test_rapid_writes_produce_one_notification() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let file = root.join("watched.txt");
    touch(&file, "0");

    let fs = service(root).with_debounce(Duration::from_millis(400));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handle = fs
        .watch("./", move |path| sink.lock().unwrap().push(path))
        .unwrap();

    // Let the watcher settle before writing
    tokio::time::sleep(Duration::from_millis(100)).await;
    for i in 1..=5 {
        std::fs::write(&file, i.to_string()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    tokio::time::sleep(Duration::from_millis(1500)).await;
    handle.release();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1, "expected one notification, got {:?}", *seen);
    assert!(seen[0].ends_with("watched.txt"));
}

#[tokio::test]
async fn test_changes_to_different_files_share_one_window() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    touch(&root.join("a.txt"), "0");
    touch(&root.join("b.txt"), "0");

    let fs = service(root).with_debounce(Duration::from_millis(1000));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handle = fs
        .watch("./", move |path| sink.lock().unwrap().push(path))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    std::fs::write(root.join("a.txt"), "1").unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    std::fs::write(root.join("b.txt"), "1").unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    handle.release();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1, "expected one notification, got {:?}", *seen);
    assert!(seen[0].ends_with("a.txt"));
}
