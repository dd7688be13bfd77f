use std::time::Duration;

use super::*;
use crate::engine::RemoteCredentials;

fn credentials(use_ssh_key: bool) -> RemoteCredentials {
    RemoteCredentials {
        address: "seedbox.example.com".to_string(),
        port: 2222,
        username: "alice".to_string(),
        password: "secret".to_string(),
        use_ssh_key,
    }
}

#[test]
fn parses_classified_listing() {
    let out = "\
      4096 /home/alice/files/Some Show/
 734003200 /home/alice/files/movie.mkv
        12 /home/alice/files/link@
";
    let entries = parse_listing(out).unwrap();
    assert_eq!(
        entries,
        vec![
            RemoteEntry::new("Some Show", ItemKind::Directory, None),
            RemoteEntry::new("movie.mkv", ItemKind::File, Some(734_003_200)),
            RemoteEntry::new("link", ItemKind::File, Some(12)),
        ]
    );
}

#[test]
fn bare_names_and_dot_entries() {
    let out = "10 a.txt\n4096 ./\n4096 ../\n\n20 b c.txt\n";
    let entries = parse_listing(out).unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["a.txt", "b c.txt"]);
}

#[test]
fn malformed_line_is_an_error() {
    assert!(matches!(
        parse_listing("abc def\n"),
        Err(ListingError::Malformed(line)) if line == "abc def"
    ));
    assert!(matches!(parse_listing("123\n"), Err(ListingError::Malformed(_))));
}

#[test]
fn du_sizes_are_keyed_by_directory_name() {
    let out = "\
1048576\t/home/alice/files/Some Show
20\t/home/alice/files/empty/
734003200\t/home/alice/files/
garbage line
";
    let sizes = parse_tree_sizes(out, "/home/alice/files/");
    assert_eq!(sizes.len(), 2);
    assert_eq!(sizes["Some Show"], 1_048_576);
    assert_eq!(sizes["empty"], 20);
}

#[test]
fn directories_take_their_du_size() {
    let out = "\
1048576\t/home/alice/files/Some Show
1782579200\t/home/alice/files
__pullsync_listing__
      4096 /home/alice/files/Some Show/
      4096 /home/alice/files/New/
 734003200 /home/alice/files/movie.mkv
";
    let entries = parse_remote_output(out, "/home/alice/files").unwrap();
    assert_eq!(
        entries,
        vec![
            RemoteEntry::new("Some Show", ItemKind::Directory, Some(1_048_576)),
            RemoteEntry::new("New", ItemKind::Directory, None),
            RemoteEntry::new("movie.mkv", ItemKind::File, Some(734_003_200)),
        ]
    );

    // A failed du still leaves the marker and the listing.
    let entries = parse_remote_output("__pullsync_listing__\n10 a.txt\n", "/r").unwrap();
    assert_eq!(entries, vec![RemoteEntry::new("a.txt", ItemKind::File, Some(10))]);

    assert!(matches!(
        parse_remote_output("10 a.txt\n", "/r"),
        Err(ListingError::Malformed(_))
    ));
}

#[test]
fn remote_script_opens_and_lists_directory() {
    let lister = LftpRemoteLister::new(
        "lftp",
        credentials(false),
        "/home/alice/files/",
        Duration::from_secs(5),
    );
    assert_eq!(
        lister.script(),
        "set sftp:auto-confirm yes; open -u \"alice,secret\" -p 2222 sftp://seedbox.example.com; \
         du -d 1 --block-size=1 \"/home/alice/files/\"; echo __pullsync_listing__; \
         cls -1 --classify -s --block-size=1 \"/home/alice/files/\""
    );
    let keyed = LftpRemoteLister::new("lftp", credentials(true), "/r", Duration::from_secs(5));
    assert!(keyed.script().contains("-u \"alice,\""));
}

#[tokio::test]
async fn remote_spawn_failure_is_reported() {
    let lister = LftpRemoteLister::new(
        "/nonexistent/bin/lftp",
        credentials(false),
        "/r",
        Duration::from_secs(5),
    );
    assert!(matches!(
        lister.list().await,
        Err(ListingError::Spawn { .. })
    ));
}

#[tokio::test]
async fn missing_local_dir_is_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let lister = FsLocalLister::new(tmp.path().join("not-there"));
    assert!(lister.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn local_listing_sizes_and_skips_temp_files() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    std::fs::write(root.join("b.iso"), vec![0u8; 100]).unwrap();
    std::fs::write(root.join("c.iso.lftp"), vec![0u8; 50]).unwrap();
    std::fs::write(root.join("b.iso.lftp-pget-status"), b"pos").unwrap();
    std::fs::create_dir_all(root.join("A Show/Season 1")).unwrap();
    std::fs::write(root.join("A Show/ep1.mkv"), vec![0u8; 30]).unwrap();
    std::fs::write(root.join("A Show/Season 1/ep2.mkv"), vec![0u8; 12]).unwrap();
    std::fs::write(root.join("A Show/Season 1/ep3.mkv.lftp"), vec![0u8; 99]).unwrap();

    let entries = FsLocalLister::new(root).list().await.unwrap();
    assert_eq!(
        entries,
        vec![
            LocalEntry {
                name: "A Show".to_string(),
                is_dir: true,
                size: 42,
            },
            LocalEntry {
                name: "b.iso".to_string(),
                is_dir: false,
                size: 100,
            },
        ]
    );
}
