//! Scanner behavior against a stand-in search tool written in POSIX sh.
#![cfg(unix)]

use std::path::Path;
use std::time::Duration;

use todone_core::{cancel_pair, CancelSignal, Repository, SearchConfig, TodoneError};
use todone_scan::Scanner;

fn script_scanner(dir: &Path, body: &str) -> Scanner {
    let script = dir.join("fake-rg.sh");
    std::fs::write(&script, body).unwrap();
    Scanner::new(SearchConfig {
        command: "sh".into(),
        args: vec![script.to_string_lossy().into_owned()],
        ..SearchConfig::default()
    })
}

#[tokio::test]
async fn exit_zero_output_is_parsed() {
    let dir = tempfile::tempdir().unwrap();
    let scanner = script_scanner(
        dir.path(),
        "cat <<'EOF'\nmain.go-10-foo()\nmain.go:11:// TODO fix bug\nmain.go-12-bar()\nEOF\n",
    );
    let units = scanner
        .scan_repo(&Repository::new("svc", "."), &CancelSignal::never())
        .await
        .unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].repo_name, "svc");
    assert_eq!(units[0].line_number, 11);
    assert_eq!(units[0].context_lines, vec!["foo()", "// TODO fix bug", "bar()"]);
}

#[tokio::test]
async fn no_match_status_is_empty_even_with_output() {
    let dir = tempfile::tempdir().unwrap();
    let scanner = script_scanner(dir.path(), "echo 'noise that is not rg output'\nexit 1\n");
    let units = scanner
        .scan_repo(&Repository::new("svc", "."), &CancelSignal::never())
        .await
        .unwrap();
    assert!(units.is_empty());
}

#[tokio::test]
async fn error_status_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let scanner = script_scanner(dir.path(), "echo 'rg: bad flag' >&2\nexit 2\n");
    let err = scanner
        .scan_repo(&Repository::new("svc", "."), &CancelSignal::never())
        .await
        .unwrap_err();
    match err {
        TodoneError::Extraction { repo, detail } => {
            assert_eq!(repo, "svc");
            assert!(detail.contains("status 2"), "{detail}");
            assert!(detail.contains("rg: bad flag"), "{detail}");
        }
        other => panic!("expected extraction error, got {other:?}"),
    }
}

#[tokio::test]
async fn receives_search_flags_and_path() {
    let dir = tempfile::tempdir().unwrap();
    let args_file = dir.path().join("args.txt");
    let body = format!(
        "printf '%s\\n' \"$@\" > '{}'\nexit 1\n",
        args_file.display()
    );
    let scanner = script_scanner(dir.path(), &body);
    scanner
        .scan_repo(&Repository::new("svc", "/work/svc"), &CancelSignal::never())
        .await
        .unwrap();

    let recorded = std::fs::read_to_string(&args_file).unwrap();
    let args: Vec<&str> = recorded.lines().collect();
    assert!(args.contains(&"--line-number"));
    assert!(args.contains(&"--no-heading"));
    assert!(args.contains(&"--context"));
    assert!(args.contains(&"5"));
    assert!(args.contains(&"TODO"));
    assert_eq!(args.last(), Some(&"/work/svc"));
}

#[tokio::test]
async fn repositories_scanned_in_configuration_order() {
    let dir = tempfile::tempdir().unwrap();
    let scanner = script_scanner(
        dir.path(),
        "for last; do :; done\necho \"$last/a.rs:1:// TODO in $last\"\n",
    );
    let repos = vec![
        Repository::new("first", "one"),
        Repository::new("second", "two"),
        Repository::new("third", "three"),
    ];
    let units = scanner.scan_all(&repos, &CancelSignal::never()).await.unwrap();
    let names: Vec<&str> = units.iter().map(|u| u.repo_name.as_str()).collect();
    assert_eq!(names, vec!["first", "second", "third"]);
    assert_eq!(units[1].file, "two/a.rs");
    assert_eq!(units[2].match_text, "// TODO in three");
}

#[tokio::test]
async fn failing_repository_aborts_the_scan() {
    let dir = tempfile::tempdir().unwrap();
    let scanner = script_scanner(
        dir.path(),
        "for last; do :; done\nif [ \"$last\" = bad ]; then exit 2; fi\necho \"$last/a.rs:1:// TODO\"\n",
    );
    let repos = vec![
        Repository::new("good", "good"),
        Repository::new("broken", "bad"),
        Repository::new("never", "never"),
    ];
    let err = scanner
        .scan_all(&repos, &CancelSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, TodoneError::Extraction { ref repo, .. } if repo == "broken"));
}

#[tokio::test]
async fn cancellation_stops_a_slow_search() {
    let dir = tempfile::tempdir().unwrap();
    let scanner = script_scanner(dir.path(), "sleep 30\n");
    let (handle, signal) = cancel_pair();

    let task = tokio::spawn(async move {
        scanner
            .scan_repo(&Repository::new("slow", "."), &signal)
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("scan should stop promptly")
        .unwrap();
    assert!(matches!(result, Err(TodoneError::Cancelled)));
}
