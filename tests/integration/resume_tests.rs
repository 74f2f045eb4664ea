//! Resuming after interruptions and crashes

use crate::site::{article_url, create_test_config, detail_requests, mount_article, mount_listing};
use news_harvest::config::ListingConfig;
use news_harvest::crawler::Coordinator;
use news_harvest::state::{CrawlState, ProgressFile};
use news_harvest::storage::{SqliteStorage, Storage};
use tokio_util::sync::CancellationToken;
use wiremock::MockServer;

async fn mount_site(server: &MockServer, pages: &[&[&str]]) {
    for (index, slugs) in pages.iter().enumerate() {
        mount_listing(server, index as u32 + 1, slugs).await;
        for slug in slugs.iter() {
            mount_article(server, slug).await;
        }
    }
}

#[tokio::test]
async fn test_stale_snapshot_does_not_cause_reprocessing() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&server, dir.path());
    let pages: &[&[&str]] = &[&["c", "b"], &["a"]];

    mount_site(&server, pages).await;
    Coordinator::new(&config, "hash")
        .unwrap()
        .run(&CancellationToken::new())
        .await
        .unwrap();

    // Crash between the commit and the snapshot write: the snapshot lags
    let snapshot = ProgressFile::new(dir.path().join("progress.toml"));
    snapshot.store(&CrawlState::default()).unwrap();

    server.reset().await;
    mount_site(&server, pages).await;

    let report = Coordinator::new(&config, "hash")
        .unwrap()
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert!(detail_requests(&server).await.is_empty());
    assert_eq!(report.pool.committed, 0);
    assert_eq!(report.state.next_key, 4);

    let storage = SqliteStorage::new(&dir.path().join("harvest.db")).unwrap();
    assert_eq!(storage.count_articles().unwrap(), 3);
    // Rewritten from the database on startup
    assert_eq!(snapshot.load().unwrap(), storage.load_crawl_state().unwrap());
}

#[tokio::test]
async fn test_backlog_resumes_after_last_article() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&server, dir.path());
    config.listing = ListingConfig {
        first_run_pages: 1,
        max_backlog_pages: 1,
        ..config.listing
    };
    let pages: &[&[&str]] = &[&["f", "e"], &["d", "c"], &["b", "a"]];

    mount_site(&server, pages).await;
    let first = Coordinator::new(&config, "hash")
        .unwrap()
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(first.pool.committed, 4);
    assert_eq!(first.state.last_page, 2);
    assert_eq!(first.state.last_article, Some(article_url(&server, "c")));

    server.reset().await;
    mount_site(&server, pages).await;

    let second = Coordinator::new(&config, "hash")
        .unwrap()
        .run(&CancellationToken::new())
        .await
        .unwrap();

    let mut fetched = detail_requests(&server).await;
    fetched.sort();
    assert_eq!(fetched, vec!["/news/a", "/news/b"]);
    assert_eq!(second.new_identifiers, 0);
    assert_eq!(second.state.last_page, 3);
    assert_eq!(second.state.last_article, Some(article_url(&server, "a")));
    assert_eq!(second.state.next_key, 7);
}

#[tokio::test]
async fn test_orphan_attachment_files_are_never_overwritten() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&server, dir.path());

    // Left behind by a crash after the file write but before the commit
    let attachments = dir.path().join("attachments");
    std::fs::create_dir_all(&attachments).unwrap();
    std::fs::write(attachments.join("00000009.jpg"), b"orphan").unwrap();

    mount_site(&server, &[&["a"]]).await;
    let report = Coordinator::new(&config, "hash")
        .unwrap()
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.state.next_attachment, 11);
    assert_eq!(std::fs::read(attachments.join("00000009.jpg")).unwrap(), b"orphan");

    let storage = SqliteStorage::new(&dir.path().join("harvest.db")).unwrap();
    let key = storage.find_article_key(&article_url(&server, "a")).unwrap().unwrap();
    assert_eq!(
        storage.get_article(key).unwrap().record.attachments,
        vec![Some("00000010.jpg".to_string())]
    );
}
