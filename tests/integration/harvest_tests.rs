//! End-to-end harvest against a mock news site

use crate::site::{
    article_url, create_test_config, detail_requests, mount_article, mount_detail, mount_image,
    mount_listing,
};
use news_harvest::crawler::Coordinator;
use news_harvest::state::ProgressFile;
use news_harvest::storage::{RunStatus, SqliteStorage, Storage};
use tokio_util::sync::CancellationToken;
use wiremock::MockServer;

#[tokio::test]
async fn test_first_harvest_stores_every_article() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&server, dir.path());

    mount_listing(&server, 1, &["d", "c"]).await;
    mount_listing(&server, 2, &["b", "a"]).await;
    for slug in ["d", "c", "b", "a"] {
        mount_article(&server, slug).await;
    }

    let report = Coordinator::new(&config, "hash")
        .unwrap()
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.new_identifiers, 4);
    assert_eq!(report.pool.committed, 4);
    assert!(report.anomalies.is_empty());
    assert_eq!(report.state.next_key, 5);
    assert_eq!(report.state.next_attachment, 5);
    assert_eq!(
        report.state.most_recent,
        Some(article_url(&server, "d"))
    );

    let storage = SqliteStorage::new(&dir.path().join("harvest.db")).unwrap();
    assert_eq!(storage.count_articles().unwrap(), 4);

    let key = storage.find_article_key(&article_url(&server, "c")).unwrap().unwrap();
    let stored = storage.get_article(key).unwrap().record;
    assert_eq!(stored.headline, "Story c");
    assert_eq!(stored.author, "Staff");
    assert_eq!(
        stored.body,
        "First paragraph of c.\n\nSecond paragraph of c."
    );
    assert_eq!(stored.country_code.as_deref(), Some("DE"));
    assert!(stored.published_at.is_some());
    assert_eq!(stored.attachments.len(), 1);

    let file = stored.attachments[0].clone().unwrap();
    let on_disk = dir.path().join("attachments").join(&file);
    assert!(on_disk.exists());
    assert!(file.ends_with(".jpg"));

    // The snapshot mirrors the database
    let snapshot = ProgressFile::new(dir.path().join("progress.toml"))
        .load()
        .unwrap()
        .unwrap();
    assert_eq!(Some(snapshot), storage.load_crawl_state().unwrap());

    assert_eq!(
        storage.get_latest_run().unwrap().unwrap().status,
        RunStatus::Completed
    );
}

#[tokio::test]
async fn test_broken_image_and_missing_headline() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&server, dir.path());

    mount_listing(&server, 1, &["plain", "headless", "pictures"]).await;
    mount_article(&server, "plain").await;
    mount_detail(
        &server,
        "headless",
        "<article><p>No headline on this page.</p></article>",
    )
    .await;
    // First and last images load, the middle one is gone
    mount_detail(
        &server,
        "pictures",
        r#"<h1>Gallery</h1>
        <article>
          <p>Three pictures.</p>
          <img src="/img/one.png"><img src="/img/missing.png"><img src="/img/three.png">
        </article>"#,
    )
    .await;
    mount_image(&server, "one").await;
    mount_image(&server, "three").await;

    let report = Coordinator::new(&config, "hash")
        .unwrap()
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.pool.committed, 2);
    assert_eq!(report.pool.skipped, 1);
    // The skipped article does not hold the marker back
    assert_eq!(report.state.most_recent, Some(article_url(&server, "plain")));

    let storage = SqliteStorage::new(&dir.path().join("harvest.db")).unwrap();
    assert_eq!(
        storage.find_article_key(&article_url(&server, "headless")).unwrap(),
        None
    );

    let key = storage
        .find_article_key(&article_url(&server, "pictures"))
        .unwrap()
        .unwrap();
    let attachments = storage.get_article(key).unwrap().record.attachments;
    assert_eq!(attachments.len(), 3);
    assert!(attachments[0].is_some());
    assert_eq!(attachments[1], None);
    assert!(attachments[2].is_some());
}

#[tokio::test]
async fn test_second_harvest_only_fetches_new_articles() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&server, dir.path());

    mount_listing(&server, 1, &["c", "b"]).await;
    mount_listing(&server, 2, &["a"]).await;
    for slug in ["c", "b", "a"] {
        mount_article(&server, slug).await;
    }
    Coordinator::new(&config, "hash")
        .unwrap()
        .run(&CancellationToken::new())
        .await
        .unwrap();

    // Two articles published since; the listing shifted by two
    server.reset().await;
    mount_listing(&server, 1, &["e", "d"]).await;
    mount_listing(&server, 2, &["c", "b"]).await;
    mount_listing(&server, 3, &["a"]).await;
    for slug in ["e", "d", "c", "b", "a"] {
        mount_article(&server, slug).await;
    }

    let report = Coordinator::new(&config, "hash")
        .unwrap()
        .run(&CancellationToken::new())
        .await
        .unwrap();

    let mut fetched = detail_requests(&server).await;
    fetched.sort();
    assert_eq!(fetched, vec!["/news/d", "/news/e"]);
    assert_eq!(report.pool.committed, 2);
    assert_eq!(report.state.next_key, 6);
    assert_eq!(report.state.most_recent, Some(article_url(&server, "e")));
}
