//! Postgres storage, needs a `DATABASE_URL` to run

use std::collections::HashSet;
use std::time::Duration;

use axum::http::StatusCode;
use sqlx::postgres::PgConnectOptions;
use sqlx::postgres::PgPoolOptions;
use tempfile::TempDir;

use crate::links::BatchItem;
use crate::links::NewLink;
use crate::service;
use crate::service::BATCH_COMMIT_SIZE;
use crate::service::LinkService;
use crate::storage;
use crate::storage::DatabaseConfig;
use crate::storage::RetryPolicy;
use crate::storage::Storage;
use crate::storage::StorageConfig;
use crate::tests::helper;

async fn setup_storage(pool: sqlx::PgPool, dir: &TempDir) -> Storage {
    Storage::from_config(StorageConfig {
        database: DatabaseConfig::ExistingConnection(pool),
        snapshot_path: dir.path().join("storage.json"),
        retry: RetryPolicy::default(),
    })
    .await
    .unwrap()
}

fn batch(prefix: &str, count: usize) -> Vec<BatchItem> {
    (0..count)
        .map(|i| BatchItem {
            correlation_id: i.to_string(),
            full_url: format!("https://example.com/{prefix}/{i}"),
        })
        .collect()
}

fn candidate<'a>(full_url: &'a str, shortcut: &'a str) -> NewLink<'a> {
    NewLink {
        full_url,
        shortcut,
        owner_id: "owner",
    }
}

#[sqlx::test]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn test_create_is_idempotent(pool: sqlx::PgPool) {
    let dir = TempDir::new().unwrap();
    let storage = setup_storage(pool, &dir).await;

    let (link, created) = storage
        .create(&candidate("https://example.com/a", "aaaaaaaa"), None)
        .await
        .unwrap();
    assert!(created);

    let (again, created) = storage
        .create(&candidate("https://example.com/a", "bbbbbbbb"), None)
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(link, again);

    let result = storage
        .create(&candidate("https://example.com/b", "aaaaaaaa"), None)
        .await;
    assert!(matches!(result, Err(storage::Error::ShortcutTaken)));
}

#[sqlx::test]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn test_collision_inside_transaction(pool: sqlx::PgPool) {
    let dir = TempDir::new().unwrap();
    let storage = setup_storage(pool, &dir).await;

    let mut transaction = storage.begin_transaction().await.unwrap();

    storage
        .create(
            &candidate("https://example.com/a", "aaaaaaaa"),
            Some(&mut transaction),
        )
        .await
        .unwrap();

    let result = storage
        .create(
            &candidate("https://example.com/b", "aaaaaaaa"),
            Some(&mut transaction),
        )
        .await;
    assert!(matches!(result, Err(storage::Error::ShortcutTaken)));

    // the transaction is still usable after the collision
    storage
        .create(
            &candidate("https://example.com/b", "bbbbbbbb"),
            Some(&mut transaction),
        )
        .await
        .unwrap();

    transaction.commit().await.unwrap();

    assert_eq!(2, storage.get_by_owner("owner").await.unwrap().len());
}

#[sqlx::test]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn test_transaction_rolled_back_on_drop(pool: sqlx::PgPool) {
    let dir = TempDir::new().unwrap();
    let storage = setup_storage(pool, &dir).await;

    let mut transaction = storage.begin_transaction().await.unwrap();

    storage
        .create(
            &candidate("https://example.com/a", "aaaaaaaa"),
            Some(&mut transaction),
        )
        .await
        .unwrap();

    drop(transaction);

    assert!(matches!(
        storage.get_by_shortcut("aaaaaaaa").await,
        Err(storage::Error::NotFound)
    ));
}

#[sqlx::test]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn test_soft_delete(pool: sqlx::PgPool) {
    let dir = TempDir::new().unwrap();
    let storage = setup_storage(pool, &dir).await;

    storage
        .create(&candidate("https://example.com/a", "aaaaaaaa"), None)
        .await
        .unwrap();

    storage
        .soft_delete(&["aaaaaaaa".to_string()], "someone-else")
        .await
        .unwrap();
    assert!(storage.get_by_shortcut("aaaaaaaa").await.is_ok());

    storage
        .soft_delete(&["aaaaaaaa".to_string()], "owner")
        .await
        .unwrap();
    assert!(matches!(
        storage.get_by_shortcut("aaaaaaaa").await,
        Err(storage::Error::Deleted)
    ));
    assert!(storage.get_by_owner("owner").await.unwrap().is_empty());

    // still known by its URL
    let link = storage.get_by_full_url("https://example.com/a").await.unwrap();
    assert!(link.is_deleted);
}

#[sqlx::test]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn test_snapshot_restore(pool: sqlx::PgPool) {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("storage.json"),
        r#"[
            {"url":"https://example.com/a","shortcut":"aaaaaaaa","userID":"owner","isDeleted":false},
            {"url":"https://example.com/b","shortcut":"bbbbbbbb","userID":"owner","isDeleted":true},
            {"url":"https://example.com/a","shortcut":"cccccccc","userID":"owner","isDeleted":false}
        ]"#,
    )
    .unwrap();

    let storage = setup_storage(pool, &dir).await;
    storage.load_snapshot().await.unwrap();

    assert!(storage.get_by_shortcut("aaaaaaaa").await.is_ok());
    assert!(matches!(
        storage.get_by_shortcut("bbbbbbbb").await,
        Err(storage::Error::Deleted)
    ));
    assert!(matches!(
        storage.get_by_shortcut("cccccccc").await,
        Err(storage::Error::NotFound)
    ));

    // loading twice changes nothing
    storage.load_snapshot().await.unwrap();

    storage.save_snapshot().await.unwrap();
    let saved = std::fs::read_to_string(dir.path().join("storage.json")).unwrap();
    let saved = serde_json::from_str::<Vec<crate::links::Link>>(&saved).unwrap();
    assert_eq!(
        vec!["aaaaaaaa", "bbbbbbbb"],
        saved
            .iter()
            .map(|link| link.shortcut.as_str())
            .collect::<Vec<_>>()
    );
}

#[sqlx::test]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn test_api(pool: sqlx::PgPool) {
    let (mut app, _dir) = helper::setup_test_app_with_pool(pool).await;

    assert_eq!(StatusCode::OK, helper::ping(&mut app).await);

    let response = helper::shorten(&mut app, None, "https://example.com/a").await;
    assert_eq!(StatusCode::CREATED, response.status_code);
    let owner = response.owner.unwrap();
    let short_url = helper::get_result(&response.body);

    let response = helper::shorten(&mut app, Some(&owner), "https://example.com/a").await;
    assert_eq!(StatusCode::CONFLICT, response.status_code);
    assert_eq!(short_url, helper::get_result(&response.body));

    let response = helper::shorten_batch(
        &mut app,
        Some(&owner),
        &[
            ("a", "https://example.com/a"),
            ("b", "https://example.com/b"),
            ("c", "https://example.com/b"),
        ],
    )
    .await;
    assert_eq!(StatusCode::CREATED, response.status_code);
    let results = helper::get_batch_results(&response.body);
    assert_eq!(short_url, results[0].short_url);
    assert_eq!(results[1].short_url, results[2].short_url);

    let shortcut = helper::shortcut_of(&short_url);
    helper::delete_user_urls(&mut app, Some(&owner), &[shortcut.as_str()]).await;

    let response = helper::root(&mut app, &shortcut).await;
    assert_eq!(StatusCode::GONE, response.status_code);

    let response = helper::user_urls(&mut app, Some(&owner)).await;
    assert_eq!(StatusCode::OK, response.status_code);
    assert_eq!(1, helper::get_user_urls(&response.body).len());
}

#[sqlx::test]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn test_snapshot_restore_skips_rejected_link(pool: sqlx::PgPool) {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("storage.json"),
        r#"[
            {"url":"https://example.com/\u0000","shortcut":"aaaaaaaa","userID":"owner","isDeleted":false},
            {"url":"https://example.com/b","shortcut":"bbbbbbbb","userID":"owner","isDeleted":false}
        ]"#,
    )
    .unwrap();

    let storage = setup_storage(pool, &dir).await;
    storage.load_snapshot().await.unwrap();

    assert!(matches!(
        storage.get_by_shortcut("aaaaaaaa").await,
        Err(storage::Error::NotFound)
    ));
    let link = storage.get_by_shortcut("bbbbbbbb").await.unwrap();
    assert_eq!("https://example.com/b", link.full_url);
}

#[sqlx::test]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn test_concurrent_batches_on_small_pool(
    pool_options: PgPoolOptions,
    connect_options: PgConnectOptions,
) {
    let pool = pool_options
        .max_connections(2)
        .acquire_timeout(Duration::from_secs(3))
        .connect_with(connect_options)
        .await
        .unwrap();

    let dir = TempDir::new().unwrap();
    let service = LinkService::new(setup_storage(pool, &dir).await, 8, None);

    // more batches than connections, each holding a transaction
    let handles = (0..4)
        .map(|i| {
            let service = service.clone();

            tokio::spawn(async move {
                service
                    .bulk_create(batch(&i.to_string(), 3), "owner", None)
                    .await
            })
        })
        .collect::<Vec<_>>();

    for handle in handles {
        assert_eq!(3, handle.await.unwrap().unwrap().len());
    }

    assert_eq!(
        12,
        service.get_links_for_owner("owner").await.unwrap().len()
    );
}

#[sqlx::test]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn test_batch_larger_than_a_chunk(pool: sqlx::PgPool) {
    let dir = TempDir::new().unwrap();
    let service = LinkService::new(setup_storage(pool, &dir).await, 8, None);

    let items = batch("chunk", BATCH_COMMIT_SIZE + 1);
    let results = service
        .bulk_create(items.clone(), "owner", None)
        .await
        .unwrap();

    assert_eq!(BATCH_COMMIT_SIZE + 1, results.len());
    assert_eq!(
        BATCH_COMMIT_SIZE + 1,
        results
            .iter()
            .map(|result| result.shortcut.as_str())
            .collect::<HashSet<_>>()
            .len()
    );

    for (result, item) in results.iter().zip(&items) {
        assert_eq!(item.correlation_id, result.correlation_id);
        assert_eq!(
            item.full_url,
            service.get_full_url(&result.shortcut).await.unwrap()
        );
    }

    // the same batch again creates nothing new
    let again = service.bulk_create(items, "owner", None).await.unwrap();
    assert_eq!(results, again);
    assert_eq!(
        BATCH_COMMIT_SIZE + 1,
        service.get_links_for_owner("owner").await.unwrap().len()
    );
}

#[sqlx::test]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn test_failed_chunk_keeps_committed_chunks(pool: sqlx::PgPool) {
    let dir = TempDir::new().unwrap();
    let storage = setup_storage(pool.clone(), &dir).await;
    let service = LinkService::new(storage, 8, None);

    sqlx::query(
        "ALTER TABLE links ADD CONSTRAINT links_rejected CHECK (url <> 'https://example.com/rejected')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let mut items = batch("chunk", BATCH_COMMIT_SIZE + 1);
    items.push(BatchItem {
        correlation_id: "rejected".to_string(),
        full_url: "https://example.com/rejected".to_string(),
    });

    let result = service.bulk_create(items, "owner", None).await;
    assert!(matches!(result, Err(service::Error::Storage(_))));

    // the first chunk was committed, the second one rolled back
    let links = service.get_links_for_owner("owner").await.unwrap();
    assert_eq!(BATCH_COMMIT_SIZE, links.len());

    let first_of_second_chunk = format!("https://example.com/chunk/{BATCH_COMMIT_SIZE}");
    assert!(!links.iter().any(|link| link.full_url == first_of_second_chunk));
}
