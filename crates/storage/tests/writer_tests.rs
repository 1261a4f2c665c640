//! Background writer behaviour against a real SQLite store.

#![cfg(all(feature = "sqlite", not(feature = "postgres")))]

mod common;

use std::time::Duration;

use chrono::NaiveDateTime;
use common::TestDb;
use xenia_common::{Observation, PlatformHandle, XeniaError};
use xenia_storage::{
    DatabaseConfig, Db, ObservationStore, PlatformDetails, WriterConfig, WriterHandle, WriterState,
};

/// Creates the buoy platform with one wind speed sensor and returns its id.
async fn wind_sensor(db: &TestDb) -> i64 {
    let resolver = db.resolver();
    let handle = PlatformHandle::parse(test_utils::BUOY_HANDLE).unwrap();
    resolver
        .resolve_platform(&handle, None, &PlatformDetails::default())
        .await
        .unwrap();
    resolver
        .resolve_sensor("wind_speed", "m_s-1", &handle, 1, true)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_zero_records_no_commit() {
    let db = TestDb::new().await;
    let mut writer = WriterHandle::spawn(db.config.clone(), WriterConfig::default()).unwrap();
    assert_eq!(writer.ready().await, WriterState::Draining);

    let report = writer.shutdown().await.unwrap();
    assert_eq!(report.state, WriterState::Stopped);
    assert_eq!(report.received, 0);
    assert_eq!(report.commits, 0);
}

#[tokio::test]
async fn test_batches_and_final_commit() {
    let db = TestDb::new().await;
    let sensor_id = wind_sensor(&db).await;

    let writer =
        WriterHandle::spawn(db.config.clone(), WriterConfig::new(100, 16).unwrap()).unwrap();
    for obs in test_utils::observation_series(sensor_id, test_utils::BUOY_HANDLE, 250, 10) {
        writer.push(obs).await.unwrap();
    }
    let report = writer.shutdown().await.unwrap();

    assert_eq!(report.received, 250);
    assert_eq!(report.committed, 250);
    // Two full batches plus the final partial one.
    assert_eq!(report.commits, 3);
    assert_eq!(db.count("multi_obs").await, 250);
}

#[tokio::test]
async fn test_exact_multiple_needs_no_final_commit() {
    let db = TestDb::new().await;
    let sensor_id = wind_sensor(&db).await;

    let writer =
        WriterHandle::spawn(db.config.clone(), WriterConfig::new(5, 4).unwrap()).unwrap();
    for obs in test_utils::observation_series(sensor_id, test_utils::BUOY_HANDLE, 10, 10) {
        writer.push(obs).await.unwrap();
    }
    let report = writer.shutdown().await.unwrap();

    assert_eq!(report.commits, 2);
    assert_eq!(report.committed, 10);
}

#[tokio::test]
async fn test_duplicates_skipped_without_losing_batch() {
    let db = TestDb::new().await;
    let sensor_id = wind_sensor(&db).await;
    let series = test_utils::observation_series(sensor_id, test_utils::BUOY_HANDLE, 6, 10);

    let store = ObservationStore::new(db.pool.clone());
    store.add_observation(&series[2]).await.unwrap();

    let writer =
        WriterHandle::spawn(db.config.clone(), WriterConfig::new(100, 8).unwrap()).unwrap();
    for obs in series.iter().cloned() {
        writer.push(obs).await.unwrap();
    }
    // Same sensor and time twice within one batch.
    writer.push(series[4].clone()).await.unwrap();
    let report = writer.shutdown().await.unwrap();

    assert_eq!(report.received, 7);
    assert_eq!(report.duplicates, 2);
    assert_eq!(report.committed, 5);
    assert_eq!(report.failed, 0);
    assert_eq!(db.count("multi_obs").await, 6);
}

#[tokio::test]
async fn test_push_after_shutdown_is_rejected() {
    let db = TestDb::new().await;
    let writer = WriterHandle::spawn(db.config.clone(), WriterConfig::default()).unwrap();
    let sender = writer.sender();

    writer.shutdown().await.unwrap();

    let obs = Observation::new(1, "noaa.buoy1", test_utils::series_start(), Some(1.0));
    assert!(matches!(sender.push(obs).await, Err(XeniaError::WriterClosed)));
    assert!(sender.is_closed());
}

#[tokio::test]
async fn test_concurrent_producers_all_written() {
    let db = TestDb::new().await;
    let sensor_id = wind_sensor(&db).await;
    let writer =
        WriterHandle::spawn(db.config.clone(), WriterConfig::new(7, 4).unwrap()).unwrap();

    let series = test_utils::observation_series(sensor_id, test_utils::BUOY_HANDLE, 40, 5);
    let mut tasks = Vec::new();
    for chunk in series.chunks(10) {
        let sender = writer.sender();
        let chunk = chunk.to_vec();
        tasks.push(tokio::spawn(async move {
            for obs in chunk {
                sender.push(obs).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let report = writer.shutdown().await.unwrap();
    assert_eq!(report.received, 40);
    assert_eq!(report.committed, 40);
    assert_eq!(db.count("multi_obs").await, 40);
}

#[tokio::test]
async fn test_single_producer_order_preserved() {
    let db = TestDb::new().await;
    let sensor_id = wind_sensor(&db).await;
    let writer =
        WriterHandle::spawn(db.config.clone(), WriterConfig::new(7, 4).unwrap()).unwrap();

    let mut series = test_utils::observation_series(sensor_id, test_utils::BUOY_HANDLE, 20, 10);
    series.reverse();
    let pushed: Vec<NaiveDateTime> = series.iter().map(|obs| obs.m_date).collect();
    for obs in series {
        writer.push(obs).await.unwrap();
    }
    let report = writer.shutdown().await.unwrap();
    assert_eq!(report.committed, 20);

    let stored = sqlx::query_scalar::<Db, NaiveDateTime>("SELECT m_date FROM multi_obs ORDER BY row_id")
        .fetch_all(&db.pool)
        .await
        .unwrap();
    assert_eq!(stored, pushed);
}

#[tokio::test]
async fn test_resolution_while_batch_pending() {
    let db = TestDb::new().await;
    let sensor_id = wind_sensor(&db).await;
    let mut writer =
        WriterHandle::spawn(db.config.clone(), WriterConfig::new(100, 8).unwrap()).unwrap();
    assert_eq!(writer.ready().await, WriterState::Draining);

    for obs in test_utils::observation_series(sensor_id, test_utils::BUOY_HANDLE, 3, 10) {
        writer.push(obs).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    // A partial batch must not block other writers to the store.
    let handle = PlatformHandle::parse("noaa.buoy2").unwrap();
    let platform_id = db
        .resolver()
        .resolve_platform(&handle, None, &PlatformDetails::default())
        .await
        .unwrap();
    assert_eq!(
        db.resolver().platform_exists("noaa.buoy2").await.unwrap(),
        Some(platform_id)
    );

    let report = writer.shutdown().await.unwrap();
    assert_eq!(report.committed, 3);
    assert_eq!(report.commits, 1);
    assert_eq!(db.count("multi_obs").await, 3);
}

#[tokio::test]
async fn test_unreachable_store_fails_writer() {
    let config = DatabaseConfig::sqlite("/nonexistent-dir/sub/xenia.db").unwrap();
    let mut writer = WriterHandle::spawn(config, WriterConfig::default()).unwrap();

    assert_eq!(writer.ready().await, WriterState::Failed);
    let obs = Observation::new(1, "noaa.buoy1", test_utils::series_start(), None);
    assert!(matches!(writer.push(obs).await, Err(XeniaError::WriterClosed)));

    let report = writer.shutdown().await.unwrap();
    assert_eq!(report.state, WriterState::Failed);
    assert_eq!(report.received, 0);
}
