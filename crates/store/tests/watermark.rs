use chrono::{DateTime, Duration, TimeZone, Utc};
use vibesense_store::{JobStore, MemoryStore, StoreError};
use vibesense_core::NewJob;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
}

fn job() -> NewJob {
    NewJob {
        target_id: "post".into(),
        interval_seconds: 10.0,
        total_duration_seconds: 100.0,
        recipient: "sub@example.com".into(),
        recipient_name: None,
        display_title: "Post".into(),
    }
}

#[tokio::test]
async fn watermark_only_moves_forward() {
    let store = MemoryStore::new();
    let id = store.create(job()).await.unwrap();

    for secs in [10, 20, 35] {
        store.advance_watermark(id, at(secs)).await.unwrap();
        assert_eq!(store.get(id).await.unwrap().watermark, Some(at(secs)));
    }

    let err = store.advance_watermark(id, at(30)).await.unwrap_err();
    match err {
        StoreError::StaleWatermark { current, proposed, .. } => {
            assert_eq!(current, at(35));
            assert_eq!(proposed, at(30));
        }
        other => panic!("expected stale watermark, got {other:?}"),
    }
    assert_eq!(store.get(id).await.unwrap().watermark, Some(at(35)));
}

#[tokio::test]
async fn equal_watermark_is_accepted_without_change() {
    let store = MemoryStore::new();
    let id = store.create(job()).await.unwrap();
    store.advance_watermark(id, at(5)).await.unwrap();
    store.advance_watermark(id, at(5)).await.unwrap();
    assert_eq!(store.get(id).await.unwrap().watermark, Some(at(5)));
}

#[tokio::test]
async fn advancing_unknown_job_is_not_found() {
    let store = MemoryStore::new();
    let err = store
        .advance_watermark(uuid::Uuid::new_v4(), at(1))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}
