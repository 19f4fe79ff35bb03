//! Integration tests for the write path
//!
//! Writes commit to the datastore first and invalidate the cache only when
//! the write succeeded.

mod common;

use common::{key, Harness, TestEntity, KIND};
use chrono::{DateTime, Duration, Utc};
use entitystore::{Entity, Key, MemoryStore, Operator, Query, StoreError, Value};
use tokio_test::assert_ok;

/// Read every key once so that the cache holds all of them
async fn warm(h: &Harness, ids: &[&str]) {
    let keys: Vec<Key> = ids.iter().map(|id| key(id)).collect();
    let batch = h.store.get_multi::<TestEntity>(&keys).await.unwrap();
    assert!(batch.is_ok());
}

#[tokio::test]
async fn test_put_invalidates_cached_entry() {
    let h = Harness::new();
    h.seed(&[TestEntity::new("a", 1)]).await;
    warm(&h, &["a"]).await;
    assert!(h.cache.contains_key(&key("a")).await);

    let stored = h.store.put(key("a"), &TestEntity::new("a", 2)).await.unwrap();
    assert_eq!(stored, key("a"));
    assert!(!h.cache.contains_key(&key("a")).await);

    let loaded: TestEntity = h.store.get(&key("a")).await.unwrap().unwrap();
    assert_eq!(loaded.value, 2);
}

#[tokio::test]
async fn test_put_multi_invalidates_every_key() {
    let h = Harness::new();
    h.seed(&[TestEntity::new("a", 1), TestEntity::new("b", 2)]).await;
    warm(&h, &["a", "b"]).await;

    let entities = vec![TestEntity::new("a", 10), TestEntity::new("b", 20)];
    let keys = h.store.put_multi(&[key("a"), key("b")], &entities).await.unwrap();
    assert_eq!(keys, vec![key("a"), key("b")]);
    assert!(h.cache.is_empty().await);
    assert_eq!(h.datastore.stats().put_multi_calls, 1);
    assert_eq!(h.cache.stats().delete_calls, 1);
}

#[tokio::test]
async fn test_put_multi_rejects_length_mismatch() {
    let h = Harness::new();
    let result = h.store.put_multi(&[key("a")], &[] as &[TestEntity]).await;
    assert!(result.is_err());
    assert_eq!(h.datastore.stats().put_multi_calls, 0);
}

#[tokio::test]
async fn test_put_entity_stamps_bookkeeping_fields() {
    let h = Harness::new();
    let mut entity = TestEntity::new("a", 1);
    assert!(entity.base.is_new());

    h.store.put_entity(&mut entity).await.unwrap();
    assert!(!entity.base.is_new());
    assert_eq!(entity.schema_version(), 2);
    let created = entity.base.created_at;

    let loaded: TestEntity = h.store.get(&key("a")).await.unwrap().unwrap();
    assert_eq!(loaded, entity);

    entity.value = 5;
    h.store.put_entity(&mut entity).await.unwrap();
    assert_eq!(entity.base.created_at, created);
    assert!(entity.updated_at() >= created);
}

#[tokio::test]
async fn test_put_entity_multi() {
    let h = Harness::new();
    let mut entities = vec![TestEntity::new("a", 1), TestEntity::new("b", 2)];
    let keys = h.store.put_entity_multi(&mut entities).await.unwrap();
    assert_eq!(keys.len(), 2);
    assert!(entities.iter().all(|e| !e.base.is_new()));
    assert_eq!(h.datastore.len().await, 2);
}

#[tokio::test]
async fn test_incomplete_key_is_completed_and_invalidated() {
    let h = Harness::new();
    let stored = h
        .store
        .put(Key::incomplete(KIND), &TestEntity::new("anon", 1))
        .await
        .unwrap();
    assert!(stored.is_complete());
    assert!(h.datastore.raw_get(&stored).await.is_some());
}

#[tokio::test]
async fn test_failed_write_leaves_cache_untouched() {
    let h = Harness::new();
    h.seed(&[TestEntity::new("a", 1)]).await;
    warm(&h, &["a"]).await;

    h.datastore.set_unavailable(true);
    let err = h.store.put(key("a"), &TestEntity::new("a", 2)).await.unwrap_err();
    assert!(matches!(err, StoreError::ConnectionError(_)));
    assert!(h.cache.contains_key(&key("a")).await);
    assert_eq!(h.cache.stats().delete_calls, 0);

    let err = h.store.delete(&key("a")).await.unwrap_err();
    assert!(matches!(err, StoreError::ConnectionError(_)));
    assert!(h.cache.contains_key(&key("a")).await);
}

#[tokio::test]
async fn test_invalidation_failure_does_not_fail_write() {
    let h = Harness::new();
    h.cache.set_unavailable(true);

    let stored = assert_ok!(h.store.put(key("a"), &TestEntity::new("a", 1)).await);
    assert_eq!(stored, key("a"));
    assert!(h.datastore.raw_get(&key("a")).await.is_some());
}

#[tokio::test]
async fn test_delete_invalidates() {
    let h = Harness::new();
    h.seed(&[TestEntity::new("a", 1), TestEntity::new("b", 2)]).await;
    warm(&h, &["a", "b"]).await;

    h.store.delete(&key("a")).await.unwrap();
    assert!(!h.cache.contains_key(&key("a")).await);
    assert!(h.cache.contains_key(&key("b")).await);

    h.store.delete_entity(&TestEntity::new("b", 0)).await.unwrap();
    assert!(h.cache.is_empty().await);
    assert!(h.datastore.is_empty().await);

    let missing: Option<TestEntity> = h.store.get(&key("a")).await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_delete_entity_multi_is_one_call() {
    let h = Harness::new();
    let entities = vec![TestEntity::new("a", 1), TestEntity::new("b", 2)];
    h.seed(&entities).await;

    h.store.delete_entity_multi(&entities).await.unwrap();
    assert_eq!(h.datastore.stats().delete_multi_calls, 1);
    assert!(h.datastore.is_empty().await);
}

#[tokio::test]
async fn test_delete_all_batches_by_configured_size() {
    let datastore = std::sync::Arc::new(entitystore::MemoryDatastore::new());
    let config = entitystore::StoreConfig::builder().delete_batch_size(2).build();
    let store = entitystore::EntityStore::new(datastore.clone(), config).unwrap();

    for i in 0..5 {
        let entity = TestEntity::new(&format!("e{}", i), i);
        datastore.raw_put(entity.key(), entity.save().unwrap()).await;
    }
    datastore.raw_put(Key::name("Other", "x"), vec![]).await;

    let deleted = store.delete_all(KIND).await.unwrap();
    assert_eq!(deleted, 5);
    assert_eq!(datastore.stats().delete_multi_calls, 3);
    assert_eq!(datastore.len().await, 1);
}

#[tokio::test]
async fn test_explicit_cache_deletes_surface_errors() {
    let h = Harness::new();
    h.seed(&[TestEntity::new("a", 1)]).await;
    warm(&h, &["a"]).await;

    h.store.delete_cache_by_keys(&[key("a")]).await.unwrap();
    assert!(h.cache.is_empty().await);
    assert!(h.datastore.raw_get(&key("a")).await.is_some());

    h.cache.set_unavailable(true);
    let err = h
        .store
        .delete_cache_by_entities(&[TestEntity::new("a", 1)])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::CacheError(_)));
}

#[tokio::test]
async fn test_get_all_and_get_first() {
    let h = Harness::new();
    h.seed(&[TestEntity::new("a", 3), TestEntity::new("b", 1), TestEntity::new("c", 2)])
        .await;

    let all: Vec<TestEntity> = h.store.get_all(Query::new(KIND).order("Value")).await.unwrap();
    let values: Vec<i64> = all.iter().map(|e| e.value).collect();
    assert_eq!(values, vec![1, 2, 3]);

    let first: Option<TestEntity> = h.store.get_first(Query::new(KIND).order("-Value")).await.unwrap();
    assert_eq!(first.unwrap().id, "a");

    let none: Option<TestEntity> = h.store.get_first(Query::new("Nothing")).await.unwrap();
    assert!(none.is_none());
}

fn updated_at(id: &str, at: &str) -> TestEntity {
    let mut entity = TestEntity::new(id, 0);
    entity.base.updated_at = at.parse().unwrap();
    entity
}

#[tokio::test]
async fn test_filter_and_order_on_update_time() {
    let h = Harness::new();
    h.seed(&[
        updated_at("short-fraction", "2024-05-01T12:00:00.123Z"),
        updated_at("long-fraction", "2024-05-01T12:00:00.123456Z"),
        updated_at("whole-second", "2024-05-01T11:59:59Z"),
    ])
    .await;

    let stored = h.datastore.raw_get(&key("whole-second")).await.unwrap();
    assert!(matches!(
        entitystore::property::find(&stored, "UpdatedAt"),
        Some(Value::Timestamp(_))
    ));

    let future = Utc::now() + Duration::days(365);
    let newer = Query::new(KIND).filter("UpdatedAt", Operator::Gt, future);
    assert_eq!(h.store.count(newer).await.unwrap(), 0);

    let cutoff: DateTime<Utc> = "2024-05-01T12:00:00Z".parse().unwrap();
    let after = Query::new(KIND).filter("UpdatedAt", Operator::Ge, cutoff);
    assert_eq!(h.store.count(after).await.unwrap(), 2);

    let ordered: Vec<TestEntity> = h.store.get_all(Query::new(KIND).order("UpdatedAt")).await.unwrap();
    let ids: Vec<&str> = ordered.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["whole-second", "short-fraction", "long-fraction"]);
}

#[tokio::test]
async fn test_put_entity_stamps_a_typed_update_time() {
    let h = Harness::new();
    let before = Utc::now() - Duration::seconds(1);
    let mut entity = TestEntity::new("a", 1);
    h.store.put_entity(&mut entity).await.unwrap();

    let query = Query::new(KIND).filter("UpdatedAt", Operator::Gt, before);
    assert_eq!(h.store.count(query).await.unwrap(), 1);
    let query = Query::new(KIND).filter("UpdatedAt", Operator::Gt, Utc::now() + Duration::days(365));
    assert_eq!(h.store.count(query).await.unwrap(), 0);
}

#[tokio::test]
async fn test_size_limited_cache_still_serves_reads() {
    let h = Harness::with_cache(MemoryStore::with_size_limit(1));
    h.seed(&[TestEntity::new("a", 1)]).await;

    for _ in 0..2 {
        let loaded: Option<TestEntity> = h.store.get(&key("a")).await.unwrap();
        assert_eq!(loaded.unwrap().value, 1);
    }
    assert_eq!(h.datastore.stats().get_multi_calls, 2);
}
