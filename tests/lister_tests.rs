//! Integration tests for cursor-paginated listing

mod common;

use common::{Harness, TestEntity, KIND};
use entitystore::{EntityLister, Key, Query, StoreError};

async fn seeded(n: i64) -> Harness {
    let h = Harness::new();
    let entities: Vec<TestEntity> = (0..n).map(|i| TestEntity::new(&format!("e{}", i), i)).collect();
    h.seed(&entities).await;
    h
}

#[tokio::test]
async fn test_pages_until_exhausted() {
    let h = seeded(3).await;
    let lister = EntityLister::<TestEntity>::new(&h.store, Query::new(KIND).order("Value"));

    let (page, cursor) = lister.get_list(2, "").await.unwrap();
    assert_eq!(page.iter().map(|e| e.value).collect::<Vec<_>>(), vec![0, 1]);
    assert!(!cursor.is_empty());

    let (page, cursor) = lister.get_list(2, &cursor).await.unwrap();
    assert_eq!(page.iter().map(|e| e.value).collect::<Vec<_>>(), vec![2]);
    assert!(cursor.is_empty());
}

#[tokio::test]
async fn test_exact_page_has_no_next_cursor() {
    let h = seeded(2).await;
    let lister = EntityLister::<TestEntity>::new(&h.store, Query::new(KIND));

    let (page, cursor) = lister.get_list(2, "").await.unwrap();
    assert_eq!(page.len(), 2);
    assert!(cursor.is_empty());
}

#[tokio::test]
async fn test_filter_does_not_count_against_limit() {
    let h = seeded(6).await;
    let lister = EntityLister::<TestEntity>::new(&h.store, Query::new(KIND).order("Value"))
        .with_filter(|key: &Key| key.name_id().map_or(false, |name| name != "e1" && name != "e2"));

    let (page, cursor) = lister.get_list(2, "").await.unwrap();
    assert_eq!(page.iter().map(|e| e.value).collect::<Vec<_>>(), vec![0, 3]);
    assert!(!cursor.is_empty());

    let (page, cursor) = lister.get_list(5, &cursor).await.unwrap();
    assert_eq!(page.iter().map(|e| e.value).collect::<Vec<_>>(), vec![4, 5]);
    assert!(cursor.is_empty());
}

#[tokio::test]
async fn test_no_matches_is_empty_without_cursor() {
    let h = seeded(3).await;
    let lister = EntityLister::<TestEntity>::new(&h.store, Query::new(KIND)).with_filter(|_: &Key| false);

    let (page, cursor) = lister.get_list(10, "").await.unwrap();
    assert!(page.is_empty());
    assert!(cursor.is_empty());
    assert_eq!(h.datastore.stats().get_multi_calls, 0);
}

#[tokio::test]
async fn test_page_is_hydrated_in_one_batch() {
    let h = seeded(5).await;
    let lister = EntityLister::<TestEntity>::new(&h.store, Query::new(KIND));

    let (page, _) = lister.get_list(4, "").await.unwrap();
    assert_eq!(page.len(), 4);
    assert_eq!(h.datastore.stats().get_multi_calls, 1);
}

#[tokio::test]
async fn test_key_list_skips_hydration() {
    let h = seeded(3).await;
    let lister = EntityLister::<TestEntity>::new(&h.store, Query::new(KIND).order("-Value"));

    let (keys, cursor) = lister.get_key_list(1, "").await.unwrap();
    assert_eq!(keys, vec![Key::name(KIND, "e2")]);
    assert!(!cursor.is_empty());
    assert_eq!(h.datastore.stats().get_multi_calls, 0);
}

#[tokio::test]
async fn test_malformed_cursor_is_rejected() {
    let h = seeded(1).await;
    let lister = EntityLister::<TestEntity>::new(&h.store, Query::new(KIND));

    let err = lister.get_list(1, "%%not-a-cursor%%").await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidCursor(_)));
}

#[tokio::test]
async fn test_zero_limit_skips_the_query() {
    let h = seeded(3).await;
    let lister = EntityLister::<TestEntity>::new(&h.store, Query::new(KIND));

    let (keys, cursor) = lister.get_key_list(0, "").await.unwrap();
    assert!(keys.is_empty());
    assert!(cursor.is_empty());
    let (page, _) = lister.get_list(0, "").await.unwrap();
    assert!(page.is_empty());
    assert_eq!(h.datastore.stats().query_calls, 0);

    let err = lister.get_key_list(0, "%%not-a-cursor%%").await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidCursor(_)));
}
