//! Entity store demo over the in-memory backing store
//!
//! Usage:
//!   cargo run --example entitystore_demo
//!
//! Set RUST_LOG=entitystore=debug to see cache hit/miss accounting.

use entitystore::logging::init_logging;
use entitystore::{
    Aggregation, Entity, EntityBase, EntityLister, EntityStore, Key, MemoryDatastore, Mutation, Query, StoreConfig,
    TtlStore, TtlStoreConfig,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Book {
    #[serde(flatten)]
    base: EntityBase,
    #[serde(rename = "Isbn")]
    isbn: String,
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Pages")]
    pages: i64,
}

impl Book {
    fn new(isbn: &str, title: &str, pages: i64) -> Self {
        Self {
            isbn: isbn.to_string(),
            title: title.to_string(),
            pages,
            ..Default::default()
        }
    }
}

impl Entity for Book {
    fn key(&self) -> Key {
        Key::name("Book", self.isbn.clone())
    }

    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EntityBase {
        &mut self.base
    }

    fn current_schema_version(&self) -> i64 {
        1
    }

    fn pre_put_action(&mut self) -> entitystore::Result<()> {
        self.title = self.title.trim().to_string();
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging("entitystore=info,entitystore_demo=info");

    info!("=== Entity Store Demo ===");

    let cache = Arc::new(TtlStore::new(TtlStoreConfig::compact())?);
    let datastore = Arc::new(MemoryDatastore::new());
    let config = StoreConfig::builder().cachestore(cache.clone()).build();
    let store = EntityStore::new(datastore.clone(), config)?;

    info!("\n--- Writing ---");
    let mut books = vec![
        Book::new("978-0", "  The Rust Programming Language ", 560),
        Book::new("978-1", "Programming Rust", 738),
        Book::new("978-2", "Rust for Rustaceans", 280),
    ];
    let keys = store.put_entity_multi(&mut books).await?;
    info!("Stored {} books", keys.len());

    info!("\n--- Reading through the cache ---");
    let mut wanted = keys.clone();
    wanted.push(Key::name("Book", "missing"));
    for round in 1..=2 {
        let batch = store.get_multi::<Book>(&wanted).await?;
        info!(
            "Round {}: {} found, missing positions {:?}, problem: {}",
            round,
            batch.iter().filter(|r| r.is_ok()).count(),
            batch.failed_positions(),
            batch.is_problem()
        );
    }
    info!("Datastore get_multi calls: {}", datastore.stats().get_multi_calls);
    info!("Cache stats: {}", cache.stats().await);

    info!("\n--- Atomic mutation ---");
    let mut revised = Book::new("978-2", "Rust for Rustaceans (2nd ed.)", 300);
    store
        .mutate(vec![
            Mutation::update(&mut revised)?,
            Mutation::Delete(Key::name("Book", "978-0")),
        ])
        .await?;
    let loaded: Option<Book> = store.get(&Key::name("Book", "978-2")).await?;
    info!("After mutate: {:?}", loaded.map(|b| b.title));

    info!("\n--- Listing ---");
    let lister = EntityLister::<Book>::new(&store, Query::new("Book").order("-Pages"));
    let mut cursor = String::new();
    loop {
        let (page, next) = lister.get_list(1, &cursor).await?;
        for book in &page {
            info!("{} ({} pages)", book.title, book.pages);
        }
        if next.is_empty() {
            break;
        }
        cursor = next;
    }

    info!("\n--- Aggregations ---");
    let results = Aggregation::new(Query::new("Book"))
        .with_count()
        .with_int_sum("Pages")
        .with_avg("Pages")
        .run(&store)
        .await?;
    info!(
        "count={} pages={} avg={:.1}",
        results.count()?,
        results.int_sum("Pages")?,
        results.avg("Pages")?
    );

    let deleted = store.delete_all("Book").await?;
    info!("Deleted {} remaining books", deleted);

    Ok(())
}
