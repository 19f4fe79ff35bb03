//! Entity store on Neo4j
//!
//! Usage:
//!   cargo run --example neo4j_demo
//!
//! Environment variables (a .env file is read if present):
//!   NEO4J_URI      - Neo4j connection URI (default: bolt://localhost:7687)
//!   NEO4J_USER     - Neo4j username (default: neo4j)
//!   NEO4J_PASSWORD - Neo4j password (default: password)
//!   NEO4J_DATABASE - Neo4j database name (default: neo4j)

use entitystore::{Entity, EntityBase, EntityStore, Key, Neo4jOptions, Query, StoreConfig, TtlStore, TtlStoreConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Sensor {
    #[serde(flatten)]
    base: EntityBase,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Reading")]
    reading: f64,
}

impl Entity for Sensor {
    fn key(&self) -> Key {
        Key::name("Sensor", self.name.clone()).with_namespace("demo")
    }

    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EntityBase {
        &mut self.base
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("=== Neo4j Entity Store Demo ===");

    let options = Neo4jOptions::from_env()?;
    let database = std::env::var("NEO4J_DATABASE").unwrap_or_default();
    let config = StoreConfig::builder()
        .database_id(database)
        .cachestore(Arc::new(TtlStore::new(TtlStoreConfig::volatile())?))
        .build();
    let store = EntityStore::connect_neo4j(&options, config).await?;

    let mut sensors: Vec<Sensor> = ["north", "south", "east"]
        .iter()
        .enumerate()
        .map(|(i, name)| Sensor {
            name: name.to_string(),
            reading: 20.0 + i as f64 * 1.5,
            ..Default::default()
        })
        .collect();
    store.put_entity_multi(&mut sensors).await?;
    info!("Stored {} sensors", sensors.len());

    let query = || Query::new("Sensor").namespace("demo");
    info!("count: {}", store.count(query()).await?);
    info!("average reading: {:.2}", store.avg(query(), "Reading").await?);

    let warm: Vec<Sensor> = store.get_all(query().order("-Reading")).await?;
    for sensor in &warm {
        info!("{}: {}", sensor.name, sensor.reading);
    }

    store.delete_entity_multi(&sensors).await?;
    info!("Cleaned up");

    Ok(())
}
