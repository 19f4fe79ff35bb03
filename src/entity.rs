//! Entity trait and the bookkeeping fields every entity carries

use crate::codec;
use crate::error::Result;
use crate::key::Key;
use crate::property::{Property, PropertyList};
use chrono::{DateTime, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Timestamps and schema version stamped on every write.
///
/// Embed with `#[serde(flatten)]` so the fields are stored next to the
/// entity's own properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityBase {
    #[serde(rename = "CreatedAt", default)]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "UpdatedAt", default)]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "SchemaVersion", default)]
    pub schema_version: i64,
}

impl EntityBase {
    /// Set created-at, truncated to microseconds
    pub fn set_created_at(&mut self, t: DateTime<Utc>) {
        self.created_at = t.trunc_subsecs(6);
    }

    /// Set updated-at, truncated to microseconds
    pub fn set_updated_at(&mut self, t: DateTime<Utc>) {
        self.updated_at = t.trunc_subsecs(6);
    }

    /// True if the entity has never been written
    pub fn is_new(&self) -> bool {
        self.created_at == DateTime::<Utc>::default()
    }
}

/// A typed record addressable by a key.
///
/// `save` and `load` default to structural conversion through serde.
/// Override them to supply a custom codec.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Key of this entity
    fn key(&self) -> Key;

    fn base(&self) -> &EntityBase;

    fn base_mut(&mut self) -> &mut EntityBase;

    /// Schema version stamped on write
    fn current_schema_version(&self) -> i64 {
        0
    }

    /// Hook run before every entity write
    fn pre_put_action(&mut self) -> Result<()> {
        Ok(())
    }

    /// Convert to a property list
    fn save(&self) -> Result<PropertyList> {
        codec::save_struct(self)
    }

    /// Build from a property list
    fn load(properties: &[Property]) -> Result<Self>
    where
        Self: Sized,
    {
        codec::load_struct(properties)
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.base().updated_at
    }

    fn set_updated_at(&mut self, t: DateTime<Utc>) {
        self.base_mut().set_updated_at(t);
    }

    fn schema_version(&self) -> i64 {
        self.base().schema_version
    }

    fn set_schema_version(&mut self, version: i64) {
        self.base_mut().schema_version = version;
    }
}

/// Run the pre-put hook and stamp timestamps and schema version
pub fn prepare_for_put<E: Entity>(entity: &mut E) -> Result<()> {
    entity.pre_put_action()?;
    let now = Utc::now();
    let version = entity.current_schema_version();
    let base = entity.base_mut();
    if base.is_new() {
        base.set_created_at(now);
    }
    base.set_updated_at(now);
    base.schema_version = version;
    Ok(())
}
