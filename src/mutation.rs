//! Tagged mutations submitted as one atomic batch

use crate::entity::{prepare_for_put, Entity};
use crate::error::Result;
use crate::key::Key;
use crate::property::PropertyList;

/// One unit of a batched write
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Remove the entity; succeeds whether or not it exists
    Delete(Key),
    /// Create the entity; fails if the key already exists
    Insert(Key, PropertyList),
    /// Replace the entity; fails if the key does not exist
    Update(Key, PropertyList),
    /// Create or replace
    Upsert(Key, PropertyList),
}

impl Mutation {
    pub fn key(&self) -> &Key {
        match self {
            Mutation::Delete(key)
            | Mutation::Insert(key, _)
            | Mutation::Update(key, _)
            | Mutation::Upsert(key, _) => key,
        }
    }

    /// Short operation name for logs
    pub fn op(&self) -> &'static str {
        match self {
            Mutation::Delete(_) => "delete",
            Mutation::Insert(..) => "insert",
            Mutation::Update(..) => "update",
            Mutation::Upsert(..) => "upsert",
        }
    }

    /// Copy of this mutation addressed to `key`
    pub fn with_key(self, key: Key) -> Mutation {
        match self {
            Mutation::Delete(_) => Mutation::Delete(key),
            Mutation::Insert(_, props) => Mutation::Insert(key, props),
            Mutation::Update(_, props) => Mutation::Update(key, props),
            Mutation::Upsert(_, props) => Mutation::Upsert(key, props),
        }
    }

    /// Delete the given entity
    pub fn delete<E: Entity>(entity: &E) -> Mutation {
        Mutation::Delete(entity.key())
    }

    /// Insert the given entity, stamping its bookkeeping fields
    pub fn insert<E: Entity>(entity: &mut E) -> Result<Mutation> {
        let (key, props) = prepared(entity)?;
        Ok(Mutation::Insert(key, props))
    }

    /// Update the given entity, stamping its bookkeeping fields
    pub fn update<E: Entity>(entity: &mut E) -> Result<Mutation> {
        let (key, props) = prepared(entity)?;
        Ok(Mutation::Update(key, props))
    }

    /// Upsert the given entity, stamping its bookkeeping fields
    pub fn upsert<E: Entity>(entity: &mut E) -> Result<Mutation> {
        let (key, props) = prepared(entity)?;
        Ok(Mutation::Upsert(key, props))
    }
}

fn prepared<E: Entity>(entity: &mut E) -> Result<(Key, PropertyList)> {
    prepare_for_put(entity)?;
    Ok((entity.key(), entity.save()?))
}
