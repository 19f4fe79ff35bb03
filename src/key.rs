//! Entity keys
//!
//! A key names one entity: a kind, an identifier (integer id or string name),
//! an optional namespace and an optional parent key forming an ancestor chain.
//! Keys compare structurally and are totally ordered the way the backing
//! store orders them: by namespace, then along the ancestor path from the root,
//! with integer ids sorting before string names.

use crate::error::{Result, StoreError};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Identifier part of a key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyId {
    /// No identifier yet; the backing store allocates an id on write
    Incomplete,
    /// Integer identifier
    Id(i64),
    /// String identifier
    Name(String),
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyId::Incomplete => write!(f, "<incomplete>"),
            KeyId::Id(id) => write!(f, "{}", id),
            KeyId::Name(name) => write!(f, "{:?}", name),
        }
    }
}

/// Unique address of one entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    kind: String,
    id: KeyId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<Box<Key>>,
}

impl Key {
    /// Key with a string name
    pub fn name(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: KeyId::Name(name.into()),
            namespace: None,
            parent: None,
        }
    }

    /// Key with an integer id
    pub fn id(kind: impl Into<String>, id: i64) -> Self {
        Self {
            kind: kind.into(),
            id: KeyId::Id(id),
            namespace: None,
            parent: None,
        }
    }

    /// Key whose id will be allocated by the backing store
    pub fn incomplete(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: KeyId::Incomplete,
            namespace: None,
            parent: None,
        }
    }

    /// Set the parent key. The child inherits the parent's namespace.
    pub fn with_parent(mut self, parent: Key) -> Self {
        self.namespace = parent.namespace.clone();
        self.parent = Some(Box::new(parent));
        self
    }

    /// Set the namespace of this key and every ancestor
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        let ns = namespace.into();
        self.set_namespace(if ns.is_empty() { None } else { Some(ns) });
        self
    }

    fn set_namespace(&mut self, namespace: Option<String>) {
        if let Some(parent) = self.parent.as_mut() {
            parent.set_namespace(namespace.clone());
        }
        self.namespace = namespace;
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn key_id(&self) -> &KeyId {
        &self.id
    }

    /// Integer id, if this key has one
    pub fn int_id(&self) -> Option<i64> {
        match self.id {
            KeyId::Id(id) => Some(id),
            _ => None,
        }
    }

    /// String name, if this key has one
    pub fn name_id(&self) -> Option<&str> {
        match &self.id {
            KeyId::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn parent(&self) -> Option<&Key> {
        self.parent.as_deref()
    }

    /// True if this key and all of its ancestors have identifiers
    pub fn is_complete(&self) -> bool {
        self.id != KeyId::Incomplete && self.parent.as_ref().map_or(true, |p| p.is_complete())
    }

    /// Copy of this key with the given integer id
    pub fn completed(&self, id: i64) -> Key {
        let mut key = self.clone();
        key.id = KeyId::Id(id);
        key
    }

    /// True if `ancestor` is this key or one of its ancestors
    pub fn has_ancestor(&self, ancestor: &Key) -> bool {
        let mut current = Some(self);
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            current = key.parent();
        }
        false
    }

    /// Namespaces from the root ancestor down to this key
    fn namespaces(&self) -> Vec<Option<&str>> {
        let mut chain = Vec::new();
        let mut current = Some(self);
        while let Some(key) = current {
            chain.push(key.namespace());
            current = key.parent();
        }
        chain.reverse();
        chain
    }

    /// Path elements from the root ancestor down to this key
    pub fn path(&self) -> Vec<(&str, &KeyId)> {
        let mut elements = Vec::new();
        let mut current = Some(self);
        while let Some(key) = current {
            elements.push((key.kind.as_str(), &key.id));
            current = key.parent();
        }
        elements.reverse();
        elements
    }

    /// Reversible, URL-safe string form of the key
    pub fn encode(&self) -> String {
        // Serializing a plain struct of strings and integers cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Parse a key produced by [`Key::encode`]
    pub fn decode(encoded: &str) -> Result<Key> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| StoreError::InvalidKey(format!("bad key encoding: {}", e)))?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::InvalidKey(format!("bad key payload: {}", e)))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.namespace
            .cmp(&other.namespace)
            .then_with(|| self.path().cmp(&other.path()))
            // Decoded keys may carry ancestors from other namespaces.
            .then_with(|| self.namespaces().cmp(&other.namespaces()))
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ns) = &self.namespace {
            write!(f, "[{}]", ns)?;
        }
        let path: Vec<String> = self
            .path()
            .into_iter()
            .map(|(kind, id)| format!("{},{}", kind, id))
            .collect();
        write!(f, "/{}", path.join("/"))
    }
}

/// Allocate a scattered, positive 63-bit id for an incomplete key
pub fn allocate_id() -> i64 {
    let id = (uuid::Uuid::new_v4().as_u128() >> 65) as i64;
    if id == 0 {
        1
    } else {
        id
    }
}
