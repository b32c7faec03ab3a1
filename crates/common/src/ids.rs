//! Identifier generation.
//!
//! Entity ids are produced by one injected strategy so tests can assert
//! exact ids while interactive hosts use random UUIDs.

use std::collections::HashMap;

/// The kind of entity an id is minted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Asset,
    Clip,
    Project,
}

impl IdKind {
    pub fn prefix(self) -> &'static str {
        match self {
            IdKind::Asset => "asset",
            IdKind::Clip => "clip",
            IdKind::Project => "project",
        }
    }
}

/// Source of fresh, unique entity ids.
pub trait IdGenerator: Send {
    fn next_id(&mut self, kind: IdKind) -> String;

    /// Record an id that already exists so it is never minted again.
    fn observe(&mut self, _id: &str) {}
}

/// Deterministic per-kind counters: `clip-1`, `clip-2`, `asset-1`, ...
#[derive(Debug, Clone, Default)]
pub struct SequentialIds {
    counters: HashMap<IdKind, u64>,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&mut self, kind: IdKind) -> String {
        let counter = self.counters.entry(kind).or_insert(0);
        *counter += 1;
        format!("{}-{}", kind.prefix(), counter)
    }

    fn observe(&mut self, id: &str) {
        let Some((prefix, n)) = id.rsplit_once('-') else {
            return;
        };
        let Ok(n) = n.parse::<u64>() else {
            return;
        };
        let kind = match prefix {
            "asset" => IdKind::Asset,
            "clip" => IdKind::Clip,
            "project" => IdKind::Project,
            _ => return,
        };
        let counter = self.counters.entry(kind).or_insert(0);
        *counter = (*counter).max(n);
    }
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&mut self, _kind: IdKind) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
