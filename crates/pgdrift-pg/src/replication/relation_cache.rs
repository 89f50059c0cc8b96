//! Relation metadata seen on the replication stream.
//!
//! Postgres sends a Relation message before the first change to each table
//! in a session (and again after its definition changes). Inserts, updates
//! and deletes only carry the relation id, so we keep the latest layout here.

use std::collections::HashMap;

use super::pgoutput::{ColumnInfo, RelationMessage, ReplicaIdentity};

#[derive(Debug, Clone)]
pub struct RelationInfo {
    pub namespace: String,
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub replica_identity: ReplicaIdentity,
}

impl RelationInfo {
    /// Names of the replica identity key columns, in column order.
    pub fn key_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|c| c.is_pk())
            .map(|c| c.name.as_str())
    }
}

impl From<&RelationMessage> for RelationInfo {
    fn from(msg: &RelationMessage) -> Self {
        Self {
            namespace: msg.namespace.clone(),
            name: msg.name.clone(),
            columns: msg.columns.clone(),
            replica_identity: msg.replica_identity,
        }
    }
}

/// Relation id to layout, replaced on every Relation message.
#[derive(Debug, Default)]
pub struct RelationCache {
    relations: HashMap<u32, RelationInfo>,
}

impl RelationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, msg: &RelationMessage) {
        self.relations.insert(msg.relation_id, msg.into());
    }

    pub fn get(&self, relation_id: u32) -> Option<&RelationInfo> {
        self.relations.get(&relation_id)
    }

    /// Forget everything, e.g. after reconnecting.
    pub fn clear(&mut self) {
        self.relations.clear();
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relation(relation_id: u32, columns: Vec<ColumnInfo>) -> RelationMessage {
        RelationMessage {
            relation_id,
            namespace: "public".to_string(),
            name: "accounts".to_string(),
            replica_identity: ReplicaIdentity::Default,
            columns,
        }
    }

    fn column(name: &str, flags: u8) -> ColumnInfo {
        ColumnInfo {
            flags,
            name: name.to_string(),
            type_oid: 23,
            type_modifier: -1,
        }
    }

    #[test]
    fn test_update_and_get() {
        let mut cache = RelationCache::new();
        cache.update(&relation(16384, vec![column("id", 1), column("email", 0)]));

        let info = cache.get(16384).unwrap();
        assert_eq!(info.namespace, "public");
        assert_eq!(info.name, "accounts");
        assert_eq!(info.columns.len(), 2);
        assert_eq!(info.key_columns().collect::<Vec<_>>(), vec!["id"]);
        assert!(cache.get(12345).is_none());
    }

    #[test]
    fn test_new_relation_message_replaces_layout() {
        let mut cache = RelationCache::new();
        cache.update(&relation(1, vec![column("id", 1)]));
        cache.update(&relation(1, vec![column("id", 1), column("added", 0)]));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(1).unwrap().columns.len(), 2);
    }

    #[test]
    fn test_clear() {
        let mut cache = RelationCache::new();
        cache.update(&relation(1, vec![]));
        cache.clear();
        assert!(cache.is_empty());
    }
}
