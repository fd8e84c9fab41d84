//! Guid-keyed dispatcher registry.
//!
//! Backs session routing: a node is inserted before it is announced to the
//! client and removed as disposal unlinks it, so every routable guid
//! resolves here. [`DashMap`] keeps lookups lock-free across the concurrent
//! dispatch tasks.

use std::sync::Arc;

use dashmap::DashMap;

use crate::dispatcher::DispatcherNode;

/// Thread-safe registry of dispatcher nodes by guid.
#[derive(Default)]
pub struct ObjectStore {
    objects: DashMap<Arc<str>, Arc<DispatcherNode>>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, guid: Arc<str>, node: Arc<DispatcherNode>) {
        self.objects.insert(guid, node);
    }

    pub fn remove(&self, guid: &str) {
        self.objects.remove(guid);
    }

    pub fn contains(&self, guid: &str) -> bool {
        self.objects.contains_key(guid)
    }

    pub fn try_get(&self, guid: &str) -> Option<Arc<DispatcherNode>> {
        self.objects.get(guid).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Nodes with no live parent - the teardown entry points.
    pub fn roots(&self) -> Vec<Arc<DispatcherNode>> {
        self.objects
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|node| node.parent().is_none())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::tests::noop_node;
    use serde_json::Value;

    #[test]
    fn insert_then_get() {
        let store = ObjectStore::new();
        let node = noop_node("page");
        store.insert(node.guid_arc(), node.clone());

        assert!(store.contains(node.guid()));
        assert!(store.try_get(node.guid()).is_some());

        store.remove(node.guid());
        assert!(store.try_get(node.guid()).is_none());
    }

    #[test]
    fn roots_excludes_children() {
        use crate::dispatcher::tests::NoopHandler;

        let store = ObjectStore::new();
        let parent = noop_node("browserContext");
        let child = DispatcherNode::new(
            Arc::from("page@child"),
            Some(&parent),
            Arc::new(NoopHandler::new("page")),
            Value::Null,
        );
        parent.add_child(Arc::clone(&child));
        store.insert(parent.guid_arc(), parent.clone());
        store.insert(child.guid_arc(), child);

        let roots = store.roots();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].guid(), parent.guid());
    }
}
