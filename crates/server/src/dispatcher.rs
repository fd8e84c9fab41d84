//! Dispatcher tree - guid-addressed server-side objects.
//!
//! A [`DispatcherNode`] wraps exactly one domain object (via its
//! [`DispatcherHandler`]) and mirrors the domain object's lifetime: created
//! when the object is exposed to a client, disposed when it closes or the
//! connection tears down. Nodes form a tree; disposal recurses children
//! before the node itself and is idempotent.
//!
//! Method dispatch is an explicit match table inside each handler - there is
//! no dynamic property forwarding. Handlers resolve methods themselves and
//! return `UnknownObject`-class errors for anything unrecognized.

use downcast_rs::{DowncastSync, impl_downcast};
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use drover_protocol::CallMetadata;

use crate::error::Result;

/// Lifecycle state of a dispatcher node.
///
/// Disposing forbids new dispatches and is entered exactly once; the node
/// transitions to Disposed after its subtree is drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Active,
    Disposing,
    Disposed,
}

/// Domain behavior behind a dispatcher node.
///
/// `handle` is the per-type method table: match on the method name, run the
/// underlying domain operation, return its result as JSON. Domain failures
/// come back as [`Error::Domain`](crate::Error::Domain) and are forwarded
/// to the client without result validation.
pub trait DispatcherHandler: DowncastSync {
    /// Type tag used in guids and schema lookup (e.g. "page").
    fn type_tag(&self) -> &'static str;

    /// Invokes the domain operation for `method`.
    fn handle(
        &self,
        method: &str,
        params: Value,
        metadata: &CallMetadata,
    ) -> BoxFuture<'_, Result<Value>>;

    /// Called once when the node is disposed, before it is unlinked.
    fn on_dispose(&self) {}
}

impl_downcast!(sync DispatcherHandler);

type ChildrenRegistry = HashMap<Arc<str>, Arc<DispatcherNode>>;

/// One node in the dispatcher tree.
pub struct DispatcherNode {
    guid: Arc<str>,
    parent: Option<Weak<DispatcherNode>>,
    children: Mutex<ChildrenRegistry>,
    handler: Arc<dyn DispatcherHandler>,
    state: Mutex<NodeState>,
    initializer: Value,
}

impl DispatcherNode {
    pub(crate) fn new(
        guid: Arc<str>,
        parent: Option<&Arc<DispatcherNode>>,
        handler: Arc<dyn DispatcherHandler>,
        initializer: Value,
    ) -> Arc<Self> {
        Arc::new(Self {
            guid,
            parent: parent.map(Arc::downgrade),
            children: Mutex::new(HashMap::new()),
            handler,
            state: Mutex::new(NodeState::Active),
            initializer,
        })
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }

    pub fn guid_arc(&self) -> Arc<str> {
        Arc::clone(&self.guid)
    }

    pub fn type_tag(&self) -> &'static str {
        self.handler.type_tag()
    }

    pub fn parent(&self) -> Option<Arc<DispatcherNode>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn handler(&self) -> &Arc<dyn DispatcherHandler> {
        &self.handler
    }

    pub fn initializer(&self) -> &Value {
        &self.initializer
    }

    pub fn state(&self) -> NodeState {
        *self.state.lock()
    }

    /// New dispatches are admitted only while Active.
    pub fn is_active(&self) -> bool {
        self.state() == NodeState::Active
    }

    pub fn children(&self) -> Vec<Arc<DispatcherNode>> {
        self.children.lock().values().cloned().collect()
    }

    pub(crate) fn add_child(&self, child: Arc<DispatcherNode>) {
        self.children.lock().insert(child.guid_arc(), child);
    }

    pub(crate) fn remove_child(&self, guid: &str) {
        self.children.lock().remove(&Arc::from(guid) as &Arc<str>);
    }

    /// Enters the Disposing state. Returns false if disposal already
    /// started, making disposal idempotent.
    pub(crate) fn begin_dispose(&self) -> bool {
        let mut state = self.state.lock();
        if *state != NodeState::Active {
            return false;
        }
        *state = NodeState::Disposing;
        true
    }

    /// Removes and returns all children, leaving the registry empty.
    pub(crate) fn take_children(&self) -> Vec<Arc<DispatcherNode>> {
        let mut children = self.children.lock();
        let taken = children.values().cloned().collect();
        children.clear();
        taken
    }

    pub(crate) fn finish_dispose(&self) {
        *self.state.lock() = NodeState::Disposed;
    }
}

impl std::fmt::Debug for DispatcherNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherNode")
            .field("guid", &self.guid)
            .field("type", &self.type_tag())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Handler that echoes params back for any method.
    pub struct NoopHandler {
        tag: &'static str,
    }

    impl NoopHandler {
        pub fn new(tag: &'static str) -> Self {
            Self { tag }
        }
    }

    impl DispatcherHandler for NoopHandler {
        fn type_tag(&self) -> &'static str {
            self.tag
        }

        fn handle(
            &self,
            _method: &str,
            params: Value,
            _metadata: &CallMetadata,
        ) -> BoxFuture<'_, Result<Value>> {
            Box::pin(async move { Ok(params) })
        }
    }

    static NEXT_GUID: AtomicU64 = AtomicU64::new(1);

    pub fn noop_node(tag: &'static str) -> Arc<DispatcherNode> {
        let n = NEXT_GUID.fetch_add(1, Ordering::SeqCst);
        DispatcherNode::new(
            Arc::from(format!("{tag}@{n:x}").as_str()),
            None,
            Arc::new(NoopHandler { tag }),
            Value::Null,
        )
    }

    #[test]
    fn begin_dispose_is_one_shot() {
        let node = noop_node("page");
        assert!(node.is_active());
        assert!(node.begin_dispose());
        assert!(!node.begin_dispose());
        assert_eq!(node.state(), NodeState::Disposing);

        node.finish_dispose();
        assert_eq!(node.state(), NodeState::Disposed);
        assert!(!node.begin_dispose());
    }

    #[test]
    fn children_registry_links_both_ways() {
        let parent = noop_node("browserContext");
        let child = DispatcherNode::new(
            Arc::from("page@child"),
            Some(&parent),
            Arc::new(NoopHandler { tag: "page" }),
            Value::Null,
        );
        parent.add_child(Arc::clone(&child));

        assert_eq!(parent.children().len(), 1);
        assert_eq!(child.parent().unwrap().guid(), parent.guid());

        parent.remove_child(child.guid());
        assert!(parent.children().is_empty());
    }
}
