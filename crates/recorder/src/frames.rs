//! Frame identity resolution.
//!
//! [`describe_frame`] turns a live frame reference into the structured
//! [`FrameDescription`] stored with each recorded action. Selector-chain
//! computation is bounded: deep frame trees and slow selector queries
//! degrade to a URL/name descriptor instead of blocking the recorder.

use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

use drover_protocol::{Action, CallMetadata, FrameDescription};

/// Read-only view of a live frame, provided by the engine driver.
pub trait FrameHandle: Send + Sync {
    /// Guid of the page owning this frame.
    fn page_guid(&self) -> Arc<str>;

    fn url(&self) -> String;

    fn name(&self) -> Option<String>;

    fn is_main(&self) -> bool;

    fn parent(&self) -> Option<Arc<dyn FrameHandle>>;

    /// Names of frames sharing this frame's parent, including its own.
    /// Used to decide whether the fallback descriptor may carry the name.
    fn sibling_names(&self) -> Vec<String>;

    /// Computes a selector locating `child`'s frame element within this
    /// frame. May be slow; callers race it against a timeout.
    fn selector_for_child(&self, child: &Arc<dyn FrameHandle>)
    -> BoxFuture<'_, crate::Result<String>>;
}

/// Performs a recorded action against the live frame. Implemented by the
/// engine driver; the recorder wraps every call with instrumentation and a
/// bounded timeout.
pub trait ActionExecutor: Send + Sync {
    fn perform(
        &self,
        frame: &Arc<dyn FrameHandle>,
        action: &Action,
        metadata: &CallMetadata,
    ) -> BoxFuture<'_, drover_server::Result<()>>;
}

/// Ancestor chains deeper than this skip selector resolution entirely.
const MAX_CHAIN_DEPTH: usize = 3;

/// Resolves a frame to its description.
///
/// Main frames get a simple descriptor. Nested frames get a parent-to-child
/// selector chain when the chain is at most [`MAX_CHAIN_DEPTH`] links deep
/// and resolution wins the race against `race_timeout`; otherwise the
/// descriptor degrades to the frame's URL plus its name when that name is
/// unique among siblings. This function never blocks indefinitely and never
/// returns an error.
pub async fn describe_frame(
    page_alias: &str,
    frame: &Arc<dyn FrameHandle>,
    race_timeout: Duration,
) -> FrameDescription {
    if frame.is_main() {
        return FrameDescription::main_frame(page_alias, frame.url());
    }

    // Walk to the root, then reverse: [main, ..., target].
    let mut chain = vec![Arc::clone(frame)];
    let mut cursor = Arc::clone(frame);
    while let Some(parent) = cursor.parent() {
        chain.push(Arc::clone(&parent));
        cursor = parent;
    }
    chain.reverse();

    if chain.len() > MAX_CHAIN_DEPTH + 1 {
        return fallback_description(page_alias, frame);
    }

    match tokio::time::timeout(race_timeout, resolve_chain(&chain)).await {
        Ok(Ok(selectors_chain)) => FrameDescription {
            page_alias: page_alias.to_string(),
            is_main_frame: false,
            url: frame.url(),
            name: None,
            selectors_chain: Some(selectors_chain),
        },
        Ok(Err(e)) => {
            tracing::debug!("frame selector resolution failed, using fallback: {e}");
            fallback_description(page_alias, frame)
        }
        Err(_) => {
            tracing::debug!("frame selector resolution timed out, using fallback");
            fallback_description(page_alias, frame)
        }
    }
}

async fn resolve_chain(chain: &[Arc<dyn FrameHandle>]) -> crate::Result<Vec<String>> {
    let mut selectors = Vec::with_capacity(chain.len() - 1);
    for pair in chain.windows(2) {
        let selector = pair[0].selector_for_child(&pair[1]).await?;
        selectors.push(selector);
    }
    Ok(selectors)
}

fn fallback_description(page_alias: &str, frame: &Arc<dyn FrameHandle>) -> FrameDescription {
    let name = frame.name().filter(|name| {
        frame
            .sibling_names()
            .iter()
            .filter(|sibling| *sibling == name)
            .count()
            <= 1
    });
    FrameDescription {
        page_alias: page_alias.to_string(),
        is_main_frame: false,
        url: frame.url(),
        name,
        selectors_chain: None,
    }
}
