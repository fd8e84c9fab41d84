//! Page alias table and per-context ordinal counters.
//!
//! Aliases name pages in generated code: the first observed page is `page`,
//! every later one `popup1`, `popup2`, ... in observation order. Ordinals
//! for popups, downloads, and dialogs are monotonic per context and never
//! reused, even if an earlier page closes first.

use std::collections::HashMap;
use std::sync::Arc;

/// Bidirectional page-guid ↔ alias map scoped to one recording session.
#[derive(Default)]
pub struct PageAliasTable {
    by_page: HashMap<Arc<str>, String>,
    by_alias: HashMap<String, Arc<str>>,
    next_popup: u32,
    next_download: u32,
    next_dialog: u32,
}

impl PageAliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the alias for a page, assigning one at first observation.
    pub fn register(&mut self, page_guid: Arc<str>) -> String {
        if let Some(alias) = self.by_page.get(&page_guid) {
            return alias.clone();
        }
        let alias = if self.by_page.is_empty() {
            "page".to_string()
        } else {
            self.next_popup += 1;
            format!("popup{}", self.next_popup)
        };
        self.by_page.insert(Arc::clone(&page_guid), alias.clone());
        self.by_alias.insert(alias.clone(), page_guid);
        alias
    }

    pub fn alias_for(&self, page_guid: &str) -> Option<&str> {
        self.by_page
            .get(&Arc::from(page_guid) as &Arc<str>)
            .map(String::as_str)
    }

    pub fn page_for(&self, alias: &str) -> Option<&Arc<str>> {
        self.by_alias.get(alias)
    }

    /// Removing a closed page keeps its ordinal burned.
    pub fn remove(&mut self, page_guid: &str) {
        if let Some(alias) = self.by_page.remove(&Arc::from(page_guid) as &Arc<str>) {
            self.by_alias.remove(&alias);
        }
    }

    pub fn next_download_alias(&mut self) -> String {
        self.next_download += 1;
        format!("download{}", self.next_download)
    }

    pub fn next_dialog_alias(&mut self) -> String {
        self.next_dialog += 1;
        format!("dialog{}", self.next_dialog)
    }
}
