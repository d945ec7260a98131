//! Remote menu pruning
//!
//! Removes every category of a tenant whose name is not on a keep-list,
//! together with the menu items that belong to it, then sweeps up items
//! whose `categoryId` no longer points at a kept category.
//!
//! The store is reached through [`DocumentStore`]; [`crate::firestore`]
//! talks to Firestore and [`MemoryStore`] keeps documents in memory.

use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};

pub const CATEGORIES: &str = "categories";
pub const MENU_ITEMS: &str = "menu_items";
/// Field on a menu item holding its category's document id
pub const CATEGORY_REF: &str = "categoryId";

/// A document in a tenant collection
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl RemoteDocument {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// A string field, if present and a string
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn name(&self) -> &str {
        self.str_field("name").unwrap_or("")
    }
}

/// Collections of documents scoped under `tenants/<tenant>`
pub trait DocumentStore {
    fn tenant_exists(&self, tenant: &str) -> Result<bool>;

    /// Every document of a collection
    fn list(&self, tenant: &str, collection: &str) -> Result<Vec<RemoteDocument>>;

    fn delete(&self, tenant: &str, collection: &str, id: &str) -> Result<()>;
}

/// What a pruning run did
#[derive(Debug, Default)]
pub struct PruneReport {
    /// Names of categories matched by the keep-list
    pub kept: Vec<String>,
    pub deleted_categories: usize,
    /// Items deleted along with their category
    pub deleted_items: usize,
    /// Items deleted in the orphan sweep
    pub deleted_orphans: usize,
    /// Delete failures; each was logged and skipped
    pub failures: Vec<Error>,
    /// Categories left after the run, from a fresh listing
    pub remaining_categories: Vec<RemoteDocument>,
    /// Number of items left after the run
    pub remaining_items: usize,
}

/// Prune a tenant's menu down to the categories named in `keep`
///
/// Listing failures and an unknown tenant abort the run before anything is
/// deleted. Individual delete failures are recorded and the run goes on.
pub fn prune_menu<S: DocumentStore + ?Sized>(
    store: &S,
    tenant: &str,
    keep: &[String],
) -> Result<PruneReport> {
    if !store.tenant_exists(tenant)? {
        return Err(Error::Remote(format!("tenant not found: {}", tenant)));
    }

    let categories = store.list(tenant, CATEGORIES)?;
    let items = store.list(tenant, MENU_ITEMS)?;
    tracing::info!(
        tenant,
        categories = categories.len(),
        items = items.len(),
        "listed menu"
    );

    let mut report = PruneReport::default();
    let (kept, doomed): (Vec<_>, Vec<_>) = categories
        .into_iter()
        .partition(|c| keep.iter().any(|k| k == c.name()));
    let kept_ids: HashSet<&str> = kept.iter().map(|c| c.id.as_str()).collect();
    report.kept = kept.iter().map(|c| c.name().to_string()).collect();

    for category in &doomed {
        for item in items
            .iter()
            .filter(|i| i.str_field(CATEGORY_REF) == Some(category.id.as_str()))
        {
            if delete_logged(store, tenant, MENU_ITEMS, &item.id, &mut report.failures) {
                report.deleted_items += 1;
            }
        }
        if delete_logged(store, tenant, CATEGORIES, &category.id, &mut report.failures) {
            tracing::info!(tenant, id = %category.id, name = category.name(), "category deleted");
            report.deleted_categories += 1;
        }
    }

    // Re-list so items whose first delete failed get a second attempt
    for item in store.list(tenant, MENU_ITEMS)? {
        let resolves = item
            .str_field(CATEGORY_REF)
            .is_some_and(|id| kept_ids.contains(id));
        if !resolves && delete_logged(store, tenant, MENU_ITEMS, &item.id, &mut report.failures) {
            report.deleted_orphans += 1;
        }
    }

    report.remaining_categories = store.list(tenant, CATEGORIES)?;
    report.remaining_items = store.list(tenant, MENU_ITEMS)?.len();
    Ok(report)
}

fn delete_logged<S: DocumentStore + ?Sized>(
    store: &S,
    tenant: &str,
    collection: &str,
    id: &str,
    failures: &mut Vec<Error>,
) -> bool {
    match store.delete(tenant, collection, id) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(tenant, collection, id, error = %e, "delete failed");
            failures.push(Error::record(collection, id, e));
            false
        }
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Document store held in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    tenants: RefCell<BTreeMap<String, BTreeMap<String, Vec<RemoteDocument>>>>,
    /// Document id -> number of upcoming deletes of it that fail
    failing: RefCell<BTreeMap<String, usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant: &str, collection: &str, doc: RemoteDocument) {
        let mut tenants = self.tenants.borrow_mut();
        let docs = tenants
            .entry(tenant.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default();
        docs.retain(|d| d.id != doc.id);
        docs.push(doc);
    }

    /// Make deleting `id` fail from now on
    pub fn fail_deletes_of(&mut self, id: &str) {
        self.fail_next_deletes_of(id, usize::MAX);
    }

    /// Make the next `times` deletes of `id` fail
    pub fn fail_next_deletes_of(&mut self, id: &str, times: usize) {
        self.failing.get_mut().insert(id.to_string(), times);
    }
}

impl DocumentStore for MemoryStore {
    fn tenant_exists(&self, tenant: &str) -> Result<bool> {
        Ok(self.tenants.borrow().contains_key(tenant))
    }

    fn list(&self, tenant: &str, collection: &str) -> Result<Vec<RemoteDocument>> {
        Ok(self
            .tenants
            .borrow()
            .get(tenant)
            .and_then(|c| c.get(collection))
            .cloned()
            .unwrap_or_default())
    }

    fn delete(&self, tenant: &str, collection: &str, id: &str) -> Result<()> {
        if let Some(left) = self.failing.borrow_mut().get_mut(id).filter(|n| **n > 0) {
            *left -= 1;
            return Err(Error::Remote(format!("permission denied deleting {}", id)));
        }
        if let Some(docs) = self
            .tenants
            .borrow_mut()
            .get_mut(tenant)
            .and_then(|c| c.get_mut(collection))
        {
            docs.retain(|d| d.id != id);
        }
        Ok(())
    }
}
