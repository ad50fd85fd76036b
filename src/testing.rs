//! In-process substitutes for the three external collaborators. The
//! collaborator seams are trait objects precisely so the gateway can be
//! exercised without network dependencies; every test suite in the crate
//! wires these in place of the HTTP clients.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::identity::{IdentityError, IdentityResolver, Principal, Role};
use crate::pdp::{PdpError, PolicyChecker, ResourceDescriptor};
use crate::store::{Document, DocumentStore, Filter, StoreError};

/// Document store backed by process memory, with the same revision-checked
/// update semantics as the hosted store.
#[derive(Default)]
pub struct InMemoryStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    next_id: AtomicU64,
}

impl InMemoryStore {
    pub fn seed(&self, collection: &str, id: &str, attributes: Value) {
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(Document {
                id: id.to_string(),
                revision: 1,
                attributes,
            });
    }

    pub fn all(&self, collection: &str) -> Vec<Document> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn list(
        &self,
        collection: &str,
        filter: Option<&Filter>,
    ) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .all(collection)
            .into_iter()
            .filter(|d| {
                filter.map_or(true, |f| {
                    f.pairs().iter().all(|(k, v)| {
                        d.attributes.get(k).and_then(Value::as_str) == Some(v.as_str())
                    })
                })
            })
            .collect())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.all(collection).into_iter().find(|d| d.id == id))
    }

    async fn create(&self, collection: &str, attributes: Value) -> Result<Document, StoreError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let doc = Document {
            id: format!("gen-{n}"),
            revision: 1,
            attributes,
        };
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(doc.clone());
        Ok(doc)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
        expected_revision: Option<u64>,
    ) -> Result<Document, StoreError> {
        let mut collections = self.collections.lock().unwrap();
        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::Transport("unknown collection".into()))?;
        let doc = docs
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| StoreError::Transport("document missing".into()))?;
        if let Some(expected) = expected_revision {
            if expected != doc.revision {
                return Err(StoreError::Conflict {
                    collection: collection.to_string(),
                    id: id.to_string(),
                });
            }
        }
        if let (Some(attrs), Some(patch)) = (doc.attributes.as_object_mut(), patch.as_object()) {
            for (k, v) in patch {
                attrs.insert(k.clone(), v.clone());
            }
        }
        doc.revision += 1;
        Ok(doc.clone())
    }
}

/// Rule-table policy checker: allows exactly the registered (principal,
/// permission, resource) triples, records every check and sync, and can
/// simulate an unreachable PDP per resource or a failing resource sync.
#[derive(Default)]
pub struct StaticPolicy {
    allow: Mutex<HashSet<(String, String, String)>>,
    fail: Mutex<HashSet<String>>,
    checks: Mutex<Vec<(String, String, String)>>,
    synced: Mutex<Vec<(String, String, Value)>>,
    fail_sync: AtomicBool,
}

impl StaticPolicy {
    pub fn allow(&self, principal: &str, permission: &str, resource: &str) {
        self.allow.lock().unwrap().insert((
            principal.to_string(),
            permission.to_string(),
            resource.to_string(),
        ));
    }

    pub fn fail_resource(&self, resource: &str) {
        self.fail.lock().unwrap().insert(resource.to_string());
    }

    pub fn fail_sync(&self, fail: bool) {
        self.fail_sync.store(fail, Ordering::SeqCst);
    }

    pub fn check_count(&self) -> usize {
        self.checks.lock().unwrap().len()
    }

    pub fn synced_resources(&self) -> Vec<(String, String, Value)> {
        self.synced.lock().unwrap().clone()
    }
}

#[async_trait]
impl PolicyChecker for StaticPolicy {
    async fn check(
        &self,
        principal_id: &str,
        action: &str,
        resource: &ResourceDescriptor,
    ) -> Result<bool, PdpError> {
        let permission = resource.permission(action);
        let reference = resource.reference();
        self.checks.lock().unwrap().push((
            principal_id.to_string(),
            permission.clone(),
            reference.clone(),
        ));
        if self.fail.lock().unwrap().contains(&reference) {
            return Err(PdpError::Transport("pdp down".into()));
        }
        Ok(self.allow.lock().unwrap().contains(&(
            principal_id.to_string(),
            permission,
            reference,
        )))
    }

    async fn sync_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
        attributes: Value,
    ) -> Result<(), PdpError> {
        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(PdpError::Transport("sync failed".into()));
        }
        self.synced.lock().unwrap().push((
            resource_type.to_string(),
            resource_id.to_string(),
            attributes,
        ));
        Ok(())
    }
}

/// Static token-to-principal map standing in for the identity service.
#[derive(Default)]
pub struct StaticIdentity {
    tokens: Mutex<HashMap<String, Principal>>,
}

impl StaticIdentity {
    pub fn register(&self, token: &str, id: &str, role: Role) {
        self.tokens.lock().unwrap().insert(
            token.to_string(),
            Principal {
                id: id.to_string(),
                name: id.to_string(),
                email: None,
                role,
            },
        );
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentity {
    async fn resolve(&self, credential: &str) -> Result<Principal, IdentityError> {
        self.tokens
            .lock()
            .unwrap()
            .get(credential)
            .cloned()
            .ok_or(IdentityError::InvalidCredential)
    }
}
