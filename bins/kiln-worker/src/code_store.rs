//! In-process store of submitted source, keyed by an opaque code ID.
//!
//! The sandbox driver leases an entry for the lifetime of one job; the
//! executor container fetches it back over the loopback HTTP endpoint.
//! Leases release on drop, so the entry disappears on every exit path of
//! the driver, panics included.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

#[derive(Clone, Default)]
pub struct CodeStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl CodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a source blob under a fresh code ID.
    ///
    /// The returned lease is the only handle to the entry; dropping it
    /// removes the source from the store.
    pub fn lease(&self, source: String) -> CodeLease {
        let code_id = Uuid::new_v4().to_string();
        self.entries
            .write()
            .unwrap()
            .insert(code_id.clone(), source);
        CodeLease {
            store: self.clone(),
            code_id,
        }
    }

    pub fn get(&self, code_id: &str) -> Option<String> {
        self.entries.read().unwrap().get(code_id).cloned()
    }

    fn remove(&self, code_id: &str) {
        self.entries.write().unwrap().remove(code_id);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }
}

/// Scoped ownership of one code-store entry.
pub struct CodeLease {
    store: CodeStore,
    code_id: String,
}

impl CodeLease {
    pub fn code_id(&self) -> &str {
        &self.code_id
    }
}

impl Drop for CodeLease {
    fn drop(&mut self) {
        self.store.remove(&self.code_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leased_source_is_readable_until_drop() {
        let store = CodeStore::new();
        let lease = store.lease("print('hi')".to_string());

        assert_eq!(store.get(lease.code_id()).as_deref(), Some("print('hi')"));

        let id = lease.code_id().to_string();
        drop(lease);
        assert_eq!(store.get(&id), None);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn unknown_ids_miss() {
        let store = CodeStore::new();
        assert_eq!(store.get("nope"), None);
    }

    #[test]
    fn concurrent_leases_do_not_collide() {
        let store = CodeStore::new();
        let a = store.lease("a".to_string());
        let b = store.lease("b".to_string());

        assert_ne!(a.code_id(), b.code_id());
        assert_eq!(store.get(a.code_id()).as_deref(), Some("a"));
        assert_eq!(store.get(b.code_id()).as_deref(), Some("b"));

        drop(a);
        // Releasing one job's entry must not disturb another's.
        assert_eq!(store.get(b.code_id()).as_deref(), Some("b"));
    }

    #[test]
    fn store_is_safe_across_threads() {
        let store = CodeStore::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let lease = store.lease(format!("src-{i}"));
                        assert_eq!(
                            store.get(lease.code_id()).as_deref(),
                            Some(format!("src-{i}").as_str())
                        );
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn lease_releases_even_when_owner_panics() {
        let store = CodeStore::new();
        let result = std::panic::catch_unwind({
            let store = store.clone();
            move || {
                let _lease = store.lease("doomed".to_string());
                panic!("driver blew up");
            }
        });

        assert!(result.is_err());
        assert_eq!(store.len(), 0);
    }
}
