//! Versioned in-memory object store used by `MockClusterClient`
//!
//! Mirrors the API server rules the reconciler depends on: creates fail on
//! existing names, replaces and deletes fail on a stale resourceVersion.

use crate::error::ClusterError;
use kube::Resource;
use std::collections::HashMap;

pub(crate) struct Store<K> {
    kind: &'static str,
    objects: HashMap<(String, String), K>,
}

impl<K: Resource + Clone> Store<K> {
    pub(crate) fn new(kind: &'static str) -> Self {
        Self {
            kind,
            objects: HashMap::new(),
        }
    }

    pub(crate) fn get(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Objects in `namespace` (all for `None`), ordered by namespace and name
    pub(crate) fn list(&self, namespace: Option<&str>) -> Vec<K> {
        let mut keys: Vec<_> = self.objects
            .keys()
            .filter(|(ns, _)| namespace.is_none_or(|wanted| *ns == wanted))
            .collect();
        keys.sort();
        keys.into_iter().filter_map(|key| self.objects.get(key).cloned()).collect()
    }

    pub(crate) fn create(&mut self, object: &K, version: u64) -> Result<K, ClusterError> {
        let key = self.key_of(object)?;
        if self.objects.contains_key(&key) {
            return Err(ClusterError::Conflict(format!(
                "{} {}/{} already exists",
                self.kind, key.0, key.1
            )));
        }
        let mut stored = object.clone();
        stored.meta_mut().resource_version = Some(version.to_string());
        stored.meta_mut().uid = Some(format!("uid-{}-{}", self.kind.to_lowercase(), version));
        self.objects.insert(key, stored.clone());
        Ok(stored)
    }

    pub(crate) fn replace(&mut self, object: &K, version: u64) -> Result<K, ClusterError> {
        let key = self.key_of(object)?;
        let Some(current) = self.objects.get(&key) else {
            return Err(ClusterError::NotFound(format!("{} {}/{} not found", self.kind, key.0, key.1)));
        };
        let expected = object.meta().resource_version.as_deref();
        if expected.is_some() && expected != current.meta().resource_version.as_deref() {
            return Err(ClusterError::Conflict(format!(
                "{} {}/{} was modified; please apply your changes to the latest version",
                self.kind, key.0, key.1
            )));
        }
        let mut stored = object.clone();
        stored.meta_mut().resource_version = Some(version.to_string());
        stored.meta_mut().uid = current.meta().uid.clone();
        self.objects.insert(key, stored.clone());
        Ok(stored)
    }

    pub(crate) fn delete(&mut self, namespace: &str, name: &str, resource_version: Option<&str>) -> Result<(), ClusterError> {
        let key = (namespace.to_string(), name.to_string());
        let Some(current) = self.objects.get(&key) else {
            return Err(ClusterError::NotFound(format!("{} {}/{} not found", self.kind, namespace, name)));
        };
        if resource_version.is_some() && resource_version != current.meta().resource_version.as_deref() {
            return Err(ClusterError::Conflict(format!(
                "{} {}/{} precondition failed",
                self.kind, namespace, name
            )));
        }
        self.objects.remove(&key);
        Ok(())
    }

    /// Insert or overwrite without any checks (test setup)
    pub(crate) fn put(&mut self, object: &K, version: u64) -> Result<K, ClusterError> {
        let key = self.key_of(object)?;
        let mut stored = object.clone();
        stored.meta_mut().resource_version = Some(version.to_string());
        self.objects.insert(key, stored.clone());
        Ok(stored)
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.len()
    }

    fn key_of(&self, object: &K) -> Result<(String, String), ClusterError> {
        let meta = object.meta();
        match (&meta.namespace, &meta.name) {
            (Some(namespace), Some(name)) => Ok((namespace.clone(), name.clone())),
            _ => Err(ClusterError::Invalid(format!("{} is missing namespace or name", self.kind))),
        }
    }
}
