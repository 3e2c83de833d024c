//! Namespace Registry
//!
//! Owns every namespace of a process and resolves them by name.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use super::{Namespace, NamespaceBuilder, NamespaceStats};
use crate::error::Result;

// == Registry ==
/// Name -> namespace lookup shared by the transport and the application.
///
/// Namespaces stay registered until [`remove_namespace`](Self::remove_namespace)
/// is called or the registry is dropped. Creating a namespace under a name
/// that is already taken replaces the previous one.
#[derive(Debug, Default)]
pub struct Registry {
    namespaces: RwLock<HashMap<String, Arc<Namespace>>>,
}

impl Registry {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Create ==
    /// Builds the namespace and registers it under its name.
    pub fn create_namespace(&self, builder: NamespaceBuilder) -> Result<Arc<Namespace>> {
        let namespace = Arc::new(builder.build()?);
        let name = namespace.name().to_string();

        let previous = self
            .namespaces
            .write()
            .insert(name.clone(), Arc::clone(&namespace));
        if previous.is_some() {
            warn!(namespace = %name, "replaced existing namespace");
        }
        Ok(namespace)
    }

    // == Lookup ==
    /// Returns the namespace registered as `name`, if any.
    pub fn get_namespace(&self, name: &str) -> Option<Arc<Namespace>> {
        self.namespaces.read().get(name).cloned()
    }

    // == Remove ==
    /// Unregisters `name`. Callers holding the namespace keep a working handle.
    pub fn remove_namespace(&self, name: &str) -> Option<Arc<Namespace>> {
        let removed = self.namespaces.write().remove(name);
        if removed.is_some() {
            info!(namespace = %name, "namespace removed");
        }
        removed
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.namespaces.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Stats of every registered namespace, sorted by name.
    pub fn stats(&self) -> Vec<(String, NamespaceStats)> {
        let mut stats: Vec<(String, NamespaceStats)> = self
            .namespaces
            .read()
            .iter()
            .map(|(name, namespace)| (name.clone(), namespace.stats()))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }

    pub fn len(&self) -> usize {
        self.namespaces.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.read().is_empty()
    }
}
