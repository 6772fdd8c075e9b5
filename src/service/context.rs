//! Shared context handed to services at init time.

use std::sync::Arc;

use dashmap::DashMap;

use crate::service::Service;

/// Directory of registered services plus free-form key/value settings.
///
/// Cloning shares the same underlying maps.
#[derive(Clone, Default)]
pub struct ServerContext {
    services: Arc<DashMap<String, Arc<dyn Service>>>,
    config: Arc<DashMap<String, String>>,
}

impl ServerContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `service` under its name, replacing any previous one.
    pub fn add_service(&self, service: Arc<dyn Service>) {
        self.services.insert(service.name().to_string(), service);
    }

    pub fn service(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.services.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn set_config(&self, key: impl Into<String>, value: impl Into<String>) {
        self.config.insert(key.into(), value.into());
    }

    pub fn config(&self, key: &str) -> Option<String> {
        self.config.get(key).map(|v| v.value().clone())
    }

    /// Setting for `key`, or `default` when unset.
    pub fn config_or(&self, key: &str, default: &str) -> String {
        self.config(key).unwrap_or_else(|| default.to_string())
    }
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("services", &self.service_names())
            .field("config_keys", &self.config.len())
            .finish()
    }
}
