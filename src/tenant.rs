use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::guard::Guard;
use crate::limits::*;
use crate::maintenance;
use crate::notify::NotifyHub;

/// Manages per-tenant guards. Each tenant gets its own Guard + WAL +
/// compactor. Tenant = database name from the pgwire connection.
pub struct TenantManager {
    guards: DashMap<String, Arc<Guard>>,
    data_dir: PathBuf,
    compact_threshold: u64,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64) -> Self {
        Self {
            guards: DashMap::new(),
            data_dir,
            compact_threshold,
        }
    }

    /// Get or lazily create the guard for the given tenant.
    pub fn get_or_create(&self, tenant: &str) -> std::io::Result<Arc<Guard>> {
        if let Some(guard) = self.guards.get(tenant) {
            return Ok(guard.value().clone());
        }
        if tenant.len() > MAX_TENANT_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "tenant name too long",
            ));
        }
        if self.guards.len() >= MAX_TENANTS {
            return Err(std::io::Error::other("too many tenants"));
        }

        // Sanitize tenant name to prevent path traversal
        let safe_name: String = tenant
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty tenant name",
            ));
        }

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let notify = Arc::new(NotifyHub::new());
        let guard = Arc::new(Guard::new(wal_path, notify)?);

        let compactor_guard = guard.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            maintenance::run_compactor(compactor_guard, threshold).await;
        });

        self.guards.insert(tenant.to_string(), guard.clone());
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.guards.len() as f64);
        Ok(guard)
    }
}
