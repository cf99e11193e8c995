use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::booking::{BookingPolicy, BookingService};
use crate::compactor;
use crate::engine::Engine;
use crate::gate::AbuseGate;
use crate::limits::*;
use crate::notify::Notifier;

/// One provider: its slot store and the booking service running on it.
pub struct Tenant {
    pub engine: Arc<Engine>,
    pub booking: BookingService<Engine>,
}

/// Manages per-provider engines. Each provider gets its own Engine + WAL +
/// compactor. Provider = database name from the pgwire connection.
pub struct TenantManager {
    tenants: DashMap<String, Arc<Tenant>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    gate: Arc<dyn AbuseGate>,
    notifier: Arc<dyn Notifier>,
    policy: BookingPolicy,
}

impl TenantManager {
    pub fn new(
        data_dir: PathBuf,
        compact_threshold: u64,
        gate: Arc<dyn AbuseGate>,
        notifier: Arc<dyn Notifier>,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            tenants: DashMap::new(),
            data_dir,
            compact_threshold,
            gate,
            notifier,
            policy,
        }
    }

    /// Get or lazily load the provider with the given name.
    ///
    /// Names that sanitize to the same file stem share one provider, so two
    /// engines can never write the same WAL.
    pub fn get_or_create(&self, name: &str) -> std::io::Result<Arc<Tenant>> {
        if name.len() > MAX_TENANT_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "tenant name too long",
            ));
        }
        // Sanitize to prevent path traversal
        let safe_name: String = name
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty tenant name",
            ));
        }

        if let Some(tenant) = self.tenants.get(&safe_name) {
            return Ok(tenant.value().clone());
        }
        if self.tenants.len() >= MAX_TENANTS {
            return Err(std::io::Error::other("too many tenants"));
        }

        // Two connections may race to load the same provider; the entry lock
        // makes sure only one engine (and one WAL writer) is ever created.
        let entry = self.tenants.entry(safe_name.clone());
        if let dashmap::Entry::Occupied(existing) = &entry {
            return Ok(existing.get().clone());
        }

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let engine = Arc::new(Engine::new(wal_path)?);

        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            compactor::run_compactor(compactor_engine, threshold).await;
        });

        let booking = BookingService::new(
            engine.clone(),
            self.gate.clone(),
            self.notifier.clone(),
            self.policy.clone(),
        );
        let tenant = Arc::new(Tenant { engine, booking });
        entry.or_insert(tenant.clone());
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.tenants.len() as f64);
        tracing::info!(tenant = %safe_name, "loaded provider");
        Ok(tenant)
    }
}
