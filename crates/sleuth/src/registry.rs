//! The service registry: who offers what, and where.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sleuth_common::{codes, Error, Result};
use tracing::{debug, info};

use crate::notifier::Notifier;
use crate::peer::Peer;
use crate::pool::WorkerPool;

struct RegistryState {
    /// service name → worker pool; pools are created on first add and
    /// dropped when their last peer departs.
    services: HashMap<String, Arc<WorkerPool>>,
    /// peer name → service name, for cleanup when a peer exits.
    directory: HashMap<String, String>,
}

/// Tracks group members and the services they offer.
///
/// The service map and the reverse index mutate under one lock so readers
/// observe them consistently. Mutations come only from the dispatcher's
/// enter/exit handling, which is sequential per client.
pub(crate) struct Registry {
    group: String,
    notifier: Arc<Notifier>,
    state: Mutex<RegistryState>,
}

impl Registry {
    pub fn new(group: String, notifier: Arc<Notifier>) -> Self {
        Self {
            group,
            notifier,
            state: Mutex::new(RegistryState {
                services: HashMap::new(),
                directory: HashMap::new(),
            }),
        }
    }

    /// Registers a peer announced by an enter event.
    ///
    /// Members of foreign groups and members that announce no service are
    /// treated as client-only and skipped. A member of this group whose
    /// announcement is missing its node or service header fails with
    /// `ERR_ADD` (924); nothing is registered.
    pub fn add_peer(
        &self,
        group: &str,
        name: &str,
        node: &str,
        service: &str,
        version: &str,
    ) -> Result<()> {
        if group != self.group {
            debug!(peer = name, "no group header, client-only");
            return Ok(());
        }
        if node.is_empty() || service.is_empty() {
            return Err(Error::new(
                codes::ERR_ADD,
                format!(
                    "failed to add {name}: node?={} service?={}",
                    !node.is_empty(),
                    !service.is_empty()
                ),
            ));
        }

        let pool = {
            let mut state = self.state.lock().unwrap();
            state
                .directory
                .insert(name.to_string(), service.to_string());
            Arc::clone(
                state
                    .services
                    .entry(service.to_string())
                    .or_insert_with(|| Arc::new(WorkerPool::new())),
            )
        };
        pool.add(Peer {
            name: name.to_string(),
            node: node.to_string(),
            service: service.to_string(),
            version: version.to_string(),
        });
        self.notifier.notify();
        info!(
            service,
            version,
            peer = name,
            group = %self.group,
            "add peer"
        );
        Ok(())
    }

    /// Deregisters a departed peer. Unknown names are a no-op.
    pub fn remove_peer(&self, name: &str) {
        let (service, pool) = {
            let mut state = self.state.lock().unwrap();
            let Some(service) = state.directory.remove(name) else {
                return;
            };
            let pool = state.services.get(&service).cloned();
            (service, pool)
        };
        let Some(pool) = pool else { return };

        let (remaining, _) = pool.remove(name);
        if remaining == 0 {
            let mut state = self.state.lock().unwrap();
            if state
                .services
                .get(&service)
                .is_some_and(|pool| !pool.available())
            {
                state.services.remove(&service);
            }
        }
        info!(service, peer = name, group = %self.group, "remove peer");
    }

    /// Looks up the worker pool for a service.
    pub fn lookup(&self, service: &str) -> Option<Arc<WorkerPool>> {
        self.state.lock().unwrap().services.get(service).cloned()
    }

    /// True iff every listed service has at least one live peer.
    pub fn has_all(&self, services: &[String]) -> bool {
        let pools: Vec<Option<Arc<WorkerPool>>> = {
            let state = self.state.lock().unwrap();
            services
                .iter()
                .map(|service| state.services.get(service).cloned())
                .collect()
        };
        pools
            .iter()
            .all(|pool| pool.as_ref().is_some_and(|pool| pool.available()))
    }
}
