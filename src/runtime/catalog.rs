use std::collections::BTreeMap;
use std::sync::Arc;
use crate::Key;
use crate::runtime::definition::ExecutableProcess;

/// A deployed, immutable process definition
#[derive(Debug, Clone, PartialEq)]
pub struct DeployedProcess {
    pub key: Key,
    pub bpmn_process_id: String,
    pub version: i32,
    pub tenant_id: String,
    pub process: ExecutableProcess,
}

/// Deployed definitions by key. Versions count up per bpmn process id and tenant.
#[derive(Debug, Clone, Default)]
pub struct ProcessCatalog {
    processes: BTreeMap<Key, Arc<DeployedProcess>>,
}

impl ProcessCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deploy(&mut self, key: Key, tenant_id: &str, process: ExecutableProcess) -> Arc<DeployedProcess> {
        let version = self
            .latest(&process.bpmn_process_id, tenant_id)
            .map(|p| p.version + 1)
            .unwrap_or(1);
        let deployed = Arc::new(DeployedProcess {
            key,
            bpmn_process_id: process.bpmn_process_id.clone(),
            version,
            tenant_id: tenant_id.to_string(),
            process,
        });
        self.processes.insert(key, Arc::clone(&deployed));
        deployed
    }

    pub fn by_key(&self, key: Key) -> Option<Arc<DeployedProcess>> {
        self.processes.get(&key).cloned()
    }

    pub fn by_key_and_tenant(&self, key: Key, tenant_id: &str) -> Option<Arc<DeployedProcess>> {
        self.processes
            .get(&key)
            .filter(|p| p.tenant_id == tenant_id)
            .cloned()
    }

    pub fn latest(&self, bpmn_process_id: &str, tenant_id: &str) -> Option<Arc<DeployedProcess>> {
        self.processes
            .values()
            .filter(|p| p.bpmn_process_id == bpmn_process_id && p.tenant_id == tenant_id)
            .max_by_key(|p| p.version)
            .cloned()
    }

    /// Latest versions of every process, in deployment order
    pub fn latest_versions(&self) -> Vec<Arc<DeployedProcess>> {
        let mut latest: Vec<Arc<DeployedProcess>> = Vec::new();
        for process in self.processes.values() {
            match latest
                .iter_mut()
                .find(|p| p.bpmn_process_id == process.bpmn_process_id && p.tenant_id == process.tenant_id)
            {
                Some(existing) if existing.version < process.version => *existing = Arc::clone(process),
                Some(_) => {}
                None => latest.push(Arc::clone(process)),
            }
        }
        latest
    }
}
