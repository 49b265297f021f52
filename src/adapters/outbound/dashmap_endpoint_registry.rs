//! DashMap Endpoint Registry
//!
//! Implements EndpointRegistry using DashMap for concurrent access.
//! Structural changes that touch several entries (group deletion,
//! membership checks) are serialized behind a single mutex.

use crate::domain::entities::{
    Endpoint, EndpointFilter, EndpointUpdate, Group, GroupDeletePolicy, HealthUpdate, NewEndpoint,
};
use crate::domain::ports::EndpointRegistry;
use crate::domain::services::TargetResolver;
use crate::domain::value_objects::{EndpointId, GroupId, TransportType};
use crate::error::RegistryError;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

/// Full copy of the registry contents, used for persistence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrySnapshot {
    pub groups: Vec<Group>,
    pub endpoints: Vec<Endpoint>,
}

/// DashMap-backed endpoint registry.
pub struct DashMapEndpointRegistry {
    endpoints: Arc<DashMap<EndpointId, Endpoint>>,
    groups: Arc<DashMap<GroupId, Group>>,
    structure: Mutex<()>,
}

impl DashMapEndpointRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            endpoints: Arc::new(DashMap::new()),
            groups: Arc::new(DashMap::new()),
            structure: Mutex::new(()),
        }
    }

    /// Copy out every group and endpoint, ordered by id.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut groups: Vec<Group> = self.groups.iter().map(|e| e.value().clone()).collect();
        groups.sort_by(|a, b| a.id.cmp(&b.id));
        let mut endpoints: Vec<Endpoint> = self.endpoints.iter().map(|e| e.value().clone()).collect();
        endpoints.sort_by(|a, b| a.id.cmp(&b.id));
        RegistrySnapshot { groups, endpoints }
    }

    /// Replace the registry contents with a previously saved snapshot.
    pub fn restore(&self, snapshot: RegistrySnapshot) {
        let _guard = self.structure.lock();
        self.groups.clear();
        self.endpoints.clear();
        for group in snapshot.groups {
            self.groups.insert(group.id.clone(), group);
        }
        for endpoint in snapshot.endpoints {
            self.endpoints.insert(endpoint.id.clone(), endpoint);
        }
        tracing::info!(
            "registry restored: {} groups, {} endpoints",
            self.groups.len(),
            self.endpoints.len()
        );
    }

    fn all_groups(&self) -> Vec<Group> {
        self.groups.iter().map(|e| e.value().clone()).collect()
    }

    fn validate_name(name: &str) -> Result<String, RegistryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistryError::validation("name must not be empty"));
        }
        Ok(name.to_string())
    }

    fn validate_transport(raw: &str) -> Result<TransportType, RegistryError> {
        TransportType::from_str(raw).map_err(RegistryError::Validation)
    }

    fn validate_target_url(raw: &str) -> Result<String, RegistryError> {
        let parsed = url::Url::parse(raw.trim())
            .map_err(|e| RegistryError::validation(format!("target_url {:?}: {}", raw, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RegistryError::validation(format!(
                "target_url {:?}: scheme must be http or https",
                raw
            )));
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(RegistryError::validation(format!("target_url {:?}: missing host", raw)));
        }
        Ok(raw.trim().to_string())
    }

    fn validate_groups(&self, group_ids: &BTreeSet<GroupId>) -> Result<(), RegistryError> {
        match group_ids.iter().find(|g| !self.groups.contains_key(*g)) {
            Some(missing) => Err(RegistryError::validation(format!("unknown group {}", missing))),
            None => Ok(()),
        }
    }
}

impl Default for DashMapEndpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EndpointRegistry for DashMapEndpointRegistry {
    async fn register(&self, endpoint: NewEndpoint) -> Result<EndpointId, RegistryError> {
        let name = Self::validate_name(&endpoint.name)?;
        let transport_type = Self::validate_transport(&endpoint.transport_type)?;
        let target_url = Self::validate_target_url(&endpoint.target_url)?;

        let _guard = self.structure.lock();
        self.validate_groups(&endpoint.group_ids)?;

        let id = EndpointId::generate();
        self.endpoints.insert(
            id.clone(),
            Endpoint {
                id: id.clone(),
                name,
                transport_type,
                target_url,
                credentials: endpoint.credentials,
                group_ids: endpoint.group_ids,
                enabled: endpoint.enabled,
                consecutive_failures: 0,
                last_success_at: None,
                last_failure_at: None,
                last_pull_at: None,
                created_at: Utc::now(),
            },
        );

        tracing::info!("registered endpoint {} ({})", id, transport_type);
        Ok(id)
    }

    async fn get(&self, id: &EndpointId) -> Result<Endpoint, RegistryError> {
        self.endpoints
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| RegistryError::EndpointNotFound(id.clone()))
    }

    async fn list(&self, filter: &EndpointFilter) -> Vec<Endpoint> {
        let mut out: Vec<Endpoint> = self
            .endpoints
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    async fn update(&self, id: &EndpointId, update: EndpointUpdate) -> Result<Endpoint, RegistryError> {
        let name = update.name.as_deref().map(Self::validate_name).transpose()?;
        let target_url = update
            .target_url
            .as_deref()
            .map(Self::validate_target_url)
            .transpose()?;
        let transport_type = update
            .transport_type
            .as_deref()
            .map(Self::validate_transport)
            .transpose()?;

        let _guard = self.structure.lock();
        if let Some(groups) = &update.group_ids {
            self.validate_groups(groups)?;
        }

        let mut entry = self
            .endpoints
            .get_mut(id)
            .ok_or_else(|| RegistryError::EndpointNotFound(id.clone()))?;

        if transport_type.is_some_and(|t| t != entry.transport_type) {
            return Err(RegistryError::ImmutableField("transport_type"));
        }

        if let Some(name) = name {
            entry.name = name;
        }
        if let Some(target_url) = target_url {
            entry.target_url = target_url;
        }
        if let Some(credentials) = update.credentials {
            entry.credentials = credentials;
        }
        if let Some(groups) = update.group_ids {
            entry.group_ids = groups;
        }

        tracing::info!("updated endpoint {}", id);
        Ok(entry.value().clone())
    }

    async fn disable(&self, id: &EndpointId) -> Result<bool, RegistryError> {
        let mut entry = self
            .endpoints
            .get_mut(id)
            .ok_or_else(|| RegistryError::EndpointNotFound(id.clone()))?;
        let was_enabled = entry.enabled;
        entry.enabled = false;
        if was_enabled {
            tracing::warn!("endpoint {} disabled", id);
        }
        Ok(was_enabled)
    }

    async fn enable(&self, id: &EndpointId) -> Result<bool, RegistryError> {
        let mut entry = self
            .endpoints
            .get_mut(id)
            .ok_or_else(|| RegistryError::EndpointNotFound(id.clone()))?;
        let was_disabled = !entry.enabled;
        entry.enabled = true;
        if was_disabled {
            tracing::info!("endpoint {} enabled", id);
        }
        Ok(was_disabled)
    }

    async fn delete(&self, id: &EndpointId) -> Result<Endpoint, RegistryError> {
        let (_, endpoint) = self
            .endpoints
            .remove(id)
            .ok_or_else(|| RegistryError::EndpointNotFound(id.clone()))?;
        tracing::info!("deleted endpoint {}", id);
        Ok(endpoint)
    }

    async fn record_health(&self, id: &EndpointId, update: HealthUpdate) -> Result<(), RegistryError> {
        let mut entry = self
            .endpoints
            .get_mut(id)
            .ok_or_else(|| RegistryError::EndpointNotFound(id.clone()))?;

        match update {
            HealthUpdate::Success { at } => {
                entry.consecutive_failures = 0;
                entry.last_success_at = Some(at);
            }
            HealthUpdate::Failure {
                at,
                consecutive_failures,
            } => {
                entry.consecutive_failures = consecutive_failures;
                entry.last_failure_at = Some(at);
            }
            HealthUpdate::Pulled { at } => {
                entry.last_pull_at = Some(at);
            }
            HealthUpdate::Reset => {
                entry.consecutive_failures = 0;
            }
        }
        Ok(())
    }

    async fn create_group(&self, name: &str, parent_id: Option<GroupId>) -> Result<GroupId, RegistryError> {
        let name = Self::validate_name(name)?;

        let _guard = self.structure.lock();
        if let Some(parent) = &parent_id {
            if !self.groups.contains_key(parent) {
                return Err(RegistryError::validation(format!("unknown parent group {}", parent)));
            }
        }

        let id = GroupId::generate();
        self.groups.insert(
            id.clone(),
            Group {
                id: id.clone(),
                name,
                parent_id,
            },
        );
        tracing::info!("created group {}", id);
        Ok(id)
    }

    async fn get_group(&self, id: &GroupId) -> Result<Group, RegistryError> {
        self.groups
            .get(id)
            .map(|g| g.value().clone())
            .ok_or_else(|| RegistryError::GroupNotFound(id.clone()))
    }

    async fn list_groups(&self) -> Vec<Group> {
        let mut groups = self.all_groups();
        groups.sort_by(|a, b| a.id.cmp(&b.id));
        groups
    }

    async fn move_group(&self, id: &GroupId, parent_id: Option<GroupId>) -> Result<Group, RegistryError> {
        let _guard = self.structure.lock();

        if !self.groups.contains_key(id) {
            return Err(RegistryError::GroupNotFound(id.clone()));
        }
        if let Some(parent) = &parent_id {
            if !self.groups.contains_key(parent) {
                return Err(RegistryError::validation(format!("unknown parent group {}", parent)));
            }
            if TargetResolver::would_cycle(id, parent, &self.all_groups()) {
                return Err(RegistryError::validation(format!(
                    "moving group {} under {} would create a cycle",
                    id, parent
                )));
            }
        }

        let mut group = self
            .groups
            .get_mut(id)
            .ok_or_else(|| RegistryError::GroupNotFound(id.clone()))?;
        group.parent_id = parent_id;
        tracing::info!("moved group {}", id);
        Ok(group.value().clone())
    }

    async fn delete_group(&self, id: &GroupId, policy: GroupDeletePolicy) -> Result<(), RegistryError> {
        let _guard = self.structure.lock();

        let group = self
            .groups
            .get(id)
            .map(|g| g.value().clone())
            .ok_or_else(|| RegistryError::GroupNotFound(id.clone()))?;

        let member_ids: Vec<EndpointId> = self
            .endpoints
            .iter()
            .filter(|e| e.group_ids.contains(id))
            .map(|e| e.id.clone())
            .collect();
        let child_ids: Vec<GroupId> = self
            .groups
            .iter()
            .filter(|g| g.parent_id.as_ref() == Some(id))
            .map(|g| g.id.clone())
            .collect();

        match policy {
            GroupDeletePolicy::Block => {
                if !member_ids.is_empty() || !child_ids.is_empty() {
                    return Err(RegistryError::GroupInUse(id.clone()));
                }
            }
            GroupDeletePolicy::ReassignToParent => {
                for endpoint_id in &member_ids {
                    if let Some(mut endpoint) = self.endpoints.get_mut(endpoint_id) {
                        endpoint.group_ids.remove(id);
                        if let Some(parent) = &group.parent_id {
                            endpoint.group_ids.insert(parent.clone());
                        }
                    }
                }
                for child_id in &child_ids {
                    if let Some(mut child) = self.groups.get_mut(child_id) {
                        child.parent_id = group.parent_id.clone();
                    }
                }
            }
        }

        self.groups.remove(id);
        tracing::info!(
            "deleted group {} (reassigned {} endpoints, {} child groups)",
            id,
            member_ids.len(),
            child_ids.len()
        );
        Ok(())
    }
}
