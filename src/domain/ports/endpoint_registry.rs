//! Endpoint Registry Port
//!
//! Defines the interface for storing endpoints and endpoint groups.
//! The registry is the only writer of `Endpoint.enabled`.

use crate::domain::entities::{
    Endpoint, EndpointFilter, EndpointUpdate, Group, GroupDeletePolicy, HealthUpdate, NewEndpoint,
};
use crate::domain::value_objects::{EndpointId, GroupId};
use crate::error::RegistryError;
use async_trait::async_trait;

/// Repository of remote endpoints and their groups.
///
/// This is an outbound port; implementations must make enable/disable
/// visible to the very next read (no cached copies).
#[async_trait]
pub trait EndpointRegistry: Send + Sync {
    /// Validate and store a new endpoint, returning its generated id.
    async fn register(&self, endpoint: NewEndpoint) -> Result<EndpointId, RegistryError>;

    async fn get(&self, id: &EndpointId) -> Result<Endpoint, RegistryError>;

    async fn list(&self, filter: &EndpointFilter) -> Vec<Endpoint>;

    async fn update(&self, id: &EndpointId, update: EndpointUpdate) -> Result<Endpoint, RegistryError>;

    /// Returns true when the endpoint was enabled before the call.
    async fn disable(&self, id: &EndpointId) -> Result<bool, RegistryError>;

    /// Returns true when the endpoint was disabled before the call.
    async fn enable(&self, id: &EndpointId) -> Result<bool, RegistryError>;

    async fn delete(&self, id: &EndpointId) -> Result<Endpoint, RegistryError>;

    /// Write delivery health stamps (failure counts, timestamps).
    async fn record_health(&self, id: &EndpointId, update: HealthUpdate) -> Result<(), RegistryError>;

    async fn create_group(&self, name: &str, parent_id: Option<GroupId>) -> Result<GroupId, RegistryError>;

    async fn get_group(&self, id: &GroupId) -> Result<Group, RegistryError>;

    async fn list_groups(&self) -> Vec<Group>;

    /// Re-parent a group. Moving a group below one of its descendants is a
    /// validation error.
    async fn move_group(&self, id: &GroupId, parent_id: Option<GroupId>) -> Result<Group, RegistryError>;

    async fn delete_group(&self, id: &GroupId, policy: GroupDeletePolicy) -> Result<(), RegistryError>;
}
