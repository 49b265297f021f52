mod dashmap_endpoint_registry;
mod dashmap_job_store;
mod memory_content_store;
mod notification_sinks;
mod sqlite_endpoint_store;
pub mod transports;

pub use dashmap_endpoint_registry::{DashMapEndpointRegistry, RegistrySnapshot};
pub use dashmap_job_store::DashMapJobStore;
pub use memory_content_store::MemoryContentStore;
pub use notification_sinks::{FanoutSink, LogNotificationSink, WebhookNotificationSink};
pub use sqlite_endpoint_store::SqliteEndpointStore;
pub use transports::{RestPushClient, RestPushV2Client, RssPullClient, TransportSet, XmlPushClient};
