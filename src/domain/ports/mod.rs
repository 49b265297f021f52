mod clock;
mod content_source;
mod endpoint_registry;
mod job_store;
mod notification_sink;
mod transport_client;

pub use clock::{Clock, ManualClock, SystemClock};
pub use content_source::{ContentPublisher, ContentSink, ContentSource, IngestReport};
pub use endpoint_registry::EndpointRegistry;
pub use job_store::{JobCounts, JobQuery, JobStore, NewJob};
pub use notification_sink::{Notification, NotificationKind, NotificationSink};
pub use transport_client::{PullOutcome, TransportClient, TransportLookup};
