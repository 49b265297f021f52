//! Transport Clients
//!
//! One client per `TransportType`, bound at construction time.

mod http;
mod rest_push;
mod rss_pull;
mod xml;
mod xml_push;

pub use http::build_client;
pub use rest_push::{RestPushClient, RestPushV2Client};
pub use rss_pull::{parse_feed, RssPullClient};
pub use xml_push::{method_call, parse_response, XmlPushClient, XmlRpcResponse, XmlRpcValue};

use crate::domain::ports::{TransportClient, TransportLookup};
use crate::domain::value_objects::TransportType;
use std::sync::Arc;

/// The closed set of transport clients, one per transport type.
#[derive(Clone)]
pub struct TransportSet {
    xml_push: Arc<dyn TransportClient>,
    rest_push: Arc<dyn TransportClient>,
    rest_push_v2: Arc<dyn TransportClient>,
    rss_pull: Arc<dyn TransportClient>,
}

impl TransportSet {
    /// The standard clients sharing one HTTP client.
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            xml_push: Arc::new(XmlPushClient::new(http.clone())),
            rest_push: Arc::new(RestPushClient::new(http.clone())),
            rest_push_v2: Arc::new(RestPushV2Client::new(http.clone())),
            rss_pull: Arc::new(RssPullClient::new(http)),
        }
    }

    /// Replace the client bound to `transport_type`.
    pub fn with(mut self, transport_type: TransportType, client: Arc<dyn TransportClient>) -> Self {
        match transport_type {
            TransportType::XmlPush => self.xml_push = client,
            TransportType::RestPush => self.rest_push = client,
            TransportType::RestPushV2 => self.rest_push_v2 = client,
            TransportType::RssPull => self.rss_pull = client,
        }
        self
    }
}

impl TransportLookup for TransportSet {
    fn client(&self, transport_type: TransportType) -> Arc<dyn TransportClient> {
        match transport_type {
            TransportType::XmlPush => self.xml_push.clone(),
            TransportType::RestPush => self.rest_push.clone(),
            TransportType::RestPushV2 => self.rest_push_v2.clone(),
            TransportType::RssPull => self.rss_pull.clone(),
        }
    }
}
