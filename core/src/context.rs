use crate::config::{self, Config};
use crate::links::PeerLinks;
use crate::metrics::Metrics;
use crate::places::PlacesClient;
use crate::store::LocationStore;
use std::sync::Arc;

/// Runtime container for one herd member: its config view, location
/// store, neighbor links, places client, and metrics.
#[derive(Debug)]
pub struct Context {
    pub member: config::MemberView,
    pub store: LocationStore,
    pub links: PeerLinks,
    pub places: PlacesClient,
    pub metrics: Metrics,
}

impl Context {
    pub fn new(config: &Config, name: &str) -> Result<Arc<Self>, config::Error> {
        let member = config.member(name)?;
        let links = PeerLinks::new(&member.neighbors, member.peer_queue_bound);
        let places = PlacesClient::new(member.places_endpoint.clone(), member.api_key.clone());
        Ok(Arc::new(Self { member, store: LocationStore::new(), links, places, metrics: Metrics::new() }))
    }
}
