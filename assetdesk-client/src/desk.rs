//! The wired-up client: one REST connection, one view cache, one request
//! policy, shared by every component.

use crate::api_client::RestClient;
use crate::cache::{Freshness, ViewCache};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::inventory::Inventory;
use crate::lifecycle::{RelationLifecycle, RelationViews};
use crate::list_query::EntityListQuery;
use crate::policy::RequestPolicy;
use crate::tickets::TicketDesk;
use assetdesk_core::Principal;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AssetDesk {
    rest: Arc<RestClient>,
    cache: Arc<ViewCache>,
    policy: RequestPolicy,
    principal: Principal,
    max_staleness: Duration,
}

impl AssetDesk {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let rest = RestClient::new(config)?;
        Ok(Self {
            rest: Arc::new(rest),
            cache: Arc::new(ViewCache::with_limits(config.cache_limits())),
            policy: RequestPolicy::from_config(config),
            principal: config.principal(),
            max_staleness: config.max_staleness(),
        })
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    pub fn cache(&self) -> &Arc<ViewCache> {
        &self.cache
    }

    pub fn policy(&self) -> &RequestPolicy {
        &self.policy
    }

    /// The configured user that writes are recorded as.
    pub fn principal(&self) -> Principal {
        self.principal
    }

    /// Reads that tolerate the configured staleness bound.
    pub fn best_effort(&self) -> Freshness {
        Freshness::best_effort(self.max_staleness)
    }

    pub fn lists(&self) -> EntityListQuery<RestClient> {
        EntityListQuery::new(self.rest.clone(), self.cache.clone(), self.policy.clone())
    }

    pub fn relations(&self) -> RelationLifecycle<RestClient> {
        RelationLifecycle::new(self.rest.clone(), self.cache.clone(), self.policy.clone())
    }

    pub fn relation_views(&self) -> RelationViews<RestClient> {
        RelationViews::new(self.rest.clone(), self.cache.clone(), self.policy.clone())
    }

    pub fn tickets(&self) -> TicketDesk<RestClient> {
        TicketDesk::new(self.rest.clone(), self.cache.clone(), self.policy.clone())
    }

    pub fn inventory(&self) -> Inventory<RestClient> {
        Inventory::new(self.rest.clone(), self.cache.clone(), self.policy.clone())
    }
}
