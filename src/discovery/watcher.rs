//! Long-running Consul watcher.
//!
//! One task per [`ConsulWatcher`]. Each cycle issues a blocking query on
//! `/v1/catalog/services`, then refreshes `/v1/health/service/<name>` for
//! every watched service. Requests are strictly sequential.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::get_blocking_api_response;
use super::parse_service_names;
use super::parse_service_nodes;
use super::DiscoveryClient;
use super::ServiceNode;
use crate::constants::CATALOG_SERVICES_PATH;
use crate::constants::HEALTH_SERVICE_PATH_PREFIX;
use crate::Backoff;
use crate::BackoffPolicy;
use crate::BlockingConfig;
use crate::DiscoverySettings;
use crate::Result;
use crate::SdConfig;

type ServiceNodes = Arc<RwLock<HashMap<String, Vec<ServiceNode>>>>;

pub struct ConsulWatcher {
    api_server: String,
    services: ServiceNodes,
    shutdown_tx: watch::Sender<()>,
}

impl ConsulWatcher {
    /// Spawns the poll loop. Must be called within a tokio runtime.
    pub fn start(
        client: Arc<dyn DiscoveryClient>,
        sdc: &SdConfig,
        datacenter: &str,
        settings: &DiscoverySettings,
    ) -> Self {
        let api_server = client.api_server();
        let ctx = WatchContext::new(client, sdc, datacenter, settings);
        let services: ServiceNodes = Arc::new(RwLock::new(HashMap::new()));
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        info!(%api_server, datacenter, "started Consul service watcher");
        tokio::spawn(watch_for_services_updates(ctx, services.clone(), shutdown_rx));

        Self {
            api_server,
            services,
            shutdown_tx,
        }
    }

    /// Signals the poll loop to exit. Returns immediately; an in-flight
    /// request is abandoned and no new request is issued.
    pub fn stop(&self) {
        if self.shutdown_tx.send(()).is_ok() {
            info!(api_server = %self.api_server, "stopping Consul service watcher");
        }
    }

    /// `false` once the poll loop has exited
    pub fn is_running(&self) -> bool {
        !self.shutdown_tx.is_closed()
    }

    pub fn service_nodes_snapshot(&self) -> HashMap<String, Vec<ServiceNode>> {
        self.services.read().clone()
    }
}

pub(crate) struct WatchContext {
    client: Arc<dyn DiscoveryClient>,
    blocking: BlockingConfig,
    retry: BackoffPolicy,
    service_names_query_args: String,
    service_nodes_query_args: String,
    watch_services: Vec<String>,
    watch_tags: Vec<String>,
}

impl WatchContext {
    pub(crate) fn new(
        client: Arc<dyn DiscoveryClient>,
        sdc: &SdConfig,
        datacenter: &str,
        settings: &DiscoverySettings,
    ) -> Self {
        let (service_names_query_args, service_nodes_query_args) = build_query_args(sdc, datacenter);
        Self {
            client,
            blocking: settings.blocking.clone(),
            retry: settings.retry,
            service_names_query_args,
            service_nodes_query_args,
            watch_services: sdc.services.clone(),
            watch_tags: sdc.tags.clone(),
        }
    }

    /// One watch cycle; returns the index for the next blocking query
    pub(crate) async fn poll_once(
        &self,
        index: u64,
        services: &ServiceNodes,
    ) -> Result<u64> {
        let path = format!("{CATALOG_SERVICES_PATH}{}", self.service_names_query_args);
        let (data, next_index) =
            get_blocking_api_response(self.client.as_ref(), &path, index, &self.blocking).await?;
        let names = self.filter_service_names(parse_service_names(&data)?);

        let mut fresh = HashMap::with_capacity(names.len());
        for name in names {
            match self.get_service_nodes(&name).await {
                Ok(nodes) => {
                    fresh.insert(name, nodes);
                }
                Err(e) => {
                    warn!(service = %name, error = ?e, "cannot refresh service nodes; keeping previous ones");
                    if let Some(previous) = services.read().get(&name) {
                        fresh.insert(name, previous.clone());
                    }
                }
            }
        }

        *services.write() = fresh;
        Ok(next_index)
    }

    async fn get_service_nodes(
        &self,
        name: &str,
    ) -> Result<Vec<ServiceNode>> {
        let path = format!(
            "{HEALTH_SERVICE_PATH_PREFIX}{}{}",
            urlencoding::encode(name),
            self.service_nodes_query_args
        );
        let data = self.client.get_api_response(&path).await?;
        parse_service_nodes(&data)
    }

    /// Keeps names selected by `services` (empty = all) carrying every
    /// required tag, sorted for a stable request order.
    pub(crate) fn filter_service_names(
        &self,
        catalog: HashMap<String, Vec<String>>,
    ) -> Vec<String> {
        let mut names: Vec<String> = catalog
            .into_iter()
            .filter(|(name, _)| self.watch_services.is_empty() || self.watch_services.contains(name))
            .filter(|(_, tags)| self.watch_tags.iter().all(|t| tags.contains(t)))
            .map(|(name, _)| name)
            .collect();
        names.sort();
        names
    }
}

/// Query strings for the catalog and health endpoints
pub(crate) fn build_query_args(
    sdc: &SdConfig,
    datacenter: &str,
) -> (String, String) {
    let mut base = format!("?dc={}", urlencoding::encode(datacenter));
    if sdc.allow_stale {
        base.push_str("&stale");
    }
    for (k, v) in &sdc.node_meta {
        base.push_str("&node-meta=");
        base.push_str(&urlencoding::encode(&format!("{k}:{v}")));
    }

    let mut nodes = base.clone();
    for tag in &sdc.tags {
        nodes.push_str("&tag=");
        nodes.push_str(&urlencoding::encode(tag));
    }
    (base, nodes)
}

async fn watch_for_services_updates(
    ctx: WatchContext,
    services: ServiceNodes,
    mut shutdown: watch::Receiver<()>,
) {
    let mut index = 0u64;
    let mut backoff = Backoff::new(ctx.retry);

    loop {
        let result = tokio::select! {
            _ = shutdown.changed() => break,
            r = ctx.poll_once(index, &services) => r,
        };

        let pause = match result {
            Ok(next) => {
                // A missing index header keeps us on non-blocking queries
                let repeat_non_blocking = index == 0 && next == 0;
                index = next;
                if repeat_non_blocking {
                    Some(backoff.next_delay())
                } else {
                    backoff.reset();
                    None
                }
            }
            Err(e) => {
                let delay = backoff.next_delay();
                warn!(error = ?e, ?delay, "consul watcher poll failed");
                Some(delay)
            }
        };

        if let Some(delay) = pause {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sleep(delay) => {}
            }
        }
    }

    debug!("consul watcher loop exited");
}
