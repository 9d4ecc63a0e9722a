//! Blocking query execution.
//!
//! See <https://developer.hashicorp.com/consul/api-docs/features/blocking>.

use bytes::Bytes;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::max_wait_time;
use super::DiscoveryClient;
use crate::BlockingConfig;
use crate::NetworkError;
use crate::Result;

/// Outcome of comparing the local index with `X-Consul-Index`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexTransition {
    /// Adopt the reported index
    Fresh(u64),
    /// Reported index was 0; the registry was restarted or compacted
    ResetToOne,
    /// Reported index went backwards; force a non-blocking refresh
    ResetToZero,
    /// Header missing or malformed; keep the current index
    Unchanged,
}

impl IndexTransition {
    pub fn resolve(
        current: u64,
        header: Option<&str>,
    ) -> Self {
        match header.map(str::parse::<u64>) {
            Some(Ok(reported)) => Self::from_reported(current, reported),
            _ => IndexTransition::Unchanged,
        }
    }

    pub fn from_reported(
        current: u64,
        reported: u64,
    ) -> Self {
        if reported < 1 {
            IndexTransition::ResetToOne
        } else if current > reported {
            IndexTransition::ResetToZero
        } else {
            IndexTransition::Fresh(reported)
        }
    }

    pub fn next_index(
        self,
        current: u64,
    ) -> u64 {
        match self {
            IndexTransition::Fresh(index) => index,
            IndexTransition::ResetToOne => 1,
            IndexTransition::ResetToZero => 0,
            IndexTransition::Unchanged => current,
        }
    }
}

/// Performs one blocking request and returns the body with the next index.
///
/// Errors are wrapped with the attempted path and not retried here.
pub async fn get_blocking_api_response(
    client: &dyn DiscoveryClient,
    path: &str,
    index: u64,
    blocking: &BlockingConfig,
) -> Result<(Bytes, u64)> {
    let wait = max_wait_time(blocking.read_timeout(), blocking.wait_time_override());
    let separator = if path.contains('?') { '&' } else { '?' };
    let path = format!("{path}{separator}index={index}&wait={}s", wait.as_secs());

    let response = match client.get_blocking_api_response(&path).await {
        Ok(r) => r,
        Err(e) => {
            return Err(NetworkError::BlockingQuery {
                path,
                source: Box::new(e),
            }
            .into())
        }
    };

    let transition = IndexTransition::resolve(index, response.index.as_deref());
    match transition {
        IndexTransition::Unchanged => match &response.index {
            None => warn!(%path, "cannot find X-Consul-Index header in response"),
            Some(raw) => warn!(%path, header = %raw, "cannot parse X-Consul-Index header"),
        },
        IndexTransition::ResetToOne | IndexTransition::ResetToZero => {
            debug!(%path, index, reported = ?response.index, ?transition, "consul index reset")
        }
        IndexTransition::Fresh(_) => trace!(%path, ?transition, "consul index advanced"),
    }

    Ok((response.body, transition.next_index(index)))
}
