//! Builds the SSH connector and the NetBox store from configuration

use std::sync::Arc;
use std::time::Duration;

use eyre::{Result, WrapErr};

use nbsync_exec::{Connector, SshConnector};
use nbsync_netbox::{InventoryStore, NetboxClient};

use crate::config::{NetboxConfig, SyncSection};

/// SSH connector with the configured timeouts
pub fn connector(sync: &SyncSection) -> Arc<dyn Connector> {
    Arc::new(
        SshConnector::new()
            .with_connect_timeout(Duration::from_secs(sync.connect_timeout_secs))
            .with_command_timeout(Duration::from_secs(sync.command_timeout_secs)),
    )
}

/// NetBox client authenticated with the configured token
///
/// # Errors
/// Returns error if the token is unavailable or the URL is invalid
pub fn store(netbox: &NetboxConfig) -> Result<Arc<dyn InventoryStore>> {
    let token = netbox.token()?;
    let client = NetboxClient::new(&netbox.url, &token, netbox.timeout())
        .wrap_err_with(|| format!("cannot create NetBox client for {}", netbox.url))?;
    tracing::debug!(url = %netbox.url, "NetBox client ready");
    Ok(Arc::new(client))
}
