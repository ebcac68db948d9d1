//! NetBox REST client

use std::time::Duration;

use async_trait::async_trait;
use ipnet::Ipv4Net;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use crate::error::{Result, StoreError};
use crate::models::{
    Device, DeviceType, Interface, InterfacePatch, IpAddress, Manufacturer, NewDevice,
    NewDeviceType, NewInterface, NewIpAddress, NewPrefix, NewSite, Prefix, Role, Site, Vrf,
};
use crate::store::InventoryStore;

const SITES: &str = "api/dcim/sites/";
const MANUFACTURERS: &str = "api/dcim/manufacturers/";
const DEVICE_ROLES: &str = "api/dcim/device-roles/";
const DEVICE_TYPES: &str = "api/dcim/device-types/";
const DEVICES: &str = "api/dcim/devices/";
const INTERFACES: &str = "api/dcim/interfaces/";
const IP_ADDRESSES: &str = "api/ipam/ip-addresses/";
const PREFIXES: &str = "api/ipam/prefixes/";
const VRFS: &str = "api/ipam/vrfs/";

/// One page of a NetBox list endpoint
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    next: Option<String>,
    results: Vec<T>,
}

/// HTTP client for the NetBox REST API
#[derive(Debug, Clone)]
pub struct NetboxClient {
    client: Client,
    base_url: Url,
}

impl NetboxClient {
    /// Create a client authenticating with `token`
    ///
    /// # Errors
    /// Returns `StoreError::Config` if the URL or token is unusable.
    pub fn new(base_url: impl AsRef<str>, token: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Token {token}"))
            .map_err(|e| StoreError::Config(format!("invalid API token: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Config(format!("cannot build HTTP client: {e}")))?;

        Self::with_client(base_url, client)
    }

    /// Create a client around a preconfigured `reqwest::Client`
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid.
    pub fn with_client(base_url: impl AsRef<str>, client: Client) -> Result<Self> {
        let mut base_url = Url::parse(base_url.as_ref())?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn url_with_query(&self, path: &str, query: &[(&str, String)]) -> Result<Url> {
        let mut url = self.url(path)?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(StoreError::from_status(status.as_u16(), message))
    }

    /// GET a list endpoint, following `next` links
    async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let url = self.url_with_query(path, query)?;
        debug!(%url, "GET");

        let response = self.client.get(url).send().await?;
        let mut page: Page<T> = Self::check(response).await?.json().await?;
        let mut items = std::mem::take(&mut page.results);

        while let Some(next) = page.next.take() {
            debug!(url = %next, "GET next page");
            let response = self.client.get(&next).send().await?;
            page = Self::check(response).await?.json().await?;
            items.append(&mut page.results);
        }

        Ok(items)
    }

    /// GET a filtered list and return its first element
    async fn first<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        let url = self.url_with_query(path, query)?;
        debug!(%url, "GET");

        let response = self.client.get(url).send().await?;
        let page: Page<T> = Self::check(response).await?.json().await?;
        Ok(page.results.into_iter().next())
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &(impl Serialize + Sync),
    ) -> Result<T> {
        let url = self.url(path)?;
        debug!(%url, "POST");

        let response = self.client.post(url).json(body).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &(impl Serialize + Sync),
    ) -> Result<T> {
        let url = self.url(path)?;
        debug!(%url, "PATCH");

        let response = self.client.patch(url).json(body).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path)?;
        debug!(%url, "DELETE");

        let response = self.client.delete(url).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for NetboxClient {
    async fn get_site(&self, slug: &str) -> Result<Option<Site>> {
        self.first(SITES, &[("slug", slug.to_string())]).await
    }

    #[instrument(skip(self), fields(slug = %site.slug))]
    async fn create_site(&self, site: &NewSite) -> Result<Site> {
        self.post(SITES, site).await
    }

    async fn list_manufacturers(&self) -> Result<Vec<Manufacturer>> {
        self.list(MANUFACTURERS, &[]).await
    }

    async fn get_role(&self, name: &str) -> Result<Option<Role>> {
        self.first(DEVICE_ROLES, &[("name", name.to_string())]).await
    }

    async fn get_vrf(&self, name: &str) -> Result<Option<Vrf>> {
        self.first(VRFS, &[("name", name.to_string())]).await
    }

    async fn get_device_type(&self, model: &str) -> Result<Option<DeviceType>> {
        self.first(DEVICE_TYPES, &[("model", model.to_string())]).await
    }

    #[instrument(skip(self), fields(model = %device_type.model))]
    async fn create_device_type(&self, device_type: &NewDeviceType) -> Result<DeviceType> {
        self.post(DEVICE_TYPES, device_type).await
    }

    async fn get_device(&self, name: &str) -> Result<Option<Device>> {
        self.first(DEVICES, &[("name", name.to_string())]).await
    }

    #[instrument(skip(self), fields(name = %device.name))]
    async fn create_device(&self, device: &NewDevice) -> Result<Device> {
        self.post(DEVICES, device).await
    }

    async fn get_interface(&self, device_id: u64, name: &str) -> Result<Option<Interface>> {
        self.first(
            INTERFACES,
            &[("device_id", device_id.to_string()), ("name", name.to_string())],
        )
        .await
    }

    #[instrument(skip(self), fields(device = interface.device, name = %interface.name))]
    async fn create_interface(&self, interface: &NewInterface) -> Result<Interface> {
        self.post(INTERFACES, interface).await
    }

    #[instrument(skip(self, patch))]
    async fn update_interface(&self, id: u64, patch: &InterfacePatch) -> Result<Interface> {
        self.patch(&format!("{INTERFACES}{id}/"), patch).await
    }

    async fn list_ip_addresses(&self, interface_id: u64) -> Result<Vec<IpAddress>> {
        self.list(IP_ADDRESSES, &[("interface_id", interface_id.to_string())])
            .await
    }

    #[instrument(skip(self), fields(address = %address.address))]
    async fn create_ip_address(&self, address: &NewIpAddress) -> Result<IpAddress> {
        self.post(IP_ADDRESSES, address).await
    }

    #[instrument(skip(self))]
    async fn delete_ip_address(&self, id: u64) -> Result<()> {
        self.delete(&format!("{IP_ADDRESSES}{id}/")).await
    }

    async fn get_prefix(&self, prefix: &Ipv4Net, vrf_id: Option<u64>) -> Result<Option<Prefix>> {
        let vrf = vrf_id.map_or_else(|| "null".to_string(), |id| id.to_string());
        self.first(PREFIXES, &[("prefix", prefix.to_string()), ("vrf_id", vrf)])
            .await
    }

    #[instrument(skip(self), fields(prefix = %prefix.prefix))]
    async fn create_prefix(&self, prefix: &NewPrefix) -> Result<Prefix> {
        self.post(PREFIXES, prefix).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_keeps_sub_path() {
        let client = NetboxClient::with_client("http://nb.example/netbox", Client::new()).unwrap();
        assert_eq!(
            client.url(SITES).unwrap().as_str(),
            "http://nb.example/netbox/api/dcim/sites/"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = NetboxClient::with_client("not a url", Client::new()).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn test_token_with_newline_rejected() {
        let err = NetboxClient::new("http://nb.example", "bad\ntoken", Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }
}
