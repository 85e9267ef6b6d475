//! GeoIP enrichment for scan results.
//!
//! Lookups are best effort: any failure degrades to "no enrichment data" and
//! never fails the scan.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::types::GeoIpInfo;

pub const DEFAULT_IP_API_URL: &str = "http://ip-api.com/json";

/// Source of geolocation data for a scan target.
#[async_trait]
pub trait GeoLocator: Send + Sync {
    /// Look up `target` (hostname or IP). Returns `None` on any failure.
    async fn lookup(&self, target: &str) -> Option<GeoIpInfo>;
}

/// Locator that never returns data. Used when enrichment is switched off.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGeoLocator;

#[async_trait]
impl GeoLocator for NoGeoLocator {
    async fn lookup(&self, _target: &str) -> Option<GeoIpInfo> {
        None
    }
}

/// Response body from ip-api.com. On failure only `status` and `message` are set.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiResponse {
    status: Option<String>,
    message: Option<String>,
    #[serde(default)]
    query: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    region_name: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    isp: String,
    #[serde(default)]
    org: String,
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lon: f64,
}

/// HTTP client for ip-api.com style JSON lookups.
pub struct IpApiLocator {
    client: reqwest::Client,
    base_url: Url,
}

impl IpApiLocator {
    /// Create a client against ip-api.com with a 5-second request timeout.
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_IP_API_URL, Duration::from_secs(5))
    }

    /// Point the client at another endpoint serving the same `/{target}` JSON shape.
    pub fn with_base_url(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())
            .with_context(|| format!("invalid GeoIP base URL '{}'", base_url.as_ref()))?;
        if base_url.cannot_be_a_base() {
            bail!("GeoIP base URL '{base_url}' cannot take a path");
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build GeoIP HTTP client")?;
        Ok(Self { client, base_url })
    }

    /// Base URL with `target` appended as one percent-encoded path segment.
    fn lookup_url(&self, target: &str) -> Option<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut().ok()?.pop_if_empty().push(target);
        Some(url)
    }
}

#[async_trait]
impl GeoLocator for IpApiLocator {
    async fn lookup(&self, target: &str) -> Option<GeoIpInfo> {
        let Some(url) = self.lookup_url(target) else {
            warn!(host = target, "GeoIP URL could not be built");
            return None;
        };
        let resp = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(host = target, error = %e, "GeoIP request failed");
                return None;
            }
        };

        if !resp.status().is_success() {
            warn!(host = target, status = %resp.status(), "GeoIP lookup returned error status");
            return None;
        }

        let data: IpApiResponse = match resp.json().await {
            Ok(d) => d,
            Err(e) => {
                warn!(host = target, error = %e, "GeoIP response parse failed");
                return None;
            }
        };

        if data.status.as_deref() != Some("success") {
            warn!(
                host = target,
                status = data.status.as_deref().unwrap_or(""),
                message = data.message.as_deref().unwrap_or(""),
                "GeoIP provider could not locate target"
            );
            return None;
        }

        debug!(host = target, country = %data.country, city = %data.city, "GeoIP lookup ok");
        Some(GeoIpInfo {
            query: data.query,
            country: data.country,
            region_name: data.region_name,
            city: data.city,
            isp: data.isp,
            org: data.org,
            lat: data.lat,
            lon: data.lon,
        })
    }
}
