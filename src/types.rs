use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// A request to scan an inclusive, contiguous port range on one host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    /// Hostname or IP literal.
    pub target: String,
    pub start: u32,
    pub end: u32,
}

impl ScanRequest {
    pub fn new(target: impl Into<String>, start: u32, end: u32) -> Self {
        Self {
            target: target.into(),
            start,
            end,
        }
    }

    /// Check the request and return the port range it covers.
    ///
    /// Reversed, zero-based or out-of-range bounds are rejected rather than
    /// clamped, so a bad request never turns into a silent empty scan.
    pub fn validate(&self) -> Result<RangeInclusive<u16>, ScanError> {
        if self.target.trim().is_empty() {
            return Err(ScanError::EmptyTarget);
        }
        let invalid = ScanError::InvalidRange {
            start: self.start,
            end: self.end,
        };
        if self.start == 0 || self.start > self.end {
            return Err(invalid);
        }
        let start = u16::try_from(self.start).map_err(|_| invalid.clone())?;
        let end = u16::try_from(self.end).map_err(|_| invalid)?;
        Ok(start..=end)
    }
}

/// One open port discovered by a probe.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortDetail {
    pub port: u16,
    /// Well-known service label, empty when the port is not in the table.
    pub service: String,
    pub response_ms: u64,
    /// First bytes sent by the service, decoded lossily. Empty if it stayed quiet.
    pub banner: String,
}

/// Geolocation record as returned by ip-api.com. Opaque to the scan engine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GeoIpInfo {
    pub query: String,
    pub country: String,
    #[serde(rename = "regionName")]
    pub region_name: String,
    pub city: String,
    pub isp: String,
    pub org: String,
    pub lat: f64,
    pub lon: f64,
}

/// How a scan ended.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    /// Every probe finished before the deadline.
    #[default]
    Completed,
    /// The overall deadline fired first; `ports` holds the probes that made it.
    TimedOut,
    /// The caller cancelled the scan; `ports` holds the probes that made it.
    Cancelled,
}

/// Aggregate result of one scan. `ports` is in probe completion order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ScanResult {
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geoip: Option<GeoIpInfo>,
    pub ports: Vec<PortDetail>,
    pub scanned_at: String,
    pub elapsed_ms: u64,
    pub outcome: ScanOutcome,
}

impl ScanResult {
    pub fn with_geoip(mut self, geoip: Option<GeoIpInfo>) -> Self {
        self.geoip = geoip;
        self
    }

    /// Reorder ports by number for callers that want deterministic output.
    pub fn sort_by_port(&mut self) {
        self.ports.sort_by_key(|p| p.port);
    }

    pub fn is_partial(&self) -> bool {
        self.outcome != ScanOutcome::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_full_range() {
        let req = ScanRequest::new("127.0.0.1", 1, 65535);
        assert_eq!(req.validate().unwrap(), 1..=65535);
    }

    #[test]
    fn validate_accepts_single_port() {
        let req = ScanRequest::new("example.org", 80, 80);
        assert_eq!(req.validate().unwrap(), 80..=80);
    }

    #[test]
    fn validate_rejects_reversed_range() {
        let req = ScanRequest::new("127.0.0.1", 100, 20);
        assert_eq!(
            req.validate(),
            Err(ScanError::InvalidRange { start: 100, end: 20 })
        );
    }

    #[test]
    fn validate_rejects_port_zero_and_overflow() {
        assert!(ScanRequest::new("127.0.0.1", 0, 10).validate().is_err());
        assert!(ScanRequest::new("127.0.0.1", 10, 65536).validate().is_err());
        assert!(ScanRequest::new("127.0.0.1", 70000, 70001).validate().is_err());
    }

    #[test]
    fn validate_rejects_blank_target() {
        let req = ScanRequest::new("   ", 1, 10);
        assert_eq!(req.validate(), Err(ScanError::EmptyTarget));
    }

    #[test]
    fn geoip_uses_ip_api_field_names() {
        let raw = r#"{"query":"8.8.8.8","country":"United States","regionName":"Virginia",
            "city":"Ashburn","isp":"Google LLC","org":"Google Public DNS","lat":39.03,"lon":-77.5}"#;
        let info: GeoIpInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(info.region_name, "Virginia");
        let back = serde_json::to_value(&info).unwrap();
        assert_eq!(back["regionName"], "Virginia");
    }

    #[test]
    fn result_omits_missing_geoip() {
        let res = ScanResult {
            target: "127.0.0.1".into(),
            ..Default::default()
        };
        let v = serde_json::to_value(&res).unwrap();
        assert!(v.get("geoip").is_none());
        assert_eq!(v["outcome"], "completed");
        assert!(v["ports"].as_array().unwrap().is_empty());
    }

    #[test]
    fn sort_by_port_orders_ascending() {
        let detail = |port| PortDetail {
            port,
            service: String::new(),
            response_ms: 0,
            banner: String::new(),
        };
        let mut res = ScanResult {
            ports: vec![detail(443), detail(22), detail(80)],
            ..Default::default()
        };
        res.sort_by_port();
        let order: Vec<u16> = res.ports.iter().map(|p| p.port).collect();
        assert_eq!(order, vec![22, 80, 443]);
    }
}
