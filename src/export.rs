use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, Result};

use crate::types::ScanResult;

pub const CSV_HEADER: [&str; 10] = [
    "Target",
    "Country",
    "Region",
    "City",
    "ISP",
    "Organization",
    "Port",
    "Service",
    "ResponseMs",
    "Banner",
];

/// Render a result as compact JSON followed by a newline.
pub fn to_json(result: &ScanResult) -> Result<Vec<u8>> {
    let mut out = serde_json::to_vec(result)?;
    out.push(b'\n');
    Ok(out)
}

/// Render a result as CSV, one row per open port. GeoIP columns are empty
/// when the result carries no enrichment.
pub fn to_csv(result: &ScanResult) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(CSV_HEADER)?;

    let geo_cols: [&str; 5] = match &result.geoip {
        Some(g) => [
            g.country.as_str(),
            g.region_name.as_str(),
            g.city.as_str(),
            g.isp.as_str(),
            g.org.as_str(),
        ],
        None => [""; 5],
    };
    for pd in &result.ports {
        let port = pd.port.to_string();
        let response_ms = pd.response_ms.to_string();
        let mut record = Vec::with_capacity(CSV_HEADER.len());
        record.push(result.target.as_str());
        record.extend(geo_cols);
        record.extend([
            port.as_str(),
            pd.service.as_str(),
            response_ms.as_str(),
            pd.banner.as_str(),
        ]);
        wtr.write_record(&record)?;
    }

    wtr.into_inner()
        .map_err(|e| anyhow!("failed to flush CSV output: {}", e.error()))
}

/// Write the pretty-printed JSON form of `result` to `path`.
pub fn write_json_file(path: &Path, result: &ScanResult) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, result)?;
    Ok(())
}

pub fn write_csv_file(path: &Path, result: &ScanResult) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(&to_csv(result)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoIpInfo, PortDetail, ScanOutcome};

    fn sample(geoip: Option<GeoIpInfo>) -> ScanResult {
        ScanResult {
            target: "scanme.example".into(),
            geoip,
            ports: vec![
                PortDetail {
                    port: 22,
                    service: "SSH".into(),
                    response_ms: 12,
                    banner: "SSH-2.0-OpenSSH_9.6\r\n".into(),
                },
                PortDetail {
                    port: 8000,
                    service: String::new(),
                    response_ms: 3,
                    banner: "hello, \"world\"".into(),
                },
            ],
            scanned_at: "2024-05-01T10:00:00Z".into(),
            elapsed_ms: 250,
            outcome: ScanOutcome::Completed,
        }
    }

    fn rows(bytes: &[u8]) -> Vec<Vec<String>> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(bytes);
        rdr.records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn csv_without_geoip_leaves_columns_empty() {
        let out = to_csv(&sample(None)).unwrap();
        let rows = rows(&out);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], CSV_HEADER.map(String::from).to_vec());
        assert_eq!(rows[1][0], "scanme.example");
        assert!(rows[1][1..6].iter().all(String::is_empty));
        assert_eq!(rows[1][6], "22");
        assert_eq!(rows[1][7], "SSH");
        assert_eq!(rows[1][8], "12");
        assert_eq!(rows[1][9], "SSH-2.0-OpenSSH_9.6\r\n");
        assert_eq!(rows[2][9], "hello, \"world\"");
    }

    #[test]
    fn csv_with_geoip_fills_columns() {
        let geo = GeoIpInfo {
            query: "203.0.113.7".into(),
            country: "Netherlands".into(),
            region_name: "North Holland".into(),
            city: "Amsterdam".into(),
            isp: "Example ISP".into(),
            org: "Example Org".into(),
            lat: 52.37,
            lon: 4.89,
        };
        let rows = rows(&to_csv(&sample(Some(geo))).unwrap());
        assert_eq!(
            rows[1][1..6],
            ["Netherlands", "North Holland", "Amsterdam", "Example ISP", "Example Org"]
        );
    }

    #[test]
    fn csv_for_empty_result_is_header_only() {
        let res = ScanResult {
            target: "10.0.0.1".into(),
            ..Default::default()
        };
        assert_eq!(rows(&to_csv(&res).unwrap()).len(), 1);
    }

    #[test]
    fn json_round_trips_and_is_stable() {
        let res = sample(None);
        let a = to_json(&res).unwrap();
        let b = to_json(&res).unwrap();
        assert_eq!(a, b);
        let back: ScanResult = serde_json::from_slice(&a).unwrap();
        assert_eq!(back, res);
    }
}
