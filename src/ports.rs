use anyhow::{bail, Context, Result};

/// Parse a port spec into an inclusive `(start, end)` pair.
///
/// Accepted forms:
/// - single port: `80`
/// - inclusive range: `20-85`
///
/// Surrounding whitespace is ignored. Ports must be in `1..=65535` and the
/// range must not be reversed.
pub fn parse_port_range(s: &str) -> Result<(u16, u16)> {
    let spec = s.trim();
    if spec.is_empty() {
        bail!("empty port spec");
    }

    if let Some((a, b)) = spec.split_once('-') {
        let start = parse_port_str(a.trim())
            .with_context(|| format!("invalid start in range: {a}"))?;
        let end = parse_port_str(b.trim())
            .with_context(|| format!("invalid end in range: {b}"))?;
        if start > end {
            bail!("invalid range {start}-{end} (start > end)");
        }
        return Ok((start, end));
    }

    let p = parse_port_str(spec).with_context(|| format!("invalid port value: {spec}"))?;
    Ok((p, p))
}

fn parse_port_str(s: &str) -> Result<u16> {
    let val: u32 = s.parse::<u32>().map_err(|e| anyhow::anyhow!(e))?;
    if val == 0 || val > 65535 {
        bail!("port out of range: {val}");
    }
    Ok(val as u16)
}
