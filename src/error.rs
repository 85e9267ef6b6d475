use thiserror::Error;

/// Errors that abort a scan before any probe is spawned.
///
/// Closed ports, failed lookups and an expired deadline are not errors; they
/// shape the result instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("target must not be empty")]
    EmptyTarget,

    #[error("invalid port range {start}-{end}: expected 1 <= start <= end <= 65535")]
    InvalidRange { start: u32, end: u32 },
}
