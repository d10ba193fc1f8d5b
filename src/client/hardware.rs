//! Hardware identity and inventory for heartbeat payloads.
//!
//! The machine fingerprint must be stable across reboots and distinct across
//! machines: it is the SHA-256 of the OS machine id (with the hostname as a
//! fallback source), hex-encoded.

use std::fs;

use sha2::{Digest, Sha256};

use crate::errors::{WardenError, WardenResult};

/// Stable machine fingerprint: hex SHA-256 of the best available machine
/// identity source.
pub fn machine_fingerprint() -> WardenResult<String> {
    let identity = machine_identity_source()?;

    let mut hasher = Sha256::new();
    hasher.update(identity.trim().as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Raw identity material, tried in order of stability.
fn machine_identity_source() -> WardenResult<String> {
    if let Ok(id) = fs::read_to_string("/etc/machine-id") {
        if !id.trim().is_empty() {
            return Ok(id);
        }
    }

    if let Ok(hostname) = fs::read_to_string("/etc/hostname") {
        if !hostname.trim().is_empty() {
            return Ok(hostname);
        }
    }

    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| {
            WardenError::ServerError("no machine identity source available".to_string())
        })
}

/// Machine hostname for display, best effort.
pub fn machine_name() -> String {
    fs::read_to_string("/etc/hostname")
        .ok()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Total system RAM in whole gigabytes, rounded down; 0 when undeterminable.
pub fn total_ram_gb() -> i64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(meminfo) = fs::read_to_string("/proc/meminfo") {
            for line in meminfo.lines() {
                if let Some(rest) = line.strip_prefix("MemTotal:") {
                    let kb: i64 = rest
                        .trim()
                        .trim_end_matches("kB")
                        .trim()
                        .parse()
                        .unwrap_or(0);
                    return kb / (1024 * 1024);
                }
            }
        }
        0
    }

    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}

/// Logical CPU core count; 0 when undeterminable.
pub fn cpu_cores() -> i64 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i64)
        .unwrap_or(0)
}
