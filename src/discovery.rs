//! Device discovery.
//!
//! Repeated scan-with-timeout over a [`Scanner`], filtered by the configured
//! allow-list or name filter.

use std::collections::HashSet;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::DiscoveryConfig;
use crate::error::{AppResult, QaError};
use crate::hardware::{Advertisement, Scanner};

/// Whether an advertisement is a unit under test.
///
/// A non-empty allow-list takes precedence over the name filter.
pub fn matches(ad: &Advertisement, config: &DiscoveryConfig) -> bool {
    if config.addresses.is_empty() {
        ad.name.contains(&config.name_filter)
    } else {
        config
            .addresses
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&ad.address))
    }
}

/// Scan until at least `min_devices` units are found.
///
/// Results accumulate across attempts, keyed by lower-cased address, in the
/// order first seen, and are capped at `max_devices`.
pub async fn discover(
    scanner: &dyn Scanner,
    config: &DiscoveryConfig,
) -> AppResult<Vec<Advertisement>> {
    let mut seen = HashSet::new();
    let mut found: Vec<Advertisement> = Vec::new();
    let mut attempts = 0;

    while attempts < config.max_scan_attempts {
        if attempts > 0 {
            sleep(config.rescan_delay).await;
        }
        attempts += 1;
        info!(attempt = attempts, of = config.max_scan_attempts, "Scanning");

        let ads = scanner
            .scan_for(config.scan_duration)
            .await
            .map_err(|e| QaError::Discovery(format!("{e:#}")))?;

        for ad in ads {
            if found.len() >= config.max_devices {
                break;
            }
            if matches(&ad, config) && seen.insert(ad.address.to_lowercase()) {
                info!(device = %ad.address, name = %ad.name, "Found device");
                found.push(ad);
            }
        }

        if found.len() >= config.min_devices {
            info!(found = found.len(), attempts, "Discovery complete");
            return Ok(found);
        }
        warn!(
            found = found.len(),
            required = config.min_devices,
            "Not enough devices yet"
        );
    }

    Err(QaError::InsufficientDevices {
        found: found.len(),
        required: config.min_devices,
        attempts,
    })
}
