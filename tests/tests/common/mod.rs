// Common fixtures and utilities for integration tests

pub mod net;

pub use net::*;

use carta_store::OfflineRegionDefinition;

/// Small rectangular region around the origin, enough for region tests.
pub fn region_definition() -> OfflineRegionDefinition {
    OfflineRegionDefinition {
        style_url: "carta://styles/streets".to_string(),
        min_lon: -0.5,
        min_lat: -0.5,
        max_lon: 0.5,
        max_lat: 0.5,
        min_zoom: 0.0,
        max_zoom: 4.0,
        pixel_ratio: 1.0,
    }
}

/// Install a test subscriber once; repeated calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
