//! Start/stop lifecycle and endpoint discovery.

mod common;

use common::{fixture_with, test_config};
use std::time::Duration;

fn slow_config() -> gridstore_shepherd::ShepherdConfig {
    let mut config = test_config();
    config.check_period_ms = 60_000;
    config
}

#[tokio::test(start_paused = true)]
async fn start_and_stop_terminate_every_loop() {
    let f = fixture_with(slow_config()).await;
    let handle = f.shepherd.start();

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(f.shepherd.is_running());

    handle.stop().await;
    assert!(!f.shepherd.is_running());
}

#[tokio::test(start_paused = true)]
async fn discovery_resolves_catalog_endpoints() {
    let mut config = slow_config();
    config.librarian_urls = Vec::new();
    config.bartender_urls = Vec::new();
    config.directory_urls = vec!["http://directory.test".to_string()];
    let f = fixture_with(config).await;

    *f.directory.librarian_urls.lock() = vec!["http://librarian.resolved".to_string()];
    *f.directory.bartender_urls.lock() = vec!["http://bartender.resolved".to_string()];

    let handle = f.shepherd.start();

    let mut resolved = false;
    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if !f.shepherd.librarian().urls().is_empty() && !f.shepherd.bartender().urls().is_empty() {
            resolved = true;
            break;
        }
    }
    assert!(resolved, "discovery never installed the resolved endpoints");
    assert_eq!(
        f.shepherd.librarian().urls(),
        vec!["http://librarian.resolved"]
    );
    assert_eq!(
        f.shepherd.bartender().urls(),
        vec!["http://bartender.resolved"]
    );

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn static_endpoints_skip_discovery() {
    let mut config = slow_config();
    config.directory_urls = vec!["http://directory.test".to_string()];
    let f = fixture_with(config).await;

    // Directory answers exist, but both roles are statically configured, so
    // no discovery loop may start and nothing may overwrite them.
    *f.directory.librarian_urls.lock() = vec!["http://librarian.other".to_string()];
    let handle = f.shepherd.start();

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(f.shepherd.librarian().urls(), vec!["http://librarian.test"]);

    handle.stop().await;
}
