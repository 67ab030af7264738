//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.

mod fixtures;
mod sender;

pub use fixtures::{StalledEventStore, TestCalendar};
pub use sender::{RecordingSender, SentMessage};

use std::time::{Duration, Instant};

/// Poll `condition` every 10ms, failing the test after `timeout`.
#[allow(dead_code)]
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) {
    let started = Instant::now();
    while !condition() {
        assert!(
            started.elapsed() < timeout,
            "condition not met within {:?}",
            timeout
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
