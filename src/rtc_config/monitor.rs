//! Periodic re-resolution of the RTC configuration (§4.6).
//!
//! HMAC and REST sources drift (credentials expire); this task re-runs the
//! priority chain on an interval and republishes into the shared cache.
//! Existing WebRTC sessions keep whatever ICE servers they already
//! negotiated with; only sessions started after a refresh see the change.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::resolver::get_rtc_configuration;
use super::RtcConfigCache;
use crate::config::RtcSettingsConfig;

/// Runs until `cancel` fires, calling `get_rtc_configuration` every
/// `cfg.monitor_interval_secs` seconds and publishing the result.
pub async fn run(cfg: RtcSettingsConfig, cache: RtcConfigCache, cancel: CancellationToken, now_fn: impl Fn() -> i64) {
    let interval = Duration::from_secs(cfg.monitor_interval_secs.max(1));
    info!(interval_secs = cfg.monitor_interval_secs, "rtc config monitor started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("rtc config monitor stopped");
                return;
            }
            _ = tokio::time::sleep(interval) => {
                let config = get_rtc_configuration(&cfg, now_fn()).await;
                debug!(
                    stun_count = config.stun_uris.len(),
                    turn_count = config.turn_uris.len(),
                    "rtc config refreshed"
                );
                cache.set(config);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtc_config::RtcConfig;

    #[tokio::test]
    async fn stops_promptly_on_cancellation() {
        let cfg = RtcSettingsConfig {
            monitor_interval_secs: 3600,
            ..Default::default()
        };
        let cache = RtcConfigCache::new(RtcConfig::default());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let cancel = cancel.clone();
            let cache = cache.clone();
            async move { run(cfg, cache, cancel, || 0).await }
        });

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor did not stop promptly")
            .unwrap();
    }
}
