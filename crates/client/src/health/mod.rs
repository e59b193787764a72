//! Upstream liveness monitor.
//!
//! A single background task ticks on a fixed interval. Each tick makes up to
//! `retry_times` probe attempts and stops at the first success; the tick is
//! healthy if any attempt succeeded. The result is published through an
//! atomic flag that request handlers read without blocking.
//!
//! The flag starts unhealthy, so requests are served from the cache until
//! the first successful probe.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use liteproxy_core::config::HealthConfig;

use crate::upstream::UpstreamClient;

/// Non-blocking view of upstream liveness.
pub trait HealthCheck: Send + Sync {
    fn check(&self) -> bool;
}

/// One liveness probe attempt.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self) -> bool;
}

/// Probes the upstream's liveness endpoint; any 2xx is success.
pub struct UpstreamProber {
    client: UpstreamClient,
    path: String,
    timeout: Duration,
}

impl UpstreamProber {
    pub fn new(client: UpstreamClient, config: &HealthConfig) -> Self {
        Self { client, path: config.path.clone(), timeout: config.timeout() }
    }
}

#[async_trait]
impl Prober for UpstreamProber {
    async fn probe(&self) -> bool {
        match self.client.probe(&self.path, self.timeout).await {
            Ok(status) => status.is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "health probe failed");
                false
            }
        }
    }
}

pub struct HealthMonitor {
    healthy: AtomicBool,
    prober: Arc<dyn Prober>,
    interval: Duration,
    retry_times: u32,
}

impl HealthMonitor {
    pub fn new(prober: Arc<dyn Prober>, config: &HealthConfig) -> Self {
        Self {
            healthy: AtomicBool::new(false),
            prober,
            interval: config.interval(),
            retry_times: config.retry_times.max(1),
        }
    }

    /// One tick: healthy if any of up to `retry_times` attempts succeeds.
    pub async fn probe_round(&self) -> bool {
        for attempt in 1..=self.retry_times {
            if self.prober.probe().await {
                return true;
            }
            tracing::debug!(attempt, retry_times = self.retry_times, "health probe attempt failed");
        }
        false
    }

    /// Run one tick and publish the result.
    pub async fn tick(&self) -> bool {
        let healthy = self.probe_round().await;
        let previous = self.healthy.swap(healthy, Ordering::SeqCst);
        if previous != healthy {
            if healthy {
                tracing::info!("upstream is healthy, forwarding requests");
            } else {
                tracing::warn!("upstream is unhealthy, serving from cache");
            }
        }
        healthy
    }

    /// Tick forever. The first tick runs immediately.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run())
    }
}

impl HealthCheck for HealthMonitor {
    fn check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use liteproxy_core::AppConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Replays scripted results, then repeats the last one.
    struct ScriptedProber {
        results: Mutex<VecDeque<bool>>,
        calls: AtomicUsize,
    }

    impl ScriptedProber {
        fn new(results: &[bool]) -> Arc<Self> {
            Arc::new(Self { results: Mutex::new(results.iter().copied().collect()), calls: AtomicUsize::new(0) })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Prober for ScriptedProber {
        async fn probe(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut results = self.results.lock().unwrap();
            if results.len() > 1 { results.pop_front().unwrap() } else { results.front().copied().unwrap_or(false) }
        }
    }

    fn config(retry_times: u32) -> HealthConfig {
        HealthConfig { interval_ms: 1000, retry_times, ..Default::default() }
    }

    #[tokio::test]
    async fn test_initially_unhealthy() {
        let monitor = HealthMonitor::new(ScriptedProber::new(&[true]), &config(3));
        assert!(!monitor.check());
    }

    #[tokio::test]
    async fn test_all_attempts_fail() {
        let prober = ScriptedProber::new(&[false]);
        let monitor = HealthMonitor::new(prober.clone(), &config(3));

        assert!(!monitor.tick().await);
        assert!(!monitor.check());
        assert_eq!(prober.calls(), 3);
    }

    #[tokio::test]
    async fn test_any_success_in_round_is_healthy() {
        let prober = ScriptedProber::new(&[false, false, true]);
        let monitor = HealthMonitor::new(prober.clone(), &config(3));

        assert!(monitor.tick().await);
        assert!(monitor.check());
        assert_eq!(prober.calls(), 3);
    }

    #[tokio::test]
    async fn test_round_stops_at_first_success() {
        let prober = ScriptedProber::new(&[true]);
        let monitor = HealthMonitor::new(prober.clone(), &config(5));

        assert!(monitor.probe_round().await);
        assert_eq!(prober.calls(), 1);
    }

    #[tokio::test]
    async fn test_transitions_between_ticks() {
        let prober = ScriptedProber::new(&[true, false, false, true]);
        let monitor = HealthMonitor::new(prober, &config(2));

        assert!(monitor.tick().await);
        assert!(!monitor.tick().await);
        assert!(!monitor.check());
        assert!(monitor.tick().await);
        assert!(monitor.check());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_ticks_on_interval() {
        let prober = ScriptedProber::new(&[true, false]);
        let monitor = Arc::new(HealthMonitor::new(prober.clone(), &config(1)));
        let handle = monitor.spawn();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(monitor.check());
        assert_eq!(prober.calls(), 1);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(!monitor.check());
        assert_eq!(prober.calls(), 2);

        handle.abort();
    }

    #[tokio::test]
    async fn test_upstream_prober() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/healthz"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/livez"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(&AppConfig { remote_url: server.uri(), ..Default::default() }).unwrap();

        let healthy = UpstreamProber::new(client.clone(), &HealthConfig::default());
        assert!(healthy.probe().await);

        let failing = UpstreamProber::new(client, &HealthConfig { path: "/livez".into(), ..Default::default() });
        assert!(!failing.probe().await);
    }
}
