//! # Admission Control Flows
//!
//! The fixed-window limiter keeps its state in the shared cache, so every
//! gateway instance enforces one budget per client. These tests run two
//! limiter instances against one store the way two nodes would, and drive
//! the wired gateway over TCP to pin the HTTP surface.

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use fm_gateway::{Clock, Decision, FailurePolicy, FixedWindowLimiter, RateLimitPolicy};
    use service_runtime::{MeshConfig, MeshRuntime};
    use shared_cache::{CacheClient, MemoryStore};

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    /// Manually advanced clock shared by every limiter instance in a test.
    struct TestClock(AtomicU64);

    impl TestClock {
        fn at(start_ms: u64) -> Arc<Self> {
            Arc::new(Self(AtomicU64::new(start_ms)))
        }

        fn advance(&self, by: Duration) {
            self.0.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
        }
    }

    impl Clock for TestClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    /// Two limiter instances over one window store, as two gateway nodes
    /// would run them.
    fn limiter_pair(
        max: u32,
        window: Duration,
        clock: &Arc<TestClock>,
        failure: FailurePolicy,
    ) -> (FixedWindowLimiter, FixedWindowLimiter) {
        let cache = CacheClient::with_default_timeout(Arc::new(MemoryStore::new()));
        let policy = RateLimitPolicy { window, max };
        let make = || {
            FixedWindowLimiter::new(cache.clone(), policy)
                .with_clock(Arc::clone(clock) as Arc<dyn Clock>)
                .with_failure_policy(failure)
        };
        (make(), make())
    }

    // =========================================================================
    // SHARED STATE
    // =========================================================================

    #[tokio::test]
    async fn two_instances_share_one_budget() {
        let clock = TestClock::at(1_000_000);
        let (first, second) = limiter_pair(
            3,
            Duration::from_millis(1000),
            &clock,
            FailurePolicy::FailOpen,
        );

        assert!(first.allow("client").await.is_admit());
        assert!(second.allow("client").await.is_admit());
        assert!(first.allow("client").await.is_admit());

        // Fourth call in the window is over budget no matter which
        // instance sees it.
        match second.allow("client").await {
            Decision::Reject { retry_after } => {
                assert!(retry_after <= Duration::from_millis(1000));
            }
            Decision::Admit => panic!("budget must be shared across instances"),
        }
    }

    #[tokio::test]
    async fn a_reject_from_one_instance_expires_on_the_other() {
        let clock = TestClock::at(1_000_000);
        let (first, second) = limiter_pair(
            1,
            Duration::from_millis(500),
            &clock,
            FailurePolicy::FailOpen,
        );

        assert!(first.allow("client").await.is_admit());
        let retry_after = match second.allow("client").await {
            Decision::Reject { retry_after } => retry_after,
            Decision::Admit => panic!("second call must be rejected"),
        };

        clock.advance(retry_after);
        assert!(second.allow("client").await.is_admit());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_bursts_across_instances_stay_within_budget() {
        let clock = TestClock::at(1_000_000);
        // Closed on contention so a lost swap race can never over-admit.
        let (first, second) = limiter_pair(
            8,
            Duration::from_millis(60_000),
            &clock,
            FailurePolicy::FailClosed,
        );
        let instances = [Arc::new(first), Arc::new(second)];

        let mut tasks = Vec::new();
        for i in 0..32 {
            let limiter = Arc::clone(&instances[i % 2]);
            tasks.push(tokio::spawn(
                async move { limiter.allow("burst").await.is_admit() },
            ));
        }

        let mut admitted = 0;
        for task in tasks {
            if task.await.expect("task") {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 8);
    }

    // =========================================================================
    // GATEWAY SURFACE
    // =========================================================================

    async fn http_get(addr: SocketAddr, path: &str, forwarded_for: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.expect("connect");
        let request = format!(
            "GET {path} HTTP/1.1\r\nhost: localhost\r\nx-forwarded-for: {forwarded_for}\r\nconnection: close\r\n\r\n"
        );
        stream
            .write_all(request.as_bytes())
            .await
            .expect("write request");
        let mut response = Vec::new();
        stream
            .read_to_end(&mut response)
            .await
            .expect("read response");
        String::from_utf8_lossy(&response).into_owned()
    }

    #[tokio::test]
    async fn the_gateway_enforces_the_budget_over_tcp() {
        let mut config = MeshConfig::default();
        config.bus.username = "mesh".to_owned();
        config.bus.password = "mesh".to_owned();
        config.gateway.bind_addr = SocketAddr::from(([127, 0, 0, 1], 0));
        config.gateway.rate_limit.max = 2;

        let runtime = MeshRuntime::start(config).await.expect("start");

        let first = http_get(runtime.addr(), "/healthz", "203.0.113.9").await;
        assert!(first.starts_with("HTTP/1.1 200"), "{first}");
        let second = http_get(runtime.addr(), "/healthz", "203.0.113.9").await;
        assert!(second.starts_with("HTTP/1.1 200"), "{second}");

        let third = http_get(runtime.addr(), "/healthz", "203.0.113.9").await;
        assert!(third.starts_with("HTTP/1.1 429"), "{third}");
        assert!(third.to_lowercase().contains("retry-after:"), "{third}");
        assert!(third.contains("RATE_LIMIT_ERROR"), "{third}");

        // A different client still has its own budget.
        let other = http_get(runtime.addr(), "/healthz", "198.51.100.2").await;
        assert!(other.starts_with("HTTP/1.1 200"), "{other}");

        runtime.shutdown().await;
    }
}
