//! Throttled, concurrency-safe cache in front of a [`WeatherProvider`].
//!
//! Every read goes through one `tokio::sync::Mutex`. The reader that finds the
//! data stale performs the fetch while holding it; readers arriving meanwhile
//! queue on the lock and then see the refreshed state. So a burst of reads
//! inside one window costs at most one upstream call.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::{sync::Mutex, time::Instant};

use crate::{
    model::Observation,
    provider::{ProviderId, WeatherProvider},
};

/// How a read was served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshStatus {
    /// Inside the throttle window; the provider was not called.
    Cached,
    /// The provider was called and returned new data.
    Refreshed,
    /// The provider was called and failed. The observation is the previous one.
    Failed(String),
}

impl RefreshStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshStatus::Cached => "cached",
            RefreshStatus::Refreshed => "refreshed",
            RefreshStatus::Failed(_) => "failed",
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            RefreshStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, RefreshStatus::Failed(_))
    }
}

impl std::fmt::Display for RefreshStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshStatus::Failed(reason) => write!(f, "Error: {reason}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// What a reader gets back: the best-known observation plus how it was obtained.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub observation: Arc<Observation>,
    pub status: RefreshStatus,
    /// Wall-clock time of the last fetch attempt, successful or not.
    pub attempted_at: Option<DateTime<Utc>>,
    /// Wall-clock time the current observation was fetched.
    pub refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct CacheState {
    observation: Arc<Observation>,
    // Monotonic; `None` means no attempt yet, which is always stale.
    last_attempt: Option<Instant>,
    attempted_at: Option<DateTime<Utc>>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl CacheState {
    fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.last_attempt.map(|at| now.saturating_duration_since(at))
    }

    fn snapshot(&self, status: RefreshStatus) -> Snapshot {
        Snapshot {
            observation: Arc::clone(&self.observation),
            status,
            attempted_at: self.attempted_at,
            refreshed_at: self.refreshed_at,
        }
    }
}

#[derive(Debug)]
pub struct RefreshingObservationCache {
    provider: Arc<dyn WeatherProvider>,
    refresh_interval: Duration,
    state: Mutex<CacheState>,
}

impl RefreshingObservationCache {
    pub fn new(provider: Arc<dyn WeatherProvider>, refresh_interval: Duration) -> Self {
        tracing::info!(
            provider = %provider.id(),
            refresh_interval_secs = refresh_interval.as_secs_f64(),
            "observation cache created"
        );

        Self {
            provider,
            refresh_interval,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn provider_id(&self) -> ProviderId {
        self.provider.id()
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Returns the current observation, refreshing it first if the throttle allows.
    ///
    /// Fetch failures are reported through [`Snapshot::status`]; the previous
    /// observation is kept and the attempt still counts against the window.
    pub async fn current_snapshot(&self) -> Snapshot {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        match state.elapsed(now) {
            Some(elapsed) if elapsed <= self.refresh_interval => {
                tracing::debug!(
                    elapsed_secs = elapsed.as_secs_f64(),
                    window_secs = self.refresh_interval.as_secs_f64(),
                    "too many requests to update, serving cached observation"
                );
                return state.snapshot(RefreshStatus::Cached);
            }
            _ => {}
        }

        // Spend the window before the outcome is known.
        state.last_attempt = Some(now);
        state.attempted_at = Some(Utc::now());
        tracing::info!(provider = %self.provider.id(), "update requested");

        let status = match self.provider.fetch().await {
            Ok(raw) => {
                state.observation = Arc::new(Observation::from(raw));
                state.refreshed_at = state.attempted_at;
                tracing::info!(provider = %self.provider.id(), "observation updated");
                RefreshStatus::Refreshed
            }
            Err(err) => {
                tracing::warn!(
                    provider = %self.provider.id(),
                    error = %err,
                    "update weather request failed, keeping previous observation"
                );
                RefreshStatus::Failed(err.to_string())
            }
        };

        state.snapshot(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::FetchError,
        model::RawObservation,
        provider::{fake::FakeProvider, ProviderId},
    };
    use async_trait::async_trait;
    use std::{
        collections::VecDeque,
        sync::atomic::{AtomicUsize, Ordering},
    };

    /// Replays queued results; when the queue runs dry it keeps succeeding
    /// with a temperature derived from the call count.
    #[derive(Debug, Default)]
    struct ScriptedProvider {
        calls: AtomicUsize,
        script: std::sync::Mutex<VecDeque<Result<RawObservation, FetchError>>>,
        delay: Option<Duration>,
    }

    impl ScriptedProvider {
        fn with_script(script: Vec<Result<RawObservation, FetchError>>) -> Self {
            Self { script: std::sync::Mutex::new(script.into()), ..Default::default() }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn reading(kelvin: f64) -> RawObservation {
        RawObservation {
            title: Some("Testville".into()),
            temperature_k: Some(kelvin),
            pressure_hpa: Some(1013.0),
            ..Default::default()
        }
    }

    #[async_trait]
    impl WeatherProvider for ScriptedProvider {
        fn id(&self) -> ProviderId {
            ProviderId::Fake
        }

        async fn fetch(&self) -> Result<RawObservation, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(reading(273.15 + n as f64)))
        }
    }

    fn cache_over(provider: &Arc<ScriptedProvider>, secs: u64) -> RefreshingObservationCache {
        RefreshingObservationCache::new(provider.clone(), Duration::from_secs(secs))
    }

    #[tokio::test(start_paused = true)]
    async fn first_read_always_fetches() {
        let provider = Arc::new(ScriptedProvider::default());
        let cache = cache_over(&provider, 3600);

        let snap = cache.current_snapshot().await;

        assert_eq!(provider.calls(), 1);
        assert_eq!(snap.status, RefreshStatus::Refreshed);
        let t = snap.observation.temperature_c.expect("temperature present");
        assert!((t - 1.0).abs() < 1e-9);
        assert!(snap.attempted_at.is_some());
        assert_eq!(snap.attempted_at, snap.refreshed_at);
    }

    #[tokio::test(start_paused = true)]
    async fn reads_inside_window_do_not_call_provider() {
        let provider = Arc::new(ScriptedProvider::default());
        let cache = cache_over(&provider, 10);

        let first = cache.current_snapshot().await;
        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(2)).await;
            let snap = cache.current_snapshot().await;
            assert_eq!(snap.status, RefreshStatus::Cached);
            assert_eq!(snap.observation, first.observation);
            assert_eq!(snap.attempted_at, first.attempted_at);
        }

        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn read_exactly_at_window_edge_is_still_fresh() {
        let provider = Arc::new(ScriptedProvider::default());
        let cache = cache_over(&provider, 10);

        cache.current_snapshot().await;
        tokio::time::advance(Duration::from_secs(10)).await;
        let snap = cache.current_snapshot().await;

        assert_eq!(snap.status, RefreshStatus::Cached);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn read_after_window_refreshes_once() {
        let provider = Arc::new(ScriptedProvider::default());
        let cache = cache_over(&provider, 10);

        let first = cache.current_snapshot().await;
        tokio::time::advance(Duration::from_millis(10_001)).await;

        let second = cache.current_snapshot().await;
        assert_eq!(provider.calls(), 2);
        assert_eq!(second.status, RefreshStatus::Refreshed);
        assert_ne!(second.observation, first.observation);

        let third = cache.current_snapshot().await;
        assert_eq!(provider.calls(), 2);
        assert_eq!(third.observation, second.observation);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_keeps_data_and_spends_the_window() {
        let provider = Arc::new(ScriptedProvider::with_script(vec![
            Ok(reading(300.0)),
            Err(FetchError::UpstreamStatus { status: 500, body: "boom".into() }),
        ]));
        let cache = cache_over(&provider, 10);

        let good = cache.current_snapshot().await;
        tokio::time::advance(Duration::from_secs(11)).await;

        let failed = cache.current_snapshot().await;
        assert_eq!(provider.calls(), 2);
        assert!(failed.status.is_degraded());
        assert!(failed.status.error().unwrap().contains("500"));
        assert_eq!(failed.observation, good.observation);
        assert_eq!(failed.refreshed_at, good.refreshed_at);
        assert!(failed.attempted_at >= good.attempted_at);

        tokio::time::advance(Duration::from_secs(5)).await;
        let retry = cache.current_snapshot().await;
        assert_eq!(provider.calls(), 2, "no retry inside the window");
        assert_eq!(retry.status, RefreshStatus::Cached);
        assert_eq!(retry.observation, good.observation);
        assert_eq!(retry.attempted_at, failed.attempted_at);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_first_fetch_yields_empty_observation() {
        let provider = Arc::new(ScriptedProvider::with_script(vec![Err(
            FetchError::UpstreamError("invalid api key".into()),
        )]));
        let cache = cache_over(&provider, 10);

        let snap = cache.current_snapshot().await;

        assert!(snap.observation.is_empty());
        assert_eq!(snap.status.to_string(), "Error: upstream reported an error: invalid api key");
        assert!(snap.refreshed_at.is_none());
        assert!(snap.attempted_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_window_refreshes_on_every_read() {
        let provider = Arc::new(ScriptedProvider::default());
        let cache = RefreshingObservationCache::new(provider.clone(), Duration::ZERO);

        cache.current_snapshot().await;
        tokio::time::advance(Duration::from_millis(1)).await;
        cache.current_snapshot().await;

        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_burst_triggers_a_single_fetch() {
        const READERS: usize = 1000;

        let provider = Arc::new(ScriptedProvider {
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let cache = Arc::new(cache_over(&provider, 60));

        let mut readers = tokio::task::JoinSet::new();
        for _ in 0..READERS {
            let cache = Arc::clone(&cache);
            readers.spawn(async move { cache.current_snapshot().await });
        }

        let mut snapshots = Vec::with_capacity(READERS);
        while let Some(joined) = readers.join_next().await {
            snapshots.push(joined.expect("reader task panicked"));
        }

        assert_eq!(provider.calls(), 1);
        assert_eq!(snapshots.len(), READERS);

        let attempted = snapshots[0].attempted_at;
        assert!(attempted.is_some());
        assert!(snapshots.iter().all(|s| s.attempted_at == attempted));
        assert!(snapshots.iter().all(|s| s.observation == snapshots[0].observation));
        assert_eq!(
            snapshots.iter().filter(|s| s.status == RefreshStatus::Refreshed).count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fake_provider_reads_change_only_after_window() {
        let coords = crate::model::Coordinates::new(55.03, 82.92).unwrap();
        let cache =
            RefreshingObservationCache::new(Arc::new(FakeProvider::new(coords)), Duration::from_secs(2));

        let first = cache.current_snapshot().await;
        let second = cache.current_snapshot().await;
        assert_eq!(first.observation, second.observation);
        assert_eq!(second.status, RefreshStatus::Cached);

        tokio::time::advance(Duration::from_millis(2100)).await;
        let third = cache.current_snapshot().await;
        assert_eq!(third.status, RefreshStatus::Refreshed);
        assert_ne!(third.observation, first.observation);
    }

    #[test]
    fn status_strings() {
        assert_eq!(RefreshStatus::Cached.as_str(), "cached");
        assert_eq!(RefreshStatus::Refreshed.to_string(), "refreshed");
        assert_eq!(RefreshStatus::Cached.to_string(), "cached");
        assert_eq!(RefreshStatus::Failed("x".into()).as_str(), "failed");
        assert_eq!(RefreshStatus::Failed("x".into()).error(), Some("x"));
        assert!(RefreshStatus::Cached.error().is_none());
    }
}
