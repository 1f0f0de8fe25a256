//! Poll Loop
//!
//! Fixed-cadence scheduler: sweep every configured location, publish what
//! succeeded, sleep `interval`, repeat while running.
//!
//! # State Machine
//!
//! ```text
//!   Idle ──▶ Cycling(0) ──▶ ... ──▶ Cycling(n-1) ──▶ Sleeping ──▶ Idle
//!    │
//!    └── running == false ──▶ Stopped
//! ```
//!
//! # Failure Isolation
//!
//! 1. A location without a name is skipped with a warning
//! 2. A provider or sink failure drops only that location's update
//! 3. A panic while polling a location counts as that location's failure
//! 4. A panic elsewhere in a cycle ends that cycle; the loop still sleeps
//! 5. Only shutdown ends the loop

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::config::RuntimeConfig;
use crate::domain::ports::{
    Location, LocationQuery, MetricSink, Reading, Units, WeatherProvider,
};
use crate::error::Result;
use crate::lifecycle::LifecycleController;

// =============================================================================
// Configuration
// =============================================================================

/// What the loop polls and how often
#[derive(Debug, Clone)]
pub struct PollLoopConfig {
    /// Sleep between cycles
    pub interval: Duration,

    /// Published temperature unit
    pub units: Units,

    /// Locations in polling order
    pub locations: Vec<Location>,
}

impl From<&RuntimeConfig> for PollLoopConfig {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            interval: config.interval,
            units: config.units,
            locations: config.locations.clone(),
        }
    }
}

// =============================================================================
// State
// =============================================================================

/// Observable scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PollState {
    /// Between cycles, about to check the running flag
    Idle,
    /// Processing the location at this index
    Cycling(usize),
    /// Waiting for the next cycle
    Sleeping,
    /// Loop has exited
    Stopped,
}

impl std::fmt::Display for PollState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollState::Idle => write!(f, "Idle"),
            PollState::Cycling(i) => write!(f, "Cycling({})", i),
            PollState::Sleeping => write!(f, "Sleeping"),
            PollState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Outcome of one sweep
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    /// Locations whose metrics were written
    pub updated: usize,
    /// Locations whose update was dropped
    pub failed: usize,
    /// Locations without a name
    pub skipped: usize,
}

impl CycleReport {
    fn begin() -> Self {
        Self {
            started_at: Utc::now(),
            duration: Duration::ZERO,
            updated: 0,
            failed: 0,
            skipped: 0,
        }
    }
}

// =============================================================================
// Poll Loop
// =============================================================================

/// Sequential poll-and-publish scheduler
pub struct PollLoop<P: ?Sized, S: ?Sized> {
    config: PollLoopConfig,
    provider: Arc<P>,
    sink: Arc<S>,
    lifecycle: LifecycleController,
    state: RwLock<PollState>,
}

impl<P, S> PollLoop<P, S>
where
    P: WeatherProvider + ?Sized,
    S: MetricSink + ?Sized,
{
    pub fn new(
        config: PollLoopConfig,
        provider: Arc<P>,
        sink: Arc<S>,
        lifecycle: LifecycleController,
    ) -> Self {
        Self {
            config,
            provider,
            sink,
            lifecycle,
            state: RwLock::new(PollState::Idle),
        }
    }

    /// Current scheduler state.
    pub fn state(&self) -> PollState {
        *self.state.read()
    }

    fn set_state(&self, state: PollState) {
        *self.state.write() = state;
    }

    /// Run cycles until shutdown. Returns the number of completed cycles.
    ///
    /// The running flag is checked only before each cycle; a cycle in
    /// progress always finishes. Shutdown during the sleep wakes it early.
    #[instrument(skip(self), fields(locations = self.config.locations.len()))]
    pub async fn run(&self) -> u64 {
        info!(
            "Starting poll loop: {} locations every {:?} in {}",
            self.config.locations.len(),
            self.config.interval,
            self.config.units
        );

        let mut cycles = 0u64;

        loop {
            if !self.lifecycle.is_running() {
                self.set_state(PollState::Stopped);
                info!("Poll loop stopped after {} cycles", cycles);
                return cycles;
            }

            match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
                Ok(report) => {
                    if report.failed > 0 {
                        warn!(
                            "Cycle finished: {} updated, {} failed, {} skipped in {:?}",
                            report.updated, report.failed, report.skipped, report.duration
                        );
                    } else {
                        debug!(
                            "Cycle finished: {} updated, {} skipped in {:?}",
                            report.updated, report.skipped, report.duration
                        );
                    }
                }
                Err(panic) => {
                    error!("Error in poll cycle: {}", panic_message(panic.as_ref()));
                }
            }
            cycles += 1;

            self.set_state(PollState::Sleeping);
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = self.lifecycle.stopped() => {
                    debug!("Sleep interrupted by shutdown");
                }
            }
            self.set_state(PollState::Idle);
        }
    }

    /// Sweep every location once, in configured order.
    ///
    /// Never fails: per-location errors are logged and counted.
    pub async fn run_cycle(&self) -> CycleReport {
        let start = Instant::now();
        let mut report = CycleReport::begin();

        for (index, location) in self.config.locations.iter().enumerate() {
            self.set_state(PollState::Cycling(index));

            let (Some(city), Some(query)) = (location.city(), location.query()) else {
                warn!("Skipping location without name: {}", location);
                report.skipped += 1;
                continue;
            };

            let outcome = AssertUnwindSafe(self.poll_location(city, &query))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(reading)) => {
                    debug!(
                        location = city,
                        country = %reading.country,
                        "Updated metrics for {}, {}",
                        city,
                        reading.country
                    );
                    report.updated += 1;
                }
                Ok(Err(e)) => {
                    error!(location = city, "Error processing location {}: {}", city, e);
                    report.failed += 1;
                }
                Err(panic) => {
                    error!(
                        location = city,
                        "Panic while processing location {}: {}",
                        city,
                        panic_message(panic.as_ref())
                    );
                    report.failed += 1;
                }
            }
        }

        report.duration = start.elapsed();
        report
    }

    async fn poll_location(&self, city: &str, query: &LocationQuery) -> Result<Reading> {
        let observation = self.provider.fetch(query).await?;
        let provider = &self.provider;
        let reading = Reading::from_observation(observation, self.config.units, |kelvin, unit| {
            provider.convert_temperature(kelvin, unit)
        });
        self.sink.publish(city, &reading)?;
        Ok(reading)
    }
}

impl<P: ?Sized, S: ?Sized> std::fmt::Debug for PollLoop<P, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollLoop")
            .field("config", &self.config)
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemorySink;
    use crate::domain::ports::Observation;
    use crate::error::Error;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Provider that records every call and fails for chosen cities.
    #[derive(Default)]
    struct ScriptedProvider {
        calls: Mutex<Vec<LocationQuery>>,
        failing: Vec<String>,
        panicking: Vec<String>,
        stop_on_first_call: Option<LifecycleController>,
    }

    impl ScriptedProvider {
        fn failing(cities: &[&str]) -> Self {
            Self {
                failing: cities.iter().map(|c| c.to_string()).collect(),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<LocationQuery> {
            self.calls.lock().clone()
        }

        fn answer(&self, key: &str, query: LocationQuery) -> Result<Observation> {
            let first = {
                let mut calls = self.calls.lock();
                calls.push(query);
                calls.len() == 1
            };
            if first {
                if let Some(lifecycle) = &self.stop_on_first_call {
                    lifecycle.shutdown();
                }
            }
            if self.panicking.iter().any(|c| c == key) {
                panic!("provider blew up for {}", key);
            }
            if self.failing.iter().any(|c| c == key) {
                return Err(Error::ProviderResponse(format!("no data for {}", key)));
            }
            Ok(Observation {
                temperature: 300.0,
                temp_min: 299.0,
                temp_max: 301.0,
                feels_like: 302.0,
                humidity: Some(50.0),
                country: Some("XX".to_string()),
                condition: Some("mist".to_string()),
                ..Default::default()
            })
        }
    }

    #[async_trait]
    impl WeatherProvider for ScriptedProvider {
        async fn fetch_by_name(&self, city: &str) -> Result<Observation> {
            self.answer(city, LocationQuery::Name(city.to_string()))
        }

        async fn fetch_by_coordinates(&self, lat: f64, lon: f64) -> Result<Observation> {
            self.answer(
                &format!("{},{}", lat, lon),
                LocationQuery::Coordinates { lat, lon },
            )
        }
    }

    fn config(locations: Vec<Location>, units: Units) -> PollLoopConfig {
        PollLoopConfig {
            interval: Duration::from_millis(10),
            units,
            locations,
        }
    }

    fn poll_loop(
        provider: ScriptedProvider,
        locations: Vec<Location>,
        units: Units,
    ) -> (
        PollLoop<ScriptedProvider, InMemorySink>,
        Arc<ScriptedProvider>,
        Arc<InMemorySink>,
        LifecycleController,
    ) {
        let provider = Arc::new(provider);
        let sink = Arc::new(InMemorySink::new());
        let lifecycle = LifecycleController::new();
        let poll = PollLoop::new(
            config(locations, units),
            Arc::clone(&provider),
            Arc::clone(&sink),
            lifecycle.clone(),
        );
        (poll, provider, sink, lifecycle)
    }

    // =========================================================================
    // Cycle Tests
    // =========================================================================

    #[tokio::test]
    async fn test_cycle_calls_provider_once_per_location() {
        let locations = vec![
            Location::named("Berlin"),
            Location::named("Oslo"),
            Location::named("Lima"),
        ];
        let (poll, provider, sink, _) =
            poll_loop(ScriptedProvider::default(), locations, Units::Kelvin);

        let report = poll.run_cycle().await;

        assert_eq!(provider.calls().len(), 3);
        assert_eq!(sink.len(), 3);
        assert_eq!(report.updated, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(sink.cities(), vec!["Berlin", "Oslo", "Lima"]);
    }

    #[tokio::test]
    async fn test_coordinates_used_only_when_both_present() {
        let locations = vec![
            Location::at("Berlin", 52.52, 13.41),
            Location {
                name: Some("Paris".to_string()),
                lat: Some(48.85),
                lon: None,
            },
        ];
        let (poll, provider, _, _) =
            poll_loop(ScriptedProvider::default(), locations, Units::Kelvin);

        poll.run_cycle().await;

        assert_eq!(
            provider.calls(),
            vec![
                LocationQuery::Coordinates {
                    lat: 52.52,
                    lon: 13.41
                },
                LocationQuery::Name("Paris".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_is_isolated_to_its_location() {
        let locations = vec![
            Location::named("Berlin"),
            Location::named("Atlantis"),
            Location::named("Oslo"),
        ];
        let (poll, provider, sink, _) =
            poll_loop(ScriptedProvider::failing(&["Atlantis"]), locations, Units::Celsius);

        let report = poll.run_cycle().await;

        assert_eq!(provider.calls().len(), 3);
        assert_eq!(sink.cities(), vec!["Berlin", "Oslo"]);
        assert_eq!(report.updated, 2);
        assert_eq!(report.failed, 1);
    }

    /// Sink that rejects writes for chosen cities and records the rest.
    struct RejectingSink {
        rejected: Vec<String>,
        accepted: InMemorySink,
    }

    impl MetricSink for RejectingSink {
        fn publish(&self, city: &str, reading: &Reading) -> Result<()> {
            if self.rejected.iter().any(|c| c == city) {
                return Err(Error::Server(format!("write rejected for {}", city)));
            }
            self.accepted.publish(city, reading)
        }
    }

    #[tokio::test]
    async fn test_sink_failure_is_isolated_to_its_location() {
        let provider = Arc::new(ScriptedProvider::default());
        let sink = Arc::new(RejectingSink {
            rejected: vec!["Atlantis".to_string()],
            accepted: InMemorySink::new(),
        });
        let poll = PollLoop::new(
            config(
                vec![
                    Location::named("Berlin"),
                    Location::named("Atlantis"),
                    Location::named("Oslo"),
                ],
                Units::Celsius,
            ),
            Arc::clone(&provider),
            Arc::clone(&sink),
            LifecycleController::new(),
        );

        let report = poll.run_cycle().await;

        assert_eq!(provider.calls().len(), 3);
        assert_eq!(sink.accepted.cities(), vec!["Berlin", "Oslo"]);
        assert_eq!(report.updated, 2);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_unnamed_location_is_skipped() {
        let locations = vec![
            Location {
                name: None,
                lat: Some(1.0),
                lon: Some(2.0),
            },
            Location::named("Oslo"),
        ];
        let (poll, provider, sink, _) =
            poll_loop(ScriptedProvider::default(), locations, Units::Kelvin);

        let report = poll.run_cycle().await;

        assert_eq!(provider.calls().len(), 1);
        assert_eq!(sink.cities(), vec!["Oslo"]);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_units_applied_to_published_reading() {
        let (poll, _, sink, _) = poll_loop(
            ScriptedProvider::default(),
            vec![Location::named("Berlin")],
            Units::Celsius,
        );
        poll.run_cycle().await;

        let reading = sink.latest("Berlin").unwrap();
        assert_eq!(reading.temperature, 26.85);
        assert_eq!(reading.feels_like, 28.85);
        assert_eq!(reading.humidity, 50.0);
        assert_eq!(reading.country, "XX");
        assert_eq!(reading.condition, "mist");

        let (poll, _, sink, _) = poll_loop(
            ScriptedProvider::default(),
            vec![Location::named("Berlin")],
            Units::Kelvin,
        );
        poll.run_cycle().await;
        assert_eq!(sink.latest("Berlin").unwrap().temperature, 300.0);
    }

    // =========================================================================
    // Loop Tests
    // =========================================================================

    #[tokio::test]
    async fn test_run_does_nothing_once_stopped() {
        let (poll, provider, sink, lifecycle) = poll_loop(
            ScriptedProvider::default(),
            vec![Location::named("Berlin")],
            Units::Kelvin,
        );
        lifecycle.shutdown();

        let cycles = poll.run().await;

        assert_eq!(cycles, 0);
        assert!(provider.calls().is_empty());
        assert!(sink.is_empty());
        assert_eq!(poll.state(), PollState::Stopped);
    }

    #[tokio::test]
    async fn test_shutdown_mid_cycle_finishes_current_sweep() {
        let lifecycle = LifecycleController::new();
        let provider = Arc::new(ScriptedProvider {
            stop_on_first_call: Some(lifecycle.clone()),
            ..Default::default()
        });
        let sink = Arc::new(InMemorySink::new());
        let poll = PollLoop::new(
            PollLoopConfig {
                interval: Duration::from_secs(3600),
                units: Units::Kelvin,
                locations: vec![
                    Location::named("Berlin"),
                    Location::named("Oslo"),
                    Location::named("Lima"),
                ],
            },
            Arc::clone(&provider),
            Arc::clone(&sink),
            lifecycle,
        );

        let cycles = tokio::time::timeout(Duration::from_secs(5), poll.run())
            .await
            .expect("shutdown must cut the hour-long sleep short");

        assert_eq!(cycles, 1);
        assert_eq!(provider.calls().len(), 3);
        assert_eq!(sink.len(), 3);
        assert_eq!(poll.state(), PollState::Stopped);
    }

    #[tokio::test]
    async fn test_loop_keeps_cadence_when_everything_fails() {
        let (poll, provider, sink, lifecycle) = poll_loop(
            ScriptedProvider::failing(&["Berlin"]),
            vec![Location::named("Berlin")],
            Units::Kelvin,
        );
        let poll = Arc::new(poll);
        let runner = {
            let poll = Arc::clone(&poll);
            tokio::spawn(async move { poll.run().await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        lifecycle.shutdown();
        let cycles = runner.await.unwrap();

        assert!(cycles >= 2, "expected repeated cycles, got {}", cycles);
        assert_eq!(provider.calls().len() as u64, cycles);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_panic_in_cycle_is_contained() {
        let provider = ScriptedProvider {
            panicking: vec!["Berlin".to_string()],
            ..Default::default()
        };
        let (poll, provider, _, lifecycle) =
            poll_loop(provider, vec![Location::named("Berlin")], Units::Kelvin);
        let poll = Arc::new(poll);
        let runner = {
            let poll = Arc::clone(&poll);
            tokio::spawn(async move { poll.run().await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        lifecycle.shutdown();
        let cycles = runner.await.unwrap();

        assert!(cycles >= 2);
        assert_eq!(provider.calls().len() as u64, cycles);
    }

    #[tokio::test]
    async fn test_panicking_location_does_not_block_later_ones() {
        let provider = ScriptedProvider {
            panicking: vec!["Berlin".to_string()],
            ..Default::default()
        };
        let (poll, provider, sink, _) = poll_loop(
            provider,
            vec![Location::named("Berlin"), Location::named("Oslo")],
            Units::Kelvin,
        );

        for _ in 0..3 {
            let report = poll.run_cycle().await;
            assert_eq!(report.failed, 1);
            assert_eq!(report.updated, 1);
        }

        assert_eq!(provider.calls().len(), 6);
        assert_eq!(sink.cities(), vec!["Oslo", "Oslo", "Oslo"]);
    }

    #[tokio::test]
    async fn test_panicking_location_in_running_loop_keeps_others_fresh() {
        let provider = ScriptedProvider {
            panicking: vec!["Berlin".to_string()],
            ..Default::default()
        };
        let (poll, provider, sink, lifecycle) = poll_loop(
            provider,
            vec![Location::named("Berlin"), Location::named("Oslo")],
            Units::Kelvin,
        );
        let poll = Arc::new(poll);
        let runner = {
            let poll = Arc::clone(&poll);
            tokio::spawn(async move { poll.run().await })
        };

        tokio::time::sleep(Duration::from_millis(60)).await;
        lifecycle.shutdown();
        let cycles = runner.await.unwrap();

        assert!(cycles >= 2);
        assert_eq!(provider.calls().len() as u64, cycles * 2);
        assert_eq!(sink.len() as u64, cycles);
        assert!(sink.cities().iter().all(|c| c == "Oslo"));
    }

    #[test]
    fn test_poll_state_display() {
        assert_eq!(PollState::Cycling(2).to_string(), "Cycling(2)");
        assert_eq!(PollState::Stopped.to_string(), "Stopped");
    }
}
