//! The orchestration loop
//!
//! A single long-lived task drives the whole system. Each tick:
//!
//! 1. atomically pops up to `pullCount` profile IDs from the profile queue
//!    (a pop failure is fatal: the loop cannot make progress without its
//!    store, so the error propagates out and the process aborts);
//! 2. spawns one fire-and-forget worker launch per popped ID and increments
//!    the shared in-flight counter once per profile;
//! 3. reads the in-flight counter: absent means nothing has launched since
//!    the last evaluator run, so the deadline clock resets and the tick
//!    restarts;
//! 4. fires the evaluator trigger when the deadline has elapsed or the
//!    counter has drained to zero;
//! 5. on fire, launches the evaluator if the proposal queue is non-empty,
//!    then deletes the counter and resets the clock whether or not the
//!    evaluator actually launched - the trigger itself closes the window;
//! 6. sleeps one second.
//!
//! The counter is advisory. Launcher increments race with worker
//! completions and with the delete in step 5; it answers "did anything
//! happen since the last evaluator run", not "exactly how many workers are
//! in flight".

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::launcher::{launch_evaluator, launch_worker};
use crate::metrics::{EvalReason, OrchestratorMetrics};
use crate::store::StateStore;
use crate::submit::JobSubmitter;
use crate::Result;

/// State storage key counting worker launches since the last evaluator run.
pub const CONCURRENT_MMFS_KEY: &str = "concurrentMMFs";

/// Pause between ticks. Not critical, just a safety valve that keeps a
/// broken deployment from spamming the store and the log.
const TICK_SLEEP: Duration = Duration::from_secs(1);

/// Shared dependencies handed to the loop and every spawned launcher.
pub struct Context {
    /// Shared state storage client.
    pub store: Arc<dyn StateStore>,
    /// Job submission client, shared by reference among all launchers.
    pub jobs: Arc<dyn JobSubmitter>,
    /// Loaded orchestrator configuration.
    pub config: Config,
    /// Fallback worker images, assembled once at startup.
    pub default_mmf_images: Vec<String>,
    /// Evaluator image, assembled once at startup.
    pub evaluator_image: String,
    /// Launch counters shared with launchers.
    pub metrics: OrchestratorMetrics,
}

impl Context {
    /// Create a context from the given clients and configuration.
    pub fn new(store: Arc<dyn StateStore>, jobs: Arc<dyn JobSubmitter>, config: Config) -> Self {
        let default_mmf_images = config.default_mmf_images();
        let evaluator_image = config.evaluator_image();
        Self {
            store,
            jobs,
            config,
            default_mmf_images,
            evaluator_image,
            metrics: OrchestratorMetrics::new(),
        }
    }
}

/// What a single tick did, for logging and tests.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Worker launches spawned this tick.
    pub profiles_launched: usize,
    /// The trigger reason, when the evaluator trigger fired.
    pub evaluator_triggered: Option<EvalReason>,
    /// Whether an evaluator launch was actually spawned.
    pub evaluator_launched: bool,
}

/// The top-level scheduler driving worker fan-out and evaluator runs.
pub struct Orchestrator {
    ctx: Arc<Context>,
    /// Start of the current evaluator window.
    window_started: Instant,
    /// Signalled on shutdown; every launcher gets a child token.
    shutdown: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator. The evaluator window opens at construction.
    pub fn new(ctx: Arc<Context>, shutdown: CancellationToken) -> Self {
        Self {
            ctx,
            window_started: Instant::now(),
            shutdown,
        }
    }

    /// Run ticks until a fatal error.
    ///
    /// Only store failures on the profile-queue pop escape this loop; the
    /// caller is expected to abort the process and let the supervisor
    /// restart it.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            let outcome = self.tick().await?;
            debug!(?outcome, "Tick complete");
            info!(ms = TICK_SLEEP.as_millis() as u64, "Sleeping...");
            tokio::time::sleep(TICK_SLEEP).await;
        }
    }

    /// Execute one tick of the loop.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let mut outcome = TickOutcome::default();
        let config = &self.ctx.config;
        let cancel = self.shutdown.child_token();

        info!(
            profile_queue = %config.queues.profiles.name,
            pull_count = config.queues.profiles.pull_count,
            "Retrieving match profiles"
        );
        let profiles = self
            .ctx
            .store
            .pop_profiles(&config.queues.profiles.name, config.queues.profiles.pull_count)
            .await?;

        if profiles.is_empty() {
            warn!(
                profile_queue = %config.queues.profiles.name,
                "Unable to retrieve match profiles from state storage - have you entered any?"
            );
        } else {
            info!(num_profiles = profiles.len(), "Starting MMF jobs...");
            for profile_id in profiles {
                tokio::spawn(launch_worker(
                    Arc::clone(&self.ctx),
                    profile_id,
                    cancel.clone(),
                ));
                outcome.profiles_launched += 1;
                // Once per profile, not per image, and before the launch
                // resolves; the counter is advisory.
                if let Err(err) = self.ctx.store.increment(CONCURRENT_MMFS_KEY).await {
                    warn!(error = %err, "Failed to increment the in-flight MMF counter");
                }
            }
        }

        let in_flight = match self.ctx.store.read(CONCURRENT_MMFS_KEY).await {
            Ok(Some(raw)) => raw.parse::<i64>().unwrap_or_else(|err| {
                error!(
                    error = %err,
                    value = %raw,
                    "Issue retrieving the number of currently running MMFs"
                );
                0
            }),
            Ok(None) => {
                // No MMFs have run since the last evaluation; a fresh window
                // starts with nothing scheduled.
                debug!("Number of concurrent MMFs is nil");
                self.window_started = Instant::now();
                return Ok(outcome);
            }
            Err(err) => {
                error!(error = %err, "Failed to read the in-flight MMF counter");
                return Ok(outcome);
            }
        };

        // Ready to evaluate either when the interval is exceeded or when all
        // MMFs are complete. Under load the interval path should dominate;
        // the drained-counter check is a short-circuit so a finished batch
        // doesn't wait out the full window.
        let interval = Duration::from_secs(config.interval.evaluator);
        let reason = if self.window_started.elapsed() >= interval {
            info!(
                interval = config.interval.evaluator,
                "Maximum evaluator interval exceeded"
            );
            Some(EvalReason::IntervalExceeded)
        } else if in_flight <= 0 {
            info!("All MMFs complete");
            Some(EvalReason::MmfsCompleted)
        } else {
            None
        };

        if let Some(reason) = reason {
            outcome.evaluator_triggered = Some(reason);
            info!("Checking state storage for match object proposals");
            match self
                .ctx
                .store
                .cardinality(&config.queues.proposals.name)
                .await
            {
                Err(err) => {
                    error!(
                        error = %err,
                        "Couldn't retrieve the length of the proposal queue from state storage!"
                    );
                }
                Ok(0) => {
                    warn!("No proposals in the queue!");
                }
                Ok(num_proposals) => {
                    info!(num_proposals, "Proposals available, evaluating!");
                    tokio::spawn(launch_evaluator(
                        Arc::clone(&self.ctx),
                        reason,
                        cancel.clone(),
                    ));
                    outcome.evaluator_launched = true;
                }
            }

            // The trigger fired; the window closes whether or not the
            // evaluator launched.
            if let Err(err) = self.ctx.store.delete(CONCURRENT_MMFS_KEY).await {
                error!(error = %err, "Error deleting concurrent MMF counter!");
            }
            self.window_started = Instant::now();
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    use crate::store::MockStateStore;
    use crate::submit::MockJobSubmitter;
    use crate::Error;

    fn test_context(store: MockStateStore, jobs: MockJobSubmitter, config: Config) -> Arc<Context> {
        Arc::new(Context::new(Arc::new(store), Arc::new(jobs), config))
    }

    fn orchestrator(ctx: Arc<Context>) -> Orchestrator {
        Orchestrator::new(ctx, CancellationToken::new())
    }

    /// Config whose evaluator interval can never elapse within a test.
    fn long_interval_config() -> Config {
        let mut config = Config::default();
        config.interval.evaluator = 3600;
        config
    }

    /// Config whose evaluator interval is always already exceeded.
    fn elapsed_interval_config() -> Config {
        let mut config = Config::default();
        config.interval.evaluator = 0;
        config
    }

    #[tokio::test]
    async fn profile_pop_failure_is_fatal() {
        let mut store = MockStateStore::new();
        store
            .expect_pop_profiles()
            .returning(|_, _| Err(Error::config("store unreachable")));
        let mut orch = orchestrator(test_context(
            store,
            MockJobSubmitter::new(),
            long_interval_config(),
        ));
        assert!(orch.tick().await.is_err());
    }

    #[tokio::test]
    async fn fan_out_increments_counter_once_per_profile() {
        let mut store = MockStateStore::new();
        store
            .expect_pop_profiles()
            .with(eq("profileq"), eq(100))
            .times(1)
            .returning(|_, _| Ok(vec!["moA.prA".to_string(), "moB.prB".to_string()]));
        store
            .expect_increment()
            .with(eq(CONCURRENT_MMFS_KEY))
            .times(2)
            .returning(|_| Ok(1));
        store
            .expect_read()
            .with(eq(CONCURRENT_MMFS_KEY))
            .times(1)
            .returning(|_| Ok(Some("2".to_string())));
        // Spawned workers read payloads in the background; let them miss.
        store.expect_read().returning(|_| Ok(None));
        let mut jobs = MockJobSubmitter::new();
        jobs.expect_submit().returning(|_, _| Ok(()));

        let mut orch = orchestrator(test_context(store, jobs, long_interval_config()));
        let outcome = orch.tick().await.unwrap();
        assert_eq!(outcome.profiles_launched, 2);
        assert_eq!(outcome.evaluator_triggered, None);
        assert!(!outcome.evaluator_launched);
    }

    #[tokio::test]
    async fn absent_counter_resets_the_window_and_skips_the_trigger() {
        let mut store = MockStateStore::new();
        store.expect_pop_profiles().returning(|_, _| Ok(vec![]));
        store
            .expect_read()
            .with(eq(CONCURRENT_MMFS_KEY))
            .times(1)
            .returning(|_| Ok(None));
        // No cardinality/delete expectations: reaching the trigger would panic.
        let mut orch = orchestrator(test_context(
            store,
            MockJobSubmitter::new(),
            elapsed_interval_config(),
        ));
        let outcome = orch.tick().await.unwrap();
        assert_eq!(outcome.evaluator_triggered, None);
        assert!(orch.window_started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn counter_read_error_skips_the_trigger() {
        let mut store = MockStateStore::new();
        store.expect_pop_profiles().returning(|_, _| Ok(vec![]));
        store
            .expect_read()
            .with(eq(CONCURRENT_MMFS_KEY))
            .returning(|_| Err(Error::config("timeout")));
        let mut orch = orchestrator(test_context(
            store,
            MockJobSubmitter::new(),
            elapsed_interval_config(),
        ));
        let outcome = orch.tick().await.unwrap();
        assert_eq!(outcome.evaluator_triggered, None);
    }

    #[tokio::test]
    async fn deadline_trigger_launches_evaluator_and_closes_the_window() {
        let mut store = MockStateStore::new();
        store.expect_pop_profiles().returning(|_, _| Ok(vec![]));
        store
            .expect_read()
            .with(eq(CONCURRENT_MMFS_KEY))
            .returning(|_| Ok(Some("3".to_string())));
        store
            .expect_cardinality()
            .with(eq("proposalq"))
            .times(1)
            .returning(|_| Ok(2));
        store
            .expect_delete()
            .with(eq(CONCURRENT_MMFS_KEY))
            .times(1)
            .returning(|_| Ok(()));
        let mut jobs = MockJobSubmitter::new();
        jobs.expect_submit().returning(|_, _| Ok(()));

        let mut orch = orchestrator(test_context(store, jobs, elapsed_interval_config()));
        let outcome = orch.tick().await.unwrap();
        assert_eq!(outcome.evaluator_triggered, Some(EvalReason::IntervalExceeded));
        assert!(outcome.evaluator_launched);
        assert!(orch.window_started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn drained_counter_triggers_with_mmfs_completed() {
        let mut store = MockStateStore::new();
        store.expect_pop_profiles().returning(|_, _| Ok(vec![]));
        store
            .expect_read()
            .with(eq(CONCURRENT_MMFS_KEY))
            .returning(|_| Ok(Some("0".to_string())));
        store
            .expect_cardinality()
            .with(eq("proposalq"))
            .times(1)
            .returning(|_| Ok(5));
        store
            .expect_delete()
            .with(eq(CONCURRENT_MMFS_KEY))
            .times(1)
            .returning(|_| Ok(()));
        let mut jobs = MockJobSubmitter::new();
        jobs.expect_submit().returning(|_, _| Ok(()));

        let mut orch = orchestrator(test_context(store, jobs, long_interval_config()));
        let outcome = orch.tick().await.unwrap();
        assert_eq!(outcome.evaluator_triggered, Some(EvalReason::MmfsCompleted));
        assert!(outcome.evaluator_launched);
    }

    #[tokio::test]
    async fn interval_takes_precedence_over_drained_counter() {
        let mut store = MockStateStore::new();
        store.expect_pop_profiles().returning(|_, _| Ok(vec![]));
        store
            .expect_read()
            .with(eq(CONCURRENT_MMFS_KEY))
            .returning(|_| Ok(Some("0".to_string())));
        store.expect_cardinality().returning(|_| Ok(1));
        store.expect_delete().returning(|_| Ok(()));
        let mut jobs = MockJobSubmitter::new();
        jobs.expect_submit().returning(|_, _| Ok(()));

        let mut orch = orchestrator(test_context(store, jobs, elapsed_interval_config()));
        let outcome = orch.tick().await.unwrap();
        assert_eq!(outcome.evaluator_triggered, Some(EvalReason::IntervalExceeded));
    }

    #[tokio::test]
    async fn empty_proposal_queue_skips_the_launch_but_still_closes_the_window() {
        let mut store = MockStateStore::new();
        store.expect_pop_profiles().returning(|_, _| Ok(vec![]));
        store
            .expect_read()
            .with(eq(CONCURRENT_MMFS_KEY))
            .returning(|_| Ok(Some("0".to_string())));
        store
            .expect_cardinality()
            .with(eq("proposalq"))
            .times(1)
            .returning(|_| Ok(0));
        store
            .expect_delete()
            .with(eq(CONCURRENT_MMFS_KEY))
            .times(1)
            .returning(|_| Ok(()));

        let mut orch = orchestrator(test_context(
            store,
            MockJobSubmitter::new(),
            long_interval_config(),
        ));
        let outcome = orch.tick().await.unwrap();
        assert_eq!(outcome.evaluator_triggered, Some(EvalReason::MmfsCompleted));
        assert!(!outcome.evaluator_launched);
        assert!(orch.window_started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn unreadable_proposal_queue_skips_the_launch_but_still_closes_the_window() {
        let mut store = MockStateStore::new();
        store.expect_pop_profiles().returning(|_, _| Ok(vec![]));
        store
            .expect_read()
            .with(eq(CONCURRENT_MMFS_KEY))
            .returning(|_| Ok(Some("0".to_string())));
        store
            .expect_cardinality()
            .returning(|_| Err(Error::config("timeout")));
        store
            .expect_delete()
            .with(eq(CONCURRENT_MMFS_KEY))
            .times(1)
            .returning(|_| Ok(()));

        let mut orch = orchestrator(test_context(
            store,
            MockJobSubmitter::new(),
            long_interval_config(),
        ));
        let outcome = orch.tick().await.unwrap();
        assert_eq!(outcome.evaluator_triggered, Some(EvalReason::MmfsCompleted));
        assert!(!outcome.evaluator_launched);
    }

    #[tokio::test]
    async fn unparseable_counter_is_treated_as_drained() {
        let mut store = MockStateStore::new();
        store.expect_pop_profiles().returning(|_, _| Ok(vec![]));
        store
            .expect_read()
            .with(eq(CONCURRENT_MMFS_KEY))
            .returning(|_| Ok(Some("not-a-number".to_string())));
        store.expect_cardinality().returning(|_| Ok(0));
        store.expect_delete().returning(|_| Ok(()));

        let mut orch = orchestrator(test_context(
            store,
            MockJobSubmitter::new(),
            long_interval_config(),
        ));
        let outcome = orch.tick().await.unwrap();
        assert_eq!(outcome.evaluator_triggered, Some(EvalReason::MmfsCompleted));
    }

    #[tokio::test]
    async fn counter_increment_failure_is_soft() {
        let mut store = MockStateStore::new();
        store
            .expect_pop_profiles()
            .returning(|_, _| Ok(vec!["moA.prA".to_string()]));
        store
            .expect_increment()
            .returning(|_| Err(Error::config("timeout")));
        store
            .expect_read()
            .with(eq(CONCURRENT_MMFS_KEY))
            .returning(|_| Ok(Some("1".to_string())));
        store.expect_read().returning(|_| Ok(None));
        let mut jobs = MockJobSubmitter::new();
        jobs.expect_submit().returning(|_, _| Ok(()));

        let mut orch = orchestrator(test_context(store, jobs, long_interval_config()));
        let outcome = orch.tick().await.unwrap();
        assert_eq!(outcome.profiles_launched, 1);
    }
}
