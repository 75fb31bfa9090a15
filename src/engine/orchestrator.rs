//! Swap orchestrator: the ping-pong state machine.
//!
//! Owns one run: picks the direction and size of every leg, hands it to a
//! `SwapClient`, interprets the outcome and paces the next attempt.
//!
//! Rules:
//! - Forward legs (A→B) draw a fresh amount uniformly from the configured
//!   bounds; Reverse legs (B→A) sell exactly what the previous Forward leg
//!   reported receiving.
//! - Direction flips only on a counted leg.
//! - A failed Reverse leg is never retried as Reverse; the next attempt is
//!   a fresh Forward leg.
//! - Failures wait a fixed delay; successes wait a random interval.
//! - Cancellation is checked before each leg and right after each outcome.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{ConfirmationPolicy, RunConfig};
use crate::engine::cancel::RunFlag;
use crate::engine::events::EventLog;
use crate::engine::executor::SwapClient;
use crate::types::{
    Confirmation, Direction, LegInfo, RunEnd, RunProgress, SwapError, SwapOutcome, SwapRequest,
};

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Mutable state of a run. Written only by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunState {
    pub direction: Direction,
    pub success_count: u32,
    /// Output of the last Forward leg, consumed by the next Reverse leg.
    pub pending_reverse_amount: Option<f64>,
    pub consecutive_failures: u32,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator<C> {
    client: C,
    config: Arc<RunConfig>,
    events: EventLog,
    flag: RunFlag,
    progress: Arc<watch::Sender<RunProgress>>,
    rng: StdRng,
    state: RunState,
}

impl<C: SwapClient> Orchestrator<C> {
    /// `config` must already be validated.
    pub fn new(client: C, config: Arc<RunConfig>, events: EventLog, flag: RunFlag) -> Self {
        let (progress, _) = watch::channel(RunProgress::default());
        Self {
            client,
            config,
            events,
            flag,
            progress: Arc::new(progress),
            rng: StdRng::from_entropy(),
            state: RunState::default(),
        }
    }

    /// Deterministic amount and interval draws (tests, replays).
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Publish progress snapshots to an external channel.
    pub fn with_progress(mut self, progress: Arc<watch::Sender<RunProgress>>) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Drive the run to completion or cancellation.
    pub async fn run(&mut self) -> RunEnd {
        let target = self.config.trade_count;
        info!(
            target,
            min_amount = self.config.min_amount,
            max_amount = self.config.max_amount,
            "Starting ping-pong run"
        );
        self.publish(true);

        let end = loop {
            if self.state.success_count >= target {
                break RunEnd::Completed;
            }
            if !self.flag.is_running() {
                self.events.info("Stop requested, halting before the next leg");
                break RunEnd::Cancelled;
            }

            let direction = self.state.direction;
            let amount_ui = self.next_amount();

            let request = match self.build_request(amount_ui) {
                Ok(request) => request,
                Err(err) => {
                    self.events.error(format!("Swap failed: {err}"));
                    match self.on_failure(direction).await {
                        Some(end) => break end,
                        None => continue,
                    }
                }
            };

            let leg = LegInfo {
                index: self.state.success_count,
                total: target,
                direction,
                amount_ui,
            };
            debug!(?request, %direction, "Dispatching leg");
            let outcome = self.client.execute(&request, leg, &self.events).await;

            if !self.flag.is_running() {
                self.events.info("Stop requested, leg result discarded");
                break RunEnd::Cancelled;
            }

            let counted = match outcome {
                SwapOutcome::Settled {
                    output_ui,
                    confirmation,
                    ..
                } => {
                    if self.counts(&confirmation) {
                        Some(output_ui)
                    } else {
                        self.events.error(format!(
                            "Leg not counted: confirmation {confirmation} (strict policy)"
                        ));
                        None
                    }
                }
                SwapOutcome::Failed => None,
            };

            match counted {
                Some(output_ui) => self.on_settled(direction, output_ui).await,
                None => {
                    if let Some(end) = self.on_failure(direction).await {
                        break end;
                    }
                }
            }
        };

        self.publish(false);
        info!(
            end = %end,
            success_count = self.state.success_count,
            target,
            "Ping-pong run finished"
        );
        end
    }

    /// Whether a submitted leg counts under the configured policy.
    fn counts(&self, confirmation: &Confirmation) -> bool {
        match self.config.policy.confirmation {
            ConfirmationPolicy::Optimistic => true,
            ConfirmationPolicy::Strict => confirmation.is_confirmed(),
        }
    }

    /// UI amount for the next leg.
    fn next_amount(&mut self) -> f64 {
        match self.state.direction {
            Direction::Forward => self
                .rng
                .gen_range(self.config.min_amount..=self.config.max_amount),
            Direction::Reverse => self.state.pending_reverse_amount.take().unwrap_or(0.0),
        }
    }

    /// (input, output) mints for the current direction.
    fn pair(&self) -> (&str, &str) {
        match self.state.direction {
            Direction::Forward => (self.config.input_mint.as_str(), self.config.output_mint.as_str()),
            Direction::Reverse => (self.config.output_mint.as_str(), self.config.input_mint.as_str()),
        }
    }

    fn build_request(&self, amount_ui: f64) -> Result<SwapRequest, SwapError> {
        let (input, output) = self.pair();
        let amount_base = self.config.tokens.to_base_units(input, amount_ui)?;
        Ok(SwapRequest {
            input_mint: input.to_string(),
            output_mint: output.to_string(),
            amount_base,
            slippage_bps: self.config.slippage_bps(),
            priority_fee_lamports: self.config.priority_fee_lamports(),
        })
    }

    async fn on_settled(&mut self, direction: Direction, output_ui: f64) {
        self.state.success_count += 1;
        self.state.consecutive_failures = 0;
        if direction == Direction::Forward {
            self.state.pending_reverse_amount = Some(output_ui);
        }
        self.state.direction = direction.flip();
        self.publish(true);

        info!(
            success_count = self.state.success_count,
            target = self.config.trade_count,
            next = %self.state.direction,
            "Leg counted"
        );

        if self.state.success_count < self.config.trade_count {
            let wait_ms = self
                .rng
                .gen_range(self.config.min_interval_ms..=self.config.max_interval_ms);
            self.events.info(format!("Cooling down {wait_ms}ms..."));
            self.pause(wait_ms).await;
        }
    }

    /// Apply the failure rules. Returns `Some` when the run must end.
    async fn on_failure(&mut self, direction: Direction) -> Option<RunEnd> {
        self.events.error("Trade failed, retrying after a short delay");

        if direction == Direction::Reverse {
            self.events.error(
                "Reverse leg failed; resetting to a fresh forward leg instead of retrying",
            );
            self.state.direction = Direction::Forward;
            self.state.pending_reverse_amount = None;
        }

        self.state.consecutive_failures += 1;
        self.publish(true);

        if let Some(cap) = self.config.policy.max_consecutive_failures {
            if self.state.consecutive_failures >= cap {
                warn!(cap, "Consecutive failure cap reached");
                self.events
                    .error(format!("Giving up after {cap} consecutive failed legs"));
                return Some(RunEnd::FailureLimit);
            }
        }

        self.pause(self.config.policy.failure_delay_ms).await;
        None
    }

    /// Sleep, waking early if a stop is requested.
    async fn pause(&self, ms: u64) {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
            _ = self.flag.cancelled() => {}
        }
    }

    fn publish(&self, running: bool) {
        self.progress.send_replace(RunProgress {
            running,
            success_count: self.state.success_count,
            target: self.config.trade_count,
            direction: self.state.direction,
            consecutive_failures: self.state.consecutive_failures,
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::types::LogKind;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Ok,
        Fail,
        Unconfirmed,
    }

    /// Client that follows a script, then succeeds, returning 98% of input.
    #[derive(Default)]
    struct ScriptedClient {
        script: Mutex<VecDeque<Step>>,
        calls: Mutex<Vec<(SwapRequest, LegInfo, Instant)>>,
        cancel_on_call: Option<(usize, RunFlag)>,
    }

    impl ScriptedClient {
        fn with_script(steps: &[Step]) -> Self {
            Self {
                script: Mutex::new(steps.iter().copied().collect()),
                ..Default::default()
            }
        }

        fn legs(&self) -> Vec<LegInfo> {
            self.calls.lock().unwrap().iter().map(|c| c.1).collect()
        }
    }

    #[async_trait]
    impl SwapClient for ScriptedClient {
        async fn execute(&self, request: &SwapRequest, leg: LegInfo, _events: &EventLog) -> SwapOutcome {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                calls.push((request.clone(), leg, Instant::now()));
                calls.len()
            };
            if let Some((at, flag)) = &self.cancel_on_call {
                if *at == n {
                    flag.cancel();
                }
            }
            let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Ok);
            let confirmation = match step {
                Step::Ok => Confirmation::Confirmed,
                Step::Unconfirmed => Confirmation::TimedOut,
                Step::Fail => return SwapOutcome::Failed,
            };
            SwapOutcome::Settled {
                output_ui: leg.amount_ui * 0.98,
                txid: format!("tx{n}"),
                confirmation,
            }
        }
    }

    fn orchestrator(client: ScriptedClient, cfg: RunConfig) -> Orchestrator<ScriptedClient> {
        Orchestrator::new(client, Arc::new(cfg), EventLog::default(), RunFlag::new()).with_seed(7)
    }

    #[tokio::test(start_paused = true)]
    async fn test_forward_amounts_within_bounds() {
        let mut cfg = RunConfig::sample();
        cfg.trade_count = 40;
        let mut orch = orchestrator(ScriptedClient::default(), cfg);
        assert_eq!(orch.run().await, RunEnd::Completed);

        let forward: Vec<f64> = orch
            .client()
            .legs()
            .into_iter()
            .filter(|l| l.direction == Direction::Forward)
            .map(|l| l.amount_ui)
            .collect();
        assert_eq!(forward.len(), 20);
        assert!(forward.iter().all(|a| (0.01..=0.012).contains(a)));
        // independent draws, not one value reused
        assert!(forward.windows(2).any(|w| w[0] != w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_equal_bounds_give_fixed_amount() {
        let mut cfg = RunConfig::sample();
        cfg.min_amount = 0.5;
        cfg.max_amount = 0.5;
        let mut orch = orchestrator(ScriptedClient::default(), cfg);
        orch.run().await;
        assert_eq!(orch.client().legs()[0].amount_ui, 0.5);
        assert_eq!(orch.client().calls.lock().unwrap()[0].0.amount_base, 500_000_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_directions_alternate_and_reverse_sells_prior_output() {
        let mut cfg = RunConfig::sample();
        cfg.trade_count = 6;
        let mut orch = orchestrator(ScriptedClient::default(), cfg);
        orch.run().await;

        let legs = orch.client().legs();
        let dirs: Vec<Direction> = legs.iter().map(|l| l.direction).collect();
        use Direction::*;
        assert_eq!(dirs, vec![Forward, Reverse, Forward, Reverse, Forward, Reverse]);
        for pair in legs.chunks(2) {
            assert_eq!(pair[1].amount_ui, pair[0].amount_ui * 0.98);
        }
        assert_eq!(orch.state().success_count, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reverse_request_swaps_mints() {
        let cfg = RunConfig::sample();
        let (a, b) = (cfg.input_mint.clone(), cfg.output_mint.clone());
        let mut orch = orchestrator(ScriptedClient::default(), cfg);
        orch.run().await;

        let calls = orch.client().calls.lock().unwrap();
        assert_eq!((calls[0].0.input_mint.as_str(), calls[0].0.output_mint.as_str()), (a.as_str(), b.as_str()));
        assert_eq!((calls[1].0.input_mint.as_str(), calls[1].0.output_mint.as_str()), (b.as_str(), a.as_str()));
        assert_eq!(calls[0].0.slippage_bps, 50);
        assert_eq!(calls[0].0.priority_fee_lamports, 100_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reverse_resets_to_forward() {
        use Step::*;
        let mut cfg = RunConfig::sample();
        cfg.trade_count = 2;
        let mut orch = orchestrator(ScriptedClient::with_script(&[Ok, Fail, Fail, Ok]), cfg);
        assert_eq!(orch.run().await, RunEnd::Completed);

        use Direction::*;
        let dirs: Vec<Direction> = orch.client().legs().iter().map(|l| l.direction).collect();
        // F ok, R fail -> reset, F fail (stays F), F ok
        assert_eq!(dirs, vec![Forward, Reverse, Forward, Forward]);
        // two generic failure events plus one reverse-reset event
        assert_eq!(orch.events.count(LogKind::Error), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_waits_fixed_delay() {
        let mut cfg = RunConfig::sample();
        cfg.trade_count = 1;
        let mut orch = orchestrator(ScriptedClient::with_script(&[Step::Fail]), cfg);
        orch.run().await;

        let calls = orch.client().calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].2 - calls[0].2, Duration::from_millis(3_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_waits_within_interval() {
        let mut cfg = RunConfig::sample();
        cfg.trade_count = 4;
        let mut orch = orchestrator(ScriptedClient::default(), cfg);
        orch.run().await;

        let calls = orch.client().calls.lock().unwrap();
        for w in calls.windows(2) {
            let gap = w[1].2 - w[0].2;
            assert!(gap >= Duration::from_millis(1_000) && gap <= Duration::from_millis(2_000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_cap_ends_run() {
        let mut cfg = RunConfig::sample();
        cfg.policy.max_consecutive_failures = Some(3);
        let client = ScriptedClient::with_script(&[Step::Fail; 10]);
        let mut orch = orchestrator(client, cfg);

        assert_eq!(orch.run().await, RunEnd::FailureLimit);
        assert_eq!(orch.client().legs().len(), 3);
        assert_eq!(orch.state().success_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_optimistic_counts_unconfirmed_leg() {
        let mut cfg = RunConfig::sample();
        cfg.trade_count = 1;
        let mut orch = orchestrator(ScriptedClient::with_script(&[Step::Unconfirmed]), cfg);
        assert_eq!(orch.run().await, RunEnd::Completed);
        assert_eq!(orch.state().success_count, 1);
        assert_eq!(orch.state().direction, Direction::Reverse);
    }

    #[tokio::test(start_paused = true)]
    async fn test_strict_policy_treats_unconfirmed_as_failure() {
        let mut cfg = RunConfig::sample();
        cfg.trade_count = 2;
        cfg.policy.confirmation = ConfirmationPolicy::Strict;
        use Step::*;
        let mut orch = orchestrator(ScriptedClient::with_script(&[Ok, Unconfirmed]), cfg);
        orch.run().await;

        use Direction::*;
        let dirs: Vec<Direction> = orch.client().legs().iter().map(|l| l.direction).collect();
        assert_eq!(dirs, vec![Forward, Reverse, Forward, Reverse]);
        assert_eq!(orch.state().success_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_leg_discards_outcome() {
        let flag = RunFlag::new();
        let client = ScriptedClient {
            cancel_on_call: Some((2, flag.clone())),
            ..Default::default()
        };
        let mut cfg = RunConfig::sample();
        cfg.trade_count = 10;
        let mut orch =
            Orchestrator::new(client, Arc::new(cfg), EventLog::default(), flag).with_seed(1);

        assert_eq!(orch.run().await, RunEnd::Cancelled);
        assert_eq!(orch.client().legs().len(), 2);
        // second leg's outcome was not processed
        assert_eq!(orch.state().success_count, 1);
        assert_eq!(orch.state().direction, Direction::Reverse);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_start_runs_no_leg() {
        let flag = RunFlag::new();
        flag.cancel();
        let mut orch = Orchestrator::new(
            ScriptedClient::default(),
            Arc::new(RunConfig::sample()),
            EventLog::default(),
            flag,
        );
        assert_eq!(orch.run().await, RunEnd::Cancelled);
        assert!(orch.client().legs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_published() {
        let (tx, rx) = watch::channel(RunProgress::default());
        let mut cfg = RunConfig::sample();
        cfg.trade_count = 2;
        let mut orch = orchestrator(ScriptedClient::default(), cfg).with_progress(Arc::new(tx));
        orch.run().await;

        let last = rx.borrow().clone();
        assert!(!last.running);
        assert_eq!(last.success_count, 2);
        assert_eq!(last.target, 2);
        assert_eq!(last.direction, Direction::Forward);
    }
}
