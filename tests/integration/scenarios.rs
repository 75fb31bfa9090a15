//! End-to-end run scenarios on tokio's paused clock.

use secrecy::SecretString;
use solana_sdk::signature::{Keypair, Signer};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pingpong::config::{AppConfig, ConfigError, ConfirmationPolicy, RunConfig};
use pingpong::engine::{RunController, SwapExecutor};
use pingpong::tokens::{TokenRegistry, SOL_MINT, USDC_MINT};
use pingpong::types::{Direction, LogKind, RunEnd};

use crate::mock_client::{FixedQuoteApi, MockClient, StalledLedger};

fn config(trade_count: u32) -> RunConfig {
    RunConfig {
        trade_count,
        ..RunConfig::sample()
    }
}

#[tokio::test(start_paused = true)]
async fn test_three_trade_run_alternates() {
    let controller = RunController::default();
    let client = MockClient::new();

    controller
        .start_with_client(Arc::new(config(3)), client.clone())
        .await
        .unwrap();
    assert_eq!(controller.wait().await, Some(RunEnd::Completed));

    let calls = client.calls();
    let dirs: Vec<_> = calls.iter().map(|c| c.leg.direction).collect();
    assert_eq!(
        dirs,
        vec![Direction::Forward, Direction::Reverse, Direction::Forward]
    );

    // Forward legs sell SOL, the Reverse leg sells exactly what came back
    assert_eq!(calls[0].request.input_mint, SOL_MINT);
    assert_eq!(calls[1].request.input_mint, USDC_MINT);
    assert_eq!(calls[1].request.output_mint, SOL_MINT);
    assert_eq!(calls[1].leg.amount_ui, calls[0].leg.amount_ui * client.ratio());

    for call in [&calls[0], &calls[2]] {
        assert!((0.01..=0.012).contains(&call.leg.amount_ui));
    }

    let events = controller.events();
    assert_eq!(events.count(LogKind::Settled), 3);
    assert_eq!(events.count(LogKind::Error), 0);

    let progress = controller.progress();
    assert_eq!(progress.success_count, 3);
    assert!(!progress.running);
}

#[tokio::test(start_paused = true)]
async fn test_failed_reverse_restarts_forward_after_delay() {
    let controller = RunController::default();
    let client = MockClient::failing_on(&[2]);

    controller
        .start_with_client(Arc::new(config(3)), client.clone())
        .await
        .unwrap();
    assert_eq!(controller.wait().await, Some(RunEnd::Completed));

    let calls = client.calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[1].leg.direction, Direction::Reverse);
    assert_eq!(calls[2].leg.direction, Direction::Forward);
    assert_eq!(calls[2].request.input_mint, SOL_MINT);
    assert!((0.01..=0.012).contains(&calls[2].leg.amount_ui));

    let gap = calls[2].at - calls[1].at;
    assert!(gap >= Duration::from_millis(3_000), "gap was {gap:?}");
    assert!(gap < Duration::from_millis(3_100), "gap was {gap:?}");

    assert_eq!(controller.progress().success_count, 3);
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_leg_still_counts() {
    let keypair = Keypair::new();
    let submitted = Arc::new(Mutex::new(0));
    let executor = SwapExecutor::new(
        FixedQuoteApi {
            out_amount_base: 1_500_000,
            payer: keypair.pubkey(),
        },
        StalledLedger {
            submitted: submitted.clone(),
        },
        keypair,
        TokenRegistry::with_defaults(),
        Duration::from_secs(10),
    );

    let controller = RunController::default();
    controller
        .start_with_client(Arc::new(config(2)), executor)
        .await
        .unwrap();
    assert_eq!(controller.wait().await, Some(RunEnd::Completed));

    assert_eq!(*submitted.lock().unwrap(), 2);
    let events = controller.events();
    assert_eq!(events.count(LogKind::Success), 2);
    assert_eq!(events.count(LogKind::Settled), 0);

    let errors = events.history(Some(LogKind::Error), 10);
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| e.message.contains("timed out")));

    let progress = controller.progress();
    assert_eq!(progress.success_count, 2);
    assert_eq!(progress.direction, Direction::Forward);
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_leg_strict_policy_hits_cap() {
    let keypair = Keypair::new();
    let executor = SwapExecutor::new(
        FixedQuoteApi {
            out_amount_base: 1_500_000,
            payer: keypair.pubkey(),
        },
        StalledLedger {
            submitted: Arc::new(Mutex::new(0)),
        },
        keypair,
        TokenRegistry::with_defaults(),
        Duration::from_secs(10),
    );

    let mut cfg = config(2);
    cfg.policy.confirmation = ConfirmationPolicy::Strict;
    cfg.policy.max_consecutive_failures = Some(2);

    let controller = RunController::default();
    controller
        .start_with_client(Arc::new(cfg), executor)
        .await
        .unwrap();
    assert_eq!(controller.wait().await, Some(RunEnd::FailureLimit));

    let progress = controller.progress();
    assert_eq!(progress.success_count, 0);
    assert_eq!(progress.consecutive_failures, 2);
    assert_eq!(progress.direction, Direction::Forward);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_further_legs() {
    let controller = RunController::default();
    let client = MockClient::new();
    let mut cfg = config(100);
    cfg.min_interval_ms = 60_000;
    cfg.max_interval_ms = 60_000;

    let mut rx = controller.subscribe();
    controller
        .start_with_client(Arc::new(cfg), client.clone())
        .await
        .unwrap();

    loop {
        let event = rx.recv().await.unwrap();
        if event.kind == LogKind::Settled {
            break;
        }
    }
    controller.cancel_run().await;
    controller.cancel_run().await;

    assert_eq!(controller.wait().await, Some(RunEnd::Cancelled));
    assert_eq!(client.calls().len(), 1);
    assert_eq!(controller.progress().success_count, 1);
}

#[tokio::test]
async fn test_malformed_credential_is_fatal() {
    let controller = RunController::default();
    let mut cfg = config(3);
    cfg.private_key = SecretString::new("not a key".into());

    controller.start_run(Arc::new(cfg)).await.unwrap();
    let end = controller.wait().await.unwrap();
    assert!(matches!(end, RunEnd::Fatal(_)));

    let errors = controller.events().history(Some(LogKind::Error), 10);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("Invalid private key"));
    assert_eq!(controller.events().count(LogKind::Success), 0);
}

#[test]
fn test_run_config_from_toml_and_env() {
    let toml = r#"
        [run]
        rpc_url = "https://rpc.example.com"
        private_key_env = "PINGPONG_IT_PRIVATE_KEY"
        input_mint = "So11111111111111111111111111111111111111112"
        output_mint = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"
        min_amount = 0.01
        max_amount = 0.012
        trade_count = 4
        min_interval_ms = 5000
        max_interval_ms = 7500
        slippage_pct = 1.0
        priority_fee_sol = 0.0002
    "#;
    let app = AppConfig::parse(toml).unwrap();

    let err = app.run_config().unwrap_err();
    assert_eq!(
        err.downcast_ref::<ConfigError>(),
        Some(&ConfigError::MissingPrivateKey)
    );

    std::env::set_var("PINGPONG_IT_PRIVATE_KEY", "some-key");
    let cfg = app.run_config().unwrap();
    assert_eq!(cfg.trade_count, 4);
    assert_eq!(cfg.slippage_bps(), 100);
    assert_eq!(cfg.priority_fee_lamports(), 200_000);
}
