//! Tests for the ordered concurrent fan-out runner.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;

use super::ConcurrentRunner;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("target {0} failed")]
struct TargetFailure(String);

#[tokio::test]
async fn results_come_back_in_input_order() {
    let runner = ConcurrentRunner::default();
    let targets = vec!["a", "b", "c"];

    // Later targets finish first; output order must still match input.
    let results: Result<Vec<String>, TargetFailure> = runner
        .run_all(targets, |target| async move {
            let delay = match target {
                "a" => 30,
                "b" => 20,
                _ => 1,
            };
            sleep(Duration::from_millis(delay)).await;
            Ok(format!("{target}!"))
        })
        .await;

    assert_eq!(
        results.ok(),
        Some(vec![
            String::from("a!"),
            String::from("b!"),
            String::from("c!"),
        ])
    );
}

#[tokio::test]
async fn failing_target_lets_peers_run_to_completion() {
    let runner = ConcurrentRunner::default();
    let completed = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&completed);
    let result: Result<Vec<()>, TargetFailure> = runner
        .run_all(vec!["a", "b", "c"], |target| {
            let completed = Arc::clone(&counter);
            async move {
                sleep(Duration::from_millis(1)).await;
                completed.fetch_add(1, Ordering::SeqCst);
                if target == "b" {
                    Err(TargetFailure(target.to_owned()))
                } else {
                    Ok(())
                }
            }
        })
        .await;

    assert_eq!(result, Err(TargetFailure(String::from("b"))));
    assert_eq!(completed.load(Ordering::SeqCst), 3, "all targets must finish");
}

#[tokio::test]
async fn first_failure_in_input_order_is_surfaced() {
    let runner = ConcurrentRunner::default();

    // "c" fails fastest, but "b" precedes it in input order.
    let result: Result<Vec<()>, TargetFailure> = runner
        .run_all(vec!["a", "b", "c"], |target| async move {
            match target {
                "b" => {
                    sleep(Duration::from_millis(20)).await;
                    Err(TargetFailure(target.to_owned()))
                }
                "c" => Err(TargetFailure(target.to_owned())),
                _ => Ok(()),
            }
        })
        .await;

    assert_eq!(result, Err(TargetFailure(String::from("b"))));
}

#[tokio::test]
async fn concurrency_stays_within_the_limit() {
    let limit = NonZeroUsize::new(2).expect("nonzero");
    let runner = ConcurrentRunner::new(limit);
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let flight = Arc::clone(&in_flight);
    let peak_seen = Arc::clone(&peak);
    let result: Result<Vec<()>, TargetFailure> = runner
        .run_all(0..8_u32, |_| {
            let in_flight = Arc::clone(&flight);
            let peak = Arc::clone(&peak_seen);
            async move {
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(current, Ordering::SeqCst);
                sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

    assert!(result.is_ok());
    assert!(peak.load(Ordering::SeqCst) <= 2, "peak: {}", peak.load(Ordering::SeqCst));
}

#[tokio::test]
async fn empty_target_list_yields_empty_results() {
    let runner = ConcurrentRunner::default();
    let results: Result<Vec<()>, TargetFailure> = runner
        .run_all(Vec::<&str>::new(), |_| async { Ok(()) })
        .await;
    assert_eq!(results, Ok(Vec::new()));
}
