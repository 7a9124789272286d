//! Bounded concurrent fan-out of generation units.
//!
//! Runs one future per unit with at most `workers` in flight and collects the
//! results in completion order. A failing unit is recorded and skipped; its
//! siblings keep running. There is no cancellation: every submitted unit runs
//! to completion (or to the end of its own bounded retry loops).

use futures::stream::{self, StreamExt};
use std::fmt::Display;
use std::future::Future;
use tracing::warn;

/// A unit that produced no output.
#[derive(Debug, Clone)]
pub struct UnitFailure {
    pub unit_id: String,
    pub error: String,
}

/// Outcome of one fan-out phase.
#[derive(Debug)]
pub struct FanOutReport<T> {
    /// Successful results, in completion order.
    pub completed: Vec<T>,
    pub failures: Vec<UnitFailure>,
}

/// Run `task` over every unit with at most `workers` concurrent tasks.
///
/// `unit_id` names each unit for failure reporting; it is evaluated before
/// the unit is handed to `task`.
pub async fn fan_out<U, T, E, Id, F, Fut>(
    phase: &str,
    units: Vec<U>,
    workers: usize,
    unit_id: Id,
    task: F,
) -> FanOutReport<T>
where
    Id: Fn(&U) -> String,
    F: Fn(U) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let results: Vec<(String, Result<T, E>)> = stream::iter(units)
        .map(|unit| {
            let id = unit_id(&unit);
            let fut = task(unit);
            async move { (id, fut.await) }
        })
        .buffer_unordered(workers.max(1))
        .collect()
        .await;

    let mut report = FanOutReport {
        completed: Vec::with_capacity(results.len()),
        failures: Vec::new(),
    };

    for (id, result) in results {
        match result {
            Ok(value) => report.completed.push(value),
            Err(e) => {
                warn!(phase, unit = %id, "generation unit failed: {}", e);
                report.failures.push(UnitFailure {
                    unit_id: id,
                    error: e.to_string(),
                });
            }
        }
    }

    report
}
