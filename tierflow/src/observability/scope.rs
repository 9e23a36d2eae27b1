//! Scoped step execution.
//!
//! Every pipeline step and every Quality Gate call runs inside a
//! [`StepScope`], so timing and start/end/error logging come from one place.

use std::fmt::Display;
use std::future::Future;
use tracing::{error, info, info_span, Instrument, Span};

use super::SpanTimer;

/// A running step: entered once, exited once with the step's result.
#[derive(Debug)]
pub struct StepScope {
    timer: SpanTimer,
    span: Span,
}

impl StepScope {
    /// Starts timing `name` and logs entry.
    #[must_use]
    pub fn enter(name: &str) -> Self {
        let span = info_span!("step", step = name);
        span.in_scope(|| info!(step = name, "Starting {name}"));
        Self {
            timer: SpanTimer::start(name),
            span,
        }
    }

    /// The step name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.timer.name()
    }

    /// Milliseconds since [`StepScope::enter`].
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.timer.elapsed_ms()
    }

    /// The tracing span covering the step body.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Logs the outcome and hands `result` back untouched.
    pub fn exit<T, E: Display>(self, result: Result<T, E>) -> Result<T, E> {
        let _guard = self.span.enter();
        let name = self.timer.name();
        let elapsed_ms = self.timer.elapsed_ms();
        match &result {
            Ok(_) => info!(step = name, elapsed_ms, "Completed {name} in {elapsed_ms:.2}ms"),
            Err(err) => error!(
                step = name,
                elapsed_ms,
                error = %err,
                "Failed {name} after {elapsed_ms:.2}ms: {err}"
            ),
        }
        result
    }
}

/// Runs an async step body inside a [`StepScope`].
///
/// # Errors
///
/// Returns whatever error `body` returns, unchanged.
pub async fn run_step<T, E, F, Fut>(name: &str, body: F) -> Result<T, E>
where
    E: Display,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let scope = StepScope::enter(name);
    let result = body().instrument(scope.span().clone()).await;
    scope.exit(result)
}

/// Runs a synchronous step body inside a [`StepScope`].
///
/// # Errors
///
/// Returns whatever error `body` returns, unchanged.
pub fn run_step_blocking<T, E, F>(name: &str, body: F) -> Result<T, E>
where
    E: Display,
    F: FnOnce() -> Result<T, E>,
{
    let scope = StepScope::enter(name);
    let result = scope.span().in_scope(body);
    scope.exit(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocking_passes_value_through() {
        let value: Result<u32, String> = run_step_blocking("Answer", || Ok(42));
        assert_eq!(value, Ok(42));
    }

    #[test]
    fn test_blocking_returns_error_unchanged() {
        let value: Result<u32, String> = run_step_blocking("Broken", || Err("boom".to_string()));
        assert_eq!(value, Err("boom".to_string()));
    }

    #[tokio::test]
    async fn test_async_step_runs_body_once() {
        let mut calls = 0;
        let result: Result<&str, String> = run_step("Async", || {
            calls += 1;
            async { Ok("done") }
        })
        .await;
        assert_eq!(result, Ok("done"));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_async_step_error_passes_through() {
        let result: Result<(), String> =
            tokio_test::block_on(run_step("Failing", || async { Err("bad input".to_string()) }));
        assert_eq!(result, Err("bad input".to_string()));
    }

    #[test]
    fn test_scope_measures_time() {
        let scope = StepScope::enter("Sleepy");
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(scope.elapsed_ms() >= 5.0);
        assert_eq!(scope.name(), "Sleepy");
        let _: Result<(), String> = scope.exit(Ok(()));
    }
}
