//! Attempt runner: executes one invocation of a task's work and decides
//! whether a failure is retried.
//!
//! Each attempt is spawned onto the runtime and the runner only waits on its
//! join handle. When the timeout fires the handle is dropped, which detaches
//! the attempt: it keeps running in the background and its result is
//! ignored. Work is never assumed to be cancellable.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use tokio::task::JoinError;
use tracing::{debug, trace, warn};

use super::record::TaskRecord;
use crate::error::TaskError;

/// What the scheduler should do after an attempt.
#[derive(Debug)]
pub(crate) enum AttemptOutcome<T, E> {
    Success(T),
    /// Failed, but the retry budget is not used up.
    Retry(TaskError<E>),
    /// Failed for the last time.
    Terminal(TaskError<E>),
}

/// Retry-or-stop for a failure, given the failed attempts counted so far
/// (including this one).
pub(crate) fn classify<T, E>(attempts: u32, retries: u32, error: TaskError<E>) -> AttemptOutcome<T, E> {
    if attempts <= retries {
        AttemptOutcome::Retry(error)
    } else {
        AttemptOutcome::Terminal(error)
    }
}

/// Run one attempt of `work`, bounded by `timeout` if set.
pub(crate) async fn run_attempt<F, Fut, T, E>(
    work: &mut F,
    timeout: Option<Duration>,
) -> Result<T, TaskError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    // A panic while building the future counts as a failed attempt too.
    let fut = panic::catch_unwind(AssertUnwindSafe(&mut *work))
        .map_err(|payload| TaskError::Panicked(panic_message(payload.as_ref())))?;

    let join = tokio::spawn(fut);
    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, join).await {
            Ok(joined) => joined,
            Err(_elapsed) => return Err(TaskError::Timeout(limit)),
        },
        None => join.await,
    };

    match joined {
        Ok(result) => result.map_err(TaskError::Work),
        Err(join_error) => Err(join_failure(join_error)),
    }
}

/// Drive a task through as many attempts as its retry budget allows.
///
/// The caller has already started the record and holds its concurrency slot
/// for the whole call; the slot is not given back between attempts.
pub(crate) async fn run_to_completion<F, Fut, T, E>(
    record: &mut TaskRecord<F>,
) -> Result<T, TaskError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    loop {
        let outcome = match run_attempt(&mut record.work, record.timeout).await {
            Ok(value) => AttemptOutcome::Success(value),
            Err(error) => {
                let attempts = record.record_failure(error.is_timeout());
                classify(attempts, record.retries, error)
            }
        };

        match outcome {
            AttemptOutcome::Success(value) => {
                record.mark_succeeded();
                debug!(task_id = %record.id, failed_attempts = record.attempts, "task succeeded");
                return Ok(value);
            }
            AttemptOutcome::Retry(error) => {
                let delay = record.backoff.next_delay(record.attempts);
                trace!(
                    task_id = %record.id,
                    attempt = record.attempts,
                    retries = record.retries,
                    timed_out = error.is_timeout(),
                    ?delay,
                    "attempt failed, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            AttemptOutcome::Terminal(error) => {
                record.mark_failed();
                warn!(
                    task_id = %record.id,
                    attempts = record.attempts,
                    timed_out = error.is_timeout(),
                    "task failed, retries exhausted"
                );
                return Err(error);
            }
        }
    }
}

fn join_failure<E>(error: JoinError) -> TaskError<E> {
    if error.is_panic() {
        TaskError::Panicked(panic_message(error.into_panic().as_ref()))
    } else {
        TaskError::Abandoned
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskOptions;
    use crate::ids::TaskId;
    use crate::queue::{RetryPolicy, TaskState};
    use rstest::rstest;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn counting_failures(
        calls: Arc<AtomicU32>,
        fail_first: u32,
    ) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<&'static str, String>> + Send>>
    {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Box::pin(async move {
                if n <= fail_first {
                    Err(format!("fail #{n}"))
                } else {
                    Ok("success")
                }
            })
        }
    }

    #[rstest]
    #[case(1, 0, false)]
    #[case(1, 1, true)]
    #[case(2, 2, true)]
    #[case(3, 2, false)]
    fn classify_respects_budget(#[case] attempts: u32, #[case] retries: u32, #[case] retry: bool) {
        let outcome: AttemptOutcome<(), String> =
            classify(attempts, retries, TaskError::Work("e".to_string()));
        match outcome {
            AttemptOutcome::Retry(_) => assert!(retry),
            AttemptOutcome::Terminal(_) => assert!(!retry),
            AttemptOutcome::Success(_) => panic!("a failure never classifies as success"),
        }
    }

    #[tokio::test]
    async fn successful_attempt_returns_value() {
        let mut work = || async { Ok::<_, String>(42) };
        assert_eq!(run_attempt(&mut work, None).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn work_error_is_returned_verbatim() {
        let mut work = || async { Err::<(), _>("nope".to_string()) };
        let err = run_attempt(&mut work, None).await.unwrap_err();
        assert_eq!(err.into_work().as_deref(), Some("nope"));
    }

    #[tokio::test]
    async fn timeout_abandons_without_cancelling() {
        let finished = Arc::new(AtomicU32::new(0));
        let flag = Arc::clone(&finished);
        let mut work = move || {
            let flag = Arc::clone(&flag);
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                flag.store(1, Ordering::SeqCst);
                Ok::<_, String>("late")
            }
        };

        let start = Instant::now();
        let err = run_attempt(&mut work, Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(start.elapsed() < Duration::from_millis(100));

        // The detached attempt still runs to completion.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panic_in_future_is_a_failure() {
        let mut work = || async {
            if true {
                panic!("exploded");
            }
            Ok::<(), String>(())
        };
        let err = run_attempt(&mut work, None).await.unwrap_err();
        assert!(matches!(err, TaskError::Panicked(ref msg) if msg.contains("exploded")));
    }

    #[tokio::test]
    async fn panic_while_building_future_is_a_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let mut work = move || {
            if c.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("sync boom");
            }
            async { Ok::<(), String>(()) }
        };
        let err = run_attempt(&mut work, None).await.unwrap_err();
        assert!(matches!(err, TaskError::Panicked(ref msg) if msg == "sync boom"));
        assert!(run_attempt(&mut work, None).await.is_ok());
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let work = counting_failures(Arc::clone(&calls), 2);
        let mut record = TaskRecord::new(TaskId::new(1), work, TaskOptions::new().retries(2));

        let value = run_to_completion(&mut record).await.unwrap();
        assert_eq!(value, "success");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(record.attempts, 2);
        assert_eq!(record.state, TaskState::Succeeded);
    }

    #[tokio::test]
    async fn start_time_is_left_to_the_scheduler() {
        let calls = Arc::new(AtomicU32::new(0));
        let work = counting_failures(Arc::clone(&calls), 0);
        let mut record = TaskRecord::new(TaskId::new(1), work, TaskOptions::default());

        assert!(run_to_completion(&mut record).await.is_ok());
        assert!(record.started_at.is_none());
    }

    #[tokio::test]
    async fn exhausted_retries_keep_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let work = counting_failures(Arc::clone(&calls), u32::MAX);
        let mut record = TaskRecord::new(TaskId::new(1), work, TaskOptions::new().retries(2));

        let err = run_to_completion(&mut record).await.unwrap_err();
        assert_eq!(err.to_string(), "fail #3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(record.state, TaskState::Failed);
    }

    #[tokio::test]
    async fn no_retries_means_single_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let work = counting_failures(Arc::clone(&calls), 1);
        let mut record = TaskRecord::new(TaskId::new(1), work, TaskOptions::default());

        assert!(run_to_completion(&mut record).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn backoff_delays_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let work = counting_failures(Arc::clone(&calls), 2);
        let opts = TaskOptions::new()
            .retries(2)
            .backoff(RetryPolicy::fixed(Duration::from_millis(30)));
        let mut record = TaskRecord::new(TaskId::new(1), work, opts);

        let start = Instant::now();
        assert!(run_to_completion(&mut record).await.is_ok());
        assert!(start.elapsed() >= Duration::from_millis(60));
    }
}
