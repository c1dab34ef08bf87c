use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use demoseed_core::{RetryPolicy, Retryable, retry};
use thiserror::Error;

#[derive(Debug, Error)]
enum FakeError {
    #[error("temporarily unavailable")]
    Transient,
    #[error("bad credentials")]
    Auth,
}

impl Retryable for FakeError {
    fn is_retryable(&self) -> bool {
        matches!(self, FakeError::Transient)
    }
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    fn retry_warnings(&self) -> usize {
        let content = String::from_utf8(self.0.lock().unwrap().clone()).unwrap();
        content.matches("call failed, retrying").count()
    }
}

fn capture() -> (SharedBuf, tracing::subscriber::DefaultGuard) {
    let buf = SharedBuf::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buf, guard)
}

#[tokio::test]
async fn always_failing_call_is_attempted_exactly_three_times() {
    let (logs, _guard) = capture();
    let counter = AtomicU32::new(0);
    let calls = &counter;

    let result: Result<(), _> = retry(&RetryPolicy::immediate(3), "llm.complete", || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(FakeError::Transient)
    })
    .await;

    let err = result.unwrap_err();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(err.attempts, 3);
    assert!(err.exhausted);
    assert!(matches!(err.into_inner(), FakeError::Transient));
    assert_eq!(logs.retry_warnings(), 2);
}

#[tokio::test]
async fn first_try_success_logs_nothing() {
    let (logs, _guard) = capture();

    let value = retry(&RetryPolicy::immediate(3), "remote.search", || async {
        Ok::<_, FakeError>(42)
    })
    .await
    .unwrap();

    assert_eq!(value, 42);
    assert_eq!(logs.retry_warnings(), 0);
}

#[tokio::test]
async fn recovers_after_transient_failure() {
    let (logs, _guard) = capture();
    let counter = AtomicU32::new(0);
    let calls = &counter;

    let value = retry(&RetryPolicy::immediate(3), "remote.create", || async move {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(FakeError::Transient)
        } else {
            Ok("created")
        }
    })
    .await
    .unwrap();

    assert_eq!(value, "created");
    assert_eq!(logs.retry_warnings(), 1);
}

#[tokio::test]
async fn non_retryable_error_surfaces_immediately() {
    let counter = AtomicU32::new(0);
    let calls = &counter;

    let err = retry(&RetryPolicy::immediate(3), "remote.login", || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err::<(), _>(FakeError::Auth)
    })
    .await
    .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!err.exhausted);
    assert!(err.to_string().contains("bad credentials"));
}
