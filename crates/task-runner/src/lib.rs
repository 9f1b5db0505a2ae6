//! Result-capturing tasks on dedicated threads.
//!
//! [`CapturingTask`] runs a closure off the calling thread and hands back
//! exactly what the closure produced when the caller joins: the value, the
//! original error, or (if the closure panicked) the original panic, which
//! is resumed on the joining thread.
//!
//! There is no cancellation and no timeout. Once spawned, the work runs to
//! completion and joining always waits for it.
//!
//! ```
//! use task_runner::CapturingTask;
//!
//! let task = CapturingTask::spawn("answer", || Ok::<_, String>(6 * 7)).unwrap();
//! assert_eq!(task.join(), Ok(42));
//! ```

use std::any::Any;
use std::thread::{self, JoinHandle};

type Outcome<T, E> = thread::Result<Result<T, E>>;

/// A unit of work running on its own named thread.
pub struct CapturingTask<T, E> {
    name: String,
    handle: Option<JoinHandle<Result<T, E>>>,
    outcome: Option<Outcome<T, E>>,
    /// Message of a panic already resumed by [`CapturingTask::wait`].
    panic_message: Option<String>,
}

impl<T, E> CapturingTask<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Start `work` on a new thread named `name`.
    ///
    /// Fails only if the OS refuses to create the thread.
    pub fn spawn<F>(name: impl Into<String>, work: F) -> std::io::Result<Self>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let name = name.into();
        let handle = thread::Builder::new().name(name.clone()).spawn(work)?;
        tracing::debug!(task = %name, "Spawned task");
        Ok(Self {
            name,
            handle: Some(handle),
            outcome: None,
            panic_message: None,
        })
    }
}

impl<T, E> CapturingTask<T, E> {
    /// Thread name given at spawn time.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the work has completed (successfully, with an error, or by panicking).
    pub fn is_finished(&self) -> bool {
        match &self.handle {
            Some(handle) => handle.is_finished(),
            None => true,
        }
    }

    /// Block until the work completes and return its outcome as if it had run
    /// on this thread.
    ///
    /// A panic inside the work is resumed here with its original payload.
    pub fn join(mut self) -> Result<T, E> {
        match self.finish() {
            Ok(result) => result,
            Err(payload) => resume(&self.name, payload),
        }
    }

    /// Block on the first call, then return the same outcome on every call.
    ///
    /// A panic inside the work is resumed on the first call with its original
    /// payload. Later calls (and a later [`join`](Self::join)) panic again
    /// with the same message as a `String` payload.
    pub fn wait(&mut self) -> Result<&T, &E> {
        if self.outcome.is_none() {
            let outcome = self.finish();
            self.outcome = Some(outcome);
        }

        if matches!(self.outcome, Some(Err(_))) {
            if let Some(Err(payload)) = self.outcome.take() {
                self.panic_message = Some(panic_message(payload.as_ref()));
                resume(&self.name, payload);
            }
        }

        match &self.outcome {
            Some(Ok(result)) => result.as_ref(),
            _ => self.repeat_panic(),
        }
    }

    fn repeat_panic(&self) -> ! {
        let message = self
            .panic_message
            .clone()
            .unwrap_or_else(|| format!("task '{}' panicked", self.name));
        resume(&self.name, Box::new(message))
    }

    fn finish(&mut self) -> Outcome<T, E> {
        if let Some(outcome) = self.outcome.take() {
            return outcome;
        }
        match self.handle.take() {
            Some(handle) => {
                let outcome = handle.join();
                match &outcome {
                    Ok(Ok(_)) => tracing::debug!(task = %self.name, "Task completed"),
                    Ok(Err(_)) => tracing::debug!(task = %self.name, "Task returned an error"),
                    Err(_) => tracing::warn!(task = %self.name, "Task panicked"),
                }
                outcome
            }
            None => self.repeat_panic(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn resume(name: &str, payload: Box<dyn Any + Send>) -> ! {
    tracing::debug!(task = %name, "Resuming task panic on joining thread");
    std::panic::resume_unwind(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_join_returns_value() {
        let task = CapturingTask::spawn("value", || Ok::<_, String>(vec![1, 2, 3])).unwrap();
        assert_eq!(task.join(), Ok(vec![1, 2, 3]));
    }

    #[test]
    fn test_join_returns_error() {
        let task = CapturingTask::spawn("error", || Err::<(), _>("x".to_string())).unwrap();
        assert_eq!(task.join(), Err("x".to_string()));
    }

    #[test]
    fn test_runs_on_named_thread() {
        let task = CapturingTask::spawn("named-worker", || {
            Ok::<_, ()>(thread::current().name().map(str::to_string))
        })
        .unwrap();
        assert_eq!(task.name(), "named-worker");
        assert_eq!(task.join(), Ok(Some("named-worker".to_string())));
    }

    #[test]
    fn test_wait_is_idempotent() {
        let mut task = CapturingTask::spawn("idem", || Ok::<_, String>(5_u32)).unwrap();
        assert_eq!(task.wait(), Ok(&5));
        assert_eq!(task.wait(), Ok(&5));
        assert!(task.is_finished());
        // join after wait still yields the cached value.
        assert_eq!(task.join(), Ok(5));
    }

    #[test]
    fn test_wait_repeats_error() {
        let mut task = CapturingTask::spawn("idem-err", || Err::<u32, _>("boom".to_string())).unwrap();
        assert_eq!(task.wait(), Err(&"boom".to_string()));
        assert_eq!(task.wait(), Err(&"boom".to_string()));
    }

    #[test]
    fn test_join_waits_for_completion() {
        let (tx, rx) = mpsc::channel::<()>();
        let task = CapturingTask::spawn("gated", move || {
            rx.recv().map_err(|e| e.to_string())?;
            Ok::<_, String>("released")
        })
        .unwrap();

        thread::sleep(Duration::from_millis(20));
        assert!(!task.is_finished());
        tx.send(()).unwrap();
        assert_eq!(task.join(), Ok("released"));
    }

    #[test]
    fn test_panic_resumed_with_original_payload() {
        let task = CapturingTask::spawn("panicky", || -> Result<(), String> {
            panic!("worker exploded");
        })
        .unwrap();

        let payload = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task.join()))
            .unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"worker exploded"));
    }

    #[test]
    fn test_wait_repeats_panic_message() {
        let mut task = CapturingTask::spawn("panicky-wait", || -> Result<(), String> {
            panic!("worker exploded");
        })
        .unwrap();

        let first = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = task.wait();
        }))
        .unwrap_err();
        assert_eq!(first.downcast_ref::<&str>(), Some(&"worker exploded"));

        let second = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = task.wait();
        }))
        .unwrap_err();
        assert_eq!(second.downcast_ref::<String>().map(String::as_str), Some("worker exploded"));

        let joined = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task.join())).unwrap_err();
        assert_eq!(joined.downcast_ref::<String>().map(String::as_str), Some("worker exploded"));
    }

    #[test]
    fn test_formatted_panic_message_is_kept() {
        let mut task = CapturingTask::spawn("formatted", || -> Result<(), String> {
            panic!("record {} failed", 7);
        })
        .unwrap();
        for _ in 0..2 {
            let payload = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let _ = task.wait();
            }))
            .unwrap_err();
            assert_eq!(payload.downcast_ref::<String>().map(String::as_str), Some("record 7 failed"));
        }
    }
}
