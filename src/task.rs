//! Cancellable, progress-reporting background tasks
//!
//! A [`Task`] is the only thing shared between a worker thread and the side
//! that started it. The worker reports phase, detail, and percent, and checks
//! [`Task::is_aborted`] at its checkpoints; observers poll [`Task::status`]
//! or register a listener with [`Task::on_progress`], and may call
//! [`Task::abort`].

use crate::error::NotebookError;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Running,
    /// Finished after an abort request.
    Aborted,
    Finished,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Aborted | TaskState::Finished)
    }
}

/// Phase and/or detail update. Fields left `None` are not changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskMessage {
    pub phase: Option<String>,
    pub detail: Option<String>,
}

impl TaskMessage {
    pub fn phase(phase: impl Into<String>) -> Self {
        Self {
            phase: Some(phase.into()),
            detail: None,
        }
    }

    pub fn detail(detail: impl Into<String>) -> Self {
        Self {
            phase: None,
            detail: Some(detail.into()),
        }
    }

    pub fn both(phase: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            phase: Some(phase.into()),
            detail: Some(detail.into()),
        }
    }
}

/// Failure captured on the worker side for the observer to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// Short type name of the error.
    pub kind: String,
    pub message: String,
    /// Messages of the `source()` chain, outermost first.
    pub causes: Vec<String>,
}

impl TaskFailure {
    pub fn from_error<E: std::error::Error>(err: &E) -> Self {
        let kind = std::any::type_name::<E>()
            .rsplit("::")
            .next()
            .unwrap_or("Error")
            .to_string();
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self {
            kind,
            message: err.to_string(),
            causes,
        }
    }

    fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self {
            kind: "panic".to_string(),
            message: panic_message(payload),
            causes: Vec::new(),
        }
    }
}

/// Snapshot of a task as seen by an observer.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatus {
    pub state: TaskState,
    pub phase: String,
    pub detail: String,
    /// Fraction done, in `[0, 1]`.
    pub percent: f64,
    pub aborted: bool,
    pub failure: Option<TaskFailure>,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self {
            state: TaskState::Created,
            phase: String::new(),
            detail: String::new(),
            percent: 0.0,
            aborted: false,
            failure: None,
        }
    }
}

type ProgressListener = Box<dyn Fn(&TaskStatus) + Send + Sync>;

#[derive(Default)]
struct Listeners(RwLock<Vec<ProgressListener>>);

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listeners({})", self.0.read().len())
    }
}

#[derive(Debug, Default)]
struct Shared {
    status: RwLock<TaskStatus>,
    abort: AtomicBool,
    listeners: Listeners,
}

/// Shared progress record for one background operation
#[derive(Debug, Clone, Default)]
pub struct Task {
    shared: Arc<Shared>,
}

impl Task {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move from created to running. Returns false if the task already started.
    pub fn start(&self) -> bool {
        let mut status = self.shared.status.write();
        if status.state != TaskState::Created {
            return false;
        }
        status.state = TaskState::Running;
        true
    }

    fn accepts_progress(&self, status: &TaskStatus) -> bool {
        status.state == TaskState::Running && !self.is_aborted()
    }

    pub fn set_message(&self, message: TaskMessage) {
        let mut status = self.shared.status.write();
        if !self.accepts_progress(&status) {
            return;
        }
        if let Some(phase) = message.phase {
            status.phase = phase;
        }
        if let Some(detail) = message.detail {
            status.detail = detail;
        }
    }

    /// Report progress; values are clamped to `[0, 1]` and NaN counts as 0.
    pub fn set_percent(&self, percent: f64) {
        let percent = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 1.0)
        };
        let snapshot = {
            let mut status = self.shared.status.write();
            if !self.accepts_progress(&status) {
                return;
            }
            status.percent = percent;
            status.clone()
        };
        for listener in self.shared.listeners.0.read().iter() {
            listener(&snapshot);
        }
    }

    /// Call `listener` on the worker thread after every accepted percent
    /// update. Listeners may abort the task but must not register others.
    pub fn on_progress<F>(&self, listener: F)
    where
        F: Fn(&TaskStatus) + Send + Sync + 'static,
    {
        self.shared.listeners.0.write().push(Box::new(listener));
    }

    /// Request cooperative cancellation.
    pub fn abort(&self) {
        if !self.shared.abort.swap(true, Ordering::SeqCst) {
            debug!("Task abort requested");
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.shared.abort.load(Ordering::SeqCst)
    }

    /// Enter the terminal state. Only the first call has an effect.
    pub fn finish(&self) -> bool {
        let mut status = self.shared.status.write();
        if status.state.is_terminal() {
            return false;
        }
        status.state = if self.is_aborted() {
            TaskState::Aborted
        } else {
            TaskState::Finished
        };
        true
    }

    /// Record a failure unless one is already recorded or the task is done.
    pub fn fail<E: std::error::Error>(&self, err: &E) {
        self.record_failure(TaskFailure::from_error(err));
    }

    fn record_failure(&self, failure: TaskFailure) {
        let mut status = self.shared.status.write();
        if status.state.is_terminal() || status.failure.is_some() {
            return;
        }
        status.failure = Some(failure);
    }

    /// The failure captured by the worker, if any.
    pub fn exc_info(&self) -> Option<TaskFailure> {
        self.shared.status.read().failure.clone()
    }

    pub fn state(&self) -> TaskState {
        self.shared.status.read().state
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn status(&self) -> TaskStatus {
        let mut status = self.shared.status.read().clone();
        status.aborted = self.is_aborted();
        status
    }

    /// Run `work` on a named worker thread.
    ///
    /// The task is started before `work` runs; a returned error is recorded
    /// with [`Task::fail`], and the task is finished on every exit path,
    /// panics included.
    pub fn spawn<T, F>(&self, name: &str, work: F) -> Result<TaskHandle<T>, NotebookError>
    where
        T: Send + 'static,
        F: FnOnce(&Task) -> Result<T, NotebookError> + Send + 'static,
    {
        let worker = self.clone();
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let guard = FinishGuard { task: &worker };
                worker.start();
                let result = work(guard.task);
                if let Err(e) = &result {
                    guard.task.fail(e);
                }
                result
            })
            .map_err(|e| NotebookError::wrap(format!("Could not start {} worker", name), e))?;

        Ok(TaskHandle {
            name: name.to_string(),
            task: self.clone(),
            join,
        })
    }
}

/// Finishes the task when the worker closure exits, unwinding or not.
struct FinishGuard<'a> {
    task: &'a Task,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.task.record_failure(TaskFailure {
                kind: "panic".to_string(),
                message: "worker panicked".to_string(),
                causes: Vec::new(),
            });
        }
        self.task.finish();
    }
}

/// What a [`TaskHandle::wait`] observer wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitAction {
    Continue,
    Abort,
}

/// Handle to a running worker
pub struct TaskHandle<T> {
    name: String,
    task: Task,
    join: JoinHandle<Result<T, NotebookError>>,
}

impl<T> TaskHandle<T> {
    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Poll the task every `interval` until the worker exits.
    ///
    /// `observer` sees each status snapshot, the final one included, and may
    /// ask for the task to be aborted.
    pub fn wait<F>(self, interval: Duration, mut observer: F) -> Result<T, NotebookError>
    where
        F: FnMut(&TaskStatus) -> WaitAction,
    {
        while !self.join.is_finished() {
            if observer(&self.task.status()) == WaitAction::Abort {
                self.task.abort();
            }
            thread::sleep(interval);
        }
        observer(&self.task.status());
        self.join()
    }

    /// Block until the worker exits and return its result.
    pub fn join(self) -> Result<T, NotebookError> {
        match self.join.join() {
            Ok(result) => result,
            Err(payload) => {
                let failure = TaskFailure::from_panic(payload.as_ref());
                warn!(task = %self.name, message = %failure.message, "Task worker panicked");
                Err(NotebookError::failed(format!(
                    "{} worker panicked: {}",
                    self.name, failure.message
                )))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_progress_only_while_running() {
        let task = Task::new();
        task.set_percent(0.5);
        task.set_message(TaskMessage::phase("early"));
        assert_eq!(task.status().percent, 0.0);
        assert_eq!(task.status().phase, "");

        assert!(task.start());
        assert!(!task.start());
        task.set_message(TaskMessage::both("Archiving...", "a.txt"));
        task.set_message(TaskMessage::detail("b.txt"));
        task.set_percent(0.25);

        let status = task.status();
        assert_eq!(status.state, TaskState::Running);
        assert_eq!(status.phase, "Archiving...");
        assert_eq!(status.detail, "b.txt");
        assert_eq!(status.percent, 0.25);
    }

    #[test]
    fn test_percent_is_clamped() {
        let task = Task::new();
        task.start();
        task.set_percent(1.7);
        assert_eq!(task.status().percent, 1.0);
        task.set_percent(-3.0);
        assert_eq!(task.status().percent, 0.0);
        task.set_percent(f64::NAN);
        assert_eq!(task.status().percent, 0.0);
    }

    #[test]
    fn test_abort_freezes_progress_and_finish_once() {
        let task = Task::new();
        task.start();
        task.set_percent(0.3);
        task.abort();
        assert!(task.is_aborted());
        task.set_percent(0.9);
        assert_eq!(task.status().percent, 0.3);
        assert!(task.status().aborted);

        assert!(task.finish());
        assert!(!task.finish());
        assert_eq!(task.state(), TaskState::Aborted);
    }

    #[test]
    fn test_listeners_see_accepted_updates_only() {
        let task = Task::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let aborter = task.clone();
        task.on_progress(move |status| {
            sink.lock().push(status.percent);
            if status.percent >= 0.5 {
                aborter.abort();
            }
        });

        task.set_percent(0.1);
        task.start();
        task.set_percent(0.25);
        task.set_percent(0.5);
        task.set_percent(0.75);
        assert_eq!(*seen.lock(), vec![0.25, 0.5]);
        assert!(task.is_aborted());
    }

    #[test]
    fn test_fail_keeps_first_failure_and_causes() {
        let task = Task::new();
        task.start();
        let err = NotebookError::wrap(
            "Could not save notebook before archiving",
            io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
        );
        task.fail(&err);
        task.fail(&NotebookError::failed("second"));

        let info = task.exc_info().unwrap();
        assert_eq!(info.kind, "NotebookError");
        assert_eq!(info.message, "Could not save notebook before archiving");
        assert_eq!(info.causes, vec!["read-only".to_string()]);
    }

    #[test]
    fn test_spawn_runs_and_finishes() {
        let task = Task::new();
        let handle = task
            .spawn("adder", |task| {
                task.set_percent(1.0);
                Ok(42)
            })
            .unwrap();
        assert_eq!(handle.join().unwrap(), 42);
        assert_eq!(task.state(), TaskState::Finished);
        assert_eq!(task.status().percent, 1.0);
    }

    #[test]
    fn test_spawn_records_errors_and_panics() {
        let task = Task::new();
        let handle = task
            .spawn("failing", |_| -> Result<(), NotebookError> {
                Err(NotebookError::failed("boom"))
            })
            .unwrap();
        assert!(handle.join().is_err());
        assert_eq!(task.exc_info().unwrap().message, "boom");
        assert!(task.is_finished());

        let task = Task::new();
        let handle = task
            .spawn("panicking", |_| -> Result<(), NotebookError> {
                panic!("kaboom")
            })
            .unwrap();
        let err = handle.join().unwrap_err();
        assert!(err.to_string().contains("kaboom"));
        assert_eq!(task.exc_info().unwrap().kind, "panic");
        assert!(task.is_finished());
    }

    #[test]
    fn test_wait_observer_can_abort() {
        let task = Task::new();
        let handle: TaskHandle<()> = task
            .spawn("looping", |task| {
                while !task.is_aborted() {
                    thread::sleep(Duration::from_millis(1));
                }
                Err(NotebookError::canceled("Backup"))
            })
            .unwrap();

        let mut polls = 0;
        let result = handle.wait(Duration::from_millis(2), |_| {
            polls += 1;
            if polls >= 3 {
                WaitAction::Abort
            } else {
                WaitAction::Continue
            }
        });
        assert!(result.unwrap_err().is_canceled());
        assert!(polls >= 3);
        assert_eq!(task.state(), TaskState::Aborted);
    }
}
