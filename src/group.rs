use crate::cancel::CancelToken;
use crate::error::{Result, ValveError};
use log::debug;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Runs producer, worker and consumer tasks on their own threads
///
/// All tasks share one cancellation token. The first task to fail records its
/// error and cancels the token so that its siblings wind down; `wait` joins
/// everything and returns that first error.
pub struct TaskGroup {
    token: CancelToken,
    handles: Vec<JoinHandle<()>>,
    first_error: Arc<Mutex<Option<ValveError>>>,
}

impl TaskGroup {
    /// Create a group whose token is a child of `parent`
    pub fn new(parent: &CancelToken) -> Self {
        Self {
            token: parent.child(),
            handles: Vec::new(),
            first_error: Arc::new(Mutex::new(None)),
        }
    }

    /// The token shared by every task in the group
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Spawn a named task; it receives the group's token
    pub fn spawn<F>(&mut self, name: impl Into<String>, task: F) -> Result<()>
    where
        F: FnOnce(CancelToken) -> Result<()> + Send + 'static,
    {
        let name = name.into();
        let token = self.token.clone();
        let first_error = Arc::clone(&self.first_error);
        let task_name = name.clone();

        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| task(token.clone())))
                    .unwrap_or_else(|_| {
                        Err(ValveError::Thread(format!("task {task_name} panicked")))
                    });
                if let Err(err) = result {
                    debug!("Task {} finished with error: {}", task_name, err);
                    first_error.lock().get_or_insert(err);
                    token.cancel();
                }
            })
            .map_err(|e| ValveError::Thread(e.to_string()))?;

        self.handles.push(handle);
        Ok(())
    }

    /// Cancel every task in the group
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for all tasks and return the first error, if any
    pub fn wait(self) -> Result<()> {
        for handle in self.handles {
            if handle.join().is_err() {
                return Err(ValveError::Thread("Join failed".into()));
            }
        }
        match self.first_error.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_all_tasks_succeed() {
        let mut group = TaskGroup::new(&CancelToken::new());
        for i in 0..3 {
            group.spawn(format!("task-{i}"), |_| Ok(())).unwrap();
        }
        assert_eq!(group.wait(), Ok(()));
    }

    #[test]
    fn test_first_error_cancels_siblings() {
        let mut group = TaskGroup::new(&CancelToken::new());
        group
            .spawn("waiter", |token| {
                let _ = token.done().recv();
                Err(token.error().unwrap_or(ValveError::Cancelled))
            })
            .unwrap();
        group
            .spawn("failer", |_| {
                std::thread::sleep(Duration::from_millis(20));
                Err(ValveError::UnableToEnqueue)
            })
            .unwrap();

        assert_eq!(group.wait(), Err(ValveError::UnableToEnqueue));
    }

    #[test]
    fn test_panic_becomes_error() {
        let mut group = TaskGroup::new(&CancelToken::new());
        group.spawn("panicker", |_| panic!("boom")).unwrap();
        assert!(matches!(group.wait(), Err(ValveError::Thread(_))));
    }

    #[test]
    fn test_parent_cancel_reaches_tasks() {
        let parent = CancelToken::new();
        let mut group = TaskGroup::new(&parent);
        group
            .spawn("waiter", |token| {
                let _ = token.done().recv();
                Err(ValveError::Cancelled)
            })
            .unwrap();
        parent.cancel();
        assert_eq!(group.wait(), Err(ValveError::Cancelled));
    }
}
