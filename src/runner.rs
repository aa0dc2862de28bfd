use std::sync::{Condvar, Mutex, mpsc};

pub(crate) type Task = Box<dyn FnOnce() + Send>;

/// A named background worker processing queued tasks one at a time. Network
/// and filesystem work runs here; nothing interactive ever does.
pub(crate) struct Worker {
    sender: Option<mpsc::Sender<Task>>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn new(name: &str) -> Self {
        let (sender, receiver) = mpsc::channel::<Task>();
        let join = std::thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                while let Ok(task) = receiver.recv() {
                    task();
                }
            })
            .expect("failed to spawn thread");

        Self {
            sender: Some(sender),
            join: Some(join),
        }
    }

    pub(crate) fn submit(&self, task: Task) {
        self.sender
            .as_ref()
            .expect("worker already shut down")
            .send(task)
            .expect("worker thread gone");
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(join) = self.join.take() {
            join.join().expect("worker thread panicked");
        }
    }
}

/// Marshals a closure onto the interaction context and blocks until it has
/// run. Human decisions are serialized through this, one at a time.
pub(crate) trait InteractionHost: Send + Sync {
    fn run_interaction(&self, f: &mut (dyn FnMut() + Send));
}

/// Runs interaction closures inline on the calling thread. The console
/// front-end needs no marshaling; a GUI host would post to its event loop
/// instead.
pub(crate) struct DirectHost;

impl InteractionHost for DirectHost {
    fn run_interaction(&self, f: &mut (dyn FnMut() + Send)) {
        f();
    }
}

struct TrackerState {
    pending: usize,
    finished: bool,
}

/// A single counting wait primitive covering both outstanding background
/// tasks and the pipeline's own completion signal. `finish` is idempotent;
/// releasing waiters twice is impossible by construction.
pub(crate) struct CompletionTracker {
    state: Mutex<TrackerState>,
    condvar: Condvar,
}

impl CompletionTracker {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState {
                pending: 0,
                finished: false,
            }),
            condvar: Condvar::new(),
        }
    }

    pub(crate) fn task_started(&self) {
        self.state.lock().unwrap().pending += 1;
    }

    pub(crate) fn task_finished(&self) {
        let mut state = self.state.lock().unwrap();
        state.pending = state
            .pending
            .checked_sub(1)
            .expect("task_finished without task_started");
        if state.pending == 0 {
            self.condvar.notify_all();
        }
    }

    /// Marks the pipeline itself as complete. Returns whether this call was
    /// the one that completed it; later calls change nothing.
    pub(crate) fn finish(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.finished {
            false
        } else {
            state.finished = true;
            self.condvar.notify_all();
            true
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.state.lock().unwrap().finished
    }

    /// Blocks until the pipeline has signaled completion and no background
    /// task is still in flight.
    pub(crate) fn wait(&self) {
        let mut state = self.state.lock().unwrap();
        while !(state.finished && state.pending == 0) {
            state = self.condvar.wait(state).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{CompletionTracker, Worker};

    #[test]
    fn test_worker_runs_tasks_in_order() {
        let worker = Worker::new("test worker");
        let counter = Arc::new(AtomicUsize::new(0));
        for i in 0..10 {
            let counter = counter.clone();
            worker.submit(Box::new(move || {
                // Strictly sequential: the counter must equal the submit
                // index when the task runs.
                assert_eq!(counter.swap(i + 1, Ordering::SeqCst), i);
            }));
        }
        drop(worker);
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_wait_covers_tasks_and_completion() {
        let tracker = Arc::new(CompletionTracker::new());
        let worker = Worker::new("test worker");

        tracker.task_started();
        let tracker_clone = tracker.clone();
        worker.submit(Box::new(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            tracker_clone.finish();
            tracker_clone.task_finished();
        }));

        tracker.wait();
        assert!(tracker.is_finished());
    }

    #[test]
    fn test_finish_is_idempotent() {
        let tracker = CompletionTracker::new();
        assert!(tracker.finish());
        assert!(!tracker.finish());
        tracker.wait();
        // A second wait after completion returns immediately as well.
        tracker.wait();
    }
}
