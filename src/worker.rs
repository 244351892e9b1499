use crate::{GazeError, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Stop request observed by a feed thread.
///
/// Nothing is ever sent on the channel; the owner drops its sender to stop,
/// which wakes any pending [`StopSignal::wait`] at once.
pub(crate) struct StopSignal(Receiver<()>);

impl StopSignal {
    pub fn is_raised(&self) -> bool {
        !matches!(self.0.try_recv(), Err(TryRecvError::Empty))
    }

    /// Sleep up to `timeout`. Returns true if stop was requested meanwhile.
    pub fn wait(&self, timeout: Duration) -> bool {
        !matches!(self.0.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
    }
}

enum WorkerState {
    Idle,
    Running {
        stop_tx: Sender<()>,
        thread: JoinHandle<()>,
    },
    Stopped,
}

/// Lifecycle of the single background thread a tracker owns.
///
/// Idle -> Running -> Stopped. A tracker cannot be restarted.
pub(crate) struct FeedWorker {
    state: WorkerState,
}

impl FeedWorker {
    pub fn new() -> Self {
        Self {
            state: WorkerState::Idle,
        }
    }

    pub fn spawn<F>(&mut self, name: &str, body: F) -> Result<()>
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        match self.state {
            WorkerState::Idle => {}
            WorkerState::Running { .. } => return Err(GazeError::AlreadyStarted),
            WorkerState::Stopped => return Err(GazeError::Stopped),
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
        let thread = std::thread::Builder::new()
            .name(name.into())
            .spawn(move || body(StopSignal(stop_rx)))
            .map_err(|e| GazeError::ThreadSpawn(e.to_string()))?;

        self.state = WorkerState::Running { stop_tx, thread };
        Ok(())
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        matches!(self.state, WorkerState::Running { .. })
    }

    /// Signal the thread, run `unblock` to break any blocking I/O, then join.
    /// Only the first call does anything.
    pub fn stop(&mut self, unblock: impl FnOnce()) {
        match std::mem::replace(&mut self.state, WorkerState::Stopped) {
            WorkerState::Running { stop_tx, thread } => {
                drop(stop_tx);
                unblock();
                if thread.join().is_err() {
                    log::error!("Feed thread panicked");
                }
            }
            WorkerState::Idle => unblock(),
            WorkerState::Stopped => {}
        }
    }
}
