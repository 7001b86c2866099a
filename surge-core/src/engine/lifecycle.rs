//! Idle → Starting → Running → Stopping → Idle state machine shared by both
//! engines.
//!
//! The controller side (`Lifecycle`) guards transitions that callers
//! request; the worker side (`WorkerHandle`) reports the transitions the
//! worker itself causes (attach succeeded, run ended). A one-shot done
//! channel lets `stop` wait until the worker has released everything.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    analysis::Modality,
    error::{Result, SurgeError},
    ipc::events::{PipelineState, PipelineStatusEvent},
};

/// How long `stop` waits for the worker's cleanup pass.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);

const STATUS_BROADCAST_CAP: usize = 64;

pub(crate) struct Lifecycle {
    worker: WorkerHandle,
    done_rx: Mutex<Option<mpsc::Receiver<()>>>,
}

/// Worker-side view of the lifecycle.
#[derive(Clone)]
pub(crate) struct WorkerHandle {
    modality: Modality,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<PipelineState>>,
    status_tx: broadcast::Sender<PipelineStatusEvent>,
}

impl Lifecycle {
    pub fn new(modality: Modality) -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_BROADCAST_CAP);
        Self {
            worker: WorkerHandle {
                modality,
                running: Arc::new(AtomicBool::new(false)),
                state: Arc::new(Mutex::new(PipelineState::Idle)),
                status_tx,
            },
            done_rx: Mutex::new(None),
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.worker.state.lock()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineStatusEvent> {
        self.worker.status_tx.subscribe()
    }

    /// Idle → Starting. Returns the worker handle and the done sender the
    /// worker must fire after its cleanup pass.
    pub fn begin_start(&self) -> Result<(WorkerHandle, mpsc::SyncSender<()>)> {
        {
            let mut state = self.worker.state.lock();
            if *state != PipelineState::Idle {
                return Err(SurgeError::AlreadyRunning);
            }
            *state = PipelineState::Starting;
        }
        self.worker.running.store(true, Ordering::SeqCst);
        self.worker.publish(PipelineState::Starting, None);

        let (done_tx, done_rx) = mpsc::sync_channel(1);
        *self.done_rx.lock() = Some(done_rx);
        Ok((self.worker.clone(), done_tx))
    }

    /// Starting → Idle after a failed attach.
    pub fn abort_start(&self, detail: String) {
        self.worker.finish(Some(detail));
        self.done_rx.lock().take();
    }

    /// Running/Starting → Stopping, then wait (bounded) for the worker to
    /// reach Idle.
    pub fn stop(&self) -> Result<()> {
        {
            let mut state = self.worker.state.lock();
            match *state {
                PipelineState::Idle => return Err(SurgeError::NotRunning),
                PipelineState::Stopping => {}
                PipelineState::Starting | PipelineState::Running => {
                    *state = PipelineState::Stopping;
                }
            }
        }
        self.worker.running.store(false, Ordering::SeqCst);
        self.worker.publish(PipelineState::Stopping, None);
        info!(modality = ?self.worker.modality, "pipeline stop requested");

        let done_rx = self.done_rx.lock().take();
        if let Some(rx) = done_rx {
            match rx.recv_timeout(STOP_TIMEOUT) {
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {}
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    warn!(
                        modality = ?self.worker.modality,
                        timeout_ms = STOP_TIMEOUT.as_millis() as u64,
                        "pipeline worker did not finish cleanup in time"
                    );
                }
            }
        }
        Ok(())
    }
}

impl WorkerHandle {
    pub fn running(&self) -> &Arc<AtomicBool> {
        &self.running
    }

    /// Starting → Running. A stop that raced the attach wins.
    pub fn promote_running(&self) {
        {
            let mut state = self.state.lock();
            if *state != PipelineState::Starting {
                return;
            }
            *state = PipelineState::Running;
        }
        self.publish(PipelineState::Running, None);
    }

    /// Any → Idle once the worker has released its resources.
    pub fn finish(&self, detail: Option<String>) {
        self.running.store(false, Ordering::SeqCst);
        *self.state.lock() = PipelineState::Idle;
        self.publish(PipelineState::Idle, detail);
    }

    fn publish(&self, state: PipelineState, detail: Option<String>) {
        let _ = self.status_tx.send(PipelineStatusEvent {
            modality: self.modality,
            state,
            detail,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_the_full_cycle() {
        let lifecycle = Lifecycle::new(Modality::Audio);
        let mut status = lifecycle.subscribe();

        let (worker, done_tx) = lifecycle.begin_start().expect("idle engine starts");
        assert!(matches!(lifecycle.begin_start(), Err(SurgeError::AlreadyRunning)));
        worker.promote_running();
        assert_eq!(lifecycle.state(), PipelineState::Running);

        let w = worker.clone();
        let handle = std::thread::spawn(move || {
            while w.running().load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
            w.finish(None);
            let _ = done_tx.send(());
        });
        lifecycle.stop().expect("running engine stops");
        handle.join().unwrap();
        assert_eq!(lifecycle.state(), PipelineState::Idle);

        let seen: Vec<PipelineState> = std::iter::from_fn(|| status.try_recv().ok())
            .map(|e| e.state)
            .collect();
        assert_eq!(
            seen,
            vec![
                PipelineState::Starting,
                PipelineState::Running,
                PipelineState::Stopping,
                PipelineState::Idle
            ]
        );
    }

    #[test]
    fn stop_when_idle_is_an_error() {
        let lifecycle = Lifecycle::new(Modality::Video);
        assert!(matches!(lifecycle.stop(), Err(SurgeError::NotRunning)));
    }

    #[test]
    fn stop_during_attach_keeps_stopping_state() {
        let lifecycle = Lifecycle::new(Modality::Video);
        let (worker, done_tx) = lifecycle.begin_start().unwrap();
        drop(done_tx);
        lifecycle.stop().unwrap();
        worker.promote_running();
        assert_eq!(lifecycle.state(), PipelineState::Stopping);
        worker.finish(None);
        assert_eq!(lifecycle.state(), PipelineState::Idle);
    }

    #[test]
    fn abort_returns_to_idle_with_detail() {
        let lifecycle = Lifecycle::new(Modality::Audio);
        let mut status = lifecycle.subscribe();
        lifecycle.begin_start().unwrap();
        lifecycle.abort_start("no audio track".into());
        assert_eq!(lifecycle.state(), PipelineState::Idle);
        let last = std::iter::from_fn(|| status.try_recv().ok()).last().unwrap();
        assert_eq!(last.detail.as_deref(), Some("no audio track"));
    }
}
