//! Looping playback of a prepared segment.
//!
//! [`PlaybackController`] owns one worker thread per session. The worker blocks
//! inside [`AudioSink::play`], so `pause` and `stop` cut the current iteration
//! short through [`AudioSink::stop_immediately`]; the worker then re-reads the
//! shared state before starting the next one. State and loop counter live
//! behind a single mutex and every change is broadcast on a condvar, which is
//! also what a paused worker sleeps on.

mod state;

pub use state::{PlaybackRequest, PlaybackState, PlaybackStatus};

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::traits::{AudioSink, PlayOutcome};

const DEFAULT_LOOP_GAP: Duration = Duration::from_millis(100);

struct Inner {
    state: PlaybackState,
    loops_played: u32,
    loop_count: u32,
    /// Bumped on every submit; a worker whose session is stale exits.
    session: u64,
}

struct Shared {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Inner>) -> MutexGuard<'a, Inner> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct PlaybackController<S: AudioSink> {
    sink: Arc<S>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    loop_gap: Duration,
}

impl<S: AudioSink> PlaybackController<S> {
    pub fn new(sink: Arc<S>) -> Self {
        Self {
            sink,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: PlaybackState::Idle,
                    loops_played: 0,
                    loop_count: 0,
                    session: 0,
                }),
                changed: Condvar::new(),
            }),
            worker: None,
            loop_gap: DEFAULT_LOOP_GAP,
        }
    }

    /// Pause between the end of one iteration and the start of the next.
    pub fn with_loop_gap(mut self, gap: Duration) -> Self {
        self.loop_gap = gap;
        self
    }

    pub fn sink(&self) -> &Arc<S> {
        &self.sink
    }

    /// Start playing `request` from a fresh loop counter.
    ///
    /// An active session is stopped first; its worker is joined by the new one
    /// before the sink is touched again.
    pub fn submit(&mut self, request: PlaybackRequest) -> Result<()> {
        let previous = self.worker.take();
        let session = {
            let mut inner = self.shared.lock();
            if inner.state.is_active() {
                log::info!("replacing active playback session {}", inner.session);
                self.sink.stop_immediately();
            }
            inner.session += 1;
            inner.state = PlaybackState::Playing;
            inner.loops_played = 0;
            inner.loop_count = request.loop_count;
            self.shared.changed.notify_all();
            inner.session
        };

        log::info!(
            "session {session}: {} samples at {} Hz, {}",
            request.segment.len(),
            request.segment.sample_rate(),
            if request.is_infinite() {
                "looping until stopped".to_string()
            } else {
                format!("{} loop(s)", request.loop_count)
            }
        );

        let worker = Worker {
            sink: Arc::clone(&self.sink),
            shared: Arc::clone(&self.shared),
            request,
            session,
            loop_gap: self.loop_gap,
        };
        let spawned = thread::Builder::new()
            .name("slowdowner-playback".into())
            .spawn(move || {
                if let Some(previous) = previous {
                    if previous.join().is_err() {
                        log::error!("previous playback worker panicked");
                    }
                }
                worker.run();
            });

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                let mut inner = self.shared.lock();
                inner.state = PlaybackState::Failed(format!("cannot spawn playback thread: {e}"));
                self.shared.changed.notify_all();
                Err(Error::Io(e))
            }
        }
    }

    /// Playing → Paused. The in-flight iteration is abandoned and replayed from
    /// its start on [`resume`](Self::resume).
    pub fn pause(&self) -> Result<()> {
        let mut inner = self.shared.lock();
        match inner.state.clone() {
            PlaybackState::Playing => {
                inner.state = PlaybackState::Paused;
                self.sink.stop_immediately();
                self.shared.changed.notify_all();
                log::info!("paused after {} loop(s)", inner.loops_played);
                Ok(())
            }
            PlaybackState::Paused => Ok(()),
            state => Err(Error::InvalidTransition {
                action: "pause",
                state,
            }),
        }
    }

    /// Paused → Playing, keeping the loop counter.
    pub fn resume(&self) -> Result<()> {
        let mut inner = self.shared.lock();
        match inner.state.clone() {
            PlaybackState::Paused => {
                inner.state = PlaybackState::Playing;
                self.shared.changed.notify_all();
                log::info!("resumed at loop {}", inner.loops_played + 1);
                Ok(())
            }
            PlaybackState::Playing => Ok(()),
            state => Err(Error::InvalidTransition {
                action: "resume",
                state,
            }),
        }
    }

    /// {Playing, Paused} → Stopped and reset the counter. No-op otherwise.
    pub fn stop(&self) {
        let mut inner = self.shared.lock();
        if !inner.state.is_active() {
            return;
        }
        inner.state = PlaybackState::Stopped;
        inner.loops_played = 0;
        self.sink.stop_immediately();
        self.shared.changed.notify_all();
        log::info!("playback stopped");
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.lock().state.clone()
    }

    pub fn status(&self) -> PlaybackStatus {
        let inner = self.shared.lock();
        PlaybackStatus {
            state: inner.state.clone(),
            loops_played: inner.loops_played,
            loop_count: inner.loop_count,
        }
    }

    /// Block until playback leaves Playing/Paused or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> PlaybackState {
        let inner = self.shared.lock();
        let (inner, _) = self
            .shared
            .changed
            .wait_timeout_while(inner, timeout, |inner| inner.state.is_active())
            .unwrap_or_else(PoisonError::into_inner);
        inner.state.clone()
    }
}

impl<S: AudioSink> Drop for PlaybackController<S> {
    fn drop(&mut self) {
        self.stop();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

struct Worker<S: AudioSink> {
    sink: Arc<S>,
    shared: Arc<Shared>,
    request: PlaybackRequest,
    session: u64,
    loop_gap: Duration,
}

impl<S: AudioSink> Worker<S> {
    fn run(self) {
        while self.wait_until_playing() {
            let outcome = self.sink.play(&self.request.segment);
            if !self.finish_iteration(outcome) {
                break;
            }
        }
        log::debug!("session {} worker exiting", self.session);
    }

    /// Sleep while paused. False once the session is over.
    fn wait_until_playing(&self) -> bool {
        let mut inner = self.shared.lock();
        loop {
            if inner.session != self.session {
                return false;
            }
            if inner.state == PlaybackState::Playing {
                self.sink.rearm();
                return true;
            }
            if inner.state != PlaybackState::Paused {
                return false;
            }
            inner = self.shared.wait(inner);
        }
    }

    /// Record the result of one `play` call. False once the session is over.
    fn finish_iteration(&self, outcome: Result<PlayOutcome>) -> bool {
        let mut inner = self.shared.lock();
        if inner.session != self.session || !inner.state.is_active() {
            return false;
        }

        match outcome {
            Err(e) => {
                log::error!("session {}: {e}", self.session);
                inner.state = PlaybackState::Failed(e.to_string());
                self.shared.changed.notify_all();
                false
            }
            // Paused or replaced mid-iteration; the next pass decides.
            Ok(PlayOutcome::Interrupted) => true,
            // The pause reached the sink too late. The iteration is abandoned all the same.
            Ok(PlayOutcome::Finished) if inner.state == PlaybackState::Paused => {
                log::debug!("session {}: iteration finished after pause, not counted", self.session);
                true
            }
            Ok(PlayOutcome::Finished) => {
                inner.loops_played += 1;
                let count = self.request.loop_count;
                if count != 0 && inner.loops_played >= count {
                    inner.state = PlaybackState::Completed;
                    self.shared.changed.notify_all();
                    log::info!("session {} completed {count} loop(s)", self.session);
                    return false;
                }
                log::debug!("session {}: loop {} done", self.session, inner.loops_played);
                self.shared.changed.notify_all();

                if !self.loop_gap.is_zero() {
                    let session = self.session;
                    let _ = self.shared.changed.wait_timeout_while(inner, self.loop_gap, |inner| {
                        inner.session == session && inner.state == PlaybackState::Playing
                    });
                }
                true
            }
        }
    }
}
