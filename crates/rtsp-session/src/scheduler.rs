//! Fixed-rate driver that pulls frames off the decoder pipe.
//!
//! The driver runs on its own OS thread because every tick is a blocking pipe
//! read. It ticks at the stream's native rate so the decoder never backs up,
//! but only every `display_every`-th frame is handed to the UI:
//!
//! ```text
//!   tick ──► FramePump::read_frame()
//!              ├── Frame        ─► throttle wraps to 0? ─► try_send(Frame) ─► UI
//!              ├── EndOfStream  ─► count; report Stalled once if configured
//!              └── Err          ─► report Desync / ReadError, keep ticking
//! ```
//!
//! The only state shared with the UI side is the stop flag, always accessed
//! through its mutex.

use std::io::Read;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use rtsp_proto::config::DisplayConfig;
use rtsp_proto::protocol::RawFrame;

use crate::error::{PumpError, SchedulerError};
use crate::pump::{FramePump, PumpRead};

/// Messages from the scheduler thread to the UI. `session` lets the receiver
/// drop stragglers from a session that has since been replaced.
#[derive(Debug)]
pub enum SchedulerEvent {
    Frame {
        session: u64,
        seq: u64,
        frame: RawFrame,
    },
    Desync {
        session: u64,
        expected: usize,
        got: usize,
    },
    ReadError {
        session: u64,
        message: String,
    },
    /// `ticks` consecutive reads found the pipe closed.
    Stalled { session: u64, ticks: u32 },
}

impl SchedulerEvent {
    pub fn session(&self) -> u64 {
        match self {
            SchedulerEvent::Frame { session, .. }
            | SchedulerEvent::Desync { session, .. }
            | SchedulerEvent::ReadError { session, .. }
            | SchedulerEvent::Stalled { session, .. } => *session,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub display_every: u32,
    /// 0 disables stall reporting.
    pub stall_ticks: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from(&DisplayConfig::default())
    }
}

impl From<&DisplayConfig> for SchedulerSettings {
    fn from(cfg: &DisplayConfig) -> Self {
        Self {
            display_every: cfg.display_every,
            stall_ticks: cfg.stall_ticks,
        }
    }
}

/// Modulo counter deciding which ticks reach the display.
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    every: u32,
    counter: u32,
}

impl FrameThrottle {
    pub fn new(every: u32) -> Self {
        Self {
            every: every.max(1),
            counter: 0,
        }
    }

    /// Count one tick; true when the counter wraps back to zero.
    pub fn advance(&mut self) -> bool {
        self.counter = (self.counter + 1) % self.every;
        self.counter == 0
    }
}

/// Counters returned by the driver thread when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub ticks: u64,
    pub frames: u64,
    pub forwarded: u64,
    pub dropped: u64,
    pub empty: u64,
    pub errors: u64,
}

pub struct DisplayScheduler {
    settings: SchedulerSettings,
    stop_flag: Arc<Mutex<bool>>,
    worker: Option<JoinHandle<TickStats>>,
}

impl DisplayScheduler {
    pub fn new(settings: SchedulerSettings) -> Self {
        Self {
            settings,
            stop_flag: Arc::new(Mutex::new(true)),
            worker: None,
        }
    }

    /// Interval between ticks for a stream running at `fps`.
    pub fn tick_interval(fps: u32) -> Duration {
        Duration::from_secs_f64(1.0 / fps.max(1) as f64)
    }

    /// Spawn the driver ticking at `fps`.
    ///
    /// Each start gets a fresh stop flag, so a previous driver that has not yet
    /// noticed its own stop can never be revived by this call.
    pub fn start<R>(
        &mut self,
        session: u64,
        fps: u32,
        pump: FramePump<R>,
        events: mpsc::Sender<SchedulerEvent>,
    ) -> Result<(), SchedulerError>
    where
        R: Read + Send + 'static,
    {
        if !self.is_stopped() {
            return Err(SchedulerError::AlreadyRunning);
        }
        // Reap a driver that already exited.
        if self.worker.as_ref().is_some_and(|w| w.is_finished()) {
            self.join();
        }

        let flag = Arc::new(Mutex::new(true));
        *lock(&flag) = false;

        let interval = Self::tick_interval(fps);
        let settings = self.settings;
        let driver_flag = flag.clone();
        let worker = std::thread::Builder::new()
            .name("frame-scheduler".into())
            .spawn(move || drive(session, pump, interval, settings, driver_flag, events))
            .map_err(SchedulerError::Spawn)?;

        info!(
            "scheduler: session {} ticking every {:?} ({} fps), showing 1 in {}",
            session,
            interval,
            fps.max(1),
            settings.display_every.max(1)
        );
        self.stop_flag = flag;
        self.worker = Some(worker);
        Ok(())
    }

    /// Ask the driver to exit at its next tick. Does not wait.
    pub fn stop(&self) {
        let mut stopped = lock(&self.stop_flag);
        if !*stopped {
            debug!("scheduler: stop requested");
        }
        *stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        *lock(&self.stop_flag)
    }

    /// Wait for the driver thread to exit. Call `stop` first.
    pub fn join(&mut self) -> Option<TickStats> {
        let worker = self.worker.take()?;
        match worker.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                error!("scheduler: driver thread panicked");
                None
            }
        }
    }

    /// True while a driver thread exists and has not returned.
    pub fn is_driving(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }
}

impl Drop for DisplayScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn drive<R: Read>(
    session: u64,
    mut pump: FramePump<R>,
    interval: Duration,
    settings: SchedulerSettings,
    stop_flag: Arc<Mutex<bool>>,
    events: mpsc::Sender<SchedulerEvent>,
) -> TickStats {
    let mut stats = TickStats::default();
    let mut throttle = FrameThrottle::new(settings.display_every);
    let mut empty_run: u32 = 0;
    let mut next_tick = Instant::now();

    loop {
        if *lock(&stop_flag) {
            break;
        }
        stats.ticks += 1;
        let show = throttle.advance();

        match pump.read_frame() {
            Ok(PumpRead::Frame(frame)) => {
                empty_run = 0;
                stats.frames += 1;
                if show {
                    let event = SchedulerEvent::Frame {
                        session,
                        seq: stats.frames,
                        frame,
                    };
                    match events.try_send(event) {
                        Ok(()) => stats.forwarded += 1,
                        Err(TrySendError::Full(_)) => {
                            stats.dropped += 1;
                            debug!("scheduler: UI behind, dropped frame {}", stats.frames);
                        }
                        Err(TrySendError::Closed(_)) => {
                            debug!("scheduler: UI gone, exiting");
                            break;
                        }
                    }
                }
            }
            Ok(PumpRead::EndOfStream) => {
                stats.empty += 1;
                empty_run = empty_run.saturating_add(1);
                if settings.stall_ticks > 0 && empty_run == settings.stall_ticks {
                    warn!("scheduler: no data for {} ticks", empty_run);
                    if events
                        .blocking_send(SchedulerEvent::Stalled {
                            session,
                            ticks: empty_run,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
            }
            Err(e) => {
                stats.errors += 1;
                let event = match e {
                    PumpError::Desync { expected, got } => SchedulerEvent::Desync {
                        session,
                        expected,
                        got,
                    },
                    PumpError::Io(io) => SchedulerEvent::ReadError {
                        session,
                        message: io.to_string(),
                    },
                };
                if events.blocking_send(event).is_err() {
                    break;
                }
            }
        }

        next_tick += interval;
        let now = Instant::now();
        if next_tick > now {
            std::thread::sleep(next_tick - now);
        } else {
            // Fell behind (slow read); skip the missed slots instead of bursting.
            next_tick = now;
        }
    }

    info!(
        "scheduler: session {} stopped after {} ticks ({} frames, {} shown, {} dropped, {} empty)",
        session, stats.ticks, stats.frames, stats.forwarded, stats.dropped, stats.empty
    );
    stats
}
