//! Periodic progress reporting for a run.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ProgressState {
    pub total: usize,
    pub done: usize,
    pub current: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl ProgressState {
    fn new(total: usize, first_file: Option<&Path>) -> Self {
        Self {
            total,
            done: 0,
            current: first_file.map(Path::to_path_buf),
            started_at: Utc::now(),
            stopped_at: None,
            cancelled_at: None,
        }
    }

    fn current_display(&self) -> String {
        self.current
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }
}

/// Where progress reports go.
pub trait ProgressSink: Send + Sync {
    fn started(&self, state: &ProgressState);
    /// Periodic report while files are being analysed.
    fn tick(&self, state: &ProgressState);
    fn advanced(&self, _state: &ProgressState) {}
    fn stopped(&self, state: &ProgressState);
    fn cancelled(&self, state: &ProgressState);
}

/// Reports through `tracing`.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn started(&self, state: &ProgressState) {
        info!("{} source file(s) to be analyzed", state.total);
    }

    fn tick(&self, state: &ProgressState) {
        info!(
            "{}/{} file(s) analyzed, current file: {}",
            state.done,
            state.total,
            state.current_display()
        );
    }

    fn stopped(&self, state: &ProgressState) {
        info!("{}/{} source file(s) have been analyzed", state.done, state.total);
    }

    fn cancelled(&self, state: &ProgressState) {
        info!(
            "Analysis cancelled after {}/{} source file(s)",
            state.done, state.total
        );
    }
}

/// Interactive progress bar for terminals.
pub struct BarSink {
    bar: ProgressBar,
}

impl BarSink {
    pub fn new() -> Self {
        let bar = ProgressBar::hidden();
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .map(|s| s.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Self { bar }
    }
}

impl Default for BarSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarSink {
    fn started(&self, state: &ProgressState) {
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.set_length(state.total as u64);
        self.bar.set_message(state.current_display());
    }

    fn tick(&self, state: &ProgressState) {
        self.bar.set_message(state.current_display());
        self.bar.tick();
    }

    fn advanced(&self, state: &ProgressState) {
        self.bar.set_position(state.done as u64);
    }

    fn stopped(&self, state: &ProgressState) {
        self.bar.set_position(state.done as u64);
        self.bar
            .finish_with_message(format!("{} file(s) analyzed", state.done));
    }

    fn cancelled(&self, state: &ProgressState) {
        self.bar
            .abandon_with_message(format!("cancelled after {} file(s)", state.done));
    }
}

/// Progress of one run. `start` once, `next_file` per analysed file, then
/// exactly one of `stop` or `cancel`.
pub struct ProgressReport {
    sink: Arc<dyn ProgressSink>,
    period: Duration,
    state: Option<Arc<Mutex<ProgressState>>>,
    ticker: Option<(Sender<()>, JoinHandle<()>)>,
    finished: bool,
}

impl ProgressReport {
    pub fn new(sink: Arc<dyn ProgressSink>, period: Duration) -> Self {
        Self {
            sink,
            period,
            state: None,
            ticker: None,
            finished: false,
        }
    }

    pub fn start(&mut self, total: usize, first_file: Option<&Path>) {
        if self.state.is_some() {
            warn!("Progress report already started");
            return;
        }
        let state = Arc::new(Mutex::new(ProgressState::new(total, first_file)));
        self.sink.started(&lock(&state));

        let (tx, rx) = mpsc::channel::<()>();
        let sink = Arc::clone(&self.sink);
        let shared = Arc::clone(&state);
        let period = self.period;
        let handle = std::thread::spawn(move || loop {
            match rx.recv_timeout(period) {
                Err(RecvTimeoutError::Timeout) => sink.tick(&lock(&shared)),
                _ => break,
            }
        });

        self.state = Some(state);
        self.ticker = Some((tx, handle));
    }

    /// Record that `path` has been analysed.
    pub fn next_file(&self, path: &Path) {
        if let Some(state) = &self.state {
            let mut state = lock(state);
            state.done += 1;
            state.current = Some(path.to_path_buf());
            self.sink.advanced(&state);
        }
    }

    pub fn stop(&mut self) {
        if let Some(shared) = self.finish("stop") {
            let mut state = lock(&shared);
            state.stopped_at = Some(Utc::now());
            self.sink.stopped(&state);
        }
    }

    pub fn cancel(&mut self) {
        if let Some(shared) = self.finish("cancel") {
            let mut state = lock(&shared);
            state.cancelled_at = Some(Utc::now());
            self.sink.cancelled(&state);
        }
    }

    pub fn snapshot(&self) -> Option<ProgressState> {
        self.state.as_ref().map(|s| lock(s).clone())
    }

    /// Join the ticker and hand out the shared state, once.
    fn finish(&mut self, action: &str) -> Option<Arc<Mutex<ProgressState>>> {
        if self.finished {
            warn!("Ignoring progress {}: report already finished", action);
            return None;
        }
        self.shutdown_ticker();
        let state = Arc::clone(self.state.as_ref()?);
        self.finished = true;
        Some(state)
    }

    fn shutdown_ticker(&mut self) {
        if let Some((tx, handle)) = self.ticker.take() {
            drop(tx);
            let _ = handle.join();
        }
    }
}

impl Drop for ProgressReport {
    fn drop(&mut self) {
        self.shutdown_ticker();
    }
}

fn lock(state: &Mutex<ProgressState>) -> MutexGuard<'_, ProgressState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
