use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub transferred: u64,
    pub total: u64,
}

/// Rate limiter between raw byte counts and the consumer's channel.
///
/// The first tick and the terminal tick always go through; everything in
/// between is dropped unless `interval` has elapsed since the last send.
#[derive(Debug)]
pub struct ProgressThrottle {
    sender: UnboundedSender<Progress>,
    interval: Duration,
    last_sent: Option<Instant>,
    last: Progress,
}

impl ProgressThrottle {
    pub fn new(sender: UnboundedSender<Progress>) -> Self {
        Self::with_interval(sender, PROGRESS_INTERVAL)
    }

    pub fn with_interval(sender: UnboundedSender<Progress>, interval: Duration) -> Self {
        Self {
            sender,
            interval,
            last_sent: None,
            last: Progress::default(),
        }
    }

    pub fn tick(&mut self, progress: Progress) {
        self.last = progress;

        let finished = progress.total > 0 && progress.transferred >= progress.total;
        let due = self
            .last_sent
            .map_or(true, |at| at.elapsed() >= self.interval);

        if finished || due {
            self.send(progress);
        }
    }

    /// Re-sends the last seen progress, used as the "now extracting" marker.
    pub fn flush(&mut self) {
        let last = self.last;
        self.send(last);
    }

    fn send(&mut self, progress: Progress) {
        // The receiver going away only means nobody is watching anymore.
        let _ = self.sender.send(progress);
        self.last_sent = Some(Instant::now());
    }
}
