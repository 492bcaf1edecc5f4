//! Item-level progress of a polled job, for display.

use crate::job::ItemStatus;
use crate::poller::{ItemReport, JobEvent, PollEnd};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Counts of items per status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub done: usize,
    pub error: usize,
    pub timeout: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.done + self.error + self.timeout
    }

    pub fn finished(&self) -> usize {
        self.done + self.error + self.timeout
    }

    /// Percentage of items finished (0-100)
    pub fn percent_finished(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            (self.finished() as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Progress tracker fed by poller events
pub struct JobProgress {
    start_time: Instant,
    items: BTreeMap<String, ItemStatus>,
    end: Option<PollEnd>,
}

impl JobProgress {
    /// Create a tracker for a known item set
    pub fn new<I: IntoIterator<Item = (String, ItemStatus)>>(items: I) -> Self {
        Self {
            start_time: Instant::now(),
            items: items.into_iter().collect(),
            end: None,
        }
    }

    /// Apply one poller event. Returns the item report, if it was one.
    pub fn apply<'a>(&mut self, event: &'a JobEvent) -> Option<&'a ItemReport> {
        match event {
            JobEvent::Item(report) => {
                self.items.insert(report.item_id.clone(), report.status);
                Some(report)
            }
            JobEvent::Finished(outcome) => {
                self.items = outcome.items.clone();
                self.end = Some(outcome.end);
                None
            }
        }
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for status in self.items.values() {
            match status {
                ItemStatus::Pending => counts.pending += 1,
                ItemStatus::Running | ItemStatus::Working => counts.in_progress += 1,
                ItemStatus::Done => counts.done += 1,
                ItemStatus::Error => counts.error += 1,
                ItemStatus::Timeout => counts.timeout += 1,
            }
        }
        counts
    }

    pub fn end(&self) -> Option<PollEnd> {
        self.end
    }

    /// Get total elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// One-line summary, e.g. `3/4 finished (75.0%): 2 done, 1 error, 1 running [12s]`
    pub fn summary(&self) -> String {
        let counts = self.counts();
        let mut parts = Vec::new();
        for (n, label) in [
            (counts.done, "done"),
            (counts.error, "error"),
            (counts.timeout, "timeout"),
            (counts.in_progress, "running"),
            (counts.pending, "pending"),
        ] {
            if n > 0 {
                parts.push(format!("{} {}", n, label));
            }
        }
        format!(
            "{}/{} finished ({:.1}%): {} [{}]",
            counts.finished(),
            counts.total(),
            counts.percent_finished(),
            parts.join(", "),
            format_duration(self.elapsed().as_secs())
        )
    }
}

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
