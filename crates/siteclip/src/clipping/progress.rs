use std::sync::{Arc, Mutex};

use crate::broadcast::job_progress::{JobEvent, JobProgressBroadcaster, JobProgressTracker};
use crate::broadcast::job_store::JobStore;

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: JobEvent);
}

/// No-op reporter for synchronous runs and unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: JobEvent) {}
}

/// Keeps every reported event, for tests.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<JobEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, event: JobEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Bridges workflow events to the job store and the broadcast channel.
pub struct BroadcastProgress {
    tracker: JobProgressTracker,
    store: Arc<JobStore>,
}

impl BroadcastProgress {
    pub fn new(
        broadcaster: &JobProgressBroadcaster,
        store: Arc<JobStore>,
        job_id: &str,
        entity_label: &str,
        created_by: Option<&str>,
    ) -> Self {
        Self {
            tracker: broadcaster.tracker(job_id, entity_label, created_by),
            store,
        }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: JobEvent) {
        let event = self.tracker.event(event);
        match event.event {
            // Emitted while the run holds the database connection.
            JobEvent::Progress { .. } => {
                self.store.update(&event);
            }
            _ => self.store.update_and_persist(&event),
        }
        self.tracker.send(event);
    }
}
