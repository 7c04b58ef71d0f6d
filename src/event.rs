//! Completion signals for enqueued commands.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

static EVENT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

impl EventId {
    fn next() -> Self {
        EventId(EVENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CommandKind {
    Write,
    Read,
    Fill,
    NdRange,
    Marker,
}

#[derive(Debug, Clone)]
pub enum EventStatus {
    Queued,
    Running,
    Complete,
    Failed(Error),
}

impl EventStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Complete | EventStatus::Failed(_))
    }
}

/// Timestamps of one command, the host analogue of `CL_PROFILING_COMMAND_*`.
#[derive(Debug, Clone, Copy)]
pub struct Profile {
    pub queued: Instant,
    pub started: Option<Instant>,
    pub ended: Option<Instant>,
}

impl Profile {
    /// Time spent executing, once the command has finished.
    pub fn duration(&self) -> Option<Duration> {
        match (self.started, self.ended) {
            (Some(s), Some(e)) => Some(e.duration_since(s)),
            _ => None,
        }
    }

    /// Time between enqueue and start of execution.
    pub fn queue_delay(&self) -> Option<Duration> {
        self.started.map(|s| s.duration_since(self.queued))
    }
}

struct EventState {
    status: EventStatus,
    profile: Profile,
}

struct EventInner {
    id: EventId,
    kind: CommandKind,
    state: Mutex<EventState>,
    done: Condvar,
}

/// Handle to the completion signal of one enqueued command.
///
/// Cloning shares the same signal. Whatever the command wrote before it
/// completed is visible to anyone who has observed the completion.
#[derive(Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

impl Event {
    pub(crate) fn new(kind: CommandKind) -> Self {
        Self {
            inner: Arc::new(EventInner {
                id: EventId::next(),
                kind,
                state: Mutex::new(EventState {
                    status: EventStatus::Queued,
                    profile: Profile {
                        queued: Instant::now(),
                        started: None,
                        ended: None,
                    },
                }),
                done: Condvar::new(),
            }),
        }
    }

    pub fn id(&self) -> EventId {
        self.inner.id
    }

    pub fn kind(&self) -> CommandKind {
        self.inner.kind
    }

    pub fn status(&self) -> EventStatus {
        self.inner.state.lock().status.clone()
    }

    pub fn profile(&self) -> Profile {
        self.inner.state.lock().profile
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.inner.state.lock().status, EventStatus::Complete)
    }

    /// Block until the command has finished, returning its failure if any.
    pub fn wait(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        while !state.status.is_terminal() {
            self.inner.done.wait(&mut state);
        }
        match &state.status {
            EventStatus::Failed(e) => Err(e.clone()),
            _ => Ok(()),
        }
    }

    pub(crate) fn start(&self) {
        let mut state = self.inner.state.lock();
        if !state.status.is_terminal() {
            state.status = EventStatus::Running;
            state.profile.started = Some(Instant::now());
        }
    }

    pub(crate) fn complete(&self) {
        self.settle(EventStatus::Complete);
    }

    pub(crate) fn fail(&self, error: Error) {
        self.settle(EventStatus::Failed(error));
    }

    fn settle(&self, status: EventStatus) {
        let mut state = self.inner.state.lock();
        if state.status.is_terminal() {
            return;
        }
        let now = Instant::now();
        state.profile.started.get_or_insert(now);
        state.profile.ended = Some(now);
        state.status = status;
        drop(state);
        self.inner.done.notify_all();
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("status", &self.status())
            .finish()
    }
}

/// Wait for every event, returning the first failure in list order.
pub fn wait_for_events(events: &[Event]) -> Result<()> {
    let mut first_err = None;
    for event in events {
        if let Err(e) = event.wait() {
            first_err.get_or_insert(e);
        }
    }
    first_err.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_event_lifecycle() {
        let ev = Event::new(CommandKind::Write);
        assert!(matches!(ev.status(), EventStatus::Queued));

        ev.start();
        assert!(matches!(ev.status(), EventStatus::Running));

        ev.complete();
        assert!(ev.is_complete());
        assert!(ev.wait().is_ok());
        assert!(ev.profile().duration().is_some());
    }

    #[test]
    fn test_failed_event_reports_error() {
        let ev = Event::new(CommandKind::NdRange);
        ev.fail(Error::execution("boom"));
        let err = ev.wait().unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
    }

    #[test]
    fn test_settle_is_final() {
        let ev = Event::new(CommandKind::Read);
        ev.complete();
        ev.fail(Error::execution("late"));
        assert!(ev.is_complete());
    }

    #[test]
    fn test_wait_across_threads() {
        let ev = Event::new(CommandKind::Marker);
        let signal = ev.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            signal.complete();
        });

        assert!(ev.wait().is_ok());
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_for_events_returns_first_failure() {
        let ok = Event::new(CommandKind::Write);
        let bad = Event::new(CommandKind::Read);
        ok.complete();
        bad.fail(Error::execution("read failed"));

        assert!(wait_for_events(&[ok.clone()]).is_ok());
        assert!(wait_for_events(&[ok, bad]).is_err());
    }
}
