//! Idle detection for the transport.
//!
//! [`IdleTracker`] records read and write activity and reports when the
//! configured reader, writer, or combined timeout elapses. Each kind of
//! idleness fires once per idle period and re-arms on the next matching
//! activity.

use std::time::Duration;

use tokio::time::Instant;

/// Which kind of inactivity was detected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdleState {
    /// Nothing was read for the reader timeout.
    ReaderIdle,
    /// Nothing was written for the writer timeout.
    WriterIdle,
    /// Nothing was read or written for the combined timeout.
    AllIdle,
}

impl IdleState {
    const ALL: [IdleState; 3] = [Self::ReaderIdle, Self::WriterIdle, Self::AllIdle];

    fn index(self) -> usize {
        match self {
            Self::ReaderIdle => 0,
            Self::WriterIdle => 1,
            Self::AllIdle => 2,
        }
    }
}

/// Idle timeouts; `None` disables the corresponding check.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IdleConfig {
    pub reader: Option<Duration>,
    pub writer: Option<Duration>,
    pub all: Option<Duration>,
}

impl IdleConfig {
    /// Close the connection after `timeout` without reads or writes.
    #[must_use]
    pub fn all(timeout: Duration) -> Self {
        Self {
            all: Some(timeout),
            ..Self::default()
        }
    }

    /// Returns `true` if no timeout is configured.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.reader.is_none() && self.writer.is_none() && self.all.is_none()
    }

    fn timeout(&self, state: IdleState) -> Option<Duration> {
        match state {
            IdleState::ReaderIdle => self.reader,
            IdleState::WriterIdle => self.writer,
            IdleState::AllIdle => self.all,
        }
    }
}

/// Tracks transport activity against an [`IdleConfig`].
#[derive(Debug)]
pub struct IdleTracker {
    config: IdleConfig,
    last_read: Instant,
    last_write: Instant,
    fired: [bool; 3],
}

impl IdleTracker {
    #[must_use]
    pub fn new(config: IdleConfig, now: Instant) -> Self {
        Self {
            config,
            last_read: now,
            last_write: now,
            fired: [false; 3],
        }
    }

    pub fn record_read(&mut self, now: Instant) {
        self.last_read = now;
        self.fired[IdleState::ReaderIdle.index()] = false;
        self.fired[IdleState::AllIdle.index()] = false;
    }

    pub fn record_write(&mut self, now: Instant) {
        self.last_write = now;
        self.fired[IdleState::WriterIdle.index()] = false;
        self.fired[IdleState::AllIdle.index()] = false;
    }

    fn last_activity(&self, state: IdleState) -> Instant {
        match state {
            IdleState::ReaderIdle => self.last_read,
            IdleState::WriterIdle => self.last_write,
            IdleState::AllIdle => self.last_read.max(self.last_write),
        }
    }

    fn deadline(&self, state: IdleState) -> Option<Instant> {
        if self.fired[state.index()] {
            return None;
        }
        self.config
            .timeout(state)
            .map(|timeout| self.last_activity(state) + timeout)
    }

    /// The earliest instant at which an armed timeout elapses.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        IdleState::ALL
            .into_iter()
            .filter_map(|state| self.deadline(state))
            .min()
    }

    /// Take the next timeout that has elapsed by `now`, disarming it until the
    /// matching activity is recorded again.
    pub fn poll_expired(&mut self, now: Instant) -> Option<IdleState> {
        let state = IdleState::ALL
            .into_iter()
            .find(|state| self.deadline(*state).is_some_and(|deadline| deadline <= now))?;
        self.fired[state.index()] = true;
        Some(state)
    }
}
