//! Response record table.
//!
//! Every exchange registers a [`ResponseRecord`] under a fresh sequence
//! number before its command is submitted. The transport's receive path
//! hands each response frame to [`Registry::complete`], which finds the
//! record by `(destination, seq)` and fills it in. Session records stay
//! registered between exchanges; transient ones are removed as soon as
//! their [`RecordGuard`] goes out of scope.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bhp_transport::{Destination, TransportError};
use bhp_wire::{code, response_header, RESPONSE_HEADER_SIZE};
use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{ProxyError, Result};

/// What a record is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// One exchange, released when the caller is done with it.
    Transient,
    /// Backs a session; survives until the session is closed.
    Session,
}

/// Result fields stored by the receive path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub code: i32,
    pub addr: u64,
    /// Response body after the header; `None` when the response had none.
    pub body: Option<Bytes>,
}

#[derive(Debug, Default)]
struct RecordState {
    pending: bool,
    completion: Option<Completion>,
    addr: u64,
    killed: bool,
    count: u64,
    locked: bool,
    closed: bool,
    link_lost: bool,
}

/// Slot a caller registers to receive one correlated response at a time.
#[derive(Debug)]
pub struct ResponseRecord {
    seq: u64,
    destination: Destination,
    kind: RecordKind,
    state: Mutex<RecordState>,
    ready: Condvar,
    unlocked: Condvar,
}

impl ResponseRecord {
    fn new(seq: u64, destination: Destination, kind: RecordKind) -> Self {
        Self {
            seq,
            destination,
            kind,
            state: Mutex::new(RecordState::default()),
            ready: Condvar::new(),
            unlocked: Condvar::new(),
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn destination(&self) -> Destination {
        self.destination
    }

    pub fn is_session(&self) -> bool {
        self.kind == RecordKind::Session
    }

    /// Secure-side address of the session, set once the open succeeds.
    pub fn addr(&self) -> u64 {
        self.lock_state().addr
    }

    /// True once the applet behind this session was terminated by a fault.
    pub fn killed(&self) -> bool {
        self.lock_state().killed
    }

    /// Number of responses stored into this record so far.
    pub fn count(&self) -> u64 {
        self.lock_state().count
    }

    pub(crate) fn set_addr(&self, addr: u64) {
        self.lock_state().addr = addr;
    }

    pub(crate) fn mark_killed(&self) {
        self.lock_state().killed = true;
    }

    /// Expect a response. Must be called before the command is submitted so
    /// a transport that answers synchronously finds the record ready.
    pub(crate) fn arm(&self) {
        let mut state = self.lock_state();
        state.pending = true;
        state.completion = None;
        state.link_lost = false;
    }

    pub(crate) fn disarm(&self) {
        let mut state = self.lock_state();
        state.pending = false;
        state.completion = None;
    }

    /// Store a response. Returns false when no exchange is in flight.
    fn fill(&self, completion: Completion) -> bool {
        let mut state = self.lock_state();
        if !state.pending {
            return false;
        }
        state.pending = false;
        state.count += 1;
        if self.is_session() && code::is_fault(completion.code) {
            state.killed = true;
        }
        state.completion = Some(completion);
        drop(state);
        self.ready.notify_all();
        true
    }

    /// Fail the exchange in flight because its link went away.
    fn fail_link(&self) -> bool {
        let mut state = self.lock_state();
        if !state.pending {
            return false;
        }
        state.pending = false;
        state.link_lost = true;
        drop(state);
        self.ready.notify_all();
        true
    }

    /// Block until the armed exchange completes.
    ///
    /// Fails with [`ProxyError::Timeout`] when `timeout` elapses first (the
    /// record is disarmed so a late response is dropped by the receive path)
    /// and with a transport shutdown when the destination's link closed.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> Result<Completion> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock_state();
        loop {
            if let Some(completion) = state.completion.take() {
                return Ok(completion);
            }
            if state.link_lost {
                state.link_lost = false;
                return Err(ProxyError::Transport(TransportError::Shutdown));
            }
            match deadline {
                None => {
                    state = self
                        .ready
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        state.pending = false;
                        return Err(ProxyError::Timeout(timeout.unwrap_or_default()));
                    }
                    state = self
                        .ready
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }

    /// Take the session's in-use lock, waiting for the current holder.
    /// Returns false if the session was closed meanwhile.
    pub(crate) fn acquire(&self) -> bool {
        let mut state = self.lock_state();
        while state.locked && !state.closed {
            state = self
                .unlocked
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.closed {
            return false;
        }
        state.locked = true;
        true
    }

    pub(crate) fn release(&self) {
        self.lock_state().locked = false;
        self.unlocked.notify_one();
    }

    pub(crate) fn mark_closed(&self) {
        let mut state = self.lock_state();
        state.closed = true;
        state.locked = false;
        drop(state);
        self.unlocked.notify_all();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    fn lock_state(&self) -> MutexGuard<'_, RecordState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
struct RecordTable {
    records: HashMap<u64, Arc<ResponseRecord>>,
    next_seq: u64,
}

impl RecordTable {
    fn new() -> Self {
        Self {
            records: HashMap::new(),
            next_seq: 1,
        }
    }

    fn next_free_seq(&mut self) -> u64 {
        loop {
            let candidate = self.next_seq;
            self.next_seq = self.next_seq.wrapping_add(1);
            if candidate != 0 && !self.records.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}

/// One response record table per destination.
#[derive(Debug)]
pub struct Registry {
    ivm: Mutex<RecordTable>,
    svm: Mutex<RecordTable>,
    max_records: usize,
}

impl Registry {
    pub fn new(max_records: usize) -> Self {
        Self {
            ivm: Mutex::new(RecordTable::new()),
            svm: Mutex::new(RecordTable::new()),
            max_records,
        }
    }

    /// Register a new record and reserve a non-zero sequence for it.
    pub fn register(&self, destination: Destination, kind: RecordKind) -> Result<RecordGuard<'_>> {
        let mut table = self.table(destination);
        if table.records.len() >= self.max_records {
            return Err(ProxyError::TableExhausted {
                destination,
                capacity: self.max_records,
            });
        }
        let seq = table.next_free_seq();
        let record = Arc::new(ResponseRecord::new(seq, destination, kind));
        table.records.insert(seq, Arc::clone(&record));
        drop(table);

        debug!(%destination, seq, ?kind, "registered record");
        Ok(RecordGuard {
            registry: self,
            record,
            persisted: false,
        })
    }

    /// Remove a record and hand back ownership. A second call finds nothing.
    pub fn take(&self, destination: Destination, seq: u64) -> Option<Arc<ResponseRecord>> {
        self.table(destination).records.remove(&seq)
    }

    pub fn lookup(&self, destination: Destination, seq: u64) -> Option<Arc<ResponseRecord>> {
        self.table(destination).records.get(&seq).cloned()
    }

    /// Number of registered records for a destination.
    pub fn len(&self, destination: Destination) -> usize {
        self.table(destination).records.len()
    }

    /// Number of session records registered for a destination.
    pub fn sessions(&self, destination: Destination) -> usize {
        self.table(destination)
            .records
            .values()
            .filter(|record| record.is_session())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        Destination::SEARCH_ORDER
            .iter()
            .all(|destination| self.len(*destination) == 0)
    }

    /// Receive path: store a response frame into the record it answers.
    ///
    /// Frames that do not parse, answer an unknown sequence, or arrive when
    /// no exchange is in flight are dropped. Returns whether the frame was
    /// stored.
    pub fn complete(&self, destination: Destination, frame: Bytes) -> bool {
        let header = match response_header(&frame) {
            Ok(header) => header,
            Err(err) => {
                warn!(%destination, error = %err, "dropping unparsable response");
                return false;
            }
        };

        let Some(record) = self.lookup(destination, header.seq) else {
            warn!(%destination, seq = header.seq, "dropping response for unknown sequence");
            return false;
        };

        let end = frame.len().min(header.length as usize);
        let body = (end > RESPONSE_HEADER_SIZE).then(|| frame.slice(RESPONSE_HEADER_SIZE..end));
        let stored = record.fill(Completion {
            code: header.code,
            addr: header.addr,
            body,
        });
        if stored {
            debug!(%destination, seq = header.seq, code = header.code, "response stored");
        } else {
            warn!(%destination, seq = header.seq, "dropping response with no exchange in flight");
        }
        stored
    }

    /// Receive path: the link to `destination` is gone. Every exchange in
    /// flight there fails instead of waiting for a response that cannot
    /// arrive. Returns how many were failed.
    pub fn link_closed(&self, destination: Destination) -> usize {
        let records: Vec<Arc<ResponseRecord>> =
            self.table(destination).records.values().cloned().collect();
        let failed = records.iter().filter(|record| record.fail_link()).count();
        if failed > 0 {
            warn!(%destination, failed, "link closed with exchanges in flight");
        }
        failed
    }

    fn table(&self, destination: Destination) -> MutexGuard<'_, RecordTable> {
        let table = match destination {
            Destination::Ivm => &self.ivm,
            Destination::Svm => &self.svm,
        };
        table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns a registered record; removes it from the table when dropped unless
/// [`RecordGuard::persist`] hands it over to a session.
#[derive(Debug)]
pub struct RecordGuard<'a> {
    registry: &'a Registry,
    record: Arc<ResponseRecord>,
    persisted: bool,
}

impl RecordGuard<'_> {
    pub fn record(&self) -> &Arc<ResponseRecord> {
        &self.record
    }

    pub fn seq(&self) -> u64 {
        self.record.seq()
    }

    /// Keep the record registered past this guard.
    pub fn persist(mut self) -> Arc<ResponseRecord> {
        self.persisted = true;
        Arc::clone(&self.record)
    }
}

impl Drop for RecordGuard<'_> {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        self.record.mark_closed();
        self.registry
            .take(self.record.destination(), self.record.seq());
    }
}
