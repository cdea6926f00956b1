//! Submission election for redundant producers.
//!
//! Every connected mod client forwards the same upstream chat lines in the
//! same order. Instead of comparing content, each session counts its own
//! submissions per stream; the session whose count matches the stream's
//! global count is elected to process the line, everyone else skips it.
//!
//! A session that misses a line stays one behind for every following
//! submission until it is explicitly resynchronized.

use std::fmt;

/// One of the two independent logical feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Main chat classification feed.
    Main,
    /// High-rank action feed.
    Secondary,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str("main"),
            Self::Secondary => f.write_str("secondary"),
        }
    }
}

/// Outcome of admitting a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// This submission is the one to classify and broadcast.
    Elected,
    /// Another session already handled this index.
    Skip,
}

/// Global progress of a single stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamState {
    global_index: u64,
}

impl StreamState {
    pub fn global_index(&self) -> u64 {
        self.global_index
    }
}

/// Per-session progress on both streams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCursor {
    main: u64,
    secondary: u64,
}

impl SessionCursor {
    /// Get the local index for a stream.
    pub fn index(&self, stream: StreamKind) -> u64 {
        match stream {
            StreamKind::Main => self.main,
            StreamKind::Secondary => self.secondary,
        }
    }

    fn index_mut(&mut self, stream: StreamKind) -> &mut u64 {
        match stream {
            StreamKind::Main => &mut self.main,
            StreamKind::Secondary => &mut self.secondary,
        }
    }
}

/// Owns the global counters of both streams.
///
/// Not thread-safe by itself: the relay task is its only writer.
#[derive(Debug, Default)]
pub struct SequenceCoordinator {
    main: StreamState,
    secondary: StreamState,
}

impl SequenceCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn stream_mut(&mut self, stream: StreamKind) -> &mut StreamState {
        match stream {
            StreamKind::Main => &mut self.main,
            StreamKind::Secondary => &mut self.secondary,
        }
    }

    /// Current global index of a stream.
    pub fn global_index(&self, stream: StreamKind) -> u64 {
        match stream {
            StreamKind::Main => self.main.global_index(),
            StreamKind::Secondary => self.secondary.global_index(),
        }
    }

    /// Cursor for a newly joined session: caught up, no history.
    pub fn snapshot(&self) -> SessionCursor {
        SessionCursor {
            main: self.main.global_index,
            secondary: self.secondary.global_index,
        }
    }

    /// Decide whether the submission is elected, advancing counters.
    ///
    /// The local index always advances; the global index only on election.
    pub fn admit(&mut self, stream: StreamKind, cursor: &mut SessionCursor) -> Admission {
        let state = self.stream_mut(stream);
        let local = cursor.index_mut(stream);

        if *local == state.global_index {
            *local += 1;
            state.global_index += 1;
            Admission::Elected
        } else {
            *local += 1;
            Admission::Skip
        }
    }

    /// Bring a cursor back in line with the global index of a stream.
    ///
    /// Returns `true` if the cursor actually moved.
    pub fn resync(&self, stream: StreamKind, cursor: &mut SessionCursor) -> bool {
        let global = self.global_index(stream);
        let local = cursor.index_mut(stream);
        if *local == global {
            return false;
        }
        *local = global;
        true
    }
}
