//! State of one open multipart upload.

use crate::types::CompletedPart;
use parking_lot::Mutex;

/// How an upload session was finalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Parts may still be added.
    Open,
    /// The completion call was issued.
    Completed,
    /// The abort call was issued.
    Aborted,
}

/// An open multipart upload and the parts uploaded into it so far.
///
/// Workers append parts concurrently. Exactly one of complete or abort may
/// be issued, and only once.
#[derive(Debug)]
pub struct UploadSession {
    bucket: String,
    key: String,
    upload_id: String,
    parts: Mutex<Vec<CompletedPart>>,
    state: Mutex<SessionState>,
}

impl UploadSession {
    /// Track a freshly created upload.
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        upload_id: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            upload_id: upload_id.into(),
            parts: Mutex::new(Vec::new()),
            state: Mutex::new(SessionState::Open),
        }
    }

    /// Bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Upload ID.
    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    /// Record an uploaded part.
    pub fn add_part(&self, part: CompletedPart) {
        self.parts.lock().push(part);
    }

    /// Number of recorded parts.
    pub fn part_count(&self) -> usize {
        self.parts.lock().len()
    }

    /// Sum of recorded part sizes.
    pub fn total_size(&self) -> u64 {
        self.parts.lock().iter().map(|p| p.size).sum()
    }

    /// The completion manifest, in ascending part-number order.
    pub fn sorted_parts(&self) -> Vec<CompletedPart> {
        let mut parts = self.parts.lock().clone();
        parts.sort_by_key(|p| p.part_number);
        parts
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Claim the right to complete. False if the session was already
    /// finalised.
    pub fn begin_complete(&self) -> bool {
        self.transition(SessionState::Completed)
    }

    /// Claim the right to abort. False if the session was already finalised.
    pub fn begin_abort(&self) -> bool {
        self.transition(SessionState::Aborted)
    }

    /// Reopen a session whose completion call failed, so it can be aborted.
    pub fn completion_failed(&self) {
        let mut state = self.state.lock();
        if *state == SessionState::Completed {
            *state = SessionState::Open;
        }
    }

    fn transition(&self, to: SessionState) -> bool {
        let mut state = self.state.lock();
        if *state != SessionState::Open {
            return false;
        }
        *state = to;
        true
    }
}
