//! Single-slot edit sessions, one per entity type.
//!
//! An open session blocks a second edit and any delete of the same entity
//! type until it is committed or cancelled. This only protects against two
//! interleaved requests from the one UI; it is not a lock.

use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::error::CascadeError;

pub type EditToken = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Semester,
    Course,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Semester => "semester",
            EntityKind::Course => "course",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    Editing,
    Confirming,
    Persisting,
}

#[derive(Debug, Clone)]
struct Session {
    token: EditToken,
    record_id: i64,
    state: SessionState,
}

#[derive(Debug, Default)]
pub struct EditGuard {
    semester: Option<Session>,
    course: Option<Session>,
}

impl EditGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, kind: EntityKind) -> &Option<Session> {
        match kind {
            EntityKind::Semester => &self.semester,
            EntityKind::Course => &self.course,
        }
    }

    fn slot_mut(&mut self, kind: EntityKind) -> &mut Option<Session> {
        match kind {
            EntityKind::Semester => &mut self.semester,
            EntityKind::Course => &mut self.course,
        }
    }

    fn session_mut(
        &mut self,
        kind: EntityKind,
        token: EditToken,
    ) -> Result<&mut Session, CascadeError> {
        match self.slot_mut(kind) {
            Some(s) if s.token == token => Ok(s),
            _ => Err(CascadeError::UnknownSession { kind }),
        }
    }

    pub fn state(&self, kind: EntityKind) -> SessionState {
        self.slot(kind)
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(SessionState::Idle)
    }

    pub fn ensure_idle(&self, kinds: &[EntityKind]) -> Result<(), CascadeError> {
        for &kind in kinds {
            if self.slot(kind).is_some() {
                return Err(CascadeError::OperationInProgress { kind });
            }
        }
        Ok(())
    }

    /// Idle -> Editing.
    pub fn begin_edit(&mut self, kind: EntityKind, record_id: i64) -> Result<EditToken, CascadeError> {
        self.open(kind, record_id, SessionState::Editing)
    }

    /// Idle -> Confirming. Deletes have no editing phase.
    pub fn begin_delete(
        &mut self,
        kind: EntityKind,
        record_id: i64,
    ) -> Result<EditToken, CascadeError> {
        self.open(kind, record_id, SessionState::Confirming)
    }

    fn open(
        &mut self,
        kind: EntityKind,
        record_id: i64,
        state: SessionState,
    ) -> Result<EditToken, CascadeError> {
        self.ensure_idle(&[kind])?;
        let token = Uuid::new_v4();
        *self.slot_mut(kind) = Some(Session {
            token,
            record_id,
            state,
        });
        Ok(token)
    }

    /// Record id of an open session that is waiting for a submission.
    pub fn editing_record(&self, kind: EntityKind, token: EditToken) -> Result<i64, CascadeError> {
        match self.slot(kind) {
            Some(s) if s.token == token && s.state == SessionState::Editing => Ok(s.record_id),
            _ => Err(CascadeError::UnknownSession { kind }),
        }
    }

    pub fn advance(
        &mut self,
        kind: EntityKind,
        token: EditToken,
        to: SessionState,
    ) -> Result<(), CascadeError> {
        let session = self.session_mut(kind, token)?;
        let allowed = matches!(
            (session.state, to),
            (SessionState::Editing, SessionState::Confirming)
                | (SessionState::Confirming, SessionState::Persisting)
                | (SessionState::Confirming, SessionState::Editing)
                | (SessionState::Persisting, SessionState::Editing)
        );
        if !allowed {
            return Err(CascadeError::UnknownSession { kind });
        }
        session.state = to;
        Ok(())
    }

    /// Back to Editing after a rejected submission; the token stays valid.
    pub fn reopen(&mut self, kind: EntityKind, token: EditToken) {
        if let Ok(session) = self.session_mut(kind, token) {
            session.state = SessionState::Editing;
        }
    }

    /// Any state -> Idle.
    pub fn finish(&mut self, kind: EntityKind, token: EditToken) {
        let slot = self.slot_mut(kind);
        if slot.as_ref().map(|s| s.token == token).unwrap_or(false) {
            *slot = None;
        }
    }

    pub fn cancel(&mut self, kind: EntityKind, token: EditToken) -> Result<(), CascadeError> {
        self.editing_record(kind, token)?;
        self.finish(kind, token);
        Ok(())
    }
}
