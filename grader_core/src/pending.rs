//! Single-slot, last-write-wins holder for a remotely supplied grade.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::GraderError;
use crate::types::Grade;

const EMPTY: u8 = 0;

/// Cloneable handle to one shared slot. `take` reads and clears atomically.
#[derive(Debug, Clone, Default)]
pub struct PendingOverride {
    slot: Arc<AtomicU8>,
}

impl PendingOverride {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `grade`, replacing any unconsumed value.
    pub fn set(&self, grade: Grade) -> Option<Grade> {
        Grade::from_u8(self.slot.swap(grade.to_u8(), Ordering::AcqRel))
    }

    pub fn take(&self) -> Option<Grade> {
        Grade::from_u8(self.slot.swap(EMPTY, Ordering::AcqRel))
    }

    pub fn peek(&self) -> Option<Grade> {
        Grade::from_u8(self.slot.load(Ordering::Acquire))
    }
}

/// Parse an override payload: exactly `A`, `B` or `C`, surrounding whitespace
/// ignored.
pub fn parse_grade(payload: &[u8]) -> Result<Grade, GraderError> {
    let grade = match payload.trim_ascii() {
        [b] => Grade::from_u8(*b),
        _ => None,
    };
    grade.ok_or_else(|| GraderError::UnknownGrade(String::from_utf8_lossy(payload).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_write_wins() {
        let p = PendingOverride::new();
        assert_eq!(p.set(Grade::A), None);
        assert_eq!(p.set(Grade::C), Some(Grade::A));
        assert_eq!(p.peek(), Some(Grade::C));
        assert_eq!(p.take(), Some(Grade::C));
        assert_eq!(p.take(), None);
    }

    #[test]
    fn clones_share_the_slot() {
        let p = PendingOverride::new();
        let q = p.clone();
        q.set(Grade::B);
        assert_eq!(p.take(), Some(Grade::B));
        assert_eq!(q.peek(), None);
    }

    #[test]
    fn parses_grades() {
        assert_eq!(parse_grade(b"A"), Ok(Grade::A));
        assert_eq!(parse_grade(b" B\n"), Ok(Grade::B));
        assert_eq!(parse_grade(b"C"), Ok(Grade::C));
    }

    #[test]
    fn rejects_everything_else() {
        for p in [&b"X"[..], b"a", b"AB", b"", b"  ", b"\xff"] {
            assert!(matches!(parse_grade(p), Err(GraderError::UnknownGrade(_))), "{p:?}");
        }
    }
}
