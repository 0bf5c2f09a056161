//! Values that flow through one control cycle.

/// One calibrated reading. `timestamp_ms` is monotonic, relative to the
/// scale's start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightSample {
    pub grams: f32,
    pub timestamp_ms: u64,
}

impl WeightSample {
    pub fn new(grams: f32, timestamp_ms: u64) -> Self {
        Self {
            grams,
            timestamp_ms,
        }
    }
}

/// Quality grade. A is the most desirable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grade {
    A,
    B,
    C,
}

impl Grade {
    /// Desirability rank: C = 0, B = 1, A = 2.
    pub const fn rank(self) -> u8 {
        match self {
            Grade::C => 0,
            Grade::B => 1,
            Grade::A => 2,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
        }
    }

    pub(crate) const fn to_u8(self) -> u8 {
        match self {
            Grade::A => b'A',
            Grade::B => b'B',
            Grade::C => b'C',
        }
    }

    pub(crate) const fn from_u8(b: u8) -> Option<Self> {
        match b {
            b'A' => Some(Grade::A),
            b'B' => Some(Grade::B),
            b'C' => Some(Grade::C),
            _ => None,
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    LocalSensor,
    RemoteOverride,
}

impl DecisionSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            DecisionSource::LocalSensor => "local",
            DecisionSource::RemoteOverride => "remote",
        }
    }
}

/// Outcome of one classification event; consumed once by the sequencer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradeDecision {
    pub grade: Grade,
    pub source: DecisionSource,
    /// Stabilized weight for local decisions; `None` for overrides.
    pub weight: Option<f32>,
}

impl GradeDecision {
    pub fn local(grade: Grade, grams: f32) -> Self {
        Self {
            grade,
            source: DecisionSource::LocalSensor,
            weight: Some(grams),
        }
    }

    pub fn remote(grade: Grade) -> Self {
        Self {
            grade,
            source: DecisionSource::RemoteOverride,
            weight: None,
        }
    }
}
