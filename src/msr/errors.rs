//! Error types for MSR construction
//!
//! Every error is driven by the input and carries the line number of the
//! element that triggered it. Structural errors mean the source violates an
//! MSR invariant; capacity errors may be downgraded to warnings by
//! [`VoiceOverflowPolicy`](crate::msr::VoiceOverflowPolicy).

use crate::msr::types::InputLine;
use thiserror::Error;

/// Broad classes of construction errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsrErrorKind {
    /// The source violates an MSR invariant; there is no repaired tree
    Structural,
    /// A conventional limit was exceeded
    Capacity,
}

/// Error raised while building the MSR
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MsrError {
    #[error("line {line}: staff {number} already exists in part \"{part_id}\"")]
    DuplicateStaffNumber {
        line: InputLine,
        part_id: String,
        number: u32,
    },

    #[error("line {line}: voice {number} already exists in staff {staff_number}")]
    DuplicateVoiceNumber {
        line: InputLine,
        staff_number: u32,
        number: u32,
    },

    #[error("line {line}: voice {number} would be regular voice #{count} in staff {staff_number}, maximum is {max}")]
    TooManyRegularVoices {
        line: InputLine,
        staff_number: u32,
        number: u32,
        count: usize,
        max: usize,
    },

    #[error("line {line}: backward repeat in measure \"{measure_number}\" has no matching repeat start")]
    UnmatchedRepeatEnd {
        line: InputLine,
        measure_number: String,
    },

    #[error("line {line}: repeat ending \"{numbering}\" is not inside a repeat")]
    RepeatEndingOutsideRepeat { line: InputLine, numbering: String },

    #[error("line {line}: repeat ending \"{numbering}\" stops but no ending is open")]
    UnmatchedRepeatEndingEnd { line: InputLine, numbering: String },

    #[error("line {line}: measure \"{measure_number}\" is closed and cannot be appended to")]
    ClosedMeasureMutation {
        line: InputLine,
        measure_number: String,
    },

    #[error("line {line}: cannot compress {expected} rest measures, only {found} are available")]
    RestMeasuresUnderflow {
        line: InputLine,
        expected: usize,
        found: usize,
    },
}

impl MsrError {
    /// Input line of the element that triggered the error
    pub fn line(&self) -> InputLine {
        match self {
            MsrError::DuplicateStaffNumber { line, .. }
            | MsrError::DuplicateVoiceNumber { line, .. }
            | MsrError::TooManyRegularVoices { line, .. }
            | MsrError::UnmatchedRepeatEnd { line, .. }
            | MsrError::RepeatEndingOutsideRepeat { line, .. }
            | MsrError::UnmatchedRepeatEndingEnd { line, .. }
            | MsrError::ClosedMeasureMutation { line, .. }
            | MsrError::RestMeasuresUnderflow { line, .. } => *line,
        }
    }

    pub fn kind(&self) -> MsrErrorKind {
        match self {
            MsrError::TooManyRegularVoices { .. } => MsrErrorKind::Capacity,
            _ => MsrErrorKind::Structural,
        }
    }
}

/// Result type for MSR construction operations
pub type MsrResult<T> = Result<T, MsrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_line_and_kind() {
        let err = MsrError::TooManyRegularVoices {
            line: 42,
            staff_number: 1,
            number: 5,
            count: 5,
            max: 4,
        };
        assert_eq!(err.line(), 42);
        assert_eq!(err.kind(), MsrErrorKind::Capacity);

        let err = MsrError::UnmatchedRepeatEnd {
            line: 7,
            measure_number: "12".to_string(),
        };
        assert_eq!(err.kind(), MsrErrorKind::Structural);
        assert!(err.to_string().contains("\"12\""));
    }
}
