//! Music Score Representation (MSR)
//!
//! Format-neutral score tree shared by every converter of the crate.
//!
//! ```text
//! MusicXML ──translator──▶ ScoreBuilder ──finish()──▶ FinishedScore ──browse()──▶ generators
//!                            │  builder.rs        hierarchy + registration
//!                            │  context.rs        clef/key/time/transpose propagation
//!                            │  repeats.rs        repeat state machine
//!                            │  rest_measures.rs  multiple-rest compression
//! ```
//!
//! All timed quantities are [`Duration`]s, exact rationals. Entities live in
//! arenas owned by the [`Score`] and refer to each other through typed ids.
//! Construction is single-threaded and strictly ordered; the finished tree
//! is read-only.

pub mod arena;
pub mod builder;
pub mod context;
pub mod diagnostics;
pub mod duration;
pub mod entities;
pub mod errors;
pub mod options;
pub mod repeats;
pub mod rest_measures;
pub mod summary;
pub mod types;
pub mod visitor;

pub use arena::{MeasureId, PartGroupId, PartId, RepeatId, RestMeasuresId, StaffId, VoiceId};
pub use builder::{voice_display_key, ScoreBuilder};
pub use context::{ContextAspect, ContextOutcome, ContextState, ContextStates, ContextValue};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use duration::{Duration, NoteType, TupletFactor};
pub use entities::{
    Chord, Creator, Identification, Measure, MeasureElement, MeasureImplicitKind, Part, PartGroup,
    PartGroupElement, PartGroupSymbol, Repeat, RepeatEnding, RestMeasures, Score, Staff, StaffKind,
    Voice, VoiceElement, VoiceKind, FIGURED_BASS_VOICE_NUMBER_OFFSET, HARMONY_VOICE_NUMBER_OFFSET,
};
pub use errors::{MsrError, MsrErrorKind, MsrResult};
pub use options::{MsrOptions, VoiceOverflowPolicy};
pub use repeats::{RepeatPhase, RepeatState};
pub use rest_measures::next_measure_number;
pub use summary::ScoreSummary;
pub use types::*;
pub use visitor::{Descend, FinishedScore, MsrNode, MsrVisitor};
