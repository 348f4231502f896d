//! Context propagation engine
//!
//! Clef, key, time and transpose are *contexts*: each part, staff and voice
//! caches the value currently in force. Appending a value to a part or a
//! staff runs a two-state machine per aspect:
//!
//! ```text
//!   Unset ──append(v)──▶ Set(v) ──append(w)──▶ Set(w)
//!                           │
//!                           └──append(v), ignore-redundant on──▶ Set(v), nothing propagated
//! ```
//!
//! A transition propagates the value down to every registered child: part
//! to staves, staff to voices, voice to its open measure. A part with
//! staves leaves the redundancy decision to each staff. Children created
//! later are seeded from their parent's cache by the builder.

use crate::msr::arena::{PartId, StaffId, VoiceId};
use crate::msr::builder::ScoreBuilder;
use crate::msr::entities::MeasureElement;
use crate::msr::options::MsrOptions;
use crate::msr::types::{Clef, InputLine, Key, Time, Transpose};
use std::fmt::Debug;

/// Value in force for one context aspect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextState<T> {
    Unset,
    Set(T),
}

impl<T> Default for ContextState<T> {
    fn default() -> Self {
        ContextState::Unset
    }
}

impl<T: Clone + PartialEq> ContextState<T> {
    pub fn current(&self) -> Option<&T> {
        match self {
            ContextState::Unset => None,
            ContextState::Set(value) => Some(value),
        }
    }

    pub fn is_set(&self) -> bool {
        matches!(self, ContextState::Set(_))
    }

    /// Move to `Set(value)` unless the value is redundant and redundancy is
    /// ignored. Returns whether a transition happened.
    pub fn transition(&mut self, value: T, ignore_redundant: bool) -> bool {
        if ignore_redundant && self.current() == Some(&value) {
            return false;
        }
        *self = ContextState::Set(value);
        true
    }
}

/// The four context aspects cached at part, staff and voice level
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextStates {
    pub clef: ContextState<Clef>,
    pub key: ContextState<Key>,
    pub time: ContextState<Time>,
    pub transpose: ContextState<Transpose>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextAspect {
    Clef,
    Key,
    Time,
    Transpose,
}

impl ContextAspect {
    pub fn name(&self) -> &'static str {
        match self {
            ContextAspect::Clef => "clef",
            ContextAspect::Key => "key",
            ContextAspect::Time => "time",
            ContextAspect::Transpose => "transpose",
        }
    }
}

impl MsrOptions {
    /// Transposes are always re-stated; only clef, key and time have a
    /// redundancy policy
    pub fn ignores_redundant(&self, aspect: ContextAspect) -> bool {
        match aspect {
            ContextAspect::Clef => self.ignore_redundant_clefs,
            ContextAspect::Key => self.ignore_redundant_keys,
            ContextAspect::Time => self.ignore_redundant_times,
            ContextAspect::Transpose => false,
        }
    }
}

/// Result of appending a context value to a part or a staff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextOutcome {
    /// The state changed; `voices` is the number of voices that received it
    Set { voices: usize },
    /// Equal to the value in force and dropped
    IgnoredRedundant,
}

/// Access to one aspect of [`ContextStates`], generic over the value type
pub trait ContextValue: Clone + PartialEq + Debug {
    const ASPECT: ContextAspect;

    fn state(states: &ContextStates) -> &ContextState<Self>;
    fn state_mut(states: &mut ContextStates) -> &mut ContextState<Self>;
    fn into_element(self) -> MeasureElement;
}

macro_rules! context_value {
    ($ty:ident, $field:ident, $aspect:ident) => {
        impl ContextValue for $ty {
            const ASPECT: ContextAspect = ContextAspect::$aspect;

            fn state(states: &ContextStates) -> &ContextState<Self> {
                &states.$field
            }

            fn state_mut(states: &mut ContextStates) -> &mut ContextState<Self> {
                &mut states.$field
            }

            fn into_element(self) -> MeasureElement {
                MeasureElement::$aspect(self)
            }
        }
    };
}

context_value!(Clef, clef, Clef);
context_value!(Key, key, Key);
context_value!(Time, time, Time);
context_value!(Transpose, transpose, Transpose);

// ============================================================================
// PROPAGATION
// ============================================================================

impl ScoreBuilder {
    pub fn append_clef_to_part(&mut self, line: InputLine, part: PartId, clef: Clef) -> ContextOutcome {
        self.append_context_to_part(line, part, clef)
    }

    pub fn append_key_to_part(&mut self, line: InputLine, part: PartId, key: Key) -> ContextOutcome {
        self.append_context_to_part(line, part, key)
    }

    pub fn append_time_to_part(&mut self, line: InputLine, part: PartId, time: Time) -> ContextOutcome {
        self.append_context_to_part(line, part, time)
    }

    pub fn append_transpose_to_part(
        &mut self,
        line: InputLine,
        part: PartId,
        transpose: Transpose,
    ) -> ContextOutcome {
        self.append_context_to_part(line, part, transpose)
    }

    pub fn append_clef_to_staff(&mut self, line: InputLine, staff: StaffId, clef: Clef) -> ContextOutcome {
        self.append_context_to_staff(line, staff, clef)
    }

    pub fn append_key_to_staff(&mut self, line: InputLine, staff: StaffId, key: Key) -> ContextOutcome {
        self.append_context_to_staff(line, staff, key)
    }

    pub fn append_time_to_staff(&mut self, line: InputLine, staff: StaffId, time: Time) -> ContextOutcome {
        self.append_context_to_staff(line, staff, time)
    }

    pub fn append_transpose_to_staff(
        &mut self,
        line: InputLine,
        staff: StaffId,
        transpose: Transpose,
    ) -> ContextOutcome {
        self.append_context_to_staff(line, staff, transpose)
    }

    /// Set a part-level context and propagate it to every staff of the part
    ///
    /// A staff may have left the part's value through a staff-level append,
    /// so with staves present each staff judges redundancy on its own value.
    /// The part's cache only decides for a part with no staff yet.
    pub fn append_context_to_part<T: ContextValue>(
        &mut self,
        line: InputLine,
        part: PartId,
        value: T,
    ) -> ContextOutcome {
        let ignore = self.options.ignores_redundant(T::ASPECT);
        let part_data = &mut self.score.parts[part];
        let changed = T::state_mut(&mut part_data.contexts).transition(value.clone(), ignore);

        let staves: Vec<StaffId> = part_data.staves.values().copied().collect();
        if staves.is_empty() && !changed {
            let message = format!(
                "ignoring redundant {} {:?} in part \"{}\"",
                T::ASPECT.name(),
                value,
                part_data.id
            );
            self.diagnostics.info(line, message);
            return ContextOutcome::IgnoredRedundant;
        }

        let mut reached_staves = 0;
        let mut voices = 0;
        for staff in &staves {
            if let ContextOutcome::Set { voices: reached } =
                self.append_context_to_staff(line, *staff, value.clone())
            {
                reached_staves += 1;
                voices += reached;
            }
        }
        if !staves.is_empty() && reached_staves == 0 {
            return ContextOutcome::IgnoredRedundant;
        }

        log::debug!(
            "line {}: {} {:?} set in part \"{}\", reached {} voice(s)",
            line,
            T::ASPECT.name(),
            value,
            self.score.parts[part].id,
            voices
        );
        ContextOutcome::Set { voices }
    }

    /// Set a staff-level context and propagate it to every voice of the staff
    pub fn append_context_to_staff<T: ContextValue>(
        &mut self,
        line: InputLine,
        staff: StaffId,
        value: T,
    ) -> ContextOutcome {
        let ignore = self.options.ignores_redundant(T::ASPECT);
        let staff_data = &mut self.score.staves[staff];
        if !T::state_mut(&mut staff_data.contexts).transition(value.clone(), ignore) {
            let message = format!(
                "ignoring redundant {} {:?} in staff {}",
                T::ASPECT.name(),
                value,
                staff_data.number
            );
            self.diagnostics.info(line, message);
            return ContextOutcome::IgnoredRedundant;
        }

        let voices = staff_data.all_voices.clone();
        for voice in &voices {
            self.append_context_to_voice(line, *voice, value.clone());
        }
        ContextOutcome::Set {
            voices: voices.len(),
        }
    }

    /// Record a context value in a voice and in its open measure
    ///
    /// Voices never ignore redundancy: their parent already decided.
    pub(crate) fn append_context_to_voice<T: ContextValue>(
        &mut self,
        line: InputLine,
        voice: VoiceId,
        value: T,
    ) {
        let voice_data = &mut self.score.voices[voice];
        T::state_mut(&mut voice_data.contexts).transition(value.clone(), false);

        let Some(measure) = voice_data.last_measure else {
            return;
        };
        let measure = &mut self.score.measures[measure];
        if measure.closed {
            return;
        }
        let element = value.into_element();
        if let MeasureElement::Time(time) = &element {
            if measure.position.is_zero() {
                measure.full_length = time.measure_length();
            }
        }
        measure.elements.push(element);
        log::trace!("line {}: {} appended to measure \"{}\"", line, T::ASPECT.name(), measure.number);
    }

    /// Current value of an aspect in a staff
    pub fn staff_context<T: ContextValue>(&self, staff: StaffId) -> Option<&T> {
        T::state(&self.score.staves[staff].contexts).current()
    }

    /// Current value of an aspect in a voice
    pub fn voice_context<T: ContextValue>(&self, voice: VoiceId) -> Option<&T> {
        T::state(&self.score.voices[voice].contexts).current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msr::entities::{StaffKind, VoiceKind};
    use crate::msr::types::KeyMode;

    #[test]
    fn test_transition_from_unset() {
        let mut state = ContextState::Unset;
        assert!(state.transition(Clef::treble(), true));
        assert_eq!(state.current(), Some(&Clef::treble()));
    }

    #[test]
    fn test_redundant_transition_ignored_only_when_asked() {
        let mut state = ContextState::Set(Key::new(2, KeyMode::Major));
        assert!(!state.transition(Key::new(2, KeyMode::Major), true));
        assert!(state.transition(Key::new(2, KeyMode::Major), false));
        assert!(state.transition(Key::new(-1, KeyMode::Major), true));
    }

    #[test]
    fn test_part_clef_restored_after_staff_change() {
        let mut builder = ScoreBuilder::new(MsrOptions::default());
        let part = builder.create_part(1, "P1");
        let staff = builder.create_staff(1, 1, StaffKind::Regular, part).unwrap();
        builder.create_voice(1, 1, VoiceKind::Regular, staff).unwrap();

        builder.append_clef_to_part(2, part, Clef::treble());
        builder.append_clef_to_staff(3, staff, Clef::bass());
        let outcome = builder.append_clef_to_part(4, part, Clef::treble());

        assert_eq!(outcome, ContextOutcome::Set { voices: 1 });
        assert_eq!(builder.staff_context::<Clef>(staff), Some(&Clef::treble()));
    }

    #[test]
    fn test_part_clef_redundant_in_every_staff() {
        let mut builder = ScoreBuilder::new(MsrOptions::default());
        let part = builder.create_part(1, "P1");
        builder.create_staff(1, 1, StaffKind::Regular, part).unwrap();
        builder.create_staff(1, 2, StaffKind::Regular, part).unwrap();

        builder.append_clef_to_part(2, part, Clef::treble());
        let outcome = builder.append_clef_to_part(3, part, Clef::treble());
        assert_eq!(outcome, ContextOutcome::IgnoredRedundant);
    }

    #[test]
    fn test_redundant_part_clef_without_staves() {
        let mut builder = ScoreBuilder::new(MsrOptions::default());
        let part = builder.create_part(1, "P1");
        builder.append_clef_to_part(2, part, Clef::treble());
        let outcome = builder.append_clef_to_part(3, part, Clef::treble());
        assert_eq!(outcome, ContextOutcome::IgnoredRedundant);
    }

    #[test]
    fn test_transpose_never_ignored() {
        let options = MsrOptions::default();
        assert!(options.ignores_redundant(ContextAspect::Clef));
        assert!(!options.ignores_redundant(ContextAspect::Transpose));
    }
}
