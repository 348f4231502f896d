//! Repeat state machine
//!
//! ```text
//!  NoRepeat ──start──▶ RepeatOpen ──ending start──▶ InEnding(n) ──ending end──▶ RepeatOpen
//!     ▲                    │                            │
//!     └──────── end ───────┘                            └─ end, then ending end ─▶ (pop)
//!
//!  (closed repeat) ──ending start──▶ InEnding(n+1), reopened ──ending end──▶ (pop)
//! ```
//!
//! Repeats nest: the machine keeps a stack of open repeats, and elements
//! appended to a voice go to the innermost open section (the common part or
//! the current ending).
//!
//! Repeat structure is a part-wide concept stored per voice. Every event is
//! decided once against the part's [`PartRepeats`] and the resulting
//! transition is then applied to each voice of the part, so all per-voice
//! machines stay in equivalent states. The part record also seeds voices
//! created while repeats are open.

use crate::msr::arena::{PartId, RepeatId, VoiceId};
use crate::msr::builder::ScoreBuilder;
use crate::msr::entities::{Repeat, RepeatEnding, VoiceElement};
use crate::msr::errors::{MsrError, MsrResult};
use crate::msr::types::{InputLine, RepeatEndingKind};
use serde::Serialize;

/// Section of an open repeat receiving new elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RepeatPhase {
    Common,
    /// Index of the ending being filled
    Ending(usize),
}

/// Observable state of a voice's or a part's repeat machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RepeatState {
    NoRepeat,
    RepeatOpen { depth: usize },
    InEnding { depth: usize, ending: usize },
}

/// Open repeat in a voice
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OpenRepeat {
    pub repeat: RepeatId,
    pub phase: RepeatPhase,
    /// The backward repeat arrived while an ending was open
    pub end_seen: bool,
    /// A closed repeat taken up again by a later ending
    pub reopened: bool,
}

/// Open repeat as the part sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatShape {
    pub input_line: InputLine,
    pub phase: RepeatPhase,
    pub end_seen: bool,
    pub reopened: bool,
    /// Numbering of each ending so far
    pub endings: Vec<String>,
}

impl RepeatShape {
    fn new(input_line: InputLine) -> Self {
        RepeatShape {
            input_line,
            phase: RepeatPhase::Common,
            end_seen: false,
            reopened: false,
            endings: Vec::new(),
        }
    }
}

/// Part-level record of the repeat events seen so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartRepeats {
    pub open: Vec<RepeatShape>,
    /// Most recently closed repeat, with the measures started since
    pub just_closed: Option<(RepeatShape, u32)>,
}

impl PartRepeats {
    pub fn state(&self) -> RepeatState {
        match self.open.last() {
            None => RepeatState::NoRepeat,
            Some(shape) => state_for(self.open.len(), shape.phase),
        }
    }

    pub(crate) fn measure_started(&mut self) {
        if let Some((_, measures)) = &mut self.just_closed {
            *measures += 1;
        }
    }

    fn close_top(&mut self) {
        if let Some(shape) = self.open.pop() {
            self.just_closed = Some((shape, 0));
        }
    }

    /// A closed repeat can take another ending only from the measure right
    /// after its end
    fn reopenable(&self) -> Option<&RepeatShape> {
        self.just_closed
            .as_ref()
            .filter(|(_, measures)| *measures <= 1)
            .map(|(shape, _)| shape)
    }
}

fn state_for(depth: usize, phase: RepeatPhase) -> RepeatState {
    match phase {
        RepeatPhase::Common => RepeatState::RepeatOpen { depth },
        RepeatPhase::Ending(ending) => RepeatState::InEnding { depth, ending },
    }
}

/// Where a voice's next elements go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sink {
    Voice,
    Common(RepeatId),
    Ending(RepeatId, usize),
}

/// Transition decided against the part record, applied to every voice
#[derive(Debug, Clone, PartialEq, Eq)]
enum Transition {
    Start,
    ImplicitStart,
    EndingStart { numbering: String, reopen: bool },
    EndingEnd { kind: RepeatEndingKind, close: bool },
    End { measure_number: String, times: u32, close: bool },
    /// Backward repeat at the end of an ending that already closed its repeat
    EndAfterEnding { times: u32 },
}

impl ScoreBuilder {
    // ========================================================================
    // PART-LEVEL EVENTS
    // ========================================================================

    pub fn handle_repeat_start(&mut self, line: InputLine, part: PartId) -> MsrResult<()> {
        let repeats = &mut self.score.parts[part].repeats;
        repeats.open.push(RepeatShape::new(line));
        repeats.just_closed = None;
        self.broadcast(line, part, Transition::Start);
        Ok(())
    }

    /// Open a repeat collecting everything since the last repeat of each
    /// voice, for sources whose first repeat has no forward bar line
    pub fn handle_implicit_repeat_start(&mut self, line: InputLine, part: PartId) {
        let repeats = &mut self.score.parts[part].repeats;
        repeats.open.push(RepeatShape::new(line));
        repeats.just_closed = None;
        self.diagnostics
            .info(line, "repeat end without start, assuming a repeat from the start");
        self.broadcast(line, part, Transition::ImplicitStart);
    }

    pub fn handle_repeat_ending_start(
        &mut self,
        line: InputLine,
        part: PartId,
        numbering: &str,
    ) -> MsrResult<()> {
        let top_phase = self.score.parts[part].repeats.open.last().map(|s| s.phase);
        if let Some(RepeatPhase::Ending(_)) = top_phase {
            self.diagnostics.warning(
                line,
                format!("repeat ending \"{}\" starts before the previous ending stopped", numbering),
            );
            self.handle_repeat_ending_end(line, part, numbering, RepeatEndingKind::Hookless)?;
        }

        let repeats = &mut self.score.parts[part].repeats;
        let extends_open = matches!(
            repeats.open.last(),
            Some(shape) if shape.phase == RepeatPhase::Common && !shape.end_seen
        );
        let shape = if extends_open {
            repeats.open.last_mut()
        } else {
            let Some(closed) = repeats.reopenable().cloned() else {
                return Err(MsrError::RepeatEndingOutsideRepeat {
                    line,
                    numbering: numbering.to_string(),
                });
            };
            repeats.open.push(RepeatShape {
                end_seen: true,
                reopened: true,
                ..closed
            });
            repeats.just_closed = None;
            repeats.open.last_mut()
        };
        if let Some(shape) = shape {
            shape.phase = RepeatPhase::Ending(shape.endings.len());
            shape.endings.push(numbering.to_string());
        }
        let reopen = !extends_open;

        self.broadcast(
            line,
            part,
            Transition::EndingStart {
                numbering: numbering.to_string(),
                reopen,
            },
        );
        Ok(())
    }

    pub fn handle_repeat_ending_end(
        &mut self,
        line: InputLine,
        part: PartId,
        numbering: &str,
        kind: RepeatEndingKind,
    ) -> MsrResult<()> {
        let repeats = &mut self.score.parts[part].repeats;
        let close = match repeats.open.last_mut() {
            Some(shape) => match shape.phase {
                RepeatPhase::Ending(_) if shape.end_seen => true,
                RepeatPhase::Ending(_) => {
                    shape.phase = RepeatPhase::Common;
                    false
                }
                RepeatPhase::Common => {
                    return Err(MsrError::UnmatchedRepeatEndingEnd {
                        line,
                        numbering: numbering.to_string(),
                    })
                }
            },
            None => {
                return Err(MsrError::UnmatchedRepeatEndingEnd {
                    line,
                    numbering: numbering.to_string(),
                })
            }
        };
        if close {
            repeats.close_top();
        }

        self.broadcast(line, part, Transition::EndingEnd { kind, close });
        Ok(())
    }

    pub fn handle_repeat_end(
        &mut self,
        line: InputLine,
        part: PartId,
        measure_number: &str,
        times: u32,
    ) -> MsrResult<()> {
        let repeats = &mut self.score.parts[part].repeats;
        let transition = match repeats.open.last_mut() {
            Some(shape) => match shape.phase {
                RepeatPhase::Common => {
                    repeats.close_top();
                    Transition::End {
                        measure_number: measure_number.to_string(),
                        times,
                        close: true,
                    }
                }
                RepeatPhase::Ending(_) => {
                    shape.end_seen = true;
                    Transition::End {
                        measure_number: measure_number.to_string(),
                        times,
                        close: false,
                    }
                }
            },
            None => match &repeats.just_closed {
                Some((shape, 0)) if !shape.endings.is_empty() => Transition::EndAfterEnding { times },
                _ => {
                    return Err(MsrError::UnmatchedRepeatEnd {
                        line,
                        measure_number: measure_number.to_string(),
                    })
                }
            },
        };

        self.broadcast(line, part, transition);
        Ok(())
    }

    /// Repeat state of a part
    pub fn part_repeat_state(&self, part: PartId) -> RepeatState {
        self.score.parts[part].repeats.state()
    }

    /// Repeat state of a voice
    pub fn repeat_state(&self, voice: VoiceId) -> RepeatState {
        let stack = &self.score.voices[voice].repeat_stack;
        match stack.last() {
            None => RepeatState::NoRepeat,
            Some(open) => state_for(stack.len(), open.phase),
        }
    }

    fn broadcast(&mut self, line: InputLine, part: PartId, transition: Transition) {
        let voices = self.score.part_voices(part);
        for voice in &voices {
            self.apply_transition(line, *voice, &transition);
        }

        let expected = self.part_repeat_state(part);
        for voice in voices {
            let state = self.repeat_state(voice);
            if state != expected {
                self.diagnostics.error(
                    line,
                    format!(
                        "voice {} is in repeat state {:?}, its part in {:?}",
                        self.score.voices[voice].number, state, expected
                    ),
                );
            }
        }
        log::debug!(
            "line {}: {:?} in part \"{}\", now {:?}",
            line,
            transition,
            self.score.parts[part].id,
            expected
        );
    }

    // ========================================================================
    // PER-VOICE TRANSITIONS
    // ========================================================================

    fn apply_transition(&mut self, line: InputLine, voice: VoiceId, transition: &Transition) {
        match transition {
            Transition::Start => {
                let current = self.take_current_measure(voice);
                self.open_repeat(line, voice, Vec::new());
                if let Some(current) = current {
                    self.push_voice_element(voice, current);
                }
            }
            Transition::ImplicitStart => {
                let sink = self.current_sink(voice);
                let elements = self.sink_elements_mut(voice, sink);
                let first = elements
                    .iter()
                    .rposition(|e| matches!(e, VoiceElement::Repeat(_)))
                    .map_or(0, |p| p + 1);
                let collected = elements.split_off(first);
                self.open_repeat(line, voice, collected);
            }
            Transition::EndingStart { numbering, reopen } => {
                let current = self.take_current_measure(voice);
                if *reopen {
                    self.reopen_repeat(line, voice);
                }
                if let Some(open) = self.score.voices[voice].repeat_stack.last_mut() {
                    let repeat = &mut self.score.repeats[open.repeat];
                    open.phase = RepeatPhase::Ending(repeat.endings.len());
                    repeat.endings.push(RepeatEnding::new(line, numbering));
                }
                if let Some(current) = current {
                    self.push_voice_element(voice, current);
                }
            }
            Transition::EndingEnd { kind, close } => {
                let stack = &mut self.score.voices[voice].repeat_stack;
                let Some(open) = stack.last_mut() else {
                    return;
                };
                let repeat = &mut self.score.repeats[open.repeat];
                if let Some(ending) = repeat.endings.last_mut() {
                    ending.kind = Some(*kind);
                }
                if *close {
                    repeat.closed = true;
                    stack.pop();
                } else {
                    open.phase = RepeatPhase::Common;
                }
            }
            Transition::End {
                measure_number,
                times,
                close,
            } => {
                let stack = &mut self.score.voices[voice].repeat_stack;
                let Some(open) = stack.last_mut() else {
                    return;
                };
                let repeat = &mut self.score.repeats[open.repeat];
                repeat.times = *times;
                repeat.end_measure_number = Some(measure_number.clone());
                if *close {
                    repeat.closed = true;
                    stack.pop();
                } else {
                    open.end_seen = true;
                }
            }
            Transition::EndAfterEnding { times } => {
                let sink = self.current_sink(voice);
                if let Some(VoiceElement::Repeat(repeat)) = self.sink_elements_mut(voice, sink).last().copied() {
                    let repeat = &mut self.score.repeats[repeat];
                    repeat.times = repeat.times.max(*times);
                }
            }
        }
    }

    fn open_repeat(&mut self, line: InputLine, voice: VoiceId, common: Vec<VoiceElement>) -> RepeatId {
        let mut repeat = Repeat::new(line);
        repeat.common = common;
        let repeat = self.score.repeats.alloc(repeat);
        self.push_voice_element(voice, VoiceElement::Repeat(repeat));
        self.score.voices[voice].repeat_stack.push(OpenRepeat {
            repeat,
            phase: RepeatPhase::Common,
            end_seen: false,
            reopened: false,
        });
        repeat
    }

    /// Take up again the repeat closed just before the current measure
    fn reopen_repeat(&mut self, line: InputLine, voice: VoiceId) {
        let sink = self.current_sink(voice);
        let repeat = match self.sink_elements_mut(voice, sink).last().copied() {
            Some(VoiceElement::Repeat(repeat)) => repeat,
            _ => {
                log::debug!("line {}: voice has no closed repeat to reopen, opening an empty one", line);
                let mut repeat = Repeat::new(line);
                repeat.closed = true;
                let repeat = self.score.repeats.alloc(repeat);
                self.push_voice_element(voice, VoiceElement::Repeat(repeat));
                repeat
            }
        };
        self.score.voices[voice].repeat_stack.push(OpenRepeat {
            repeat,
            phase: RepeatPhase::Common,
            end_seen: true,
            reopened: true,
        });
    }

    /// Give a new voice the repeats its part has open
    pub(crate) fn replicate_repeat_shape(&mut self, part: PartId, voice: VoiceId) {
        let shapes = self.score.parts[part].repeats.open.clone();
        for shape in shapes {
            let mut repeat = Repeat::new(shape.input_line);
            repeat.closed = shape.reopened;
            repeat.endings = shape
                .endings
                .iter()
                .map(|numbering| RepeatEnding::new(shape.input_line, numbering))
                .collect();
            let repeat = self.score.repeats.alloc(repeat);
            self.push_voice_element(voice, VoiceElement::Repeat(repeat));
            self.score.voices[voice].repeat_stack.push(OpenRepeat {
                repeat,
                phase: shape.phase,
                end_seen: shape.end_seen,
                reopened: shape.reopened,
            });
        }
    }

    /// Close whatever the part left open at the end of the score
    pub(crate) fn close_open_repeats_in_part(&mut self, line: InputLine, part: PartId) {
        let open = std::mem::take(&mut self.score.parts[part].repeats.open);
        if let Some(outermost) = open.first() {
            self.diagnostics.warning(
                outermost.input_line,
                format!(
                    "{} repeat(s) in part \"{}\" never closed",
                    open.len(),
                    self.score.parts[part].id
                ),
            );
        }
        for voice in self.score.part_voices(part) {
            while let Some(open) = self.score.voices[voice].repeat_stack.pop() {
                let repeat = &mut self.score.repeats[open.repeat];
                repeat.closed = true;
                if let Some(ending) = repeat.endings.last_mut() {
                    ending.kind.get_or_insert(RepeatEndingKind::Hookless);
                }
            }
        }
        log::trace!("line {}: repeats of part \"{}\" closed", line, self.score.parts[part].id);
    }

    // ========================================================================
    // SINKS
    // ========================================================================

    pub(crate) fn current_sink(&self, voice: VoiceId) -> Sink {
        match self.score.voices[voice].repeat_stack.last() {
            None => Sink::Voice,
            Some(open) => match open.phase {
                RepeatPhase::Common => Sink::Common(open.repeat),
                RepeatPhase::Ending(index) => Sink::Ending(open.repeat, index),
            },
        }
    }

    pub(crate) fn sink_elements_mut(&mut self, voice: VoiceId, sink: Sink) -> &mut Vec<VoiceElement> {
        match sink {
            Sink::Voice => &mut self.score.voices[voice].elements,
            Sink::Common(repeat) => &mut self.score.repeats[repeat].common,
            Sink::Ending(repeat, index) => &mut self.score.repeats[repeat].endings[index].elements,
        }
    }

    pub(crate) fn push_voice_element(&mut self, voice: VoiceId, element: VoiceElement) {
        let sink = self.current_sink(voice);
        self.sink_elements_mut(voice, sink).push(element);
    }

    /// Remove the voice's current measure from its section, so that a
    /// section starting at this measure can take it
    fn take_current_measure(&mut self, voice: VoiceId) -> Option<VoiceElement> {
        let current = VoiceElement::Measure(self.score.voices[voice].last_measure?);
        let sink = self.current_sink(voice);
        let elements = self.sink_elements_mut(voice, sink);
        if elements.last() == Some(&current) {
            elements.pop()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msr::entities::{MeasureImplicitKind, StaffKind, VoiceKind};
    use crate::msr::options::MsrOptions;

    fn part_with_voices(count: u32) -> (ScoreBuilder, PartId, Vec<VoiceId>) {
        let mut builder = ScoreBuilder::new(MsrOptions::default());
        let part = builder.create_part(1, "P1");
        let staff = builder.create_staff(1, 1, StaffKind::Regular, part).unwrap();
        let voices = (1..=count)
            .map(|n| builder.create_voice(1, n, VoiceKind::Regular, staff).unwrap())
            .collect();
        (builder, part, voices)
    }

    fn measure(builder: &mut ScoreBuilder, part: PartId, number: &str) {
        builder.create_measure_in_part(10, part, number, MeasureImplicitKind::Explicit);
    }

    #[test]
    fn test_simple_repeat_collects_measures() {
        let (mut builder, part, voices) = part_with_voices(2);
        measure(&mut builder, part, "1");
        measure(&mut builder, part, "2");
        builder.handle_repeat_start(20, part).unwrap();
        assert_eq!(builder.repeat_state(voices[0]), RepeatState::RepeatOpen { depth: 1 });
        measure(&mut builder, part, "3");
        builder.handle_repeat_end(30, part, "3", 2).unwrap();

        for voice in voices {
            assert_eq!(builder.repeat_state(voice), RepeatState::NoRepeat);
            let elements = &builder.score().voices[voice].elements;
            assert_eq!(elements.len(), 2);
            let VoiceElement::Repeat(repeat) = elements[1] else {
                panic!("expected a repeat, got {:?}", elements[1]);
            };
            let repeat = &builder.score().repeats[repeat];
            assert!(repeat.closed);
            assert_eq!(repeat.common.len(), 2);
            assert_eq!(repeat.end_measure_number.as_deref(), Some("3"));
        }
    }

    #[test]
    fn test_endings_and_reopened_second_ending() {
        let (mut builder, part, voices) = part_with_voices(1);
        measure(&mut builder, part, "1");
        builder.handle_repeat_start(10, part).unwrap();
        measure(&mut builder, part, "2");
        builder.handle_repeat_ending_start(20, part, "1").unwrap();
        assert_eq!(
            builder.part_repeat_state(part),
            RepeatState::InEnding { depth: 1, ending: 0 }
        );
        builder
            .handle_repeat_ending_end(21, part, "1", RepeatEndingKind::Hooked)
            .unwrap();
        builder.handle_repeat_end(22, part, "2", 2).unwrap();
        assert_eq!(builder.part_repeat_state(part), RepeatState::NoRepeat);

        measure(&mut builder, part, "3");
        builder.handle_repeat_ending_start(30, part, "2").unwrap();
        assert_eq!(
            builder.repeat_state(voices[0]),
            RepeatState::InEnding { depth: 1, ending: 1 }
        );
        builder
            .handle_repeat_ending_end(31, part, "2", RepeatEndingKind::Hookless)
            .unwrap();
        assert_eq!(builder.repeat_state(voices[0]), RepeatState::NoRepeat);

        let elements = &builder.score().voices[voices[0]].elements;
        assert_eq!(elements.len(), 1);
        let VoiceElement::Repeat(repeat) = elements[0] else {
            panic!("expected a repeat");
        };
        let repeat = &builder.score().repeats[repeat];
        assert_eq!(repeat.common.len(), 1);
        assert_eq!(repeat.endings.len(), 2);
        assert_eq!(repeat.endings[0].elements.len(), 1);
        assert_eq!(repeat.endings[1].elements.len(), 1);
        assert_eq!(repeat.endings[1].kind, Some(RepeatEndingKind::Hookless));
    }

    #[test]
    fn test_unmatched_repeat_end() {
        let (mut builder, part, _) = part_with_voices(1);
        measure(&mut builder, part, "1");
        let err = builder.handle_repeat_end(5, part, "1", 2).unwrap_err();
        assert_eq!(
            err,
            MsrError::UnmatchedRepeatEnd {
                line: 5,
                measure_number: "1".to_string()
            }
        );
    }

    #[test]
    fn test_ending_outside_repeat() {
        let (mut builder, part, _) = part_with_voices(1);
        measure(&mut builder, part, "1");
        let err = builder.handle_repeat_ending_start(5, part, "1").unwrap_err();
        assert!(matches!(err, MsrError::RepeatEndingOutsideRepeat { .. }));
    }

    #[test]
    fn test_nested_repeats_balance() {
        let (mut builder, part, voices) = part_with_voices(1);
        measure(&mut builder, part, "1");
        builder.handle_repeat_start(1, part).unwrap();
        measure(&mut builder, part, "2");
        builder.handle_repeat_start(2, part).unwrap();
        assert_eq!(builder.repeat_state(voices[0]), RepeatState::RepeatOpen { depth: 2 });
        builder.handle_repeat_end(3, part, "2", 2).unwrap();
        measure(&mut builder, part, "3");
        builder.handle_repeat_end(4, part, "3", 2).unwrap();
        assert_eq!(builder.repeat_state(voices[0]), RepeatState::NoRepeat);
    }

    #[test]
    fn test_implicit_start_wraps_earlier_measures() {
        let (mut builder, part, voices) = part_with_voices(1);
        measure(&mut builder, part, "1");
        measure(&mut builder, part, "2");
        builder.handle_implicit_repeat_start(5, part);
        builder.handle_repeat_end(5, part, "2", 2).unwrap();

        let elements = &builder.score().voices[voices[0]].elements;
        let [VoiceElement::Repeat(repeat)] = elements[..] else {
            panic!("expected a single repeat, got {:?}", elements);
        };
        assert_eq!(builder.score().repeats[repeat].common.len(), 2);
    }

    #[test]
    fn test_late_voice_enters_open_repeat() {
        let (mut builder, part, _) = part_with_voices(1);
        measure(&mut builder, part, "1");
        builder.handle_repeat_start(2, part).unwrap();
        let staff = builder.score().parts[part].staves[&1];
        let late = builder.create_voice(3, 2, VoiceKind::Regular, staff).unwrap();

        assert_eq!(builder.repeat_state(late), RepeatState::RepeatOpen { depth: 1 });
        builder.handle_repeat_end(4, part, "1", 2).unwrap();
        assert_eq!(builder.repeat_state(late), RepeatState::NoRepeat);
        assert!(builder.diagnostics().lines_with(crate::msr::Severity::Error).is_empty());
    }
}
