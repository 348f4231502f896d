//! Read-only MSR and its traversal
//!
//! [`FinishedScore`] is what output generators receive. It offers no
//! mutation, so once [`ScoreBuilder::finish`](crate::msr::ScoreBuilder::finish)
//! has run the tree can only be read.
//!
//! Traversal is a depth-first walk over the closed set of [`MsrNode`] kinds.
//! A visitor sees each node twice, on `enter` and on `leave`, and may skip a
//! node's children by returning [`Descend::Skip`] from `enter`.

use crate::msr::arena::{MeasureId, PartGroupId, PartId, RepeatId, RestMeasuresId, StaffId, VoiceId};
use crate::msr::diagnostics::Diagnostics;
use crate::msr::duration::Duration;
use crate::msr::entities::{
    Chord, Identification, Measure, MeasureElement, Part, PartGroup, PartGroupElement, Repeat,
    RepeatEnding, RestMeasures, Score, Staff, Voice, VoiceElement,
};
use crate::msr::options::MsrOptions;
use crate::msr::types::{
    Barline, Clef, FiguredBass, Harmony, Key, Note, StaffDetails, Time, Transpose, VoiceStaffChange,
};

/// Any node of the MSR tree
#[derive(Debug, Clone, Copy)]
pub enum MsrNode<'a> {
    Score(&'a Score),
    Identification(&'a Identification),
    PartGroup(PartGroupId, &'a PartGroup),
    Part(PartId, &'a Part),
    Staff(StaffId, &'a Staff),
    Voice(VoiceId, &'a Voice),
    Repeat(RepeatId, &'a Repeat),
    /// Common section of a repeat, entered before its endings
    RepeatCommon(RepeatId, &'a Repeat),
    RepeatEnding(usize, &'a RepeatEnding),
    RestMeasures(RestMeasuresId, &'a RestMeasures),
    Measure(MeasureId, &'a Measure),
    Note(&'a Note),
    Chord(&'a Chord),
    Clef(&'a Clef),
    Key(&'a Key),
    Time(&'a Time),
    Transpose(&'a Transpose),
    Barline(&'a Barline),
    StaffDetails(&'a StaffDetails),
    VoiceStaffChange(&'a VoiceStaffChange),
    Harmony(&'a Harmony),
    FiguredBass(&'a FiguredBass),
}

/// Whether to walk a node's children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descend {
    Children,
    Skip,
}

/// Reader of a finished MSR
pub trait MsrVisitor {
    fn enter(&mut self, _node: MsrNode<'_>) -> Descend {
        Descend::Children
    }

    fn leave(&mut self, _node: MsrNode<'_>) {}
}

/// MSR after construction, read-only
#[derive(Debug, Clone)]
pub struct FinishedScore {
    score: Score,
    options: MsrOptions,
    diagnostics: Diagnostics,
}

impl FinishedScore {
    pub(crate) fn new(score: Score, options: MsrOptions, diagnostics: Diagnostics) -> Self {
        FinishedScore {
            score,
            options,
            diagnostics,
        }
    }

    pub fn score(&self) -> &Score {
        &self.score
    }

    /// Options the score was built with
    pub fn options(&self) -> &MsrOptions {
        &self.options
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Measures of a voice with every rest run expanded
    pub fn expanded_measures(&self, voice: VoiceId) -> Vec<MeasureId> {
        self.score.voice_measures(voice, true)
    }

    pub fn voice_total_duration(&self, voice: VoiceId) -> Duration {
        self.score.voice_total_duration(voice)
    }

    /// Walk the whole tree depth-first
    pub fn browse<V: MsrVisitor>(&self, visitor: &mut V) {
        let score = &self.score;
        let node = MsrNode::Score(score);
        if visitor.enter(node) == Descend::Children {
            let identification = MsrNode::Identification(&score.identification);
            visitor.enter(identification);
            visitor.leave(identification);
            self.browse_part_group(score.root_part_group, visitor);
        }
        visitor.leave(node);
    }

    fn browse_part_group<V: MsrVisitor>(&self, group: PartGroupId, visitor: &mut V) {
        let data = &self.score.part_groups[group];
        let node = MsrNode::PartGroup(group, data);
        if visitor.enter(node) == Descend::Children {
            for element in &data.elements {
                match element {
                    PartGroupElement::Part(part) => self.browse_part(*part, visitor),
                    PartGroupElement::PartGroup(nested) => self.browse_part_group(*nested, visitor),
                }
            }
        }
        visitor.leave(node);
    }

    fn browse_part<V: MsrVisitor>(&self, part: PartId, visitor: &mut V) {
        let data = &self.score.parts[part];
        let node = MsrNode::Part(part, data);
        if visitor.enter(node) == Descend::Children {
            for staff in data.staves.values() {
                self.browse_staff(*staff, visitor);
            }
        }
        visitor.leave(node);
    }

    fn browse_staff<V: MsrVisitor>(&self, staff: StaffId, visitor: &mut V) {
        let data = &self.score.staves[staff];
        let node = MsrNode::Staff(staff, data);
        if visitor.enter(node) == Descend::Children {
            for voice in &data.all_voices {
                self.browse_voice(*voice, visitor);
            }
        }
        visitor.leave(node);
    }

    fn browse_voice<V: MsrVisitor>(&self, voice: VoiceId, visitor: &mut V) {
        let data = &self.score.voices[voice];
        let node = MsrNode::Voice(voice, data);
        if visitor.enter(node) == Descend::Children {
            self.browse_voice_elements(&data.elements, visitor);
        }
        visitor.leave(node);
    }

    fn browse_voice_elements<V: MsrVisitor>(&self, elements: &[VoiceElement], visitor: &mut V) {
        for element in elements {
            match element {
                VoiceElement::Measure(measure) => self.browse_measure(*measure, visitor),
                VoiceElement::Repeat(repeat) => self.browse_repeat(*repeat, visitor),
                VoiceElement::RestMeasures(rest) => {
                    let data = &self.score.rest_measures[*rest];
                    let node = MsrNode::RestMeasures(*rest, data);
                    if visitor.enter(node) == Descend::Children {
                        for measure in &data.measures {
                            self.browse_measure(*measure, visitor);
                        }
                    }
                    visitor.leave(node);
                }
            }
        }
    }

    fn browse_repeat<V: MsrVisitor>(&self, repeat: RepeatId, visitor: &mut V) {
        let data = &self.score.repeats[repeat];
        let node = MsrNode::Repeat(repeat, data);
        if visitor.enter(node) == Descend::Children {
            let common = MsrNode::RepeatCommon(repeat, data);
            if visitor.enter(common) == Descend::Children {
                self.browse_voice_elements(&data.common, visitor);
            }
            visitor.leave(common);
            for (index, ending) in data.endings.iter().enumerate() {
                let node = MsrNode::RepeatEnding(index, ending);
                if visitor.enter(node) == Descend::Children {
                    self.browse_voice_elements(&ending.elements, visitor);
                }
                visitor.leave(node);
            }
        }
        visitor.leave(node);
    }

    fn browse_measure<V: MsrVisitor>(&self, measure: MeasureId, visitor: &mut V) {
        let data = &self.score.measures[measure];
        let node = MsrNode::Measure(measure, data);
        if visitor.enter(node) == Descend::Children {
            for element in &data.elements {
                browse_measure_element(element, visitor);
            }
        }
        visitor.leave(node);
    }
}

fn browse_measure_element<V: MsrVisitor>(element: &MeasureElement, visitor: &mut V) {
    let node = match element {
        MeasureElement::Note(note) => MsrNode::Note(note),
        MeasureElement::Chord(chord) => {
            let node = MsrNode::Chord(chord);
            if visitor.enter(node) == Descend::Children {
                for note in &chord.notes {
                    let note = MsrNode::Note(note);
                    visitor.enter(note);
                    visitor.leave(note);
                }
            }
            visitor.leave(node);
            return;
        }
        MeasureElement::Clef(clef) => MsrNode::Clef(clef),
        MeasureElement::Key(key) => MsrNode::Key(key),
        MeasureElement::Time(time) => MsrNode::Time(time),
        MeasureElement::Transpose(transpose) => MsrNode::Transpose(transpose),
        MeasureElement::Barline(barline) => MsrNode::Barline(barline),
        MeasureElement::StaffDetails(details) => MsrNode::StaffDetails(details),
        MeasureElement::VoiceStaffChange(change) => MsrNode::VoiceStaffChange(change),
        MeasureElement::Harmony(harmony) => MsrNode::Harmony(harmony),
        MeasureElement::FiguredBass(figured_bass) => MsrNode::FiguredBass(figured_bass),
    };
    visitor.enter(node);
    visitor.leave(node);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msr::builder::ScoreBuilder;
    use crate::msr::entities::{MeasureImplicitKind, StaffKind, VoiceKind};
    use crate::msr::types::{Pitch, Step};

    /// Records the order nodes are entered in
    #[derive(Default)]
    struct Trace {
        entered: Vec<&'static str>,
        depth: i32,
    }

    impl MsrVisitor for Trace {
        fn enter(&mut self, node: MsrNode<'_>) -> Descend {
            self.depth += 1;
            self.entered.push(match node {
                MsrNode::Score(_) => "score",
                MsrNode::Part(..) => "part",
                MsrNode::Staff(..) => "staff",
                MsrNode::Voice(..) => "voice",
                MsrNode::Measure(..) => "measure",
                MsrNode::Note(_) => "note",
                MsrNode::Repeat(..) => "repeat",
                MsrNode::RestMeasures(..) => "rests",
                _ => "other",
            });
            Descend::Children
        }

        fn leave(&mut self, _node: MsrNode<'_>) {
            self.depth -= 1;
        }
    }

    fn small_score() -> FinishedScore {
        let mut builder = ScoreBuilder::new(MsrOptions::default());
        let part = builder.create_part(1, "P1");
        let staff = builder.create_staff(1, 1, StaffKind::Regular, part).unwrap();
        let voice = builder.create_voice(1, 1, VoiceKind::Regular, staff).unwrap();
        builder.create_measure_in_part(2, part, "1", MeasureImplicitKind::Explicit);
        builder
            .append_note_to_voice(voice, Note::regular(3, Pitch::natural(Step::C, 4), Duration::whole()))
            .unwrap();
        builder.finish()
    }

    #[test]
    fn test_browse_is_balanced_and_ordered() {
        let score = small_score();
        let mut trace = Trace::default();
        score.browse(&mut trace);

        assert_eq!(trace.depth, 0);
        let interesting: Vec<_> = trace
            .entered
            .iter()
            .copied()
            .filter(|n| *n != "other")
            .collect();
        assert_eq!(interesting, vec!["score", "part", "staff", "voice", "measure", "note"]);
    }

    #[test]
    fn test_finished_score_keeps_diagnostics() {
        let score = small_score();
        assert!(!score.diagnostics().has_errors());
        let voice = score.score().voices.iter().next().map(|(id, _)| id).unwrap();
        assert_eq!(score.voice_total_duration(voice), Duration::whole());
        assert_eq!(score.expanded_measures(voice).len(), 1);
    }
}
