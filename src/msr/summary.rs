//! Serializable overview of a finished score

use crate::msr::diagnostics::Severity;
use crate::msr::duration::Duration;
use crate::msr::entities::{StaffKind, VoiceKind};
use crate::msr::types::NoteKind;
use crate::msr::visitor::{Descend, FinishedScore, MsrNode, MsrVisitor};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScoreSummary {
    pub title: Option<String>,
    pub composer: Option<String>,
    pub parts: Vec<PartSummary>,
    pub warnings: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartSummary {
    pub id: String,
    pub name: Option<String>,
    pub staves: Vec<StaffSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StaffSummary {
    pub number: u32,
    pub kind: StaffKind,
    pub voices: Vec<VoiceSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceSummary {
    pub number: u32,
    pub kind: VoiceKind,
    pub sequential_number: Option<u32>,
    /// Measures with rest runs expanded
    pub measures: usize,
    pub notes: usize,
    pub rests: usize,
    pub chords: usize,
    pub repeats: usize,
    pub rest_measures: usize,
    pub total_duration: Duration,
}

impl ScoreSummary {
    pub fn of(score: &FinishedScore) -> Self {
        let identification = &score.score().identification;
        let mut collector = SummaryCollector {
            score,
            summary: ScoreSummary {
                title: identification.title().map(str::to_string),
                composer: identification.composer().map(str::to_string),
                parts: Vec::new(),
                warnings: score.diagnostics().count_by_severity(Severity::Warning),
                errors: score.diagnostics().count_by_severity(Severity::Error),
            },
        };
        score.browse(&mut collector);
        collector.summary
    }

    pub fn voice_count(&self) -> usize {
        self.parts
            .iter()
            .flat_map(|p| &p.staves)
            .map(|s| s.voices.len())
            .sum()
    }
}

struct SummaryCollector<'a> {
    score: &'a FinishedScore,
    summary: ScoreSummary,
}

impl SummaryCollector<'_> {
    fn current_voice(&mut self) -> Option<&mut VoiceSummary> {
        self.summary
            .parts
            .last_mut()
            .and_then(|p| p.staves.last_mut())
            .and_then(|s| s.voices.last_mut())
    }
}

impl MsrVisitor for SummaryCollector<'_> {
    fn enter(&mut self, node: MsrNode<'_>) -> Descend {
        match node {
            MsrNode::Part(_, part) => self.summary.parts.push(PartSummary {
                id: part.id.clone(),
                name: part.name.clone(),
                staves: Vec::new(),
            }),
            MsrNode::Staff(_, staff) => {
                if let Some(part) = self.summary.parts.last_mut() {
                    part.staves.push(StaffSummary {
                        number: staff.number,
                        kind: staff.kind,
                        voices: Vec::new(),
                    });
                }
            }
            MsrNode::Voice(id, voice) => {
                let total_duration = self.score.voice_total_duration(id);
                if let Some(staff) = self
                    .summary
                    .parts
                    .last_mut()
                    .and_then(|p| p.staves.last_mut())
                {
                    staff.voices.push(VoiceSummary {
                        number: voice.number,
                        kind: voice.kind,
                        sequential_number: voice.sequential_number,
                        measures: 0,
                        notes: 0,
                        rests: 0,
                        chords: 0,
                        repeats: 0,
                        rest_measures: 0,
                        total_duration,
                    });
                }
            }
            MsrNode::Measure(..) => {
                if let Some(voice) = self.current_voice() {
                    voice.measures += 1;
                }
            }
            MsrNode::Repeat(..) => {
                if let Some(voice) = self.current_voice() {
                    voice.repeats += 1;
                }
            }
            MsrNode::RestMeasures(..) => {
                if let Some(voice) = self.current_voice() {
                    voice.rest_measures += 1;
                }
            }
            MsrNode::Chord(_) => {
                if let Some(voice) = self.current_voice() {
                    voice.chords += 1;
                }
            }
            MsrNode::Note(note) => {
                if let Some(voice) = self.current_voice() {
                    match note.kind {
                        NoteKind::Rest => voice.rests += 1,
                        NoteKind::Skip => {}
                        _ => voice.notes += 1,
                    }
                }
            }
            _ => {}
        }
        Descend::Children
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msr::builder::ScoreBuilder;
    use crate::msr::entities::MeasureImplicitKind;
    use crate::msr::options::MsrOptions;
    use crate::msr::types::{Note, Pitch, Step};

    #[test]
    fn test_summary_counts() {
        let mut builder = ScoreBuilder::new(MsrOptions::default());
        let part = builder.create_part(1, "P1");
        builder.set_part_names(part, Some("Flute".to_string()), None);
        let staff = builder.create_staff(1, 1, StaffKind::Regular, part).unwrap();
        let voice = builder.create_voice(1, 1, VoiceKind::Regular, staff).unwrap();
        builder.create_measure_in_part(2, part, "1", MeasureImplicitKind::Explicit);
        let half = Duration::new(1, 2);
        builder
            .append_note_to_voice(voice, Note::regular(3, Pitch::natural(Step::C, 5), half))
            .unwrap();
        builder
            .append_chord_member(voice, Note::regular(4, Pitch::natural(Step::E, 5), half))
            .unwrap();
        builder.append_note_to_voice(voice, Note::rest(5, half)).unwrap();

        let summary = ScoreSummary::of(&builder.finish());
        assert_eq!(summary.voice_count(), 1);
        assert_eq!(summary.parts[0].name.as_deref(), Some("Flute"));
        let voice = &summary.parts[0].staves[0].voices[0];
        assert_eq!(voice.measures, 1);
        assert_eq!(voice.chords, 1);
        assert_eq!(voice.notes, 2);
        assert_eq!(voice.rests, 1);
        assert_eq!(voice.total_duration, Duration::whole());
    }
}
