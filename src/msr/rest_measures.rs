//! Rest-measures compressor
//!
//! A source announcing a multiple rest of N measures still spells out the
//! N empty measures. Each voice counts them as they close; when the Nth
//! one closes, the N trailing measures of the voice's current section are
//! moved into one [`RestMeasures`] entity. The measures are kept inside it,
//! so the run can be expanded again and the voice keeps the same total
//! duration either way.
//!
//! ```text
//!  Idle ──start run(N)──▶ Collecting(seen) ──Nth empty measure closes──▶ Open(run)
//!   ▲                          │                                          │
//!   └──── non-empty measure ───┘                 next ordinary measure ───┘
//! ```

use crate::msr::arena::{MeasureId, PartId, RepeatId, RestMeasuresId, VoiceId};
use crate::msr::builder::ScoreBuilder;
use crate::msr::duration::Duration;
use crate::msr::entities::{Measure, MeasureElement, MeasureImplicitKind, RestMeasures, VoiceElement};
use crate::msr::errors::{MsrError, MsrResult};
use crate::msr::repeats::Sink;
use crate::msr::types::{InputLine, Note, Time};

/// Per-voice progress through a multiple rest
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RestRun {
    Idle,
    Collecting {
        input_line: InputLine,
        expected: usize,
        seen: usize,
        slashes: bool,
    },
    Open(RestMeasuresId),
}

/// Number of the measure `offset` measures after `previous`
///
/// Numeric measure numbers count on; other numbers get a `+offset` suffix.
pub fn next_measure_number(previous: &str, offset: usize) -> String {
    match previous.trim().parse::<usize>() {
        Ok(number) => (number + offset).to_string(),
        Err(_) => format!("{}+{}", previous, offset),
    }
}

impl ScoreBuilder {
    /// Announce a multiple rest of `count` measures in every voice of a part,
    /// starting with the current measure
    pub fn start_rest_measures_run(
        &mut self,
        line: InputLine,
        part: PartId,
        count: usize,
        slashes: Option<bool>,
    ) {
        if !self.options.compress_rest_measures {
            self.diagnostics
                .info(line, format!("multiple rest of {} measures left uncompressed", count));
            return;
        }
        if count == 0 {
            return;
        }
        let slashes = slashes.unwrap_or(self.options.rest_measures_slashes);
        for voice in self.score.part_voices(part) {
            self.score.voices[voice].rest_run = RestRun::Collecting {
                input_line: line,
                expected: count,
                seen: 0,
                slashes,
            };
        }
        log::debug!("line {}: collecting a multiple rest of {} measures", line, count);
    }

    /// Count a closed measure towards the voice's pending run
    pub(crate) fn rest_run_measure_closed(&mut self, line: InputLine, voice: VoiceId, measure: MeasureId) {
        let RestRun::Collecting {
            input_line,
            expected,
            seen,
            slashes,
        } = self.score.voices[voice].rest_run.clone()
        else {
            return;
        };

        if !self.score.measures[measure].is_empty_of_music() {
            self.diagnostics.warning(
                line,
                format!(
                    "multiple rest of {} measures interrupted by measure \"{}\" after {}",
                    expected, self.score.measures[measure].number, seen
                ),
            );
            self.score.voices[voice].rest_run = RestRun::Idle;
            return;
        }

        let seen = seen + 1;
        if seen < expected {
            self.score.voices[voice].rest_run = RestRun::Collecting {
                input_line,
                expected,
                seen,
                slashes,
            };
            return;
        }
        if let Err(error) = self.create_rest_measures_from_first_measures(input_line, voice, expected, slashes) {
            self.diagnostics.warning(error.line(), error.to_string());
            self.score.voices[voice].rest_run = RestRun::Idle;
        }
    }

    /// Collapse the last `count` measures of the voice's current section into
    /// one rest-measures entity
    pub fn create_rest_measures_from_first_measures(
        &mut self,
        line: InputLine,
        voice: VoiceId,
        count: usize,
        slashes: bool,
    ) -> MsrResult<RestMeasuresId> {
        let sink = self.current_sink(voice);
        let elements = self.sink_elements_mut(voice, sink);
        let trailing = elements
            .iter()
            .rev()
            .take_while(|e| matches!(e, VoiceElement::Measure(_)))
            .count();
        if count == 0 || trailing < count {
            return Err(MsrError::RestMeasuresUnderflow {
                line,
                expected: count,
                found: trailing,
            });
        }

        let start = elements.len() - count;
        let measures: Vec<MeasureId> = elements
            .split_off(start)
            .into_iter()
            .filter_map(|e| match e {
                VoiceElement::Measure(measure) => Some(measure),
                _ => None,
            })
            .collect();

        let first = &self.score.measures[measures[0]];
        let measure_length = if first.position.is_zero() {
            first.full_length.unwrap_or_default()
        } else {
            first.position
        };
        let rest = self.score.rest_measures.alloc(RestMeasures {
            input_line: line,
            first_measure_number: first.number.clone(),
            measures,
            slashes,
            measure_length,
        });
        self.push_voice_element(voice, VoiceElement::RestMeasures(rest));
        self.score.voices[voice].rest_run = RestRun::Open(rest);
        log::debug!(
            "line {}: {} measure(s) from \"{}\" compressed in voice {}",
            line,
            count,
            self.score.rest_measures[rest].first_measure_number,
            self.score.voices[voice].number
        );
        Ok(rest)
    }

    /// Extend the voice's open run with `count` empty measures numbered after
    /// `previous_measure_number`, opening a run if there is none
    pub fn add_rest_measures(
        &mut self,
        line: InputLine,
        voice: VoiceId,
        previous_measure_number: &str,
        count: usize,
    ) -> MsrResult<RestMeasuresId> {
        let rest = match self.score.voices[voice].rest_run {
            RestRun::Open(rest) => rest,
            _ => {
                let measure_length = self.score.voices[voice]
                    .contexts
                    .time
                    .current()
                    .and_then(Time::measure_length)
                    .unwrap_or_else(Duration::whole);
                let rest = self.score.rest_measures.alloc(RestMeasures {
                    input_line: line,
                    first_measure_number: next_measure_number(previous_measure_number, 1),
                    measures: Vec::new(),
                    slashes: self.options.rest_measures_slashes,
                    measure_length,
                });
                self.push_voice_element(voice, VoiceElement::RestMeasures(rest));
                self.score.voices[voice].rest_run = RestRun::Open(rest);
                rest
            }
        };

        let measure_length = self.score.rest_measures[rest].measure_length;
        for offset in 1..=count {
            let number = next_measure_number(previous_measure_number, offset);
            let mut measure = Measure::new(
                line,
                &number,
                MeasureImplicitKind::Explicit,
                voice,
                Some(measure_length),
            );
            let mut rest_note = Note::rest(line, measure_length);
            rest_note.whole_measure_rest = true;
            measure.position = measure_length;
            measure.elements.push(MeasureElement::Note(rest_note));
            measure.closed = true;
            let measure = self.score.measures.alloc(measure);
            self.score.rest_measures[rest].measures.push(measure);
        }
        Ok(rest)
    }

    /// Close the voice's run and go back to ordinary measures
    ///
    /// A run announced but not complete is compressed with the measures it
    /// did collect; with none collected this is a no-op.
    pub fn append_pending_rest_measures(&mut self, line: InputLine, voice: VoiceId) -> MsrResult<()> {
        let run = std::mem::replace(&mut self.score.voices[voice].rest_run, RestRun::Idle);
        match run {
            RestRun::Idle | RestRun::Open(_) | RestRun::Collecting { seen: 0, .. } => Ok(()),
            RestRun::Collecting {
                input_line,
                expected,
                seen,
                slashes,
            } => {
                self.diagnostics.warning(
                    line,
                    format!("multiple rest of {} measures ended after {}", expected, seen),
                );
                self.create_rest_measures_from_first_measures(input_line, voice, seen, slashes)?;
                self.score.voices[voice].rest_run = RestRun::Idle;
                Ok(())
            }
        }
    }

    pub(crate) fn end_open_rest_run(&mut self, voice: VoiceId) {
        let run = &mut self.score.voices[voice].rest_run;
        if matches!(run, RestRun::Open(_)) {
            *run = RestRun::Idle;
        }
    }

    /// Put the measures of a run back in place of the run
    ///
    /// Returns whether the run was found in the voice.
    pub fn expand_rest_measures(&mut self, voice: VoiceId, rest: RestMeasuresId) -> bool {
        let measures: Vec<VoiceElement> = self.score.rest_measures[rest]
            .measures
            .iter()
            .map(|m| VoiceElement::Measure(*m))
            .collect();
        for sink in self.voice_sinks(voice) {
            let elements = self.sink_elements_mut(voice, sink);
            if let Some(position) = elements
                .iter()
                .position(|e| *e == VoiceElement::RestMeasures(rest))
            {
                elements.splice(position..=position, measures);
                self.end_open_rest_run(voice);
                return true;
            }
        }
        false
    }

    /// Every section of a voice: its own sequence, then each repeat's common
    /// part and endings
    fn voice_sinks(&self, voice: VoiceId) -> Vec<Sink> {
        let mut sinks = vec![Sink::Voice];
        let mut repeats: Vec<RepeatId> = repeats_in(&self.score.voices[voice].elements);
        while let Some(repeat) = repeats.pop() {
            let data = &self.score.repeats[repeat];
            sinks.push(Sink::Common(repeat));
            repeats.extend(repeats_in(&data.common));
            for (index, ending) in data.endings.iter().enumerate() {
                sinks.push(Sink::Ending(repeat, index));
                repeats.extend(repeats_in(&ending.elements));
            }
        }
        sinks
    }
}

fn repeats_in(elements: &[VoiceElement]) -> Vec<RepeatId> {
    elements
        .iter()
        .filter_map(|e| match e {
            VoiceElement::Repeat(repeat) => Some(*repeat),
            _ => None,
        })
        .collect()
}
