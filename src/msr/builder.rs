//! Hierarchy builder
//!
//! `ScoreBuilder` is the only type that can mutate an MSR tree. It creates
//! part groups, parts, staves, voices and measures, keeps the registration
//! invariants of staves, and appends measure elements. The context engine,
//! the repeat state machine and the rest-measures compressor extend it with
//! further `impl ScoreBuilder` blocks in their own modules.
//!
//! ```text
//! create_part_group ─▶ create_part ─▶ create_staff ─▶ create_voice ─▶ create_measure
//!                                          ▲               ▲              │
//!                       seeded from part ──┘               │              ▼
//!                       contexts + pending staff details   │     append_note_or_padding
//!                                          seeded from staff contexts,
//!                                          part measure and repeat shape
//! ```
//!
//! [`ScoreBuilder::finish`] consumes the builder and hands out the read-only
//! [`FinishedScore`].

use crate::msr::arena::{MeasureId, PartGroupId, PartId, StaffId, VoiceId};
use crate::msr::diagnostics::Diagnostics;
use crate::msr::duration::Duration;
use crate::msr::entities::{
    Chord, CurrentMeasure, Identification, Measure, MeasureElement, MeasureImplicitKind, Part,
    PartGroup, PartGroupElement, PartGroupSymbol, Score, Staff, StaffKind, Voice, VoiceElement,
    VoiceKind, FIGURED_BASS_VOICE_NUMBER_OFFSET, HARMONY_VOICE_NUMBER_OFFSET,
};
use crate::msr::errors::{MsrError, MsrResult};
use crate::msr::options::{MsrOptions, VoiceOverflowPolicy};
use crate::msr::types::{
    Barline, FiguredBass, Harmony, InputLine, Note, StaffDetails, StaffType, Time,
    VoiceStaffChange,
};
use crate::msr::visitor::FinishedScore;

/// Key ordering a staff's all-voices list
///
/// Voices group by the regular voice they belong to; within a group the
/// harmony voice comes first, then the regular voice, then the figured bass
/// voice. The raw number breaks any remaining tie, which makes the order
/// total.
pub fn voice_display_key(voice: &Voice) -> (u32, u8, u32) {
    let rank = match voice.kind {
        VoiceKind::Harmony { .. } => 0,
        VoiceKind::Regular => 1,
        VoiceKind::FiguredBass { .. } => 2,
    };
    (voice.anchor_number(), rank, voice.number)
}

/// Mutable MSR under construction
#[derive(Debug)]
pub struct ScoreBuilder {
    pub(crate) score: Score,
    pub(crate) options: MsrOptions,
    pub(crate) diagnostics: Diagnostics,
    /// Explicit part groups started and not yet stopped, innermost last
    open_part_groups: Vec<PartGroupId>,
}

impl ScoreBuilder {
    pub fn new(options: MsrOptions) -> Self {
        ScoreBuilder {
            score: Score::new(),
            options,
            diagnostics: Diagnostics::new(),
            open_part_groups: Vec::new(),
        }
    }

    /// Read access to the tree being built
    pub fn score(&self) -> &Score {
        &self.score
    }

    pub fn options(&self) -> &MsrOptions {
        &self.options
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    pub fn identification_mut(&mut self) -> &mut Identification {
        &mut self.score.identification
    }

    // ========================================================================
    // PART GROUPS AND PARTS
    // ========================================================================

    /// Start a part group inside the innermost open group
    pub fn create_part_group(
        &mut self,
        line: InputLine,
        number: u32,
        symbol: PartGroupSymbol,
    ) -> PartGroupId {
        let parent = self.innermost_part_group();
        let group = self
            .score
            .part_groups
            .alloc(PartGroup::new(line, number, symbol, parent));
        self.score.part_groups[parent]
            .elements
            .push(PartGroupElement::PartGroup(group));
        self.open_part_groups.push(group);
        log::debug!("line {}: part group {} started", line, number);
        group
    }

    pub fn set_part_group_names(
        &mut self,
        group: PartGroupId,
        name: Option<String>,
        abbreviation: Option<String>,
    ) {
        let group = &mut self.score.part_groups[group];
        group.name = name;
        group.abbreviation = abbreviation;
    }

    pub fn set_part_group_barline(&mut self, group: PartGroupId, barline: bool) {
        self.score.part_groups[group].barline = barline;
    }

    /// Stop the innermost open part group with this number
    ///
    /// Groups may overlap in the source, so the group need not be the
    /// innermost one.
    pub fn close_part_group(&mut self, line: InputLine, number: u32) {
        let position = self
            .open_part_groups
            .iter()
            .rposition(|g| self.score.part_groups[*g].number == number);
        match position {
            Some(position) => {
                self.open_part_groups.remove(position);
                log::debug!("line {}: part group {} stopped", line, number);
            }
            None => self
                .diagnostics
                .warning(line, format!("part group {} stopped but never started", number)),
        }
    }

    fn innermost_part_group(&self) -> PartGroupId {
        self.open_part_groups
            .last()
            .copied()
            .unwrap_or(self.score.root_part_group)
    }

    /// Create the part with this id in the innermost open group, or return
    /// the existing one
    pub fn create_part(&mut self, line: InputLine, id: &str) -> PartId {
        if let Some(part) = self.score.part_by_id(id) {
            return part;
        }
        let group = self.innermost_part_group();
        let part = self.score.parts.alloc(Part::new(line, id, group));
        self.score.part_groups[group]
            .elements
            .push(PartGroupElement::Part(part));
        self.score.parts_by_id.insert(id.to_string(), part);
        log::debug!("line {}: part \"{}\" created", line, id);
        part
    }

    pub fn set_part_names(
        &mut self,
        part: PartId,
        name: Option<String>,
        abbreviation: Option<String>,
    ) {
        let part = &mut self.score.parts[part];
        part.name = name;
        part.abbreviation = abbreviation;
    }

    // ========================================================================
    // STAVES
    // ========================================================================

    /// Create a staff, seeded with the part's contexts and the staff details
    /// waiting for it
    pub fn create_staff(
        &mut self,
        line: InputLine,
        number: u32,
        kind: StaffKind,
        part: PartId,
    ) -> MsrResult<StaffId> {
        let part_data = &self.score.parts[part];
        if part_data.staves.contains_key(&number) {
            return Err(MsrError::DuplicateStaffNumber {
                line,
                part_id: part_data.id.clone(),
                number,
            });
        }

        let mut staff = Staff::new(line, number, kind, part);
        staff.contexts = part_data.contexts.clone();
        let staff = self.score.staves.alloc(staff);

        let part_data = &mut self.score.parts[part];
        part_data.staves.insert(number, staff);

        // Details for every staff stay pending for the staves still to come
        let (waiting, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut part_data.pending_staff_details)
            .into_iter()
            .partition(|d| d.staff_number.map_or(true, |n| n == number));
        part_data.pending_staff_details = kept;
        for details in waiting {
            if details.staff_number.is_none() {
                self.score.parts[part]
                    .pending_staff_details
                    .push(details.clone());
            }
            self.apply_staff_details(staff, details);
        }

        log::debug!(
            "line {}: staff {} created in part \"{}\"",
            line,
            number,
            self.score.parts[part].id
        );
        Ok(staff)
    }

    pub fn fetch_or_create_staff(
        &mut self,
        line: InputLine,
        number: u32,
        part: PartId,
    ) -> MsrResult<StaffId> {
        match self.score.parts[part].staves.get(&number) {
            Some(staff) => Ok(*staff),
            None => self.create_staff(line, number, StaffKind::Regular, part),
        }
    }

    /// Attach staff details to the staff they name, or keep them until that
    /// staff exists
    pub fn append_staff_details(&mut self, line: InputLine, part: PartId, details: StaffDetails) {
        let part_data = &mut self.score.parts[part];
        let targets: Vec<StaffId> = match details.staff_number {
            Some(number) => match part_data.staves.get(&number) {
                Some(staff) => vec![*staff],
                None => {
                    log::debug!("line {}: staff details for staff {} kept pending", line, number);
                    part_data.pending_staff_details.push(details);
                    return;
                }
            },
            None => {
                part_data.pending_staff_details.push(details.clone());
                part_data.staves.values().copied().collect()
            }
        };
        for staff in targets {
            self.apply_staff_details(staff, details.clone());
        }
    }

    fn apply_staff_details(&mut self, staff: StaffId, details: StaffDetails) {
        let staff_data = &mut self.score.staves[staff];
        if details.staff_type == StaffType::Regular && details.staff_lines == Some(1) {
            staff_data.kind = StaffKind::Percussion;
        }
        staff_data.details.push(details.clone());
        let voices = staff_data.all_voices.clone();
        for voice in voices {
            if let Some(measure) = self.open_measure(voice) {
                self.score.measures[measure]
                    .elements
                    .push(MeasureElement::StaffDetails(details.clone()));
            }
        }
    }

    // ========================================================================
    // VOICES
    // ========================================================================

    /// Create and register a voice
    ///
    /// A voice created while its part has a current measure starts with a
    /// measure of the same number, inside the same open repeats as its
    /// siblings.
    pub fn create_voice(
        &mut self,
        line: InputLine,
        number: u32,
        kind: VoiceKind,
        staff: StaffId,
    ) -> MsrResult<VoiceId> {
        let staff_data = &self.score.staves[staff];
        // A source voice takes precedence over a decorating voice holding
        // its number; the decorating voice moves to a free number.
        let displaced = match staff_data.voices_by_number.get(&number) {
            Some(existing) if kind.is_regular() && !self.score.voices[*existing].kind.is_regular() => {
                Some(*existing)
            }
            Some(_) => {
                return Err(MsrError::DuplicateVoiceNumber {
                    line,
                    staff_number: staff_data.number,
                    number,
                })
            }
            None => None,
        };
        if let Some(existing) = staff_data.decorating_voices.get(&kind) {
            return Err(MsrError::DuplicateVoiceNumber {
                line,
                staff_number: staff_data.number,
                number: self.score.voices[*existing].number,
            });
        }

        if kind.is_regular() {
            let count = staff_data.regular_voice_count() + 1;
            let max = self.options.max_regular_voices;
            if count > max {
                let error = MsrError::TooManyRegularVoices {
                    line,
                    staff_number: staff_data.number,
                    number,
                    count,
                    max,
                };
                match self.options.voice_overflow {
                    VoiceOverflowPolicy::Fail => return Err(error),
                    VoiceOverflowPolicy::Continue => self.diagnostics.warning(line, error.to_string()),
                }
            }
        }

        if let Some(existing) = displaced {
            self.renumber_decorating_voice(line, staff, existing);
        }

        let staff_data = &self.score.staves[staff];
        let staff_number = staff_data.number;
        let part = staff_data.part;
        let contexts = staff_data.contexts.clone();
        let voice = self
            .score
            .voices
            .alloc(Voice::new(line, number, kind, staff, staff_number, contexts));
        self.register_voice(staff, voice);
        log::debug!(
            "line {}: {:?} voice {} registered in staff {}",
            line,
            kind,
            number,
            staff_number
        );

        self.replicate_repeat_shape(part, voice);
        if let Some(current) = self.score.parts[part].current_measure.clone() {
            let measure = self.create_measure(line, &current.number, voice, current.implicit);
            self.restate_contexts(voice, measure);
        }
        Ok(voice)
    }

    /// Open a late voice's first measure with the contexts it inherited
    fn restate_contexts(&mut self, voice: VoiceId, measure: MeasureId) {
        let contexts = &self.score.voices[voice].contexts;
        let inherited: Vec<MeasureElement> = [
            contexts.clef.current().map(|c| MeasureElement::Clef(*c)),
            contexts.key.current().map(|k| MeasureElement::Key(*k)),
            contexts.time.current().map(|t| MeasureElement::Time(*t)),
            contexts.transpose.current().map(|t| MeasureElement::Transpose(*t)),
        ]
        .into_iter()
        .flatten()
        .collect();
        self.score.measures[measure].elements.extend(inherited);
    }

    /// Regular voice with this source number, created on first use
    pub fn fetch_or_create_voice(
        &mut self,
        line: InputLine,
        number: u32,
        staff: StaffId,
    ) -> MsrResult<VoiceId> {
        match self.score.staves[staff].regular_voices_by_number.get(&number) {
            Some(voice) => Ok(*voice),
            None => self.create_voice(line, number, VoiceKind::Regular, staff),
        }
    }

    fn register_voice(&mut self, staff: StaffId, voice: VoiceId) {
        let (number, kind) = {
            let voice = &self.score.voices[voice];
            (voice.number, voice.kind)
        };
        let voices = &self.score.voices;
        let staff_data = &mut self.score.staves[staff];

        staff_data.voices_by_number.insert(number, voice);
        if kind.is_regular() {
            staff_data.regular_voices_by_number.insert(number, voice);
            staff_data.regular_voices.push(voice);
            staff_data.regular_voices.sort_by_key(|v| voices[*v].number);
        } else {
            staff_data.decorating_voices.insert(kind, voice);
        }
        staff_data.all_voices.push(voice);
        staff_data
            .all_voices
            .sort_by_key(|v| voice_display_key(&voices[*v]));

        self.assign_sequential_numbers(staff);
    }

    /// Number the staff's regular voices 1..n in raw number order
    pub fn assign_sequential_numbers(&mut self, staff: StaffId) {
        let staff_data = &self.score.staves[staff];
        for (rank, voice) in staff_data.regular_voices.iter().enumerate() {
            self.score.voices[*voice].sequential_number = Some(rank as u32 + 1);
        }
    }

    pub fn fetch_first_regular_voice(&self, staff: StaffId) -> Option<VoiceId> {
        self.score.staves[staff].regular_voices.first().copied()
    }

    /// Harmony voice decorating a regular voice, created on first use
    pub fn harmony_voice_for(&mut self, line: InputLine, voice: VoiceId) -> MsrResult<VoiceId> {
        let decorates = self.score.voices[voice].anchor_number();
        self.decorating_voice(
            line,
            voice,
            decorates + HARMONY_VOICE_NUMBER_OFFSET,
            VoiceKind::Harmony { decorates },
        )
    }

    /// Figured bass voice decorating a regular voice, created on first use
    pub fn figured_bass_voice_for(&mut self, line: InputLine, voice: VoiceId) -> MsrResult<VoiceId> {
        let decorates = self.score.voices[voice].anchor_number();
        self.decorating_voice(
            line,
            voice,
            decorates + FIGURED_BASS_VOICE_NUMBER_OFFSET,
            VoiceKind::FiguredBass { decorates },
        )
    }

    fn decorating_voice(
        &mut self,
        line: InputLine,
        voice: VoiceId,
        preferred_number: u32,
        kind: VoiceKind,
    ) -> MsrResult<VoiceId> {
        let staff = self.score.voices[voice].staff;
        if let Some(existing) = self.score.staves[staff].decorating_voices.get(&kind) {
            return Ok(*existing);
        }
        let number = self.first_free_voice_number(staff, preferred_number);
        self.create_voice(line, number, kind, staff)
    }

    fn first_free_voice_number(&self, staff: StaffId, from: u32) -> u32 {
        let taken = &self.score.staves[staff].voices_by_number;
        let mut number = from;
        while taken.contains_key(&number) {
            number += 1;
        }
        number
    }

    /// Give a decorating voice the next free number above its own
    fn renumber_decorating_voice(&mut self, line: InputLine, staff: StaffId, voice: VoiceId) {
        let old = self.score.voices[voice].number;
        let new = self.first_free_voice_number(staff, old + 1);
        self.score.voices[voice].number = new;

        let voices = &self.score.voices;
        let staff_data = &mut self.score.staves[staff];
        staff_data.voices_by_number.remove(&old);
        staff_data.voices_by_number.insert(new, voice);
        staff_data
            .all_voices
            .sort_by_key(|v| voice_display_key(&voices[*v]));
        log::debug!(
            "line {}: {:?} voice renumbered from {} to {} in staff {}",
            line,
            voices[voice].kind,
            old,
            new,
            staff_data.number
        );
    }

    // ========================================================================
    // MEASURES
    // ========================================================================

    /// Append a new measure to a voice, closing the previous one
    pub fn create_measure(
        &mut self,
        line: InputLine,
        number: &str,
        voice: VoiceId,
        implicit: MeasureImplicitKind,
    ) -> MeasureId {
        self.close_voice_measure(line, voice);
        self.end_open_rest_run(voice);

        let full_length = self.score.voices[voice]
            .contexts
            .time
            .current()
            .and_then(Time::measure_length);
        let measure = self
            .score
            .measures
            .alloc(Measure::new(line, number, implicit, voice, full_length));
        self.push_voice_element(voice, VoiceElement::Measure(measure));
        self.score.voices[voice].last_measure = Some(measure);
        measure
    }

    /// Start measure `number` in every voice of a part
    ///
    /// The measures being closed are first padded with skips up to the
    /// longest one of the part.
    pub fn create_measure_in_part(
        &mut self,
        line: InputLine,
        part: PartId,
        number: &str,
        implicit: MeasureImplicitKind,
    ) {
        self.close_part_measures(line, part);
        self.score.parts[part].repeats.measure_started();
        self.score.parts[part].current_measure = Some(CurrentMeasure {
            input_line: line,
            number: number.to_string(),
            implicit,
        });
        for voice in self.score.part_voices(part) {
            self.create_measure(line, number, voice, implicit);
        }
        log::trace!(
            "line {}: measure \"{}\" started in part \"{}\"",
            line,
            number,
            self.score.parts[part].id
        );
    }

    pub(crate) fn close_part_measures(&mut self, line: InputLine, part: PartId) {
        let voices = self.score.part_voices(part);
        let open: Vec<MeasureId> = voices.iter().filter_map(|v| self.open_measure(*v)).collect();
        let high_tide = open
            .iter()
            .map(|m| self.score.measures[*m].position)
            .max()
            .unwrap_or_default();

        for measure in open {
            let measure = &mut self.score.measures[measure];
            if measure.position < high_tide {
                let padding = Note::skip(line, high_tide - measure.position);
                measure.position = high_tide;
                measure.elements.push(MeasureElement::Note(padding));
            }
        }
        for voice in voices {
            self.close_voice_measure(line, voice);
        }
    }

    fn close_voice_measure(&mut self, line: InputLine, voice: VoiceId) {
        let Some(measure) = self.open_measure(voice) else {
            return;
        };
        self.score.measures[measure].closed = true;
        self.rest_run_measure_closed(line, voice, measure);
    }

    /// Last measure of a voice, if it still accepts elements
    pub(crate) fn open_measure(&self, voice: VoiceId) -> Option<MeasureId> {
        self.score.voices[voice]
            .last_measure
            .filter(|m| !self.score.measures[*m].closed)
    }

    /// Measure receiving the voice's next element; a voice outside any
    /// measure gets one numbered after its part
    fn current_measure(&mut self, line: InputLine, voice: VoiceId) -> MeasureId {
        if let Some(measure) = self.score.voices[voice].last_measure {
            return measure;
        }
        let part = self.score.staves[self.score.voices[voice].staff].part;
        let number = self.score.parts[part]
            .current_measure
            .as_ref()
            .map_or_else(|| "1".to_string(), |m| m.number.clone());
        log::debug!("line {}: voice {} had no measure yet", line, self.score.voices[voice].number);
        self.create_measure(line, &number, voice, MeasureImplicitKind::Explicit)
    }

    /// Position reached in the voice's current measure
    pub fn voice_position(&self, voice: VoiceId) -> Duration {
        self.score.voices[voice]
            .last_measure
            .map_or(Duration::zero(), |m| self.score.measures[m].position)
    }

    // ========================================================================
    // MEASURE ELEMENTS
    // ========================================================================

    /// Append a note, rest or padding skip to an open measure
    pub fn append_note_or_padding(&mut self, measure: MeasureId, note: Note) -> MsrResult<()> {
        let line = note.input_line;
        self.append_measure_element(line, measure, MeasureElement::Note(note))
    }

    fn append_measure_element(
        &mut self,
        line: InputLine,
        measure: MeasureId,
        element: MeasureElement,
    ) -> MsrResult<()> {
        let measure = &mut self.score.measures[measure];
        if measure.closed {
            return Err(MsrError::ClosedMeasureMutation {
                line,
                measure_number: measure.number.clone(),
            });
        }
        measure.position += element.measure_advance();
        measure.elements.push(element);
        Ok(())
    }

    /// Append a note to the voice's current measure
    pub fn append_note_to_voice(&mut self, voice: VoiceId, note: Note) -> MsrResult<()> {
        let measure = self.current_measure(note.input_line, voice);
        self.append_note_or_padding(measure, note)
    }

    /// Pad the voice's current measure with a skip up to `position`
    pub fn pad_voice_to(&mut self, line: InputLine, voice: VoiceId, position: Duration) -> MsrResult<()> {
        let measure = self.current_measure(line, voice);
        let reached = self.score.measures[measure].position;
        if position > reached {
            self.append_note_or_padding(measure, Note::skip(line, position - reached))?;
        }
        Ok(())
    }

    /// Add a note sounding with the previous one
    ///
    /// The previous note becomes the first member of a new chord; a
    /// following member joins the chord. Chord members take no extra time.
    pub fn append_chord_member(&mut self, voice: VoiceId, note: Note) -> MsrResult<()> {
        let line = note.input_line;
        let measure = self.current_measure(line, voice);
        let measure_data = &mut self.score.measures[measure];
        if measure_data.closed {
            return Err(MsrError::ClosedMeasureMutation {
                line,
                measure_number: measure_data.number.clone(),
            });
        }

        match measure_data.elements.pop() {
            Some(MeasureElement::Chord(mut chord)) => {
                chord.notes.push(note);
                measure_data.elements.push(MeasureElement::Chord(chord));
                Ok(())
            }
            Some(MeasureElement::Note(first)) if !first.is_rest_or_skip() => {
                measure_data.elements.push(MeasureElement::Chord(Chord {
                    input_line: first.input_line,
                    notes: vec![first, note],
                }));
                Ok(())
            }
            other => {
                if let Some(other) = other {
                    measure_data.elements.push(other);
                }
                self.diagnostics
                    .warning(line, "chord member without a preceding note, appended as a note");
                self.append_note_or_padding(measure, note)
            }
        }
    }

    /// Attach a chord symbol at `position` of the voice's current measure
    pub fn append_harmony(
        &mut self,
        line: InputLine,
        voice: VoiceId,
        harmony: Harmony,
        position: Duration,
    ) -> MsrResult<VoiceId> {
        let harmony_voice = self.harmony_voice_for(line, voice)?;
        self.pad_voice_to(line, harmony_voice, position)?;
        let measure = self.current_measure(line, harmony_voice);
        self.append_measure_element(line, measure, MeasureElement::Harmony(harmony))?;
        Ok(harmony_voice)
    }

    /// Attach a figured bass at `position` of the voice's current measure
    pub fn append_figured_bass(
        &mut self,
        line: InputLine,
        voice: VoiceId,
        figured_bass: FiguredBass,
        position: Duration,
    ) -> MsrResult<VoiceId> {
        let figured_bass_voice = self.figured_bass_voice_for(line, voice)?;
        self.pad_voice_to(line, figured_bass_voice, position)?;
        let measure = self.current_measure(line, figured_bass_voice);
        self.append_measure_element(line, measure, MeasureElement::FiguredBass(figured_bass))?;
        Ok(figured_bass_voice)
    }

    /// Move a voice to another staff of its part from this point on
    pub fn append_voice_staff_change(
        &mut self,
        line: InputLine,
        voice: VoiceId,
        to_staff: u32,
    ) -> MsrResult<()> {
        let from_staff = self.score.voices[voice].current_staff_number;
        if from_staff == to_staff {
            return Ok(());
        }
        let measure = self.current_measure(line, voice);
        self.append_measure_element(
            line,
            measure,
            MeasureElement::VoiceStaffChange(VoiceStaffChange {
                from_staff,
                to_staff,
            }),
        )?;
        self.score.voices[voice].current_staff_number = to_staff;
        log::debug!(
            "line {}: voice {} moves from staff {} to staff {}",
            line,
            self.score.voices[voice].number,
            from_staff,
            to_staff
        );
        Ok(())
    }

    /// Append a barline to the current measure of every voice of a part
    pub fn append_barline_to_part(
        &mut self,
        line: InputLine,
        part: PartId,
        barline: Barline,
    ) -> MsrResult<()> {
        for voice in self.score.part_voices(part) {
            let measure = self.current_measure(line, voice);
            self.append_measure_element(line, measure, MeasureElement::Barline(barline.clone()))?;
        }
        Ok(())
    }

    // ========================================================================
    // FINISHING
    // ========================================================================

    /// Close every measure, rest run and repeat, and hand out the read-only
    /// score
    pub fn finish(mut self) -> FinishedScore {
        for part in self.score.parts_in_order() {
            let line = self.score.parts[part]
                .current_measure
                .as_ref()
                .map_or(self.score.parts[part].input_line, |m| m.input_line);
            self.close_part_measures(line, part);
            for voice in self.score.part_voices(part) {
                if let Err(error) = self.append_pending_rest_measures(line, voice) {
                    self.diagnostics.warning(error.line(), error.to_string());
                }
            }
            self.close_open_repeats_in_part(line, part);
            self.score.parts[part].current_measure = None;
        }
        if !self.open_part_groups.is_empty() {
            self.diagnostics.warning(
                0,
                format!("{} part group(s) never stopped", self.open_part_groups.len()),
            );
        }
        log::info!("MSR finished: {}", self.diagnostics.summary());
        FinishedScore::new(self.score, self.options, self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msr::types::{Clef, Pitch, Step};

    fn quarter() -> Duration {
        Duration::new(1, 4)
    }

    fn builder_with_staff() -> (ScoreBuilder, PartId, StaffId) {
        let mut builder = ScoreBuilder::new(MsrOptions::default());
        let part = builder.create_part(1, "P1");
        let staff = builder.create_staff(2, 1, StaffKind::Regular, part).unwrap();
        (builder, part, staff)
    }

    #[test]
    fn test_create_part_returns_existing() {
        let mut builder = ScoreBuilder::new(MsrOptions::default());
        let a = builder.create_part(1, "P1");
        let b = builder.create_part(9, "P1");
        assert_eq!(a, b);
        assert_eq!(builder.score().parts.len(), 1);
        assert_eq!(builder.score().parts_in_order(), vec![a]);
    }

    #[test]
    fn test_duplicate_staff_number() {
        let (mut builder, part, _) = builder_with_staff();
        let err = builder
            .create_staff(7, 1, StaffKind::Regular, part)
            .unwrap_err();
        assert!(matches!(
            err,
            MsrError::DuplicateStaffNumber { line: 7, number: 1, .. }
        ));
    }

    #[test]
    fn test_duplicate_voice_number() {
        let (mut builder, _, staff) = builder_with_staff();
        builder.create_voice(3, 1, VoiceKind::Regular, staff).unwrap();
        let err = builder
            .create_voice(4, 1, VoiceKind::Harmony { decorates: 1 }, staff)
            .unwrap_err();
        assert!(matches!(err, MsrError::DuplicateVoiceNumber { number: 1, .. }));
    }

    #[test]
    fn test_two_quarters_fill_half_measure() {
        let (mut builder, _, staff) = builder_with_staff();
        let voice = builder.create_voice(3, 1, VoiceKind::Regular, staff).unwrap();
        let measure = builder.create_measure(4, "1", voice, MeasureImplicitKind::Explicit);

        builder
            .append_note_or_padding(measure, Note::regular(5, Pitch::natural(Step::C, 4), quarter()))
            .unwrap();
        builder
            .append_note_or_padding(measure, Note::regular(6, Pitch::natural(Step::D, 4), quarter()))
            .unwrap();

        assert_eq!(builder.score().measures[measure].position, Duration::new(1, 2));
    }

    #[test]
    fn test_closed_measure_rejects_notes() {
        let (mut builder, _, staff) = builder_with_staff();
        let voice = builder.create_voice(3, 1, VoiceKind::Regular, staff).unwrap();
        let first = builder.create_measure(4, "1", voice, MeasureImplicitKind::Explicit);
        builder.create_measure(10, "2", voice, MeasureImplicitKind::Explicit);

        let err = builder
            .append_note_or_padding(first, Note::rest(11, quarter()))
            .unwrap_err();
        assert_eq!(
            err,
            MsrError::ClosedMeasureMutation {
                line: 11,
                measure_number: "1".to_string()
            }
        );
    }

    #[test]
    fn test_harmony_voice_sorts_above_its_regular_voice() {
        let (mut builder, _, staff) = builder_with_staff();
        let v1 = builder.create_voice(3, 1, VoiceKind::Regular, staff).unwrap();
        let v2 = builder.create_voice(4, 2, VoiceKind::Regular, staff).unwrap();
        let harmony = builder.harmony_voice_for(5, v2).unwrap();
        let figures = builder.figured_bass_voice_for(6, v1).unwrap();

        let staff_data = &builder.score().staves[staff];
        assert_eq!(staff_data.regular_voice_count(), 2);
        assert_eq!(staff_data.all_voices, vec![v1, figures, harmony, v2]);
        assert_eq!(builder.score().voices[harmony].number, 22);
        assert_eq!(builder.score().voices[figures].number, 41);
        assert_eq!(builder.score().voices[harmony].sequential_number, None);
    }

    #[test]
    fn test_whole_measure_rest_fills_the_time_signature() {
        let (mut builder, part, staff) = builder_with_staff();
        let voice = builder.create_voice(3, 1, VoiceKind::Regular, staff).unwrap();
        builder.append_time_to_part(4, part, Time::new(3, 4));
        builder.create_measure_in_part(5, part, "1", MeasureImplicitKind::Explicit);

        let mut rest = Note::rest(6, Duration::whole());
        rest.whole_measure_rest = true;
        builder.append_note_to_voice(voice, rest).unwrap();
        let measure = builder.score().voices[voice].last_measure.unwrap();
        assert_eq!(builder.score().measures[measure].length(), Duration::new(3, 4));

        builder.create_measure_in_part(7, part, "2", MeasureImplicitKind::Explicit);
        builder
            .append_note_to_voice(voice, Note::rest(8, Duration::new(1, 2)))
            .unwrap();
        let measure = builder.score().voices[voice].last_measure.unwrap();
        assert_eq!(builder.score().measures[measure].length(), Duration::new(1, 2));
    }

    #[test]
    fn test_harmony_voice_skips_number_of_regular_voice() {
        let (mut builder, _, staff) = builder_with_staff();
        let v1 = builder.create_voice(3, 1, VoiceKind::Regular, staff).unwrap();
        let v21 = builder.create_voice(4, 21, VoiceKind::Regular, staff).unwrap();
        let harmony = builder.harmony_voice_for(5, v1).unwrap();

        assert_ne!(harmony, v21);
        let voice = &builder.score().voices[harmony];
        assert_eq!(voice.kind, VoiceKind::Harmony { decorates: 1 });
        assert_eq!(voice.number, 22);
        assert_eq!(builder.harmony_voice_for(6, v1).unwrap(), harmony);
    }

    #[test]
    fn test_source_voice_displaces_harmony_voice_number() {
        let (mut builder, _, staff) = builder_with_staff();
        let v1 = builder.create_voice(3, 1, VoiceKind::Regular, staff).unwrap();
        let harmony = builder.harmony_voice_for(4, v1).unwrap();
        let v21 = builder.fetch_or_create_voice(5, 21, staff).unwrap();

        assert_ne!(v21, harmony);
        assert_eq!(builder.score().voices[v21].kind, VoiceKind::Regular);
        assert_eq!(builder.score().voices[harmony].number, 22);

        let staff_data = &builder.score().staves[staff];
        assert_eq!(staff_data.voices_by_number.get(&21), Some(&v21));
        assert_eq!(staff_data.voices_by_number.get(&22), Some(&harmony));
        assert_eq!(builder.harmony_voice_for(6, v1).unwrap(), harmony);
    }

    #[test]
    fn test_harmony_and_figured_bass_numbers_do_not_collide() {
        let (mut builder, _, staff) = builder_with_staff();
        let v5 = builder.create_voice(3, 5, VoiceKind::Regular, staff).unwrap();
        let v25 = builder.create_voice(4, 25, VoiceKind::Regular, staff).unwrap();
        let harmony = builder.harmony_voice_for(5, v25).unwrap();
        let figures = builder.figured_bass_voice_for(6, v5).unwrap();

        assert_ne!(harmony, figures);
        assert_eq!(builder.score().voices[harmony].number, 45);
        assert_eq!(builder.score().voices[figures].number, 46);
        assert_eq!(
            builder.score().voices[figures].kind,
            VoiceKind::FiguredBass { decorates: 5 }
        );
    }

    #[test]
    fn test_sequential_numbers_follow_raw_numbers() {
        let (mut builder, _, staff) = builder_with_staff();
        let v3 = builder.create_voice(3, 3, VoiceKind::Regular, staff).unwrap();
        let v1 = builder.create_voice(4, 1, VoiceKind::Regular, staff).unwrap();

        assert_eq!(builder.score().voices[v1].sequential_number, Some(1));
        assert_eq!(builder.score().voices[v3].sequential_number, Some(2));
        builder.assign_sequential_numbers(staff);
        assert_eq!(builder.score().voices[v3].sequential_number, Some(2));
        assert_eq!(builder.fetch_first_regular_voice(staff), Some(v1));
    }

    #[test]
    fn test_voice_overflow_continue_records_warning() {
        let options = MsrOptions {
            max_regular_voices: 1,
            voice_overflow: VoiceOverflowPolicy::Continue,
            ..MsrOptions::default()
        };
        let mut builder = ScoreBuilder::new(options);
        let part = builder.create_part(1, "P1");
        let staff = builder.create_staff(1, 1, StaffKind::Regular, part).unwrap();
        builder.create_voice(2, 1, VoiceKind::Regular, staff).unwrap();
        builder.create_voice(3, 2, VoiceKind::Regular, staff).unwrap();

        assert_eq!(builder.score().staves[staff].regular_voice_count(), 2);
        assert_eq!(builder.diagnostics().lines_with(crate::msr::Severity::Warning), vec![3]);
    }

    #[test]
    fn test_chord_absorbs_previous_note() {
        let (mut builder, part, staff) = builder_with_staff();
        let voice = builder.create_voice(3, 1, VoiceKind::Regular, staff).unwrap();
        builder.create_measure_in_part(4, part, "1", MeasureImplicitKind::Explicit);

        builder
            .append_note_to_voice(voice, Note::regular(5, Pitch::natural(Step::C, 4), quarter()))
            .unwrap();
        builder
            .append_chord_member(voice, Note::regular(6, Pitch::natural(Step::E, 4), quarter()))
            .unwrap();
        builder
            .append_chord_member(voice, Note::regular(7, Pitch::natural(Step::G, 4), quarter()))
            .unwrap();

        let measure = &builder.score().measures[builder.score().voices[voice].last_measure.unwrap()];
        assert_eq!(measure.position, quarter());
        match &measure.elements[..] {
            [MeasureElement::Chord(chord)] => assert_eq!(chord.notes.len(), 3),
            other => panic!("expected one chord, got {:?}", other),
        }
    }

    #[test]
    fn test_part_measures_padded_to_high_tide() {
        let (mut builder, part, staff) = builder_with_staff();
        let v1 = builder.create_voice(3, 1, VoiceKind::Regular, staff).unwrap();
        let v2 = builder.create_voice(4, 2, VoiceKind::Regular, staff).unwrap();
        builder.create_measure_in_part(5, part, "1", MeasureImplicitKind::Explicit);
        builder
            .append_note_to_voice(v1, Note::regular(6, Pitch::natural(Step::C, 4), Duration::new(1, 2)))
            .unwrap();
        builder
            .append_note_to_voice(v2, Note::rest(7, quarter()))
            .unwrap();
        let short = builder.score().voices[v2].last_measure.unwrap();

        builder.create_measure_in_part(8, part, "2", MeasureImplicitKind::Explicit);

        let short = &builder.score().measures[short];
        assert!(short.closed);
        assert_eq!(short.position, Duration::new(1, 2));
        assert!(matches!(
            short.elements.last(),
            Some(MeasureElement::Note(note)) if note.kind == crate::msr::types::NoteKind::Skip
        ));
    }

    #[test]
    fn test_late_voice_joins_current_measure() {
        let (mut builder, part, staff) = builder_with_staff();
        builder.create_voice(3, 1, VoiceKind::Regular, staff).unwrap();
        builder.create_measure_in_part(4, part, "7", MeasureImplicitKind::Explicit);
        let late = builder.create_voice(5, 2, VoiceKind::Regular, staff).unwrap();

        let measure = builder.score().voices[late].last_measure.unwrap();
        assert_eq!(builder.score().measures[measure].number, "7");
    }

    #[test]
    fn test_late_voice_restates_inherited_clef() {
        let (mut builder, part, staff) = builder_with_staff();
        builder.create_measure_in_part(3, part, "1", MeasureImplicitKind::Explicit);
        builder.append_clef_to_part(4, part, Clef::bass());
        let voice = builder.create_voice(5, 1, VoiceKind::Regular, staff).unwrap();

        let measure = builder.score().voices[voice].last_measure.unwrap();
        assert_eq!(
            builder.score().measures[measure].elements,
            vec![MeasureElement::Clef(Clef::bass())]
        );
    }

    #[test]
    fn test_staff_details_wait_for_their_staff() {
        let mut builder = ScoreBuilder::new(MsrOptions::default());
        let part = builder.create_part(1, "P1");
        builder.append_staff_details(2, part, StaffDetails::new(Some(2), Some(5)));
        builder.create_staff(3, 1, StaffKind::Regular, part).unwrap();
        let second = builder.create_staff(4, 2, StaffKind::Regular, part).unwrap();

        assert_eq!(builder.score().staves[second].details.len(), 1);
        assert!(builder.score().parts[part].pending_staff_details.is_empty());
    }

    #[test]
    fn test_part_groups_nest() {
        let mut builder = ScoreBuilder::new(MsrOptions::default());
        let outer = builder.create_part_group(1, 1, PartGroupSymbol::Bracket);
        let inner = builder.create_part_group(2, 2, PartGroupSymbol::Brace);
        let p1 = builder.create_part(3, "P1");
        builder.close_part_group(4, 2);
        let p2 = builder.create_part(5, "P2");
        builder.close_part_group(6, 1);

        let score = builder.score();
        assert_eq!(score.part_groups[inner].parent, Some(outer));
        assert_eq!(score.parts[p1].part_group, inner);
        assert_eq!(score.parts[p2].part_group, outer);
        assert_eq!(score.parts_in_order(), vec![p1, p2]);
    }

    #[test]
    fn test_staff_inherits_part_clef() {
        let mut builder = ScoreBuilder::new(MsrOptions::default());
        let part = builder.create_part(1, "P1");
        builder.append_clef_to_part(2, part, Clef::bass());
        let staff = builder.create_staff(3, 1, StaffKind::Regular, part).unwrap();
        assert_eq!(builder.staff_context::<Clef>(staff), Some(&Clef::bass()));
    }
}
