//! MusicXML element translation
//!
//! Walks a `score-partwise` tree in document order and drives the
//! [`ScoreBuilder`]. Parts are read one after the other; inside a part a
//! cursor tracks the divisions in force, the position reached in the
//! current measure (moved by notes, `<backup>` and `<forward>`) and the
//! voices met so far.
//!
//! Harmonies and figured basses precede the note they belong to in
//! MusicXML, so they wait in the cursor until that note arrives.

use crate::converters::musicxml::musicxml_to_msr::errors::{ConversionError, ParseError};
use crate::converters::musicxml::musicxml_to_msr::parser::{
    children_named, extract_identification, get_child, get_child_text, has_child, parse_attribute,
    parse_barline, parse_child, parse_clef, parse_figures, parse_harmony_root, parse_key,
    parse_pitch, parse_staff_details, parse_time, parse_transpose, yes_no_attribute, XmlDocument,
};
use crate::converters::musicxml::musicxml_to_msr::TranslatorSettings;
use crate::msr::{
    next_measure_number, BarlineStyle, ContextValue, Duration, EndingEvent, FiguredBass,
    FinishedScore, Harmony, InputLine, MeasureImplicitKind, MsrError, MsrResult, Note, NoteKind,
    NoteType, PartGroupSymbol, PartId, Pitch, RepeatDirection, ScoreBuilder, Step, Tie,
    TupletFactor, VoiceId,
};
use num_rational::Rational64;
use roxmltree::Node;
use std::collections::HashMap;

/// Translation state of the part being read
struct PartCursor {
    part: PartId,
    divisions: u32,
    measure_number: String,
    /// Position reached in the current measure
    position: Duration,
    /// Voices by MusicXML voice number, which is unique within a part
    voices: HashMap<u32, VoiceId>,
    pending_harmonies: Vec<(InputLine, Harmony)>,
    /// Figured basses with their own `<duration>`, if any
    pending_figured_basses: Vec<(InputLine, FiguredBass, Option<Duration>)>,
    pending_multiple_rest: Option<(InputLine, usize, Option<bool>)>,
}

impl PartCursor {
    fn new(part: PartId) -> Self {
        Self {
            part,
            divisions: 1,
            measure_number: "0".to_string(),
            position: Duration::zero(),
            voices: HashMap::new(),
            pending_harmonies: Vec::new(),
            pending_figured_basses: Vec::new(),
            pending_multiple_rest: None,
        }
    }

    fn duration_of(&self, node: Node) -> Option<Duration> {
        parse_child::<u32>(node, "duration").and_then(|d| Duration::from_divisions(d, self.divisions))
    }
}

/// One-shot translator of a parsed MusicXML document
pub struct Translator<'a, 'input> {
    document: &'a XmlDocument<'input>,
    settings: &'a TranslatorSettings,
    builder: ScoreBuilder,
}

impl<'a, 'input> Translator<'a, 'input> {
    pub fn new(document: &'a XmlDocument<'input>, settings: &'a TranslatorSettings) -> Self {
        Self {
            document,
            settings,
            builder: ScoreBuilder::new(settings.msr.clone()),
        }
    }

    /// Translate the whole document into a finished MSR
    pub fn translate(mut self) -> Result<FinishedScore, ConversionError> {
        let document = self.document;
        let score = document.score_partwise()?;

        *self.builder.identification_mut() = extract_identification(score);

        let part_list = get_child(score, "part-list").ok_or_else(|| {
            ParseError::MissingRequiredElement("score-partwise missing part-list".to_string())
        })?;
        self.translate_part_list(part_list)?;

        let parts: Vec<Node> = children_named(score, "part").collect();
        if parts.is_empty() {
            return Err(
                ParseError::MissingRequiredElement("score-partwise has no part".to_string()).into(),
            );
        }
        for part in parts {
            self.translate_part(part)?;
        }

        Ok(self.builder.finish())
    }

    fn line(&self, node: Node) -> InputLine {
        self.document.line_of(node)
    }

    /// Record a builder error, or abort with it
    fn recover<T>(&mut self, result: MsrResult<T>) -> Result<Option<T>, ConversionError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(error) if self.settings.abort_on_errors => Err(error.into()),
            Err(error) => {
                self.builder
                    .diagnostics_mut()
                    .error(error.line(), error.to_string());
                Ok(None)
            }
        }
    }

    // ========================================================================
    // PART LIST
    // ========================================================================

    fn translate_part_list(&mut self, part_list: Node<'a, 'input>) -> Result<(), ConversionError> {
        for child in part_list.children().filter(|n| n.is_element()) {
            let line = self.line(child);
            match child.tag_name().name() {
                "part-group" => {
                    let number = parse_attribute(child, "number").unwrap_or(1);
                    match child.attribute("type") {
                        Some("start") => {
                            let symbol = get_child_text(child, "group-symbol")
                                .map(|s| PartGroupSymbol::from_musicxml(&s))
                                .unwrap_or(PartGroupSymbol::None);
                            let group = self.builder.create_part_group(line, number, symbol);
                            self.builder.set_part_group_names(
                                group,
                                get_child_text(child, "group-name"),
                                get_child_text(child, "group-abbreviation"),
                            );
                            if let Some(barline) = get_child_text(child, "group-barline") {
                                self.builder.set_part_group_barline(group, barline != "no");
                            }
                        }
                        Some("stop") => self.builder.close_part_group(line, number),
                        other => self.builder.diagnostics_mut().warning(
                            line,
                            format!("part-group {} with type {:?} ignored", number, other),
                        ),
                    }
                }
                "score-part" => {
                    let id = child.attribute("id").ok_or_else(|| {
                        ParseError::MissingRequiredElement(format!(
                            "score-part on line {} has no id",
                            line
                        ))
                    })?;
                    let part = self.builder.create_part(line, id);
                    self.builder.set_part_names(
                        part,
                        get_child_text(child, "part-name"),
                        get_child_text(child, "part-abbreviation"),
                    );
                }
                _ => {}
            }
        }
        Ok(())
    }

    // ========================================================================
    // PARTS AND MEASURES
    // ========================================================================

    fn translate_part(&mut self, node: Node<'a, 'input>) -> Result<(), ConversionError> {
        let line = self.line(node);
        let id = node.attribute("id").ok_or_else(|| {
            ParseError::MissingRequiredElement(format!("part on line {} has no id", line))
        })?;
        let part = match self.builder.score().part_by_id(id) {
            Some(part) => part,
            None => {
                self.builder
                    .diagnostics_mut()
                    .warning(line, format!("part \"{}\" is not in the part-list", id));
                self.builder.create_part(line, id)
            }
        };
        log::debug!("line {}: translating part \"{}\"", line, id);

        let mut cursor = PartCursor::new(part);
        for measure in children_named(node, "measure") {
            self.translate_measure(measure, &mut cursor)?;
        }
        Ok(())
    }

    fn translate_measure(
        &mut self,
        node: Node<'a, 'input>,
        cursor: &mut PartCursor,
    ) -> Result<(), ConversionError> {
        let line = self.line(node);
        let number = node
            .attribute("number")
            .map(|n| n.trim().to_string())
            .unwrap_or_else(|| next_measure_number(&cursor.measure_number, 1));
        let implicit = if yes_no_attribute(node, "implicit") == Some(true) {
            MeasureImplicitKind::Implicit
        } else {
            MeasureImplicitKind::Explicit
        };

        self.builder
            .create_measure_in_part(line, cursor.part, &number, implicit);
        cursor.measure_number = number;
        cursor.position = Duration::zero();

        for child in node.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                "attributes" => self.translate_attributes(child, cursor)?,
                "note" => self.translate_note(child, cursor)?,
                "backup" => {
                    if let Some(duration) = cursor.duration_of(child) {
                        cursor.position = cursor.position.saturating_sub(duration);
                    }
                }
                "forward" => {
                    if let Some(duration) = cursor.duration_of(child) {
                        cursor.position += duration;
                    }
                }
                "barline" => self.translate_barline(child, cursor)?,
                "harmony" => self.queue_harmony(child, cursor),
                "figured-bass" => self.queue_figured_bass(child, cursor),
                other => log::trace!("line {}: <{}> not translated", self.line(child), other),
            }
        }

        self.end_measure(line, cursor);
        Ok(())
    }

    fn end_measure(&mut self, line: InputLine, cursor: &mut PartCursor) {
        for (harmony_line, _) in cursor.pending_harmonies.drain(..) {
            self.builder
                .diagnostics_mut()
                .warning(harmony_line, "harmony not followed by a note, dropped");
        }
        for (figured_bass_line, _, _) in cursor.pending_figured_basses.drain(..) {
            self.builder
                .diagnostics_mut()
                .warning(figured_bass_line, "figured bass not followed by a note, dropped");
        }
        // A run counts measures as they close, starting with this one
        if let Some((rest_line, count, slashes)) = cursor.pending_multiple_rest.take() {
            self.builder
                .start_rest_measures_run(rest_line, cursor.part, count, slashes);
        }
        log::trace!("line {}: measure \"{}\" read", line, cursor.measure_number);
    }

    // ========================================================================
    // ATTRIBUTES
    // ========================================================================

    fn translate_attributes(
        &mut self,
        node: Node<'a, 'input>,
        cursor: &mut PartCursor,
    ) -> Result<(), ConversionError> {
        let line = self.line(node);
        let part = cursor.part;

        if let Some(divisions) = parse_child::<u32>(node, "divisions") {
            if divisions == 0 {
                self.builder
                    .diagnostics_mut()
                    .warning(line, "divisions of 0 ignored");
            } else {
                cursor.divisions = divisions;
            }
        }

        if let Some(staves) = parse_child::<u32>(node, "staves") {
            for number in 1..=staves {
                let result = self.builder.fetch_or_create_staff(line, number, part);
                self.recover(result)?;
            }
        }

        for key in children_named(node, "key") {
            let line = self.line(key);
            match parse_key(key) {
                Some(value) => self.append_context(line, part, parse_attribute(key, "number"), value)?,
                None => self
                    .builder
                    .diagnostics_mut()
                    .warning(line, "non-traditional key signature ignored"),
            }
        }

        for time in children_named(node, "time") {
            let line = self.line(time);
            match parse_time(time) {
                Some(value) => self.append_context(line, part, parse_attribute(time, "number"), value)?,
                None => self
                    .builder
                    .diagnostics_mut()
                    .warning(line, "time signature without beats or beat type ignored"),
            }
        }

        for clef in children_named(node, "clef") {
            let line = self.line(clef);
            match parse_clef(clef) {
                Some(value) => self.append_context(line, part, parse_attribute(clef, "number"), value)?,
                None => self
                    .builder
                    .diagnostics_mut()
                    .warning(line, "clef with unknown sign ignored"),
            }
        }

        for details in children_named(node, "staff-details") {
            let line = self.line(details);
            self.builder
                .append_staff_details(line, part, parse_staff_details(details));
        }

        for transpose in children_named(node, "transpose") {
            let line = self.line(transpose);
            let value = parse_transpose(transpose);
            self.append_context(line, part, parse_attribute(transpose, "number"), value)?;
        }

        for style in children_named(node, "measure-style") {
            if let Some(multiple_rest) = get_child(style, "multiple-rest") {
                let line = self.line(multiple_rest);
                match multiple_rest.text().and_then(|t| t.trim().parse::<usize>().ok()) {
                    Some(count) => {
                        let slashes = yes_no_attribute(multiple_rest, "use-symbols");
                        cursor.pending_multiple_rest = Some((line, count, slashes));
                    }
                    None => self
                        .builder
                        .diagnostics_mut()
                        .warning(line, "multiple-rest without a measure count ignored"),
                }
            }
        }

        Ok(())
    }

    /// Context values with a `number` attribute target one staff, the others
    /// the whole part
    fn append_context<T: ContextValue>(
        &mut self,
        line: InputLine,
        part: PartId,
        staff_number: Option<u32>,
        value: T,
    ) -> Result<(), ConversionError> {
        match staff_number {
            None => {
                self.builder.append_context_to_part(line, part, value);
            }
            Some(number) => {
                let result = self.builder.fetch_or_create_staff(line, number, part);
                if let Some(staff) = self.recover(result)? {
                    self.builder.append_context_to_staff(line, staff, value);
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // NOTES
    // ========================================================================

    fn translate_note(
        &mut self,
        node: Node<'a, 'input>,
        cursor: &mut PartCursor,
    ) -> Result<(), ConversionError> {
        let line = self.line(node);
        let staff_number = parse_child(node, "staff").unwrap_or(1);
        let voice_number = parse_child(node, "voice").unwrap_or(1);

        let note = build_note(node, line, cursor.divisions, staff_number)?;
        let Some(voice) = self.voice_for_note(line, cursor, voice_number, staff_number)? else {
            return Ok(());
        };

        if has_child(node, "chord") {
            let result = self.builder.append_chord_member(voice, note);
            self.recover(result)?;
            return Ok(());
        }

        let start = cursor.position;
        let result = self.builder.pad_voice_to(line, voice, start);
        self.recover(result)?;

        let sounding = note.sounding;
        if note.kind != NoteKind::Grace {
            self.flush_decorations(voice, start, sounding, cursor)?;
        }

        let result = self.builder.append_note_to_voice(voice, note);
        self.recover(result)?;
        cursor.position += sounding;
        Ok(())
    }

    /// Voice of a note, created on first use; a known voice appearing on
    /// another staff of the part moves there
    fn voice_for_note(
        &mut self,
        line: InputLine,
        cursor: &mut PartCursor,
        voice_number: u32,
        staff_number: u32,
    ) -> Result<Option<VoiceId>, ConversionError> {
        let result = self
            .builder
            .fetch_or_create_staff(line, staff_number, cursor.part);
        let Some(staff) = self.recover(result)? else {
            return Ok(None);
        };

        if let Some(voice) = cursor.voices.get(&voice_number).copied() {
            let result = self
                .builder
                .append_voice_staff_change(line, voice, staff_number);
            self.recover(result)?;
            return Ok(Some(voice));
        }

        let result = self.builder.fetch_or_create_voice(line, voice_number, staff);
        let Some(voice) = self.recover(result)? else {
            return Ok(None);
        };
        cursor.voices.insert(voice_number, voice);
        Ok(Some(voice))
    }

    // ========================================================================
    // HARMONIES AND FIGURED BASS
    // ========================================================================

    fn queue_harmony(&mut self, node: Node<'a, 'input>, cursor: &mut PartCursor) {
        let line = self.line(node);
        match parse_harmony_root(node) {
            Some((root_step, root_alteration, kind)) => cursor.pending_harmonies.push((
                line,
                Harmony {
                    root_step,
                    root_alteration,
                    kind,
                    duration: Duration::zero(),
                },
            )),
            None => self
                .builder
                .diagnostics_mut()
                .warning(line, "harmony without root ignored"),
        }
    }

    fn queue_figured_bass(&mut self, node: Node<'a, 'input>, cursor: &mut PartCursor) {
        let line = self.line(node);
        let figured_bass = FiguredBass {
            figures: parse_figures(node),
            duration: Duration::zero(),
        };
        let duration = cursor.duration_of(node);
        cursor
            .pending_figured_basses
            .push((line, figured_bass, duration));
    }

    /// Attach waiting harmonies and figured basses to the note starting at
    /// `start`; several harmonies share the note's duration evenly
    fn flush_decorations(
        &mut self,
        voice: VoiceId,
        start: Duration,
        sounding: Duration,
        cursor: &mut PartCursor,
    ) -> Result<(), ConversionError> {
        let harmonies = std::mem::take(&mut cursor.pending_harmonies);
        if !harmonies.is_empty() {
            let share = sounding * Rational64::new(1, harmonies.len() as i64);
            let mut position = start;
            for (line, mut harmony) in harmonies {
                harmony.duration = share;
                let result = self.builder.append_harmony(line, voice, harmony, position);
                self.recover(result)?;
                position += share;
            }
        }

        let mut position = start;
        for (line, mut figured_bass, duration) in std::mem::take(&mut cursor.pending_figured_basses) {
            figured_bass.duration = duration.unwrap_or(sounding);
            let advance = figured_bass.duration;
            let result = self
                .builder
                .append_figured_bass(line, voice, figured_bass, position);
            self.recover(result)?;
            position += advance;
        }
        Ok(())
    }

    // ========================================================================
    // BARLINES AND REPEATS
    // ========================================================================

    /// Repeat events are applied in playing order: a forward repeat before
    /// an ending start, a backward repeat before the ending stop it closes
    fn translate_barline(
        &mut self,
        node: Node<'a, 'input>,
        cursor: &mut PartCursor,
    ) -> Result<(), ConversionError> {
        let line = self.line(node);
        let part = cursor.part;
        let barline = parse_barline(node);

        if barline.repeat == Some(RepeatDirection::Forward) {
            let result = self.builder.handle_repeat_start(line, part);
            self.recover(result)?;
        }

        if let Some(EndingEvent::Start { numbering }) = &barline.ending {
            let mut result = self.builder.handle_repeat_ending_start(line, part, numbering);
            if matches!(result, Err(MsrError::RepeatEndingOutsideRepeat { .. }))
                && self.settings.implicit_initial_repeat_start
            {
                self.builder.handle_implicit_repeat_start(line, part);
                result = self.builder.handle_repeat_ending_start(line, part, numbering);
            }
            self.recover(result)?;
        }

        if barline.repeat == Some(RepeatDirection::Backward) {
            let times = barline.times.unwrap_or(2);
            let measure_number = cursor.measure_number.clone();
            let mut result = self
                .builder
                .handle_repeat_end(line, part, &measure_number, times);
            if matches!(result, Err(MsrError::UnmatchedRepeatEnd { .. }))
                && self.settings.implicit_initial_repeat_start
            {
                self.builder.handle_implicit_repeat_start(line, part);
                result = self
                    .builder
                    .handle_repeat_end(line, part, &measure_number, times);
            }
            self.recover(result)?;
        }

        if let Some(EndingEvent::Stop { numbering, kind }) = &barline.ending {
            let result = self
                .builder
                .handle_repeat_ending_end(line, part, numbering, *kind);
            self.recover(result)?;
        }

        if barline.style != BarlineStyle::Regular || barline.repeat.is_some() || barline.ending.is_some() {
            let result = self.builder.append_barline_to_part(line, part, barline);
            self.recover(result)?;
        }
        Ok(())
    }
}

// ============================================================================
// NOTE BUILDING
// ============================================================================

/// Build an MSR note from a <note> element
///
/// The `<duration>` gives the sounding length; `<type>` and `<dot>` give the
/// displayed one. When only one of them is present the other follows from
/// it and the time modification.
fn build_note(
    node: Node,
    line: InputLine,
    divisions: u32,
    staff_number: u32,
) -> Result<Note, ConversionError> {
    let is_rest = has_child(node, "rest");
    let is_grace = has_child(node, "grace");

    let pitch = if is_rest {
        None
    } else if let Some(pitch) = get_child(node, "pitch") {
        Some(parse_pitch(pitch)?)
    } else if let Some(unpitched) = get_child(node, "unpitched") {
        Some(parse_unpitched(unpitched, line)?)
    } else {
        return Err(ParseError::MissingRequiredElement(format!(
            "note on line {} has no pitch, unpitched or rest",
            line
        ))
        .into());
    };

    let printed_type = get_child_text(node, "type").and_then(|t| NoteType::from_musicxml(&t));
    let dots = children_named(node, "dot").count() as u8;
    let tuplet = get_child(node, "time-modification").and_then(|tm| {
        TupletFactor::new(parse_child(tm, "actual-notes")?, parse_child(tm, "normal-notes")?)
    });
    let source_duration =
        parse_child::<u32>(node, "duration").and_then(|d| Duration::from_divisions(d, divisions));

    let (displayed, sounding) = if is_grace {
        let displayed = printed_type.map_or(Duration::new(1, 8), |t| Duration::from_note_type(t, dots));
        (displayed, Duration::zero())
    } else {
        let from_type = printed_type.map(|t| Duration::from_note_type(t, dots));
        match (source_duration, from_type) {
            (Some(sounding), Some(displayed)) => (displayed, sounding),
            (Some(sounding), None) => (sounding, sounding),
            (None, Some(displayed)) => (displayed, tuplet.map_or(displayed, |t| t.apply(displayed))),
            (None, None) => {
                return Err(ParseError::MissingRequiredElement(format!(
                    "note on line {} has neither duration nor type",
                    line
                ))
                .into())
            }
        }
    };

    let (note_type, dots) = match printed_type {
        Some(note_type) => (Some(note_type), dots),
        None => NoteType::for_duration(displayed).map_or((None, 0), |(t, d)| (Some(t), d)),
    };

    let kind = if is_rest {
        NoteKind::Rest
    } else if is_grace {
        NoteKind::Grace
    } else if has_child(node, "cue") {
        NoteKind::Cue
    } else {
        NoteKind::Regular
    };

    let whole_measure_rest = get_child(node, "rest")
        .map_or(false, |rest| yes_no_attribute(rest, "measure") == Some(true));

    Ok(Note {
        kind,
        input_line: line,
        pitch,
        displayed,
        sounding,
        note_type,
        dots,
        tuplet: tuplet.filter(|t| !t.is_identity()),
        tie: parse_tie(node),
        staff_number: Some(staff_number),
        whole_measure_rest,
    })
}

/// Percussion notes print at their display position
fn parse_unpitched(unpitched: Node, line: InputLine) -> Result<Pitch, ParseError> {
    let step = get_child_text(unpitched, "display-step")
        .and_then(|s| Step::from_musicxml(&s))
        .unwrap_or(Step::B);
    let octave = parse_child(unpitched, "display-octave").unwrap_or(4);
    log::trace!("line {}: unpitched note displayed as {:?}{}", line, step, octave);
    Ok(Pitch::natural(step, octave))
}

fn parse_tie(node: Node) -> Option<Tie> {
    let mut start = false;
    let mut stop = false;
    for tie in children_named(node, "tie") {
        match tie.attribute("type") {
            Some("start") => start = true,
            Some("stop") => stop = true,
            _ => {}
        }
    }
    match (start, stop) {
        (true, true) => Some(Tie::Continue),
        (true, false) => Some(Tie::Start),
        (false, true) => Some(Tie::Stop),
        (false, false) => None,
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
