//! LilyPond notation generation
//!
//! Walks a finished MSR with a visitor and writes the music part of a
//! LilyPond document: staff groups, staves, voices and their measures. The
//! document around it is rendered from a template in `templates.rs`.
//!
//! Every staff becomes `\new Staff = "<part>_S<n>"` so that cross-staff
//! voices can `\change Staff` to it. Harmony voices become `ChordNames`
//! above their staff, figured bass voices `FiguredBass` below it.

use crate::converters::msr_to_lilypond::{LilyPondSettings, PitchLanguage};
use crate::msr::{
    Alteration, Barline, BarlineStyle, Chord, Clef, Descend, Duration, FiguredBass, FinishedScore,
    Harmony, Key, MeasureElement, MeasureId, MsrNode, MsrVisitor, Note, NoteKind, NoteType,
    PartGroupSymbol, Pitch, Score, StaffKind, Step, Tie, Time, TimeSymbol, Transpose,
    TupletFactor, VoiceKind,
};

const INDENT: &str = "  ";

/// Generate the music of a finished score
pub fn generate_staves(score: &FinishedScore, settings: &LilyPondSettings) -> String {
    let mut writer = LilyPondWriter::new(score.score(), settings);
    score.browse(&mut writer);
    writer
        .lines
        .iter()
        .map(|line| format!("{}{}{}", INDENT, INDENT, line))
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// WRITER STATE
// ============================================================================

struct PartFrame {
    id: String,
    name: Option<String>,
    /// Several staves, enclosed in a PianoStaff carrying the name
    grouped: bool,
}

struct StaffBlock {
    number: u32,
    tablature: bool,
    header: String,
    regular_voices: usize,
    chord_names: Vec<String>,
    voices: Vec<String>,
    figures: Vec<String>,
}

struct VoiceBlock {
    kind: VoiceKind,
    header: String,
    lines: Vec<String>,
    depth: usize,
    /// Tokens of the measure being written
    measure: Vec<String>,
    tuplet: Option<TupletFactor>,
}

impl VoiceBlock {
    fn line(&mut self, text: impl AsRef<str>) {
        self.lines
            .push(format!("{}{}", INDENT.repeat(self.depth), text.as_ref()));
    }

    fn is_regular(&self) -> bool {
        self.kind.is_regular()
    }

    /// Open or close `\tuplet` groups so the next note sits in `tuplet`
    fn set_tuplet(&mut self, tuplet: Option<TupletFactor>) {
        if self.tuplet == tuplet {
            return;
        }
        if self.tuplet.is_some() {
            self.measure.push("}".to_string());
        }
        if let Some(t) = tuplet {
            self.measure
                .push(format!("\\tuplet {}/{} {{", t.actual, t.normal));
        }
        self.tuplet = tuplet;
    }

    fn end_measure(&mut self) {
        self.set_tuplet(None);
        if self.measure.is_empty() {
            return;
        }
        let text = format!("{} |", self.measure.join(" "));
        self.measure.clear();
        self.line(text);
    }

    fn into_lines(self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.lines.len() + 2);
        lines.push(self.header);
        lines.extend(self.lines.into_iter().map(|l| format!("{}{}", INDENT, l)));
        lines.push("}".to_string());
        lines
    }
}

struct LilyPondWriter<'a> {
    score: &'a Score,
    settings: &'a LilyPondSettings,
    lines: Vec<String>,
    depth: usize,
    part: Option<PartFrame>,
    staff: Option<StaffBlock>,
    voice: Option<VoiceBlock>,
}

impl<'a> LilyPondWriter<'a> {
    fn new(score: &'a Score, settings: &'a LilyPondSettings) -> Self {
        Self {
            score,
            settings,
            lines: Vec::new(),
            depth: 0,
            part: None,
            staff: None,
            voice: None,
        }
    }

    fn line(&mut self, text: impl AsRef<str>) {
        self.lines
            .push(format!("{}{}", INDENT.repeat(self.depth), text.as_ref()));
    }

    fn language(&self) -> PitchLanguage {
        self.settings.language
    }

    fn part_id(&self) -> &str {
        self.part.as_ref().map_or("P", |p| p.id.as_str())
    }

    fn staff_name(&self, number: u32) -> String {
        format!("{}_S{}", self.part_id(), number)
    }

    fn token(&mut self, token: String) {
        if let Some(voice) = self.voice.as_mut() {
            voice.measure.push(token);
        }
    }

    /// Token for elements only regular voices print
    fn regular_token(&mut self, token: String) {
        if self.voice.as_ref().is_some_and(VoiceBlock::is_regular) {
            self.token(token);
        }
    }

    fn enter_staff(&mut self, number: u32, kind: StaffKind, regular_voices: usize) {
        let context = match kind {
            StaffKind::Regular => "Staff",
            StaffKind::Percussion => "RhythmicStaff",
            StaffKind::Tablature => "TabStaff",
        };
        let name = self
            .part
            .as_ref()
            .filter(|p| !p.grouped)
            .and_then(|p| p.name.clone());
        let header = match name {
            Some(name) => format!(
                "\\new {} = \"{}\" \\with {{ instrumentName = \"{}\" }} <<",
                context,
                self.staff_name(number),
                escape_lilypond_string(&name)
            ),
            None => format!("\\new {} = \"{}\" <<", context, self.staff_name(number)),
        };
        self.staff = Some(StaffBlock {
            number,
            tablature: kind == StaffKind::Tablature,
            header,
            regular_voices,
            chord_names: Vec::new(),
            voices: Vec::new(),
            figures: Vec::new(),
        });
    }

    fn leave_staff(&mut self) {
        let Some(staff) = self.staff.take() else {
            return;
        };
        for line in staff.chord_names {
            self.line(line);
        }
        self.line(staff.header);
        for line in staff.voices {
            self.line(format!("{}{}", INDENT, line));
        }
        self.line(">>");
        for line in staff.figures {
            self.line(line);
        }
    }

    fn enter_voice(&mut self, number: u32, kind: VoiceKind, sequential_number: Option<u32>) {
        let (staff_number, regular_voices, tablature) = self
            .staff
            .as_ref()
            .map_or((1, 1, false), |s| (s.number, s.regular_voices, s.tablature));
        let header = match kind {
            VoiceKind::Regular => format!(
                "\\new {} = \"{}_V{}\" {{",
                if tablature { "TabVoice" } else { "Voice" },
                self.staff_name(staff_number),
                number
            ),
            VoiceKind::Harmony { .. } => "\\new ChordNames \\chordmode {".to_string(),
            VoiceKind::FiguredBass { .. } => "\\new FiguredBass \\figuremode {".to_string(),
        };
        let mut voice = VoiceBlock {
            kind,
            header,
            lines: Vec::new(),
            depth: 0,
            measure: Vec::new(),
            tuplet: None,
        };
        if kind.is_regular() && regular_voices > 1 {
            let command = match sequential_number {
                Some(1) => "\\voiceOne",
                Some(2) => "\\voiceTwo",
                Some(3) => "\\voiceThree",
                _ => "\\voiceFour",
            };
            voice.line(command);
        }
        self.voice = Some(voice);
    }

    fn leave_voice(&mut self) {
        let Some(voice) = self.voice.take() else {
            return;
        };
        let kind = voice.kind;
        let lines = voice.into_lines();
        if let Some(staff) = self.staff.as_mut() {
            match kind {
                VoiceKind::Regular => staff.voices.extend(lines),
                VoiceKind::Harmony { .. } => staff.chord_names.extend(lines),
                VoiceKind::FiguredBass { .. } => staff.figures.extend(lines),
            }
        }
    }

    fn write_note(&mut self, note: &Note) {
        let language = self.language();
        let Some(voice) = self.voice.as_mut() else {
            return;
        };
        if note.kind != NoteKind::Grace {
            voice.set_tuplet(note.tuplet);
        }
        voice.measure.push(note_token(note, language));
    }

    fn write_chord(&mut self, chord: &Chord) {
        let language = self.language();
        let Some(voice) = self.voice.as_mut() else {
            return;
        };
        if let Some(first) = chord.notes.first() {
            if first.kind != NoteKind::Grace {
                voice.set_tuplet(first.tuplet);
            }
            voice.measure.push(chord_token(chord, language));
        }
    }

    /// A compressed run prints as one multi-measure rest, preceded by the
    /// clef, key and time changes of its measures
    fn write_rest_measures(&mut self, measures: &[MeasureId], measure_length: Duration) {
        let language = self.language();
        let Some(voice) = self.voice.as_mut() else {
            return;
        };
        voice.end_measure();
        if voice.is_regular() {
            for measure in measures {
                for element in &self.score.measures[*measure].elements {
                    match element {
                        MeasureElement::Clef(clef) => voice.measure.push(clef_token(clef)),
                        MeasureElement::Key(key) => voice.measure.push(key_token(key, language)),
                        MeasureElement::Time(time) => voice.measure.push(time_token(time)),
                        _ => {}
                    }
                }
            }
        }
        let length = if measure_length == Duration::whole() {
            String::new()
        } else {
            format!("*{}", measure_length)
        };
        let rest = if voice.is_regular() {
            format!("\\compressMMRests {{ R1{}*{} }}", length, measures.len())
        } else {
            format!("s1{}*{}", length, measures.len())
        };
        voice.measure.push(rest);
        voice.end_measure();
    }
}

impl MsrVisitor for LilyPondWriter<'_> {
    fn enter(&mut self, node: MsrNode<'_>) -> Descend {
        match node {
            MsrNode::PartGroup(_, group) if !group.implicit => {
                let context = match group.symbol {
                    PartGroupSymbol::Brace => "GrandStaff",
                    _ => "StaffGroup",
                };
                match &group.name {
                    Some(name) => self.line(format!(
                        "\\new {} \\with {{ instrumentName = \"{}\" }} <<",
                        context,
                        escape_lilypond_string(name)
                    )),
                    None => self.line(format!("\\new {} <<", context)),
                }
                self.depth += 1;
            }
            MsrNode::Part(_, part) => {
                let grouped = part.staves.len() > 1;
                if grouped {
                    match &part.name {
                        Some(name) => self.line(format!(
                            "\\new PianoStaff \\with {{ instrumentName = \"{}\" }} <<",
                            escape_lilypond_string(name)
                        )),
                        None => self.line("\\new PianoStaff <<"),
                    }
                    self.depth += 1;
                }
                self.part = Some(PartFrame {
                    id: part.id.clone(),
                    name: part.name.clone(),
                    grouped,
                });
            }
            MsrNode::Staff(_, staff) => {
                self.enter_staff(staff.number, staff.kind, staff.regular_voices.len())
            }
            MsrNode::Voice(_, voice) => {
                self.enter_voice(voice.number, voice.kind, voice.sequential_number)
            }
            MsrNode::Repeat(_, repeat) => {
                if let Some(voice) = self.voice.as_mut() {
                    voice.end_measure();
                    let volta = repeat.times.max(repeat.endings.len() as u32).max(2);
                    voice.line(format!("\\repeat volta {} {{", volta));
                    voice.depth += 1;
                }
            }
            MsrNode::RepeatEnding(index, _) => {
                if let Some(voice) = self.voice.as_mut() {
                    if index == 0 {
                        voice.line("\\alternative {");
                        voice.depth += 1;
                    }
                    voice.line("{");
                    voice.depth += 1;
                }
            }
            MsrNode::RestMeasures(_, rest) if self.settings.compress_rest_measures => {
                self.write_rest_measures(&rest.measures, rest.measure_length);
                return Descend::Skip;
            }
            MsrNode::Note(note) => self.write_note(note),
            MsrNode::Chord(chord) => {
                self.write_chord(chord);
                return Descend::Skip;
            }
            MsrNode::Clef(clef) => self.regular_token(clef_token(clef)),
            MsrNode::Key(key) => {
                let token = key_token(key, self.language());
                self.regular_token(token)
            }
            MsrNode::Time(time) => self.regular_token(time_token(time)),
            MsrNode::Transpose(transpose) => {
                let token = format!(
                    "\\transposition {}",
                    transposition_pitch(transpose, self.language())
                );
                self.regular_token(token)
            }
            MsrNode::Barline(barline) => {
                if let Some(token) = barline_token(barline) {
                    self.regular_token(token);
                }
            }
            MsrNode::VoiceStaffChange(change) => {
                let token = format!("\\change Staff = \"{}\"", self.staff_name(change.to_staff));
                self.regular_token(token)
            }
            MsrNode::Harmony(harmony) => {
                let token = harmony_token(harmony, self.language());
                self.token(token)
            }
            MsrNode::FiguredBass(figured_bass) => self.token(figured_bass_token(figured_bass)),
            _ => {}
        }
        Descend::Children
    }

    fn leave(&mut self, node: MsrNode<'_>) {
        match node {
            MsrNode::PartGroup(_, group) if !group.implicit => {
                self.depth = self.depth.saturating_sub(1);
                self.line(">>");
            }
            MsrNode::Part(..) => {
                if self.part.take().is_some_and(|p| p.grouped) {
                    self.depth = self.depth.saturating_sub(1);
                    self.line(">>");
                }
            }
            MsrNode::Staff(..) => self.leave_staff(),
            MsrNode::Voice(..) => self.leave_voice(),
            MsrNode::Measure(..) => {
                if let Some(voice) = self.voice.as_mut() {
                    voice.end_measure();
                }
            }
            MsrNode::RepeatCommon(..) | MsrNode::RepeatEnding(..) => {
                if let Some(voice) = self.voice.as_mut() {
                    voice.end_measure();
                    voice.depth = voice.depth.saturating_sub(1);
                    voice.line("}");
                }
            }
            MsrNode::Repeat(_, repeat) if !repeat.endings.is_empty() => {
                if let Some(voice) = self.voice.as_mut() {
                    voice.depth = voice.depth.saturating_sub(1);
                    voice.line("}");
                }
            }
            _ => {}
        }
    }
}

// ============================================================================
// TOKENS
// ============================================================================

/// Note name in the chosen language, without octave
pub fn pitch_name(step: Step, alteration: Alteration, language: PitchLanguage) -> String {
    let step_name = step.lowercase();
    match language {
        PitchLanguage::Nederlands => {
            let suffix = match alteration {
                Alteration::DoubleFlat => "eses",
                Alteration::ThreeQuarterFlat => "eseh",
                Alteration::Flat => "es",
                Alteration::QuarterFlat => "eh",
                Alteration::Natural => "",
                Alteration::QuarterSharp => "ih",
                Alteration::Sharp => "is",
                Alteration::ThreeQuarterSharp => "isih",
                Alteration::DoubleSharp => "isis",
            };
            // "es" and "as" drop the vowel of the flat suffix
            match (step, suffix.strip_prefix('e')) {
                (Step::E | Step::A, Some(rest)) if suffix.starts_with("es") => {
                    format!("{}{}", step_name, rest)
                }
                _ => format!("{}{}", step_name, suffix),
            }
        }
        PitchLanguage::English => {
            let suffix = match alteration {
                Alteration::DoubleFlat => "ff",
                Alteration::ThreeQuarterFlat => "tqf",
                Alteration::Flat => "f",
                Alteration::QuarterFlat => "qf",
                Alteration::Natural => "",
                Alteration::QuarterSharp => "qs",
                Alteration::Sharp => "s",
                Alteration::ThreeQuarterSharp => "tqs",
                Alteration::DoubleSharp => "ss",
            };
            format!("{}{}", step_name, suffix)
        }
    }
}

/// Absolute pitch: `c` is the octave below middle C
pub fn pitch_token(pitch: &Pitch, language: PitchLanguage) -> String {
    let marks = i32::from(pitch.octave) - 3;
    let octave = if marks >= 0 {
        "'".repeat(marks as usize)
    } else {
        ",".repeat(marks.unsigned_abs() as usize)
    };
    format!("{}{}", pitch_name(pitch.step, pitch.alteration, language), octave)
}

/// Duration token from a printed value, or a scaled whole note when the
/// value has no single note type
pub fn duration_token(note_type: Option<NoteType>, dots: u8, displayed: Duration) -> String {
    let typed = note_type
        .map(|t| (t, dots))
        .or_else(|| NoteType::for_duration(displayed));
    match typed {
        Some((note_type, dots)) => format!("{}{}", note_type.lilypond_token(), ".".repeat(dots as usize)),
        None => format!("1*{}", displayed),
    }
}

fn tie_suffix(note: &Note) -> &'static str {
    match note.tie {
        Some(Tie::Start) | Some(Tie::Continue) => " ~",
        _ => "",
    }
}

pub fn note_token(note: &Note, language: PitchLanguage) -> String {
    let duration = duration_token(note.note_type, note.dots, note.displayed);
    let body = match (note.kind, &note.pitch) {
        (NoteKind::Rest, _) if note.whole_measure_rest => {
            format!("R{}", duration_token(None, 0, note.sounding))
        }
        (NoteKind::Rest, _) => format!("r{}", duration),
        (NoteKind::Skip, _) | (_, None) => format!("s{}", duration),
        (_, Some(pitch)) => format!("{}{}", pitch_token(pitch, language), duration),
    };
    let prefix = if note.kind == NoteKind::Grace { "\\grace " } else { "" };
    format!("{}{}{}", prefix, body, tie_suffix(note))
}

pub fn chord_token(chord: &Chord, language: PitchLanguage) -> String {
    let Some(first) = chord.notes.first() else {
        return String::new();
    };
    let pitches = chord
        .notes
        .iter()
        .filter_map(|n| n.pitch.as_ref())
        .map(|p| pitch_token(p, language))
        .collect::<Vec<_>>()
        .join(" ");
    let tie = if chord.notes.iter().any(|n| !tie_suffix(n).is_empty()) {
        " ~"
    } else {
        ""
    };
    let prefix = if first.kind == NoteKind::Grace { "\\grace " } else { "" };
    format!(
        "{}<{}>{}{}",
        prefix,
        pitches,
        duration_token(first.note_type, first.dots, first.displayed),
        tie
    )
}

pub fn clef_token(clef: &Clef) -> String {
    format!("\\clef \"{}\"", clef.name())
}

pub fn key_token(key: &Key, language: PitchLanguage) -> String {
    let tonic = key.tonic();
    format!(
        "\\key {} \\{}",
        pitch_name(tonic.step, tonic.alteration, language),
        key.mode.lilypond_name()
    )
}

pub fn time_token(time: &Time) -> String {
    match time.symbol {
        TimeSymbol::SenzaMisura => "\\cadenzaOn".to_string(),
        TimeSymbol::Common | TimeSymbol::Cut => {
            format!("\\defaultTimeSignature \\time {}/{}", time.beats, time.beat_type)
        }
        TimeSymbol::Numeric if matches!((time.beats, time.beat_type), (4, 4) | (2, 2)) => {
            format!("\\numericTimeSignature \\time {}/{}", time.beats, time.beat_type)
        }
        TimeSymbol::Numeric => format!("\\time {}/{}", time.beats, time.beat_type),
    }
}

/// Written pitch sounding as c' for a transposing instrument
pub fn transposition_pitch(transpose: &Transpose, language: PitchLanguage) -> String {
    const STEPS: [(Step, i32); 7] = [
        (Step::C, 0),
        (Step::D, 2),
        (Step::E, 4),
        (Step::F, 5),
        (Step::G, 7),
        (Step::A, 9),
        (Step::B, 11),
    ];
    let diatonic = transpose.diatonic + 7 * transpose.octave_change;
    let chromatic = transpose.chromatic + 12 * transpose.octave_change;
    let octaves = diatonic.div_euclid(7);
    let (step, natural) = STEPS[diatonic.rem_euclid(7) as usize];
    let alteration = Alteration::from_semitones((chromatic - natural - 12 * octaves) as f32)
        .unwrap_or(Alteration::Natural);
    let pitch = Pitch::new(step, alteration, (4 + octaves) as i8);
    pitch_token(&pitch, language)
}

/// Explicit bar line; repeat bar lines come from `\repeat volta`
pub fn barline_token(barline: &Barline) -> Option<String> {
    if barline.repeat.is_some() || barline.ending.is_some() {
        return None;
    }
    let glyph = match barline.style {
        BarlineStyle::Regular => return None,
        BarlineStyle::Dotted => ";",
        BarlineStyle::Dashed => "!",
        BarlineStyle::Heavy => ".",
        BarlineStyle::LightLight => "||",
        BarlineStyle::LightHeavy => "|.",
        BarlineStyle::HeavyLight => ".|",
        BarlineStyle::HeavyHeavy => "..",
        BarlineStyle::Tick => "'",
        BarlineStyle::Short => ",",
        BarlineStyle::None => "",
    };
    Some(format!("\\bar \"{}\"", glyph))
}

pub fn harmony_token(harmony: &Harmony, language: PitchLanguage) -> String {
    let root = pitch_name(harmony.root_step, harmony.root_alteration, language);
    let duration = duration_token(None, 0, harmony.duration);
    match harmony.kind.lilypond_suffix() {
        "" => format!("{}{}", root, duration),
        suffix => format!("{}{}:{}", root, duration, suffix),
    }
}

pub fn figured_bass_token(figured_bass: &FiguredBass) -> String {
    let figures = figured_bass
        .figures
        .iter()
        .map(|figure| {
            let number = figure.number.map_or("_".to_string(), |n| n.to_string());
            let alteration = figure
                .prefix
                .as_deref()
                .or(figure.suffix.as_deref())
                .map_or("", |a| match a {
                    "sharp" => "+",
                    "flat" => "-",
                    "natural" => "!",
                    "double-sharp" => "++",
                    "flat-flat" => "--",
                    _ => "",
                });
            format!("{}{}", number, alteration)
        })
        .collect::<Vec<_>>()
        .join(" ");
    format!("<{}>{}", figures, duration_token(None, 0, figured_bass.duration))
}

/// Escape special characters for LilyPond strings
pub fn escape_lilypond_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
