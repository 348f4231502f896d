//! Value types carried by MSR entities
//!
//! These are plain data with structural equality. Two clefs (keys, times,
//! transposes) are "the same" when they print the same, which is what the
//! redundancy policy of the context propagation engine compares.

use crate::msr::duration::{Duration, NoteType, TupletFactor};
use serde::Serialize;
use std::fmt;

/// Line number in the source document, used for diagnostics
pub type InputLine = u32;

// ============================================================================
// PITCH
// ============================================================================

/// Diatonic step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Step {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Step {
    pub fn from_musicxml(text: &str) -> Option<Self> {
        match text.trim() {
            "C" => Some(Step::C),
            "D" => Some(Step::D),
            "E" => Some(Step::E),
            "F" => Some(Step::F),
            "G" => Some(Step::G),
            "A" => Some(Step::A),
            "B" => Some(Step::B),
            _ => None,
        }
    }

    pub fn lowercase(&self) -> &'static str {
        match self {
            Step::C => "c",
            Step::D => "d",
            Step::E => "e",
            Step::F => "f",
            Step::G => "g",
            Step::A => "a",
            Step::B => "b",
        }
    }
}

/// Chromatic alteration, in quarter-tone resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Alteration {
    DoubleFlat,
    ThreeQuarterFlat,
    Flat,
    QuarterFlat,
    Natural,
    QuarterSharp,
    Sharp,
    ThreeQuarterSharp,
    DoubleSharp,
}

impl Alteration {
    /// Map a MusicXML `<alter>` value (semitones, may be fractional)
    pub fn from_semitones(alter: f32) -> Option<Self> {
        let quarter_tones = (alter * 2.0).round() as i32;
        let alteration = match quarter_tones {
            -4 => Alteration::DoubleFlat,
            -3 => Alteration::ThreeQuarterFlat,
            -2 => Alteration::Flat,
            -1 => Alteration::QuarterFlat,
            0 => Alteration::Natural,
            1 => Alteration::QuarterSharp,
            2 => Alteration::Sharp,
            3 => Alteration::ThreeQuarterSharp,
            4 => Alteration::DoubleSharp,
            _ => return None,
        };
        Some(alteration)
    }
}

/// Musical pitch; octave 4 holds middle C
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Pitch {
    pub step: Step,
    pub alteration: Alteration,
    pub octave: i8,
}

impl Pitch {
    pub fn new(step: Step, alteration: Alteration, octave: i8) -> Self {
        Pitch {
            step,
            alteration,
            octave,
        }
    }

    pub fn natural(step: Step, octave: i8) -> Self {
        Pitch::new(step, Alteration::Natural, octave)
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let accidental = match self.alteration {
            Alteration::DoubleFlat => "bb",
            Alteration::ThreeQuarterFlat => "b-",
            Alteration::Flat => "b",
            Alteration::QuarterFlat => "-",
            Alteration::Natural => "",
            Alteration::QuarterSharp => "+",
            Alteration::Sharp => "#",
            Alteration::ThreeQuarterSharp => "#+",
            Alteration::DoubleSharp => "##",
        };
        write!(f, "{:?}{}{}", self.step, accidental, self.octave)
    }
}

// ============================================================================
// CLEF, KEY, TIME, TRANSPOSE
// ============================================================================

/// Clef sign (MusicXML `<sign>`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ClefSign {
    G,
    F,
    C,
    Percussion,
    Tab,
    None,
}

impl ClefSign {
    pub fn from_musicxml(text: &str) -> Option<Self> {
        match text.trim() {
            "G" => Some(ClefSign::G),
            "F" => Some(ClefSign::F),
            "C" => Some(ClefSign::C),
            "percussion" => Some(ClefSign::Percussion),
            "TAB" => Some(ClefSign::Tab),
            "none" => Some(ClefSign::None),
            _ => None,
        }
    }
}

/// Clef
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Clef {
    pub sign: ClefSign,
    /// Staff line the sign sits on, counted from the bottom
    pub line: u8,
    /// Octave transposition (-1 for "treble_8")
    pub octave_change: i8,
}

impl Clef {
    pub fn new(sign: ClefSign, line: u8, octave_change: i8) -> Self {
        Clef {
            sign,
            line,
            octave_change,
        }
    }

    pub fn treble() -> Self {
        Clef::new(ClefSign::G, 2, 0)
    }

    pub fn bass() -> Self {
        Clef::new(ClefSign::F, 4, 0)
    }

    pub fn alto() -> Self {
        Clef::new(ClefSign::C, 3, 0)
    }

    pub fn tenor() -> Self {
        Clef::new(ClefSign::C, 4, 0)
    }

    pub fn percussion() -> Self {
        Clef::new(ClefSign::Percussion, 3, 0)
    }

    pub fn tab() -> Self {
        Clef::new(ClefSign::Tab, 5, 0)
    }

    /// Conventional name, as LilyPond spells it
    pub fn name(&self) -> String {
        let base = match (self.sign, self.line) {
            (ClefSign::G, 1) => "french",
            (ClefSign::G, _) => "treble",
            (ClefSign::F, 3) => "varbaritone",
            (ClefSign::F, 5) => "subbass",
            (ClefSign::F, _) => "bass",
            (ClefSign::C, 1) => "soprano",
            (ClefSign::C, 2) => "mezzosoprano",
            (ClefSign::C, 4) => "tenor",
            (ClefSign::C, 5) => "baritone",
            (ClefSign::C, _) => "alto",
            (ClefSign::Percussion, _) => "percussion",
            (ClefSign::Tab, _) => "tab",
            (ClefSign::None, _) => "none",
        };
        match self.octave_change {
            0 => base.to_string(),
            -1 => format!("{}_8", base),
            1 => format!("{}^8", base),
            -2 => format!("{}_15", base),
            2 => format!("{}^15", base),
            _ => base.to_string(),
        }
    }
}

/// Key mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum KeyMode {
    Major,
    Minor,
    Ionian,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Aeolian,
    Locrian,
}

impl KeyMode {
    pub fn from_musicxml(text: &str) -> Option<Self> {
        match text.trim() {
            "major" => Some(KeyMode::Major),
            "minor" => Some(KeyMode::Minor),
            "ionian" => Some(KeyMode::Ionian),
            "dorian" => Some(KeyMode::Dorian),
            "phrygian" => Some(KeyMode::Phrygian),
            "lydian" => Some(KeyMode::Lydian),
            "mixolydian" => Some(KeyMode::Mixolydian),
            "aeolian" => Some(KeyMode::Aeolian),
            "locrian" => Some(KeyMode::Locrian),
            _ => None,
        }
    }

    pub fn lilypond_name(&self) -> &'static str {
        match self {
            KeyMode::Major => "major",
            KeyMode::Minor => "minor",
            KeyMode::Ionian => "ionian",
            KeyMode::Dorian => "dorian",
            KeyMode::Phrygian => "phrygian",
            KeyMode::Lydian => "lydian",
            KeyMode::Mixolydian => "mixolydian",
            KeyMode::Aeolian => "aeolian",
            KeyMode::Locrian => "locrian",
        }
    }
}

/// Traditional key signature, placed on the circle of fifths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Key {
    /// -7 (seven flats) to +7 (seven sharps)
    pub fifths: i8,
    pub mode: KeyMode,
}

impl Key {
    pub fn new(fifths: i8, mode: KeyMode) -> Self {
        Key { fifths, mode }
    }

    /// Tonic pitch of the key (the octave is irrelevant)
    pub fn tonic(&self) -> Pitch {
        // Major tonics around the circle of fifths, from 7 flats to 7 sharps
        const MAJOR: [(Step, Alteration); 15] = [
            (Step::C, Alteration::Flat),
            (Step::G, Alteration::Flat),
            (Step::D, Alteration::Flat),
            (Step::A, Alteration::Flat),
            (Step::E, Alteration::Flat),
            (Step::B, Alteration::Flat),
            (Step::F, Alteration::Natural),
            (Step::C, Alteration::Natural),
            (Step::G, Alteration::Natural),
            (Step::D, Alteration::Natural),
            (Step::A, Alteration::Natural),
            (Step::E, Alteration::Natural),
            (Step::B, Alteration::Natural),
            (Step::F, Alteration::Sharp),
            (Step::C, Alteration::Sharp),
        ];
        // Minor keys sit three fifths further on
        let offset = match self.mode {
            KeyMode::Minor | KeyMode::Aeolian => 3,
            KeyMode::Dorian => 2,
            KeyMode::Phrygian => 4,
            KeyMode::Lydian => -1,
            KeyMode::Mixolydian => 1,
            KeyMode::Locrian => 5,
            KeyMode::Major | KeyMode::Ionian => 0,
        };
        let index = (i32::from(self.fifths) + 7 + offset).clamp(0, 14) as usize;
        let (step, alteration) = MAJOR[index];
        Pitch::new(step, alteration, 4)
    }
}

/// Time signature symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TimeSymbol {
    Numeric,
    Common,
    Cut,
    SenzaMisura,
}

/// Time signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Time {
    pub beats: u32,
    pub beat_type: u32,
    pub symbol: TimeSymbol,
}

impl Time {
    pub fn new(beats: u32, beat_type: u32) -> Self {
        Time {
            beats,
            beat_type,
            symbol: TimeSymbol::Numeric,
        }
    }

    pub fn with_symbol(mut self, symbol: TimeSymbol) -> Self {
        self.symbol = symbol;
        self
    }

    /// Length of one full measure, `None` for senza misura or a zero beat type
    pub fn measure_length(&self) -> Option<Duration> {
        if self.symbol == TimeSymbol::SenzaMisura {
            return None;
        }
        Duration::try_new(i64::from(self.beats), i64::from(self.beat_type))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.beats, self.beat_type)
    }
}

/// Transposition of a transposing instrument, written minus sounding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Transpose {
    pub diatonic: i32,
    pub chromatic: i32,
    pub octave_change: i32,
}

impl Transpose {
    pub fn new(diatonic: i32, chromatic: i32, octave_change: i32) -> Self {
        Transpose {
            diatonic,
            chromatic,
            octave_change,
        }
    }
}

// ============================================================================
// BARLINES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BarlineLocation {
    Left,
    Middle,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BarlineStyle {
    Regular,
    Dotted,
    Dashed,
    Heavy,
    LightLight,
    LightHeavy,
    HeavyLight,
    HeavyHeavy,
    Tick,
    Short,
    None,
}

impl BarlineStyle {
    pub fn from_musicxml(text: &str) -> Option<Self> {
        match text.trim() {
            "regular" => Some(BarlineStyle::Regular),
            "dotted" => Some(BarlineStyle::Dotted),
            "dashed" => Some(BarlineStyle::Dashed),
            "heavy" => Some(BarlineStyle::Heavy),
            "light-light" => Some(BarlineStyle::LightLight),
            "light-heavy" => Some(BarlineStyle::LightHeavy),
            "heavy-light" => Some(BarlineStyle::HeavyLight),
            "heavy-heavy" => Some(BarlineStyle::HeavyHeavy),
            "tick" => Some(BarlineStyle::Tick),
            "short" => Some(BarlineStyle::Short),
            "none" => Some(BarlineStyle::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RepeatDirection {
    Forward,
    Backward,
}

/// How a repeat ending bracket is closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RepeatEndingKind {
    /// Closed with a downward hook (MusicXML `stop`)
    Hooked,
    /// Left open (MusicXML `discontinue`)
    Hookless,
}

/// Ending bracket event carried by a barline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EndingEvent {
    Start { numbering: String },
    Stop { numbering: String, kind: RepeatEndingKind },
}

/// Barline, possibly carrying repeat and ending information
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Barline {
    pub location: BarlineLocation,
    pub style: BarlineStyle,
    pub repeat: Option<RepeatDirection>,
    /// Play count of a backward repeat
    pub times: Option<u32>,
    pub ending: Option<EndingEvent>,
}

impl Barline {
    pub fn new(location: BarlineLocation, style: BarlineStyle) -> Self {
        Barline {
            location,
            style,
            repeat: None,
            times: None,
            ending: None,
        }
    }

    pub fn final_bar() -> Self {
        Barline::new(BarlineLocation::Right, BarlineStyle::LightHeavy)
    }
}

// ============================================================================
// STAFF DETAILS, STAFF CHANGES, HARMONIES, FIGURED BASS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StaffType {
    Regular,
    Ossia,
    Cue,
    Editorial,
    Alternate,
}

/// Staff presentation details (MusicXML `<staff-details>`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaffDetails {
    /// Staff the details apply to; `None` applies to every staff of the part
    pub staff_number: Option<u32>,
    pub staff_lines: Option<u8>,
    pub staff_type: StaffType,
}

impl StaffDetails {
    pub fn new(staff_number: Option<u32>, staff_lines: Option<u8>) -> Self {
        StaffDetails {
            staff_number,
            staff_lines,
            staff_type: StaffType::Regular,
        }
    }
}

/// A voice continuing on another staff of its part (cross-staff notation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoiceStaffChange {
    pub from_staff: u32,
    pub to_staff: u32,
}

/// Chord symbol kind (subset of MusicXML `<kind>` values)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HarmonyKind {
    Major,
    Minor,
    Augmented,
    Diminished,
    Dominant,
    MajorSeventh,
    MinorSeventh,
    DiminishedSeventh,
    HalfDiminished,
    Suspended4,
    Power,
    Other,
}

impl HarmonyKind {
    pub fn from_musicxml(text: &str) -> Self {
        match text.trim() {
            "major" => HarmonyKind::Major,
            "minor" => HarmonyKind::Minor,
            "augmented" => HarmonyKind::Augmented,
            "diminished" => HarmonyKind::Diminished,
            "dominant" => HarmonyKind::Dominant,
            "major-seventh" => HarmonyKind::MajorSeventh,
            "minor-seventh" => HarmonyKind::MinorSeventh,
            "diminished-seventh" => HarmonyKind::DiminishedSeventh,
            "half-diminished" => HarmonyKind::HalfDiminished,
            "suspended-fourth" => HarmonyKind::Suspended4,
            "power" => HarmonyKind::Power,
            _ => HarmonyKind::Other,
        }
    }

    pub fn lilypond_suffix(&self) -> &'static str {
        match self {
            HarmonyKind::Major | HarmonyKind::Other => "",
            HarmonyKind::Minor => "m",
            HarmonyKind::Augmented => "aug",
            HarmonyKind::Diminished => "dim",
            HarmonyKind::Dominant => "7",
            HarmonyKind::MajorSeventh => "maj7",
            HarmonyKind::MinorSeventh => "m7",
            HarmonyKind::DiminishedSeventh => "dim7",
            HarmonyKind::HalfDiminished => "m7.5-",
            HarmonyKind::Suspended4 => "sus4",
            HarmonyKind::Power => "5",
        }
    }
}

/// Chord symbol, living in a harmony voice
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Harmony {
    pub root_step: Step,
    pub root_alteration: Alteration,
    pub kind: HarmonyKind,
    /// Time the symbol lasts, set from the note it is attached to
    pub duration: Duration,
}

/// One figure of a figured bass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Figure {
    pub number: Option<u8>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

/// Figured bass, living in a figured bass voice
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiguredBass {
    pub figures: Vec<Figure>,
    pub duration: Duration,
}

// ============================================================================
// NOTES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoteKind {
    Regular,
    Rest,
    /// Invisible filler keeping a measure's length consistent
    Skip,
    Grace,
    Cue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tie {
    Start,
    Stop,
    Continue,
}

/// Note, rest, skip, grace or cue note
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    pub kind: NoteKind,
    pub input_line: InputLine,
    /// Absent for rests and skips
    pub pitch: Option<Pitch>,
    /// Length implied by the printed note value
    pub displayed: Duration,
    /// Time the note occupies in its measure
    pub sounding: Duration,
    pub note_type: Option<NoteType>,
    pub dots: u8,
    pub tuplet: Option<TupletFactor>,
    pub tie: Option<Tie>,
    /// Staff the note is printed on, when the source says so
    pub staff_number: Option<u32>,
    /// Rest filling a whole measure regardless of its printed value
    pub whole_measure_rest: bool,
}

impl Note {
    /// Pitched note with matching displayed and sounding durations
    pub fn regular(input_line: InputLine, pitch: Pitch, duration: Duration) -> Self {
        let (note_type, dots) = NoteType::for_duration(duration).map_or((None, 0), |(t, d)| (Some(t), d));
        Note {
            kind: NoteKind::Regular,
            input_line,
            pitch: Some(pitch),
            displayed: duration,
            sounding: duration,
            note_type,
            dots,
            tuplet: None,
            tie: None,
            staff_number: None,
            whole_measure_rest: false,
        }
    }

    pub fn rest(input_line: InputLine, duration: Duration) -> Self {
        Note {
            kind: NoteKind::Rest,
            pitch: None,
            ..Note::regular(input_line, Pitch::natural(Step::C, 4), duration)
        }
    }

    /// Skip note used to pad a measure
    pub fn skip(input_line: InputLine, duration: Duration) -> Self {
        Note {
            kind: NoteKind::Skip,
            pitch: None,
            ..Note::regular(input_line, Pitch::natural(Step::C, 4), duration)
        }
    }

    /// Grace note: printed with a value but taking no time in the measure
    pub fn grace(input_line: InputLine, pitch: Pitch, note_type: NoteType) -> Self {
        Note {
            kind: NoteKind::Grace,
            sounding: Duration::zero(),
            displayed: Duration::from_note_type(note_type, 0),
            note_type: Some(note_type),
            dots: 0,
            ..Note::regular(input_line, pitch, Duration::zero())
        }
    }

    /// Whether this note advances the measure position
    pub fn occupies_time(&self) -> bool {
        self.kind != NoteKind::Grace && !self.sounding.is_zero()
    }

    pub fn is_rest_or_skip(&self) -> bool {
        matches!(self.kind, NoteKind::Rest | NoteKind::Skip)
    }
}
