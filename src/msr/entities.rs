//! MSR tree entities
//!
//! ```text
//! Score
//! └── PartGroup (implicit outermost group, may nest further groups)
//!     └── Part
//!         └── Staff
//!             └── Voice
//!                 └── VoiceElement*   Measure | Repeat | RestMeasures
//!                     └── Measure
//!                         └── MeasureElement*   Note | Chord | Clef | Key | ...
//! ```
//!
//! Entities hold data and local invariants only. Everything that touches
//! more than one node lives in the builder.

use crate::msr::arena::{
    Arena, MeasureId, PartGroupId, PartId, RepeatId, RestMeasuresId, StaffId, VoiceId,
};
use crate::msr::context::ContextStates;
use crate::msr::duration::Duration;
use crate::msr::repeats::{OpenRepeat, PartRepeats};
use crate::msr::rest_measures::RestRun;
use crate::msr::types::{
    Barline, Clef, FiguredBass, Harmony, InputLine, Key, Note, NoteKind, RepeatEndingKind,
    StaffDetails, Time, Transpose, VoiceStaffChange,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Harmony voices are numbered `decorated regular voice + 20`, or the next
/// free number when that one is taken
pub const HARMONY_VOICE_NUMBER_OFFSET: u32 = 20;
/// Figured bass voices are numbered `decorated regular voice + 40`, or the
/// next free number when that one is taken
pub const FIGURED_BASS_VOICE_NUMBER_OFFSET: u32 = 40;

// ============================================================================
// SCORE AND IDENTIFICATION
// ============================================================================

/// Creator of the work (composer, lyricist, arranger, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Creator {
    pub kind: String,
    pub name: String,
}

/// Bibliographic data of the score
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Identification {
    pub work_title: Option<String>,
    pub work_number: Option<String>,
    pub movement_title: Option<String>,
    pub movement_number: Option<String>,
    pub creators: Vec<Creator>,
    pub rights: Vec<String>,
    pub software: Vec<String>,
    pub encoding_date: Option<String>,
}

impl Identification {
    /// Title to print: movement title first, work title otherwise
    pub fn title(&self) -> Option<&str> {
        self.movement_title
            .as_deref()
            .or(self.work_title.as_deref())
            .filter(|t| !t.trim().is_empty())
    }

    pub fn composer(&self) -> Option<&str> {
        self.creators
            .iter()
            .find(|c| c.kind == "composer")
            .map(|c| c.name.as_str())
    }
}

/// Root of the MSR tree, owning every entity through per-kind arenas
#[derive(Debug, Clone)]
pub struct Score {
    pub identification: Identification,
    /// Implicit outermost group containing every part and explicit group
    pub root_part_group: PartGroupId,
    pub part_groups: Arena<PartGroupId, PartGroup>,
    pub parts: Arena<PartId, Part>,
    pub staves: Arena<StaffId, Staff>,
    pub voices: Arena<VoiceId, Voice>,
    pub measures: Arena<MeasureId, Measure>,
    pub repeats: Arena<RepeatId, Repeat>,
    pub rest_measures: Arena<RestMeasuresId, RestMeasures>,
    pub(crate) parts_by_id: HashMap<String, PartId>,
}

impl Score {
    pub(crate) fn new() -> Self {
        let mut part_groups = Arena::new();
        let root_part_group = part_groups.alloc(PartGroup::implicit());
        Score {
            identification: Identification::default(),
            root_part_group,
            part_groups,
            parts: Arena::new(),
            staves: Arena::new(),
            voices: Arena::new(),
            measures: Arena::new(),
            repeats: Arena::new(),
            rest_measures: Arena::new(),
            parts_by_id: HashMap::new(),
        }
    }

    pub fn part_by_id(&self, id: &str) -> Option<PartId> {
        self.parts_by_id.get(id).copied()
    }

    /// Parts in part-list order (depth-first through the part groups)
    pub fn parts_in_order(&self) -> Vec<PartId> {
        let mut parts = Vec::new();
        self.collect_parts(self.root_part_group, &mut parts);
        parts
    }

    fn collect_parts(&self, group: PartGroupId, parts: &mut Vec<PartId>) {
        for element in &self.part_groups[group].elements {
            match element {
                PartGroupElement::Part(part) => parts.push(*part),
                PartGroupElement::PartGroup(nested) => self.collect_parts(*nested, parts),
            }
        }
    }

    /// Every voice of a part, staff by staff, in display order
    pub fn part_voices(&self, part: PartId) -> Vec<VoiceId> {
        self.parts[part]
            .staves
            .values()
            .flat_map(|staff| self.staves[*staff].all_voices.iter().copied())
            .collect()
    }

    /// Measures of a voice in playing-order of the written score, with rest
    /// runs either kept compressed (`None` entries skipped) or expanded
    pub fn voice_measures(&self, voice: VoiceId, expand_rest_measures: bool) -> Vec<MeasureId> {
        let mut measures = Vec::new();
        self.collect_measures(&self.voices[voice].elements, expand_rest_measures, &mut measures);
        measures
    }

    fn collect_measures(
        &self,
        elements: &[VoiceElement],
        expand_rest_measures: bool,
        measures: &mut Vec<MeasureId>,
    ) {
        for element in elements {
            match element {
                VoiceElement::Measure(measure) => measures.push(*measure),
                VoiceElement::Repeat(repeat) => {
                    let repeat = &self.repeats[*repeat];
                    self.collect_measures(&repeat.common, expand_rest_measures, measures);
                    for ending in &repeat.endings {
                        self.collect_measures(&ending.elements, expand_rest_measures, measures);
                    }
                }
                VoiceElement::RestMeasures(rest) => {
                    if expand_rest_measures {
                        measures.extend(self.rest_measures[*rest].measures.iter().copied());
                    }
                }
            }
        }
    }

    /// Written length of a voice (each measure counted once)
    ///
    /// Identical whether rest runs are compressed or expanded.
    pub fn voice_total_duration(&self, voice: VoiceId) -> Duration {
        self.elements_duration(&self.voices[voice].elements)
    }

    fn elements_duration(&self, elements: &[VoiceElement]) -> Duration {
        elements
            .iter()
            .map(|element| match element {
                VoiceElement::Measure(measure) => self.measures[*measure].length(),
                VoiceElement::Repeat(repeat) => {
                    let repeat = &self.repeats[*repeat];
                    self.elements_duration(&repeat.common)
                        + repeat
                            .endings
                            .iter()
                            .map(|e| self.elements_duration(&e.elements))
                            .sum::<Duration>()
                }
                VoiceElement::RestMeasures(rest) => self.rest_measures[*rest].total_duration(self),
            })
            .sum()
    }
}

// ============================================================================
// PART GROUPS AND PARTS
// ============================================================================

/// Bracket drawn at the left of a part group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PartGroupSymbol {
    None,
    Brace,
    Bracket,
    Line,
    Square,
}

impl PartGroupSymbol {
    pub fn from_musicxml(text: &str) -> Self {
        match text.trim() {
            "brace" => PartGroupSymbol::Brace,
            "bracket" => PartGroupSymbol::Bracket,
            "line" => PartGroupSymbol::Line,
            "square" => PartGroupSymbol::Square,
            _ => PartGroupSymbol::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PartGroupElement {
    Part(PartId),
    PartGroup(PartGroupId),
}

/// Bracketed or braced group of parts, possibly nested
#[derive(Debug, Clone, Serialize)]
pub struct PartGroup {
    pub input_line: InputLine,
    pub number: u32,
    pub symbol: PartGroupSymbol,
    /// Bar lines drawn through all staves of the group
    pub barline: bool,
    pub name: Option<String>,
    pub abbreviation: Option<String>,
    pub elements: Vec<PartGroupElement>,
    /// Enclosing group; `None` only for the implicit outermost group
    pub parent: Option<PartGroupId>,
    pub implicit: bool,
}

impl PartGroup {
    fn implicit() -> Self {
        PartGroup {
            input_line: 0,
            number: 0,
            symbol: PartGroupSymbol::None,
            barline: false,
            name: None,
            abbreviation: None,
            elements: Vec::new(),
            parent: None,
            implicit: true,
        }
    }

    pub(crate) fn new(
        input_line: InputLine,
        number: u32,
        symbol: PartGroupSymbol,
        parent: PartGroupId,
    ) -> Self {
        PartGroup {
            input_line,
            number,
            symbol,
            barline: true,
            name: None,
            abbreviation: None,
            elements: Vec::new(),
            parent: Some(parent),
            implicit: false,
        }
    }
}

/// Measure currently being filled across a part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentMeasure {
    pub input_line: InputLine,
    pub number: String,
    pub implicit: MeasureImplicitKind,
}

/// Instrument part
#[derive(Debug, Clone)]
pub struct Part {
    pub input_line: InputLine,
    pub id: String,
    pub name: Option<String>,
    pub abbreviation: Option<String>,
    /// Back-link to the owning group
    pub part_group: PartGroupId,
    pub staves: BTreeMap<u32, StaffId>,
    /// Current clef, key, time and transpose at part level
    pub contexts: ContextStates,
    /// Staff details that arrived before their staff existed
    pub pending_staff_details: Vec<StaffDetails>,
    pub current_measure: Option<CurrentMeasure>,
    /// Repeat events seen so far, as every voice of the part sees them
    pub repeats: PartRepeats,
}

impl Part {
    pub(crate) fn new(input_line: InputLine, id: &str, part_group: PartGroupId) -> Self {
        Part {
            input_line,
            id: id.to_string(),
            name: None,
            abbreviation: None,
            part_group,
            staves: BTreeMap::new(),
            contexts: ContextStates::default(),
            pending_staff_details: Vec::new(),
            current_measure: None,
            repeats: PartRepeats::default(),
        }
    }
}

// ============================================================================
// STAVES AND VOICES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StaffKind {
    Regular,
    Tablature,
    Percussion,
}

/// Staff of a part
///
/// Voice bookkeeping follows three views of the same voices: every voice by
/// raw number, regular voices by raw number, and the regular voices in
/// increasing raw number order, which defines their sequential numbers.
#[derive(Debug, Clone)]
pub struct Staff {
    pub input_line: InputLine,
    pub number: u32,
    pub kind: StaffKind,
    /// Back-link to the owning part
    pub part: PartId,
    pub details: Vec<StaffDetails>,
    pub contexts: ContextStates,
    pub voices_by_number: BTreeMap<u32, VoiceId>,
    pub regular_voices_by_number: BTreeMap<u32, VoiceId>,
    pub regular_voices: Vec<VoiceId>,
    /// Harmony and figured bass voices, keyed by what they decorate
    pub decorating_voices: BTreeMap<VoiceKind, VoiceId>,
    /// Every voice, harmony voices just above and figured bass voices just
    /// below the regular voice they decorate
    pub all_voices: Vec<VoiceId>,
}

impl Staff {
    pub(crate) fn new(input_line: InputLine, number: u32, kind: StaffKind, part: PartId) -> Self {
        Staff {
            input_line,
            number,
            kind,
            part,
            details: Vec::new(),
            contexts: ContextStates::default(),
            voices_by_number: BTreeMap::new(),
            regular_voices_by_number: BTreeMap::new(),
            regular_voices: Vec::new(),
            decorating_voices: BTreeMap::new(),
            all_voices: Vec::new(),
        }
    }

    pub fn regular_voice_count(&self) -> usize {
        self.regular_voices.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum VoiceKind {
    Regular,
    /// Chord symbols decorating the regular voice numbered `decorates`
    Harmony { decorates: u32 },
    /// Figured bass decorating the regular voice numbered `decorates`
    FiguredBass { decorates: u32 },
}

impl VoiceKind {
    pub fn is_regular(&self) -> bool {
        matches!(self, VoiceKind::Regular)
    }
}

/// Top-level content of a voice, a repeat section or a repeat ending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VoiceElement {
    Measure(MeasureId),
    Repeat(RepeatId),
    RestMeasures(RestMeasuresId),
}

/// Voice of a staff
#[derive(Debug, Clone)]
pub struct Voice {
    pub input_line: InputLine,
    pub number: u32,
    pub kind: VoiceKind,
    /// Back-link to the owning staff
    pub staff: StaffId,
    /// Rank among the staff's regular voices, 1-based
    pub sequential_number: Option<u32>,
    pub elements: Vec<VoiceElement>,
    pub contexts: ContextStates,
    /// Staff the voice currently prints on (differs from its own after a
    /// cross-staff change)
    pub current_staff_number: u32,
    /// Measure receiving appended elements
    pub last_measure: Option<MeasureId>,
    pub(crate) repeat_stack: Vec<OpenRepeat>,
    pub(crate) rest_run: RestRun,
}

impl Voice {
    pub(crate) fn new(
        input_line: InputLine,
        number: u32,
        kind: VoiceKind,
        staff: StaffId,
        staff_number: u32,
        contexts: ContextStates,
    ) -> Self {
        Voice {
            input_line,
            number,
            kind,
            staff,
            sequential_number: None,
            elements: Vec::new(),
            contexts,
            current_staff_number: staff_number,
            last_measure: None,
            repeat_stack: Vec::new(),
            rest_run: RestRun::Idle,
        }
    }

    /// Raw number of the regular voice this voice belongs to
    pub fn anchor_number(&self) -> u32 {
        match self.kind {
            VoiceKind::Regular => self.number,
            VoiceKind::Harmony { decorates } | VoiceKind::FiguredBass { decorates } => decorates,
        }
    }

    pub fn repeat_depth(&self) -> usize {
        self.repeat_stack.len()
    }
}

// ============================================================================
// MEASURES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MeasureImplicitKind {
    Explicit,
    /// Pickup or split measure, exempt from full-length checks
    Implicit,
}

/// Notes sounding together
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chord {
    pub input_line: InputLine,
    pub notes: Vec<Note>,
}

impl Chord {
    pub fn sounding(&self) -> Duration {
        self.notes.first().map_or(Duration::zero(), |n| n.sounding)
    }

    pub fn displayed(&self) -> Duration {
        self.notes.first().map_or(Duration::zero(), |n| n.displayed)
    }
}

/// Content of a measure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MeasureElement {
    Note(Note),
    Chord(Chord),
    Clef(Clef),
    Key(Key),
    Time(Time),
    Transpose(Transpose),
    Barline(Barline),
    StaffDetails(StaffDetails),
    VoiceStaffChange(VoiceStaffChange),
    Harmony(Harmony),
    FiguredBass(FiguredBass),
}

impl MeasureElement {
    /// Time the element advances its measure by
    pub fn measure_advance(&self) -> Duration {
        match self {
            MeasureElement::Note(note) if note.occupies_time() => note.sounding,
            MeasureElement::Chord(chord) => chord.sounding(),
            MeasureElement::Harmony(harmony) => harmony.duration,
            MeasureElement::FiguredBass(figured_bass) => figured_bass.duration,
            _ => Duration::zero(),
        }
    }

    /// Whether the element carries music (as opposed to rests, skips and
    /// attributes)
    pub fn is_music(&self) -> bool {
        match self {
            MeasureElement::Note(note) => !note.is_rest_or_skip(),
            MeasureElement::Chord(_) | MeasureElement::Harmony(_) | MeasureElement::FiguredBass(_) => true,
            _ => false,
        }
    }
}

/// Measure of a voice
#[derive(Debug, Clone, Serialize)]
pub struct Measure {
    pub input_line: InputLine,
    /// Measure numbers are strings: sources use "0", "12a", "X1", ...
    pub number: String,
    pub implicit: MeasureImplicitKind,
    /// Back-link to the owning voice
    pub voice: VoiceId,
    pub elements: Vec<MeasureElement>,
    /// Accumulated length of the elements appended so far
    pub position: Duration,
    /// Length of a full measure under the time signature in force
    pub full_length: Option<Duration>,
    pub closed: bool,
}

impl Measure {
    pub(crate) fn new(
        input_line: InputLine,
        number: &str,
        implicit: MeasureImplicitKind,
        voice: VoiceId,
        full_length: Option<Duration>,
    ) -> Self {
        Measure {
            input_line,
            number: number.to_string(),
            implicit,
            voice,
            elements: Vec::new(),
            position: Duration::zero(),
            full_length,
            closed: false,
        }
    }

    /// Written length: what the elements fill, or the full length for a
    /// measure holding only a whole-measure rest
    pub fn length(&self) -> Duration {
        match self.full_length {
            Some(full_length) if self.holds_only_whole_measure_rest() => full_length,
            _ => self.position,
        }
    }

    /// Whole-measure rests are written with a duration that need not match
    /// the time signature
    fn holds_only_whole_measure_rest(&self) -> bool {
        let mut notes = self.notes().peekable();
        notes.peek().is_some() && notes.all(|note| note.whole_measure_rest)
    }

    /// No notes, chords, harmonies or figures, only rests and attributes
    pub fn is_empty_of_music(&self) -> bool {
        !self.elements.iter().any(MeasureElement::is_music)
    }

    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.elements.iter().flat_map(|element| match element {
            MeasureElement::Note(note) => std::slice::from_ref(note).iter(),
            MeasureElement::Chord(chord) => chord.notes.iter(),
            _ => [].iter(),
        })
    }

    pub fn count_notes_of_kind(&self, kind: NoteKind) -> usize {
        self.notes().filter(|n| n.kind == kind).count()
    }

    /// Whether the appended elements fill less than a full measure
    pub fn is_incomplete(&self) -> bool {
        self.implicit == MeasureImplicitKind::Explicit
            && self.full_length.is_some_and(|full| self.position < full)
    }
}

// ============================================================================
// REPEATS AND REST RUNS
// ============================================================================

/// Alternative ending of a repeat
#[derive(Debug, Clone, Serialize)]
pub struct RepeatEnding {
    pub input_line: InputLine,
    /// Numbering as printed, e.g. "1, 2"
    pub numbering: String,
    pub numbers: Vec<u32>,
    /// `None` while the ending is still open
    pub kind: Option<RepeatEndingKind>,
    pub elements: Vec<VoiceElement>,
}

impl RepeatEnding {
    pub(crate) fn new(input_line: InputLine, numbering: &str) -> Self {
        RepeatEnding {
            input_line,
            numbering: numbering.trim().to_string(),
            numbers: parse_ending_numbers(numbering),
            kind: None,
            elements: Vec::new(),
        }
    }
}

/// Parse "1, 2" or "1 2" into ending numbers
pub fn parse_ending_numbers(numbering: &str) -> Vec<u32> {
    numbering
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter_map(|n| n.trim().parse().ok())
        .collect()
}

/// Repeated section with optional alternative endings
#[derive(Debug, Clone, Serialize)]
pub struct Repeat {
    pub input_line: InputLine,
    /// Section played on every pass
    pub common: Vec<VoiceElement>,
    pub endings: Vec<RepeatEnding>,
    /// Times the section is played
    pub times: u32,
    pub end_measure_number: Option<String>,
    pub closed: bool,
}

impl Repeat {
    pub(crate) fn new(input_line: InputLine) -> Self {
        Repeat {
            input_line,
            common: Vec::new(),
            endings: Vec::new(),
            times: 2,
            end_measure_number: None,
            closed: false,
        }
    }
}

/// Run of empty measures printed as a single multi-measure rest
///
/// The measures themselves are kept for expansion.
#[derive(Debug, Clone, Serialize)]
pub struct RestMeasures {
    pub input_line: InputLine,
    pub first_measure_number: String,
    pub measures: Vec<MeasureId>,
    /// Print with slashes or symbols instead of an H-bar
    pub slashes: bool,
    /// Length of one measure of the run
    pub measure_length: Duration,
}

impl RestMeasures {
    pub fn count(&self) -> usize {
        self.measures.len()
    }

    pub fn total_duration(&self, score: &Score) -> Duration {
        self.measures.iter().map(|m| score.measures[*m].length()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msr::types::{Pitch, Step};

    #[test]
    fn test_parse_ending_numbers() {
        assert_eq!(parse_ending_numbers("1, 2"), vec![1, 2]);
        assert_eq!(parse_ending_numbers("3"), vec![3]);
        assert_eq!(parse_ending_numbers(""), Vec::<u32>::new());
    }

    #[test]
    fn test_measure_element_advance() {
        let quarter = Duration::new(1, 4);
        let note = MeasureElement::Note(Note::regular(1, Pitch::natural(Step::C, 4), quarter));
        assert_eq!(note.measure_advance(), quarter);
        assert!(note.is_music());

        let rest = MeasureElement::Note(Note::rest(1, quarter));
        assert_eq!(rest.measure_advance(), quarter);
        assert!(!rest.is_music());

        assert_eq!(MeasureElement::Clef(Clef::bass()).measure_advance(), Duration::zero());
    }

    #[test]
    fn test_identification_title_prefers_movement() {
        let identification = Identification {
            work_title: Some("Work".to_string()),
            movement_title: Some("Movement".to_string()),
            creators: vec![Creator {
                kind: "composer".to_string(),
                name: "Someone".to_string(),
            }],
            ..Default::default()
        };
        assert_eq!(identification.title(), Some("Movement"));
        assert_eq!(identification.composer(), Some("Someone"));
    }
}
