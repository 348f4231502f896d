//! XML parsing layer for MusicXML documents
//!
//! Wraps roxmltree for reading MusicXML `score-partwise` documents and
//! turns the small leaf elements (pitches, clefs, keys, times, barlines)
//! into MSR value types. Everything that needs builder state lives in the
//! translator.

use crate::converters::musicxml::musicxml_to_msr::errors::ParseError;
use crate::msr::{
    Alteration, Barline, BarlineLocation, BarlineStyle, Clef, ClefSign, Creator, EndingEvent,
    Figure, HarmonyKind, Identification, InputLine, Key, KeyMode, Pitch, RepeatDirection,
    RepeatEndingKind, StaffDetails, StaffType, Step, Time, TimeSymbol, Transpose,
};
use roxmltree::{Document, Node, ParsingOptions};
use std::str::FromStr;

// ============================================================================
// XML DOCUMENT WRAPPER
// ============================================================================

/// Wrapper around roxmltree::Document for MusicXML parsing
pub struct XmlDocument<'input> {
    doc: Document<'input>,
}

impl<'input> XmlDocument<'input> {
    /// Parse XML string into XmlDocument
    ///
    /// MusicXML files usually carry a DOCTYPE pointing at the MusicXML DTD.
    /// roxmltree rejects DTDs unless told otherwise; external DTDs are never
    /// fetched.
    pub fn parse(xml: &'input str) -> Result<Self, ParseError> {
        let options = ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        };
        let doc = Document::parse_with_options(xml, options)
            .map_err(|e| ParseError::InvalidXml(format!("XML parse error: {}", e)))?;
        Ok(XmlDocument { doc })
    }

    /// Get the root score-partwise element
    pub fn score_partwise(&self) -> Result<Node<'_, 'input>, ParseError> {
        let root = self.doc.root_element();

        if root.tag_name().name() != "score-partwise" {
            return Err(ParseError::UnsupportedFormat(format!(
                "Expected score-partwise, found {}",
                root.tag_name().name()
            )));
        }

        Ok(root)
    }

    /// 1-based line of the node's start tag
    pub fn line_of(&self, node: Node) -> InputLine {
        self.doc.text_pos_at(node.range().start).row
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Get first child element with given tag name
pub fn get_child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == tag)
}

/// All child elements with given tag name, in document order
pub fn children_named<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    tag: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == tag)
}

pub fn has_child(node: Node, tag: &str) -> bool {
    get_child(node, tag).is_some()
}

/// Trimmed text content of first child with given tag
pub fn get_child_text(node: Node, tag: &str) -> Option<String> {
    get_child(node, tag)
        .and_then(|n| n.text())
        .map(|s| s.trim().to_string())
}

/// Parse the text of first child with given tag
pub fn parse_child<T: FromStr>(node: Node, tag: &str) -> Option<T> {
    get_child_text(node, tag).and_then(|s| s.parse().ok())
}

/// Parse an attribute value
pub fn parse_attribute<T: FromStr>(node: Node, name: &str) -> Option<T> {
    node.attribute(name).and_then(|s| s.trim().parse().ok())
}

/// MusicXML yes-no attribute
pub fn yes_no_attribute(node: Node, name: &str) -> Option<bool> {
    match node.attribute(name).map(str::trim) {
        Some("yes") => Some(true),
        Some("no") => Some(false),
        _ => None,
    }
}

// ============================================================================
// IDENTIFICATION
// ============================================================================

/// Collect work, movement and identification data of the score
pub fn extract_identification(score: Node) -> Identification {
    let mut identification = Identification::default();

    if let Some(work) = get_child(score, "work") {
        identification.work_title = get_child_text(work, "work-title");
        identification.work_number = get_child_text(work, "work-number");
    }
    identification.movement_title = get_child_text(score, "movement-title");
    identification.movement_number = get_child_text(score, "movement-number");

    if let Some(id) = get_child(score, "identification") {
        identification.creators = children_named(id, "creator")
            .filter_map(|creator| {
                let name = creator.text()?.trim();
                if name.is_empty() {
                    return None;
                }
                Some(Creator {
                    kind: creator.attribute("type").unwrap_or("composer").to_string(),
                    name: name.to_string(),
                })
            })
            .collect();
        identification.rights = children_named(id, "rights")
            .filter_map(|r| r.text())
            .map(|r| r.trim().to_string())
            .collect();
        if let Some(encoding) = get_child(id, "encoding") {
            identification.software = children_named(encoding, "software")
                .filter_map(|s| s.text())
                .map(|s| s.trim().to_string())
                .collect();
            identification.encoding_date = get_child_text(encoding, "encoding-date");
        }
    }

    identification
}

// ============================================================================
// PITCH
// ============================================================================

/// Parse a MusicXML <pitch> element
pub fn parse_pitch(pitch_node: Node) -> Result<Pitch, ParseError> {
    let step_str = get_child_text(pitch_node, "step").ok_or_else(|| {
        ParseError::MissingRequiredElement("pitch missing step element".to_string())
    })?;
    let step = Step::from_musicxml(&step_str)
        .ok_or_else(|| ParseError::InvalidValue(format!("Invalid step: {}", step_str)))?;

    let octave_str = get_child_text(pitch_node, "octave").ok_or_else(|| {
        ParseError::MissingRequiredElement("pitch missing octave element".to_string())
    })?;
    let octave: i8 = octave_str
        .parse()
        .map_err(|_| ParseError::InvalidValue(format!("Invalid octave: {}", octave_str)))?;

    // Microtonal values like -0.5 (quarter-flat) are allowed
    let alter: f32 = parse_child(pitch_node, "alter").unwrap_or(0.0);
    let alteration = Alteration::from_semitones(alter)
        .ok_or_else(|| ParseError::InvalidValue(format!("Unsupported alteration: {}", alter)))?;

    Ok(Pitch::new(step, alteration, octave))
}

// ============================================================================
// ATTRIBUTE PARSING HELPERS
// ============================================================================

/// Parse a <clef> element, `None` for an unknown sign
pub fn parse_clef(clef_node: Node) -> Option<Clef> {
    let sign = ClefSign::from_musicxml(&get_child_text(clef_node, "sign")?)?;
    let default_line = match sign {
        ClefSign::G => 2,
        ClefSign::F => 4,
        ClefSign::Tab => 5,
        ClefSign::C | ClefSign::Percussion | ClefSign::None => 3,
    };
    let line = parse_child(clef_node, "line").unwrap_or(default_line);
    let octave_change = parse_child(clef_node, "clef-octave-change").unwrap_or(0);
    Some(Clef::new(sign, line, octave_change))
}

/// Parse a traditional <key>; non-traditional keys have no fifths
pub fn parse_key(key_node: Node) -> Option<Key> {
    let fifths = parse_child(key_node, "fifths")?;
    let mode = get_child_text(key_node, "mode")
        .and_then(|m| KeyMode::from_musicxml(&m))
        .unwrap_or(KeyMode::Major);
    Some(Key::new(fifths, mode))
}

/// Parse a <time>; composite beats like "3+2" are summed
pub fn parse_time(time_node: Node) -> Option<Time> {
    if has_child(time_node, "senza-misura") {
        return Some(Time::new(0, 1).with_symbol(TimeSymbol::SenzaMisura));
    }

    let beats = get_child_text(time_node, "beats")?
        .split('+')
        .try_fold(0u32, |total, b| total.checked_add(b.trim().parse::<u32>().ok()?))?;
    let beat_type = parse_child(time_node, "beat-type")?;

    let symbol = match time_node.attribute("symbol") {
        Some("common") => TimeSymbol::Common,
        Some("cut") => TimeSymbol::Cut,
        _ => TimeSymbol::Numeric,
    };
    Some(Time::new(beats, beat_type).with_symbol(symbol))
}

pub fn parse_transpose(transpose_node: Node) -> Transpose {
    Transpose::new(
        parse_child(transpose_node, "diatonic").unwrap_or(0),
        parse_child(transpose_node, "chromatic").unwrap_or(0),
        parse_child(transpose_node, "octave-change").unwrap_or(0),
    )
}

pub fn parse_staff_details(details_node: Node) -> StaffDetails {
    let mut details = StaffDetails::new(
        parse_attribute(details_node, "number"),
        parse_child(details_node, "staff-lines"),
    );
    details.staff_type = match get_child_text(details_node, "staff-type").as_deref() {
        Some("ossia") => StaffType::Ossia,
        Some("cue") => StaffType::Cue,
        Some("editorial") => StaffType::Editorial,
        Some("alternate") => StaffType::Alternate,
        _ => StaffType::Regular,
    };
    details
}

// ============================================================================
// BARLINES, HARMONIES, FIGURED BASS
// ============================================================================

/// Parse a <barline> with its optional <repeat> and <ending>
pub fn parse_barline(barline_node: Node) -> Barline {
    let location = match barline_node.attribute("location") {
        Some("left") => BarlineLocation::Left,
        Some("middle") => BarlineLocation::Middle,
        _ => BarlineLocation::Right,
    };
    let style = get_child_text(barline_node, "bar-style")
        .and_then(|s| BarlineStyle::from_musicxml(&s))
        .unwrap_or(BarlineStyle::Regular);
    let mut barline = Barline::new(location, style);

    if let Some(repeat) = get_child(barline_node, "repeat") {
        barline.repeat = match repeat.attribute("direction") {
            Some("forward") => Some(RepeatDirection::Forward),
            Some("backward") => Some(RepeatDirection::Backward),
            _ => None,
        };
        barline.times = parse_attribute(repeat, "times");
    }

    if let Some(ending) = get_child(barline_node, "ending") {
        let numbering = ending.attribute("number").unwrap_or("").trim().to_string();
        barline.ending = match ending.attribute("type") {
            Some("start") => Some(EndingEvent::Start { numbering }),
            Some("stop") => Some(EndingEvent::Stop {
                numbering,
                kind: RepeatEndingKind::Hooked,
            }),
            Some("discontinue") => Some(EndingEvent::Stop {
                numbering,
                kind: RepeatEndingKind::Hookless,
            }),
            _ => None,
        };
    }

    barline
}

/// Root and kind of a <harmony>, `None` when it has no root
pub fn parse_harmony_root(harmony_node: Node) -> Option<(Step, Alteration, HarmonyKind)> {
    let root = get_child(harmony_node, "root")?;
    let step = Step::from_musicxml(&get_child_text(root, "root-step")?)?;
    let alteration = parse_child::<f32>(root, "root-alter")
        .and_then(Alteration::from_semitones)
        .unwrap_or(Alteration::Natural);
    let kind = get_child_text(harmony_node, "kind")
        .map(|k| HarmonyKind::from_musicxml(&k))
        .unwrap_or(HarmonyKind::Major);
    Some((step, alteration, kind))
}

pub fn parse_figures(figured_bass_node: Node) -> Vec<Figure> {
    children_named(figured_bass_node, "figure")
        .map(|figure| Figure {
            number: parse_child(figure, "figure-number"),
            prefix: get_child_text(figure, "prefix"),
            suffix: get_child_text(figure, "suffix"),
        })
        .collect()
}
