// MusicXML → MSR → LilyPond, end to end

use msr_translator::converters::msr_to_lilypond::lilypond::generate_staves;
use msr_translator::msr::{ScoreSummary, Severity, VoiceElement, VoiceKind};
use msr_translator::{
    convert_musicxml_to_lilypond, translate_musicxml, translate_musicxml_file, ConversionError,
    ConversionSettings, LilyPondSettings, TranslatorSettings,
};
use pretty_assertions::assert_eq;
use std::io::Write;

const REPEAT_AND_REST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<score-partwise version="4.0">
  <work><work-title>Ode</work-title></work>
  <identification><creator type="composer">L. v. B.</creator></identification>
  <part-list>
    <score-part id="P1"><part-name>Flute</part-name></score-part>
  </part-list>
  <part id="P1">
    <measure number="1">
      <barline location="left"><repeat direction="forward"/></barline>
      <attributes>
        <divisions>1</divisions>
        <key><fifths>0</fifths></key>
        <time><beats>4</beats><beat-type>4</beat-type></time>
        <clef><sign>G</sign><line>2</line></clef>
      </attributes>
      <note><pitch><step>C</step><octave>5</octave></pitch><duration>4</duration><type>whole</type></note>
    </measure>
    <measure number="2">
      <note><pitch><step>D</step><octave>5</octave></pitch><duration>4</duration><type>whole</type></note>
      <barline location="right"><bar-style>light-heavy</bar-style><repeat direction="backward"/></barline>
    </measure>
    <measure number="3">
      <attributes><measure-style><multiple-rest>3</multiple-rest></measure-style></attributes>
      <note><rest measure="yes"/><duration>4</duration></note>
    </measure>
    <measure number="4">
      <note><rest measure="yes"/><duration>4</duration></note>
    </measure>
    <measure number="5">
      <note><rest measure="yes"/><duration>4</duration></note>
    </measure>
    <measure number="6">
      <note><pitch><step>E</step><octave>5</octave></pitch><duration>4</duration><type>whole</type></note>
      <barline location="right"><bar-style>light-heavy</bar-style></barline>
    </measure>
  </part>
</score-partwise>"#;

const PIANO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<score-partwise version="4.0">
  <part-list>
    <part-group type="start" number="1"><group-symbol>bracket</group-symbol></part-group>
    <score-part id="P1"><part-name>Piano</part-name></score-part>
    <part-group type="stop" number="1"/>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes>
        <divisions>2</divisions>
        <staves>2</staves>
        <time><beats>2</beats><beat-type>4</beat-type></time>
        <clef number="1"><sign>G</sign><line>2</line></clef>
        <clef number="2"><sign>F</sign><line>4</line></clef>
      </attributes>
      <harmony><root><root-step>C</root-step></root><kind>major</kind></harmony>
      <note><pitch><step>E</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice><type>quarter</type><staff>1</staff></note>
      <note><pitch><step>G</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice><type>quarter</type><staff>2</staff></note>
      <backup><duration>4</duration></backup>
      <note><pitch><step>C</step><octave>3</octave></pitch><duration>4</duration><voice>5</voice><type>half</type><staff>2</staff></note>
    </measure>
  </part>
</score-partwise>"#;

fn voice_lines(lines: &[&str]) -> String {
    lines.join("\n")
}

#[test]
fn test_repeat_and_compressed_rests() {
    let score = translate_musicxml(REPEAT_AND_REST, &TranslatorSettings::default())
        .expect("document should translate");
    let staves = generate_staves(&score, &LilyPondSettings::default());

    let expected = voice_lines(&[
        "    \\new Staff = \"P1_S1\" \\with { instrumentName = \"Flute\" } <<",
        "      \\new Voice = \"P1_S1_V1\" {",
        "        \\repeat volta 2 {",
        "          \\clef \"treble\" \\key c \\major \\numericTimeSignature \\time 4/4 c''1 |",
        "          d''1 |",
        "        }",
        "        \\compressMMRests { R1*3 } |",
        "        e''1 \\bar \"|.\" |",
        "      }",
        "    >>",
    ]);
    assert_eq!(staves, expected);
}

#[test]
fn test_rests_printed_one_by_one_when_not_compressed() {
    let score = translate_musicxml(REPEAT_AND_REST, &TranslatorSettings::default())
        .expect("document should translate");
    let settings = LilyPondSettings {
        compress_rest_measures: false,
        ..LilyPondSettings::default()
    };
    let staves = generate_staves(&score, &settings);

    assert_eq!(staves.matches("R1 |").count(), 3);
    assert!(!staves.contains("\\compressMMRests"));
}

#[test]
fn test_repeat_and_rest_structure() {
    let score = translate_musicxml(REPEAT_AND_REST, &TranslatorSettings::default())
        .expect("document should translate");
    let msr = score.score();
    let (voice, _) = msr.voices.iter().next().expect("one voice");

    match &msr.voices[voice].elements[..] {
        [VoiceElement::Repeat(repeat), VoiceElement::RestMeasures(rest), VoiceElement::Measure(_)] => {
            assert_eq!(msr.repeats[*repeat].common.len(), 2);
            assert_eq!(msr.rest_measures[*rest].count(), 3);
            assert_eq!(msr.rest_measures[*rest].first_measure_number, "3");
        }
        other => panic!("unexpected voice elements {:?}", other),
    }
    assert_eq!(score.expanded_measures(voice).len(), 6);
    assert_eq!(score.voice_total_duration(voice).numerator(), 6);
    assert!(score.diagnostics().lines_with(Severity::Error).is_empty());
}

#[test]
fn test_full_document_has_header() {
    let result = convert_musicxml_to_lilypond(REPEAT_AND_REST, None).expect("conversion should succeed");
    let source = &result.lilypond_source;

    assert!(source.starts_with("\\version \"2.24.0\""));
    assert!(source.contains("title = \"Ode\""));
    assert!(source.contains("composer = \"L. v. B.\""));
    assert!(source.contains("\\score {"));
    assert!(source.contains("\\layout { }"));
    assert!(!source.contains("\\midi"));
}

#[test]
fn test_midi_block_on_request() {
    let settings = ConversionSettings::from_json(r#"{"lilypond": {"midi": true}}"#)
        .expect("settings should parse");
    let result =
        convert_musicxml_to_lilypond(REPEAT_AND_REST, Some(settings)).expect("conversion should succeed");
    assert!(result.lilypond_source.contains("\\midi { }"));
}

#[test]
fn test_piano_staves_with_cross_staff_voice() {
    let score = translate_musicxml(PIANO, &TranslatorSettings::default())
        .expect("document should translate");
    let staves = generate_staves(&score, &LilyPondSettings::default());

    assert!(staves.contains("\\new StaffGroup <<"), "bracket group: {}", staves);
    assert!(staves.contains("\\new PianoStaff \\with { instrumentName = \"Piano\" } <<"));
    assert!(staves.contains("\\new Staff = \"P1_S1\" <<"));
    assert!(staves.contains("\\new Staff = \"P1_S2\" <<"));
    assert!(staves.contains("\\new ChordNames \\chordmode {"));
    assert!(staves.contains("c4"), "chord symbol: {}", staves);
    assert!(staves.contains("e'4 \\change Staff = \"P1_S2\" g'4 |"));
    assert!(staves.contains("\\clef \"bass\""));

    // Harmony voice is printed before its staff
    let chords = staves.find("\\new ChordNames").unwrap();
    let first_staff = staves.find("\\new Staff = \"P1_S1\"").unwrap();
    assert!(chords < first_staff);
}

#[test]
fn test_piano_summary() {
    let score = translate_musicxml(PIANO, &TranslatorSettings::default())
        .expect("document should translate");
    let summary = ScoreSummary::of(&score);

    assert_eq!(summary.parts.len(), 1);
    let staves = &summary.parts[0].staves;
    assert_eq!(staves.len(), 2);
    assert_eq!(staves[0].voices.len(), 2);
    assert!(matches!(staves[0].voices[0].kind, VoiceKind::Harmony { decorates: 1 }));
    assert_eq!(staves[1].voices.len(), 1);
    assert_eq!(staves[1].voices[0].number, 5);
}

#[test]
fn test_translate_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(PIANO.as_bytes()).expect("write MusicXML");

    let score = translate_musicxml_file(file.path(), &TranslatorSettings::default())
        .expect("file should translate");
    assert_eq!(score.score().parts.len(), 1);
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("missing.musicxml");

    let err = translate_musicxml_file(&path, &TranslatorSettings::default()).unwrap_err();
    match err {
        ConversionError::Io { path: reported, .. } => assert!(reported.ends_with("missing.musicxml")),
        other => panic!("expected an I/O error, got {:?}", other),
    }
}

#[test]
fn test_timewise_document_rejected() {
    let err = convert_musicxml_to_lilypond("<score-timewise/>", None).unwrap_err();
    assert!(matches!(err, ConversionError::ParseError(_)));
}
