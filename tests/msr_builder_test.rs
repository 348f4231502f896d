// MSR construction through the public builder API: hierarchy, voice
// registration, context propagation, repeats and rest-measure compression

use msr_translator::msr::{
    Clef, ContextOutcome, Duration, MeasureElement, MeasureImplicitKind, MsrError, MsrOptions,
    Note, PartId, Pitch, RepeatState, ScoreBuilder, StaffKind, Step, Time, VoiceElement, VoiceId,
    VoiceKind,
};

fn builder_with_voice() -> (ScoreBuilder, PartId, VoiceId) {
    let mut builder = ScoreBuilder::new(MsrOptions::default());
    let part = builder.create_part(1, "P1");
    let staff = builder
        .create_staff(2, 1, StaffKind::Regular, part)
        .expect("first staff should be created");
    let voice = builder
        .create_voice(3, 1, VoiceKind::Regular, staff)
        .expect("first voice should be created");
    (builder, part, voice)
}

fn whole_rest_measure(builder: &mut ScoreBuilder, part: PartId, voice: VoiceId, number: usize) {
    let line = 100 + number as u32;
    builder.create_measure_in_part(line, part, &number.to_string(), MeasureImplicitKind::Explicit);
    let mut rest = Note::rest(line, Duration::whole());
    rest.whole_measure_rest = true;
    builder
        .append_note_to_voice(voice, rest)
        .expect("rest should fit the open measure");
}

#[test]
fn test_two_quarters_make_half() {
    let (mut builder, _, voice) = builder_with_voice();
    let measure = builder.create_measure(4, "1", voice, MeasureImplicitKind::Explicit);
    let quarter = Duration::new(1, 4);

    builder
        .append_note_or_padding(measure, Note::regular(5, Pitch::natural(Step::C, 4), quarter))
        .expect("C4 should be appended");
    builder
        .append_note_or_padding(measure, Note::regular(6, Pitch::natural(Step::D, 4), quarter))
        .expect("D4 should be appended");

    assert_eq!(builder.score().measures[measure].position, Duration::new(1, 2));
}

#[test]
fn test_harmony_voice_next_to_its_regular_voice() {
    let mut builder = ScoreBuilder::new(MsrOptions::default());
    let part = builder.create_part(1, "P1");
    let staff = builder.create_staff(2, 1, StaffKind::Regular, part).unwrap();
    let v1 = builder.create_voice(3, 1, VoiceKind::Regular, staff).unwrap();
    let v2 = builder.create_voice(4, 2, VoiceKind::Regular, staff).unwrap();
    let harmony = builder
        .create_voice(5, 3, VoiceKind::Harmony { decorates: 1 }, staff)
        .unwrap();

    let staff_data = &builder.score().staves[staff];
    assert_eq!(staff_data.regular_voice_count(), 2);
    assert_eq!(builder.fetch_first_regular_voice(staff), Some(v1));
    assert_eq!(builder.score().voices[v1].sequential_number, Some(1));
    assert_eq!(staff_data.all_voices, vec![harmony, v1, v2]);
}

#[test]
fn test_staff_created_after_part_clef_inherits_it() {
    let mut builder = ScoreBuilder::new(MsrOptions::default());
    let part = builder.create_part(1, "P1");
    builder.append_clef_to_part(2, part, Clef::treble());
    let staff = builder.create_staff(3, 1, StaffKind::Regular, part).unwrap();

    assert_eq!(builder.staff_context::<Clef>(staff), Some(&Clef::treble()));
}

#[test]
fn test_fifth_regular_voice_is_rejected() {
    let mut builder = ScoreBuilder::new(MsrOptions::default());
    let part = builder.create_part(1, "P1");
    let staff = builder.create_staff(2, 1, StaffKind::Regular, part).unwrap();
    for number in 1..=4 {
        builder
            .create_voice(10 + number, number, VoiceKind::Regular, staff)
            .expect("four regular voices are allowed");
    }

    let err = builder
        .create_voice(20, 5, VoiceKind::Regular, staff)
        .unwrap_err();
    assert!(
        matches!(err, MsrError::TooManyRegularVoices { count: 5, max: 4, .. }),
        "unexpected error {:?}",
        err
    );
}

#[test]
fn test_decorating_voices_do_not_count_as_regular() {
    let mut builder = ScoreBuilder::new(MsrOptions::default());
    let part = builder.create_part(1, "P1");
    let staff = builder.create_staff(2, 1, StaffKind::Regular, part).unwrap();
    for number in 1..=4 {
        let voice = builder
            .create_voice(10 + number, number, VoiceKind::Regular, staff)
            .unwrap();
        builder
            .harmony_voice_for(20 + number, voice)
            .expect("harmony voices are not limited");
        builder
            .figured_bass_voice_for(30 + number, voice)
            .expect("figured bass voices are not limited");
    }

    let staff_data = &builder.score().staves[staff];
    assert_eq!(staff_data.regular_voice_count(), 4);
    assert_eq!(staff_data.all_voices.len(), 12);
}

#[test]
fn test_eight_eighths_are_exactly_one() {
    let eighth = Duration::new(1, 8);
    let total: Duration = std::iter::repeat(eighth).take(8).sum();
    assert_eq!(total, Duration::whole());

    for (a, b, c, d) in [(1, 3, 1, 6), (2, 5, 3, 10), (1, 12, 1, 4), (5, 8, 3, 8)] {
        let sum = Duration::new(a, b) + Duration::new(c, d);
        assert_eq!(sum, Duration::new(a * d + c * b, b * d));
    }
    assert_eq!(Duration::new(1, 3) + Duration::new(1, 6), Duration::new(1, 2));
    assert_eq!(Duration::new(2, 4).denominator(), 2);
}

#[test]
fn test_sequential_numbers_are_stable() {
    let mut builder = ScoreBuilder::new(MsrOptions::default());
    let part = builder.create_part(1, "P1");
    let staff = builder.create_staff(2, 1, StaffKind::Regular, part).unwrap();
    let raw_numbers = [3, 1, 4, 2];
    let voices: Vec<VoiceId> = raw_numbers
        .iter()
        .map(|n| builder.create_voice(10 + n, *n, VoiceKind::Regular, staff).unwrap())
        .collect();

    let sequential = |builder: &ScoreBuilder| -> Vec<Option<u32>> {
        voices
            .iter()
            .map(|v| builder.score().voices[*v].sequential_number)
            .collect()
    };
    let first = sequential(&builder);
    assert_eq!(first, vec![Some(3), Some(1), Some(4), Some(2)]);

    builder.assign_sequential_numbers(staff);
    builder.assign_sequential_numbers(staff);
    assert_eq!(sequential(&builder), first);
}

#[test]
fn test_redundant_clef_propagates_once() {
    let (mut builder, part, voice) = builder_with_voice();
    let staff = builder.score().voices[voice].staff;
    builder.create_measure_in_part(4, part, "1", MeasureImplicitKind::Explicit);

    let first = builder.append_clef_to_staff(5, staff, Clef::treble());
    let second = builder.append_clef_to_staff(6, staff, Clef::treble());
    assert_eq!(first, ContextOutcome::Set { voices: 1 });
    assert_eq!(second, ContextOutcome::IgnoredRedundant);

    let third = builder.append_clef_to_staff(7, staff, Clef::bass());
    assert_eq!(third, ContextOutcome::Set { voices: 1 });

    let measure = builder.score().voices[voice].last_measure.unwrap();
    let clefs = builder.score().measures[measure]
        .elements
        .iter()
        .filter(|e| matches!(e, MeasureElement::Clef(_)))
        .count();
    assert_eq!(clefs, 2);
    assert_eq!(builder.voice_context::<Clef>(voice), Some(&Clef::bass()));
}

#[test]
fn test_redundant_clef_kept_when_policy_is_off() {
    let options = MsrOptions {
        ignore_redundant_clefs: false,
        ..MsrOptions::default()
    };
    let mut builder = ScoreBuilder::new(options);
    let part = builder.create_part(1, "P1");
    let staff = builder.create_staff(2, 1, StaffKind::Regular, part).unwrap();
    builder.create_voice(3, 1, VoiceKind::Regular, staff).unwrap();

    builder.append_clef_to_staff(4, staff, Clef::treble());
    let again = builder.append_clef_to_staff(5, staff, Clef::treble());
    assert_eq!(again, ContextOutcome::Set { voices: 1 });
}

#[test]
fn test_rest_measures_round_trip() {
    for count in 1..=6usize {
        let (mut builder, part, voice) = builder_with_voice();
        builder.append_time_to_part(4, part, Time::new(4, 4));
        for number in 1..=count {
            whole_rest_measure(&mut builder, part, voice, number);
        }
        let before = builder.score().voice_total_duration(voice);
        assert_eq!(before, Duration::new(count as i64, 1));

        let rest = builder
            .create_rest_measures_from_first_measures(200, voice, count, false)
            .expect("every measure is a rest measure");
        {
            let score = builder.score();
            assert_eq!(score.voices[voice].elements, vec![VoiceElement::RestMeasures(rest)]);
            assert_eq!(score.rest_measures[rest].count(), count);
            assert_eq!(score.rest_measures[rest].first_measure_number, "1");
            assert_eq!(score.voice_total_duration(voice), before);
        }

        assert!(builder.expand_rest_measures(voice, rest));
        let score = builder.score();
        let numbers: Vec<&str> = score
            .voice_measures(voice, false)
            .into_iter()
            .map(|m| score.measures[m].number.as_str())
            .collect();
        let expected: Vec<String> = (1..=count).map(|n| n.to_string()).collect();
        assert_eq!(numbers, expected);
        assert_eq!(score.voice_total_duration(voice), before);
    }
}

#[test]
fn test_closing_empty_rest_run_is_noop() {
    let (mut builder, _, voice) = builder_with_voice();
    builder
        .append_pending_rest_measures(5, voice)
        .expect("no run pending");
    assert!(builder.score().voices[voice].elements.is_empty());
    assert!(builder.diagnostics().is_empty());
}

#[test]
fn test_nested_repeats_return_to_no_repeat() {
    for depth in 1..=4usize {
        let (mut builder, part, voice) = builder_with_voice();
        let mut number = 0;
        let mut next_measure = |builder: &mut ScoreBuilder| {
            number += 1;
            builder.create_measure_in_part(number, part, &number.to_string(), MeasureImplicitKind::Explicit);
            number.to_string()
        };

        for level in 1..=depth {
            next_measure(&mut builder);
            builder.handle_repeat_start(0, part).unwrap();
            assert_eq!(builder.repeat_state(voice), RepeatState::RepeatOpen { depth: level });
        }
        for level in (1..=depth).rev() {
            let measure = next_measure(&mut builder);
            builder.handle_repeat_end(0, part, &measure, 2).unwrap();
            let expected = if level == 1 {
                RepeatState::NoRepeat
            } else {
                RepeatState::RepeatOpen { depth: level - 1 }
            };
            assert_eq!(builder.repeat_state(voice), expected);
        }
        assert_eq!(builder.part_repeat_state(part), RepeatState::NoRepeat);
    }
}

#[test]
fn test_unmatched_repeat_end() {
    let (mut builder, part, _) = builder_with_voice();
    builder.create_measure_in_part(4, part, "1", MeasureImplicitKind::Explicit);
    builder.handle_repeat_start(5, part).unwrap();
    builder.create_measure_in_part(6, part, "2", MeasureImplicitKind::Explicit);
    builder.handle_repeat_end(7, part, "2", 2).unwrap();
    builder.create_measure_in_part(8, part, "3", MeasureImplicitKind::Explicit);

    let err = builder.handle_repeat_end(9, part, "3", 2).unwrap_err();
    assert_eq!(
        err,
        MsrError::UnmatchedRepeatEnd {
            line: 9,
            measure_number: "3".to_string()
        }
    );
}

#[test]
fn test_repeat_broadcast_to_every_voice() {
    let (mut builder, part, v1) = builder_with_voice();
    let staff = builder.score().voices[v1].staff;
    let v2 = builder.create_voice(4, 2, VoiceKind::Regular, staff).unwrap();
    let second_staff = builder.create_staff(5, 2, StaffKind::Regular, part).unwrap();
    let v3 = builder
        .create_voice(6, 5, VoiceKind::Regular, second_staff)
        .unwrap();

    builder.create_measure_in_part(7, part, "1", MeasureImplicitKind::Explicit);
    builder.handle_repeat_start(7, part).unwrap();
    for voice in [v1, v2, v3] {
        assert_eq!(builder.repeat_state(voice), RepeatState::RepeatOpen { depth: 1 });
    }
    builder.create_measure_in_part(8, part, "2", MeasureImplicitKind::Explicit);
    builder.handle_repeat_end(9, part, "2", 3).unwrap();

    let score = builder.finish();
    for voice in [v1, v2, v3] {
        let elements = &score.score().voices[voice].elements;
        assert_eq!(elements.len(), 1, "voice should hold exactly the repeat");
        let VoiceElement::Repeat(repeat) = elements[0] else {
            panic!("expected a repeat, got {:?}", elements[0]);
        };
        assert_eq!(score.score().repeats[repeat].times, 3);
        assert_eq!(score.score().repeats[repeat].common.len(), 2);
    }
    assert!(!score.diagnostics().has_errors());
}
