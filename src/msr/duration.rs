//! Exact rational durations
//!
//! Every timed quantity in the MSR (note lengths, measure positions, measure
//! lengths) is a `Duration`: a reduced fraction of a whole note backed by
//! `num_rational::Rational64`. Floating point never enters time arithmetic.
//!
//! ```text
//! quarter note        1/4
//! dotted eighth       3/16
//! triplet eighth      1/12   (1/8 * 2/3)
//! measure of 6/8      3/4
//! ```

use num_rational::Rational64;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

/// A duration in whole notes, always kept in lowest terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Duration(Rational64);

impl Duration {
    /// Create a duration of `numerator/denominator` whole notes
    ///
    /// Panics if `denominator` is zero; use [`Duration::try_new`] for
    /// values coming from input.
    pub fn new(numerator: i64, denominator: i64) -> Self {
        assert!(denominator != 0, "Duration denominator must be non-zero");
        Duration(Rational64::new(numerator, denominator))
    }

    /// Checked constructor for untrusted numerators/denominators
    pub fn try_new(numerator: i64, denominator: i64) -> Option<Self> {
        if denominator == 0 {
            None
        } else {
            Some(Duration(Rational64::new(numerator, denominator)))
        }
    }

    pub fn zero() -> Self {
        Duration(Rational64::new(0, 1))
    }

    pub fn whole() -> Self {
        Duration(Rational64::new(1, 1))
    }

    /// Convert a MusicXML `<duration>` value, counted in divisions per
    /// quarter note, into whole notes
    pub fn from_divisions(duration: u32, divisions_per_quarter: u32) -> Option<Self> {
        Self::try_new(i64::from(duration), i64::from(divisions_per_quarter) * 4)
    }

    /// Duration of a printed note type with augmentation dots
    ///
    /// Each dot adds half of the previous value: `base * (2 - 1/2^dots)`.
    pub fn from_note_type(note_type: NoteType, dots: u8) -> Self {
        let base = note_type.whole_notes();
        let dots = u32::from(dots.min(8));
        let factor = Rational64::new((1 << (dots + 1)) - 1, 1 << dots);
        Duration(base.0 * factor)
    }

    pub fn numerator(&self) -> i64 {
        *self.0.numer()
    }

    pub fn denominator(&self) -> i64 {
        *self.0.denom()
    }

    pub fn is_zero(&self) -> bool {
        *self.0.numer() == 0
    }

    pub fn is_negative(&self) -> bool {
        *self.0.numer() < 0
    }

    /// Underlying rational value
    pub fn as_rational(&self) -> Rational64 {
        self.0
    }

    /// Subtraction clamped at zero, for "remaining room in measure"
    pub fn saturating_sub(self, rhs: Duration) -> Duration {
        if rhs >= self {
            Duration::zero()
        } else {
            self - rhs
        }
    }

    /// How many times `unit` fits in `self`, when it does so exactly
    pub fn exact_multiple_of(&self, unit: Duration) -> Option<i64> {
        if unit.is_zero() {
            return None;
        }
        let ratio = self.0 / unit.0;
        if ratio.is_integer() {
            Some(*ratio.numer())
        } else {
            None
        }
    }
}

impl From<Rational64> for Duration {
    fn from(value: Rational64) -> Self {
        Duration(value)
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0 + rhs.0)
    }
}

impl AddAssign for Duration {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.0;
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl SubAssign for Duration {
    fn sub_assign(&mut self, rhs: Duration) {
        self.0 -= rhs.0;
    }
}

impl Mul<Rational64> for Duration {
    type Output = Duration;

    fn mul(self, rhs: Rational64) -> Duration {
        Duration(self.0 * rhs)
    }
}

impl Mul<i64> for Duration {
    type Output = Duration;

    fn mul(self, rhs: i64) -> Duration {
        Duration(self.0 * rhs)
    }
}

impl Sum for Duration {
    fn sum<I: Iterator<Item = Duration>>(iter: I) -> Duration {
        iter.fold(Duration::zero(), |acc, d| acc + d)
    }
}

impl<'a> Sum<&'a Duration> for Duration {
    fn sum<I: Iterator<Item = &'a Duration>>(iter: I) -> Duration {
        iter.fold(Duration::zero(), |acc, d| acc + *d)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0.numer(), self.0.denom())
    }
}

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

// ============================================================================
// NOTE TYPES AND TUPLETS
// ============================================================================

/// Printed note value (MusicXML `<type>`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NoteType {
    Maxima,
    Long,
    Breve,
    Whole,
    Half,
    Quarter,
    Eighth,
    N16th,
    N32nd,
    N64th,
    N128th,
    N256th,
}

impl NoteType {
    /// Parse a MusicXML `<type>` text
    pub fn from_musicxml(text: &str) -> Option<Self> {
        let note_type = match text.trim() {
            "maxima" => NoteType::Maxima,
            "long" => NoteType::Long,
            "breve" => NoteType::Breve,
            "whole" => NoteType::Whole,
            "half" => NoteType::Half,
            "quarter" => NoteType::Quarter,
            "eighth" => NoteType::Eighth,
            "16th" => NoteType::N16th,
            "32nd" => NoteType::N32nd,
            "64th" => NoteType::N64th,
            "128th" => NoteType::N128th,
            "256th" => NoteType::N256th,
            _ => return None,
        };
        Some(note_type)
    }

    pub fn whole_notes(&self) -> Duration {
        match self {
            NoteType::Maxima => Duration::new(8, 1),
            NoteType::Long => Duration::new(4, 1),
            NoteType::Breve => Duration::new(2, 1),
            NoteType::Whole => Duration::new(1, 1),
            NoteType::Half => Duration::new(1, 2),
            NoteType::Quarter => Duration::new(1, 4),
            NoteType::Eighth => Duration::new(1, 8),
            NoteType::N16th => Duration::new(1, 16),
            NoteType::N32nd => Duration::new(1, 32),
            NoteType::N64th => Duration::new(1, 64),
            NoteType::N128th => Duration::new(1, 128),
            NoteType::N256th => Duration::new(1, 256),
        }
    }

    /// LilyPond duration token without dots ("1", "4", "\\breve", ...)
    pub fn lilypond_token(&self) -> &'static str {
        match self {
            NoteType::Maxima => "\\maxima",
            NoteType::Long => "\\longa",
            NoteType::Breve => "\\breve",
            NoteType::Whole => "1",
            NoteType::Half => "2",
            NoteType::Quarter => "4",
            NoteType::Eighth => "8",
            NoteType::N16th => "16",
            NoteType::N32nd => "32",
            NoteType::N64th => "64",
            NoteType::N128th => "128",
            NoteType::N256th => "256",
        }
    }

    /// Find the note type and dot count whose value is exactly `duration`
    pub fn for_duration(duration: Duration) -> Option<(NoteType, u8)> {
        const ALL: [NoteType; 12] = [
            NoteType::Maxima,
            NoteType::Long,
            NoteType::Breve,
            NoteType::Whole,
            NoteType::Half,
            NoteType::Quarter,
            NoteType::Eighth,
            NoteType::N16th,
            NoteType::N32nd,
            NoteType::N64th,
            NoteType::N128th,
            NoteType::N256th,
        ];
        for dots in 0..=3u8 {
            for note_type in ALL {
                if Duration::from_note_type(note_type, dots) == duration {
                    return Some((note_type, dots));
                }
            }
        }
        None
    }
}

/// Tuplet time modification: `actual` notes in the time of `normal`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TupletFactor {
    pub actual: u32,
    pub normal: u32,
}

impl TupletFactor {
    pub fn new(actual: u32, normal: u32) -> Option<Self> {
        if actual == 0 || normal == 0 {
            None
        } else {
            Some(TupletFactor { actual, normal })
        }
    }

    /// Scale a displayed duration to the time it actually sounds
    pub fn apply(&self, displayed: Duration) -> Duration {
        displayed * Rational64::new(i64::from(self.normal), i64::from(self.actual))
    }

    pub fn is_identity(&self) -> bool {
        self.actual == self.normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_is_reduced() {
        let d = Duration::new(4, 16);
        assert_eq!(d.numerator(), 1);
        assert_eq!(d.denominator(), 4);
        assert_eq!(d.to_string(), "1/4");
    }

    #[test]
    fn test_eight_eighths_make_a_whole() {
        let total: Duration = std::iter::repeat(Duration::new(1, 8)).take(8).sum();
        assert_eq!(total, Duration::whole());
    }

    #[test]
    fn test_thirds_add_exactly() {
        let third = Duration::new(1, 3);
        assert_eq!(third + third + third, Duration::whole());
        assert_eq!(Duration::new(1, 6) + Duration::new(1, 4), Duration::new(5, 12));
    }

    #[test]
    fn test_from_divisions() {
        assert_eq!(Duration::from_divisions(4, 4), Some(Duration::new(1, 4)));
        assert_eq!(Duration::from_divisions(6, 4), Some(Duration::new(3, 8)));
        assert_eq!(Duration::from_divisions(1, 0), None);
    }

    #[test]
    fn test_dotted_note_types() {
        assert_eq!(Duration::from_note_type(NoteType::Quarter, 0), Duration::new(1, 4));
        assert_eq!(Duration::from_note_type(NoteType::Quarter, 1), Duration::new(3, 8));
        assert_eq!(Duration::from_note_type(NoteType::Half, 2), Duration::new(7, 8));
    }

    #[test]
    fn test_for_duration_finds_dotted_values() {
        assert_eq!(NoteType::for_duration(Duration::new(3, 4)), Some((NoteType::Half, 1)));
        assert_eq!(NoteType::for_duration(Duration::whole()), Some((NoteType::Whole, 0)));
        assert_eq!(NoteType::for_duration(Duration::new(5, 8)), None);
    }

    #[test]
    fn test_tuplet_factor_scaling() {
        let triplet = TupletFactor::new(3, 2).unwrap();
        let eighth = Duration::new(1, 8);
        assert_eq!(triplet.apply(eighth), Duration::new(1, 12));
        let sum: Duration = (0..3).map(|_| triplet.apply(eighth)).sum();
        assert_eq!(sum, Duration::new(1, 4));
        assert!(TupletFactor::new(0, 2).is_none());
    }

    #[test]
    fn test_saturating_sub_and_multiples() {
        let half = Duration::new(1, 2);
        assert_eq!(half.saturating_sub(Duration::whole()), Duration::zero());
        assert_eq!(Duration::new(3, 1).exact_multiple_of(Duration::new(3, 4)), Some(4));
        assert_eq!(half.exact_multiple_of(Duration::new(1, 3)), None);
    }
}
