//! NMEA-0183 sentence decoding for the three sentence types the monitor
//! consumes: RMC (position/time), GGA (fix quality) and GSA (precision).
//!
//! Decoding is best effort. Short sentences and unknown types decode to
//! `None`, and a field that cannot be used is carried as an `Err` so that
//! [`GnssState::apply`] keeps the previous value for it.

use crate::{
    state::{Clock, Dop, FixQuality, FixStatus, GnssState, Reading, SatCount},
    text::Text,
    Position,
};

/// Anything shorter is not worth looking at.
pub const MIN_FIELDS: usize = 10;
/// GSA carries its DOPs in fields 15 to 17.
const GSA_MIN_FIELDS: usize = 18;
// Generous upper bound; a valid sentence is at most 82 chars.
const MAX_FIELDS: usize = 24;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(thiserror::Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("field is empty")]
    Empty,
    #[error("field is not a number")]
    Malformed,
    #[error("field is too long to store")]
    TooLong,
}

pub type FieldResult<T> = Result<T, FieldError>;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SentenceKind {
    Rmc,
    Gga,
    Gsa,
}

impl SentenceKind {
    /// Matches the sentence type of an address field like `$GPRMC`.
    /// The talker id must be exactly two characters.
    pub fn from_address(address: &str) -> Option<Self> {
        let address = address.strip_prefix('$').unwrap_or(address);
        if address.len() != 5 {
            return None;
        }
        match address.get(2..)? {
            "RMC" => Some(SentenceKind::Rmc),
            "GGA" => Some(SentenceKind::Gga),
            "GSA" => Some(SentenceKind::Gsa),
            _ => None,
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Rmc {
    pub status: FixStatus,
    pub time: FieldResult<Clock>,
    pub date: FieldResult<Clock>,
    pub speed_knots: FieldResult<f32>,
    pub course: FieldResult<Reading>,
    pub position: FieldResult<Position>,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Gga {
    pub satellites: FieldResult<SatCount>,
    pub altitude: FieldResult<Reading>,
    pub quality: FixQuality,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Gsa {
    pub pdop: FieldResult<Dop>,
    pub hdop: FieldResult<Dop>,
    pub vdop: FieldResult<Dop>,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Sentence {
    Rmc(Rmc),
    Gga(Gga),
    Gsa(Gsa),
}

/// Decodes `line` and applies it to `state`. Lines that do not decode
/// leave `state` untouched.
pub fn parse(line: &str, state: &mut GnssState) {
    if let Some(sentence) = Sentence::decode(line) {
        state.apply(&sentence);
    }
}

impl Sentence {
    pub fn decode(line: &str) -> Option<Self> {
        // Checksums are not verified, only cut off
        let body = match line.trim().split_once('*') {
            Some((body, _checksum)) => body,
            None => line.trim(),
        };

        let mut fields = [""; MAX_FIELDS];
        let mut count = 0;
        for field in body.split(',') {
            if count == MAX_FIELDS {
                break;
            }
            fields[count] = field;
            count += 1;
        }
        if count < MIN_FIELDS {
            return None;
        }
        let f = &fields[..count];

        match SentenceKind::from_address(f[0])? {
            SentenceKind::Rmc => Some(Sentence::Rmc(Rmc {
                status: FixStatus::from_flag(f[2]),
                time: clock(f[1], ':'),
                date: clock(f[9], '/'),
                speed_knots: speed(f[7]),
                course: if f[8].is_empty() {
                    text("0.0")
                } else {
                    text(f[8])
                },
                position: position(f[3], f[4], f[5], f[6]),
            })),
            SentenceKind::Gga => Some(Sentence::Gga(Gga {
                satellites: text(f[7]),
                altitude: text(f[9]),
                quality: FixQuality::from_code(f[6]),
            })),
            SentenceKind::Gsa if count >= GSA_MIN_FIELDS => Some(Sentence::Gsa(Gsa {
                pdop: text(f[15]),
                hdop: text(f[16]),
                vdop: text(f[17]),
            })),
            SentenceKind::Gsa => None,
        }
    }

    pub fn kind(&self) -> SentenceKind {
        match self {
            Sentence::Rmc(_) => SentenceKind::Rmc,
            Sentence::Gga(_) => SentenceKind::Gga,
            Sentence::Gsa(_) => SentenceKind::Gsa,
        }
    }

    /// First field that will be left at its previous value, if any.
    pub fn first_error(&self) -> Option<FieldError> {
        match self {
            Sentence::Rmc(r) => r
                .time
                .err()
                .or(r.date.err())
                .or(r.speed_knots.err())
                .or(r.course.err())
                .or(r.position.err()),
            Sentence::Gga(g) => g.satellites.err().or(g.altitude.err()),
            Sentence::Gsa(g) => g.pdop.err().or(g.hdop.err()).or(g.vdop.err()),
        }
    }
}

/// Pass-through text.
fn text<const N: usize>(field: &str) -> FieldResult<Text<N>> {
    Text::try_from_str(field).ok_or(FieldError::TooLong)
}

/// Six or more characters get separators after every pair; anything
/// shorter is kept as sent.
fn clock(field: &str, sep: char) -> FieldResult<Clock> {
    if field.len() >= 6 {
        Text::from_pairs(field, sep).ok_or(FieldError::Malformed)
    } else {
        text(field)
    }
}

fn speed(field: &str) -> FieldResult<f32> {
    if field.is_empty() {
        return Ok(0.0);
    }
    unsigned(field)
}

/// Finite numbers only, `NaN` and `inf` are malformed.
fn number(field: &str) -> FieldResult<f32> {
    if field.is_empty() {
        return Err(FieldError::Empty);
    }
    let val: f32 = field.parse().map_err(|_| FieldError::Malformed)?;
    if !val.is_finite() {
        return Err(FieldError::Malformed);
    }
    Ok(val)
}

fn unsigned(field: &str) -> FieldResult<f32> {
    let val = number(field)?;
    if val < 0.0 {
        return Err(FieldError::Malformed);
    }
    Ok(val)
}

/// `ddmm.mmmm` / `dddmm.mmmm` to signed degrees. The sign comes from the
/// hemisphere only.
fn degrees(field: &str, degree_digits: usize, negative: bool) -> FieldResult<f32> {
    let deg = field.get(..degree_digits).ok_or(FieldError::Malformed)?;
    let min = field.get(degree_digits..).ok_or(FieldError::Malformed)?;
    let val = unsigned(deg)? + unsigned(min)? / 60.0;
    Ok(if negative { -val } else { val })
}

/// Both coordinates or neither.
fn position(lat: &str, ns: &str, lon: &str, ew: &str) -> FieldResult<Position> {
    if lat.is_empty() || lon.is_empty() {
        return Err(FieldError::Empty);
    }
    Ok(Position {
        lat: degrees(lat, 2, ns == "S")?,
        lon: degrees(lon, 3, ew == "W")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";
    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
    const GSA: &str = "$GPGSA,A,3,04,05,,09,12,,,24,,,,,2.5,1.3,1.2*7A";

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    fn parsed(lines: &[&str]) -> GnssState {
        let mut state = GnssState::new();
        for line in lines {
            parse(line, &mut state);
        }
        state
    }

    #[test]
    fn rmc_fills_position_and_time() {
        let state = parsed(&[RMC]);
        assert_eq!(state.fix_status(), FixStatus::Valid);
        assert_eq!(*state.time_of_day(), "12:35:19");
        assert_eq!(*state.date(), "23/03/94");
        assert!(close(state.latitude(), 48.1173));
        assert!(close(state.longitude(), 11.516_666));
        assert!(close(state.speed_knots(), 22.4));
        assert_eq!(*state.course_degrees(), "084.4");
    }

    #[test]
    fn southern_and_western_hemispheres_are_negative() {
        let state = parsed(&["$GNRMC,123519,A,4807.038,S,01131.000,W,0.0,,230394,,*00"]);
        assert!(close(state.latitude(), -48.1173));
        assert!(close(state.longitude(), -11.516_666));
    }

    #[test]
    fn rmc_defaults_for_empty_speed_and_course() {
        let state = parsed(&[
            "$GPRMC,123519,A,4807.038,N,01131.000,E,5.0,90.0,230394,,*00",
            "$GPRMC,123520,A,4807.038,N,01131.000,E,,,230394,,*00",
        ]);
        assert_eq!(state.speed_knots(), 0.0);
        assert_eq!(*state.course_degrees(), "0.0");
    }

    #[test]
    fn short_time_and_date_pass_through() {
        let state = parsed(&["$GPRMC,,V,,,,,,,,,N*53"]);
        assert_eq!(state.fix_status(), FixStatus::Void);
        assert_eq!(*state.time_of_day(), "");
        assert_eq!(*state.date(), "");
        // no coordinates in a void fix
        assert_eq!(state.position(), Position::default());
    }

    #[test]
    fn bad_coordinates_keep_previous_position() {
        let mut state = parsed(&[RMC]);
        parse(
            "$GPRMC,123520,A,48x7.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A",
            &mut state,
        );
        assert!(close(state.latitude(), 48.1173));
        assert!(close(state.longitude(), 11.516_666));
        // the rest of the sentence still applies
        assert_eq!(*state.time_of_day(), "12:35:20");

        parse("$GPRMC,123521,A,4,N,01131.000,E,022.4,084.4,230394,003.1,W*6A", &mut state);
        assert!(close(state.latitude(), 48.1173));
    }

    #[test]
    fn bad_speed_keeps_previous_speed() {
        let mut state = parsed(&[RMC]);
        parse(
            "$GPRMC,123520,A,4807.038,N,01131.000,E,fast,084.4,230394,003.1,W*6A",
            &mut state,
        );
        assert!(close(state.speed_knots(), 22.4));
        assert_eq!(*state.time_of_day(), "12:35:20");
    }

    #[test]
    fn unusable_speed_keeps_previous_speed() {
        for bad in ["-5.0", "NaN", "inf", "infinity"] {
            let mut state = parsed(&[RMC]);
            let line = RMC.replacen(",022.4,", &format!(",{bad},"), 1);
            let sentence = Sentence::decode(&line).unwrap();
            assert_eq!(sentence.first_error(), Some(FieldError::Malformed), "{bad}");

            parse(&line, &mut state);
            parse(&line, &mut state);
            assert!(close(state.speed_knots(), 22.4), "{bad}");
            assert_eq!(state, parsed(&[RMC, &line]), "{bad}");
        }
    }

    #[test]
    fn unusable_coordinates_keep_previous_position() {
        let bad_lines = [
            RMC.replacen("4807.038", "48inf", 1),
            RMC.replacen("4807.038", "48NaN", 1),
            RMC.replacen("4807.038", "48-7.038", 1),
            RMC.replacen("4807.038", "-807.038", 1),
            RMC.replacen("01131.000", "011inf", 1),
            RMC.replacen("01131.000", "011NaN", 1),
            RMC.replacen("01131.000", "011-31.000", 1),
        ];
        for line in &bad_lines {
            let mut state = parsed(&[RMC]);
            parse(line, &mut state);
            assert!(close(state.latitude(), 48.1173), "{line}");
            assert!(close(state.longitude(), 11.516_666), "{line}");
            assert!(state.latitude().is_finite() && state.longitude().is_finite());
        }
    }

    #[test]
    fn gga_quality_mapping() {
        let state = parsed(&[GGA]);
        assert_eq!(*state.satellite_count(), "08");
        assert_eq!(*state.altitude_meters(), "545.4");
        assert_eq!(state.fix_quality(), FixQuality::GpsSps);

        let dgps = GGA.replacen(",1,08,", ",2,08,", 1);
        assert_eq!(parsed(&[&dgps]).fix_quality(), FixQuality::Dgps);

        let no_fix = GGA.replacen(",1,08,", ",0,08,", 1);
        assert_eq!(parsed(&[&no_fix]).fix_quality(), FixQuality::NoFix);

        let rtk = GGA.replacen(",1,08,", ",4,08,", 1);
        assert_eq!(parsed(&[&rtk]).fix_quality(), FixQuality::NoFix);
    }

    #[test]
    fn gsa_dops_and_vdop_checksum_is_cut() {
        let state = parsed(&[GSA]);
        assert_eq!(*state.pdop(), "2.5");
        assert_eq!(*state.hdop(), "1.3");
        assert_eq!(*state.vdop(), "1.2");
    }

    #[test]
    fn short_gsa_is_dropped_whole() {
        let state = parsed(&["$GPGSA,A,3,04,05,,09,12,,,24,,,2.5,1.3*00"]);
        assert_eq!(state, GnssState::new());
    }

    #[test]
    fn fewer_than_ten_fields_change_nothing() {
        let state = parsed(&[
            "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4*00",
            "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9*00",
            "",
            "*",
        ]);
        assert_eq!(state, GnssState::new());
    }

    #[test]
    fn exactly_ten_fields_are_enough() {
        let line = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394*6A";
        assert_eq!(Sentence::decode(line).map(|s| s.kind()), Some(SentenceKind::Rmc));

        let state = parsed(&[line]);
        assert_eq!(*state.time_of_day(), "12:35:19");
        assert_eq!(*state.date(), "23/03/94");
        assert!(close(state.speed_knots(), 22.4));
    }

    #[test]
    fn unknown_sentences_change_nothing() {
        let state = parsed(&[
            "$GPGSV,3,1,11,03,03,111,00,04,15,270,00,06,01,010,00*74",
            "$GPVTG,054.7,T,034.4,M,005.5,N,010.2,K,,,,,*48",
        ]);
        assert_eq!(state, GnssState::new());
    }

    #[test]
    fn dispatch_matches_sentence_type_exactly() {
        assert_eq!(SentenceKind::from_address("$GPRMC"), Some(SentenceKind::Rmc));
        assert_eq!(SentenceKind::from_address("GNGGA"), Some(SentenceKind::Gga));
        assert_eq!(SentenceKind::from_address("$BDGSA"), Some(SentenceKind::Gsa));
        assert_eq!(SentenceKind::from_address("$RMCXX"), None);
        assert_eq!(SentenceKind::from_address("$GPRMCX"), None);
        assert_eq!(SentenceKind::from_address("$PGSA"), None);

        let looks_like_gga = "$GGAGSV,1,2,3,4,5,6,7,8,9,10,11,12,13,14,15,16,17*00";
        assert!(Sentence::decode(looks_like_gga).is_none());
    }

    #[test]
    fn parsing_twice_is_same_as_once() {
        let once = parsed(&[RMC, GGA, GSA]);
        let twice = parsed(&[RMC, RMC, GGA, GGA, GSA, GSA]);
        assert_eq!(once, twice);
    }

    #[test]
    fn sentence_types_own_disjoint_fields() {
        let rmc_only = parsed(&[RMC]);
        let all = parsed(&[RMC, GGA, GSA]);
        assert_eq!(rmc_only.time_of_day(), all.time_of_day());
        assert_eq!(rmc_only.position(), all.position());
        assert_eq!(*rmc_only.satellite_count(), "0");
        assert_eq!(*rmc_only.pdop(), "9.9");
    }

    #[test]
    fn oversized_fields_are_reported() {
        let line = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,5454545454.4,M,46.9,M,,*47";
        let sentence = Sentence::decode(line).unwrap();
        assert_eq!(sentence.kind(), SentenceKind::Gga);
        assert_eq!(sentence.first_error(), Some(FieldError::TooLong));

        let state = parsed(&[GGA, line]);
        assert_eq!(*state.altitude_meters(), "545.4");
        assert_eq!(*state.satellite_count(), "08");
    }
}
