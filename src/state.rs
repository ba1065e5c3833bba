//! Latest known fix, as aggregated from the receiver's sentences.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::{
    nmea::{FieldError, Gga, Gsa, Rmc, Sentence},
    text::Text,
    Position,
};

/// `HH:MM:SS` / `DD/MM/YY`, or whatever shorter value the receiver sent.
pub type Clock = Text<8>;
/// Course, altitude and other numbers kept exactly as reported.
pub type Reading = Text<8>;
pub type Dop = Text<6>;
pub type SatCount = Text<4>;

const KNOTS_TO_KPH: f32 = 1.852;

/// RMC status flag.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum FixStatus {
    /// `A`
    Valid,
    /// `V`
    #[default]
    Void,
    Unknown,
}

impl FixStatus {
    pub fn from_flag(flag: &str) -> Self {
        match flag {
            "A" => FixStatus::Valid,
            "V" => FixStatus::Void,
            _ => FixStatus::Unknown,
        }
    }
}

/// GGA quality indicator.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum FixQuality {
    #[default]
    NoFix,
    GpsSps,
    Dgps,
}

impl FixQuality {
    pub fn from_code(code: &str) -> Self {
        match code {
            "1" => FixQuality::GpsSps,
            "2" => FixQuality::Dgps,
            _ => FixQuality::NoFix,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FixQuality::NoFix => "No Fix",
            FixQuality::GpsSps => "GPS SPS",
            FixQuality::Dgps => "DGPS",
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GnssState {
    fix_status: FixStatus,
    time_of_day: Clock,
    date: Clock,
    position: Position,
    speed_knots: f32,
    course_degrees: Reading,
    satellite_count: SatCount,
    altitude_meters: Reading,
    fix_quality: FixQuality,
    pdop: Dop,
    hdop: Dop,
    vdop: Dop,
}

impl Default for GnssState {
    fn default() -> Self {
        Self::new()
    }
}

/// Keep `slot` as is unless the field decoded cleanly.
fn retain_on_error<T: Copy>(slot: &mut T, field: &Result<T, FieldError>) {
    if let Ok(val) = field {
        *slot = *val;
    }
}

fn text<const N: usize>(s: &str) -> Text<N> {
    Text::try_from_str(s).unwrap_or_default()
}

impl GnssState {
    pub fn new() -> Self {
        Self {
            fix_status: FixStatus::Void,
            time_of_day: text("00:00:00"),
            date: text("00/00/00"),
            position: Position::default(),
            speed_knots: 0.0,
            course_degrees: text("0.0"),
            satellite_count: text("0"),
            altitude_meters: text("0"),
            fix_quality: FixQuality::NoFix,
            pdop: text("9.9"),
            hdop: text("9.9"),
            vdop: text("9.9"),
        }
    }

    /// Writes the fields owned by the sentence's type, all at once.
    /// Fields that failed to decode keep their previous value.
    pub fn apply(&mut self, sentence: &Sentence) {
        match sentence {
            Sentence::Rmc(rmc) => self.apply_rmc(rmc),
            Sentence::Gga(gga) => self.apply_gga(gga),
            Sentence::Gsa(gsa) => self.apply_gsa(gsa),
        }
    }

    fn apply_rmc(&mut self, rmc: &Rmc) {
        self.fix_status = rmc.status;
        retain_on_error(&mut self.time_of_day, &rmc.time);
        retain_on_error(&mut self.date, &rmc.date);
        retain_on_error(&mut self.speed_knots, &rmc.speed_knots);
        retain_on_error(&mut self.course_degrees, &rmc.course);
        retain_on_error(&mut self.position, &rmc.position);
    }

    fn apply_gga(&mut self, gga: &Gga) {
        retain_on_error(&mut self.satellite_count, &gga.satellites);
        retain_on_error(&mut self.altitude_meters, &gga.altitude);
        self.fix_quality = gga.quality;
    }

    fn apply_gsa(&mut self, gsa: &Gsa) {
        retain_on_error(&mut self.pdop, &gsa.pdop);
        retain_on_error(&mut self.hdop, &gsa.hdop);
        retain_on_error(&mut self.vdop, &gsa.vdop);
    }

    pub fn fix_status(&self) -> FixStatus {
        self.fix_status
    }

    pub fn time_of_day(&self) -> &Clock {
        &self.time_of_day
    }

    pub fn date(&self) -> &Clock {
        &self.date
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn latitude(&self) -> f32 {
        self.position.lat
    }

    pub fn longitude(&self) -> f32 {
        self.position.lon
    }

    pub fn speed_knots(&self) -> f32 {
        self.speed_knots
    }

    pub fn speed_kph(&self) -> f32 {
        self.speed_knots * KNOTS_TO_KPH
    }

    pub fn course_degrees(&self) -> &Reading {
        &self.course_degrees
    }

    pub fn satellite_count(&self) -> &SatCount {
        &self.satellite_count
    }

    pub fn altitude_meters(&self) -> &Reading {
        &self.altitude_meters
    }

    pub fn fix_quality(&self) -> FixQuality {
        self.fix_quality
    }

    pub fn pdop(&self) -> &Dop {
        &self.pdop
    }

    pub fn hdop(&self) -> &Dop {
        &self.hdop
    }

    pub fn vdop(&self) -> &Dop {
        &self.vdop
    }

    /// UTC timestamp of the last RMC, if both its time and date were
    /// complete. Two-digit years are taken as 20YY.
    pub fn utc_datetime(&self) -> Option<DateTime<Utc>> {
        let (hh, mm, ss) = split_clock(self.time_of_day.as_str(), ':')?;
        let (dd, mo, yy) = split_clock(self.date.as_str(), '/')?;
        let date = NaiveDate::from_ymd_opt(2000 + yy as i32, mo, dd)?;
        let time = NaiveTime::from_hms_opt(hh, mm, ss)?;
        Some(DateTime::from_naive_utc_and_offset(
            NaiveDateTime::new(date, time),
            Utc,
        ))
    }
}

fn split_clock(s: &str, sep: char) -> Option<(u32, u32, u32)> {
    let mut parts = s.split(sep);
    let mut next = || -> Option<u32> {
        let part = parts.next()?;
        if part.len() != 2 {
            return None;
        }
        part.parse().ok()
    };
    let parsed = (next()?, next()?, next()?);
    if parts.next().is_some() {
        return None;
    }
    Some(parsed)
}
