//! Human readable view of the monitor state, as serial console text and
//! as a screen for the memory LCD.

use core::fmt::{self, Write};

use chrono::Timelike;
use embedded_graphics::{
    mono_font::{iso_8859_3::FONT_6X12, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::Rectangle,
};
use embedded_text::TextBox;
use u8g2_fonts::{
    fonts,
    types::{FontColor, HorizontalAlignment, VerticalPosition},
    FontRenderer,
};

use crate::{pps::PpsSnapshot, state::GnssState, text::Text, FmtBuf};

/// Clears a VT100 terminal and homes the cursor.
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

const NL: &str = "\r\n";
const TEXT_BUFSIZE: usize = 512;

#[derive(thiserror::Error, Debug)]
pub enum DrawError<E> {
    #[error("display rejected the frame")]
    Display(E),
    #[error("clock font has no glyph for {0:?}")]
    MissingGlyph(char),
    #[error("clock font cannot fill a background")]
    Background,
}

impl<E> From<u8g2_fonts::Error<E>> for DrawError<E> {
    fn from(e: u8g2_fonts::Error<E>) -> Self {
        match e {
            u8g2_fonts::Error::GlyphNotFound(c) => DrawError::MissingGlyph(c),
            u8g2_fonts::Error::DisplayError(e) => DrawError::Display(e),
            u8g2_fonts::Error::BackgroundColorNotSupported => DrawError::Background,
        }
    }
}

pub struct Dashboard<'a> {
    gnss: &'a GnssState,
    /// `None` when PPS tracking is disabled
    pps: Option<&'a PpsSnapshot>,
}

impl<'a> Dashboard<'a> {
    pub fn new(gnss: &'a GnssState, pps: Option<&'a PpsSnapshot>) -> Self {
        Self { gnss, pps }
    }

    pub fn write_text<W: Write>(&self, out: &mut W) -> fmt::Result {
        let g = self.gnss;
        let pos = g.position();

        write!(out, "=== GNSS TACTICAL DASHBOARD ==={NL}")?;
        write!(
            out,
            "STATUS: {} | SATS: {}{NL}",
            g.fix_quality().label(),
            g.satellite_count()
        )?;
        write!(
            out,
            "PRECISION (DOP): P:{} H:{} V:{}{NL}",
            g.pdop(),
            g.hdop(),
            g.vdop()
        )?;
        write!(out, "DATE:   {} | TIME: {} UTC{NL}", g.date(), g.time_of_day())?;
        write!(out, "COORD:  {:.6}, {:.6}{NL}", pos.lat, pos.lon)?;
        write!(
            out,
            "MOTION: {:.2} km/h @ {}°{NL}",
            g.speed_kph(),
            g.course_degrees()
        )?;
        write!(out, "ALT:    {} M{NL}", g.altitude_meters())?;

        if let Some(pps) = self.pps {
            write!(out, "{NL}--- PPS SYNC (Jitter: ")?;
            match pps.jitter_ms() {
                Some(jitter) => write!(out, "{jitter}ms")?,
                None => out.write_str("--")?,
            }
            write!(out, ") ---{NL}")?;
            write!(
                out,
                "PULSE #{} | SYNC: {}{NL}",
                pps.pulse_count, pps.synced_time
            )?;
        }
        Ok(())
    }

    /// `HH:MM` for the big clock, or the raw time while it is incomplete.
    pub fn clock(&self) -> Text<8> {
        match self.gnss.utc_datetime() {
            Some(t) => {
                let mut buf = Text::new();
                let _ = write!(buf, "{:02}:{:02}", t.hour(), t.minute());
                buf
            }
            None => *self.gnss.time_of_day(),
        }
    }

    pub fn draw<D>(&self, display: &mut D) -> Result<(), DrawError<D::Error>>
    where
        D: DrawTarget<Color = BinaryColor>,
    {
        let area = display.bounding_box();
        let clock_font = FontRenderer::new::<fonts::u8g2_font_logisoso42_tr>();

        let clock = self.clock();
        if !clock.is_empty() {
            clock_font.render_aligned(
                clock.as_str(),
                area.top_left + Point::new(area.size.width as i32 / 2, 8),
                VerticalPosition::Top,
                HorizontalAlignment::Center,
                FontColor::Transparent(BinaryColor::On),
                display,
            )?;
        }

        let mut text = FmtBuf::<TEXT_BUFSIZE>::new();
        // Overflow only truncates the text box
        let _ = self.write_text(&mut text);
        let text = text.as_str().unwrap_or("");

        TextBox::new(
            text,
            Rectangle::new(
                area.top_left + Point::new(8, 64),
                Size::new(
                    area.size.width.saturating_sub(16),
                    area.size.height.saturating_sub(64),
                ),
            ),
            MonoTextStyle::new(&FONT_6X12, BinaryColor::On),
        )
        .draw(display)
        .map_err(DrawError::Display)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{nmea, pps::PpsTracker};
    use core::convert::Infallible;

    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";
    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
    const GSA: &str = "$GPGSA,A,3,04,05,,09,12,,,24,,,,,2.5,1.3,1.2*7A";

    fn fixed_state() -> GnssState {
        let mut gnss = GnssState::new();
        for line in [RMC, GGA, GSA] {
            nmea::parse(line, &mut gnss);
        }
        gnss
    }

    fn lines(dash: &Dashboard) -> Vec<String> {
        let mut out = String::new();
        dash.write_text(&mut out).unwrap();
        out.split(NL).map(String::from).collect()
    }

    #[test]
    fn text_shows_every_field() {
        let gnss = fixed_state();
        let out = lines(&Dashboard::new(&gnss, None));
        assert_eq!(out[0], "=== GNSS TACTICAL DASHBOARD ===");
        assert_eq!(out[1], "STATUS: GPS SPS | SATS: 08");
        assert_eq!(out[2], "PRECISION (DOP): P:2.5 H:1.3 V:1.2");
        assert_eq!(out[3], "DATE:   23/03/94 | TIME: 12:35:19 UTC");
        let coord: Vec<f32> = out[4]
            .trim_start_matches("COORD:")
            .split(',')
            .map(|c| c.trim().parse().unwrap())
            .collect();
        assert!((coord[0] - 48.1173).abs() < 1e-4);
        assert!((coord[1] - 11.516_666).abs() < 1e-4);
        assert_eq!(out[5], "MOTION: 41.48 km/h @ 084.4°");
        assert_eq!(out[6], "ALT:    545.4 M");
        assert!(!out.iter().any(|l| l.contains("PPS")));
    }

    #[test]
    fn pps_section_waits_for_second_pulse() {
        let gnss = fixed_state();
        let mut pps = PpsTracker::new();

        pps.on_pulse(10_000, &gnss);
        let snap = pps.snapshot();
        let out = lines(&Dashboard::new(&gnss, Some(&snap)));
        assert!(out.contains(&"--- PPS SYNC (Jitter: --) ---".to_string()));
        assert!(out.contains(&"PULSE #1 | SYNC: 12:35:19".to_string()));

        pps.on_pulse(10_998, &gnss);
        let snap = pps.snapshot();
        let out = lines(&Dashboard::new(&gnss, Some(&snap)));
        assert!(out.contains(&"--- PPS SYNC (Jitter: 2ms) ---".to_string()));
        assert!(out.contains(&"PULSE #2 | SYNC: 12:35:19".to_string()));
    }

    #[test]
    fn clock_falls_back_to_raw_time() {
        let gnss = fixed_state();
        assert_eq!(Dashboard::new(&gnss, None).clock(), "12:35");

        let fresh = GnssState::new();
        assert_eq!(Dashboard::new(&fresh, None).clock(), "00:00:00");
    }

    /// Counts lit pixels on a screen the size of the memory LCD.
    struct LitPixels(usize);

    impl OriginDimensions for LitPixels {
        fn size(&self) -> Size {
            Size::new(400, 240)
        }
    }

    impl DrawTarget for LitPixels {
        type Color = BinaryColor;
        type Error = Infallible;

        fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
        where
            I: IntoIterator<Item = Pixel<Self::Color>>,
        {
            self.0 += pixels
                .into_iter()
                .filter(|Pixel(_, c)| *c == BinaryColor::On)
                .count();
            Ok(())
        }
    }

    #[test]
    fn draw_renders_clock_and_text() {
        let gnss = fixed_state();
        let mut screen = LitPixels(0);
        Dashboard::new(&gnss, None).draw(&mut screen).unwrap();
        assert!(screen.0 > 0);
    }
}
