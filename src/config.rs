/// Runtime knobs of the monitor. Pin assignment lives in the board types
/// of the firmware binary, since the HAL encodes pins in the type system.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Listen for the receiver's PPS line and show timing stats
    pub pps_enabled: bool,
    /// GNSS UART speed, 9600 is what most modules ship with
    pub uart_baud: u32,
    /// How often the dashboard is redrawn
    pub refresh_period_ms: u32,
    /// Idle wait between checks for a new pulse
    pub poll_period_ms: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            pps_enabled: true,
            uart_baud: 9600,
            refresh_period_ms: 1000,
            poll_period_ms: 500,
        }
    }
}

impl MonitorConfig {
    /// Plain NMEA dashboard for receivers without a PPS output.
    pub fn without_pps() -> Self {
        Self {
            pps_enabled: false,
            ..Default::default()
        }
    }

    /// Whether a refresh is due, on a millisecond clock that may wrap.
    pub fn refresh_due(&self, now_ms: u32, last_refresh_ms: u32) -> bool {
        now_ms.wrapping_sub(last_refresh_ms) > self.refresh_period_ms
    }
}
