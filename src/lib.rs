#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]

use core::fmt::{self, Write};
use tinyvec::ArrayVec; // memory layout

#[cfg(feature = "firmware")]
use defmt_brtt as _; // global logger
#[cfg(feature = "firmware")]
use panic_probe as _;
#[cfg(feature = "firmware")]
use stm32l4xx_hal as _;

pub mod config;
pub mod dashboard;
#[cfg(feature = "firmware")]
pub mod display;
pub mod line;
pub mod nmea;
pub mod pps;
#[cfg(feature = "firmware")]
pub mod rb;
pub mod state;
pub mod text;

pub use config::MonitorConfig;
pub use nmea::{parse, Sentence};
pub use pps::PpsTracker;
pub use state::GnssState;

// same panicking *behavior* as `panic-probe` but doesn't print a panic message
// this prevents the panic message being printed *twice* when `defmt::panic` is invoked
#[cfg(feature = "firmware")]
#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}

#[cfg(feature = "firmware")]
static COUNT: core::sync::atomic::AtomicUsize = core::sync::atomic::AtomicUsize::new(0);
#[cfg(feature = "firmware")]
defmt::timestamp!("{=usize}", {
    use core::sync::atomic::Ordering;
    // NOTE(no-CAS) `timestamps` runs with interrupts disabled
    let n = COUNT.load(Ordering::Relaxed);
    COUNT.store(n + 1, Ordering::Relaxed);
    n
});

/// Formatting target on the stack. Output past `N` bytes is dropped.
pub struct FmtBuf<const N: usize = 256>(pub ArrayVec<[u8; N]>);

impl<const N: usize> Write for FmtBuf<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            self.0.try_push(b);
        }
        Ok(())
    }
}

impl<const N: usize> Default for FmtBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FmtBuf<N> {
    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(self.0.as_slice()).ok()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn new() -> Self {
        Self(Default::default())
    }
}

/// Signed degrees, north and east positive.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct Position {
    pub lat: f32,
    pub lon: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_buf_drops_overflow() {
        let mut buf = FmtBuf::<8>::new();
        write!(buf, "{}", "12:35:19 UTC").unwrap();
        assert_eq!(buf.as_str(), Some("12:35:19"));
        buf.clear();
        assert_eq!(buf.as_bytes(), b"");
    }
}
