use core::fmt;

use tinyvec::ArrayVec;

/// Short inline string for values the receiver reports as text.
///
/// Always holds valid UTF-8: it can only be built from a `&str`.
#[derive(Default, Copy, Clone, PartialEq, Eq)]
pub struct Text<const N: usize>(ArrayVec<[u8; N]>);

impl<const N: usize> Text<N> {
    pub fn new() -> Self {
        Self(ArrayVec::new())
    }

    /// `None` if `s` does not fit.
    pub fn try_from_str(s: &str) -> Option<Self> {
        if s.len() > N {
            return None;
        }
        let mut buf = ArrayVec::new();
        buf.extend_from_slice(s.as_bytes());
        Some(Self(buf))
    }

    /// Joins three two-character groups with `sep`, e.g. `123519` → `12:35:19`.
    /// `None` unless the first six bytes of `s` split cleanly into three groups.
    pub fn from_pairs(s: &str, sep: char) -> Option<Self> {
        let (a, b, c) = (s.get(0..2)?, s.get(2..4)?, s.get(4..6)?);
        let mut out = Self::new();
        fmt::write(&mut out, format_args!("{a}{sep}{b}{sep}{c}")).ok()?;
        Some(out)
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(self.0.as_slice()).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> fmt::Write for Text<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.0.len() + s.len() > N {
            return Err(fmt::Error);
        }
        self.0.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

impl<const N: usize> fmt::Debug for Text<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<const N: usize> fmt::Display for Text<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "defmt")]
impl<const N: usize> defmt::Format for Text<N> {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{=str}", self.as_str())
    }
}

impl<const N: usize> PartialEq<&str> for Text<N> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}
