//! Sharp memory LCD (400x240) over SPI, with a local frame buffer so only
//! changed lines go over the wire.

use core::convert::Infallible;

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use stm32l4xx_hal::hal::{blocking::spi::Write as SpiWrite, digital::v2::OutputPin};

const WIDTH: usize = 400;
const HEIGHT: usize = 240;
const WIDTH_BYTES: usize = WIDTH.div_ceil(8);
const HEIGHT_BYTES: usize = HEIGHT.div_ceil(8);

const UPDATE_BIT: u8 = 0b0000_0001;
const VCOM_BIT: u8 = 0b0000_0010;
const CLEAR_BIT: u8 = 0b0000_0100;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(thiserror::Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum DisplayError {
    #[error("SPI write failed")]
    Spi,
    #[error("chip select pin failed")]
    Gpio,
}

type Result<T> = core::result::Result<T, DisplayError>;

struct SpiTransaction<'a, SPI, CS> {
    spi: &'a mut SPI,
    cs: &'a mut CS,
}

impl<'a, SPI, CS> SpiTransaction<'a, SPI, CS>
where
    SPI: SpiWrite<u8>,
    CS: OutputPin,
{
    /// Selects the panel and sends the command byte. VCOM flips on every
    /// transaction to keep the liquid crystal free of DC bias.
    fn start(disp: &'a mut SharpMemDisplayDriver<SPI, CS>, command: u8) -> Result<Self> {
        disp.vcom = !disp.vcom;
        let vcom = if disp.vcom { VCOM_BIT } else { 0 };
        disp.cs.set_high().map_err(|_| DisplayError::Gpio)?;
        Self {
            spi: &mut disp.spi,
            cs: &mut disp.cs,
        }
        .send(&[command | vcom])
    }

    fn send(self, data: &[u8]) -> Result<Self> {
        self.spi.write(data).map_err(|_| DisplayError::Spi)?;
        Ok(self)
    }

    fn finish(self) -> Result<()> {
        self.cs.set_low().map_err(|_| DisplayError::Gpio)
    }
}

pub struct SharpMemDisplayDriver<SPI, CS> {
    spi: SPI,
    cs: CS,
    vcom: bool,
}

impl<SPI, CS> SharpMemDisplayDriver<SPI, CS>
where
    SPI: SpiWrite<u8>,
    CS: OutputPin,
{
    pub fn new(spi: SPI, cs: CS) -> Self {
        Self {
            spi,
            cs,
            vcom: false,
        }
    }

    fn start(&mut self, command: u8) -> Result<SpiTransaction<'_, SPI, CS>> {
        SpiTransaction::start(self, command)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.start(CLEAR_BIT)?.send(&[0x00])?.finish()
    }
}

/// Gate lines are numbered from 1.
fn line_address(y: usize) -> u8 {
    (y + 1) as u8
}

pub struct SharpMemDisplay<SPI, CS> {
    buf: [[u8; WIDTH_BYTES]; HEIGHT],
    dirty: [u8; HEIGHT_BYTES],
    dirty_any: bool,
    driver: SharpMemDisplayDriver<SPI, CS>,
}

impl<SPI, CS> SharpMemDisplay<SPI, CS>
where
    SPI: SpiWrite<u8>,
    CS: OutputPin,
{
    pub fn new(spi: SPI, cs: CS) -> Self {
        Self {
            buf: [[0xFF; WIDTH_BYTES]; HEIGHT],
            dirty: [0; HEIGHT_BYTES],
            dirty_any: false,
            driver: SharpMemDisplayDriver::new(spi, cs),
        }
    }

    /// A set bit is a white pixel.
    fn set_pixel(&mut self, x: usize, y: usize, white: bool) {
        if x >= WIDTH || y >= HEIGHT {
            return;
        }
        let before = self.buf[y][x / 8];
        if white {
            self.buf[y][x / 8] |= 1u8 << (x % 8);
        } else {
            self.buf[y][x / 8] &= !(1u8 << (x % 8));
        }
        if self.buf[y][x / 8] != before {
            self.dirty[y / 8] |= 1u8 << (y % 8);
            self.dirty_any = true;
        }
    }

    /// Blanks the frame buffer. The panel keeps its image until `flush`.
    pub fn clear_buffer(&mut self) {
        for y in 0..HEIGHT {
            if self.buf[y].iter().any(|b| *b != 0xFF) {
                self.buf[y] = [0xFF; WIDTH_BYTES];
                self.dirty[y / 8] |= 1u8 << (y % 8);
                self.dirty_any = true;
            }
        }
    }

    /// Sends every changed line in one transaction.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty_any {
            return Ok(());
        }
        let mut trn = self.driver.start(UPDATE_BIT)?;
        for (y, row) in self.buf.iter().enumerate() {
            if self.dirty[y / 8] & (1u8 << (y % 8)) == 0 {
                continue;
            }
            trn = trn.send(&[line_address(y)])?.send(row)?.send(&[0x00])?;
        }
        trn.send(&[0x00])?.finish()?;

        self.dirty = [0; HEIGHT_BYTES];
        self.dirty_any = false;
        Ok(())
    }

    /// Wipes both the panel and the frame buffer.
    pub fn clear(&mut self) -> Result<()> {
        self.driver.clear()?;
        self.buf = [[0xFF; WIDTH_BYTES]; HEIGHT];
        self.dirty = [0; HEIGHT_BYTES];
        self.dirty_any = false;
        Ok(())
    }
}

impl<SPI, CS> DrawTarget for SharpMemDisplay<SPI, CS>
where
    SPI: SpiWrite<u8>,
    CS: OutputPin,
{
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> core::result::Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(pos, color) in pixels {
            if pos.x < 0 || pos.y < 0 {
                continue;
            }
            self.set_pixel(pos.x as usize, pos.y as usize, color == BinaryColor::Off);
        }
        Ok(())
    }
}

impl<SPI, CS> Dimensions for SharpMemDisplay<SPI, CS> {
    fn bounding_box(&self) -> Rectangle {
        Rectangle {
            top_left: Point { x: 0, y: 0 },
            size: Size {
                width: WIDTH as u32,
                height: HEIGHT as u32,
            },
        }
    }
}
