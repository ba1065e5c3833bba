#![no_main]
#![no_std]

use gnss_monitor as _;
use gnss_monitor::{
    dashboard::{Dashboard, CLEAR_SCREEN},
    line::LineBuf,
    rb::{Consumer, Producer, Ringbuf},
    FmtBuf, GnssState, MonitorConfig, PpsTracker, Sentence,
};

use core::{
    fmt::Write as _,
    sync::atomic::{AtomicUsize, Ordering},
};
use defmt::{debug, error, info, trace};
use hal::gpio::{Edge, ExtiPin, Input, PullDown, PA15, PB3};
use rtic_monotonics::{
    create_systick_token,
    systick::{ExtU32, Systick},
    Monotonic,
};
use stm32_usbd::UsbBus;
use stm32l4xx_hal::{
    self as hal,
    gpio::{Alternate, Output, PushPull, PA2, PA3, PA4, PA5, PA6, PA7},
    hal::spi::{Mode, Phase, Polarity},
    pac,
    pac::{LPUART1, SPI1},
    prelude::*,
    rcc::{ClockSecuritySystem, CrystalBypass},
    serial,
    serial::{Config, Serial},
    spi::Spi,
};
use tinyvec::ArrayVec;
use usb_device::device::{UsbDeviceBuilder, UsbVidPid};
use usbd_serial::{SerialPort, USB_CLASS_CDC};

type SharpMemDisplay = gnss_monitor::display::SharpMemDisplay<
    Spi<
        SPI1,
        (
            PA5<Alternate<PushPull, 5>>,
            PA6<Alternate<PushPull, 5>>,
            PA7<Alternate<PushPull, 5>>,
        ),
    >,
    PA4<Output<PushPull>>,
>;

type LpUart1 = Serial<LPUART1, (PA2<Alternate<PushPull, 8>>, PA3<Alternate<PushPull, 8>>)>;

/// Receiver's PPS output, rising edge on the second
type PpsPin = PA15<Input<PullDown>>;

/// Toggles on every pulse the refresh loop sees
type Led = PB3<Output<PushPull>>;

struct UartStuff {
    uart: LpUart1,
    rx_send: Producer<u8, UART_RX_BUFSIZE>,
}

const UART_RX_BUFSIZE: usize = 256;
// Room for a full dashboard frame
const USB_BUFSIZE: usize = 1024;
const DASHBOARD_BUFSIZE: usize = 640;

static UART_RX_COUNTER: AtomicUsize = AtomicUsize::new(0);
static UART_ERROR_COUNTER: AtomicUsize = AtomicUsize::new(0);

static UART_RX: Ringbuf<u8, UART_RX_BUFSIZE> = Ringbuf::new();
static USB_TX: Ringbuf<u8, USB_BUFSIZE> = Ringbuf::new();

#[rtic::app(
    device = stm32l4xx_hal::pac,
    dispatchers = [EXTI2, EXTI3],
)]
mod app {

    use rtic::mutex_prelude::*;

    use super::*;

    // Shared resources go here
    #[shared]
    struct Shared {
        gnss: GnssState,
        pps: PpsTracker,
    }

    // Local resources go here
    #[local]
    struct Local {
        uart: UartStuff,
        pps_pin: PpsPin,
    }

    ////////////////////////////////////////////////////////////////////////////
    // Main thread tasks ///////////////////////////////////////////////////////
    ////////////////////////////////////////////////////////////////////////////

    #[init]
    fn init(mut cx: init::Context) -> (Shared, Local) {
        trace!("init enter");

        let config = MonitorConfig::default();
        info!("starting with {}", config);

        let mut flash = cx.device.FLASH.constrain();
        let mut rcc = cx.device.RCC.constrain();
        let mut pwr = cx.device.PWR.constrain(&mut rcc.apb1r1);
        let clocks = rcc
            .cfgr
            .lse(CrystalBypass::Disable, ClockSecuritySystem::Disable)
            .hsi48(true)
            .freeze(&mut flash.acr, &mut pwr);

        let mut gpioa = cx.device.GPIOA.split(&mut rcc.ahb2);
        let mut gpiob = cx.device.GPIOB.split(&mut rcc.ahb2);

        // Create SysTick monotonic for task scheduling, 1 tick = 1 ms
        Systick::start(cx.core.SYST, clocks.sysclk().raw(), create_systick_token!());

        // Initialize SPI and display
        let mut cs = gpioa
            .pa4
            .into_push_pull_output(&mut gpioa.moder, &mut gpioa.otyper);
        cs.set_low();
        let sck = gpioa
            .pa5
            .into_alternate(&mut gpioa.moder, &mut gpioa.otyper, &mut gpioa.afrl);
        let miso = gpioa
            .pa6
            .into_alternate(&mut gpioa.moder, &mut gpioa.otyper, &mut gpioa.afrl);
        let mosi = gpioa
            .pa7
            .into_alternate(&mut gpioa.moder, &mut gpioa.otyper, &mut gpioa.afrl);
        let spi1 = Spi::spi1(
            cx.device.SPI1,
            (sck, miso, mosi),
            Mode {
                phase: Phase::CaptureOnFirstTransition,
                polarity: Polarity::IdleLow,
            },
            false,
            2.MHz(),
            clocks,
            &mut rcc.apb2,
        );

        // Initialize UART for GPS
        let tx = gpioa
            .pa2
            .into_alternate(&mut gpioa.moder, &mut gpioa.otyper, &mut gpioa.afrl);
        let rx = gpioa
            .pa3
            .into_alternate(&mut gpioa.moder, &mut gpioa.otyper, &mut gpioa.afrl);

        let mut uart = Serial::lpuart1(
            cx.device.LPUART1,
            (tx, rx),
            Config::default().baudrate(config.uart_baud.bps()),
            clocks,
            &mut rcc.apb1r2,
        );
        uart.listen(serial::Event::Rxne);

        let (uart_rx_send, uart_rx_recv) = UART_RX.try_split().unwrap();
        let uart = UartStuff {
            uart,
            rx_send: uart_rx_send,
        };

        // PPS input and the LED that mirrors it
        let mut pps_pin = gpioa
            .pa15
            .into_pull_down_input(&mut gpioa.moder, &mut gpioa.pupdr);
        if config.pps_enabled {
            pps_pin.make_interrupt_source(&mut cx.device.SYSCFG, &mut rcc.apb2);
            pps_pin.trigger_on_edge(&mut cx.device.EXTI, Edge::Rising);
            pps_pin.enable_interrupt(&mut cx.device.EXTI);
        } else {
            info!("PPS tracking disabled");
        }
        let led = gpiob
            .pb3
            .into_push_pull_output(&mut gpiob.moder, &mut gpiob.otyper);

        // Initialize USB Serial
        let dm = gpioa
            .pa11
            .into_alternate(&mut gpioa.moder, &mut gpioa.otyper, &mut gpioa.afrh);
        let dp = gpioa
            .pa12
            .into_alternate(&mut gpioa.moder, &mut gpioa.otyper, &mut gpioa.afrh);

        // Turn on USB power
        unsafe {
            pac::Peripherals::steal()
                .PWR
                .cr2
                .modify(|_, w| w.usv().set_bit())
        };

        // Create USB peripheral object
        let usb = hal::usb::Peripheral {
            usb: cx.device.USB,
            pin_dm: dm,
            pin_dp: dp,
        };

        let (usb_tx_send, usb_tx_recv) = USB_TX.try_split().unwrap();

        // Spawn tasks
        usb_poll::spawn(usb, usb_tx_recv).map_err(|_| ()).unwrap();
        gps_task::spawn(uart_rx_recv).map_err(|_| ()).unwrap();
        refresh_task::spawn(config, SharpMemDisplay::new(spi1, cs), led, usb_tx_send)
            .map_err(|_| ())
            .unwrap();

        info!("done initializing!");
        trace!("init exit");
        (
            Shared {
                gnss: GnssState::new(),
                pps: PpsTracker::new(),
            },
            Local { uart, pps_pin },
        )
    }

    #[idle]
    fn idle(_: idle::Context) -> ! {
        trace!("idle enter");

        loop {
            // Only sleep in release mode, since the debugger doesn't interact with sleep very nicely
            #[cfg(debug_assertions)]
            cortex_m::asm::nop();
            #[cfg(not(debug_assertions))]
            cortex_m::asm::wfi();
        }
    }

    ////////////////////////////////////////////////////////////////////////////
    // Hardware interrupt handlers /////////////////////////////////////////////
    ////////////////////////////////////////////////////////////////////////////

    // Move received bytes into the buffer, dropping them if it is full
    #[task(binds = LPUART1, priority = 10, local = [uart])]
    fn on_uart(cx: on_uart::Context) {
        loop {
            match cx.local.uart.uart.read() {
                Ok(b) => {
                    let _ = cx.local.uart.rx_send.try_write(b);
                    UART_RX_COUNTER.fetch_add(1, Ordering::Relaxed);
                }
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(_)) => {
                    // Framing/overrun, the byte is lost either way
                    UART_ERROR_COUNTER.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }
        }
    }

    // Highest priority so the timestamp is taken as close to the edge as possible.
    // No logging in here.
    #[task(binds = EXTI15_10, priority = 11, shared = [gnss, pps], local = [pps_pin])]
    fn on_pps(cx: on_pps::Context) {
        let now = Systick::now().ticks();
        if !cx.local.pps_pin.check_interrupt() {
            return;
        }
        cx.local.pps_pin.clear_interrupt_pending_bit();
        (cx.shared.gnss, cx.shared.pps).lock(|gnss, pps| pps.on_pulse(now, gnss));
    }

    ////////////////////////////////////////////////////////////////////////////
    // Software tasks //////////////////////////////////////////////////////////
    ////////////////////////////////////////////////////////////////////////////

    // Frame and decode NMEA sentences
    #[task(priority = 2, shared = [gnss])]
    async fn gps_task(mut cx: gps_task::Context, uart_rx_recv: Consumer<u8, UART_RX_BUFSIZE>) {
        trace!("gps_task enter");

        let mut line = LineBuf::new();
        loop {
            match line.process_byte(uart_rx_recv.async_read().await) {
                Some(Ok(text)) => match Sentence::decode(text) {
                    Some(sentence) => {
                        // One lock per sentence, so a pulse never sees half of it
                        cx.shared.gnss.lock(|gnss| gnss.apply(&sentence));
                        trace!("applied {}", sentence.kind());
                        if let Some(e) = sentence.first_error() {
                            debug!("{} kept an old value: {}", sentence.kind(), e);
                        }
                    }
                    None => trace!("ignored {=str}", text),
                },
                Some(Err(e)) => debug!("dropped line: {}", e),
                None => (),
            }
        }
    }

    // Mirror pulses on the LED and redraw the dashboard
    #[task(priority = 1, shared = [gnss, pps])]
    async fn refresh_task(
        mut cx: refresh_task::Context,
        config: MonitorConfig,
        mut display: SharpMemDisplay,
        mut led: Led,
        usb_tx_send: Producer<u8, USB_BUFSIZE>,
    ) {
        trace!("refresh_task enter");

        if let Err(e) = display.clear() {
            error!("display clear failed: {}", e);
        }

        let mut text = FmtBuf::<DASHBOARD_BUFSIZE>::new();
        let mut last_refresh = Systick::now().ticks();

        loop {
            if cx.shared.pps.lock(|pps| pps.take_new_pulse()) {
                led.toggle();
            }

            let now = Systick::now().ticks();
            if config.refresh_due(now, last_refresh) {
                let gnss = cx.shared.gnss.lock(|gnss| *gnss);
                let pps = cx.shared.pps.lock(|pps| pps.snapshot());
                let dashboard = Dashboard::new(&gnss, config.pps_enabled.then_some(&pps));

                text.clear();
                let _ = text.write_str(CLEAR_SCREEN);
                let _ = dashboard.write_text(&mut text);
                let sent = usb_tx_send.write_iter(text.as_bytes().iter().copied());
                if sent < text.as_bytes().len() {
                    debug!("usb console behind, cut frame at {} bytes", sent);
                }

                display.clear_buffer();
                if dashboard.draw(&mut display).is_err() {
                    error!("dashboard draw failed");
                }
                if let Err(e) = display.flush() {
                    error!("display flush failed: {}", e);
                }

                debug!(
                    "{} sats={} pulse #{} rx={} rx_err={} rx_dropped={}",
                    gnss.fix_quality(),
                    gnss.satellite_count(),
                    pps.pulse_count,
                    UART_RX_COUNTER.load(Ordering::Relaxed),
                    UART_ERROR_COUNTER.load(Ordering::Relaxed),
                    UART_RX.dropped(),
                );
                last_refresh = Systick::now().ticks();
            }

            Systick::delay(config.poll_period_ms.millis()).await;
        }
    }

    // Poll USB
    #[task(priority = 1)]
    async fn usb_poll(
        _cx: usb_poll::Context,
        usb: hal::usb::Peripheral,
        tx_recv: Consumer<u8, USB_BUFSIZE>,
    ) {
        trace!("usb_poll enter");

        let usb_bus = UsbBus::new(usb);

        let mut serial = SerialPort::new(&usb_bus);

        let mut usb_dev = UsbDeviceBuilder::new(&usb_bus, UsbVidPid(0x16c0, 0x27dd))
            .manufacturer("ECE500")
            .product("GNSS Monitor")
            .serial_number("TEST")
            .device_class(USB_CLASS_CDC)
            .build();

        let mut tx_buf = ArrayVec::<[u8; 64]>::new();

        loop {
            Systick::delay(10.millis()).await;

            while tx_buf.len() < tx_buf.capacity() {
                if let Some(b) = tx_recv.try_read() {
                    tx_buf.push(b);
                } else {
                    break;
                }
            }

            if !usb_dev.poll(&mut [&mut serial]) {
                continue;
            }

            match serial.write(&tx_buf) {
                Ok(count) => {
                    trace!("sent {} bytes to usb", count);
                    tx_buf.drain(0..count).for_each(|_| ());
                }
                Err(usb_device::UsbError::WouldBlock) => (),
                Err(_) => error!("usb error"),
            }
        }
    }
}
