//! UART2 transport towards the mesh root node.
//!
//! TX on GPIO17, RX on GPIO16, 8N1, no flow control.  Reads never block;
//! the serial link polls and does its own timing.

use esp_idf_svc::hal::delay::NON_BLOCK;
use esp_idf_svc::hal::gpio::{AnyIOPin, InputPin, OutputPin};
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::uart::{self, UartDriver};
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::sys::EspError;
use log::info;

use crate::link::Transport;

/// Staging space the driver keeps on its side of the FIFO.
const RX_RING: usize = 2048;
/// Ticks a flush may wait for the TX FIFO to drain.
const TX_DRAIN_TICKS: u32 = 100;

pub struct UartTransport {
    driver: UartDriver<'static>,
}

impl UartTransport {
    pub fn new(
        uart: impl Peripheral<P = uart::UART2> + 'static,
        tx: impl Peripheral<P = impl OutputPin> + 'static,
        rx: impl Peripheral<P = impl InputPin> + 'static,
        baud: u32,
    ) -> Result<Self, EspError> {
        let config = uart::config::Config::default()
            .baudrate(Hertz(baud))
            .data_bits(uart::config::DataBits::DataBits8)
            .parity_none()
            .stop_bits(uart::config::StopBits::STOP1)
            .rx_fifo_size(RX_RING);
        let driver = UartDriver::new(
            uart,
            tx,
            rx,
            Option::<AnyIOPin>::None,
            Option::<AnyIOPin>::None,
            &config,
        )?;
        info!("UART: UART2 up at {} baud", baud);
        Ok(Self { driver })
    }
}

impl Transport for UartTransport {
    type Error = EspError;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, EspError> {
        self.driver.read(buf, NON_BLOCK)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, EspError> {
        self.driver.write(data)
    }

    fn flush(&mut self) -> Result<(), EspError> {
        self.driver.wait_tx_done(TX_DRAIN_TICKS)
    }

    fn available(&self) -> bool {
        self.driver.remaining_read().map(|n| n > 0).unwrap_or(false)
    }
}
