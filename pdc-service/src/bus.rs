//! Register transport
use embedded_hal_async::i2c::I2c;

use crate::registers::{MAX_REGISTER_LEN, Register};

/// Register level access to a controller
///
/// Owned exclusively by the worker of the port it serves.
pub trait Bus {
    type Error;

    /// Read `buf.len()` bytes of `reg`
    fn read(&mut self, reg: Register, buf: &mut [u8]) -> impl Future<Output = Result<(), Self::Error>>;

    /// Write `data` to `reg`
    fn write(&mut self, reg: Register, data: &[u8]) -> impl Future<Output = Result<(), Self::Error>>;
}

/// [`Bus`] over I2C
///
/// Registers are framed as `[address]` followed by `[length, payload...]` on reads and
/// `[address, length, payload...]` on writes. Reads that return fewer payload bytes than requested
/// are zero padded.
pub struct I2cBus<I: I2c> {
    i2c: I,
    address: u8,
}

impl<I: I2c> I2cBus<I> {
    pub fn new(i2c: I, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Give back the underlying I2C bus
    pub fn release(self) -> I {
        self.i2c
    }
}

impl<I: I2c> Bus for I2cBus<I> {
    type Error = I::Error;

    async fn read(&mut self, reg: Register, buf: &mut [u8]) -> Result<(), Self::Error> {
        let len = buf.len().min(MAX_REGISTER_LEN);
        let mut raw = [0u8; MAX_REGISTER_LEN + 1];
        let Some(frame) = raw.get_mut(..=len) else {
            return Ok(());
        };

        self.i2c.write_read(self.address, &[reg.address()], frame).await?;

        let (reported, payload) = frame.split_first().unwrap_or((&0, &[]));
        let available = usize::from(*reported).min(len);
        buf.fill(0);
        for (dst, src) in buf.iter_mut().zip(payload.iter().take(available)) {
            *dst = *src;
        }
        Ok(())
    }

    async fn write(&mut self, reg: Register, data: &[u8]) -> Result<(), Self::Error> {
        let len = data.len().min(MAX_REGISTER_LEN);
        let mut raw = [0u8; MAX_REGISTER_LEN + 2];
        raw[0] = reg.address();
        raw[1] = len as u8;
        for (dst, src) in raw.iter_mut().skip(2).zip(data.iter().take(len)) {
            *dst = *src;
        }

        match raw.get(..len + 2) {
            Some(frame) => self.i2c.write(self.address, frame).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::vec;

    use embedded_hal_mock::eh1::i2c::{Mock, Transaction};

    use super::*;

    const ADDR: u8 = 0x20;

    #[tokio::test]
    async fn read_register() {
        let expectations = [Transaction::write_read(
            ADDR,
            vec![Register::ActiveRdo.address()],
            vec![4, 0x78, 0x56, 0x34, 0x12],
        )];
        let mut mock = Mock::new(&expectations);
        let mut bus = I2cBus::new(mock.clone(), ADDR);

        let mut buf = [0u8; 4];
        bus.read(Register::ActiveRdo, &mut buf).await.unwrap();
        assert_eq!(u32::from_le_bytes(buf), 0x1234_5678);
        mock.done();
    }

    #[tokio::test]
    async fn short_read_is_zero_padded() {
        let expectations = [Transaction::write_read(
            ADDR,
            vec![Register::Version.address()],
            vec![2, 0x11, 0x22, 0xFF, 0xFF],
        )];
        let mut mock = Mock::new(&expectations);
        let mut bus = I2cBus::new(mock.clone(), ADDR);

        let mut buf = [0xAAu8; 4];
        bus.read(Register::Version, &mut buf).await.unwrap();
        assert_eq!(buf, [0x11, 0x22, 0, 0]);
        mock.done();
    }

    #[tokio::test]
    async fn write_register() {
        let expectations = [Transaction::write(
            ADDR,
            vec![Register::Command.address(), 4, b'G', b'A', b'I', b'D'],
        )];
        let mut mock = Mock::new(&expectations);
        let mut bus = I2cBus::new(mock.clone(), ADDR);

        bus.write(Register::Command, b"GAID").await.unwrap();
        let _i2c = bus.release();
        mock.done();
    }
}
