//! Register transport abstraction
//!
//! The raw exchange primitives a session drives. [`crate::modbus::ModbusLink`]
//! implements them for TCP and serial endpoints; tests plug in scripted fakes.

use async_trait::async_trait;

use crate::error::Result;

/// Primitive register transactions against one endpoint
///
/// Implementations never retry; that is the retrier's job. Errors must keep
/// connection-class failures (see [`crate::LinkError::needs_reconnect`])
/// apart from device-reported exceptions.
#[async_trait]
pub trait RegisterTransport: Send {
    /// Open the underlying link, replacing any previous one
    async fn open(&mut self) -> Result<()>;

    /// Close the link if open
    async fn close(&mut self);

    /// Read `count` holding registers starting at `address`
    async fn read_holding(&mut self, unit_id: u8, address: u16, count: u16) -> Result<Vec<u16>>;

    /// Write one holding register
    async fn write_single(&mut self, unit_id: u8, address: u16, value: u16) -> Result<()>;
}
