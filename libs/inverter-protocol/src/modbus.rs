//! Modbus link
//!
//! [`ModbusLink`] drives a `tokio-modbus` client context over TCP or a serial
//! line and implements [`RegisterTransport`] with it. Framing, transaction ids
//! and CRC checks belong to the client context; this module owns connection
//! setup, per-call deadlines and error classification.

use async_trait::async_trait;
use std::fmt;
use std::io::ErrorKind;
use std::result::Result as StdResult;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{error::Elapsed, timeout};
use tokio_modbus::client::{rtu, tcp, Client, Context, Reader, Writer};
use tokio_modbus::slave::{Slave, SlaveContext};
use tokio_modbus::{Error as ModbusError, ExceptionCode};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, error, info, warn};

use crate::config::{ConnectionConfig, Parity, SerialParams, TransportKind};
use crate::error::{LinkError, Result};
use crate::logger::DeviceLogger;
use crate::transport::RegisterTransport;

/// Standard Modbus TCP port
pub const DEFAULT_TCP_PORT: u16 = 502;

pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

/// Modbus TCP / RTU implementation of [`RegisterTransport`]
pub struct ModbusLink {
    config: ConnectionConfig,
    context: Option<Context>,
    logger: DeviceLogger,
}

impl fmt::Debug for ModbusLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModbusLink")
            .field("endpoint", &self.config.endpoint())
            .field("open", &self.context.is_some())
            .finish_non_exhaustive()
    }
}

impl ModbusLink {
    pub fn new(config: &ConnectionConfig, logger: DeviceLogger) -> Self {
        Self {
            config: config.clone(),
            context: None,
            logger,
        }
    }

    pub fn is_open(&self) -> bool {
        self.context.is_some()
    }

    async fn connect_tcp(config: &ConnectionConfig) -> Result<Context> {
        let addr = format!("{}:{}", config.tcp.host, config.tcp.port);
        let deadline = config.timeout();
        debug!("TCP connecting: {}", addr);

        match timeout(deadline, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("TCP_NODELAY: {}", e);
                }
                info!("TCP connected: {}", addr);
                Ok(tcp::attach_slave(stream, Slave(config.unit_id)))
            },
            Ok(Err(e)) => {
                error!("TCP err: {} - {}", addr, e);
                Err(LinkError::connection(format!(
                    "Failed to connect to {addr}: {e}"
                )))
            },
            Err(_) => {
                warn!("TCP timeout: {}", addr);
                Err(LinkError::connection(format!(
                    "Connection to {addr} timed out after {}ms",
                    deadline.as_millis()
                )))
            },
        }
    }

    fn connect_rtu(&self) -> Result<Context> {
        let params: &SerialParams = &self.config.serial;
        debug!("RTU: {} @{}baud", params.port, params.baud_rate);

        let data_bits = match params.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            8 => tokio_serial::DataBits::Eight,
            other => return Err(LinkError::config(format!("unsupported data bits: {other}"))),
        };
        let stop_bits = match params.stop_bits {
            1 => tokio_serial::StopBits::One,
            2 => tokio_serial::StopBits::Two,
            other => return Err(LinkError::config(format!("unsupported stop bits: {other}"))),
        };
        let parity = match params.parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
        };

        let port = tokio_serial::new(&params.port, params.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .timeout(self.config.timeout())
            .open_native_async()
            .map_err(|e| {
                error!("RTU err: {} - {}", params.port, e);
                LinkError::connection(format!("Failed to open serial port {}: {e}", params.port))
            })?;

        info!("RTU opened: {}", params.port);
        Ok(rtu::attach_slave(port, Slave(self.config.unit_id)))
    }

    /// Open context addressed to `unit_id`
    fn context_for(&mut self, unit_id: u8) -> Result<&mut Context> {
        let context = self.context.as_mut().ok_or(LinkError::NotConnected)?;
        context.set_slave(Slave(unit_id));
        Ok(context)
    }
}

/// Flatten deadline, client and exception layers into one [`LinkError`]
fn settle<T>(
    function: u8,
    deadline: Duration,
    outcome: StdResult<StdResult<StdResult<T, ExceptionCode>, ModbusError>, Elapsed>,
) -> Result<T> {
    match outcome {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(code))) => Err(LinkError::Exception {
            function,
            code: exception_code(code),
        }),
        Ok(Err(e)) => Err(client_error(e)),
        Err(_) => Err(LinkError::timeout(format!(
            "No response within {}ms",
            deadline.as_millis()
        ))),
    }
}

fn client_error(err: ModbusError) -> LinkError {
    match err {
        ModbusError::Transport(io) => match io.kind() {
            ErrorKind::TimedOut => LinkError::timeout(io.to_string()),
            _ => LinkError::io(io.to_string()),
        },
        ModbusError::Protocol(e) => LinkError::protocol(e.to_string()),
    }
}

fn exception_code(code: ExceptionCode) -> u8 {
    match code {
        ExceptionCode::IllegalFunction => 0x01,
        ExceptionCode::IllegalDataAddress => 0x02,
        ExceptionCode::IllegalDataValue => 0x03,
        ExceptionCode::ServerDeviceFailure => 0x04,
        ExceptionCode::Acknowledge => 0x05,
        ExceptionCode::ServerDeviceBusy => 0x06,
        ExceptionCode::MemoryParityError => 0x08,
        ExceptionCode::GatewayPathUnavailable => 0x0A,
        ExceptionCode::GatewayTargetDevice => 0x0B,
        ExceptionCode::Custom(code) => code,
    }
}

#[async_trait]
impl RegisterTransport for ModbusLink {
    async fn open(&mut self) -> Result<()> {
        self.close().await;
        let context = match self.config.transport {
            TransportKind::Tcp => Self::connect_tcp(&self.config).await?,
            TransportKind::Serial => self.connect_rtu()?,
        };
        self.context = Some(context);
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut context) = self.context.take() {
            if let Err(e) = context.disconnect().await {
                debug!("Disconnect: {}", e);
            }
            debug!("Link closed");
        }
    }

    async fn read_holding(&mut self, unit_id: u8, address: u16, count: u16) -> Result<Vec<u16>> {
        let deadline = self.config.timeout();
        self.logger
            .log_frame("TX", &format!("unit {unit_id} FC03 {address:#06X} x{count}"));

        let context = self.context_for(unit_id)?;
        let outcome = timeout(deadline, context.read_holding_registers(address, count)).await;
        let words = settle(FC_READ_HOLDING_REGISTERS, deadline, outcome)?;

        self.logger
            .log_frame("RX", &format!("unit {unit_id} FC03 {:04X?}", words));
        Ok(words)
    }

    async fn write_single(&mut self, unit_id: u8, address: u16, value: u16) -> Result<()> {
        let deadline = self.config.timeout();
        self.logger
            .log_frame("TX", &format!("unit {unit_id} FC06 {address:#06X} = {value}"));

        let context = self.context_for(unit_id)?;
        let outcome = timeout(deadline, context.write_single_register(address, value)).await;
        settle(FC_WRITE_SINGLE_REGISTER, deadline, outcome)?;

        self.logger
            .log_frame("RX", &format!("unit {unit_id} FC06 {address:#06X} ok"));
        Ok(())
    }
}
