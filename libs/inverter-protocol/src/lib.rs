//! Inverter Protocol
//!
//! Vendor-neutral register adapter for solar/battery inverters over Modbus.
//! Named, physically scaled parameters in; register transactions out.
//!
//! # Architecture
//!
//! ```text
//! InverterAdapter (read/write/status/set_*)
//!     ├── DeviceRegisterMap (per family: descriptors, enum tables, status list)
//!     ├── codec (words <-> values)
//!     ├── RetryPolicy (bounded attempts, fixed cool-down)
//!     └── TransportSession (lazy connect, one transaction in flight)
//!             └── RegisterTransport (ModbusLink: TCP / RTU)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use inverter_protocol::{ConnectionConfig, DeviceFamily, InverterAdapter};
//!
//! # async fn run() -> Result<(), inverter_protocol::AdapterError> {
//! let config = ConnectionConfig::tcp("192.168.1.100", 502);
//! let adapter = InverterAdapter::new(&config, DeviceFamily::Deye)?;
//!
//! if let Some(soc) = adapter.read_parameter("battery_soc").await {
//!     println!("battery: {soc}");
//! }
//! adapter.set_charge_priority("SOLAR_FIRST").await;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod codec;
pub mod config;
pub mod error;
pub mod families;
pub mod logger;
pub mod modbus;
pub mod register_map;
pub mod retry;
pub mod session;
pub mod transport;

pub use adapter::{InverterAdapter, StatusReport};
pub use codec::{decode, encode, ParameterValue, Value};
pub use config::{
    load_profile, load_profile_with_env, ConnectionConfig, DeviceProfile, Parity, SerialParams,
    TcpParams, TransportKind,
};
pub use error::{AdapterError, AdapterResult, CodecError, LinkError, MapError, Result};
pub use families::DeviceFamily;
pub use logger::DeviceLogger;
pub use modbus::{ModbusLink, DEFAULT_TCP_PORT};
pub use register_map::{
    AlarmField, ControlTable, DecodeKind, DeviceRegisterMap, DeviceRegisterMapBuilder, EnumTable,
    RegisterDescriptor,
};
pub use retry::{Exhausted, RetryPolicy};
pub use session::{SessionState, TransportSession};
pub use transport::RegisterTransport;
