//! Parameter Adapter
//!
//! The public face of the crate: named, scaled parameters over a register
//! transport. One engine serves every device family; the family only supplies
//! its [`DeviceRegisterMap`].
//!
//! Every operation comes in two forms. The `try_*` form returns the full
//! [`AdapterError`]; the plain form logs the error and degrades to `None` / `false`.

use std::collections::BTreeMap;
use std::future::Future;
use tokio::sync::Mutex;
use tracing::debug;

use crate::codec::{self, ParameterValue};
use crate::config::{ConnectionConfig, DeviceProfile};
use crate::error::{AdapterError, AdapterResult, LinkError};
use crate::families::DeviceFamily;
use crate::logger::DeviceLogger;
use crate::modbus::ModbusLink;
use crate::register_map::{ControlTable, DeviceRegisterMap, RegisterDescriptor};
use crate::retry::{Exhausted, RetryPolicy};
use crate::session::{SessionState, TransportSession};
use crate::transport::RegisterTransport;

/// Status snapshot keyed by parameter name (alarms by their report key)
pub type StatusReport = BTreeMap<String, ParameterValue>;

/// Register protocol adapter for one device
#[derive(Debug)]
pub struct InverterAdapter<T = ModbusLink> {
    map: DeviceRegisterMap,
    session: TransportSession<T>,
    retry: RetryPolicy,
    logger: DeviceLogger,
    /// Whole parameter operations run one at a time
    op_lock: Mutex<()>,
}

impl InverterAdapter<ModbusLink> {
    /// Adapter over a real Modbus link
    pub fn new(config: &ConnectionConfig, family: DeviceFamily) -> AdapterResult<Self> {
        Self::build(config, family, family.as_str())
    }

    /// Adapter for a loaded profile, logging under the profile's name
    pub fn from_profile(profile: &DeviceProfile) -> AdapterResult<Self> {
        Self::build(&profile.connection, profile.family, &profile.name)
    }

    fn build(config: &ConnectionConfig, family: DeviceFamily, device: &str) -> AdapterResult<Self> {
        config.validate()?;
        let map = family.register_map()?;
        let logger = DeviceLogger::new(device, config.endpoint());
        let link = ModbusLink::new(config, logger.clone());
        Ok(Self::with_transport(link, map, config, logger))
    }
}

impl<T: RegisterTransport> InverterAdapter<T> {
    /// Adapter over any transport. Uses `config` for unit id and retry budget only.
    pub fn with_transport(
        transport: T,
        map: DeviceRegisterMap,
        config: &ConnectionConfig,
        logger: DeviceLogger,
    ) -> Self {
        logger.log_init(&format!(
            "{} map, {} parameters, unit {}",
            map.family(),
            map.len(),
            config.unit_id
        ));
        Self {
            session: TransportSession::new(transport, config.unit_id, logger.clone()),
            retry: RetryPolicy::new(config.max_retries, config.retry_cooldown()),
            map,
            logger,
            op_lock: Mutex::new(()),
        }
    }

    pub fn device_family(&self) -> &str {
        self.map.family()
    }

    pub fn register_map(&self) -> &DeviceRegisterMap {
        &self.map
    }

    /// Parameters in declaration order
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &RegisterDescriptor)> {
        self.map.parameters()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub async fn is_connected(&self) -> bool {
        self.session.is_connected().await
    }

    pub async fn session_state(&self) -> SessionState {
        self.session.state().await
    }

    // ------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------

    pub async fn try_connect(&self) -> AdapterResult<()> {
        let _guard = self.op_lock.lock().await;
        self.session.connect().await.map_err(AdapterError::from_open)
    }

    pub async fn connect(&self) -> bool {
        let result = self.try_connect().await;
        self.degrade("connect", result).is_some()
    }

    /// Always succeeds; the session ends disconnected
    pub async fn disconnect(&self) -> bool {
        let _guard = self.op_lock.lock().await;
        self.session.disconnect().await;
        true
    }

    // ------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------

    pub async fn try_read_parameter(&self, name: &str) -> AdapterResult<ParameterValue> {
        let descriptor = self.map.descriptor(name)?;
        let _guard = self.op_lock.lock().await;
        self.read_descriptor(name, descriptor).await
    }

    pub async fn read_parameter(&self, name: &str) -> Option<ParameterValue> {
        let result = self.try_read_parameter(name).await;
        self.degrade(&format!("read {name}"), result)
    }

    /// Write an engineering value; only single-register parameters are writable
    pub async fn try_write_parameter(&self, name: &str, value: f64) -> AdapterResult<()> {
        let descriptor = self.map.descriptor(name)?;
        if !descriptor.is_writable() {
            return Err(AdapterError::NotWritable {
                parameter: name.to_string(),
                reason: format!("spans {} registers", descriptor.word_count),
            });
        }
        let raw = codec::encode(descriptor, value).map_err(|e| AdapterError::from_codec(name, e))?;

        let _guard = self.op_lock.lock().await;
        let session = &self.session;
        let address = descriptor.address;
        self.transact(move || session.write_register(address, raw))
            .await?;
        debug!("Wrote {} = {} (raw {} at {:#06X})", name, value, raw, address);
        Ok(())
    }

    pub async fn write_parameter(&self, name: &str, value: f64) -> bool {
        let result = self.try_write_parameter(name, value).await;
        self.degrade(&format!("write {name}"), result).is_some()
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    /// Headline parameters plus non-zero alarms; fails on the first unreadable field
    pub async fn try_get_status(&self) -> AdapterResult<StatusReport> {
        self.collect_status(true).await
    }

    /// Like [`try_get_status`](Self::try_get_status) but unreadable fields are left out
    pub async fn get_status(&self) -> StatusReport {
        match self.collect_status(false).await {
            Ok(report) => report,
            Err(e) => {
                self.logger.log_error("status", &e);
                StatusReport::new()
            },
        }
    }

    async fn collect_status(&self, strict: bool) -> AdapterResult<StatusReport> {
        let _guard = self.op_lock.lock().await;
        let mut report = StatusReport::new();

        for name in self.map.status_parameters() {
            if let Some(reading) = self.status_field(name, strict).await? {
                report.insert(name.clone(), reading);
            }
        }

        // Zero-valued alarm words are omitted, not reported as "no error"
        for alarm in self.map.alarm_fields() {
            if let Some(reading) = self.status_field(&alarm.parameter, strict).await? {
                if reading.value.is_nonzero() {
                    report.insert(alarm.report_as.clone(), reading);
                }
            }
        }
        Ok(report)
    }

    async fn status_field(&self, name: &str, strict: bool) -> AdapterResult<Option<ParameterValue>> {
        let descriptor = self.map.descriptor(name)?;
        match self.read_descriptor(name, descriptor).await {
            Ok(reading) => Ok(Some(reading)),
            Err(e) if strict => Err(e),
            Err(e) => {
                self.logger.log_error(&format!("status {name}"), &e);
                Ok(None)
            },
        }
    }

    // ------------------------------------------------------------------
    // Controls
    // ------------------------------------------------------------------

    /// Resolve `label` in `table` and write its code to the table's control register.
    ///
    /// Unknown labels fail before any transport call.
    pub async fn try_set_control(&self, table: ControlTable, label: &str) -> AdapterResult<()> {
        let code = self.map.resolve_enum(table, label)?;
        self.try_write_parameter(table.parameter(), f64::from(code))
            .await
    }

    pub async fn set_operation_mode(&self, label: &str) -> bool {
        self.set_control(ControlTable::OperationMode, label).await
    }

    pub async fn set_charge_priority(&self, label: &str) -> bool {
        self.set_control(ControlTable::ChargePriority, label).await
    }

    pub async fn set_output_priority(&self, label: &str) -> bool {
        self.set_control(ControlTable::OutputPriority, label).await
    }

    pub async fn set_max_charging_current(&self, amps: f64) -> bool {
        self.write_parameter("max_charging_current", amps).await
    }

    pub async fn set_battery_cutoff_voltage(&self, volts: f64) -> bool {
        self.write_parameter("battery_cutoff_voltage", volts).await
    }

    async fn set_control(&self, table: ControlTable, label: &str) -> bool {
        let result = self.try_set_control(table, label).await;
        self.degrade(&format!("set {}", table.as_str()), result)
            .is_some()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Read and decode one descriptor. Caller holds `op_lock`.
    async fn read_descriptor(
        &self,
        name: &str,
        descriptor: &RegisterDescriptor,
    ) -> AdapterResult<ParameterValue> {
        let session = &self.session;
        let (address, count) = (descriptor.address, descriptor.word_count);
        let words = self
            .transact(move || session.read_registers(address, count))
            .await?;

        let value = codec::decode(descriptor, &words).map_err(|e| AdapterError::from_codec(name, e))?;
        self.logger.log_parsed(name, &words, &value);
        Ok(ParameterValue::new(value, descriptor.unit.clone()))
    }

    /// Run one transaction under the retry budget; drop the link once it is spent
    async fn transact<R, F, Fut>(&self, op: F) -> AdapterResult<R>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, LinkError>>,
    {
        match self.retry.run(&self.logger, op).await {
            Ok(value) => Ok(value),
            Err(Exhausted { attempts, last }) => {
                self.session.disconnect().await;
                match last {
                    LinkError::Connection(_) | LinkError::Config(_) => {
                        Err(AdapterError::from_open(last))
                    },
                    _ => Err(AdapterError::Transport { attempts, last }),
                }
            },
        }
    }

    fn degrade<R>(&self, operation: &str, result: AdapterResult<R>) -> Option<R> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.logger.log_error(operation, &e);
                None
            },
        }
    }
}
