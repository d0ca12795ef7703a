//! Register Maps
//!
//! Static description of a device family: which registers back each named
//! parameter, how they decode, and the symbolic control tables.
//! Maps are validated once when built and are immutable afterwards.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::error::{AdapterError, MapError};

/// How a register span turns into a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeKind {
    /// `words[0] * scale`
    ScaledInt,
    /// `((words[0] << 16) | words[1]) * scale`, high word first
    WideScaledInt,
    /// Word `i` occupies bits `16*i..16*i+16`, word 0 least significant, no scaling
    BitmaskWide,
    /// Three words rendered as `HH:MM:SS`
    TimeTriple,
}

impl DecodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecodeKind::ScaledInt => "scaled_int",
            DecodeKind::WideScaledInt => "wide_scaled_int",
            DecodeKind::BitmaskWide => "bitmask_wide",
            DecodeKind::TimeTriple => "time_triple",
        }
    }

    /// Whether this kind can be backed by `word_count` consecutive registers
    pub fn accepts_word_count(&self, word_count: u16) -> bool {
        match self {
            DecodeKind::ScaledInt => word_count == 1,
            DecodeKind::WideScaledInt | DecodeKind::BitmaskWide => (2..=4).contains(&word_count),
            DecodeKind::TimeTriple => word_count == 3,
        }
    }
}

impl fmt::Display for DecodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parameter's register layout
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterDescriptor {
    pub address: u16,
    pub word_count: u16,
    pub scale: f64,
    pub unit: String,
    pub kind: DecodeKind,
}

impl RegisterDescriptor {
    /// Single scaled register
    pub fn scaled(address: u16, scale: f64, unit: &str) -> Self {
        Self {
            address,
            word_count: 1,
            scale,
            unit: unit.to_string(),
            kind: DecodeKind::ScaledInt,
        }
    }

    /// 32-bit value over two registers, high word first
    pub fn wide(address: u16, scale: f64, unit: &str) -> Self {
        Self {
            address,
            word_count: 2,
            scale,
            unit: unit.to_string(),
            kind: DecodeKind::WideScaledInt,
        }
    }

    /// Flag field over `word_count` registers
    pub fn bitmask(address: u16, word_count: u16) -> Self {
        Self {
            address,
            word_count,
            scale: 1.0,
            unit: String::new(),
            kind: DecodeKind::BitmaskWide,
        }
    }

    /// Hours, minutes, seconds in three consecutive registers
    pub fn time(address: u16) -> Self {
        Self {
            address,
            word_count: 3,
            scale: 1.0,
            unit: String::new(),
            kind: DecodeKind::TimeTriple,
        }
    }

    /// Only single-register descriptors have a write path
    pub fn is_writable(&self) -> bool {
        self.word_count == 1
    }

    fn validate(&self, parameter: &str) -> Result<(), MapError> {
        if !self.scale.is_finite() || self.scale == 0.0 {
            return Err(MapError::InvalidScale {
                parameter: parameter.to_string(),
                scale: self.scale,
            });
        }
        if !self.kind.accepts_word_count(self.word_count) {
            return Err(MapError::WordCountMismatch {
                parameter: parameter.to_string(),
                kind: self.kind.as_str(),
                word_count: self.word_count,
            });
        }
        Ok(())
    }
}

/// Symbolic control tables, each bound to one control register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlTable {
    OperationMode,
    ChargePriority,
    OutputPriority,
}

impl ControlTable {
    pub const ALL: [ControlTable; 3] = [
        ControlTable::OperationMode,
        ControlTable::ChargePriority,
        ControlTable::OutputPriority,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlTable::OperationMode => "operation mode",
            ControlTable::ChargePriority => "charge priority",
            ControlTable::OutputPriority => "output priority",
        }
    }

    /// Parameter written when a label from this table is applied
    pub fn parameter(&self) -> &'static str {
        match self {
            ControlTable::OperationMode => "operation_mode",
            ControlTable::ChargePriority => "charge_source_priority",
            ControlTable::OutputPriority => "output_source_priority",
        }
    }
}

/// Label → code table
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnumTable {
    entries: Vec<(String, u16)>,
}

impl EnumTable {
    pub fn new(entries: &[(&str, u16)]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(label, code)| ((*label).to_string(), *code))
                .collect(),
        }
    }

    /// Case-insensitive label lookup
    pub fn code(&self, label: &str) -> Option<u16> {
        self.entries
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(label.trim()))
            .map(|(_, code)| *code)
    }

    /// Reverse lookup, first label wins
    pub fn label(&self, code: u16) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> {
        self.entries.iter().map(|(name, code)| (name.as_str(), *code))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Alarm register reported by status only when non-zero
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmField {
    pub parameter: String,
    /// Key used in the status report
    pub report_as: String,
}

/// Everything the adapter knows about one device family
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRegisterMap {
    family: String,
    parameters: Vec<(String, RegisterDescriptor)>,
    index: HashMap<String, usize>,
    operation_modes: EnumTable,
    charge_priorities: EnumTable,
    output_priorities: EnumTable,
    status_parameters: Vec<String>,
    alarm_fields: Vec<AlarmField>,
}

impl DeviceRegisterMap {
    /// Start building a map for `family`
    pub fn builder(family: impl Into<String>) -> DeviceRegisterMapBuilder {
        DeviceRegisterMapBuilder {
            family: family.into(),
            parameters: Vec::new(),
            operation_modes: EnumTable::default(),
            charge_priorities: EnumTable::default(),
            output_priorities: EnumTable::default(),
            status_parameters: Vec::new(),
            alarm_fields: Vec::new(),
        }
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn lookup(&self, name: &str) -> Option<&RegisterDescriptor> {
        self.index.get(name).map(|&i| &self.parameters[i].1)
    }

    /// Like [`lookup`](Self::lookup) but reports the façade error
    pub fn descriptor(&self, name: &str) -> Result<&RegisterDescriptor, AdapterError> {
        self.lookup(name)
            .ok_or_else(|| AdapterError::UnknownParameter(name.to_string()))
    }

    pub fn table(&self, table: ControlTable) -> &EnumTable {
        match table {
            ControlTable::OperationMode => &self.operation_modes,
            ControlTable::ChargePriority => &self.charge_priorities,
            ControlTable::OutputPriority => &self.output_priorities,
        }
    }

    pub fn resolve_enum(&self, table: ControlTable, label: &str) -> Result<u16, AdapterError> {
        self.table(table)
            .code(label)
            .ok_or_else(|| AdapterError::UnknownEnumLabel {
                table: table.as_str(),
                label: label.to_string(),
            })
    }

    /// Parameters in declaration order
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &RegisterDescriptor)> {
        self.parameters.iter().map(|(name, desc)| (name.as_str(), desc))
    }

    pub fn status_parameters(&self) -> &[String] {
        &self.status_parameters
    }

    pub fn alarm_fields(&self) -> &[AlarmField] {
        &self.alarm_fields
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

/// Collects a map's pieces; [`build`](Self::build) validates them all
#[derive(Debug)]
pub struct DeviceRegisterMapBuilder {
    family: String,
    parameters: Vec<(String, RegisterDescriptor)>,
    operation_modes: EnumTable,
    charge_priorities: EnumTable,
    output_priorities: EnumTable,
    status_parameters: Vec<String>,
    alarm_fields: Vec<AlarmField>,
}

impl DeviceRegisterMapBuilder {
    pub fn parameter(mut self, name: &str, descriptor: RegisterDescriptor) -> Self {
        self.parameters.push((name.to_string(), descriptor));
        self
    }

    pub fn enum_table(mut self, table: ControlTable, entries: &[(&str, u16)]) -> Self {
        let table_ref = match table {
            ControlTable::OperationMode => &mut self.operation_modes,
            ControlTable::ChargePriority => &mut self.charge_priorities,
            ControlTable::OutputPriority => &mut self.output_priorities,
        };
        *table_ref = EnumTable::new(entries);
        self
    }

    pub fn status(mut self, names: &[&str]) -> Self {
        self.status_parameters = names.iter().map(|n| (*n).to_string()).collect();
        self
    }

    pub fn alarm(mut self, parameter: &str, report_as: &str) -> Self {
        self.alarm_fields.push(AlarmField {
            parameter: parameter.to_string(),
            report_as: report_as.to_string(),
        });
        self
    }

    pub fn build(self) -> Result<DeviceRegisterMap, MapError> {
        let mut index = HashMap::with_capacity(self.parameters.len());
        for (i, (name, descriptor)) in self.parameters.iter().enumerate() {
            descriptor.validate(name)?;
            if index.insert(name.clone(), i).is_some() {
                return Err(MapError::DuplicateParameter(name.clone()));
            }
        }

        let unknown = |context: &'static str, name: &str| MapError::UnknownReference {
            context,
            parameter: name.to_string(),
        };
        for name in &self.status_parameters {
            if !index.contains_key(name) {
                return Err(unknown("status list", name));
            }
        }
        for alarm in &self.alarm_fields {
            if !index.contains_key(&alarm.parameter) {
                return Err(unknown("alarm field", &alarm.parameter));
            }
        }
        for table in ControlTable::ALL {
            let entries = match table {
                ControlTable::OperationMode => &self.operation_modes,
                ControlTable::ChargePriority => &self.charge_priorities,
                ControlTable::OutputPriority => &self.output_priorities,
            };
            if !entries.is_empty() && !index.contains_key(table.parameter()) {
                return Err(unknown("control table", table.parameter()));
            }
        }

        Ok(DeviceRegisterMap {
            family: self.family,
            parameters: self.parameters,
            index,
            operation_modes: self.operation_modes,
            charge_priorities: self.charge_priorities,
            output_priorities: self.output_priorities,
            status_parameters: self.status_parameters,
            alarm_fields: self.alarm_fields,
        })
    }
}
