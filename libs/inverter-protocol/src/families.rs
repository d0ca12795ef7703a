//! Device Families
//!
//! Register tables for the supported inverter families. Vendor differences
//! live here as data; the adapter engine is shared.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MapError;
use crate::register_map::{ControlTable, DeviceRegisterMap, RegisterDescriptor as R};

/// Supported inverter families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceFamily {
    #[default]
    Anern,
    /// Deye and rebadged Dextrom units
    Deye,
}

impl DeviceFamily {
    pub const ALL: [DeviceFamily; 2] = [DeviceFamily::Anern, DeviceFamily::Deye];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceFamily::Anern => "anern",
            DeviceFamily::Deye => "deye",
        }
    }

    /// Build and validate this family's register map
    pub fn register_map(&self) -> Result<DeviceRegisterMap, MapError> {
        match self {
            DeviceFamily::Anern => anern_map(),
            DeviceFamily::Deye => deye_map(),
        }
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anern" => Ok(DeviceFamily::Anern),
            "deye" | "dextrom" => Ok(DeviceFamily::Deye),
            other => Err(format!("unknown device family '{other}' (expected anern or deye)")),
        }
    }
}

fn anern_map() -> Result<DeviceRegisterMap, MapError> {
    DeviceRegisterMap::builder("anern")
        // Status
        .parameter("status", R::scaled(0x0000, 1.0, ""))
        .parameter("operation_mode", R::scaled(0x0001, 1.0, ""))
        // Grid and output
        .parameter("grid_voltage", R::scaled(0x0100, 0.1, "V"))
        .parameter("grid_frequency", R::scaled(0x0101, 0.01, "Hz"))
        .parameter("output_voltage", R::scaled(0x0102, 0.1, "V"))
        .parameter("output_frequency", R::scaled(0x0103, 0.01, "Hz"))
        .parameter("output_power", R::scaled(0x0104, 1.0, "W"))
        .parameter("output_current", R::scaled(0x0105, 0.1, "A"))
        .parameter("load_percent", R::scaled(0x0106, 1.0, "%"))
        // DC side
        .parameter("bus_voltage", R::scaled(0x0110, 0.1, "V"))
        .parameter("pv_voltage", R::scaled(0x0111, 0.1, "V"))
        .parameter("pv_charging_current", R::scaled(0x0112, 0.1, "A"))
        .parameter("pv_power", R::scaled(0x0113, 1.0, "W"))
        .parameter("battery_voltage", R::scaled(0x0114, 0.1, "V"))
        .parameter("battery_current", R::scaled(0x0115, 0.1, "A"))
        .parameter("battery_temperature", R::scaled(0x0116, 1.0, "°C"))
        .parameter("inverter_temperature", R::scaled(0x0117, 1.0, "°C"))
        .parameter("ambient_temperature", R::scaled(0x0118, 1.0, "°C"))
        .parameter("battery_soc", R::scaled(0x0120, 1.0, "%"))
        // Fault flags
        .parameter("error_flags_1", R::scaled(0x0200, 1.0, ""))
        .parameter("error_flags_2", R::scaled(0x0201, 1.0, ""))
        // Settings
        .parameter("max_charging_current", R::scaled(0x0300, 1.0, "A"))
        .parameter("max_ac_charging_current", R::scaled(0x0301, 1.0, "A"))
        .parameter("max_pv_charging_current", R::scaled(0x0302, 1.0, "A"))
        .parameter("charge_source_priority", R::scaled(0x0303, 1.0, ""))
        .parameter("output_source_priority", R::scaled(0x0304, 1.0, ""))
        .parameter("battery_cutoff_voltage", R::scaled(0x0305, 0.1, "V"))
        .parameter("battery_reconnect_voltage", R::scaled(0x0306, 0.1, "V"))
        .enum_table(
            ControlTable::OperationMode,
            &[
                ("STANDBY", 0),
                ("LINE_MODE", 1),
                ("BATTERY_MODE", 2),
                ("FAULT_MODE", 3),
                ("OFF_GRID_MODE", 4),
                ("BYPASS_MODE", 5),
                ("SELF_TEST_MODE", 6),
            ],
        )
        .enum_table(
            ControlTable::ChargePriority,
            &[("PV_FIRST", 0), ("PV_AND_UTILITY", 1), ("ONLY_PV", 2)],
        )
        .enum_table(
            ControlTable::OutputPriority,
            &[
                ("UTILITY_FIRST", 0),
                ("SOLAR_FIRST", 1),
                ("SOLAR_AND_UTILITY", 2),
                ("ONLY_SOLAR", 3),
            ],
        )
        .status(&[
            "operation_mode",
            "grid_voltage",
            "output_voltage",
            "output_power",
            "pv_voltage",
            "pv_power",
            "battery_voltage",
            "battery_current",
            "battery_soc",
            "inverter_temperature",
        ])
        .alarm("error_flags_1", "error_flags_1")
        .alarm("error_flags_2", "error_flags_2")
        .build()
}

fn deye_map() -> Result<DeviceRegisterMap, MapError> {
    DeviceRegisterMap::builder("deye")
        // Grid
        .parameter("grid_voltage", R::scaled(0x0004, 0.1, "V"))
        .parameter("grid_current", R::scaled(0x0005, 0.1, "A"))
        .parameter("grid_power", R::scaled(0x0006, 1.0, "W"))
        // PV strings
        .parameter("pv1_voltage", R::scaled(0x0007, 0.1, "V"))
        .parameter("pv1_current", R::scaled(0x0008, 0.1, "A"))
        .parameter("pv1_power", R::scaled(0x0009, 1.0, "W"))
        .parameter("pv2_voltage", R::scaled(0x000A, 0.1, "V"))
        .parameter("pv2_current", R::scaled(0x000B, 0.1, "A"))
        .parameter("pv2_power", R::scaled(0x000C, 1.0, "W"))
        // Battery
        .parameter("battery_voltage", R::scaled(0x0011, 0.1, "V"))
        .parameter("battery_current", R::scaled(0x0012, 0.1, "A"))
        .parameter("battery_power", R::scaled(0x0013, 1.0, "W"))
        .parameter("battery_soc", R::scaled(0x0014, 1.0, "%"))
        // Load
        .parameter("load_voltage", R::scaled(0x0015, 0.1, "V"))
        .parameter("load_current", R::scaled(0x0016, 0.1, "A"))
        .parameter("load_power", R::scaled(0x0017, 1.0, "W"))
        .parameter("inverter_temperature", R::scaled(0x0018, 1.0, "°C"))
        // Settings
        .parameter("operation_mode", R::scaled(0x0100, 1.0, ""))
        .parameter("charge_source_priority", R::scaled(0x0101, 1.0, ""))
        .parameter("output_source_priority", R::scaled(0x0102, 1.0, ""))
        .parameter("max_charging_current", R::scaled(0x0103, 1.0, "A"))
        .parameter("max_ac_charging_current", R::scaled(0x0104, 1.0, "A"))
        .parameter("battery_type", R::scaled(0x0105, 1.0, ""))
        .parameter("float_charging_voltage", R::scaled(0x0106, 0.1, "V"))
        .parameter("bulk_charging_voltage", R::scaled(0x0107, 0.1, "V"))
        .parameter("battery_cutoff_voltage", R::scaled(0x0108, 0.1, "V"))
        .parameter("max_parallel_units", R::scaled(0x0109, 1.0, ""))
        .parameter("machine_type", R::scaled(0x010A, 1.0, ""))
        .parameter("topology", R::scaled(0x010B, 1.0, ""))
        .parameter("output_model_setting", R::scaled(0x010C, 1.0, ""))
        .parameter("solar_power_priority", R::scaled(0x010D, 1.0, ""))
        .parameter("mppt_strings", R::scaled(0x010E, 1.0, ""))
        .parameter("machine_model", R::scaled(0x010F, 1.0, ""))
        .parameter("ac_input_voltage_range", R::scaled(0x0110, 1.0, ""))
        .parameter("output_voltage", R::scaled(0x0111, 0.1, "V"))
        .parameter("output_frequency", R::scaled(0x0112, 0.1, "Hz"))
        .parameter("battery_reconnect_voltage", R::scaled(0x0113, 0.1, "V"))
        .parameter("battery_under_voltage_alarm", R::scaled(0x0114, 0.1, "V"))
        .parameter("discharge_limit_current", R::scaled(0x0115, 1.0, "A"))
        .parameter("battery_equalization_enable", R::scaled(0x0116, 1.0, ""))
        .parameter("battery_equalization_voltage", R::scaled(0x0117, 0.1, "V"))
        .parameter("battery_equalization_time", R::scaled(0x0118, 1.0, "min"))
        .parameter("battery_equalization_timeout", R::scaled(0x0119, 1.0, "min"))
        .parameter("battery_equalization_interval", R::scaled(0x011A, 1.0, "day"))
        .parameter("battery_equalization_boost", R::scaled(0x011B, 1.0, ""))
        // Energy counters
        .parameter("pv_day_energy", R::scaled(0x0200, 0.1, "kWh"))
        .parameter("pv_month_energy", R::scaled(0x0201, 0.1, "kWh"))
        .parameter("pv_year_energy", R::scaled(0x0202, 0.1, "kWh"))
        .parameter("pv_total_energy", R::wide(0x0203, 0.1, "kWh"))
        .parameter("today_energy", R::scaled(0x0205, 0.1, "kWh"))
        .parameter("month_energy", R::scaled(0x0206, 0.1, "kWh"))
        .parameter("year_energy", R::scaled(0x0207, 0.1, "kWh"))
        .parameter("total_energy", R::wide(0x0208, 0.1, "kWh"))
        .parameter("co2_reduction", R::wide(0x020A, 0.1, "t"))
        .parameter("net_current", R::scaled(0x020C, 0.1, "A"))
        .parameter("time_now", R::time(0x020D))
        // Fault words
        .parameter("error_codes", R::bitmask(0x0300, 4))
        .parameter("warning_codes", R::bitmask(0x0304, 4))
        .enum_table(
            ControlTable::OperationMode,
            &[
                ("POWER_ON", 0),
                ("STANDBY", 1),
                ("BYPASS", 2),
                ("BATTERY", 3),
                ("FAULT", 4),
                ("HYBRID", 5),
                ("CHARGE", 6),
            ],
        )
        .enum_table(
            ControlTable::ChargePriority,
            &[
                ("SOLAR_FIRST", 0),
                ("GRID_FIRST", 1),
                ("SOLAR_AND_GRID", 2),
                ("ONLY_SOLAR", 3),
            ],
        )
        .enum_table(
            ControlTable::OutputPriority,
            &[("GRID_FIRST", 0), ("SOLAR_FIRST", 1), ("SBU_PRIORITY", 2)],
        )
        .status(&[
            "grid_voltage",
            "grid_power",
            "pv1_voltage",
            "pv1_power",
            "pv2_voltage",
            "pv2_power",
            "battery_voltage",
            "battery_soc",
            "battery_power",
            "load_voltage",
            "load_power",
            "inverter_temperature",
            "operation_mode",
        ])
        .alarm("error_codes", "errors")
        .alarm("warning_codes", "warnings")
        .build()
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::register_map::DecodeKind;

    #[test]
    fn test_all_families_build() {
        for family in DeviceFamily::ALL {
            let map = family.register_map().unwrap();
            assert_eq!(map.family(), family.as_str());
            assert!(!map.is_empty());
        }
    }

    #[test]
    fn test_anern_table_shape() {
        let map = DeviceFamily::Anern.register_map().unwrap();
        assert_eq!(map.len(), 28);
        assert!(map.parameters().all(|(_, d)| d.kind == DecodeKind::ScaledInt));
        let cutoff = map.lookup("battery_cutoff_voltage").unwrap();
        assert_eq!(cutoff.address, 0x0305);
        assert_eq!(cutoff.scale, 0.1);
        assert_eq!(map.status_parameters().len(), 10);
        assert_eq!(map.alarm_fields()[0].report_as, "error_flags_1");
    }

    #[test]
    fn test_deye_special_registers() {
        let map = DeviceFamily::Deye.register_map().unwrap();
        assert_eq!(map.len(), 58);

        let time = map.lookup("time_now").unwrap();
        assert_eq!((time.address, time.word_count, time.kind), (0x020D, 3, DecodeKind::TimeTriple));

        let errors = map.lookup("error_codes").unwrap();
        assert_eq!((errors.word_count, errors.kind), (4, DecodeKind::BitmaskWide));

        let total = map.lookup("total_energy").unwrap();
        assert_eq!((total.word_count, total.kind), (2, DecodeKind::WideScaledInt));

        let reports: Vec<_> = map.alarm_fields().iter().map(|a| a.report_as.as_str()).collect();
        assert_eq!(reports, vec!["errors", "warnings"]);
    }

    #[test]
    fn test_same_label_different_codes_across_families() {
        let anern = DeviceFamily::Anern.register_map().unwrap();
        let deye = DeviceFamily::Deye.register_map().unwrap();

        // STANDBY exists in both, with different codes
        assert_eq!(anern.resolve_enum(ControlTable::OperationMode, "STANDBY"), Ok(0));
        assert_eq!(deye.resolve_enum(ControlTable::OperationMode, "STANDBY"), Ok(1));

        // SOLAR_FIRST is a charge priority only on Deye
        assert!(anern.resolve_enum(ControlTable::ChargePriority, "SOLAR_FIRST").is_err());
        assert_eq!(deye.resolve_enum(ControlTable::ChargePriority, "SOLAR_FIRST"), Ok(0));
    }

    #[test]
    fn test_control_registers_present_in_every_family() {
        for family in DeviceFamily::ALL {
            let map = family.register_map().unwrap();
            for table in ControlTable::ALL {
                let desc = map.lookup(table.parameter()).unwrap();
                assert!(desc.is_writable());
            }
            assert!(map.lookup("max_charging_current").unwrap().is_writable());
            assert!(map.lookup("battery_cutoff_voltage").unwrap().is_writable());
        }
    }

    #[test]
    fn test_family_from_str() {
        assert_eq!("ANERN".parse::<DeviceFamily>(), Ok(DeviceFamily::Anern));
        assert_eq!("dextrom".parse::<DeviceFamily>(), Ok(DeviceFamily::Deye));
        assert!("growatt".parse::<DeviceFamily>().is_err());
    }
}
