//! invctl - operator CLI for Modbus solar/battery inverters
//!
//! Loads a device profile (file + `INVCTL_` environment), applies command-line
//! overrides and drives one [`InverterAdapter`] operation per invocation.

mod logging;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use inverter_protocol::{
    load_profile, ControlTable, DeviceFamily, DeviceProfile, DeviceRegisterMap, InverterAdapter,
    ParameterValue, StatusReport, TcpParams, TransportKind, DEFAULT_TCP_PORT,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "invctl")]
#[command(about = "Read and control solar/battery inverters over Modbus")]
#[command(long_about = "Read and control solar/battery inverters over Modbus

Monitoring:
  status                      Headline readings plus active alarms
  read <name>...              Read named parameters

Control:
  write <name> <value>        Write an engineering value
  set-mode <label>            Select operation mode
  set-charge-priority <label> Select charge source priority
  set-output-priority <label> Select output source priority

Offline:
  params                      List the register map
  modes                       List control labels

Examples:
  invctl --tcp 192.168.1.100:502 --family deye status
  invctl --serial /dev/ttyUSB0 --baud 9600 read battery_soc pv_power
  invctl -c inverter.toml set-charge-priority SOLAR_FIRST")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Device profile (toml, yaml or json)
    #[arg(short, long, global = true, env = "INVCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Device family: anern or deye
    #[arg(short, long, global = true)]
    family: Option<DeviceFamily>,

    /// Modbus TCP endpoint
    #[arg(long, global = true, value_name = "HOST:PORT", conflicts_with = "serial")]
    tcp: Option<String>,

    /// Serial device for Modbus RTU
    #[arg(long, global = true, value_name = "PATH")]
    serial: Option<String>,

    /// Serial baud rate
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// Modbus slave address
    #[arg(short, long, global = true)]
    unit_id: Option<u8>,

    /// Log filter (RUST_LOG takes precedence)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Headline readings plus active alarms
    Status,

    /// Read one or more parameters
    Read {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Write an engineering value to a single-register parameter
    Write {
        name: String,
        #[arg(allow_hyphen_values = true)]
        value: f64,
    },

    /// Select operation mode by label
    SetMode { label: String },

    /// Select charge source priority by label
    SetChargePriority { label: String },

    /// Select output source priority by label
    SetOutputPriority { label: String },

    /// Set the maximum charging current in amps
    SetMaxChargingCurrent { amps: f64 },

    /// Set the battery cut-off voltage in volts
    SetBatteryCutoff { volts: f64 },

    /// List the register map (no connection)
    Params,

    /// List control labels and codes (no connection)
    Modes,
}

impl Commands {
    fn needs_device(&self) -> bool {
        !matches!(self, Commands::Params | Commands::Modes)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }
    if let Err(e) = logging::init(&cli.log_level, !cli.no_color) {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let profile = resolve_profile(&cli)?;

    if !cli.command.needs_device() {
        let map = profile.family.register_map()?;
        return match cli.command {
            Commands::Params => print_params(&map, cli.json),
            _ => print_modes(&map, cli.json),
        };
    }

    tracing::debug!(
        "Profile '{}': {} via {}",
        profile.name,
        profile.family,
        profile.connection.endpoint()
    );
    let adapter = InverterAdapter::from_profile(&profile)
        .with_context(|| format!("cannot set up device '{}'", profile.name))?;

    let result = execute(&adapter, &cli.command, cli.json).await;
    adapter.disconnect().await;
    result
}

async fn execute(adapter: &InverterAdapter, command: &Commands, json: bool) -> Result<()> {
    match command {
        Commands::Status => {
            let report = adapter.try_get_status().await?;
            print_readings(&report, json)
        },
        Commands::Read { names } => {
            let mut readings = StatusReport::new();
            for name in names {
                let reading = adapter
                    .try_read_parameter(name)
                    .await
                    .with_context(|| format!("read {name}"))?;
                readings.insert(name.clone(), reading);
            }
            print_readings(&readings, json)
        },
        Commands::Write { name, value } => {
            adapter.try_write_parameter(name, *value).await?;
            print_ack(name, &value.to_string(), json)
        },
        Commands::SetMode { label } => {
            set_control(adapter, ControlTable::OperationMode, label, json).await
        },
        Commands::SetChargePriority { label } => {
            set_control(adapter, ControlTable::ChargePriority, label, json).await
        },
        Commands::SetOutputPriority { label } => {
            set_control(adapter, ControlTable::OutputPriority, label, json).await
        },
        Commands::SetMaxChargingCurrent { amps } => {
            if !adapter.set_max_charging_current(*amps).await {
                bail!("failed to set max charging current to {amps} A");
            }
            print_ack("max_charging_current", &amps.to_string(), json)
        },
        Commands::SetBatteryCutoff { volts } => {
            if !adapter.set_battery_cutoff_voltage(*volts).await {
                bail!("failed to set battery cut-off voltage to {volts} V");
            }
            print_ack("battery_cutoff_voltage", &volts.to_string(), json)
        },
        Commands::Params | Commands::Modes => Ok(()),
    }
}

async fn set_control(
    adapter: &InverterAdapter,
    table: ControlTable,
    label: &str,
    json: bool,
) -> Result<()> {
    adapter.try_set_control(table, label).await?;
    print_ack(table.parameter(), label, json)
}

// ============================================================================
// Profile
// ============================================================================

fn resolve_profile(cli: &Cli) -> Result<DeviceProfile> {
    let mut profile = load_profile(cli.config.as_deref()).context("cannot load device profile")?;

    if let Some(family) = cli.family {
        profile.family = family;
    }
    let connection = &mut profile.connection;
    if let Some(endpoint) = &cli.tcp {
        let (host, port) = parse_endpoint(endpoint)?;
        connection.transport = TransportKind::Tcp;
        connection.tcp = TcpParams { host, port };
    }
    if let Some(path) = &cli.serial {
        connection.transport = TransportKind::Serial;
        connection.serial.port = path.clone();
    }
    if let Some(baud) = cli.baud {
        connection.serial.baud_rate = baud;
    }
    if let Some(unit_id) = cli.unit_id {
        connection.unit_id = unit_id;
    }

    connection.validate()?;
    Ok(profile)
}

/// `host:port`, or bare `host` on the default port
fn parse_endpoint(endpoint: &str) -> Result<(String, u16)> {
    let (host, port) = match endpoint.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| anyhow!("invalid port in '{}'", endpoint))?;
            (host, port)
        },
        None => (endpoint, DEFAULT_TCP_PORT),
    };
    if host.is_empty() {
        bail!("missing host in '{}'", endpoint);
    }
    Ok((host.to_string(), port))
}

// ============================================================================
// Output
// ============================================================================

#[derive(Serialize)]
struct Ack<'a> {
    parameter: &'a str,
    value: &'a str,
    ok: bool,
}

#[derive(Serialize)]
struct ParamRow<'a> {
    name: &'a str,
    address: u16,
    word_count: u16,
    scale: f64,
    unit: &'a str,
    kind: &'static str,
    writable: bool,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_readings(readings: &BTreeMap<String, ParameterValue>, json: bool) -> Result<()> {
    if json {
        return print_json(readings);
    }
    if readings.is_empty() {
        println!("{}", "(no readings)".dimmed());
    }
    for (name, reading) in readings {
        println!("{:<32} {}", name.cyan(), reading);
    }
    Ok(())
}

fn print_ack(parameter: &str, value: &str, json: bool) -> Result<()> {
    if json {
        return print_json(&Ack {
            parameter,
            value,
            ok: true,
        });
    }
    println!("{} {} = {}", "✓".green(), parameter, value);
    Ok(())
}

fn print_params(map: &DeviceRegisterMap, json: bool) -> Result<()> {
    let rows: Vec<ParamRow> = map
        .parameters()
        .map(|(name, d)| ParamRow {
            name,
            address: d.address,
            word_count: d.word_count,
            scale: d.scale,
            unit: &d.unit,
            kind: d.kind.as_str(),
            writable: d.is_writable(),
        })
        .collect();
    if json {
        return print_json(&rows);
    }

    println!("{} ({} parameters)", map.family().bold(), rows.len());
    println!(
        "{:<32} {:>8} {:>5} {:>8} {:<5} {}",
        "NAME", "ADDRESS", "WORDS", "SCALE", "UNIT", "KIND"
    );
    for row in rows {
        println!(
            "{:<32} {:>8} {:>5} {:>8} {:<5} {}",
            row.name,
            format!("{:#06X}", row.address),
            row.word_count,
            row.scale,
            row.unit,
            row.kind
        );
    }
    Ok(())
}

fn print_modes(map: &DeviceRegisterMap, json: bool) -> Result<()> {
    if json {
        let tables: BTreeMap<&str, BTreeMap<&str, u16>> = ControlTable::ALL
            .iter()
            .map(|t| (t.parameter(), map.table(*t).iter().collect()))
            .collect();
        return print_json(&tables);
    }

    for table in ControlTable::ALL {
        println!("{} ({})", table.as_str().bold(), table.parameter());
        for (label, code) in map.table(table).iter() {
            println!("  {:<20} {}", label, code);
        }
    }
    Ok(())
}
