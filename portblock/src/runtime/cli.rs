use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::{filter::attach::XdpMode, runtime::conf::conf_serde::level};

/// Command line arguments. Every value also reads from a `PORTBLOCK_*`
/// environment variable and, when given, overrides the configuration file.
#[derive(Parser, Debug, Serialize, Deserialize)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Set the path to the configuration file (e.g., "portblock.yaml").
    #[arg(short, long, value_name = "FILE", env = "PORTBLOCK_CONFIG_PATH")]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// TCP destination port to drop (default 4040).
    #[arg(short, long, value_name = "PORT", env = "PORTBLOCK_PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Network interface to attach to, by name or index (default "eth0").
    #[arg(short, long, value_name = "IFACE", env = "PORTBLOCK_INTERFACE")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,

    /// XDP attach mode.
    #[arg(short = 'm', long, value_enum, value_name = "MODE", env = "PORTBLOCK_XDP_MODE")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xdp_mode: Option<XdpMode>,

    /// Path to the compiled eBPF object.
    #[arg(long = "program", value_name = "FILE", env = "PORTBLOCK_PROGRAM_PATH")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program_path: Option<PathBuf>,

    /// Set the application's log level (e.g., "debug", "warn").
    #[arg(short, long, value_name = "LEVEL", env = "PORTBLOCK_LOG_LEVEL")]
    #[serde(
        default,
        with = "level::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub log_level: Option<Level>,
}
