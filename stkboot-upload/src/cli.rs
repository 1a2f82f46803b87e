// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use simplelog::{Config, LevelFilter, SimpleLogger};

use crate::commands;
use crate::transport::Transport;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "stkboot-upload", version)]
#[command(about = "Flash tool for the stkboot STK500v2 bootloader")]
pub struct Cli {
    /// Serial port (e.g., /dev/ttyACM0)
    #[arg(short, long)]
    pub port: String,

    /// Baud rate of the bootloader
    #[arg(short, long, default_value_t = 115_200)]
    pub baud: u32,

    /// Do not pulse DTR/RTS to reset the board before connecting
    #[arg(long)]
    pub no_reset: bool,

    /// Increase log output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Show bootloader version, device signature and fuses
    Info,

    /// Upload a raw binary to the application area
    Upload {
        /// Firmware binary file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Skip the read-back verification
        #[arg(long)]
        no_verify: bool,
    },

    /// Read flash into a file
    Read {
        /// Output file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Number of bytes to read, decimal or 0x-prefixed hex
        #[arg(short, long, value_parser = parse_u32)]
        size: u32,

        /// Start byte address, decimal or 0x-prefixed hex
        #[arg(short, long, default_value = "0", value_parser = parse_u32)]
        address: u32,
    },

    /// Leave the bootloader and start the application
    Reset,
}

/// Parse a decimal or hex (0x prefix) number into a u32.
fn parse_u32(s: &str) -> Result<u32, String> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).map_err(|e| format!("invalid hex value: {e}")),
        None => s.parse().map_err(|e| format!("invalid number: {e}")),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let _ = SimpleLogger::init(level, Config::default());
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose);

    let mut transport = Transport::open(&cli.port, cli.baud)?;
    if cli.no_reset {
        transport.drain()?;
    } else {
        transport.reset_board()?;
    }

    let sign_on = transport
        .sign_on()
        .context("Is the board running the bootloader? Try resetting it by hand with --no-reset")?;
    log::info!("Connected to bootloader on {}", transport.port_name());

    match cli.command {
        Commands::Info => commands::info(&mut transport, &sign_on),
        Commands::Upload { file, no_verify } => commands::upload(&mut transport, &file, !no_verify),
        Commands::Read {
            file,
            size,
            address,
        } => commands::read(&mut transport, address, size, &file),
        Commands::Reset => commands::reset(&mut transport),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_parse_in_decimal_and_hex() {
        assert_eq!(parse_u32("4096"), Ok(4096));
        assert_eq!(parse_u32("0x3C000"), Ok(0x3C000));
        assert_eq!(parse_u32("0X10"), Ok(16));
        assert!(parse_u32("0xZZ").is_err());
        assert!(parse_u32("ten").is_err());
    }

    #[test]
    fn read_requires_size() {
        assert!(Cli::try_parse_from(["stkboot-upload", "-p", "/dev/null", "read", "out.bin"]).is_err());

        let cli = Cli::try_parse_from([
            "stkboot-upload", "-p", "/dev/null", "-vv", "read", "out.bin", "--size", "0x100",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Read { size, address, .. } => {
                assert_eq!(size, 0x100);
                assert_eq!(address, 0);
            }
            _ => panic!("expected read"),
        }
    }
}
