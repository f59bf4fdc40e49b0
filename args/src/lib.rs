// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Command line handling: the bounded argument list handed to the engine at startup and the
//! options of the `pktgen` binary.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub use clap::Parser;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use tracing::debug;

/// Most arguments an [`ArgList`] holds.
pub const ARGV_MAX_NUM: usize = 64;
/// Longest argument, in bytes, including room for a terminator.
pub const ARGV_MAX_SIZE: usize = 128;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ArgError {
    #[error("too many arguments: at most {ARGV_MAX_NUM} are accepted")]
    TooMany,
    #[error("argument of {0} bytes is longer than {max}", max = ARGV_MAX_SIZE - 1)]
    TooLong(usize),
}

/// Arguments collected for the engine, bounded in count and length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgList {
    args: Vec<String>,
}

impl ArgList {
    #[must_use]
    pub const fn new() -> Self {
        ArgList { args: Vec::new() }
    }

    /// Append one argument. A rejected argument leaves the list unchanged.
    pub fn push(&mut self, arg: &str) -> Result<(), ArgError> {
        if self.args.len() >= ARGV_MAX_NUM {
            return Err(ArgError::TooMany);
        }
        if arg.len() >= ARGV_MAX_SIZE {
            return Err(ArgError::TooLong(arg.len()));
        }
        debug!("argv[{}] = {arg}", self.args.len());
        self.args.push(arg.to_string());
        Ok(())
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.args
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn clear(&mut self) {
        self.args.clear();
    }
}

impl Display for ArgList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} args, argv:", self.args.len())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

fn parse_map(input: &str) -> Result<String, String> {
    l2p::parse_maps(&[input]).map_err(|e| e.to_string())?;
    Ok(input.to_string())
}

fn parse_channel_size(input: &str) -> Result<usize, String> {
    let size: usize = input
        .parse()
        .map_err(|e| format!("bad channel size '{input}': {e}"))?;
    if size == 0 || !size.is_power_of_two() {
        return Err(format!("channel size must be a power of two, got {size}"));
    }
    Ok(size)
}

#[derive(Parser, Debug)]
#[command(name = "pktgen")]
#[command(version)]
#[command(about = "Packet engine control plane over software ports", long_about = None)]
#[allow(clippy::struct_excessive_bools)]
pub struct CmdArgs {
    #[arg(
        long,
        value_name = "MAP",
        value_parser = parse_map,
        help = "Core to port map, e.g. [1:2-3].0 or 1.0 (repeatable)"
    )]
    map: Vec<String>,

    #[arg(long, help = "Leave ports out of promiscuous mode")]
    no_promiscuous: bool,

    #[arg(long, short, help = "Log at debug level")]
    verbose: bool,

    #[arg(long, value_name = "PATH", help = "Write the log to this file")]
    log: Option<PathBuf>,

    #[arg(
        long,
        value_name = "N",
        default_value_t = 1024,
        value_parser = parse_channel_size,
        help = "Capacity of the control channel rings (power of two)"
    )]
    channel_size: usize,

    #[arg(long, value_name = "N", default_value_t = 32, help = "Receive burst size")]
    burst: u16,

    #[arg(
        long,
        value_name = "MS",
        default_value_t = 10,
        help = "Pause between polls of the control channel"
    )]
    poll_interval_ms: u64,

    #[arg(long, value_name = "N", default_value_t = 1, help = "Number of software ports")]
    ports: u16,

    #[arg(long, value_name = "CORE", default_value_t = 0, help = "Core running the control loop")]
    main_core: u16,

    #[arg(long, help = "Also run a worker on the main core")]
    call_main: bool,

    #[arg(long, help = "Skip the check for root privileges")]
    allow_unprivileged: bool,

    #[arg(long, value_name = "MS", help = "Stop after this many milliseconds")]
    run_for_ms: Option<u64>,

    #[arg(last = true, value_name = "ARGS", help = "Arguments handed to the engine")]
    engine_args: Vec<String>,
}

impl CmdArgs {
    pub fn maps(&self) -> &[String] {
        &self.map
    }
    pub fn promiscuous(&self) -> bool {
        !self.no_promiscuous
    }
    pub fn verbose(&self) -> bool {
        self.verbose
    }
    pub fn log(&self) -> Option<&PathBuf> {
        self.log.as_ref()
    }
    pub fn channel_size(&self) -> usize {
        self.channel_size
    }
    pub fn burst(&self) -> u16 {
        self.burst
    }
    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms
    }
    pub fn ports(&self) -> u16 {
        self.ports
    }
    pub fn main_core(&self) -> u16 {
        self.main_core
    }
    pub fn call_main(&self) -> bool {
        self.call_main
    }
    pub fn require_root(&self) -> bool {
        !self.allow_unprivileged
    }
    pub fn run_for_ms(&self) -> Option<u64> {
        self.run_for_ms
    }

    /// The program name followed by the trailing arguments, as an [`ArgList`].
    pub fn arg_list(&self, program: &str) -> Result<ArgList, ArgError> {
        let mut list = ArgList::new();
        list.push(program)?;
        for arg in &self.engine_args {
            list.push(arg)?;
        }
        Ok(list)
    }
}
