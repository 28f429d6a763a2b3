//! Command-line surface and its parsers.

use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;

use capture_core::CaptureConfig;
use dvb::Property;
use dvb::properties::{
    DTV_BANDWIDTH_HZ, DTV_CODE_RATE_HP, DTV_CODE_RATE_LP, DTV_DELIVERY_SYSTEM, DTV_FREQUENCY,
    DTV_GUARD_INTERVAL, DTV_HIERARCHY, DTV_INNER_FEC, DTV_INVERSION, DTV_MODULATION, DTV_PILOT,
    DTV_ROLLOFF, DTV_SYMBOL_RATE, DTV_TRANSMISSION_MODE,
};

#[derive(Parser, Debug)]
#[command(
    name = "dvbrec",
    version,
    about = "Record a DVB transport stream to a file",
    after_help = "Tuning properties take the numeric DVB property code or its DTV_* name,\n\
                  e.g. --prop DTV_FREQUENCY=562000000 --prop DTV_DELIVERY_SYSTEM=3.\n\
                  Clear/tune markers and a default 8 MHz bandwidth are supplied automatically."
)]
pub struct Args {
    /// Destination file for the captured transport stream
    pub output: PathBuf,

    /// DVB adapter index (/dev/dvb/adapterN)
    #[arg(short, long, default_value_t = 0)]
    pub adapter: u32,

    /// Frontend index under the adapter
    #[arg(short, long, default_value_t = 0)]
    pub frontend: u32,

    /// Demux index under the adapter
    #[arg(short, long, default_value_t = 0)]
    pub demux: u32,

    /// DVR index under the adapter
    #[arg(long, default_value_t = 0)]
    pub dvr: u32,

    /// Tuning property as CODE=VALUE; repeatable
    #[arg(short = 'p', long = "prop", value_name = "CODE=VALUE", value_parser = parse_property)]
    pub props: Vec<Property>,

    /// Comma-separated PIDs to capture (decimal or 0x hex); omit for the whole multiplex
    #[arg(long, value_delimiter = ',', value_parser = parse_pid)]
    pub pids: Vec<u16>,

    /// Start of the capture window as local HH:MM[:SS]; omit to start now
    #[arg(long, value_name = "HH:MM")]
    pub start: Option<TimeOfDay>,

    /// End of the capture window as local HH:MM[:SS]; omit to record until interrupted
    #[arg(long, value_name = "HH:MM")]
    pub end: Option<TimeOfDay>,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,

    /// Log errors only
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Cross-argument validation, after clap has accepted the shape.
    pub fn to_config(&self) -> Result<CaptureConfig, String> {
        if self.props.is_empty() {
            return Err("no tuning properties given; at least a frequency is required".into());
        }
        if !self.props.iter().any(|p| p.code == DTV_FREQUENCY) {
            return Err("tuning properties do not include DTV_FREQUENCY".into());
        }
        if let Some(parent) = self.output.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(format!(
                    "output directory '{}' does not exist",
                    parent.display()
                ));
            }
        }
        Ok(CaptureConfig {
            adapter: self.adapter,
            frontend: self.frontend,
            demux: self.demux,
            dvr: self.dvr,
            output: self.output.clone(),
            properties: self.props.clone(),
            pids: self.pids.clone(),
        })
    }
}

/// A local wall-clock time, stored as seconds since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay(pub u32);

impl FromStr for TimeOfDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let hours: u32 = next_field(&mut parts, s)?;
        let minutes: u32 = next_field(&mut parts, s)?;
        let seconds: u32 = match parts.next() {
            Some(field) => field
                .parse()
                .map_err(|_| format!("invalid time '{s}', expected HH:MM or HH:MM:SS"))?,
            None => 0,
        };
        if parts.next().is_some() || hours > 23 || minutes > 59 || seconds > 59 {
            return Err(format!("invalid time '{s}', expected HH:MM or HH:MM:SS"));
        }
        Ok(TimeOfDay(hours * 3600 + minutes * 60 + seconds))
    }
}

fn next_field<'a>(parts: &mut impl Iterator<Item = &'a str>, whole: &str) -> Result<u32, String> {
    parts
        .next()
        .and_then(|field| field.parse().ok())
        .ok_or_else(|| format!("invalid time '{whole}', expected HH:MM or HH:MM:SS"))
}

fn parse_property(s: &str) -> Result<Property, String> {
    let (code, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected CODE=VALUE, got '{s}'"))?;
    Ok(Property::new(parse_code(code.trim())?, parse_u32(value.trim())?))
}

fn parse_code(s: &str) -> Result<u32, String> {
    let named = match s {
        "DTV_FREQUENCY" => Some(DTV_FREQUENCY),
        "DTV_MODULATION" => Some(DTV_MODULATION),
        "DTV_BANDWIDTH_HZ" => Some(DTV_BANDWIDTH_HZ),
        "DTV_INVERSION" => Some(DTV_INVERSION),
        "DTV_SYMBOL_RATE" => Some(DTV_SYMBOL_RATE),
        "DTV_INNER_FEC" => Some(DTV_INNER_FEC),
        "DTV_PILOT" => Some(DTV_PILOT),
        "DTV_ROLLOFF" => Some(DTV_ROLLOFF),
        "DTV_DELIVERY_SYSTEM" => Some(DTV_DELIVERY_SYSTEM),
        "DTV_CODE_RATE_HP" => Some(DTV_CODE_RATE_HP),
        "DTV_CODE_RATE_LP" => Some(DTV_CODE_RATE_LP),
        "DTV_GUARD_INTERVAL" => Some(DTV_GUARD_INTERVAL),
        "DTV_TRANSMISSION_MODE" => Some(DTV_TRANSMISSION_MODE),
        "DTV_HIERARCHY" => Some(DTV_HIERARCHY),
        _ => None,
    };
    match named {
        Some(code) => Ok(code),
        None => parse_u32(s).map_err(|_| format!("unknown property code '{s}'")),
    }
}

fn parse_pid(s: &str) -> Result<u16, String> {
    let pid = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .map_err(|_| format!("invalid PID '{s}'"))?;
    // 13-bit PID space plus the whole-mux wildcard
    if pid > 0x2000 {
        return Err(format!("PID {pid:#x} out of range (max 0x2000)"));
    }
    Ok(pid)
}

fn parse_u32(s: &str) -> Result<u32, String> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .map_err(|_| format!("invalid number '{s}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_and_numeric_properties() {
        assert_eq!(
            parse_property("DTV_FREQUENCY=562000000").unwrap(),
            Property::new(DTV_FREQUENCY, 562_000_000)
        );
        assert_eq!(parse_property("17=3").unwrap(), Property::new(17, 3));
        assert_eq!(
            parse_property("DTV_SYMBOL_RATE=0x6978").unwrap(),
            Property::new(DTV_SYMBOL_RATE, 0x6978)
        );
        assert!(parse_property("DTV_FREQUENCY").is_err());
        assert!(parse_property("DTV_NOPE=1").is_err());
    }

    #[test]
    fn parses_pids_in_both_bases() {
        assert_eq!(parse_pid("256").unwrap(), 256);
        assert_eq!(parse_pid("0x1fff").unwrap(), 0x1fff);
        assert_eq!(parse_pid("0x2000").unwrap(), 0x2000);
        assert!(parse_pid("0x2001").is_err());
        assert!(parse_pid("abc").is_err());
    }

    #[test]
    fn parses_times_of_day() {
        assert_eq!("00:00".parse::<TimeOfDay>().unwrap(), TimeOfDay(0));
        assert_eq!("23:59".parse::<TimeOfDay>().unwrap(), TimeOfDay(86_340));
        assert_eq!("06:30:15".parse::<TimeOfDay>().unwrap(), TimeOfDay(23_415));
        assert!("24:00".parse::<TimeOfDay>().is_err());
        assert!("12:60".parse::<TimeOfDay>().is_err());
        assert!("12".parse::<TimeOfDay>().is_err());
        assert!("12:00:00:00".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn config_requires_a_frequency() {
        let mut args = Args::parse_from(["dvbrec", "out.mts"]);
        assert!(args.to_config().is_err());
        args.props = vec![Property::new(DTV_MODULATION, 3)];
        assert!(args.to_config().is_err());
        args.props.push(Property::new(DTV_FREQUENCY, 562_000_000));
        assert!(args.to_config().is_ok());
    }
}
