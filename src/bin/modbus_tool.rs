// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command line Modbus RTU master.

use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;

use modbus_rtu_client::{
    Client, Error, Parity, Port, ReadFileGroup, RtuTransport, StopBits, SystemPort, Transport,
    WriteFileGroup, BROADCAST_SLAVE_ID,
};

/// The time to wait for the first response byte.
const TIMEOUT: Duration = Duration::from_secs(1);

/// Talk to Modbus slaves over a serial RTU line.
#[derive(Debug, Parser)]
#[command(name = "modbus-tool", version, about)]
struct Cli {
    /// Serial device, e.g. /dev/ttyUSB0
    port: String,

    /// Line settings as <baud>[N|E|O][1|2], e.g. 19200E1
    #[arg(short = 's', long = "serial", default_value = "9600N1")]
    serial: LineSettings,

    /// Slave address; 0 broadcasts write commands
    #[arg(value_parser = parse_slave_id)]
    slave_id: u8,

    /// read-coils, read-inputs, read-holding-registers,
    /// read-input-registers, write-coils, write-registers,
    /// write-single-coil, write-single-register, write-multiple-coils,
    /// write-multiple-registers, read-file-record, write-file-record,
    /// mask-write-register, read-write-registers
    command: String,

    /// Command arguments; decimal or 0x-prefixed hexadecimal.
    /// write-file-record groups are terminated by ';'.
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

#[derive(Debug, Clone)]
struct LineSettings {
    baud_rate: u32,
    parity: Parity,
    stop_bits: StopBits,
}

impl FromStr for LineSettings {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits_end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let baud_rate = s[..digits_end]
            .parse()
            .map_err(|_| format!("bad baud rate in {s:?}"))?;
        let mut settings = Self {
            baud_rate,
            parity: Parity::None,
            stop_bits: StopBits::One,
        };
        let mut rest = s[digits_end..].chars();
        if let Some(c) = rest.next() {
            settings.parity = c
                .to_string()
                .parse()
                .map_err(|()| format!("bad parity in {s:?}"))?;
        }
        if let Some(c) = rest.next() {
            settings.stop_bits = c
                .to_string()
                .parse()
                .map_err(|()| format!("bad stop bits in {s:?}"))?;
        }
        if rest.next().is_some() {
            return Err(format!("trailing characters in {s:?}"));
        }
        Ok(settings)
    }
}

fn parse_u16(src: &str) -> Result<u16> {
    let parsed = if let Some(hex) = src.strip_prefix("0x").or_else(|| src.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16)
    } else {
        src.parse()
    };
    parsed.map_err(|_| anyhow!("expected a 16 bit integer, got {src:?}"))
}

fn parse_slave_id(src: &str) -> Result<u8, String> {
    parse_u16(src)
        .ok()
        .and_then(|id| u8::try_from(id).ok())
        .filter(|id| *id <= 247)
        .ok_or_else(|| format!("expected a slave address in 0..=247, got {src:?}"))
}

/// Scanner over the raw command tail.
struct Args<'a> {
    iter: std::slice::Iter<'a, String>,
}

impl<'a> Args<'a> {
    fn new(args: &'a [String]) -> Self {
        Self { iter: args.iter() }
    }

    fn is_empty(&self) -> bool {
        self.iter.as_slice().is_empty()
    }

    fn next(&mut self) -> Result<&'a str> {
        self.iter
            .next()
            .map(String::as_str)
            .context("missing argument")
    }

    fn next_u16(&mut self) -> Result<u16> {
        parse_u16(self.next()?)
    }

    /// All remaining arguments as 16 bit values.
    fn rest_u16(&mut self) -> Result<Vec<u16>> {
        let mut values = Vec::new();
        while !self.is_empty() {
            values.push(self.next_u16()?);
        }
        Ok(values)
    }

    /// The next value of a file record group, `None` at a `;` terminator
    /// or the end of the arguments.
    fn next_group_u16(&mut self) -> Result<Option<u16>> {
        match self.iter.next().map(String::as_str) {
            None | Some(";") => Ok(None),
            Some(arg) => parse_u16(arg).map(Some),
        }
    }
}

fn show_bits(address: u16, values: &[u8]) {
    for (i, value) in values.iter().enumerate() {
        println!("{:#06X}: {value}", address.wrapping_add(i as u16));
    }
}

fn show_regs(address: u16, values: &[u16]) {
    for (i, value) in values.iter().enumerate() {
        println!(
            "{:#06X}: {value:#06X} ({value})",
            address.wrapping_add(i as u16)
        );
    }
}

/// Whether `command` only writes and may therefore be broadcast.
///
/// A broadcast read can never produce data: nothing answers slave 0, so
/// it must fail loudly instead of presenting an untouched buffer as a
/// response. This keeps read-write-registers out as well.
fn is_write_command(command: &str) -> bool {
    matches!(
        command,
        "write-coils"
            | "write-registers"
            | "write-single-coil"
            | "write-single-register"
            | "write-multiple-coils"
            | "write-multiple-registers"
            | "write-file-record"
            | "mask-write-register"
    )
}

/// Map a transaction result into the process outcome.
///
/// For a broadcast write the immediate timeout means the request went out
/// and there is nothing more to wait for.
fn check(result: Result<(), Error>, broadcast: bool) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(Error::Timeout) if broadcast => Ok(()),
        Err(err) => match err.code() {
            Some(code) => Err(anyhow!("modbus error {code:#x}: {err}")),
            None => Err(anyhow!(err)),
        },
    }
}

fn run<T: Transport>(client: &mut Client<T>, cli: &Cli) -> Result<()> {
    let slave = cli.slave_id;
    let mut args = Args::new(&cli.args);

    // Broadcast writes are fire and forget: send with a zero timeout and
    // let `check` treat the immediate timeout as completion. Reads keep
    // the normal timeout even on slave 0 and report it as the error it
    // is.
    let broadcast = slave == BROADCAST_SLAVE_ID && is_write_command(&cli.command);
    let timeout = if broadcast { Duration::ZERO } else { TIMEOUT };

    match cli.command.as_str() {
        "read-coils" => {
            let address = args.next_u16()?;
            let mut values = vec![0u8; args.next_u16()? as usize];
            check(
                client.read_coils(slave, address, &mut values, timeout),
                broadcast,
            )?;
            show_bits(address, &values);
        }
        "read-inputs" => {
            let address = args.next_u16()?;
            let mut values = vec![0u8; args.next_u16()? as usize];
            check(
                client.read_discrete_inputs(slave, address, &mut values, timeout),
                broadcast,
            )?;
            show_bits(address, &values);
        }
        "read-holding-registers" => {
            let address = args.next_u16()?;
            let mut values = vec![0u16; args.next_u16()? as usize];
            check(
                client.read_holding_registers(slave, address, &mut values, timeout),
                broadcast,
            )?;
            show_regs(address, &values);
        }
        "read-input-registers" => {
            let address = args.next_u16()?;
            let mut values = vec![0u16; args.next_u16()? as usize];
            check(
                client.read_input_registers(slave, address, &mut values, timeout),
                broadcast,
            )?;
            show_regs(address, &values);
        }
        "write-single-coil" => {
            let address = args.next_u16()?;
            let value = args.next_u16()? != 0;
            check(
                client.write_single_coil(slave, address, value, timeout),
                broadcast,
            )?;
        }
        "write-single-register" => {
            let address = args.next_u16()?;
            let value = args.next_u16()?;
            check(
                client.write_single_register(slave, address, value, timeout),
                broadcast,
            )?;
        }
        "write-multiple-coils" => {
            let address = args.next_u16()?;
            let values: Vec<bool> = args.rest_u16()?.iter().map(|v| *v != 0).collect();
            check(
                client.write_multiple_coils(slave, address, &values, timeout),
                broadcast,
            )?;
        }
        "write-multiple-registers" => {
            let address = args.next_u16()?;
            let values = args.rest_u16()?;
            check(
                client.write_multiple_registers(slave, address, &values, timeout),
                broadcast,
            )?;
        }
        "write-coils" => {
            let address = args.next_u16()?;
            let values: Vec<bool> = args.rest_u16()?.iter().map(|v| *v != 0).collect();
            check(
                client.write_coils(slave, address, &values, timeout),
                broadcast,
            )?;
        }
        "write-registers" => {
            let address = args.next_u16()?;
            let values = args.rest_u16()?;
            check(
                client.write_registers(slave, address, &values, timeout),
                broadcast,
            )?;
        }
        "read-file-record" => {
            let mut specs = Vec::new();
            let mut data: Vec<Vec<u16>> = Vec::new();
            while !args.is_empty() {
                let file_number = args.next_u16()?;
                let address = args.next_u16()?;
                let length = args.next_u16()?;
                specs.push((file_number, address));
                data.push(vec![0; length as usize]);
            }
            let mut groups: Vec<ReadFileGroup<'_>> = specs
                .iter()
                .zip(data.iter_mut())
                .map(|(&(file_number, address), data)| ReadFileGroup {
                    file_number,
                    address,
                    data,
                })
                .collect();
            check(
                client.read_file_record(slave, &mut groups, timeout),
                broadcast,
            )?;
            drop(groups);
            for (&(file_number, address), values) in specs.iter().zip(&data) {
                println!("FILE {file_number:#06X}:");
                show_regs(address, values);
            }
        }
        "write-file-record" => {
            let mut specs = Vec::new();
            let mut data: Vec<Vec<u16>> = Vec::new();
            while !args.is_empty() {
                let file_number = args.next_u16()?;
                let address = args.next_u16()?;
                let mut values = Vec::new();
                while let Some(value) = args.next_group_u16()? {
                    values.push(value);
                }
                specs.push((file_number, address));
                data.push(values);
            }
            let groups: Vec<WriteFileGroup<'_>> = specs
                .iter()
                .zip(&data)
                .map(|(&(file_number, address), data)| WriteFileGroup {
                    file_number,
                    address,
                    data,
                })
                .collect();
            check(
                client.write_file_record(slave, &groups, timeout),
                broadcast,
            )?;
        }
        "mask-write-register" => {
            let address = args.next_u16()?;
            let and_mask = args.next_u16()?;
            let or_mask = args.next_u16()?;
            check(
                client.mask_write_register(slave, address, and_mask, or_mask, timeout),
                broadcast,
            )?;
        }
        "read-write-registers" => {
            let read_address = args.next_u16()?;
            let mut read_values = vec![0u16; args.next_u16()? as usize];
            let write_address = args.next_u16()?;
            let write_values = args.rest_u16()?;
            check(
                client.read_write_registers(
                    slave,
                    write_address,
                    &write_values,
                    read_address,
                    &mut read_values,
                    timeout,
                ),
                broadcast,
            )?;
            show_regs(read_address, &read_values);
        }
        other => bail!("invalid command {other:?}"),
    }
    Ok(())
}

fn try_main(cli: &Cli) -> Result<()> {
    let mut port =
        SystemPort::open(&cli.port).with_context(|| format!("cannot open {}", cli.port))?;
    port.configure(
        cli.serial.baud_rate,
        cli.serial.parity,
        cli.serial.stop_bits,
    )
    .context("cannot configure the serial line")?;

    let mut client = Client::new(RtuTransport::new(port));
    run(&mut client, cli)
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match try_main(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modbus_rtu_client::{FunctionCode, SlaveId};

    #[test]
    fn parse_numbers() {
        assert_eq!(parse_u16("13").unwrap(), 13);
        assert_eq!(parse_u16("0x6B").unwrap(), 0x6B);
        assert_eq!(parse_u16("0XFF00").unwrap(), 0xFF00);
        assert!(parse_u16("65536").is_err());
        assert!(parse_u16("0xG").is_err());
        assert!(parse_u16("").is_err());
    }

    #[test]
    fn parse_slave_ids() {
        assert_eq!(parse_slave_id("0"), Ok(0));
        assert_eq!(parse_slave_id("0x11"), Ok(0x11));
        assert_eq!(parse_slave_id("247"), Ok(247));
        assert!(parse_slave_id("248").is_err());
        assert!(parse_slave_id("abc").is_err());
    }

    #[test]
    fn parse_line_settings() {
        let settings: LineSettings = "9600".parse().unwrap();
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.parity, Parity::None);
        assert_eq!(settings.stop_bits, StopBits::One);

        let settings: LineSettings = "19200E2".parse().unwrap();
        assert_eq!(settings.baud_rate, 19200);
        assert_eq!(settings.parity, Parity::Even);
        assert_eq!(settings.stop_bits, StopBits::Two);

        assert!("E1".parse::<LineSettings>().is_err());
        assert!("9600X1".parse::<LineSettings>().is_err());
        assert!("9600N12".parse::<LineSettings>().is_err());
    }

    #[test]
    fn file_record_group_scanning() {
        let raw: Vec<String> = ["4", "7", "0x06AF", ";", "3", "9", "1", "2"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let mut args = Args::new(&raw);
        assert_eq!(args.next_u16().unwrap(), 4);
        assert_eq!(args.next_u16().unwrap(), 7);
        assert_eq!(args.next_group_u16().unwrap(), Some(0x06AF));
        assert_eq!(args.next_group_u16().unwrap(), None);
        assert_eq!(args.next_u16().unwrap(), 3);
        assert_eq!(args.next_u16().unwrap(), 9);
        assert_eq!(args.next_group_u16().unwrap(), Some(1));
        assert_eq!(args.next_group_u16().unwrap(), Some(2));
        assert_eq!(args.next_group_u16().unwrap(), None);
    }

    /// A transport on a line where nothing ever answers: every
    /// transaction ends in a timeout, exactly as the RTU framer reports a
    /// broadcast or a silent slave.
    #[derive(Default)]
    struct SilentTransport {
        timeouts: Vec<Duration>,
    }

    impl Transport for SilentTransport {
        fn raw_command(
            &mut self,
            _slave_id: SlaveId,
            _function: FunctionCode,
            _buf: &mut [u8],
            _request_len: usize,
            _response_len: usize,
            timeout: Duration,
        ) -> Result<usize, Error> {
            self.timeouts.push(timeout);
            Err(Error::Timeout)
        }
    }

    fn cli(slave_id: u8, command: &str, args: &[&str]) -> Cli {
        Cli {
            port: "/dev/null".to_string(),
            serial: "9600N1".parse().unwrap(),
            slave_id,
            command: command.to_string(),
            args: args.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn broadcast_write_succeeds_on_the_immediate_timeout() {
        let mut client = Client::new(SilentTransport::default());
        run(&mut client, &cli(0, "write-single-register", &["0x01", "0x03"])).unwrap();
        assert_eq!(client.transport_mut().timeouts, [Duration::ZERO]);
    }

    #[test]
    fn broadcast_read_fails_loudly() {
        // A read to slave 0 gets no special treatment: the timeout is the
        // normal one and the resulting error is reported, never an
        // untouched buffer.
        let mut client = Client::new(SilentTransport::default());
        let err = run(
            &mut client,
            &cli(0, "read-holding-registers", &["0x6B", "1"]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("timeout"));
        assert_eq!(client.transport_mut().timeouts, [TIMEOUT]);
    }

    #[test]
    fn broadcast_read_write_registers_fails_loudly() {
        let mut client = Client::new(SilentTransport::default());
        let err = run(
            &mut client,
            &cli(0, "read-write-registers", &["0x10", "1", "0x03", "0x05"]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("timeout"));
        assert_eq!(client.transport_mut().timeouts, [TIMEOUT]);
    }

    #[test]
    fn unicast_write_timeout_is_an_error() {
        let mut client = Client::new(SilentTransport::default());
        let err = run(
            &mut client,
            &cli(0x11, "write-single-register", &["0x01", "0x03"]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("timeout"));
        assert_eq!(client.transport_mut().timeouts, [TIMEOUT]);
    }

    #[test]
    fn write_commands_are_the_broadcastable_set() {
        for command in [
            "write-coils",
            "write-registers",
            "write-single-coil",
            "write-single-register",
            "write-multiple-coils",
            "write-multiple-registers",
            "write-file-record",
            "mask-write-register",
        ] {
            assert!(is_write_command(command), "{command}");
        }
        for command in [
            "read-coils",
            "read-inputs",
            "read-holding-registers",
            "read-input-registers",
            "read-file-record",
            "read-write-registers",
        ] {
            assert!(!is_write_command(command), "{command}");
        }
    }
}
