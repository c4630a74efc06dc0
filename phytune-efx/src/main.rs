//! # SERDES Tuning for Solarflare Adapters
//!
//! Command line tool to read and write the receive and transmit equalization of the
//! SERDES lanes of a Solarflare network adapter, to restart calibration and to acquire
//! eye diagrams.
//!
//! ## Overview
//!
//! Requests are passed to the management controller of the adapter through the `sfc` driver.
//! This requires `CAP_NET_ADMIN`.
//!
//! ```text
//! sfphytune eth2 rxeq                      # show receive equalization
//! sfphytune eth2 rxeq Lane0.CTLE_Boost=3+  # set a value, enabling autocal
//! sfphytune eth2 txeq Lane1.Amplitude=0x20
//! sfphytune eth2 calibrate
//! sfphytune eth2 eye --timeout-ms 60000
//! ```
pub mod backends;

use std::error::Error;
use std::io::{self, Write};
use std::time::Duration;

use clap::{Parser, Subcommand};
use env_logger::Env;
use phytune_client::client::{Builder, TuneClient};
use phytune_client::{Transport, error::RpcError, eye_scan::ScanState};
use phytune_protocol::{
    EyeSamplePair, KrTuneOp, Lane, Namespace, ParameterSetting, TunedParameter,
    error::DecodeError,
};

use crate::backends::efx_ioctl::EfxIoctlTransport;

#[derive(Subcommand, Eq, PartialEq, Clone, Debug)]
enum Command {
    /// Show the receive equalization, or set a single parameter
    Rxeq {
        /// Parameter to set, e.g. Lane0.DFE_Tap1=12 or Lane0.DFE_Tap1=12+ to enable autocal
        setting: Option<String>,
    },
    /// Show the transmit equalization, or set a single parameter
    Txeq {
        /// Parameter to set, e.g. Lane1.Amplitude=0x20
        setting: Option<String>,
    },
    /// Restart calibration of all parameters with autocal enabled
    Calibrate,
    /// Acquire an eye diagram, printing one line per batch of samples
    Eye {
        #[arg(
            short,
            long,
            help = "Lane to scan instead of the active lane",
            value_parser = parse_lane
        )]
        lane: Option<u8>,
        #[arg(short, long, help = "Abandon the scan after this many milliseconds")]
        timeout_ms: Option<u64>,
    },
}

#[derive(Parser)]
#[command(name = "sfphytune", about = "SERDES tuning and eye scan for Solarflare network adapters", long_about = None)]
struct Args {
    /// The network interface of the adapter
    ifname: String,

    #[clap(subcommand)]
    command: Command,
}

fn parse_lane(s: &str) -> Result<u8, String> {
    clap_num::number_range(s, 0, Lane::MAX_WIRE)
}

/// Prefixes an error with the sub-command that caused it.
fn context(op: KrTuneOp) -> impl FnOnce(RpcError) -> Box<dyn Error> {
    move |e| format!("{}: {}", op, e).into()
}

fn print_parameters(
    out: &mut impl Write,
    entries: &[Result<TunedParameter, DecodeError>],
) -> io::Result<()> {
    for entry in entries {
        match entry {
            Ok(param) => writeln!(out, "{}", param)?,
            Err(unknown) => writeln!(out, "{}", unknown)?,
        }
    }
    Ok(())
}

fn print_eye_batch(out: &mut impl Write, batch: &[EyeSamplePair]) -> io::Result<()> {
    let line = batch
        .iter()
        .map(EyeSamplePair::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(out, "{}", line)?;
    out.flush()
}

fn equalization<T: Transport>(
    client: &TuneClient<T>,
    namespace: Namespace,
    setting: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let (get_op, set_op) = match namespace {
        Namespace::RxEq => (KrTuneOp::RxEqGet, KrTuneOp::RxEqSet),
        Namespace::TxEq => (KrTuneOp::TxEqGet, KrTuneOp::TxEqSet),
    };
    match setting {
        Some(text) => {
            let setting = ParameterSetting::parse(text, namespace)
                .map_err(|e| format!("parse error: {}", e))?;
            client.set_parameter(&setting).map_err(context(set_op))?;
        }
        None => {
            let entries = client.get_parameters(namespace).map_err(context(get_op))?;
            print_parameters(&mut io::stdout().lock(), &entries)?;
        }
    }
    Ok(())
}

/// Names the sub-command an eye scan failed in. A deadline is not tied to any request.
fn eye_scan_error(failed_in: Option<ScanState>, error: RpcError) -> Box<dyn Error> {
    if matches!(error, RpcError::DeadlineExceeded) {
        return error.into();
    }
    let op = match failed_in {
        Some(ScanState::Idle) => KrTuneOp::RxEqGet,
        Some(ScanState::LaneResolved(_)) => KrTuneOp::StartEyePlot,
        _ => KrTuneOp::PollEyePlot,
    };
    context(op)(error)
}

fn eye<T: Transport>(client: &TuneClient<T>, lane: Option<u8>) -> Result<(), Box<dyn Error>> {
    let mut scan = client.eye_scan();
    if let Some(lane) = lane.and_then(Lane::new) {
        scan = scan.with_lane(lane);
    }
    let mut out = io::stdout().lock();
    while let Some(batch) = scan.next() {
        match batch {
            Ok(samples) => print_eye_batch(&mut out, &samples)?,
            Err(e) => return Err(eye_scan_error(scan.failed_in(), e)),
        }
    }
    Ok(())
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let mut builder = Builder::new();
    if let Command::Eye {
        timeout_ms: Some(timeout_ms),
        ..
    } = args.command
    {
        builder = builder.eye_scan_timeout(Duration::from_millis(timeout_ms));
    }
    let client = builder.build(EfxIoctlTransport::new(), args.ifname);

    match args.command {
        Command::Rxeq { setting } => equalization(&client, Namespace::RxEq, setting.as_deref()),
        Command::Txeq { setting } => equalization(&client, Namespace::TxEq, setting.as_deref()),
        Command::Calibrate => client.recalibrate().map_err(context(KrTuneOp::Recal)),
        Command::Eye { lane, .. } => eye(&client, lane),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    log::debug!(
        "Parsed arguments: ifname={}, command={:?}",
        args.ifname,
        args.command
    );

    run(args)
}
