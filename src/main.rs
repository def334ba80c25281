//! Binary entrypoint for the ncpd CLI.
//!
//! Commands:
//! - `start [--port <path>]` - hold the NCP link open and run the task engine until Ctrl-C
//! - `init` - write a starter `ncpd.toml`
//! - `scan [--channels 11-26] [--delay <ms>] [--energy]` - beacon or energy scan
//! - `add-eidcache <EID> <MLIID> <RLOC16>` - insert an EID-to-RLOC cache entry
//! - `get-prop <id>` / `set-prop <id> <hex>` - read or write one property
//!
//! One-shot commands print a JSON reply and exit with its code
//! (0 ok, 2 bad argument, 4 timeout, 5 other failure).
use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};

use ncpd::config::Config;
use ncpd::control::{ControlCommand, ControlReply};
use ncpd::validation::{parse_channel_list, parse_hex_data, parse_property, ArgumentError};
#[cfg(feature = "serial")]
use ncpd::{
    control, metrics,
    ncp::{start_driver, NcpDriver, NcpInstance, SerialTransport},
    spinel::SpinelCodec,
};

#[derive(Parser)]
#[command(name = "ncpd")]
#[command(about = "Task engine daemon for Spinel network co-processors")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "ncpd.toml", global = true)]
    config: String,

    /// NCP serial port, overriding the configured one
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the task engine against the NCP until interrupted
    Start,
    /// Write a default configuration file
    Init,
    /// Scan for networks (or channel energy)
    Scan {
        /// Channels to scan, e.g. "11,15,20" or "11-26"
        #[arg(long)]
        channels: Option<String>,
        /// Per-channel dwell time in milliseconds
        #[arg(short, long)]
        delay: Option<u32>,
        /// Energy-detect scan instead of an active beacon scan
        #[arg(short, long)]
        energy: bool,
    },
    /// Add an EID-to-RLOC mapping to the NCP address cache
    #[command(name = "add-eidcache")]
    AddEidCache {
        /// IPv6 address or hex data
        eid: String,
        /// Mesh-local interface identifier (hex, up to 8 bytes)
        mliid: String,
        /// RLOC16 (hex, up to 2 bytes)
        rloc16: String,
    },
    /// Read one property
    GetProp {
        /// Property id (decimal, 0x hex or name)
        prop: String,
    },
    /// Write one property
    SetProp {
        prop: String,
        /// Value as hex data
        value: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match run(cli, pre_config).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli, pre_config: Option<Config>) -> Result<ExitCode> {
    match cli.command {
        Commands::Init => {
            if std::path::Path::new(&cli.config).exists() {
                return Err(anyhow!("{} already exists, not overwriting", cli.config));
            }
            Config::create_default(&cli.config).await?;
            println!("Wrote default configuration to {}", cli.config);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Start => {
            let config = load_or_default(pre_config, &cli.config);
            run_daemon(config, cli.port).await?;
            Ok(ExitCode::SUCCESS)
        }
        command => {
            let config = load_or_default(pre_config, &cli.config);
            let control = match build_command(command, &config) {
                Ok(c) => c,
                Err(reply) => return Ok(print_reply(&reply)),
            };
            let reply = run_once(config, cli.port, control).await?;
            Ok(print_reply(&reply))
        }
    }
}

fn load_or_default(pre_config: Option<Config>, path: &str) -> Config {
    pre_config.unwrap_or_else(|| {
        warn!("No usable config at {}, using defaults", path);
        Config::default()
    })
}

/// Turn CLI arguments into a control command; argument errors become a reply.
fn build_command(command: Commands, config: &Config) -> Result<ControlCommand, ControlReply> {
    match command {
        Commands::Scan {
            channels,
            delay,
            energy,
        } => {
            let channels = match channels {
                Some(list) => parse_channel_list(&list)
                    .map_err(|e| ControlReply::bad_argument("scan", e.to_string()))?,
                None => config.scan.channels.clone(),
            };
            Ok(ControlCommand::Scan {
                channels,
                delay_ms: delay.unwrap_or(config.scan.delay_ms),
                energy,
            })
        }
        Commands::AddEidCache { eid, mliid, rloc16 } => {
            ControlCommand::add_eid_cache(&eid, &mliid, &rloc16)
                .map_err(|e| ControlReply::bad_argument("add-eidcache", e.to_string()))
        }
        Commands::GetProp { prop } => parse_property(&prop)
            .map(|prop| ControlCommand::GetProperty { prop })
            .map_err(|e| ControlReply::bad_argument("get-prop", e.to_string())),
        Commands::SetProp { prop, value } => {
            let bad = |e: ArgumentError| ControlReply::bad_argument("set-prop", e.to_string());
            let prop = parse_property(&prop).map_err(bad)?;
            let value = parse_hex_data("value", &value, 2048).map_err(bad)?;
            Ok(ControlCommand::SetProperty { prop, value })
        }
        Commands::Start | Commands::Init => Err(ControlReply::bad_argument("cli", "not a control command")),
    }
}

fn print_reply(reply: &ControlReply) -> ExitCode {
    match serde_json::to_string_pretty(reply) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("error: cannot render reply: {}", e),
    }
    ExitCode::from(reply.exit_code() as u8)
}

#[cfg(feature = "serial")]
fn new_instance(config: &Config) -> NcpInstance {
    NcpInstance::new(SpinelCodec::new(config.ncp.interface_id), config.ncp.tuning())
}

#[cfg(feature = "serial")]
async fn run_once(config: Config, port: Option<String>, command: ControlCommand) -> Result<ControlReply> {
    let port = port.unwrap_or_else(|| config.ncp.port.clone());
    let transport = SerialTransport::open(&port, config.ncp.baud_rate, config.ncp.read_timeout())?;
    let (handle, driver) = start_driver(new_instance(&config), transport, config.ncp.driver_tuning());
    let reply = control::execute(&handle, command).await;
    handle.shutdown().await;
    driver.await.map_err(|e| anyhow!("driver task failed: {}", e))??;
    Ok(reply)
}

#[cfg(not(feature = "serial"))]
async fn run_once(_config: Config, _port: Option<String>, _command: ControlCommand) -> Result<ControlReply> {
    Err(anyhow!("built without the `serial` feature; no NCP transport available"))
}

#[cfg(feature = "serial")]
async fn run_daemon(config: Config, port: Option<String>) -> Result<()> {
    info!("Starting ncpd v{}", env!("CARGO_PKG_VERSION"));
    let port = port.unwrap_or_else(|| config.ncp.port.clone());
    let read_timeout = config.ncp.read_timeout();

    let (transport, link_up) = match SerialTransport::open(&port, config.ncp.baud_rate, read_timeout) {
        Ok(t) => (t, true),
        Err(e) if config.ncp.require_device_at_startup => return Err(e),
        Err(e) => {
            warn!("{} (continuing, will retry)", e);
            (SerialTransport::closed(&port, config.ncp.baud_rate, read_timeout), false)
        }
    };

    let (driver, handle) = NcpDriver::new(new_instance(&config), transport, config.ncp.driver_tuning());
    let driver = if link_up { driver } else { driver.with_link_down() };
    let join = tokio::spawn(driver.run());

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow!("Failed to listen for Ctrl-C: {}", e))?;
    info!("Interrupted, shutting down");
    if let Some(stats) = handle.snapshot().await {
        info!(
            "final stats: submitted={} ok={} timeout={} cancelled={} proto_err={}",
            stats.submitted, stats.succeeded, stats.timed_out, stats.cancelled, stats.protocol_errors
        );
    }
    handle.shutdown().await;
    join.await.map_err(|e| anyhow!("driver task failed: {}", e))??;
    info!("metrics: {:?}", metrics::snapshot());
    Ok(())
}

#[cfg(not(feature = "serial"))]
async fn run_daemon(_config: Config, _port: Option<String>) -> Result<()> {
    Err(anyhow!("built without the `serial` feature; no NCP transport available"))
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // -v overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config.as_ref().and_then(|c| c.logging.file.as_ref()).and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Mirror to the console only when someone is watching it
        let is_tty = atty::is(atty::Stream::Stderr);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            writeln!(
                fmt,
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.args()
            )
        });
    }
    let _ = builder.try_init();
}
