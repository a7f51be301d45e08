// divine -- command-line tool for a Glensound Divine speaker: watch its
// meters and status, read its identity, send raw control payloads, and
// encode/decode protocol frames offline.
//
// Usage:
//   divine --host 192.168.1.50 monitor --duration 30
//   divine --host 192.168.1.50 info
//   divine --host 192.168.1.50 control 0A0B
//   divine --config divine.toml monitor
//   divine encode get-config --fast-meters
//   divine decode 47532043...
//
// A config file holds the device settings and, optionally, a log filter:
//
//   log_level = "gsctrl_divine=debug"
//
//   [device]
//   host = "192.168.1.50"
//   controller_id = "42495446"
//
// Command-line options override the file.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::EnvFilter;

use gsctrl_core::{ConnectionStatus, DeviceEvent, Variables};
use gsctrl_divine::codec::{self, Frame, MixReport, Opcode, Request};
use gsctrl_divine::state::Level;
use gsctrl_divine::{DeviceConfig, DivineBuilder, DivineSession, channels};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Monitor and control a Glensound Divine from the command line.
#[derive(Parser)]
#[command(name = "divine", version, about)]
struct Cli {
    /// Device IP address or hostname.
    #[arg(long, global = true)]
    host: Option<String>,

    /// Device UDP control port (default 41161).
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Controller id, 8 hex characters (default 42495446).
    #[arg(long, global = true)]
    controller_id: Option<String>,

    /// Request fast meter updates.
    #[arg(long, global = true)]
    fast_meters: bool,

    /// TOML config file with a [device] table.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter (e.g. "debug", "gsctrl_divine=trace"). Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print status, variable, and feedback events as they arrive.
    Monitor {
        /// Duration in seconds (0 = run until interrupted).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },

    /// Wait for the info report and print the device identity.
    Info {
        /// Seconds to wait for the report.
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },

    /// Send a set-control request with a raw hex payload.
    Control {
        /// Payload bytes as hex (e.g. 0A0B).
        payload: String,

        /// Seconds to wait for the link to come up.
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },

    /// Print an encoded request as hex. Does not contact the device.
    Encode {
        #[arg(value_enum)]
        request: RequestKind,

        /// Payload bytes as hex. Get-report defaults to 00000000.
        #[arg(long)]
        payload: Option<String>,
    },

    /// Classify and print a report frame given as hex.
    Decode {
        /// Frame bytes as hex.
        frame: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RequestKind {
    GetInfo,
    GetConfig,
    GetReport,
    SetControl,
}

impl RequestKind {
    fn opcode(self) -> Opcode {
        match self {
            RequestKind::GetInfo => Opcode::GetInfo,
            RequestKind::GetConfig => Opcode::GetConfig,
            RequestKind::GetReport => Opcode::GetReport,
            RequestKind::SetControl => Opcode::SetControl,
        }
    }
}

/// Contents of a `--config` file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    log_level: Option<String>,
    device: DeviceConfig,
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn load_config_file(path: Option<&PathBuf>) -> Result<ConfigFile> {
    let Some(path) = path else {
        return Ok(ConfigFile::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

/// Merge command-line overrides into the file's device settings.
fn device_config(cli: &Cli, mut config: DeviceConfig) -> DeviceConfig {
    if let Some(host) = &cli.host {
        config.host = Some(host.clone());
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(controller_id) = &cli.controller_id {
        config.controller_id = controller_id.clone();
    }
    if cli.fast_meters {
        config.fast_meters = true;
    }
    config
}

/// Install the log subscriber. Precedence: `--log-level`, `RUST_LOG`, the
/// config file, then "info".
fn init_tracing(cli_level: Option<&str>, file_level: Option<&str>) -> Result<()> {
    let filter = match cli_level {
        Some(level) => EnvFilter::try_new(level).with_context(|| format!("invalid log filter {level:?}"))?,
        None => match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(file_level.unwrap_or("info"))
                .context("invalid log_level in config file")?,
        },
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Parse hex such as "0A0B", "0x0a0b", or "0a 0b".
fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    let digits: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&digits).with_context(|| format!("invalid hex {s:?}"))
}

fn connect(config: &DeviceConfig) -> Result<DivineSession> {
    let Some(host) = config.host() else {
        bail!("no device host: pass --host or set host in the config file");
    };
    println!("Connecting to {host}:{}", config.port);
    DivineBuilder::new()
        .config(config.clone())
        .build()
        .context("failed to start session")
}

async fn status_reached(
    session: &DivineSession,
    events: &mut broadcast::Receiver<DeviceEvent>,
    wanted: ConnectionStatus,
) -> Result<()> {
    if session.status().await?.0 == wanted {
        return Ok(());
    }
    loop {
        match events.recv().await {
            Ok(DeviceEvent::StatusChanged { status, .. }) if status == wanted => return Ok(()),
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => bail!("session closed"),
        }
    }
}

/// Wait until the session reports `wanted`.
async fn wait_for_status(
    session: &DivineSession,
    events: &mut broadcast::Receiver<DeviceEvent>,
    wanted: ConnectionStatus,
    limit: Duration,
) -> Result<()> {
    tokio::time::timeout(limit, status_reached(session, events, wanted))
        .await
        .with_context(|| format!("device did not reach status {wanted} within {limit:?}"))?
}

/// Next variable batch carrying the device identity.
async fn identity_variables(events: &mut broadcast::Receiver<DeviceEvent>) -> Result<Variables> {
    loop {
        match events.recv().await {
            Ok(DeviceEvent::VariablesUpdated(vars)) if vars.contains_key("firmware") => {
                return Ok(vars);
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => bail!("session closed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

fn format_variables(vars: &Variables) -> String {
    vars.iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_event(event: &DeviceEvent) {
    match event {
        DeviceEvent::StatusChanged {
            status,
            message: Some(message),
        } => println!("[status] {status}: {message}"),
        DeviceEvent::StatusChanged {
            status,
            message: None,
        } => println!("[status] {status}"),
        DeviceEvent::VariablesUpdated(vars) => println!("[variables] {}", format_variables(vars)),
        DeviceEvent::FeedbacksChanged(feedbacks) => {
            let names: Vec<&str> = feedbacks.iter().map(|f| f.as_str()).collect();
            println!("[feedbacks] {}", names.join(", "));
        }
    }
}

fn print_mix(kind: &str, mix: &MixReport) {
    println!("{kind} report");
    println!(
        "  Mix select:     {} ({})",
        mix.mix_select,
        channels::label(mix.mix_select)
    );
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_monitor(session: &DivineSession, duration_secs: u64) -> Result<()> {
    let mut event_rx = session.subscribe();

    println!("Monitoring device events (Ctrl-C to stop)...");

    let deadline = if duration_secs > 0 {
        Some(Instant::now() + Duration::from_secs(duration_secs))
    } else {
        None
    };

    loop {
        let timeout = match deadline {
            Some(dl) => {
                let remaining = dl.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    println!("Monitor duration elapsed.");
                    break;
                }
                remaining
            }
            None => Duration::from_secs(3600),
        };

        match tokio::time::timeout(timeout, event_rx.recv()).await {
            Ok(Ok(event)) => print_event(&event),
            Ok(Err(RecvError::Lagged(n))) => {
                println!("[warning] missed {n} events (consumer too slow)");
            }
            Ok(Err(RecvError::Closed)) => {
                println!("Event channel closed.");
                break;
            }
            Err(_) => {
                if deadline.is_some() {
                    println!("Monitor duration elapsed.");
                    break;
                }
            }
        }
    }

    Ok(())
}

async fn cmd_info(session: &DivineSession, timeout_secs: u64) -> Result<()> {
    let mut event_rx = session.subscribe();
    let wait = identity_variables(&mut event_rx);
    let vars = tokio::time::timeout(Duration::from_secs(timeout_secs), wait)
        .await
        .with_context(|| format!("no info report within {timeout_secs}s"))??;

    let field = |name: &str| vars.get(name).map(ToString::to_string).unwrap_or_default();
    println!("Device Information");
    println!("  Product:        {}", field("productId"));
    println!("  Firmware:       {}", field("firmware"));
    println!("  Host name:      {}", field("hostName"));
    println!("  Friendly name:  {}", field("friendlyName"));
    println!("  Domain name:    {}", field("domainName"));
    Ok(())
}

async fn cmd_control(session: &DivineSession, payload: &str, timeout_secs: u64) -> Result<()> {
    let payload = parse_hex(payload)?;
    let mut event_rx = session.subscribe();
    wait_for_status(
        session,
        &mut event_rx,
        ConnectionStatus::Ok,
        Duration::from_secs(timeout_secs),
    )
    .await?;

    session.send_control(&payload).await?;
    println!("Sent set-control ({} payload bytes)", payload.len());
    Ok(())
}

fn cmd_encode(config: &DeviceConfig, kind: RequestKind, payload: Option<&str>) -> Result<()> {
    let payload = match (kind, payload) {
        (_, Some(hex)) => parse_hex(hex)?,
        (RequestKind::GetReport, None) => vec![0; 4],
        (_, None) => Vec::new(),
    };
    let Some(request) = Request::from_opcode(kind.opcode().as_byte(), &payload) else {
        bail!("opcode {:?} is not a request", kind.opcode());
    };
    let bytes = codec::encode_message(&request, &config.controller_id, config.fast_meters)?;
    println!("{}", hex::encode_upper(bytes));
    Ok(())
}

fn cmd_decode(frame: &str) -> Result<()> {
    let data = parse_hex(frame)?;
    match codec::decode(&data) {
        Frame::Info(info) => {
            println!("Info report");
            println!("  Product:        {}", info.product);
            println!("  Firmware:       {}", info.firmware);
            println!("  Host name:      {}", info.host_name);
            println!("  Friendly name:  {}", info.friendly_name);
            println!("  Domain name:    {}", info.domain_name);
        }
        Frame::Status(status) => {
            println!("Status report");
            for (level, db) in Level::ALL.iter().zip(status.levels) {
                println!("  {:<16}{db:.1} dB", level.variable());
            }
            match status.volume_db() {
                Some(db) => println!("  Volume:         {} ({db:.1} dB)", status.volume),
                None => println!("  Volume:         {} (-INF dB)", status.volume),
            }
            println!("  Pot position:   {}", status.pot_position);
            println!("  Temperature:    {:.1} C", status.temperature);
        }
        Frame::Divine(mix) => print_mix("Divine", &mix),
        Frame::Short(mix) => print_mix("Short", &mix),
        Frame::Composite(mix) => print_mix("Composite", &mix),
        Frame::Config(config) => {
            println!("Config report");
            println!("  {config}");
        }
        Frame::Unrecognized => bail!(
            "unrecognized frame: {} bytes, opcode byte {:?}",
            data.len(),
            data.get(codec::OPCODE_OFFSET)
        ),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let file = load_config_file(cli.config.as_ref())?;
    init_tracing(cli.log_level.as_deref(), file.log_level.as_deref())?;
    let config = device_config(&cli, file.device);
    tracing::debug!(?config, "Resolved device configuration");

    // Offline commands do not need a session.
    match &cli.command {
        Command::Encode { request, payload } => {
            return cmd_encode(&config, *request, payload.as_deref());
        }
        Command::Decode { frame } => return cmd_decode(frame),
        _ => {}
    }

    if let Err(e) = config.controller_id() {
        bail!("{e}");
    }

    let session = connect(&config)?;
    let result = match &cli.command {
        Command::Monitor { duration } => cmd_monitor(&session, *duration).await,
        Command::Info { timeout } => cmd_info(&session, *timeout).await,
        Command::Control { payload, timeout } => cmd_control(&session, payload, *timeout).await,
        Command::Encode { .. } | Command::Decode { .. } => Ok(()),
    };

    session.shutdown().await?;
    result
}
