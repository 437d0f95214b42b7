use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use finger_control::{self as control, BridgeConfig, ControlLoop, MetricsHub, PendingState};
use finger_protocol as proto;
use serial_link::{self as link, ByteLink, DeviceDiscovery, SessionOptions};

mod bus;
use bus::{BridgeSink, UdpPublisher};

#[derive(Parser, Debug)]
#[command(
    name = "finger-bridge",
    version,
    about = "Serial bridge for the sixth-finger actuator dongle",
    disable_help_subcommand = true
)]
struct Cli {
    /// YAML bridge configuration (roles, rate, bus addresses)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Role {
    Robot,
    Input,
    Feedback,
}

impl Role {
    fn into_link(self) -> link::DeviceRole {
        match self {
            Role::Robot => link::DeviceRole::Robot,
            Role::Input => link::DeviceRole::Input,
            Role::Feedback => link::DeviceRole::Feedback,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
#[value(rename_all = "UPPER")]
enum State {
    Open,
    Close,
    Stop,
    /// Select the low velocity profile
    Velocity,
}

impl State {
    fn into_command(self) -> proto::CommandRecord {
        match self {
            State::Open => proto::CommandRecord::Open,
            State::Close => proto::CommandRecord::Close,
            State::Stop => proto::CommandRecord::Stop,
            State::Velocity => proto::CommandRecord::SetVelocity(proto::VelocityLevel::Low),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List USB serial devices and the role each one maps to
    List,
    /// Print the device path bound to a role
    Resolve {
        #[arg(long, value_enum)]
        role: Option<Role>,
    },
    /// Decode one telemetry frame given as text (e.g. "$123**675*")
    Decode {
        #[arg(long)]
        frame: String,
        /// Skip digit validation
        #[arg(long, action = ArgAction::SetTrue)]
        lossy: bool,
    },
    /// Send a single command frame and exit
    Send {
        #[arg(long, value_enum, ignore_case = true)]
        state: State,
        /// Device path; resolved from the role table when omitted
        #[arg(long)]
        device: Option<String>,
        #[arg(long, value_enum)]
        role: Option<Role>,
    },
    /// Run the bridge until Ctrl-C
    Run {
        /// Device path; resolved from the role table when omitted
        #[arg(long)]
        device: Option<String>,
        #[arg(long, value_enum)]
        role: Option<Role>,
        /// Control loop rate
        #[arg(long)]
        rate_hz: Option<f64>,
        /// Stop re-emitting stale telemetry after this many milliseconds
        #[arg(long)]
        stale_ttl_ms: Option<u64>,
        /// UDP address receiving state commands
        #[arg(long)]
        bind: Option<String>,
        /// UDP address receiving "<torque> <position>" datagrams
        #[arg(long)]
        publish: Option<String>,
        /// Print each telemetry record as JSON on stdout
        #[arg(long, action = ArgAction::SetTrue)]
        print: bool,
        /// Log prometheus counters on exit
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,
        /// Do not attempt `sudo chmod` when the first open fails
        #[arg(long, action = ArgAction::SetTrue)]
        no_repair: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    let cfg = match cli.config.as_deref() {
        Some(path) => control::load_config_file(path)?,
        None => BridgeConfig::default(),
    };

    match cli.command {
        Commands::List => list_devices(&cfg),
        Commands::Resolve { role } => {
            let role = role.map(Role::into_link).unwrap_or(cfg.role);
            let path = resolve_path(&cfg, role)?;
            println!("{path}");
            Ok(())
        }
        Commands::Decode { frame, lossy } => decode_frame(&frame, lossy),
        Commands::Send {
            state,
            device,
            role,
        } => send_once(&cfg, state, device, role),
        Commands::Run {
            device,
            role,
            rate_hz,
            stale_ttl_ms,
            bind,
            publish,
            print,
            metrics,
            ticks,
            no_repair,
        } => {
            let mut cfg = cfg;
            if let Some(r) = role {
                cfg.role = r.into_link();
            }
            if let Some(hz) = rate_hz {
                cfg.rate_hz = hz;
            }
            if stale_ttl_ms.is_some() {
                cfg.stale_ttl_ms = stale_ttl_ms;
            }
            if let Some(b) = bind {
                cfg.bus.bind = b;
            }
            if let Some(p) = publish {
                cfg.bus.publish = p;
            }
            if no_repair {
                cfg.repair_permissions = false;
            }
            cfg.validate()?;
            run_bridge(cfg, device, print, metrics, ticks).await
        }
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn discovery(cfg: &BridgeConfig) -> DeviceDiscovery<link::SystemEnumerator> {
    DeviceDiscovery::new(link::SystemEnumerator, cfg.roles.clone())
}

fn resolve_path(cfg: &BridgeConfig, role: link::DeviceRole) -> Result<String> {
    discovery(cfg)
        .path_for(role)?
        .with_context(|| format!("no {role} dongle found"))
}

fn session_options(cfg: &BridgeConfig) -> SessionOptions {
    SessionOptions {
        repair_permissions: cfg.repair_permissions,
        ..SessionOptions::default()
    }
}

fn list_devices(cfg: &BridgeConfig) -> Result<()> {
    for entry in discovery(cfg).survey()? {
        let d = &entry.device;
        println!(
            "{path}\t{vid:04x}:{pid:04x}\t{serial}\t{role}",
            path = d.path,
            vid = d.vendor_id,
            pid = d.product_id,
            serial = d.serial.as_deref().unwrap_or("-"),
            role = entry.role.map(|r| r.as_str()).unwrap_or("-"),
        );
    }
    Ok(())
}

fn decode_frame(text: &str, lossy: bool) -> Result<()> {
    let mut bytes = text.as_bytes().to_vec();
    // Accept the frame with or without its trailing filler byte.
    if bytes.len() == proto::FRAME_LEN - 1 {
        bytes.push(0);
    }
    let frame = proto::Frame::from_bytes(&bytes).with_context(|| {
        format!(
            "expected {} bytes starting with '$', got {:?}",
            proto::FRAME_LEN,
            text
        )
    })?;
    let record = if lossy {
        proto::decode_lossy(&frame)
    } else {
        proto::decode(&frame)?
    };
    println!("{}", serde_json::to_string(&record)?);
    Ok(())
}

fn send_once(
    cfg: &BridgeConfig,
    state: State,
    device: Option<String>,
    role: Option<Role>,
) -> Result<()> {
    let path = match device {
        Some(d) => d,
        None => resolve_path(cfg, role.map(Role::into_link).unwrap_or(cfg.role))?,
    };
    let mut session = link::SerialSession::open_with(&path, &session_options(cfg))?;
    let frame = proto::encode(state.into_command());
    session.write_frame(frame.payload())?;
    println!("sent {frame} to {path}");
    session.close();
    Ok(())
}

async fn run_bridge(
    cfg: BridgeConfig,
    device: Option<String>,
    print: bool,
    metrics: bool,
    ticks: Option<u64>,
) -> Result<()> {
    let path = match device {
        Some(d) => d,
        None => resolve_path(&cfg, cfg.role)?,
    };
    info!("{} dongle at {path}", cfg.role);
    let session = link::SerialSession::open_with(&path, &session_options(&cfg))
        .with_context(|| format!("opening {path}"))?;

    let pending = PendingState::new();
    let listener = bus::listen_states(&cfg.bus.bind, pending.clone()).await?;
    let mut sink = BridgeSink {
        publisher: Some(UdpPublisher::connect(&cfg.bus.publish)?),
        print,
    };

    let hub = MetricsHub::new().map_err(|e| anyhow::anyhow!(e))?;
    let mut ctl =
        ControlLoop::new(session, pending, cfg.loop_config()).with_metrics(hub.link.clone());
    ctl.startup()?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    let mut worker = tokio::task::spawn_blocking(move || {
        ctl.run(&mut sink, &flag, ticks);
        ctl.into_link().close();
    });

    tokio::select! {
        res = &mut worker => {
            if let Err(e) = res {
                error!("control loop aborted: {e}");
            }
        }
        sig = tokio::signal::ctrl_c() => {
            if let Err(e) = sig {
                warn!("ctrl-c handler failed: {e}");
            }
            info!("shutdown requested");
            shutdown.store(true, Ordering::Relaxed);
            if let Err(e) = worker.await {
                error!("control loop aborted: {e}");
            }
        }
    }
    listener.abort();

    if metrics {
        info!("link metrics:\n{}", hub.encode_text());
    }
    info!("finger-bridge stopped");
    Ok(())
}
