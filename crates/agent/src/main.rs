// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Entry point: load configuration, bootstrap a worker identity, then run
//! the scheduler loop until told to shut down.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::Arc;

use rfw_agent::adapters::{ProcessAttachmentSyncer, ProcessJobTemplateInterpreter};
use rfw_agent::bootstrap::{self, BootstrapOutcome};
use rfw_agent::config::WorkerConfig;
use rfw_agent::control_plane::ControlPlaneClient;
use rfw_agent::logs::LogSinkClient;
use rfw_agent::scheduler::{Scheduler, ShutdownReason, Tick};
use rfw_agent::shutdown_monitor::ShutdownMonitor;
use rfw_core::{Capabilities, HostProperties, SystemClock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = run().await {
        error!(error = %err, "worker exited with an error");
        std::process::exit(1);
    }
}

async fn run() -> rfw_agent::AgentResult<()> {
    let config = WorkerConfig::from_env().unwrap_or_else(|err| {
        eprintln!("invalid configuration: {err}");
        std::process::exit(1);
    });

    let control_plane = ControlPlaneClient::new(config.endpoint.clone());
    let clock = SystemClock;
    let capabilities = gather_capabilities();
    let host_properties = gather_host_properties();
    let interrupt = install_signal_handler();

    let outcome = bootstrap::bootstrap(&config, &control_plane, clock, &capabilities, &host_properties, &interrupt).await?;

    let (identity, fleet_credentials) = match outcome {
        BootstrapOutcome::Ready { identity, fleet_credentials } => (identity, fleet_credentials),
        BootstrapOutcome::InstanceProfileDisallowed => {
            warn!("instance profile disallowed by configuration; exiting without entering the scheduling loop");
            return Ok(());
        }
    };

    let sink = LogSinkClient::new(config.endpoint.clone());
    let agent_os_user = current_os_user();

    let mut scheduler = Scheduler::new(
        identity,
        control_plane,
        clock,
        sink,
        capabilities,
        host_properties,
        config.persistence_dir.clone(),
        config.log_dir.clone(),
        config.aws_config_path.clone(),
        agent_os_user,
        fleet_credentials,
    );

    let shutdown_monitor = ShutdownMonitor::start(scheduler.shutdown_signal());
    let interpreter: Arc<dyn rfw_agent::sessions::runtime::JobTemplateInterpreter> = Arc::new(ProcessJobTemplateInterpreter);
    let syncer: Arc<dyn rfw_agent::sessions::runtime::AttachmentSyncer> =
        Arc::new(ProcessAttachmentSyncer { sync_command: sync_command() });

    let reason = loop {
        match scheduler.tick(interpreter.clone(), syncer.clone(), &interrupt).await {
            Ok(Tick::Continue) => {}
            Ok(Tick::Shutdown(reason)) => break reason,
            Err(err) => {
                error!(error = %err, "reconciliation tick failed; draining before exit");
                shutdown_monitor.stop().await;
                scheduler.drain(ShutdownReason::Service, &interrupt).await?;
                return Err(err);
            }
        }
    };

    info!(?reason, "shutting down");
    shutdown_monitor.stop().await;
    scheduler.drain(reason, &interrupt).await
}

/// Installs the service-shutdown signal path (`SIGTERM`/`SIGINT` on Unix,
/// `Ctrl-C` on Windows): a cancellation that propagates into every
/// in-flight remote call and action dispatch.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let watched = token.clone();

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        let mut int = signal(SignalKind::interrupt()).expect("install SIGINT handler");
        tokio::select! {
            _ = term.recv() => {}
            _ = int.recv() => {}
        }
        watched.cancel();
    });

    #[cfg(windows)]
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        watched.cancel();
    });

    token
}

fn gather_capabilities() -> Capabilities {
    let mut system = sysinfo::System::new_all();
    system.refresh_all();

    let vcpu = system.cpus().len() as f64;
    let memory_gib = system.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);

    Capabilities::new()
        .with_amount("amount.worker.vcpu", vcpu)
        .with_amount("amount.worker.memory", memory_gib)
        .with_attribute("attr.worker.os.family", [os_family()])
}

fn os_family() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "macos"
    } else {
        "linux"
    }
}

fn gather_host_properties() -> HostProperties {
    let host_name = gethostname::gethostname().to_string_lossy().into_owned();
    HostProperties::from_addresses(host_name, local_ipv4_address(), [])
}

/// No interface-enumeration crate is in the dependency stack, so a local
/// IPv4 address is discovered the usual no-new-dependency way: bind an
/// unconnected UDP socket, "connect" it to a public address (no packet is
/// actually sent), and read back the address the kernel would have routed
/// through.
fn local_ipv4_address() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(addr) => Some(addr),
        IpAddr::V6(_) => None,
    }
}

#[cfg(unix)]
fn current_os_user() -> String {
    nix::unistd::User::from_uid(nix::unistd::Uid::current())
        .ok()
        .flatten()
        .map(|user| user.name)
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(windows)]
fn current_os_user() -> String {
    std::env::var("USERNAME").unwrap_or_else(|_| "unknown".to_string())
}

fn sync_command() -> String {
    std::env::var("RFW_ATTACHMENT_SYNC_COMMAND").unwrap_or_else(|_| "rfw-attachment-sync".to_string())
}
