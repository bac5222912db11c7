use std::process::ExitCode;
use std::sync::Arc;

use tokio::signal::unix::{SignalKind, signal};

use convpn_lib::journal::Journal;
use convpn_lib::{config, logging, ovpn};

mod cleanup;
mod cli;
mod error;
mod guardian;
mod iptables_ops;
mod journal_handle;
mod lock;
mod monitor;
mod mutators;
mod net_ops;
mod netcheck;
mod openvpn;
mod orchestrator;
mod server;
mod sudo_keeper;

use iptables_ops::RealIptablesOps;
use net_ops::RealNetOps;
use server::SharedState;

// Avoid musl's default allocator due to degraded performance
// https://nickb.dev/blog/default-musl-allocator-considered-harmful-to-performance
#[cfg(target_os = "linux")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn journal_path() -> std::path::PathBuf {
    convpn_lib::dirs::cache_dir("convpn.lock").unwrap_or_else(|_| std::path::PathBuf::from("/run/convpn/convpn.lock"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();

    let log_file = if args.foreground { None } else { Some(args.log_file.as_path()) };
    let reload_handle = match logging::init(log_file) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("failed to initialize logging: {e}");
            return ExitCode::from(exitcode::IOERR as u8);
        }
    };

    tracing::info!(socket_path = %args.socket_path.display(), "starting convpn");

    match run(&args, &reload_handle).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code as u8),
    }
}

async fn run(args: &cli::Cli, reload_handle: &logging::LogReloadHandle) -> Result<(), exitcode::ExitCode> {
    let _config = config::read(&args.config_path).await.map_err(|e| {
        tracing::error!(error = %e, "failed to read configuration");
        exitcode::CONFIG
    })?;

    if server::socket_already_live(&args.socket_path).await {
        tracing::error!("a convpn instance is already listening on the control socket");
        return Err(exitcode::SOFTWARE);
    }

    let net = RealNetOps;
    let ipt = RealIptablesOps::new(false).map_err(|e| {
        tracing::error!(error = %e, "failed to initialize iptables bindings");
        exitcode::UNAVAILABLE
    })?;
    let ipt6 = RealIptablesOps::new(true).map_err(|e| {
        tracing::error!(error = %e, "failed to initialize ip6tables bindings");
        exitcode::UNAVAILABLE
    })?;

    let jpath = journal_path();
    match lock::acquire(&net, &ipt, &ipt6, &jpath, std::process::id()).await {
        Ok(lock::LockOutcome::Fresh) => {}
        Ok(lock::LockOutcome::AdoptedStale) => {
            tracing::warn!("adopted and cleaned up a stale session from a previous instance");
        }
        Err(e) => {
            tracing::error!(error = %e, "instance lock denied");
            return Err(exitcode::SOFTWARE);
        }
    }

    let listener = server::bind(&args.socket_path).await.map_err(|e| {
        tracing::error!(error = %e, "failed to bind control socket");
        exitcode::IOERR
    })?;

    let state = Arc::new(SharedState::new(net, ipt, ipt6, jpath.clone(), args.locations_dir.clone(), args.config_path.clone()));
    if let Ok(locations) = ovpn::list_locations(&args.locations_dir).await {
        tracing::info!(count = locations.len(), "discovered ovpn locations");
    }

    let keeper_token = tokio_util::sync::CancellationToken::new();
    let mut keeper_handle = tokio::spawn(sudo_keeper::run(keeper_token.clone()));

    let serve_state = state.clone();
    let mut serve_handle = tokio::spawn(async move { server::serve(listener, serve_state).await });

    let mut sigint = signal(SignalKind::interrupt()).map_err(|e| {
        tracing::error!(error = %e, "failed to install SIGINT handler");
        exitcode::OSERR
    })?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(|e| {
        tracing::error!(error = %e, "failed to install SIGTERM handler");
        exitcode::OSERR
    })?;
    let mut sighup = signal(SignalKind::hangup()).map_err(|e| {
        tracing::error!(error = %e, "failed to install SIGHUP handler");
        exitcode::OSERR
    })?;

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("received SIGINT, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                break;
            }
            _ = sighup.recv() => {
                tracing::info!("received SIGHUP, reloading log file");
                let log_file = if args.foreground { None } else { Some(args.log_file.as_path()) };
                if let Err(e) = logging::reload(reload_handle, log_file) {
                    tracing::warn!(error = %e, "log reload failed");
                }
            }
            _ = &mut serve_handle => {
                tracing::error!("control socket server task exited unexpectedly");
                break;
            }
        }
    }

    keeper_token.cancel();
    let _ = keeper_handle.await;
    serve_handle.abort();

    if let Some(token) = state.guardian_token.lock().unwrap().take() {
        token.cancel();
    }
    let journal = Journal::load_opt(&jpath).await.unwrap_or_else(|| Journal::new(std::process::id()));
    if let Err(e) = cleanup::run(&state.net, &state.ipt, &state.ipt6, &journal, false).await {
        tracing::error!(error = %e, "cleanup on shutdown failed");
    }
    let _ = Journal::delete(&jpath).await;

    Ok(())
}
