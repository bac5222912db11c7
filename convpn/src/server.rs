//! The daemon side of the control socket: binds a `UnixListener`, accepts
//! one connection per request (write-then-EOF framing, mirroring the
//! synchronous client in `convpn_lib::socket`), and dispatches each
//! decoded [`Command`] against shared supervisor state.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use convpn_lib::command::{Command, Response, StatusResponse, SupervisorState};
use convpn_lib::dirs;
use convpn_lib::journal::Journal;
use convpn_lib::ovpn;
use convpn_lib::session::Session;

use crate::cleanup;
use crate::error::Error;
use crate::guardian;
use crate::iptables_ops::IptablesOps;
use crate::journal_handle::JournalHandle;
use crate::monitor::{self, Liveness};
use crate::net_ops::NetOps;
use crate::orchestrator::{self, ConnectParams};

pub struct SharedState<N, I> {
    pub net: N,
    pub ipt: I,
    pub ipt6: I,
    pub journal_path: PathBuf,
    pub locations_dir: PathBuf,
    pub config_path: PathBuf,
    pub state: Mutex<SupervisorState>,
    pub session: Mutex<Option<Arc<Mutex<Session>>>>,
    pub guardian_token: Mutex<Option<CancellationToken>>,
    pub block_doh: Mutex<bool>,
    pub block_lan: Mutex<bool>,
}

impl<N, I> SharedState<N, I> {
    pub fn new(net: N, ipt: I, ipt6: I, journal_path: PathBuf, locations_dir: PathBuf, config_path: PathBuf) -> Self {
        Self {
            net,
            ipt,
            ipt6,
            journal_path,
            locations_dir,
            config_path,
            state: Mutex::new(SupervisorState::Idle),
            session: Mutex::new(None),
            guardian_token: Mutex::new(None),
            block_doh: Mutex::new(false),
            block_lan: Mutex::new(false),
        }
    }
}

/// Probes whether a live daemon already owns `socket_path`, the way the
/// instance lock surfaces over IPC in addition to the pid-based journal
/// check: a `Ping` that gets a `Pong` means someone else is already bound.
pub async fn socket_already_live(socket_path: &Path) -> bool {
    let Ok(mut stream) = UnixStream::connect(socket_path).await else {
        return false;
    };
    let Ok(json) = serde_json::to_string(&Command::Ping) else {
        return false;
    };
    if stream.write_all(json.as_bytes()).await.is_err() {
        return false;
    }
    if stream.shutdown().await.is_err() {
        return false;
    }
    let mut buf = String::new();
    if stream.read_to_string(&mut buf).await.is_err() {
        return false;
    }
    matches!(serde_json::from_str::<Response>(&buf), Ok(Response::Pong))
}

pub async fn bind(socket_path: &Path) -> Result<UnixListener, Error> {
    if socket_path.exists() {
        let _ = tokio::fs::remove_file(socket_path).await;
    }
    if let Some(parent) = socket_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let listener = UnixListener::bind(socket_path)?;
    tokio::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o700)).await?;
    Ok(listener)
}

pub async fn serve<N, I>(listener: UnixListener, state: Arc<SharedState<N, I>>)
where
    N: NetOps + 'static,
    I: IptablesOps + Send + Sync + 'static,
{
    loop {
        let Ok((stream, _addr)) = listener.accept().await else { continue };
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state).await {
                tracing::warn!(error = %e, "control socket connection failed");
            }
        });
    }
}

async fn handle_connection<N, I>(mut stream: UnixStream, state: Arc<SharedState<N, I>>) -> Result<(), Error>
where
    N: NetOps + 'static,
    I: IptablesOps + Send + Sync + 'static,
{
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await?;
    let response = match serde_json::from_str::<Command>(&raw) {
        Ok(cmd) => dispatch(cmd, state).await,
        Err(e) => Response::Error(format!("malformed request: {e}")),
    };
    let json = serde_json::to_string(&response).unwrap_or_else(|_| "{\"Error\":\"serialization failed\"}".into());
    stream.write_all(json.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

async fn dispatch<N, I>(cmd: Command, state: Arc<SharedState<N, I>>) -> Response
where
    N: NetOps + 'static,
    I: IptablesOps + Send + Sync + 'static,
{
    match cmd {
        Command::Ping => Response::Pong,
        Command::ListLocations => match ovpn::list_locations(&state.locations_dir).await {
            Ok(locations) => Response::Locations(locations.into_iter().map(|l| l.name).collect()),
            Err(e) => Response::Error(e.to_string()),
        },
        Command::Status => Response::Status(build_status(&state)),
        Command::SetFlags { doh_block, lan_block } => {
            if let Some(v) = doh_block {
                *state.block_doh.lock().unwrap() = v;
            }
            if let Some(v) = lan_block {
                *state.block_lan.lock().unwrap() = v;
            }
            Response::FlagsUpdated
        }
        Command::Connect { location } => {
            let mut current = state.state.lock().unwrap();
            if *current != SupervisorState::Idle {
                return Response::Error(format!("cannot connect while {}", *current));
            }
            *current = SupervisorState::Connecting;
            drop(current);
            tokio::spawn(run_connect(state.clone(), location));
            Response::Connecting
        }
        Command::Disconnect => {
            if let Some(token) = state.guardian_token.lock().unwrap().take() {
                token.cancel();
            }
            *state.state.lock().unwrap() = SupervisorState::Idle;
            *state.session.lock().unwrap() = None;
            Response::Disconnected
        }
    }
}

/// Drives a single connection attempt outside the request/response path:
/// the control socket gets `Connecting` immediately, and `Status` reflects
/// the outcome once the orchestrator finishes. On success, starts the
/// Guardian and hands the session to the reconnect loop; on failure, runs
/// Cleanup and returns to idle.
async fn run_connect<N, I>(state: Arc<SharedState<N, I>>, location: String)
where
    N: NetOps + 'static,
    I: IptablesOps + Send + Sync + 'static,
{
    let outcome = attempt_connect(&state, &location).await;
    match outcome {
        Ok(session) => {
            let session = Arc::new(Mutex::new(session));
            *state.session.lock().unwrap() = Some(session.clone());
            *state.state.lock().unwrap() = SupervisorState::Up;
            start_guardian(&state, session.clone());
            run_monitor_loop(state, session).await;
        }
        Err(e) => {
            tracing::warn!(error = %e, location = %location, "connection attempt failed");
            let journal = Journal::load_opt(&state.journal_path).await.unwrap_or_else(|| Journal::new(std::process::id()));
            let _ = cleanup::run(&state.net, &state.ipt, &state.ipt6, &journal, true).await;
            let _ = Journal::delete(&state.journal_path).await;
            *state.state.lock().unwrap() = SupervisorState::Idle;
        }
    }
}

async fn attempt_connect<N, I>(state: &Arc<SharedState<N, I>>, location: &str) -> Result<Session, Error>
where
    N: NetOps + 'static,
    I: IptablesOps + Send + Sync + 'static,
{
    let locations = ovpn::list_locations(&state.locations_dir).await.map_err(|e| Error::General(e.to_string()))?;
    let found = ovpn::find_location(&locations, location).map_err(|e| Error::General(e.to_string()))?;
    let log_path = dirs::cache_dir("openvpn.log").map_err(|e| Error::General(e.to_string()))?;
    let mut journal = JournalHandle::new(state.journal_path.clone(), Journal::new(std::process::id()));

    let config = convpn_lib::config::read(&state.config_path).await.map_err(|e| Error::General(e.to_string()))?;
    let credentials = match &config.credentials {
        Some(encrypted) => Some(encrypted.decrypt().map_err(|e| Error::General(e.to_string()))?),
        None => None,
    };

    let params = ConnectParams {
        location: found,
        credentials: credentials.as_ref(),
        log_path,
        block_doh: *state.block_doh.lock().unwrap(),
        block_lan: *state.block_lan.lock().unwrap(),
    };
    orchestrator::connect(&state.net, &state.ipt, &state.ipt6, &mut journal, &params, None).await
}

/// Starts (or restarts) the Guardian against the given session, recording
/// its cancellation token so `Disconnect` and the reconnect loop can stop it.
fn start_guardian<N, I>(state: &Arc<SharedState<N, I>>, session: Arc<Mutex<Session>>)
where
    N: NetOps + 'static,
    I: IptablesOps + Send + Sync + 'static,
{
    let token = CancellationToken::new();
    *state.guardian_token.lock().unwrap() = Some(token.clone());
    let state = state.clone();
    tokio::spawn(async move { guardian::run(&state.net, session, token).await });
}

/// Reconnect loop: on a negative liveness result, tears down and retries
/// the same location via the orchestrator; on a failed retry, fails closed.
async fn run_monitor_loop<N, I>(state: Arc<SharedState<N, I>>, session: Arc<Mutex<Session>>)
where
    N: NetOps + 'static,
    I: IptablesOps + Send + Sync + 'static,
{
    let location = session.lock().unwrap().location.clone();
    loop {
        let token = state.guardian_token.lock().unwrap().clone().unwrap_or_default();
        let liveness = monitor::run_until_negative(&state.net, session.clone(), token.clone()).await;
        if token.is_cancelled() {
            return;
        }
        match liveness {
            Ok(Liveness::Alive) => return,
            Ok(bad) => tracing::warn!(?bad, "monitor detected a degraded tunnel, reconnecting"),
            Err(e) => tracing::warn!(error = %e, "monitor loop error, reconnecting"),
        }

        if let Some(token) = state.guardian_token.lock().unwrap().take() {
            token.cancel();
        }
        *state.state.lock().unwrap() = SupervisorState::Reconnecting;

        let journal = Journal::load_opt(&state.journal_path).await.unwrap_or_else(|| Journal::new(std::process::id()));
        let _ = cleanup::run(&state.net, &state.ipt, &state.ipt6, &journal, false).await;
        let _ = Journal::delete(&state.journal_path).await;

        match attempt_connect(&state, &location).await {
            Ok(new_session) => {
                session.lock().unwrap().record_reconnection();
                *session.lock().unwrap() = new_session;
                *state.state.lock().unwrap() = SupervisorState::Up;
                start_guardian(&state, session.clone());
            }
            Err(e) => {
                tracing::error!(error = %e, "reconnect failed, failing closed");
                let journal = Journal::load_opt(&state.journal_path).await.unwrap_or_else(|| Journal::new(std::process::id()));
                let _ = cleanup::run(&state.net, &state.ipt, &state.ipt6, &journal, true).await;
                let _ = Journal::delete(&state.journal_path).await;
                *state.state.lock().unwrap() = SupervisorState::FailClosed;
                return;
            }
        }
    }
}

fn build_status<N, I>(state: &SharedState<N, I>) -> StatusResponse {
    let supervisor_state = *state.state.lock().unwrap();
    let session_guard = state.session.lock().unwrap();
    let session = session_guard.as_ref().map(|s| s.lock().unwrap().clone());
    let journal = std::fs::read(&state.journal_path).ok().and_then(|b| serde_json::from_slice::<Journal>(&b).ok());

    StatusResponse {
        state: supervisor_state,
        location: session.as_ref().map(|s| s.location.clone()),
        uptime_secs: session.as_ref().map(|s| s.uptime(SystemTime::now()).as_secs()),
        expected_public_ip: session.as_ref().map(|s| s.expected_public_ip.clone()),
        forwarded_port: session.as_ref().and_then(|s| match &s.forwarded_port {
            convpn_lib::session::ForwardedPort::Known(p) => Some(p.clone()),
            _ => None,
        }),
        reconnections: session.as_ref().map(|s| s.reconnections).unwrap_or(0),
        corrections: session.as_ref().map(|s| s.corrections).unwrap_or(0),
        guardian_high_alert: session.as_ref().map(|s| s.guardian_high_alert(SystemTime::now())).unwrap_or(false),
        journal,
    }
}
