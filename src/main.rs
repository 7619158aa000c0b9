//! Process entry point: CLI parsing, config resolution, and wiring every
//! collaborator built under `src/` into a running server. Grounded on the
//! teacher's `main.rs` shape (CLI struct, logging init, TLS bring-up,
//! graceful shutdown via a broadcast signal) generalized from the teacher's
//! hardware subsystems onto this crate's Supervisor/pipeline/transport
//! wiring.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::{broadcast, Mutex};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use selkies_rs::config::{self, ConfigStore, SignalingConfig, StreamMode};
use selkies_rs::events::EventBus;
use selkies_rs::input::display::XrandrDisplay;
use selkies_rs::input::uinput::InputInjector;
use selkies_rs::input::{DisplayControl, InputSink};
use selkies_rs::pipeline;
use selkies_rs::rtc_config::{monitor, resolver, RtcConfigCache};
use selkies_rs::signaling::client::SignalingClientConfig;
use selkies_rs::signaling::server::SignalingState;
use selkies_rs::signaling::{self, PeerRegistry};
use selkies_rs::state::AppState;
use selkies_rs::supervisor::{control_api, ModeEntrypoint, Supervisor};
use selkies_rs::utils::bind_tcp_listener;
use selkies_rs::web;
use selkies_rs::webrtc::session::{self, SessionDeps};
use selkies_rs::ws_streamer::{self, WsStreamerDeps, WsStreamerHandle};

/// The id our own embedded WebRTC Session registers under with the
/// Signaling Server; the browser pairs against it with `SESSION app`.
const SIGNALING_SELF_ID: &str = "app";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Verbose,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

#[derive(Parser, Debug)]
#[command(name = "selkies-rs", about = "Single-user remote desktop streaming server")]
struct CliArgs {
    /// Signaling/web bind address (repeatable via SELKIES_BIND_ADDRESSES if unset).
    #[arg(long)]
    address: Option<String>,

    #[arg(long)]
    http_port: Option<u16>,

    #[arg(long)]
    enable_https: bool,

    #[arg(long, requires = "ssl_key")]
    ssl_cert: Option<PathBuf>,

    #[arg(long, requires = "ssl_cert")]
    ssl_key: Option<PathBuf>,

    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Initial stream mode ("webrtc" or "websockets"), overriding config.
    #[arg(long)]
    mode: Option<StreamMode>,

    #[arg(long)]
    control_port: Option<u16>,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
        .expect("failed to install rustls crypto provider");

    let data_dir = config::resolve(args.data_dir.clone(), "SELKIES_DATA_DIR", &[], get_data_dir());
    tokio::fs::create_dir_all(&data_dir).await?;

    let config_store = ConfigStore::new(&data_dir.join("selkies.db")).await?;
    let mut cfg = (*config_store.get()).clone();

    apply_cli_overrides(&mut cfg.signaling, &args);
    if let Some(mode) = args.mode {
        cfg.mode = mode;
    }
    if let Some(port) = args.control_port {
        cfg.supervisor.control_port = port;
    }

    init_logging(args.log_level, args.verbose, &cfg.logging);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting selkies-rs");

    let bind_ips = resolve_bind_addresses(&cfg.signaling)?;
    tracing::info!(?bind_ips, port = cfg.signaling.http_port, "resolved bind addresses");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let events = Arc::new(EventBus::new());

    let display: Arc<dyn DisplayControl> = Arc::new(XrandrDisplay::new());
    apply_display_settings(&display, &cfg.display).await;

    let input: Arc<Mutex<dyn InputSink>> = Arc::new(Mutex::new(
        InputInjector::new().map_err(|e| anyhow::anyhow!("failed to initialize input injector: {e}"))?,
    ));

    let pipeline_backend = pipeline::build_backend(&cfg.pipeline, cfg.display.dpi, None)
        .map_err(|e| anyhow::anyhow!("failed to build media pipeline backend: {e}"))?;

    let rtc_monitor_cancel = tokio_util::sync::CancellationToken::new();
    let initial_rtc_config = resolver::get_rtc_configuration(&cfg.rtc, now_unix()).await;
    let rtc_config = RtcConfigCache::new(initial_rtc_config);
    let rtc_monitor_task = tokio::spawn(monitor::run(
        cfg.rtc.clone(),
        rtc_config.clone(),
        rtc_monitor_cancel.clone(),
        now_unix,
    ));

    let scheme = if cfg.signaling.https_enabled { "wss" } else { "ws" };
    let signaling_client_config = SignalingClientConfig {
        server_url: format!("{scheme}://127.0.0.1:{}/{SIGNALING_SELF_ID}/signalling", cfg.signaling.http_port),
        id: SIGNALING_SELF_ID.to_string(),
        basic_auth: None,
    };

    let mut entrypoints: HashMap<StreamMode, ModeEntrypoint> = HashMap::new();
    entrypoints.insert(StreamMode::Webrtc, {
        let pipeline = pipeline_backend.clone();
        let pipeline_config = cfg.pipeline.clone();
        let rtc_config = rtc_config.clone();
        let input = input.clone();
        Arc::new(move |cancel| {
            let deps = SessionDeps {
                rtc_config: rtc_config.clone(),
                signaling: SignalingClientConfig {
                    server_url: signaling_client_config.server_url.clone(),
                    id: signaling_client_config.id.clone(),
                    basic_auth: signaling_client_config.basic_auth.clone(),
                },
                pipeline: pipeline.clone(),
                pipeline_config: pipeline_config.clone(),
                input: input.clone(),
            };
            tokio::spawn(session::run(deps, cancel))
        })
    });

    let (ws_streamer_handle, ws_sockets) = WsStreamerHandle::new();
    entrypoints.insert(StreamMode::Websockets, {
        let pipeline = pipeline_backend.clone();
        let input = input.clone();
        let ws_sockets = ws_sockets.clone();
        Arc::new(move |cancel| {
            let deps = Arc::new(WsStreamerDeps { pipeline: pipeline.clone(), input: input.clone() });
            tokio::spawn(ws_streamer::run(ws_sockets.clone(), deps, cancel))
        })
    });

    let supervisor = Supervisor::new(entrypoints, cfg.supervisor.enable_dual_mode);
    if let Err(e) = supervisor.switch_to(cfg.mode).await {
        tracing::error!(error = %e, mode = %cfg.mode, "failed to start initial stream mode");
    }

    let state = AppState::new(
        config_store.clone(),
        events.clone(),
        supervisor.clone(),
        rtc_config.clone(),
        ws_streamer_handle,
        shutdown_tx.clone(),
        data_dir.clone(),
    );

    let signaling_state = Arc::new(SignalingState {
        registry: Mutex::new(PeerRegistry::new()),
        rtc_config: rtc_config.clone(),
        keepalive_timeout: Duration::from_secs(cfg.signaling.keepalive_timeout_secs),
    });

    let app = web::create_router(state.clone()).merge(signaling::router(signaling_state, None));

    let control_listener = bind_tcp_listener(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), cfg.supervisor.control_port))?;
    let control_app = control_api::router(supervisor.clone());
    tracing::info!(addr = %control_listener.local_addr()?, "starting supervisor control API");
    let control_listener = tokio::net::TcpListener::from_std(control_listener)?;
    let control_server = tokio::spawn(async move { axum::serve(control_listener, control_app).await });

    let listeners = bind_tcp_listeners(&bind_ips, cfg.signaling.http_port)?;

    let shutdown_signal = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
        tracing::info!("shutdown signal received");
    };

    if cfg.signaling.https_enabled {
        let tls_config = load_or_generate_tls(&cfg.signaling, &data_dir).await?;
        let mut servers = FuturesUnordered::new();
        for listener in listeners {
            let local_addr = listener.local_addr()?;
            tracing::info!(%local_addr, "starting https server");
            servers.push(axum_server::from_tcp_rustls(listener, tls_config.clone()).serve(app.clone().into_make_service()));
        }
        tokio::select! {
            _ = shutdown_signal => {}
            Some(Err(e)) = servers.next() => tracing::error!(error = %e, "https server error"),
        }
    } else {
        let mut servers = FuturesUnordered::new();
        for listener in listeners {
            let local_addr = listener.local_addr()?;
            tracing::info!(%local_addr, "starting http server");
            let listener = tokio::net::TcpListener::from_std(listener)?;
            let app = app.clone();
            servers.push(async move { axum::serve(listener, app).await });
        }
        tokio::select! {
            _ = shutdown_signal => {}
            Some(Err(e)) = servers.next() => tracing::error!(error = %e, "http server error"),
        }
    }

    let _ = shutdown_tx.send(());
    shutdown(&supervisor, &rtc_monitor_cancel, rtc_monitor_task, control_server).await;

    tracing::info!("server shutdown complete");
    Ok(())
}

fn apply_cli_overrides(signaling: &mut SignalingConfig, args: &CliArgs) {
    if let Some(address) = &args.address {
        signaling.bind_addresses = vec![address.clone()];
    }
    if let Some(port) = args.http_port {
        signaling.http_port = port;
    }
    if args.enable_https {
        signaling.https_enabled = true;
    }
    if let Some(cert) = &args.ssl_cert {
        signaling.ssl_cert_path = Some(cert.display().to_string());
    }
    if let Some(key) = &args.ssl_key {
        signaling.ssl_key_path = Some(key.display().to_string());
    }
}

/// Applies the configured manual resolution, DPI, and cursor size at
/// startup; failures are logged and non-fatal (§4.7 host tooling is
/// best-effort).
async fn apply_display_settings(display: &Arc<dyn DisplayControl>, cfg: &config::DisplayConfig) {
    if let Some((w, h)) = cfg.manual_resolution {
        if let Err(e) = display.resize(w, h).await {
            tracing::warn!(error = %e, "failed to apply manual resolution");
        }
    }
    if let Err(e) = display.set_dpi(cfg.dpi).await {
        tracing::warn!(error = %e, "failed to set display dpi");
    }
    if let Err(e) = display.set_cursor_size(cfg.cursor_size_px).await {
        tracing::warn!(error = %e, "failed to set cursor size");
    }
}

/// Shutdown ordering (§5): cancel tasks, wait with timeout, stop the
/// active transport (Supervisor), stop monitors, stop the control API.
/// The Media Pipeline and signaling client are torn down as part of the
/// Supervisor's own mode-task cancellation (`webrtc::session`/`ws_streamer`
/// each stop their pipeline handle before returning).
async fn shutdown(
    supervisor: &Arc<Supervisor>,
    rtc_monitor_cancel: &tokio_util::sync::CancellationToken,
    rtc_monitor_task: tokio::task::JoinHandle<()>,
    control_server: tokio::task::JoinHandle<std::io::Result<()>>,
) {
    supervisor.shutdown().await;
    rtc_monitor_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), rtc_monitor_task).await;
    control_server.abort();
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn init_logging(level: LogLevel, verbose_count: u8, logging: &config::LoggingConfig) {
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "selkies_rs=error,tower_http=error".to_string(),
        LogLevel::Warn => "selkies_rs=warn,tower_http=warn".to_string(),
        LogLevel::Info => format!("selkies_rs={},tower_http=info", logging.filter),
        LogLevel::Verbose => "selkies_rs=debug,tower_http=info".to_string(),
        LogLevel::Debug => "selkies_rs=debug,tower_http=debug".to_string(),
        LogLevel::Trace => "selkies_rs=trace,tower_http=debug".to_string(),
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    if let Err(err) = result {
        eprintln!("failed to initialize tracing: {err}");
    }
}

fn get_data_dir() -> PathBuf {
    PathBuf::from("/etc/selkies-rs")
}

fn resolve_bind_addresses(signaling: &SignalingConfig) -> anyhow::Result<Vec<IpAddr>> {
    let mut seen = HashSet::new();
    let mut addrs = Vec::new();
    for addr in &signaling.bind_addresses {
        let ip: IpAddr = addr.parse().map_err(|_| anyhow::anyhow!("invalid bind address: {addr}"))?;
        if seen.insert(ip) {
            addrs.push(ip);
        }
    }
    Ok(addrs)
}

fn bind_tcp_listeners(addrs: &[IpAddr], port: u16) -> anyhow::Result<Vec<std::net::TcpListener>> {
    let mut listeners = Vec::new();
    for ip in addrs {
        let addr = SocketAddr::new(*ip, port);
        match bind_tcp_listener(addr) {
            Ok(listener) => listeners.push(listener),
            Err(err) => tracing::warn!(%addr, error = %err, "failed to bind address"),
        }
    }
    if listeners.is_empty() {
        anyhow::bail!("failed to bind any address on port {port}");
    }
    Ok(listeners)
}

async fn load_or_generate_tls(
    signaling: &SignalingConfig,
    data_dir: &std::path::Path,
) -> anyhow::Result<axum_server::tls_rustls::RustlsConfig> {
    if let (Some(cert_path), Some(key_path)) = (&signaling.ssl_cert_path, &signaling.ssl_key_path) {
        return Ok(axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?);
    }

    let cert_dir = data_dir.join("certs");
    let cert_path = cert_dir.join("server.crt");
    let key_path = cert_dir.join("server.key");

    if !cert_path.exists() || !key_path.exists() {
        tracing::info!("generating self-signed tls certificate");
        let subject_alt_names = vec!["localhost".to_string(), "127.0.0.1".to_string(), "::1".to_string()];
        let certified_key = rcgen::generate_simple_self_signed(subject_alt_names)?;
        tokio::fs::create_dir_all(&cert_dir).await?;
        tokio::fs::write(&cert_path, certified_key.cert.pem()).await?;
        tokio::fs::write(&key_path, certified_key.signing_key.serialize_pem()).await?;
    } else {
        tracing::info!(dir = %cert_dir.display(), "using existing tls certificate");
    }

    Ok(axum_server::tls_rustls::RustlsConfig::from_pem_file(&cert_path, &key_path).await?)
}
