//! channeld - the channel server process.
//!
//! Composition root only: everything it does is construct the
//! collaborators `ServerCtx` threads through entry points, start the
//! background sweeps (session timeout, loot expiration), and expose
//! metrics. The client-facing listener and wire codec are external
//! collaborators and are not started here; a deployment wires a concrete
//! `ClientCodec` transport in front of this process's library entry
//! points.

use std::sync::Arc;
use std::time::Duration;

use channel_server::account::AccountManager;
use channel_server::action::ActionGroupRegistry;
use channel_server::config::Config;
use channel_server::db::Store;
use channel_server::definitions::Definitions;
use channel_server::event::{EventRuntime, NoopScriptHost};
use channel_server::network::WorldConnection;
use channel_server::state::{SessionRegistry, ServerCtx};
use channel_server::sync::SyncManager;
use channel_server::zone::ZoneManager;
use tracing::{error, info, warn};

/// Resolves the configuration path from CLI arguments: `-c <path>`,
/// `--config <path>`, a bare path, or `config.toml` if nothing is given.
fn resolve_config_path() -> String {
    let mut args = std::env::args().skip(1);
    match args.next() {
        Some(flag) if flag == "-c" || flag == "--config" => args.next().unwrap_or_else(|| {
            eprintln!("Missing path after {flag}");
            std::process::exit(1);
        }),
        Some(path) => path,
        None => "config.toml".to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = resolve_config_path();

    let config = Config::load(&config_path).map_err(|e| {
        eprintln!("ERROR: failed to load config from {config_path}: {e}");
        e
    })?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match config.server.log_format {
        channel_server::config::LogFormat::Json => {
            tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true).json().init();
        }
        channel_server::config::LogFormat::Pretty => {
            tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true).init();
        }
    }

    if let Err(errors) = channel_server::config::validate(&config) {
        for err in &errors {
            error!(error = %err, "configuration validation failed");
        }
        return Err(anyhow::anyhow!(
            "configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    info!(
        channel_id = config.server.channel_id,
        name = %config.server.name,
        "starting channeld"
    );

    channel_server::metrics::init();
    tokio::spawn(channel_server::metrics::run_http_server(config.server.metrics_port));

    let store = Store::connect(&config.database.url, config.database.max_connections).await?;
    // The lobby store resolves `Account` records; absent a second
    // connection string, this channel's own store doubles as the lobby
    // store, matching how `AccountManager::new` takes a single `Store`
    // handle: which store resolves a given UUID is a per-type choice,
    // not a hardwired second connection.
    let lobby_store = store.clone();

    let definitions = Arc::new(Definitions::load(&config.definitions_path).unwrap_or_else(|e| {
        warn!(error = %e, path = %config.definitions_path, "failed to load definitions, starting with empty tables");
        Definitions::default()
    }));

    let zones = Arc::new(ZoneManager::new());
    let sessions = Arc::new(SessionRegistry::new());
    let sync = Arc::new(SyncManager::new());
    let (world_conn, mut world_outbound_rx) = WorldConnection::new();
    let world_conn = Arc::new(world_conn);
    // The actual socket write to the world server is an external
    // collaborator's concern; this just keeps the outbound
    // queue from growing unbounded until a real transport task replaces
    // it.
    tokio::spawn(async move {
        while let Some(packet) = world_outbound_rx.recv().await {
            tracing::trace!(?packet, "world outbound packet queued (no transport wired)");
        }
    });
    let account = Arc::new(AccountManager::new(lobby_store));
    let event_runtime = Arc::new(EventRuntime::new());
    let action_groups = Arc::new(ActionGroupRegistry::new());
    let script_host = Arc::new(NoopScriptHost) as Arc<dyn channel_server::event::ScriptHost>;

    let ctx = ServerCtx::new(
        store,
        definitions,
        zones,
        sessions,
        sync,
        world_conn,
        account,
        event_runtime,
        action_groups,
        script_host,
        Arc::new(config.clone()),
    );

    spawn_session_timeout_sweep(ctx.clone(), config.server.session_sweep_interval_secs, config.server.session_timeout_secs);
    spawn_loot_expiration_sweep(ctx.clone());

    info!("channeld ready");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, exiting");
    Ok(())
}

/// Periodic sweep reporting idle sessions to the world as timed out (spec
/// §4.C, §5 "session timeout sweep runs every 10s").
fn spawn_session_timeout_sweep(ctx: ServerCtx, interval_secs: u64, timeout_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            let timeout_secs = timeout_secs as i64;
            ctx.sessions.schedule_timeouts(timeout_secs, |username| {
                channel_server::metrics::SESSION_TIMEOUTS.inc();
                ctx.world_conn.send_packet(channel_server::network::WorldPacket::AccountLogout {
                    action: channel_server::network::LogoutNotifyAction::TimedOut,
                    username: username.to_string(),
                    kick_level: None,
                });
                if let Some(session) = ctx.sessions.by_username(username) {
                    let ctx = ctx.clone();
                    tokio::spawn(async move { ctx.account.logout(&ctx, &session, false).await });
                }
            });
        }
    });
}

/// Periodic sweep expiring scheduled loot-box removals across every zone.
fn spawn_loot_expiration_sweep(ctx: ServerCtx) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            ctx.zones.run_scheduled_removals(chrono::Utc::now());
        }
    });
}
