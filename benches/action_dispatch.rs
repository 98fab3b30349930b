//! Benchmarks the table-driven action dispatcher's hot path: resolving
//! fan-out targets and running a short action list against a single
//! session, the same shape `EventRuntime`'s `PerformActions` node drives
//! on every event graph traversal.

use std::sync::Arc;

use channel_server::account::AccountManager;
use channel_server::action::{Action, ActionGroupRegistry, ActionType};
use channel_server::config::{Config, DatabaseConfig, LimitsConfig, SecurityConfig, ServerConfig, WorldConfig};
use channel_server::config::LogFormat;
use channel_server::db::{Character, CharacterProgress, Store};
use channel_server::definitions::Definitions;
use channel_server::event::{EventRuntime, NoopScriptHost};
use channel_server::network::WorldConnection;
use channel_server::state::{CharacterState, ServerCtx, Session, SessionRegistry};
use channel_server::sync::SyncManager;
use channel_server::zone::ZoneManager;
use criterion::{criterion_group, criterion_main, Criterion};
use uuid::Uuid;

fn test_config() -> Config {
    Config {
        server: ServerConfig {
            channel_id: 1,
            expected_client_version: "1.000".into(),
            name: "bench-channel".into(),
            listen_address: "127.0.0.1:0".parse().unwrap(),
            log_format: LogFormat::Pretty,
            metrics_port: 0,
            session_sweep_interval_secs: 10,
            session_timeout_secs: 300,
        },
        world: WorldConfig {
            address: "127.0.0.1:0".parse().unwrap(),
            link_password: "bench".into(),
            reconnect_secs: 5,
            sync_flush_interval_ms: 100,
        },
        database: DatabaseConfig {
            url: ":memory:".into(),
            max_connections: 1,
        },
        limits: LimitsConfig::default(),
        security: SecurityConfig::default(),
        definitions_path: ".".into(),
    }
}

async fn build_ctx() -> ServerCtx {
    let store = Store::connect(":memory:", 1).await.expect("in-memory store");
    ServerCtx::new(
        store.clone(),
        Arc::new(Definitions::default()),
        Arc::new(ZoneManager::new()),
        Arc::new(SessionRegistry::new()),
        Arc::new(SyncManager::new()),
        Arc::new(WorldConnection::new().0),
        Arc::new(AccountManager::new(store)),
        Arc::new(EventRuntime::new()),
        Arc::new(ActionGroupRegistry::new()),
        Arc::new(NoopScriptHost) as Arc<dyn channel_server::event::ScriptHost>,
        Arc::new(test_config()),
    )
}

fn bench_run_event_actions(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ctx = rt.block_on(build_ctx());
    // `tokio::spawn` calls inside the action handlers (e.g. persisting a
    // character after `SET_HOMEPOINT`) need a runtime context present on
    // this thread for the whole benchmark; held for the run, not awaited.
    let _guard = rt.enter();

    let mut registry = ActionGroupRegistry::new();
    registry.register(
        1,
        vec![
            Action::new(ActionType::SetHomepoint),
            Action::new(ActionType::UpdatePoints { point_type: 0, delta: 10 }),
        ],
    );
    let ctx = ServerCtx { action_groups: Arc::new(registry), ..ctx };

    let character = Character {
        uuid: Uuid::new_v4(),
        account: Uuid::new_v4(),
        name: "Bencher".into(),
        level: 50,
        lnc: 0,
        homepoint_zone: 1,
        homepoint_spot: 1,
        progress: Uuid::new_v4(),
        item_boxes: Vec::new(),
        demon_boxes: Vec::new(),
        active_demon: None,
    };
    let progress = CharacterProgress {
        uuid: character.progress,
        character: character.uuid,
        completed_quests: Vec::new(),
        active_quests: Vec::new(),
    };
    let mut character_state = CharacterState::new(character, progress);

    let session = Arc::new(parking_lot::RwLock::new(Session::new("bencher")));

    c.bench_function("run_event_actions/two_actions", |b| {
        b.iter(|| {
            channel_server::action::run_event_actions(&ctx, &session, &mut character_state, 1);
        });
    });
}

criterion_group!(benches, bench_run_event_actions);
criterion_main!(benches);
