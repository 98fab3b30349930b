//! Shared process state: a single `ServerCtx` threaded through every entry
//! point instead of static managers.

mod character_state;
mod clock;
mod demon_state;
mod session;
mod session_registry;

pub use character_state::{CharacterState, ComputedStats};
pub use clock::{ClockSource, WorldClock};
pub use demon_state::{DemonComputedStats, DemonState};
pub use session::Session;
pub use session_registry::{SessionRegistry, SharedSession};

use crate::account::AccountManager;
use crate::action::ActionGroupRegistry;
use crate::config::Config;
use crate::db::Store;
use crate::definitions::Definitions;
use crate::event::{EventRuntime, ScriptHost};
use crate::network::WorldConnection;
use crate::sync::SyncManager;
use crate::zone::ZoneManager;
use std::sync::Arc;

/// Everything an entry point needs to act on the world: the persistent
/// store, the immutable content tables, the zones this channel owns, the
/// live session directory, the data-sync fabric, the world connection, the
/// account/character manager, the event graph, the authored action-group
/// table, the embedded-script seam, and the shared clock. Passed by
/// reference (or cloned, since every field is itself cheaply
/// `Arc`-clonable) rather than reached for through statics.
#[derive(Clone)]
pub struct ServerCtx {
    pub store: Store,
    pub definitions: Arc<Definitions>,
    pub zones: Arc<ZoneManager>,
    pub sessions: Arc<SessionRegistry>,
    pub sync: Arc<SyncManager>,
    pub world_conn: Arc<WorldConnection>,
    pub account: Arc<AccountManager>,
    pub event_runtime: Arc<EventRuntime>,
    pub action_groups: Arc<ActionGroupRegistry>,
    pub script_host: Arc<dyn ScriptHost>,
    pub clock: WorldClock,
    pub config: Arc<Config>,
}

impl ServerCtx {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        definitions: Arc<Definitions>,
        zones: Arc<ZoneManager>,
        sessions: Arc<SessionRegistry>,
        sync: Arc<SyncManager>,
        world_conn: Arc<WorldConnection>,
        account: Arc<AccountManager>,
        event_runtime: Arc<EventRuntime>,
        action_groups: Arc<ActionGroupRegistry>,
        script_host: Arc<dyn ScriptHost>,
        config: Arc<Config>,
    ) -> Self {
        Self {
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
            clock: WorldClock::system(),
            config,
        }
    }
}
