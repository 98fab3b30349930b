//! Table-driven action dispatcher.
//!
//! Authored content never wires up a handler directly; every action group
//! is a plain `Vec<Action>` keyed by group id in [`ActionGroupRegistry`],
//! looked up and run synchronously off the event graph's dispatch chain
//! (`EventRuntime::dispatch_current`'s `PerformActions` arm). Handlers
//! that need to touch the `Store` detach their write behind a
//! `tokio::spawn` rather than holding a lock across an `.await`.

mod fanout;
mod handlers;
mod types;

pub use fanout::{Location, SourceContext};
pub use types::{Action, ActionType, ItemMode, ZoneInstanceMode};

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::state::{CharacterState, ServerCtx, SharedSession};

/// Authored action groups, keyed by the id an [`crate::event::EventDefinition`]
/// or [`crate::zone::FlagSetTrigger`] references. Populated once at
/// startup from content tables; never mutated at runtime except by
/// whatever reload path the content pipeline uses.
#[derive(Debug, Default)]
pub struct ActionGroupRegistry {
    groups: HashMap<u32, Vec<Action>>,
}

impl ActionGroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, group_id: u32, actions: Vec<Action>) {
        self.groups.insert(group_id, actions);
    }

    pub fn get(&self, group_id: u32) -> Option<&[Action]> {
        self.groups.get(&group_id).map(Vec::as_slice)
    }
}

/// Entry point called from the event graph's `PerformActions` node (spec
/// §4.G/§4.H). `character` is the triggering session's already-locked
/// state; looks the group up and runs it, doing nothing if the id is
/// unregistered.
pub fn run_event_actions(ctx: &ServerCtx, session: &SharedSession, character: &mut CharacterState, group_id: u32) {
    let Some(actions) = ctx.action_groups.get(group_id) else {
        debug!(group_id, "run_event_actions: unknown action group");
        return;
    };
    dispatch_actions(ctx, session, character, actions, Some(group_id), 0);
}

/// Re-enters `group_id` at `start_index` after a channel hand-off (spec
/// §4.G: "the target channel resumes after the executed actions").
pub fn resume_event_actions(ctx: &ServerCtx, session: &SharedSession, character: &mut CharacterState, group_id: u32, start_index: usize) {
    let Some(actions) = ctx.action_groups.get(group_id) else {
        debug!(group_id, "resume_event_actions: unknown action group");
        return;
    };
    if start_index >= actions.len() {
        return;
    }
    dispatch_actions(ctx, session, character, &actions[start_index..], Some(group_id), start_index);
}

/// Runs an inline action list against `session`/`character`, e.g. a
/// [`crate::zone::FlagSetTrigger`]'s `actions` firing off a `ZONE_FLAGS`
/// write. Shares the same fan-out and failure-policy handling as
/// [`run_event_actions`]. Has no action group id of its own, so a
/// channel switch triggered from inside one of these can't leave a
/// resume cursor behind.
pub(crate) fn run_actions(ctx: &ServerCtx, session: &SharedSession, character: &mut CharacterState, actions: &[Action]) {
    dispatch_actions(ctx, session, character, actions, None, 0);
}

/// `base_index` is the offset `actions[0]` sits at within the full,
/// unsliced group — `0` for a fresh dispatch, the resume point for
/// [`resume_event_actions`] — so a cursor recorded on a second
/// interruption still lands on the right absolute index.
fn dispatch_actions(
    ctx: &ServerCtx,
    session: &SharedSession,
    character: &mut CharacterState,
    actions: &[Action],
    group_id: Option<u32>,
    base_index: usize,
) {
    for (idx, action) in actions.iter().enumerate() {
        let targets = fanout::resolve_targets(ctx, session, action.source_context, action.location);
        for target in &targets {
            let success = with_target_character(ctx, session, character, target, |target_character| {
                handlers::execute(ctx, target, target_character, &action.action_type)
            });

            if success {
                continue;
            }

            if let Some(event_id) = &action.on_failure_event {
                with_target_character(ctx, session, character, target, |target_character| {
                    ctx.event_runtime.handle_event(ctx, target, target_character, event_id, 0).is_ok()
                });
            }
            if action.stop_on_failure {
                return;
            }
        }

        // `PrepareChannelChange` parked a `ChannelLogin` on the account
        // manager and flagged the session mid-fan-out above; stamp the
        // resume point onto it before this group's remaining actions are
        // skipped, so the target channel picks up right after this one.
        if session.read().channel_switch_pending {
            if let Some(group_id) = group_id {
                ctx.account.set_pending_action_cursor(character.uuid, group_id, (base_index + idx + 1) as u32);
            }
            return;
        }
    }
}

/// Runs `f` against `target`'s live character state.
///
/// When `target` is the same session as `source` — the common case for a
/// `SourceContext::Source` action — reuses the caller's already-held
/// `&mut CharacterState` instead of re-locking it: `parking_lot::RwLock`
/// isn't reentrant, and the event graph calling into this module already
/// holds that exact lock for the whole dispatch. For any other fanned-out
/// target, acquires a fresh write lock through `AccountManager`.
fn with_target_character(
    ctx: &ServerCtx,
    source: &SharedSession,
    source_character: &mut CharacterState,
    target: &SharedSession,
    f: impl FnOnce(&mut CharacterState) -> bool,
) -> bool {
    if Arc::ptr_eq(source, target) {
        return f(source_character);
    }

    let Some(char_uuid) = target.read().character else {
        debug!("action target session has no character loaded");
        return false;
    };
    let Some(lock) = ctx.account.character(char_uuid) else {
        warn!(%char_uuid, "action target character not resident");
        return false;
    };
    let mut guard = lock.write();
    f(&mut guard)
}
