//! Context fan-out: resolves which live sessions an action's
//! `source_context`/`location` selectors actually target.
//!
//! Generalizes per-recipient-group broadcast resolution to "every session
//! matching this zone/instance/channel/world scope".

use tracing::debug;

use crate::state::{ServerCtx, SharedSession};

/// Which sessions an action applies to, relative to the one that
/// triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceContext {
    /// Only the triggering session.
    Source,
    /// Every live session in scope.
    All,
    /// Every member of the triggering session's party.
    Party,
}

/// Which sessions count as "in scope" for a non-`Source` selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Zone,
    Instance,
    Channel,
    World,
}

/// Resolves `selector`/`location` against `source` into the concrete set
/// of sessions an action runs against.
pub fn resolve_targets(ctx: &ServerCtx, source: &SharedSession, selector: SourceContext, location: Location) -> Vec<SharedSession> {
    match selector {
        SourceContext::Source => vec![source.clone()],
        SourceContext::Party => {
            // Party rosters are authoritative on the world server (spec
            // §4.I: party chat is relayed, not resolved locally); without
            // a local party roster this selector degrades to the source
            // alone rather than fabricating membership data.
            debug!("PARTY source_context has no local roster, falling back to source session");
            vec![source.clone()]
        }
        SourceContext::All => {
            let source_zone = source.read().zone_id;
            let mut targets = Vec::new();
            ctx.sessions.broadcast(|session| {
                if location_matches(ctx, session, location, source_zone) {
                    targets.push(session.clone());
                }
            });
            targets
        }
    }
}

fn location_matches(ctx: &ServerCtx, session: &SharedSession, location: Location, source_zone: Option<u32>) -> bool {
    match location {
        Location::Channel | Location::World => true,
        Location::Zone => session.read().zone_id == source_zone,
        Location::Instance => match (source_zone, session.read().zone_id) {
            (Some(sz), Some(tz)) => {
                let source_instance = ctx.zones.instance_owning_zone(sz);
                source_instance.is_some() && source_instance == ctx.zones.instance_owning_zone(tz)
            }
            _ => false,
        },
    }
}
