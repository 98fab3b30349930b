//! Shop purchase handling (`PACKET_SHOP_BUY`).
//!
//! Two entirely different purchase paths share one request: ordinary
//! products are paid for in macca (modeled as an item stack, the way the
//! original's `CalculateMaccaPayment` draws from the inventory rather than
//! an account balance) and delivered to the inventory; CP products are
//! paid for from the account's CP ledger and delivered to the target
//! account's post mailbox instead, optionally gifted to another character.

use tracing::warn;
use uuid::Uuid;

use crate::db::{Account, ChangeSet, Item, ItemBox, PersistentRecord, PostItem};
use crate::definitions::{ItemDefinition, ShopProductDefinition};
use crate::error::StoreError;
use crate::network::{ServerPacket, ShopBuyRequest};
use crate::state::{ServerCtx, SharedSession};

/// Server-constant macca item type (`SVR_CONST.ITEM_MACCA` in the
/// original); macca is modeled as an item stack, not an account field.
const MACCA_ITEM_TYPE: u32 = 1;

/// Buys one shop product and sends the `ShopBuy` reply. `result` is `0`
/// on success, `-1` when the purchase would overflow the destination
/// (inventory or post mailbox), and any other negative value for every
/// other rejection (unknown product, unaffordable, bad gift target).
pub async fn buy(ctx: &ServerCtx, session: &SharedSession, req: ShopBuyRequest) {
    if req.quantity == 0 {
        // Matches the original parser's early return for `quantity <= 0`.
        reply(session, &req, 0);
        return;
    }

    let Some(character_uuid) = session.read().character else {
        reply(session, &req, -2);
        return;
    };

    let Some(product) = ctx.definitions.shop_product(req.product_id).cloned() else {
        warn!(shop_id = req.shop_id, product_id = req.product_id, "shop purchase: unknown product");
        reply(session, &req, -2);
        return;
    };
    let Some(item_def) = ctx.definitions.item(product.item_id).cloned() else {
        warn!(product_id = req.product_id, item_id = product.item_id, "shop purchase: unknown item");
        reply(session, &req, -2);
        return;
    };

    let base_price = product.price.max(1) as i64;

    let result = if product.cp_item {
        buy_with_cp(ctx, session, character_uuid, &req, &product, base_price).await
    } else {
        buy_with_items(ctx, character_uuid, &item_def, req.quantity, base_price * req.quantity as i64).await
    };

    reply(session, &req, result);
}

fn reply(session: &SharedSession, req: &ShopBuyRequest, result: i32) {
    session.read().send(ServerPacket::ShopBuy {
        shop_id: req.shop_id,
        product_id: req.product_id,
        result,
        flag: 1,
        unknown: 0,
    });
}

/// Non-CP path: pay `price` in macca drawn from the character's main item
/// box, then fill existing stacks of the purchased item before creating
/// new ones, directly awaiting the store so an over-capacity box can be
/// reported back as `-1` rather than silently dropping the remainder the
/// way `action::handlers::add_remove_items`'s detached-spawn version does.
async fn buy_with_items(ctx: &ServerCtx, character_uuid: Uuid, item_def: &ItemDefinition, quantity: u16, price: i64) -> i32 {
    let Some(character_state) = ctx.account.character(character_uuid) else {
        return -2;
    };
    let Some(box_uuid) = character_state.read().character.item_boxes.first().copied() else {
        return -2;
    };

    let mut item_box: ItemBox = match ctx.store.load(box_uuid, true).await {
        Ok(b) => b,
        Err(e) => {
            warn!(%box_uuid, error = %e, "shop purchase: failed to load item box");
            return -2;
        }
    };

    let mut items = Vec::new();
    for slot in item_box.slots.iter().flatten().copied().collect::<Vec<_>>() {
        match ctx.store.load::<Item>(slot, true).await {
            Ok(item) => items.push(item),
            Err(e) => warn!(%slot, error = %e, "shop purchase: item slot failed to load"),
        }
    }

    let macca_available: i64 = items.iter().filter(|i| i.item_type == MACCA_ITEM_TYPE).map(|i| i.stack_size as i64).sum();
    if macca_available < price {
        return -2;
    }

    let mut change_set = ChangeSet::new();
    let mut owed = price;
    for item in items.iter_mut().filter(|i| i.item_type == MACCA_ITEM_TYPE) {
        if owed == 0 {
            break;
        }
        let take = owed.min(item.stack_size as i64);
        item.stack_size -= take as u16;
        owed -= take;
        change_set = change_set.update(item.uuid, item.clone().into_record());
    }

    let stack_cap = item_def.stack_size;
    let mut qty_left = quantity as i32;
    for item in items.iter_mut().filter(|i| i.item_type == item_def.id) {
        if qty_left == 0 {
            break;
        }
        let room = stack_cap.saturating_sub(item.stack_size) as i32;
        if room == 0 {
            continue;
        }
        let add = qty_left.min(room);
        item.stack_size += add as u16;
        qty_left -= add;
        change_set = change_set.update(item.uuid, item.clone().into_record());
    }
    while qty_left > 0 {
        let Some(slot_idx) = item_box.slots.iter().position(Option::is_none) else { break };
        let add = qty_left.min(stack_cap as i32);
        let item = ctx.store.new_record(
            |uuid| Item { uuid, item_type: item_def.id, stack_size: add as u16, box_id: Some(box_uuid), box_slot: Some(slot_idx as u16) },
            false,
        );
        item_box.slots[slot_idx] = Some(item.uuid);
        change_set = change_set.insert(item.into_record());
        qty_left -= add;
    }
    if qty_left > 0 {
        return -1;
    }

    change_set = change_set.update(box_uuid, item_box.into_record());
    match ctx.store.apply(&change_set).await {
        Ok(()) => 0,
        Err(e) => {
            warn!(error = %e, "shop purchase: failed to persist item purchase");
            -2
        }
    }
}

/// CP path: posted to the (possibly gifted) target account's mailbox
/// instead of the buyer's inventory, capped by `max_post_items` and paid
/// for with a CAS decrement against the account's CP balance.
async fn buy_with_cp(
    ctx: &ServerCtx,
    session: &SharedSession,
    character_uuid: Uuid,
    req: &ShopBuyRequest,
    product: &ShopProductDefinition,
    price: i64,
) -> i32 {
    let target_account = match &req.giftee_name {
        Some(name) => match find_giftee_account(ctx, name) {
            Some(account) => account,
            None => {
                warn!(giftee = %name, "shop purchase: gift target not found");
                return -2;
            }
        },
        None => {
            let Some(account) = session.read().account else { return -2 };
            account
        }
    };

    let post_count = match ctx.store.count_post_items(target_account).await {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "shop purchase: failed to count post items");
            return -2;
        }
    };
    if post_count + 1 >= ctx.config.limits.max_post_items {
        return -1;
    }

    let buyer_account = match session.read().account {
        Some(a) => a,
        None => return -2,
    };
    let current: Account = match ctx.store.load(buyer_account, true).await {
        Ok(a) => a,
        Err(e) => {
            warn!(error = %e, "shop purchase: failed to load buyer account");
            return -2;
        }
    };
    if current.cp < price {
        return -2;
    }

    let post_item = ctx.store.new_record(
        |uuid| PostItem {
            uuid,
            account: target_account,
            item_type: product.id,
            stack_size: product.cp_stack.max(1),
            timestamp: ctx.clock.now(),
        },
        false,
    );

    let change_set = ChangeSet::new()
        .explicit_update(buyer_account, "cp", -price, current.cp)
        .insert(post_item.into_record());

    match ctx.store.apply(&change_set).await {
        Ok(()) => {
            let new_balance = current.cp - price;
            let updated = Account { cp: new_balance, ..current };
            ctx.sync.update_record(crate::sync::SyncObject::Account(updated));
            session.read().send(ServerPacket::CashBalance { cp: new_balance, unknown: 0 });
            0
        }
        Err(StoreError::ExplicitUpdateConflict { .. }) => {
            // A concurrent CP change landed between the load and the apply;
            // the client can just retry the purchase.
            -2
        }
        Err(e) => {
            warn!(error = %e, "shop purchase: failed to apply CP purchase");
            -2
        }
    }
}

/// Finds an online character by name and returns its account uuid. No
/// secondary name index exists on the store, so only a currently
/// resident (logged-in) giftee can be resolved — an offline gift target
/// is reported the same as an unknown one.
fn find_giftee_account(ctx: &ServerCtx, name: &str) -> Option<Uuid> {
    let mut found = None;
    ctx.sessions.broadcast(|session| {
        if found.is_some() {
            return;
        }
        let s = session.read();
        let (Some(character_uuid), Some(account_uuid)) = (s.character, s.account) else { return };
        if let Some(state) = ctx.account.character(character_uuid) {
            if state.read().character.name == name {
                found = Some(account_uuid);
            }
        }
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountManager, NewCharacterTemplate};
    use crate::action::ActionGroupRegistry;
    use crate::config::{Config, DatabaseConfig, LimitsConfig, LogFormat, SecurityConfig, ServerConfig, WorldConfig};
    use crate::db::{ChangeSet as DbChangeSet, Store};
    use crate::definitions::Definitions;
    use crate::event::{EventRuntime, NoopScriptHost};
    use crate::network::WorldConnection;
    use crate::state::{Session, SessionRegistry};
    use crate::sync::SyncManager;
    use crate::zone::ZoneManager;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn config(max_post_items: usize) -> Config {
        Config {
            server: ServerConfig {
                channel_id: 1,
                expected_client_version: "1.000".into(),
                name: "test-channel".into(),
                listen_address: "127.0.0.1:0".parse().unwrap(),
                log_format: LogFormat::Pretty,
                metrics_port: 0,
                session_sweep_interval_secs: 10,
                session_timeout_secs: 300,
            },
            world: WorldConfig {
                address: "127.0.0.1:0".parse().unwrap(),
                link_password: "test".into(),
                reconnect_secs: 5,
                sync_flush_interval_ms: 100,
            },
            database: DatabaseConfig { url: ":memory:".into(), max_connections: 1 },
            limits: LimitsConfig { max_post_items, ..LimitsConfig::default() },
            security: SecurityConfig::default(),
            definitions_path: ".".into(),
        }
    }

    async fn test_ctx(products: HashMap<u32, ShopProductDefinition>, items: HashMap<u32, ItemDefinition>, max_post_items: usize) -> ServerCtx {
        let store = Store::connect(":memory:", 1).await.expect("in-memory store");
        let definitions = Definitions::from_tables(items, HashMap::new(), HashMap::new(), HashMap::new(), HashMap::new(), HashMap::new())
            .with_shop_products(products);
        ServerCtx::new(
            store.clone(),
            Arc::new(definitions),
            Arc::new(ZoneManager::new()),
            Arc::new(SessionRegistry::new()),
            Arc::new(SyncManager::new()),
            Arc::new(WorldConnection::new().0),
            Arc::new(AccountManager::new(store)),
            Arc::new(EventRuntime::new()),
            Arc::new(ActionGroupRegistry::new()),
            Arc::new(NoopScriptHost) as Arc<dyn crate::event::ScriptHost>,
            Arc::new(config(max_post_items)),
        )
    }

    /// Sets up a logged-in session with an account, a fresh character and
    /// an empty item box, returning the session and character uuid.
    async fn logged_in_session(ctx: &ServerCtx, cp: i64) -> (SharedSession, Uuid) {
        let account_uuid = Uuid::new_v4();
        ctx.store
            .apply(&DbChangeSet::new().insert(
                Account { uuid: account_uuid, username: "tester".into(), banned: false, cp, last_login: None }.into_record(),
            ))
            .await
            .unwrap();

        let (character, change_set) = ctx.account.build_new_character(
            ctx,
            account_uuid,
            "Tester",
            &NewCharacterTemplate { starting_level: 1, homepoint_zone: 1, homepoint_spot: 1 },
        );
        ctx.store.apply(&change_set).await.unwrap();
        ctx.account.initialize_character(ctx, character.uuid).await.unwrap();

        let (session, _rx) = Session::new("tester").with_outbound();
        let session = ctx.sessions.set(session);
        {
            let mut s = session.write();
            s.account = Some(account_uuid);
            s.character = Some(character.uuid);
        }
        (session, character.uuid)
    }

    #[tokio::test]
    async fn zero_quantity_is_a_no_op_success() {
        let ctx = test_ctx(HashMap::new(), HashMap::new(), 50).await;
        let (session, _char) = logged_in_session(&ctx, 0).await;

        buy(&ctx, &session, ShopBuyRequest { shop_id: 1, cache_id: 0, product_id: 1, quantity: 0, giftee_name: None, message: None }).await;
    }

    #[tokio::test]
    async fn unknown_product_is_rejected() {
        let ctx = test_ctx(HashMap::new(), HashMap::new(), 50).await;
        let (session, _char) = logged_in_session(&ctx, 1000).await;

        buy(&ctx, &session, ShopBuyRequest { shop_id: 1, cache_id: 0, product_id: 99, quantity: 1, giftee_name: None, message: None }).await;

        let account_uuid = session.read().account.unwrap();
        let reloaded: Account = ctx.store.load(account_uuid, true).await.unwrap();
        assert_eq!(reloaded.cp, 1000);
    }

    /// Buying with insufficient macca is rejected before touching the store.
    #[tokio::test]
    async fn insufficient_macca_rejects_purchase() {
        let mut items = HashMap::new();
        items.insert(10, ItemDefinition { id: 10, name: "potion".into(), category_main: 1, category_sub: 1, stack_size: 10 });
        let ctx = test_ctx(HashMap::new(), items.clone(), 50).await;
        let (_session, character_uuid) = logged_in_session(&ctx, 0).await;

        let result = buy_with_items(&ctx, character_uuid, items.get(&10).unwrap(), 1, 50).await;
        assert_eq!(result, -2);
    }

    /// A CP purchase decrements the buyer's balance, posts the item to
    /// the target mailbox, and syncs the updated account.
    #[tokio::test]
    async fn cp_purchase_debits_balance_and_posts_item() {
        let mut products = HashMap::new();
        products.insert(5, ShopProductDefinition { id: 5, item_id: 10, price: 50, cp_item: true, cp_stack: 1 });
        let mut items = HashMap::new();
        items.insert(10, ItemDefinition { id: 10, name: "cp item".into(), category_main: 1, category_sub: 1, stack_size: 1 });
        let ctx = test_ctx(products, items, 50).await;
        let (session, _character_uuid) = logged_in_session(&ctx, 100).await;

        let req = ShopBuyRequest { shop_id: 1, cache_id: 0, product_id: 5, quantity: 1, giftee_name: None, message: None };
        buy(&ctx, &session, req).await;

        let account_uuid = session.read().account.unwrap();
        let reloaded: Account = ctx.store.load(account_uuid, true).await.unwrap();
        assert_eq!(reloaded.cp, 50);

        let post_count = ctx.store.count_post_items(account_uuid).await.unwrap();
        assert_eq!(post_count, 1);
    }

    /// Exceeding the configured post-mailbox cap returns the over-capacity
    /// result code instead of posting another item.
    #[tokio::test]
    async fn cp_purchase_over_capacity_is_rejected() {
        let mut products = HashMap::new();
        products.insert(5, ShopProductDefinition { id: 5, item_id: 10, price: 10, cp_item: true, cp_stack: 1 });
        let mut items = HashMap::new();
        items.insert(10, ItemDefinition { id: 10, name: "cp item".into(), category_main: 1, category_sub: 1, stack_size: 1 });
        let ctx = test_ctx(products, items, 1).await;
        let (session, _character_uuid) = logged_in_session(&ctx, 1000).await;

        let req = ShopBuyRequest { shop_id: 1, cache_id: 0, product_id: 5, quantity: 1, giftee_name: None, message: None };
        buy(&ctx, &session, req.clone()).await;
        buy(&ctx, &session, req).await;

        let account_uuid = session.read().account.unwrap();
        let post_count = ctx.store.count_post_items(account_uuid).await.unwrap();
        assert_eq!(post_count, 1);

        let reloaded: Account = ctx.store.load(account_uuid, true).await.unwrap();
        assert_eq!(reloaded.cp, 990);
    }
}
