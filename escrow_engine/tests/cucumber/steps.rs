use std::str::FromStr;

use chrono::Duration;
use cucumber::{then, when};
use escrow_engine::{
    db_types::{Money, OrderStatusType, UserId, WalletTxAction},
    dispute::SellerShare,
    timers::{ExpiryKind, JobKey},
};

use crate::cucumber::EscrowWorld;

fn tx_action(s: &str) -> WalletTxAction {
    match s {
        "HOLD" => WalletTxAction::Hold,
        "RELEASE" => WalletTxAction::Release,
        "REFUND" => WalletTxAction::Refund,
        "PAYOUT" => WalletTxAction::Payout,
        _ => panic!("Unknown ledger action {s}"),
    }
}

fn expiry_kind(s: &str) -> ExpiryKind {
    match s {
        "hold" => ExpiryKind::Hold,
        "trade" => ExpiryKind::Trade,
        _ => panic!("Unknown timer {s}"),
    }
}

#[when(expr = "{word} buys the item")]
async fn buy(world: &mut EscrowWorld, buyer: String) {
    let item_id = world.item().item_id.clone();
    let result = world.system().api.buy(&UserId::from(buyer), &item_id).await;
    world.record(result);
}

#[when(expr = "{word} accepts the order")]
async fn accept(world: &mut EscrowWorld, seller: String) {
    let id = world.order().order_id.clone();
    let result = world.system().api.seller_accept(&id, &UserId::from(seller)).await;
    world.record(result);
}

#[when(expr = "{word} confirms the order as the buyer")]
async fn buyer_confirm(world: &mut EscrowWorld, buyer: String) {
    let id = world.order().order_id.clone();
    let result = world.system().api.buyer_confirm(&id, &UserId::from(buyer)).await;
    world.record(result);
}

#[when(expr = "{word} confirms the order as the seller")]
async fn seller_confirm(world: &mut EscrowWorld, seller: String) {
    let id = world.order().order_id.clone();
    let result = world.system().api.seller_confirm(&id, &UserId::from(seller)).await;
    world.record(result);
}

#[when(expr = "{word} cancels the order")]
async fn cancel(world: &mut EscrowWorld, user: String) {
    let id = world.order().order_id.clone();
    let result = world.system().api.cancel(&id, &UserId::from(user)).await;
    world.record(result);
}

#[when(expr = "{word} disputes the order because {word}")]
async fn dispute(world: &mut EscrowWorld, user: String, reason: String) {
    let id = world.order().order_id.clone();
    let result = world.system().api.raise_dispute(&id, &UserId::from(user), &reason).await;
    world.record(result);
}

#[when(expr = "{word} resolves the dispute giving {int} percent to the seller")]
async fn resolve(world: &mut EscrowWorld, admin: String, pct: i64) {
    let id = world.order().order_id.clone();
    let share = SellerShare::Percent(pct);
    let result = world.system().api.admin_resolve(&id, &UserId::from(admin), share, None).await;
    world.record(result);
}

#[when(expr = "the {word} deadline passes")]
async fn deadline_passes(world: &mut EscrowWorld, timer: String) {
    let kind = expiry_kind(&timer);
    let sys = world.system();
    let order = sys.order(&world.order().order_id).await;
    let deadline = match kind {
        ExpiryKind::Hold => order.deadline_at,
        ExpiryKind::Trade => order.trade_deadline_at.expect("The order has no trade deadline"),
    };
    let outcome = sys
        .api
        .expire_if_due(&order.order_id, kind, deadline + Duration::seconds(1))
        .await
        .expect("Error running the expiry path");
    let order = sys.order(&order.order_id).await;
    world.order = Some(order);
    world.last_expiry = Some(outcome);
}

#[then(expr = "the order status is {word}")]
async fn check_status(world: &mut EscrowWorld, status: String) {
    let expected = OrderStatusType::from_str(&status).expect("Not a valid order status");
    let order = world.system().order(&world.order().order_id).await;
    assert_eq!(order.status, expected);
}

#[then(expr = "{word} has a balance of {int} with {int} held")]
async fn check_wallet(world: &mut EscrowWorld, user: String, balance: i64, held: i64) {
    let wallet = world.system().wallet(&user).await;
    assert_eq!(wallet.balance, Money::from_units(balance), "Balance of {user} is incorrect");
    assert_eq!(wallet.held, Money::from_units(held), "Held funds of {user} are incorrect");
}

#[then(expr = "the order has {int} {word} ledger entry for {int}")]
async fn check_ledger(world: &mut EscrowWorld, count: usize, action: String, amount: i64) {
    let entries = world.system().ledger_entries(&world.order().order_id, tx_action(&action)).await;
    assert_eq!(entries.len(), count, "{entries:?}");
    assert!(entries.iter().all(|(_, a)| *a == Money::from_units(amount)), "{entries:?}");
}

#[then(expr = "the order has no {word} ledger entries")]
async fn check_no_ledger(world: &mut EscrowWorld, action: String) {
    let entries = world.system().ledger_entries(&world.order().order_id, tx_action(&action)).await;
    assert!(entries.is_empty(), "{entries:?}");
}

#[then(expr = "the request fails with {word}")]
async fn check_error(world: &mut EscrowWorld, kind: String) {
    let err = world.last_error.as_ref().expect("The last request succeeded");
    assert_eq!(err.kind(), kind, "{err}");
}

#[then(expr = "the {word} timer is pending")]
async fn check_timer_pending(world: &mut EscrowWorld, timer: String) {
    let key = JobKey::new(&world.order().order_id, expiry_kind(&timer));
    assert!(world.system().scheduler().is_pending(&key), "{key} is not pending");
}

#[then(expr = "the {word} timer is not pending")]
async fn check_timer_not_pending(world: &mut EscrowWorld, timer: String) {
    let key = JobKey::new(&world.order().order_id, expiry_kind(&timer));
    assert!(!world.system().scheduler().is_pending(&key), "{key} is still pending");
}

#[then("the timer changed nothing")]
async fn check_timer_noop(world: &mut EscrowWorld) {
    let outcome = world.last_expiry.as_ref().expect("No timer has fired");
    assert!(!outcome.is_changed(), "{outcome:?}");
}
