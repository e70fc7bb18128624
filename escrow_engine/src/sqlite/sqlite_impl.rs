//! `SqliteDatabase` is a concrete implementation of an escrow engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`traits`] module.
//! Every order transition opens one transaction, composes the low-level functions in [`super::db`] on it, and commits
//! only once all guards have passed and all writes have succeeded.
//!
//! [`traits`]: crate::traits
use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;
use sqlx::{migrate::MigrateError, Sqlite, SqliteConnection, SqlitePool, Transaction};

use super::db::{auth, db_url, disputes, events, items, ledger, lock_for_write, new_pool, orders};
use crate::{
    db_types::{
        AutoVerdict,
        Dispute,
        DisputeSettlement,
        DisputeStatus,
        Item,
        ItemId,
        ItemStatus,
        Money,
        NewItem,
        NewOrder,
        NewOrderEvent,
        Order,
        OrderEvent,
        OrderEventType,
        OrderId,
        OrderStatusType,
        Role,
        UserId,
        Wallet,
        WalletTx,
    },
    dispute::{self as payout, SellerShare},
    events::{ActorSide, NotificationAction},
    order_machine::{self, ConfirmPlan, ExpiryDecision, Party},
    timers::ExpiryKind,
    traits::{
        AccountManagement,
        AuthApiError,
        AuthManagement,
        CatalogManagement,
        EscrowDatabase,
        EscrowError,
        ExpiryOutcome,
        TransitionOutcome,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SqliteDatabase ({})", self.url)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL from the `ESC_DATABASE_URL` environment variable.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Opens a transaction that already holds the write lock. Every read inside it sees the latest committed state,
    /// and no other writer can change that state before this transaction commits or rolls back.
    async fn begin_write(&self) -> Result<Transaction<'_, Sqlite>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        lock_for_write(Utc::now(), &mut tx).await?;
        Ok(tx)
    }

    /// Brings the schema up to date.
    pub async fn run_migrations(&self) -> Result<(), MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }
}

async fn load_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Order, EscrowError> {
    orders::fetch_order(order_id, conn).await?.ok_or_else(|| EscrowError::order_not_found(order_id))
}

fn concurrent_change(order_id: &OrderId) -> EscrowError {
    EscrowError::InvalidState(format!("Order {order_id} was changed by another request. Please try again"))
}

impl EscrowDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_order(&self, order: NewOrder) -> Result<TransitionOutcome, EscrowError> {
        let now = order.created_at;
        let mut tx = self.begin_write().await?;
        let item = items::fetch_item(&order.item_id, &mut tx)
            .await?
            .ok_or_else(|| EscrowError::NotFound(format!("Item {} does not exist", order.item_id)))?;
        if item.seller_id == order.buyer_id {
            return Err(EscrowError::Forbidden(format!("{} cannot buy their own item {}", order.buyer_id, item.item_id)));
        }
        if item.status != ItemStatus::Available {
            return Err(EscrowError::ItemNotAvailable(format!("Item {} is {}", item.item_id, item.status)));
        }
        let balance = ledger::fetch_wallet(&order.buyer_id, &mut tx).await?.map(|w| w.balance).unwrap_or_default();
        if balance < item.price {
            return Err(EscrowError::InsufficientFunds(format!(
                "{} has {balance} available but item {} costs {}",
                order.buyer_id, item.item_id, item.price
            )));
        }
        if !items::reserve(&item.item_id, now, &mut tx).await? {
            return Err(EscrowError::ItemNotAvailable(format!("Item {} was reserved by another buyer", item.item_id)));
        }
        let order = orders::insert_order(order, &item, &mut tx).await?;
        ledger::hold(&order.buyer_id, order.total, &order.order_id, now, &mut tx).await?;
        let buyer = Some(&order.buyer_id);
        events::insert_events(
            [
                NewOrderEvent::new(
                    &order.order_id,
                    buyer,
                    OrderEventType::OrderCreated,
                    format!("Order created for item {} at {}", order.item_id, order.price_at_purchase),
                ),
                NewOrderEvent::new(
                    &order.order_id,
                    buyer,
                    OrderEventType::EscrowHeld,
                    format!("{} held in escrow until the seller accepts", order.total),
                ),
            ],
            now,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        info!("🗃️ Order [{}] created. {} is in escrow", order.order_id, order.total);
        let deadline = order.deadline_at;
        Ok(TransitionOutcome::new(order)
            .schedule(ExpiryKind::Hold, deadline)
            .notify_parties(NotificationAction::Created, ActorSide::Buyer))
    }

    async fn seller_accept(
        &self,
        order_id: &OrderId,
        actor: &UserId,
        now: DateTime<Utc>,
        trade_window: Duration,
    ) -> Result<TransitionOutcome, EscrowError> {
        let mut tx = self.begin_write().await?;
        let order = load_order(order_id, &mut tx).await?;
        order_machine::check_seller_accept(&order, actor)?;
        let deadline = now + trade_window;
        let order =
            orders::mark_accepted(order_id, now, deadline, &mut tx).await?.ok_or_else(|| concurrent_change(order_id))?;
        events::insert_events(
            [
                NewOrderEvent::new(order_id, Some(actor), OrderEventType::SellerAccepted, "Seller accepted the order"),
                NewOrderEvent::new(
                    order_id,
                    Some(actor),
                    OrderEventType::TradeStarted,
                    format!("Trade window closes at {deadline}"),
                ),
            ],
            now,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        info!("🗃️ Order [{order_id}] accepted by the seller. Trade deadline is {deadline}");
        Ok(TransitionOutcome::new(order)
            .cancel(ExpiryKind::Hold)
            .schedule(ExpiryKind::Trade, deadline)
            .notify_parties(NotificationAction::Accepted, ActorSide::Seller))
    }

    async fn confirm(
        &self,
        order_id: &OrderId,
        actor: &UserId,
        party: Party,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, EscrowError> {
        let mut tx = self.begin_write().await?;
        let order = load_order(order_id, &mut tx).await?;
        // The write lock is held, so the other party's confirmation cannot land between this check and the update.
        let plan = order_machine::check_confirm(&order, actor, party)?;
        trace!("🗃️ Order [{order_id}] confirmation by the {}: {plan:?}", party.side());
        let order =
            orders::mark_confirmed(order_id, party, now, &mut tx).await?.ok_or_else(|| concurrent_change(order_id))?;
        let (event_type, action) = match party {
            Party::Seller => (OrderEventType::SellerConfirmed, NotificationAction::SellerConfirmed),
            Party::Buyer => (OrderEventType::BuyerConfirmed, NotificationAction::BuyerConfirmed),
        };
        let msg = format!("The {} confirmed the trade", party.side());
        events::insert_event(NewOrderEvent::new(order_id, Some(actor), event_type, msg), now, &mut tx).await?;
        if plan == ConfirmPlan::AwaitOther {
            tx.commit().await?;
            debug!("🗃️ Order [{order_id}] confirmed by the {}. Waiting for the {}", party.side(), party.other().side());
            return Ok(TransitionOutcome::new(order).notify_parties(action, party.side()));
        }
        let order = orders::finalize(order_id, OrderStatusType::AwaitConfirm, OrderStatusType::Completed, now, &mut tx)
            .await?
            .ok_or_else(|| concurrent_change(order_id))?;
        let released =
            ledger::release(order_id, &order.buyer_id, &order.seller_id, order.total, now, &mut tx).await?;
        items::mark_sold(&order.item_id, now, &mut tx).await?;
        let mut trail = Vec::with_capacity(2);
        if released {
            let msg = format!("{} released to the seller", order.total);
            trail.push(NewOrderEvent::new(order_id, Some(actor), OrderEventType::EscrowReleased, msg));
        }
        trail.push(NewOrderEvent::new(order_id, Some(actor), OrderEventType::OrderCompleted, "Both parties confirmed"));
        events::insert_events(trail, now, &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Order [{order_id}] completed. {} released to {}", order.total, order.seller_id);
        Ok(TransitionOutcome::new(order)
            .cancel_all_timers()
            .notify_parties(NotificationAction::Completed, party.side()))
    }

    async fn raise_dispute(
        &self,
        order_id: &OrderId,
        actor: &UserId,
        reason_code: &str,
        now: DateTime<Utc>,
        extension: Duration,
    ) -> Result<TransitionOutcome, EscrowError> {
        let mut tx = self.begin_write().await?;
        let order = load_order(order_id, &mut tx).await?;
        let party = order_machine::check_dispute(&order, actor)?;
        let deadline = order_machine::dispute_deadline(&order, now, extension);
        let order =
            orders::mark_disputed(order_id, now, deadline, &mut tx).await?.ok_or_else(|| concurrent_change(order_id))?;
        let dispute = disputes::open_dispute(order_id, actor, reason_code, now, &mut tx).await?;
        let msg = format!(
            "Dispute {} opened by the {}: {reason_code}. Resolution deadline is {deadline}",
            dispute.dispute_id,
            party.side()
        );
        events::insert_event(NewOrderEvent::new(order_id, Some(actor), OrderEventType::DisputeOpened, msg), now, &mut tx)
            .await?;
        tx.commit().await?;
        info!("🗃️ Order [{order_id}] disputed by the {}. Deadline extended to {deadline}", party.side());
        Ok(TransitionOutcome::new(order)
            .cancel(ExpiryKind::Trade)
            .schedule(ExpiryKind::Trade, deadline)
            .notify_parties(NotificationAction::Disputed, party.side()))
    }

    async fn cancel_order(
        &self,
        order_id: &OrderId,
        actor: &UserId,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, EscrowError> {
        let mut tx = self.begin_write().await?;
        let order = load_order(order_id, &mut tx).await?;
        let party = order_machine::check_cancel(&order, actor)?;
        if ledger::settlement_witness(order_id, &mut tx).await?.is_settled() {
            return Err(EscrowError::AlreadySettled(format!("The escrow for order {order_id} has already been settled")));
        }
        let order =
            orders::mark_cancelled(order_id, actor, now, &mut tx).await?.ok_or_else(|| concurrent_change(order_id))?;
        ledger::refund(order_id, &order.buyer_id, order.total, now, &mut tx).await?;
        items::release(&order.item_id, now, &mut tx).await?;
        events::insert_events(
            [
                NewOrderEvent::new(
                    order_id,
                    Some(actor),
                    OrderEventType::OrderCancelled,
                    format!("Cancelled by the {}", party.side()),
                ),
                NewOrderEvent::new(
                    order_id,
                    Some(actor),
                    OrderEventType::EscrowRefunded,
                    format!("{} refunded to the buyer", order.total),
                ),
            ],
            now,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        info!("🗃️ Order [{order_id}] cancelled by the {}. {} refunded", party.side(), order.total);
        Ok(TransitionOutcome::new(order)
            .cancel_all_timers()
            .notify_parties(NotificationAction::Cancelled, party.side()))
    }

    async fn expire_order(
        &self,
        order_id: &OrderId,
        kind: ExpiryKind,
        now: DateTime<Utc>,
    ) -> Result<ExpiryOutcome, EscrowError> {
        let mut tx = self.begin_write().await?;
        let order = load_order(order_id, &mut tx).await?;
        let decision = order_machine::expiry_decision(&order, kind, now);
        trace!("🗃️ Order [{order_id}] is {} and the {kind} timer fired. Decision: {decision:?}", order.status);
        let outcome = match decision {
            ExpiryDecision::NotDue(due_at) => ExpiryOutcome::NotDue { due_at },
            ExpiryDecision::Inapplicable => ExpiryOutcome::Unchanged,
            ExpiryDecision::RefundBuyer => {
                refund_on_timeout(order, kind, now, &mut tx).await?.map_or(ExpiryOutcome::Unchanged, ExpiryOutcome::Expired)
            },
            ExpiryDecision::PaySeller => {
                pay_seller_on_timeout(order, now, &mut tx).await?.map_or(ExpiryOutcome::Unchanged, ExpiryOutcome::Completed)
            },
            ExpiryDecision::AutoResolve(verdict) => auto_resolve(order, verdict, now, &mut tx)
                .await?
                .map_or(ExpiryOutcome::Unchanged, ExpiryOutcome::AutoResolved),
        };
        if outcome.is_changed() {
            tx.commit().await?;
        }
        Ok(outcome)
    }

    async fn resolve_dispute(
        &self,
        order_id: &OrderId,
        admin: &UserId,
        share: SellerShare,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, EscrowError> {
        let mut tx = self.begin_write().await?;
        let order = load_order(order_id, &mut tx).await?;
        if disputes::fetch_settlement(order_id, &mut tx).await?.is_some() {
            return Err(EscrowError::AlreadyResolved(format!("The dispute on order {order_id} has already been settled")));
        }
        order_machine::check_resolvable(&order)?;
        let dispute = disputes::fetch_dispute_for_order(order_id, &mut tx)
            .await?
            .ok_or_else(|| EscrowError::NotFound(format!("There is no dispute for order {order_id}")))?;
        if dispute.status != DisputeStatus::Open {
            return Err(EscrowError::InvalidState(format!("Dispute {} is {}", dispute.dispute_id, dispute.status)));
        }
        let split = payout::compute_split(order.total, share)?;
        let order = orders::finalize(order_id, OrderStatusType::Disputed, OrderStatusType::Completed, now, &mut tx)
            .await?
            .ok_or_else(|| concurrent_change(order_id))?;
        if !ledger::split_release(order_id, &order.buyer_id, &order.seller_id, &split, now, &mut tx).await? {
            return Err(EscrowError::AlreadySettled(format!("The escrow for order {order_id} has already been settled")));
        }
        disputes::insert_settlement(order_id, &dispute.dispute_id, &split, note.as_deref(), Some(admin), now, &mut tx)
            .await?;
        disputes::mark_resolved(&dispute.dispute_id, Some(admin), None, now, &mut tx)
            .await?
            .ok_or_else(|| EscrowError::InvalidState(format!("Dispute {} is no longer open", dispute.dispute_id)))?;
        items::mark_sold(&order.item_id, now, &mut tx).await?;
        let mut msg = format!(
            "Seller receives {}% ({}), buyer is refunded {}",
            split.seller_pct, split.seller_amount, split.buyer_amount
        );
        if let Some(note) = note.as_deref() {
            msg.push_str(". ");
            msg.push_str(note);
        }
        events::insert_event(NewOrderEvent::new(order_id, Some(admin), OrderEventType::DisputeResolved, msg), now, &mut tx)
            .await?;
        tx.commit().await?;
        info!(
            "🗃️ Dispute on order [{order_id}] resolved by {admin}. Seller {} / buyer {}",
            split.seller_amount, split.buyer_amount
        );
        Ok(TransitionOutcome::new(order)
            .cancel_all_timers()
            .notify_parties(NotificationAction::Resolved, ActorSide::Admin))
    }

    async fn fetch_overdue_orders(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Order>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_overdue_orders(now, limit, &mut conn).await?;
        Ok(orders)
    }

    async fn close(&mut self) -> Result<(), EscrowError> {
        self.pool.close().await;
        Ok(())
    }
}

/// Hold or trade timeout with a refund: the order becomes `EXPIRED` and the item goes back on sale.
///
/// Returns `None` if a concurrent transition got there first.
async fn refund_on_timeout(
    order: Order,
    kind: ExpiryKind,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<TransitionOutcome>, EscrowError> {
    let order_id = &order.order_id;
    let Some(expired) = orders::finalize(order_id, order.status, OrderStatusType::Expired, now, conn).await? else {
        return Ok(None);
    };
    let refunded = ledger::refund(order_id, &order.buyer_id, order.total, now, conn).await?;
    items::release(&order.item_id, now, conn).await?;
    let mut trail = vec![NewOrderEvent::new(order_id, None, OrderEventType::OrderExpired, kind.reason())];
    if refunded {
        let msg = format!("{} refunded to the buyer", order.total);
        trail.push(NewOrderEvent::new(order_id, None, OrderEventType::EscrowRefunded, msg));
    }
    events::insert_events(trail, now, conn).await?;
    info!("🗃️ Order [{order_id}] expired ({}). {} refunded to {}", kind.reason(), order.total, order.buyer_id);
    Ok(Some(
        TransitionOutcome::new(expired).cancel_all_timers().notify_parties(NotificationAction::Expired, ActorSide::System),
    ))
}

/// Trade timeout where only the seller confirmed: the seller is paid and the order completes.
async fn pay_seller_on_timeout(
    order: Order,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<TransitionOutcome>, EscrowError> {
    let order_id = &order.order_id;
    let Some(completed) = orders::finalize(order_id, order.status, OrderStatusType::Completed, now, conn).await? else {
        return Ok(None);
    };
    let released = ledger::release(order_id, &order.buyer_id, &order.seller_id, order.total, now, conn).await?;
    items::mark_sold(&order.item_id, now, conn).await?;
    let mut trail = Vec::with_capacity(2);
    if released {
        let msg = format!("{} released to the seller", order.total);
        trail.push(NewOrderEvent::new(order_id, None, OrderEventType::EscrowReleased, msg));
    }
    let msg = format!("{}: the seller confirmed and the buyer did not respond", ExpiryKind::Trade.reason());
    trail.push(NewOrderEvent::new(order_id, None, OrderEventType::OrderCompleted, msg));
    events::insert_events(trail, now, conn).await?;
    info!("🗃️ Order [{order_id}] completed on trade timeout. {} released to {}", order.total, order.seller_id);
    Ok(Some(
        TransitionOutcome::new(completed)
            .cancel_all_timers()
            .notify_parties(NotificationAction::Completed, ActorSide::System),
    ))
}

/// Settles a dispute whose window lapsed, using the binary automatic verdict.
///
/// Money only moves if the ledger has no settlement for the order yet, and the settlement record is only written if
/// there is none, so replaying this after a partial failure only reconciles the dispute and order statuses.
async fn auto_resolve(
    order: Order,
    verdict: AutoVerdict,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<TransitionOutcome>, EscrowError> {
    let order_id = &order.order_id;
    let dispute = disputes::fetch_dispute_for_order(order_id, conn)
        .await?
        .ok_or_else(|| EscrowError::NotFound(format!("Order {order_id} is disputed but has no dispute record")))?;
    let Some(completed) =
        orders::finalize(order_id, OrderStatusType::Disputed, OrderStatusType::Completed, now, conn).await?
    else {
        return Ok(None);
    };
    let split = payout::split_for_verdict(order.total, verdict);
    let moved = match verdict {
        AutoVerdict::TimeoutSellerConfirmed => {
            let moved = ledger::release(order_id, &order.buyer_id, &order.seller_id, order.total, now, conn).await?;
            items::mark_sold(&order.item_id, now, conn).await?;
            moved
        },
        AutoVerdict::TimeoutBuyerRefund => {
            let moved = ledger::refund(order_id, &order.buyer_id, order.total, now, conn).await?;
            items::release(&order.item_id, now, conn).await?;
            moved
        },
    };
    if disputes::fetch_settlement(order_id, conn).await?.is_none() {
        let note = format!("Automatic verdict: {verdict}");
        disputes::insert_settlement(order_id, &dispute.dispute_id, &split, Some(note.as_str()), None, now, conn).await?;
    }
    if disputes::mark_resolved(&dispute.dispute_id, None, Some(verdict), now, conn).await?.is_none() {
        debug!("🗃️ Dispute {} was already resolved. Only the order status was reconciled", dispute.dispute_id);
    }
    let msg = if moved {
        format!("{verdict}: {} to the seller, {} to the buyer", split.seller_amount, split.buyer_amount)
    } else {
        format!("{verdict}: escrow was already settled")
    };
    events::insert_event(NewOrderEvent::new(order_id, None, OrderEventType::DisputeAutoResolved, msg), now, conn).await?;
    info!("🗃️ Dispute on order [{order_id}] auto-resolved with verdict {verdict}");
    Ok(Some(
        TransitionOutcome::new(completed)
            .cancel_all_timers()
            .notify_parties(NotificationAction::Resolved, ActorSide::System),
    ))
}

impl AccountManagement for SqliteDatabase {
    async fn wallet_for_user(&self, user_id: &UserId) -> Result<Wallet, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let wallet = ledger::fetch_wallet(user_id, &mut conn).await?;
        Ok(wallet.unwrap_or_else(|| Wallet::empty(user_id.clone())))
    }

    async fn deposit(&self, user_id: &UserId, amount: Money, now: DateTime<Utc>) -> Result<Wallet, EscrowError> {
        if !amount.is_positive() {
            return Err(EscrowError::InvalidAmount(format!("Deposits must be positive, got {amount}")));
        }
        let mut tx = self.begin_write().await?;
        let wallet = ledger::credit_balance(user_id, amount, now, &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ {amount} deposited for {user_id}. Balance is now {}", wallet.balance);
        Ok(wallet)
    }

    async fn transactions_for_user(&self, user_id: &UserId) -> Result<Vec<WalletTx>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let txs = ledger::transactions_for_user(user_id, &mut conn).await?;
        Ok(txs)
    }

    async fn transactions_for_order(&self, order_id: &OrderId) -> Result<Vec<WalletTx>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let txs = ledger::transactions_for_order(order_id, &mut conn).await?;
        Ok(txs)
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn orders_for_buyer(&self, buyer_id: &UserId, limit: i64) -> Result<Vec<Order>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::orders_for_buyer(buyer_id, limit, &mut conn).await?;
        Ok(orders)
    }

    async fn orders_for_seller(&self, seller_id: &UserId, limit: i64) -> Result<Vec<Order>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::orders_for_seller(seller_id, limit, &mut conn).await?;
        Ok(orders)
    }

    async fn events_for_order(&self, order_id: &OrderId) -> Result<Vec<OrderEvent>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let events = events::events_for_order(order_id, &mut conn).await?;
        Ok(events)
    }

    async fn dispute_for_order(&self, order_id: &OrderId) -> Result<Option<Dispute>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let dispute = disputes::fetch_dispute_for_order(order_id, &mut conn).await?;
        Ok(dispute)
    }

    async fn settlement_for_order(&self, order_id: &OrderId) -> Result<Option<DisputeSettlement>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let settlement = disputes::fetch_settlement(order_id, &mut conn).await?;
        Ok(settlement)
    }
}

impl CatalogManagement for SqliteDatabase {
    async fn insert_item(&self, item: NewItem, now: DateTime<Utc>) -> Result<Item, EscrowError> {
        if !item.price.is_positive() {
            return Err(EscrowError::InvalidAmount(format!("Item prices must be positive, got {}", item.price)));
        }
        let mut tx = self.begin_write().await?;
        let item = items::insert_item(item, now, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Item {} listed by {} at {}", item.item_id, item.seller_id, item.price);
        Ok(item)
    }

    async fn fetch_item(&self, item_id: &ItemId) -> Result<Option<Item>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let item = items::fetch_item(item_id, &mut conn).await?;
        Ok(item)
    }
}

impl AuthManagement for SqliteDatabase {
    async fn check_user_has_roles(&self, user_id: &UserId, roles: &[Role]) -> Result<(), AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        auth::user_has_roles(user_id, roles, &mut conn).await
    }

    async fn fetch_roles_for_user(&self, user_id: &UserId) -> Result<Vec<Role>, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        auth::roles_for_user(user_id, &mut conn).await
    }

    async fn assign_roles(&self, user_id: &UserId, roles: &[Role]) -> Result<(), AuthApiError> {
        let mut tx = self.begin_write().await?;
        auth::assign_roles(user_id, roles, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn remove_roles(&self, user_id: &UserId, roles: &[Role]) -> Result<u64, AuthApiError> {
        let mut tx = self.begin_write().await?;
        let removed = auth::remove_roles(user_id, roles, &mut tx).await?;
        tx.commit().await?;
        Ok(removed)
    }
}
