use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::{
    db_types::{NewOrder, Order, OrderId, UserId},
    dispute::SellerShare,
    order_machine::Party,
    timers::ExpiryKind,
    traits::{
        data_objects::{ExpiryOutcome, TransitionOutcome},
        AccountManagement,
        AuthApiError,
    },
};

/// The error taxonomy for every order transition and ledger operation.
///
/// All guard failures are detected before any mutation, so returning one of these always means the enclosing
/// transaction was rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EscrowError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("Order has already been settled: {0}")]
    AlreadySettled(String),
    #[error("Dispute has already been resolved: {0}")]
    AlreadyResolved(String),
    #[error("Item is not available: {0}")]
    ItemNotAvailable(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl EscrowError {
    pub fn order_not_found(order_id: &OrderId) -> Self {
        Self::NotFound(format!("Order {order_id} does not exist"))
    }

    /// A short, stable tag for the error kind, suitable for clients that switch on the error type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::InsufficientFunds(_) => "INSUFFICIENT_FUNDS",
            Self::AlreadySettled(_) => "ALREADY_SETTLED",
            Self::AlreadyResolved(_) => "ALREADY_RESOLVED",
            Self::ItemNotAvailable(_) => "ITEM_NOT_AVAILABLE",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::DatabaseError(_) => "DATABASE_ERROR",
        }
    }
}

impl From<sqlx::Error> for EscrowError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::NotFound("The requested record does not exist".to_string()),
            sqlx::Error::Database(ref db) if is_overdraft(db.as_ref()) => {
                Self::InsufficientFunds(format!("A wallet balance would become negative. {db}"))
            },
            e => Self::DatabaseError(e.to_string()),
        }
    }
}

/// The wallet table's `balance >= 0` and `held >= 0` CHECK constraints are the last line of defence against an
/// overdraft.
fn is_overdraft(e: &dyn sqlx::error::DatabaseError) -> bool {
    e.is_check_violation() && (e.message().contains("balance") || e.message().contains("held"))
}

impl From<AuthApiError> for EscrowError {
    fn from(e: AuthApiError) -> Self {
        match e {
            AuthApiError::RoleNotAllowed(_) => Self::Forbidden(e.to_string()),
            e => Self::DatabaseError(e.to_string()),
        }
    }
}

/// This trait defines the highest level of behaviour for backends supporting the escrow engine.
///
/// Every method is a single order transition. Implementations must run the status read and write, the ledger
/// mutation and the audit trail insert inside one atomic transaction, and must not touch the timer service or the
/// notification hooks. Those side effects are returned as outbox actions in the [`TransitionOutcome`] and executed by
/// the caller after the transaction commits.
///
/// Every method takes the current time explicitly, so that deadlines are always evaluated against the caller's clock.
#[allow(async_fn_in_trait)]
pub trait EscrowDatabase: Clone + AccountManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Opens a new order against an available item, moving the item price from the buyer's balance into held funds.
    ///
    /// Fails with
    /// * `NotFound` if the item does not exist,
    /// * `Forbidden` if the buyer is also the seller,
    /// * `ItemNotAvailable` if the item has already been reserved or sold (including by a concurrent buyer),
    /// * `InsufficientFunds` if the buyer's balance does not cover the price.
    async fn create_order(&self, order: NewOrder) -> Result<TransitionOutcome, EscrowError>;

    /// `ESCROW_HELD` → `IN_TRADE`. Only the seller may accept. The trade deadline becomes `now + trade_window`.
    async fn seller_accept(
        &self,
        order_id: &OrderId,
        actor: &UserId,
        now: DateTime<Utc>,
        trade_window: Duration,
    ) -> Result<TransitionOutcome, EscrowError>;

    /// Records the confirmation of one party. If the other party has already confirmed, the escrow is released to
    /// the seller and the order is completed in the same transaction.
    ///
    /// A party that has already confirmed receives `InvalidState`.
    async fn confirm(
        &self,
        order_id: &OrderId,
        actor: &UserId,
        party: Party,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, EscrowError>;

    /// Moves an order in active trade to `DISPUTED`, opens a dispute and pushes the trade deadline out by
    /// `extension`.
    async fn raise_dispute(
        &self,
        order_id: &OrderId,
        actor: &UserId,
        reason_code: &str,
        now: DateTime<Utc>,
        extension: Duration,
    ) -> Result<TransitionOutcome, EscrowError>;

    /// Cancels an order that the seller has not yet accepted, refunding the buyer and releasing the item.
    async fn cancel_order(
        &self,
        order_id: &OrderId,
        actor: &UserId,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, EscrowError>;

    /// The time-driven entry point. Re-checks the stored deadline against `now` and applies the expiry policy for
    /// `kind`. This call is idempotent: firing it again for a settled order returns [`ExpiryOutcome::Unchanged`].
    async fn expire_order(
        &self,
        order_id: &OrderId,
        kind: ExpiryKind,
        now: DateTime<Utc>,
    ) -> Result<ExpiryOutcome, EscrowError>;

    /// Splits the escrow of a disputed order between buyer and seller and completes the order.
    ///
    /// The caller is responsible for checking that `admin` holds the admin role.
    async fn resolve_dispute(
        &self,
        order_id: &OrderId,
        admin: &UserId,
        share: SellerShare,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, EscrowError>;

    /// Non-terminal orders whose relevant deadline is at or before `now`, oldest deadline first.
    async fn fetch_overdue_orders(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Order>, EscrowError>;

    /// Closes the database connection pool.
    async fn close(&mut self) -> Result<(), EscrowError> {
        Ok(())
    }
}
