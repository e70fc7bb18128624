use escrow_engine::{
    db_types::{Item, Money, NewItem, Order, OrderId, Role, UserId, Wallet, WalletTx, WalletTxAction},
    events::EventProducers,
    timers::ManualScheduler,
    AccountApi,
    AccountManagement,
    AuthManagement,
    CatalogManagement,
    EngineConfig,
    EscrowDatabase,
    OrderFlowApi,
    SqliteDatabase,
};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use super::prepare_env::{prepare_test_env, random_db_path};

/// A throw-away escrow engine on its own SQLite database, with a scheduler that only fires when told to.
#[derive(Debug)]
pub struct TestSystem {
    pub db_path: String,
    pub api: OrderFlowApi<SqliteDatabase, ManualScheduler>,
}

impl TestSystem {
    pub async fn new() -> Self {
        Self::with_producers(EventProducers::default(), 5).await
    }

    pub async fn with_producers(producers: EventProducers, max_connections: u32) -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, max_connections).await.expect("Error creating database");
        debug!("🚀️ Created database: {url}");
        let api = OrderFlowApi::new(db, ManualScheduler::new(), producers, EngineConfig::default());
        Self { db_path: url, api }
    }

    pub fn db(&self) -> &SqliteDatabase {
        self.api.db()
    }

    pub fn scheduler(&self) -> &ManualScheduler {
        self.api.scheduler()
    }

    pub fn accounts(&self) -> AccountApi<SqliteDatabase> {
        AccountApi::new(self.db().clone())
    }

    pub async fn list_item(&self, seller: &str, price: i64) -> Item {
        let item = NewItem::new(UserId::from(seller), Money::from_units(price));
        self.db().insert_item(item, chrono::Utc::now()).await.expect("Error listing item")
    }

    pub async fn fund(&self, user: &str, amount: i64) -> Wallet {
        self.accounts().deposit(&UserId::from(user), Money::from_units(amount)).await.expect("Error funding wallet")
    }

    pub async fn make_admin(&self, user: &str) {
        self.db().assign_roles(&UserId::from(user), &[Role::Admin]).await.expect("Error assigning admin role");
    }

    pub async fn wallet(&self, user: &str) -> Wallet {
        self.db().wallet_for_user(&UserId::from(user)).await.expect("Error fetching wallet")
    }

    pub async fn order(&self, order_id: &OrderId) -> Order {
        self.db().fetch_order(order_id).await.expect("Error fetching order").expect("Order does not exist")
    }

    pub async fn ledger(&self, order_id: &OrderId) -> Vec<WalletTx> {
        self.db().transactions_for_order(order_id).await.expect("Error fetching ledger")
    }

    /// Ledger entries for the order with the given action, as `(user, amount)` pairs.
    pub async fn ledger_entries(&self, order_id: &OrderId, action: WalletTxAction) -> Vec<(UserId, Money)> {
        self.ledger(order_id)
            .await
            .into_iter()
            .filter(|tx| tx.action == action)
            .map(|tx| (tx.user_id, tx.amount))
            .collect()
    }

    /// Funds the buyer with exactly the price of a new item, and buys it.
    pub async fn new_order(&self, buyer: &str, seller: &str, price: i64) -> Order {
        let item = self.list_item(seller, price).await;
        self.fund(buyer, price).await;
        self.api.buy(&UserId::from(buyer), &item.item_id).await.expect("Error buying item")
    }

    /// An order that the seller has accepted.
    pub async fn order_in_trade(&self, buyer: &str, seller: &str, price: i64) -> Order {
        let order = self.new_order(buyer, seller, price).await;
        self.api.seller_accept(&order.order_id, &UserId::from(seller)).await.expect("Error accepting order")
    }

    pub async fn tear_down(mut self) {
        if let Err(e) = self.api.db_mut().close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        if let Err(e) = Sqlite::drop_database(&self.db_path).await {
            warn!("🚀️ Failed to remove database {}: {e}", self.db_path);
        }
    }
}
