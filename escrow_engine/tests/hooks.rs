use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
        Mutex,
    },
    time::Duration as StdDuration,
};

use chrono::{Duration, Utc};
use escrow_engine::{
    db_types::{Money, NewItem, OrderStatusType, UserId},
    events::{ActorSide, EventHandlers, EventHooks, NotificationAction, NotificationChannel, OrderNotification},
    timers::TokioScheduler,
    AccountManagement,
    CatalogManagement,
    EngineConfig,
    EscrowDatabase,
    ExpiryOutcome,
    OrderFlowApi,
    SqliteDatabase,
};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tokio::runtime::Runtime;

use crate::support::{
    prepare_env::{prepare_test_env, random_db_path},
    system::TestSystem,
};

mod support;

#[derive(Default, Clone)]
struct HookCalled {
    seen: Arc<Mutex<Vec<OrderNotification>>>,
    called: Arc<AtomicI32>,
}

impl HookCalled {
    pub fn called(&self, notification: OrderNotification) {
        self.called.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(notification);
    }

    pub fn count(&self) -> i32 {
        self.called.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<OrderNotification> {
        self.seen.lock().unwrap().clone()
    }

    pub fn hooks(&self) -> EventHooks {
        let mut hooks = EventHooks::default();
        let me = self.clone();
        hooks.on_order_updated(move |n| {
            info!("🪝️ {n}");
            me.called(n);
            Box::pin(async {}) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        hooks
    }
}

async fn wait_for(event: &HookCalled, count: i32) {
    for _ in 0..100 {
        if event.count() >= count {
            return;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
}

#[test]
fn on_order_updated() {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    let rt = Runtime::new().unwrap();
    let event = HookCalled::default();
    let event_copy = event.clone();
    rt.block_on(async move {
        let handlers = EventHandlers::new(10, event_copy.hooks());
        let producers = handlers.producers();
        handlers.start_handlers().await;
        let sys = TestSystem::with_producers(producers, 5).await;
        let order = sys.new_order("alice", "bob", 100).await;
        sys.api.seller_accept(&order.order_id, &UserId::from("bob")).await.expect("Error accepting order");
        wait_for(&event_copy, 6).await;
        sys.tear_down().await;
    });
    assert_eq!(event.count(), 6);
    let seen = event.seen();
    let created = seen.iter().filter(|n| n.action == NotificationAction::Created).collect::<Vec<_>>();
    assert_eq!(created.len(), 3);
    assert!(created.iter().all(|n| n.actor_side == ActorSide::Buyer && n.status == OrderStatusType::EscrowHeld));
    let channels = created.iter().map(|n| n.channel.to_string()).collect::<Vec<_>>();
    assert!(channels.contains(&"user:alice".to_string()));
    assert!(channels.contains(&"user:bob".to_string()));
    assert!(channels.iter().any(|c| c.starts_with("order:")));
    let accepted = seen.iter().filter(|n| n.action == NotificationAction::Accepted).count();
    assert_eq!(accepted, 3);
    assert!(seen.iter().all(|n| !matches!(n.channel, NotificationChannel::User(ref u) if u.as_str() == "eve")));
    info!("🪝️ test complete");
}

#[test]
fn failed_transitions_are_not_notified() {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    let rt = Runtime::new().unwrap();
    let event = HookCalled::default();
    let event_copy = event.clone();
    rt.block_on(async move {
        let handlers = EventHandlers::new(10, event_copy.hooks());
        let producers = handlers.producers();
        handlers.start_handlers().await;
        let sys = TestSystem::with_producers(producers, 5).await;
        let item = sys.list_item("bob", 100).await;
        let result = sys.api.buy(&UserId::from("alice"), &item.item_id).await;
        assert!(result.is_err());
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        sys.tear_down().await;
    });
    assert_eq!(event.count(), 0);
}

/// Drives a hold expiry through the real timer service: the job fires, the expiry worker applies it, and the hook
/// sees the order expire.
#[test]
fn hold_timer_expires_unaccepted_orders() {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    let rt = Runtime::new().unwrap();
    let event = HookCalled::default();
    let event_copy = event.clone();
    rt.block_on(async move {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        let handlers = EventHandlers::new(10, event_copy.hooks());
        let producers = handlers.producers();
        handlers.start_handlers().await;
        let (scheduler, mut jobs) = TokioScheduler::channel(10);
        let config = EngineConfig::default().with_hold_window(Duration::milliseconds(150));
        let mut api = OrderFlowApi::new(db, scheduler.clone(), producers, config);

        let worker_api = api.clone();
        let worker = tokio::spawn(async move {
            let mut outcomes = Vec::new();
            while let Some(job) = jobs.recv().await {
                let outcome = worker_api.handle_expiry_job(job, Utc::now()).await;
                let done = matches!(outcome, ExpiryOutcome::Expired(_));
                outcomes.push(outcome);
                if done {
                    break;
                }
            }
            outcomes
        });

        let alice = UserId::from("alice");
        let item = api.db().insert_item(NewItem::new("bob".into(), Money::from_units(5)), Utc::now()).await.unwrap();
        api.db().deposit(&alice, Money::from_units(5), Utc::now()).await.unwrap();
        let order = api.buy(&alice, &item.item_id).await.expect("Error buying item");

        let outcomes = tokio::time::timeout(StdDuration::from_secs(5), worker)
            .await
            .expect("Hold timer did not fire")
            .expect("Worker panicked");
        assert!(matches!(outcomes.last(), Some(ExpiryOutcome::Expired(_))), "{outcomes:?}");
        let order = api.db().fetch_order(&order.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::Expired);
        let wallet = api.db().wallet_for_user(&alice).await.unwrap();
        assert_eq!(wallet.balance, Money::from_units(5));
        assert_eq!(wallet.held, Money::zero());
        wait_for(&event_copy, 6).await;

        scheduler.shutdown().await;
        if let Err(e) = api.db_mut().close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        Sqlite::drop_database(&url).await.unwrap();
    });
    let expired = event.seen().into_iter().filter(|n| n.action == NotificationAction::Expired).collect::<Vec<_>>();
    assert_eq!(expired.len(), 3);
    assert!(expired.iter().all(|n| n.actor_side == ActorSide::System));
}
