use cucumber::World;
use escrow_engine::{
    db_types::{Item, Order},
    EscrowError,
    ExpiryOutcome,
};

use crate::support::system::TestSystem;

#[derive(Default, Debug, World)]
pub struct EscrowWorld {
    pub system: Option<TestSystem>,
    pub item: Option<Item>,
    pub order: Option<Order>,
    pub last_error: Option<EscrowError>,
    pub last_expiry: Option<ExpiryOutcome>,
}

impl EscrowWorld {
    pub fn system(&self) -> &TestSystem {
        self.system.as_ref().expect("Escrow engine not initialised")
    }

    pub fn item(&self) -> &Item {
        self.item.as_ref().expect("No item has been listed")
    }

    pub fn order(&self) -> &Order {
        self.order.as_ref().expect("No order has been placed")
    }

    /// Records the result of a user action. Successful actions replace the tracked order.
    pub fn record(&mut self, result: Result<Order, EscrowError>) {
        match result {
            Ok(order) => {
                self.order = Some(order);
                self.last_error = None;
            },
            Err(e) => self.last_error = Some(e),
        }
    }
}
