use chrono::{DateTime, Utc};

use crate::{
    db_types::{Item, ItemId, NewItem},
    traits::EscrowError,
};

/// The narrow slice of the item catalog that the engine owns: an item's reservation flag has to change in the same
/// transaction as the order that reserves it. Everything else about the catalog lives elsewhere.
#[allow(async_fn_in_trait)]
pub trait CatalogManagement {
    /// Lists a new item as `AVAILABLE`. Prices must be strictly positive.
    async fn insert_item(&self, item: NewItem, now: DateTime<Utc>) -> Result<Item, EscrowError>;

    async fn fetch_item(&self, item_id: &ItemId) -> Result<Option<Item>, EscrowError>;
}
