use cucumber::given;

use crate::{cucumber::EscrowWorld, support::system::TestSystem};

#[given("a fresh install")]
async fn fresh_database(world: &mut EscrowWorld) {
    let system = TestSystem::with_producers(Default::default(), 1).await;
    world.system = Some(system);
}

#[given(expr = "{word} is an admin")]
async fn make_admin(world: &mut EscrowWorld, user: String) {
    world.system().make_admin(&user).await;
}

#[given(expr = "{word} has deposited {int}")]
async fn deposit(world: &mut EscrowWorld, user: String, amount: i64) {
    world.system().fund(&user, amount).await;
}

#[given(expr = "{word} lists an item for {int}")]
async fn list_item(world: &mut EscrowWorld, seller: String, price: i64) {
    let item = world.system().list_item(&seller, price).await;
    world.item = Some(item);
}

#[given(expr = "{word} has bought the item")]
async fn bought(world: &mut EscrowWorld, buyer: String) {
    let item_id = world.item().item_id.clone();
    let order = world.system().api.buy(&buyer.as_str().into(), &item_id).await.expect("Error buying item");
    world.order = Some(order);
}

#[given(expr = "{word} has accepted the order")]
async fn accepted(world: &mut EscrowWorld, seller: String) {
    let id = world.order().order_id.clone();
    let order = world.system().api.seller_accept(&id, &seller.as_str().into()).await.expect("Error accepting order");
    world.order = Some(order);
}
