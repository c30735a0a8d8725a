use std::collections::HashMap;

use cucumber::World;
use kk_order_engine::{
    db_types::{Order, OrderId},
    objects::CheckoutIntent,
    test_utils::storefront::TestStore,
    OrderEngineError,
};

#[derive(Default, Debug, World)]
pub struct StoreWorld {
    pub store: Option<TestStore>,
    /// Checkout intents by the name the scenario gave them.
    pub intents: HashMap<String, CheckoutIntent>,
    /// Whether the most recent payment confirmation found the payment already applied.
    pub already_paid: Option<bool>,
    pub last_error: Option<OrderEngineError>,
    /// How many concurrent stock decrements succeeded.
    pub winners: Option<usize>,
}

impl StoreWorld {
    pub fn store(&self) -> &TestStore {
        self.store.as_ref().expect("The store has not been opened")
    }

    pub fn intent(&self, name: &str) -> &CheckoutIntent {
        self.intents.get(name).unwrap_or_else(|| panic!("No checkout called {name}"))
    }

    pub fn order_id(&self, name: &str) -> OrderId {
        self.intent(name).order_id.clone()
    }

    pub async fn order(&self, name: &str) -> Order {
        self.store().order(&self.order_id(name)).await
    }

    pub fn record<T>(&mut self, result: Result<T, OrderEngineError>) -> Option<T> {
        match result {
            Ok(v) => {
                self.last_error = None;
                Some(v)
            },
            Err(e) => {
                self.last_error = Some(e);
                None
            },
        }
    }
}
