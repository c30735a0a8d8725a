use std::{collections::BTreeMap, fmt::Debug};

use chrono::Utc;
use log::*;

use crate::{
    db_types::{NewOrder, OrderId, OrderItem, OrderStatusType, Paise, PaymentMethod},
    engine_api::{
        config::EngineConfig,
        coupon_api::CouponApi,
        errors::OrderEngineError,
        objects::{CartLine, CartValidation, CheckoutIntent, CheckoutRequest, ConfirmedPayment, PaymentVerification},
        order_flow_api::{OrderFlowApi, PaymentEvidence},
    },
    events::EventProducers,
    helpers::{generate_order_id, is_valid_receipt},
    order_state::VerifiedPayment,
    traits::{CheckoutDatabase, IntentRequest, PaymentGateway, PaymentSource, StockLine, StockShortfall, StoreError},
};

/// `CheckoutApi` turns a cart into a pending order with a gateway payment intent, and confirms the payment when the
/// client relays the gateway's signed callback.
///
/// Nothing is reserved before payment. Stock is checked when the intent is created and decremented only when the
/// payment is committed, so an abandoned checkout never holds stock.
pub struct CheckoutApi<B, G> {
    db: B,
    gateway: G,
    flow: OrderFlowApi<B>,
    coupons: CouponApi<B>,
    config: EngineConfig,
}

impl<B, G> Debug for CheckoutApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutApi")
    }
}

impl<B: Clone, G> CheckoutApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers, config: EngineConfig) -> Self {
        let flow = OrderFlowApi::new(db.clone(), producers).with_config(config.clone());
        let coupons = CouponApi::new(db.clone());
        Self { db, gateway, flow, coupons, config }
    }
}

impl<B, G> CheckoutApi<B, G>
where
    B: CheckoutDatabase,
    G: PaymentGateway,
{
    /// Advisory stock check for a cart. Nothing is reserved.
    pub async fn validate_cart(&self, lines: &[CartLine]) -> Result<CartValidation, OrderEngineError> {
        validate_lines(lines)?;
        let shortfalls = self.shortfalls(&merge_lines(lines)).await?;
        Ok(CartValidation { available: shortfalls.is_empty(), shortfalls })
    }

    /// Online checkout: prices the cart, checks stock, applies the coupon and opens a gateway intent for the full
    /// amount.
    pub async fn create_intent(&self, request: CheckoutRequest) -> Result<CheckoutIntent, OrderEngineError> {
        self.open_checkout(request, PaymentMethod::Razorpay).await
    }

    /// Cash-on-delivery checkout: same as [`Self::create_intent`], but the intent is only for the confirmation token
    /// and the order amount includes the COD surcharge.
    pub async fn create_cod_token_intent(&self, request: CheckoutRequest) -> Result<CheckoutIntent, OrderEngineError> {
        self.open_checkout(request, PaymentMethod::Cod).await
    }

    pub async fn verify_payment(
        &self,
        user_id: &str,
        verification: PaymentVerification,
    ) -> Result<ConfirmedPayment, OrderEngineError> {
        self.verify(user_id, verification, PaymentMethod::Razorpay).await
    }

    pub async fn verify_cod_token(
        &self,
        user_id: &str,
        verification: PaymentVerification,
    ) -> Result<ConfirmedPayment, OrderEngineError> {
        self.verify(user_id, verification, PaymentMethod::Cod).await
    }

    async fn open_checkout(
        &self,
        request: CheckoutRequest,
        method: PaymentMethod,
    ) -> Result<CheckoutIntent, OrderEngineError> {
        validate_request(&request)?;
        if let Some(intent) = self.existing_intent(&request, method).await? {
            debug!("🛒️ Returning the existing intent for receipt {}", intent.order_id);
            return Ok(intent);
        }
        let now = Utc::now();
        let items = self.price_lines(&request.items).await?;
        let lines = items.iter().map(StockLine::from).collect::<Vec<_>>();
        let shortfalls = self.shortfalls(&lines).await?;
        if !shortfalls.is_empty() {
            info!("🛒️ Checkout for {} rejected. {} line(s) are out of stock", request.user_id, shortfalls.len());
            return Err(OrderEngineError::InsufficientStock(shortfalls));
        }
        let subtotal = items.iter().map(OrderItem::line_total).sum::<Paise>();
        let cod_surcharge = match method {
            PaymentMethod::Cod => self.config.cod_surcharge,
            PaymentMethod::Razorpay => Paise::zero(),
        };
        let (coupon_code, discount_amount) = match request.coupon_code.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(code) => {
                let (coupon, quote) =
                    self.coupons.check_for_cart(code, subtotal, cod_surcharge, &request.user_id).await?;
                (Some(coupon.code), quote.discount_amount)
            },
            None => (None, Paise::zero()),
        };
        let amount = subtotal - discount_amount + cod_surcharge;
        let prepaid_amount = match method {
            PaymentMethod::Razorpay => amount,
            PaymentMethod::Cod => amount.min(self.config.cod_token_amount),
        };
        if prepaid_amount < self.config.minimum_intent_amount {
            return Err(OrderEngineError::ValidationError(format!(
                "The amount payable online ({prepaid_amount}) is below the minimum of {}",
                self.config.minimum_intent_amount
            )));
        }

        let order_id = request.receipt.as_deref().map(OrderId::from).unwrap_or_else(|| generate_order_id(now));
        let mut notes = BTreeMap::new();
        notes.insert("order_id".to_string(), order_id.to_string());
        notes.insert("user_id".to_string(), request.user_id.clone());
        notes.insert("payment_method".to_string(), method.to_string());
        let intent_request = IntentRequest {
            amount: prepaid_amount,
            currency: self.config.currency.clone(),
            receipt: order_id.clone(),
            notes,
        };
        let intent = self.gateway.create_intent(intent_request).await?;
        if intent.amount != prepaid_amount {
            warn!("🛒️ Gateway opened intent {} for {} instead of {prepaid_amount}", intent.intent_id, intent.amount);
        }

        let new_order = NewOrder {
            order_id,
            user_id: request.user_id.clone(),
            items,
            subtotal,
            discount_amount,
            coupon_code,
            cod_surcharge,
            amount,
            currency: self.config.currency.clone(),
            prepaid_amount,
            payment_method: method,
            gateway_order_id: intent.intent_id,
            gateway_key_id: intent.key_id,
            shipping_address: request.shipping_address.clone(),
            created_at: now,
        };
        match self.db.insert_order(new_order).await {
            Ok(order) => {
                info!(
                    "🛒️ Order {} created for {}: {} ({} due online) via {}",
                    order.order_id, order.user_id, order.amount, order.prepaid_amount, order.payment_method
                );
                Ok(CheckoutIntent::for_order(&order, false))
            },
            // A concurrent retry with the same receipt got there first
            Err(StoreError::DuplicateOrder(order_id)) => match self.existing_intent(&request, method).await? {
                Some(intent) => Ok(intent),
                None => Err(OrderEngineError::ValidationError(format!("Receipt {order_id} has already been used"))),
            },
            Err(e) => Err(e.into()),
        }
    }

    /// A retry of a checkout that already has a pending order gets the same intent back.
    async fn existing_intent(
        &self,
        request: &CheckoutRequest,
        method: PaymentMethod,
    ) -> Result<Option<CheckoutIntent>, OrderEngineError> {
        let Some(receipt) = request.receipt.as_deref() else {
            return Ok(None);
        };
        let Some(order) = self.db.fetch_order(&OrderId::from(receipt)).await? else {
            return Ok(None);
        };
        let reusable = order.is_owned_by(&request.user_id)
            && order.payment_method == method
            && order.status == OrderStatusType::Pending
            && order.gateway_order_id.is_some();
        if !reusable {
            return Err(OrderEngineError::ValidationError(format!("Receipt {receipt} has already been used")));
        }
        Ok(Some(CheckoutIntent::for_order(&order, true)))
    }

    /// Freezes catalog prices, names and images onto the cart lines.
    async fn price_lines(&self, lines: &[CartLine]) -> Result<Vec<OrderItem>, OrderEngineError> {
        let mut items = Vec::with_capacity(lines.len());
        for line in merge_lines(lines) {
            let product = match self.db.fetch_product(&line.product_id).await? {
                Some(p) if p.is_active => p,
                _ => return Err(OrderEngineError::ProductNotFound(line.product_id)),
            };
            items.push(OrderItem {
                product_id: line.product_id,
                size: line.size,
                quantity: line.quantity,
                price: product.price,
                product_name: product.name,
                image: product.image,
            });
        }
        Ok(items)
    }

    async fn shortfalls(&self, lines: &[StockLine]) -> Result<Vec<StockShortfall>, OrderEngineError> {
        let mut shortfalls = vec![];
        for line in lines {
            let available = self.db.stock_level(&line.product_id, &line.size).await?.unwrap_or(0);
            if available < line.quantity {
                shortfalls.push(StockShortfall {
                    product_id: line.product_id.clone(),
                    size: line.size.clone(),
                    requested: line.quantity,
                    available,
                });
            }
        }
        Ok(shortfalls)
    }

    async fn verify(
        &self,
        user_id: &str,
        verification: PaymentVerification,
        method: PaymentMethod,
    ) -> Result<ConfirmedPayment, OrderEngineError> {
        let order = self.flow.fetch_order(&verification.order_id).await?;
        if !order.is_owned_by(user_id) {
            return Err(OrderEngineError::NotOrderOwner);
        }
        if order.payment_method != method {
            return Err(OrderEngineError::ValidationError(format!(
                "Order {} is paid via {}",
                order.order_id, order.payment_method
            )));
        }
        if order.gateway_order_id.as_deref() != Some(verification.gateway_order_id.as_str()) {
            return Err(OrderEngineError::ValidationError(format!(
                "Gateway order {} does not belong to order {}",
                verification.gateway_order_id, order.order_id
            )));
        }
        let key_id = order.gateway_key_id.as_deref().unwrap_or_default();
        let valid = self.gateway.verify_client_signature(
            key_id,
            &verification.gateway_order_id,
            &verification.gateway_payment_id,
            &verification.signature,
        );
        if !valid {
            warn!("💳️ Invalid payment signature for order {} from {user_id}", order.order_id);
            return Err(OrderEngineError::GatewaySignatureInvalid);
        }
        let payment = VerifiedPayment::new(&verification.gateway_payment_id);
        let evidence =
            PaymentEvidence::new(payment, PaymentSource::Client).with_signature(verification.signature.clone());
        match self.flow.confirm_payment(&order, evidence).await {
            // The money has moved but we could not record it. The webhook or the sweep will.
            Err(OrderEngineError::DatabaseError(e)) => {
                let payment_id = &verification.gateway_payment_id;
                error!("💳️ Payment {payment_id} for {} could not be recorded: {e}", order.order_id);
                Err(OrderEngineError::PaymentAmbiguous {
                    gateway_order_id: verification.gateway_order_id,
                    gateway_payment_id: verification.gateway_payment_id,
                })
            },
            other => other,
        }
    }
}

fn validate_lines(lines: &[CartLine]) -> Result<(), OrderEngineError> {
    if lines.is_empty() {
        return Err(OrderEngineError::ValidationError("The cart is empty".into()));
    }
    if let Some(line) = lines.iter().find(|l| l.quantity <= 0 || l.size.trim().is_empty()) {
        return Err(OrderEngineError::ValidationError(format!(
            "Invalid cart line for {}: size '{}', quantity {}",
            line.product_id, line.size, line.quantity
        )));
    }
    Ok(())
}

fn validate_request(request: &CheckoutRequest) -> Result<(), OrderEngineError> {
    if request.user_id.trim().is_empty() {
        return Err(OrderEngineError::ValidationError("A user id is required".into()));
    }
    validate_lines(&request.items)?;
    request.shipping_address.validate().map_err(OrderEngineError::ValidationError)?;
    match request.receipt.as_deref() {
        Some(receipt) if !is_valid_receipt(receipt) => {
            Err(OrderEngineError::ValidationError(format!("'{receipt}' is not a valid receipt")))
        },
        _ => Ok(()),
    }
}

/// Folds repeated product/size pairs into one line, keeping the order in which they first appear.
fn merge_lines(lines: &[CartLine]) -> Vec<StockLine> {
    let mut merged: Vec<StockLine> = Vec::with_capacity(lines.len());
    for line in lines {
        match merged.iter_mut().find(|m| m.product_id == line.product_id && m.size == line.size) {
            Some(m) => m.quantity += line.quantity,
            None => merged.push(StockLine::from(line)),
        }
    }
    merged
}
