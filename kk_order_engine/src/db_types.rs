use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use kk_common::Paise;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {kind}: {value}")]
pub struct ConversionError {
    pub kind: &'static str,
    pub value: String,
}

impl ConversionError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}

/// Generates `Display` and `FromStr` for a fieldless enum using its snake_case database representation.
macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant),)+
                    _ => Err(ConversionError::new($kind, s)),
                }
            }
        }
    };
}

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------       ProductId       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for ProductId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl ProductId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// A payment intent exists but no verified payment has been seen yet.
    Pending,
    /// A verified payment (or COD confirmation token) has been captured.
    Paid,
    /// The merchant has started packing the order.
    Processing,
    /// Handed to the courier. Tracking details are available.
    Shipped,
    Delivered,
    /// The customer has asked to return a delivered order and is waiting for a decision.
    ReturnRequested,
    Returned,
    Cancelled,
}

string_enum!(OrderStatusType, "order status", {
    Pending => "pending",
    Paid => "paid",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    ReturnRequested => "return_requested",
    Returned => "returned",
    Cancelled => "cancelled",
});

//--------------------------------------     PaymentMethod     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Razorpay,
    /// Cash on delivery. Only a confirmation token is taken online.
    Cod,
}

string_enum!(PaymentMethod, "payment method", {
    Razorpay => "razorpay",
    Cod => "cod",
});

//--------------------------------------     PaymentStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    PartiallyRefunded,
}

string_enum!(PaymentStatus, "payment status", {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    Refunded => "refunded",
    PartiallyRefunded => "partially_refunded",
});

impl PaymentStatus {
    /// True if money was taken through the gateway at some point, whether or not it has since been refunded.
    pub fn is_captured(&self) -> bool {
        matches!(self, Self::Completed | Self::Refunded | Self::PartiallyRefunded)
    }
}

//--------------------------------------       OrderItem       ---------------------------------------------------------
/// One line of an order. `price` is the unit price at the moment of checkout and is never re-derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub size: String,
    pub quantity: i64,
    pub price: Paise,
    pub product_name: String,
    #[serde(default)]
    pub image: Option<String>,
}

impl OrderItem {
    pub fn line_total(&self) -> Paise {
        self.price * self.quantity
    }
}

//--------------------------------------    ShippingAddress    ---------------------------------------------------------
static PINCODE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-9][0-9]{5}$").unwrap());
static PHONE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\+91[\s-]?)?[6-9][0-9]{9}$").unwrap());

fn default_country() -> String {
    "India".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub full_name: String,
    pub phone: String,
    pub address_line1: String,
    #[serde(default)]
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub pincode: String,
    #[serde(default = "default_country")]
    pub country: String,
}

impl ShippingAddress {
    /// Checks that every mandatory field is present and that the phone number and PIN code are well-formed.
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("full_name", &self.full_name),
            ("phone", &self.phone),
            ("address_line1", &self.address_line1),
            ("city", &self.city),
            ("state", &self.state),
            ("pincode", &self.pincode),
        ];
        let missing = required.iter().filter(|(_, v)| v.trim().is_empty()).map(|(k, _)| *k).collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(format!("Shipping address is missing: {}", missing.join(", ")));
        }
        if !PINCODE_REGEX.is_match(self.pincode.trim()) {
            return Err(format!("'{}' is not a valid PIN code", self.pincode));
        }
        if !PHONE_REGEX.is_match(self.phone.trim()) {
            return Err(format!("'{}' is not a valid mobile number", self.phone));
        }
        Ok(())
    }
}

//--------------------------------------     TrackingInfo      ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingInfo {
    #[serde(default)]
    pub tracking_url: Option<String>,
    #[serde(default)]
    pub courier_name: Option<String>,
    #[serde(default)]
    pub awb_code: Option<String>,
    #[serde(default)]
    pub estimated_delivery: Option<String>,
}

impl TrackingInfo {
    pub fn is_empty(&self) -> bool {
        self.tracking_url.is_none()
            && self.courier_name.is_none()
            && self.awb_code.is_none()
            && self.estimated_delivery.is_none()
    }
}

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub user_id: String,
    pub items: Json<Vec<OrderItem>>,
    pub subtotal: Paise,
    pub discount_amount: Paise,
    pub coupon_code: Option<String>,
    pub cod_surcharge: Paise,
    /// `subtotal - discount_amount + cod_surcharge`. Written once on insert.
    pub amount: Paise,
    pub currency: String,
    /// The amount the gateway intent was opened for. This is the most that can ever be refunded via the gateway.
    pub prepaid_amount: Paise,
    pub status: OrderStatusType,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
    pub gateway_key_id: Option<String>,
    pub shipping_address: Json<ShippingAddress>,
    pub tracking_url: Option<String>,
    pub courier_name: Option<String>,
    pub awb_code: Option<String>,
    pub estimated_delivery: Option<String>,
    pub return_reason: Option<String>,
    pub return_comments: Option<String>,
    pub return_requested_at: Option<DateTime<Utc>>,
    /// Set once stock has been decremented for every line, cleared when it is restored.
    pub stock_committed: bool,
    pub needs_reconciliation: bool,
    pub reconciliation_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn items(&self) -> &[OrderItem] {
        &self.items.0
    }

    pub fn shipping_address(&self) -> &ShippingAddress {
        &self.shipping_address.0
    }

    /// Recomputes `subtotal - discount + surcharge` from the frozen line items.
    pub fn expected_amount(&self) -> Paise {
        self.items().iter().map(OrderItem::line_total).sum::<Paise>() - self.discount_amount + self.cod_surcharge
    }

    pub fn amount_is_consistent(&self) -> bool {
        self.amount == self.expected_amount()
            && self.subtotal == self.items().iter().map(OrderItem::line_total).sum::<Paise>()
    }

    /// The amount taken through the gateway, zero if no payment has been captured.
    pub fn captured_amount(&self) -> Paise {
        if self.payment_status.is_captured() {
            self.prepaid_amount
        } else {
            Paise::zero()
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    pub fn tracking(&self) -> TrackingInfo {
        TrackingInfo {
            tracking_url: self.tracking_url.clone(),
            courier_name: self.courier_name.clone(),
            awb_code: self.awb_code.clone(),
            estimated_delivery: self.estimated_delivery.clone(),
        }
    }
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub user_id: String,
    pub items: Vec<OrderItem>,
    pub subtotal: Paise,
    pub discount_amount: Paise,
    pub coupon_code: Option<String>,
    pub cod_surcharge: Paise,
    pub amount: Paise,
    pub currency: String,
    pub prepaid_amount: Paise,
    pub payment_method: PaymentMethod,
    pub gateway_order_id: String,
    pub gateway_key_id: String,
    pub shipping_address: ShippingAddress,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------    CatalogProduct     ---------------------------------------------------------
/// Read-side view of a product owned by the catalog service.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub product_id: ProductId,
    pub name: String,
    pub price: Paise,
    pub image: Option<String>,
    pub is_active: bool,
}

//--------------------------------------      StockLevel       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub size: String,
    pub quantity: i64,
}

//--------------------------------------        Coupons        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// `discount_value` is a whole percentage.
    Percentage,
    /// `discount_value` is an amount in paise.
    Fixed,
}

string_enum!(DiscountType, "discount type", {
    Percentage => "percentage",
    Fixed => "fixed",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CouponRules {
    #[serde(default)]
    pub first_time_purchase_only: bool,
    #[serde(default)]
    pub once_per_account: bool,
    /// The COD surcharge is part of the discountable amount.
    #[serde(default)]
    pub apply_to_shipping: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Coupon {
    pub id: i64,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub min_purchase_amount: Paise,
    pub max_discount_amount: Option<Paise>,
    pub usage_limit: Option<i64>,
    pub used_count: i64,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    #[sqlx(flatten)]
    pub rules: CouponRules,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCoupon {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    #[serde(default)]
    pub min_purchase_amount: Paise,
    #[serde(default)]
    pub max_discount_amount: Option<Paise>,
    #[serde(default)]
    pub usage_limit: Option<i64>,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rules: CouponRules,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl NewCoupon {
    pub fn fixed<S: Into<String>>(code: S, amount: Paise) -> Self {
        Self::new(code, DiscountType::Fixed, amount.value())
    }

    pub fn percentage<S: Into<String>>(code: S, percent: i64) -> Self {
        Self::new(code, DiscountType::Percentage, percent)
    }

    fn new<S: Into<String>>(code: S, discount_type: DiscountType, discount_value: i64) -> Self {
        Self {
            code: code.into(),
            discount_type,
            discount_value,
            min_purchase_amount: Paise::zero(),
            max_discount_amount: None,
            usage_limit: None,
            valid_from: None,
            valid_until: None,
            rules: CouponRules::default(),
            is_active: true,
        }
    }

    pub fn with_usage_limit(mut self, limit: i64) -> Self {
        self.usage_limit = Some(limit);
        self
    }

    pub fn with_min_purchase(mut self, amount: Paise) -> Self {
        self.min_purchase_amount = amount;
        self
    }

    pub fn with_max_discount(mut self, amount: Paise) -> Self {
        self.max_discount_amount = Some(amount);
        self
    }

    pub fn with_rules(mut self, rules: CouponRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_validity(mut self, from: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.valid_from = from;
        self.valid_until = until;
        self
    }
}

//--------------------------------------        Refunds        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RefundKind {
    Cancellation,
    Return,
    Manual,
}

string_enum!(RefundKind, "refund kind", {
    Cancellation => "cancellation",
    Return => "return",
    Manual => "manual",
});

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Refund {
    pub id: i64,
    pub order_id: OrderId,
    pub gateway_refund_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub amount: Paise,
    pub reason: String,
    pub kind: RefundKind,
    /// Free-form remarks, e.g. the part of a COD order that is settled offline.
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRefund {
    pub order_id: OrderId,
    pub gateway_refund_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub amount: Paise,
    pub reason: String,
    pub kind: RefundKind,
    pub note: Option<String>,
}
