use chrono::Utc;
use sqlx::types::Json;

use crate::{
    db_types::{
        CatalogProduct,
        Order,
        OrderId,
        OrderItem,
        OrderStatusType,
        Paise,
        PaymentMethod,
        PaymentStatus,
        ProductId,
        ShippingAddress,
    },
    objects::{CartLine, CheckoutRequest},
    ProductCatalog,
    SqliteDatabase,
    StockLedger,
};

pub fn address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Aarav Mehta".into(),
        phone: "9876543210".into(),
        address_line1: "12 MG Road".into(),
        address_line2: Some("Flat 4B".into()),
        city: "Bengaluru".into(),
        state: "Karnataka".into(),
        pincode: "560001".into(),
        country: "India".into(),
    }
}

pub fn cart_line(product_id: &str, size: &str, quantity: i64) -> CartLine {
    CartLine { product_id: product_id.into(), size: size.into(), quantity }
}

pub fn checkout_request(user_id: &str, items: Vec<CartLine>, coupon_code: Option<&str>) -> CheckoutRequest {
    CheckoutRequest {
        user_id: user_id.into(),
        items,
        shipping_address: address(),
        coupon_code: coupon_code.map(String::from),
        receipt: None,
    }
}

/// Adds a product to the catalog with the given stock per size.
pub async fn seed_product(db: &SqliteDatabase, product_id: &str, name: &str, price: Paise, stock: &[(&str, i64)]) {
    let product = CatalogProduct {
        product_id: ProductId::from(product_id),
        name: name.into(),
        price,
        image: Some(format!("https://cdn.kallkeyy.test/{product_id}.jpg")),
        is_active: true,
    };
    db.upsert_product(product).await.expect("Error seeding product");
    for (size, quantity) in stock {
        db.set_stock(&ProductId::from(product_id), size, *quantity).await.expect("Error seeding stock");
    }
}

/// An in-memory order for `P1/M x1 @ ₹1999` with `KALLKEYY100` applied, paid online.
pub fn paid_order(order_id: &str, status: OrderStatusType) -> Order {
    let now = Utc::now();
    let item = OrderItem {
        product_id: ProductId::from("P1"),
        size: "M".into(),
        quantity: 1,
        price: Paise::from_rupees(1999),
        product_name: "Oversized Tee".into(),
        image: None,
    };
    Order {
        id: 1,
        order_id: OrderId::from(order_id),
        user_id: "alice".into(),
        items: Json(vec![item]),
        subtotal: Paise::from_rupees(1999),
        discount_amount: Paise::from_rupees(100),
        coupon_code: Some("KALLKEYY100".into()),
        cod_surcharge: Paise::zero(),
        amount: Paise::from_rupees(1899),
        currency: "INR".into(),
        prepaid_amount: Paise::from_rupees(1899),
        status,
        payment_method: PaymentMethod::Razorpay,
        payment_status: PaymentStatus::Completed,
        gateway_order_id: Some("order_mock000001".into()),
        gateway_payment_id: Some("pay_mock000001".into()),
        gateway_signature: None,
        gateway_key_id: Some("rzp_test_mock".into()),
        shipping_address: Json(address()),
        tracking_url: None,
        courier_name: None,
        awb_code: None,
        estimated_delivery: None,
        return_reason: None,
        return_comments: None,
        return_requested_at: None,
        stock_committed: true,
        needs_reconciliation: false,
        reconciliation_note: None,
        created_at: now,
        updated_at: now,
        paid_at: Some(now),
        delivered_at: None,
        cancelled_at: None,
    }
}
