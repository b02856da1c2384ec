use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

/// Persisted customer order. Address and product lines are snapshots taken at placement.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Public order identifier shared with customers and the payment processor
    #[sea_orm(unique)]
    pub order_id: String,
    pub user_id: Uuid,
    pub customer_email: String,
    #[sea_orm(column_type = "Json")]
    pub products: OrderProducts,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total_amount: Decimal,
    pub ship_first_name: String,
    pub ship_last_name: String,
    pub ship_phone: String,
    pub ship_street: String,
    pub ship_city: String,
    pub ship_state: String,
    pub ship_postal_code: String,
    pub payment_mode: PaymentMode,
    #[sea_orm(nullable)]
    pub payment_id: Option<String>,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn shipping_address(&self) -> ShippingAddress {
        ShippingAddress {
            first_name: self.ship_first_name.clone(),
            last_name: self.ship_last_name.clone(),
            phone: self.ship_phone.clone(),
            street: self.ship_street.clone(),
            city: self.ship_city.clone(),
            state: self.ship_state.clone(),
            postal_code: self.ship_postal_code.clone(),
        }
    }
}

/// Price snapshot of one purchased product
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProductLine {
    /// Catalog reference of the product
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    /// Unit price at the time the order was placed
    #[schema(value_type = String, example = "499.00")]
    pub price: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct OrderProducts(pub Vec<ProductLine>);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ShippingAddress {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum OrderStatus {
    #[sea_orm(string_value = "Placed")]
    Placed,
    #[sea_orm(string_value = "Processing")]
    Processing,
    #[sea_orm(string_value = "Out for Delivery")]
    #[serde(rename = "Out for Delivery", alias = "Out-for-Delivery")]
    OutForDelivery,
    #[sea_orm(string_value = "Delivered")]
    Delivered,
    #[sea_orm(string_value = "Cancelled")]
    Cancelled,
}

/// Display label and URL-safe route token for every status.
const STATUS_LABELS: [(OrderStatus, &str, &str); 5] = [
    (OrderStatus::Placed, "Placed", "Placed"),
    (OrderStatus::Processing, "Processing", "Processing"),
    (
        OrderStatus::OutForDelivery,
        "Out for Delivery",
        "Out-for-Delivery",
    ),
    (OrderStatus::Delivered, "Delivered", "Delivered"),
    (OrderStatus::Cancelled, "Cancelled", "Cancelled"),
];

impl OrderStatus {
    pub fn label(self) -> &'static str {
        STATUS_LABELS
            .iter()
            .find(|(status, _, _)| *status == self)
            .map(|(_, label, _)| *label)
            .unwrap_or("Unknown")
    }

    pub fn route_token(self) -> &'static str {
        STATUS_LABELS
            .iter()
            .find(|(status, _, _)| *status == self)
            .map(|(_, _, token)| *token)
            .unwrap_or("Unknown")
    }

    /// Accepts either the display label or the route token, ignoring case.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        STATUS_LABELS
            .iter()
            .find(|(_, label, token)| {
                label.eq_ignore_ascii_case(value) || token.eq_ignore_ascii_case(value)
            })
            .map(|(status, _, _)| *status)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "Pending")]
    Pending,
    #[sea_orm(string_value = "Success")]
    Success,
    /// Cash on delivery; settled when the order is delivered
    #[sea_orm(string_value = "COD")]
    #[serde(rename = "COD")]
    Cod,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "Pending",
            Self::Success => "Success",
            Self::Cod => "COD",
        })
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum PaymentMode {
    #[sea_orm(string_value = "COD")]
    #[serde(rename = "COD", alias = "CashOnDelivery")]
    CashOnDelivery,
    #[sea_orm(string_value = "Online")]
    Online,
}

impl PaymentMode {
    /// Payment status an order starts with under this mode.
    pub fn initial_payment_status(self) -> PaymentStatus {
        match self {
            Self::CashOnDelivery => PaymentStatus::Cod,
            Self::Online => PaymentStatus::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Out-for-Delivery", OrderStatus::OutForDelivery)]
    #[case("Out for Delivery", OrderStatus::OutForDelivery)]
    #[case("out-for-delivery", OrderStatus::OutForDelivery)]
    #[case("Delivered", OrderStatus::Delivered)]
    #[case(" placed ", OrderStatus::Placed)]
    fn parses_labels_and_route_tokens(#[case] raw: &str, #[case] expected: OrderStatus) {
        assert_eq!(OrderStatus::parse(raw), Some(expected));
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert_eq!(OrderStatus::parse("Shipped"), None);
        assert_eq!(OrderStatus::parse(""), None);
    }

    #[test]
    fn labels_round_trip_through_the_table() {
        for (status, label, token) in STATUS_LABELS {
            assert_eq!(status.label(), label);
            assert_eq!(status.route_token(), token);
            assert_eq!(OrderStatus::parse(token), Some(status));
        }
    }

    #[test]
    fn serde_uses_display_labels_and_accepts_route_token() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::OutForDelivery).unwrap(),
            "\"Out for Delivery\""
        );
        let parsed: OrderStatus = serde_json::from_str("\"Out-for-Delivery\"").unwrap();
        assert_eq!(parsed, OrderStatus::OutForDelivery);
        assert_eq!(serde_json::to_string(&PaymentStatus::Cod).unwrap(), "\"COD\"");
    }

    #[test]
    fn initial_payment_status_follows_mode() {
        assert_eq!(
            PaymentMode::CashOnDelivery.initial_payment_status(),
            PaymentStatus::Cod
        );
        assert_eq!(
            PaymentMode::Online.initial_payment_status(),
            PaymentStatus::Pending
        );
    }
}
