//! Checkout pricing: turns priced product lines and a subtotal into the
//! integer minor-unit lines sent to the payment processor.

use crate::entities::charge::{DELIVERY_CHARGE, PLATFORM_CHARGE};
use crate::errors::ServiceError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Central and state GST rates, each applied to the subtotal
pub const CGST_PERCENT: Decimal = dec!(9);
pub const SGST_PERCENT: Decimal = dec!(9);

pub const CGST_LABEL: &str = "CGST (9%)";
pub const SGST_LABEL: &str = "SGST (9%)";
pub const DELIVERY_LABEL: &str = "Delivery Charges";

/// One product line as captured on the order
#[derive(Debug, Clone, PartialEq)]
pub struct PricingInput {
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

/// Named percentage charges keyed by charge name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChargeSchedule {
    percents: BTreeMap<String, Decimal>,
}

impl ChargeSchedule {
    pub fn new<I, S>(charges: I) -> Self
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: Into<String>,
    {
        Self {
            percents: charges
                .into_iter()
                .map(|(name, percent)| (name.into(), percent))
                .collect(),
        }
    }

    pub fn percent(&self, name: &str) -> Option<Decimal> {
        self.percents.get(name).copied()
    }

    pub fn platform_percent(&self) -> Option<Decimal> {
        self.percent(PLATFORM_CHARGE)
    }

    /// Delivery only applies when configured with a positive percent.
    pub fn delivery_percent(&self) -> Option<Decimal> {
        self.percent(DELIVERY_CHARGE)
            .filter(|percent| *percent > Decimal::ZERO)
    }
}

/// A single finalized checkout line in integer minor units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CheckoutLine {
    pub name: String,
    pub unit_amount: i64,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CheckoutBreakdown {
    pub lines: Vec<CheckoutLine>,
}

pub fn platform_label(percent: Decimal) -> String {
    format!("Platform Charges ({}%)", percent.normalize())
}

/// Converts a major-unit amount into minor units, rounding half away from zero.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    round_minor(amount * dec!(100))
}

/// Minor units of `percent`% of `subtotal`; `subtotal * percent / 100 * 100`.
fn percent_of_subtotal(subtotal: Decimal, percent: Decimal) -> Result<i64, ServiceError> {
    round_minor(subtotal * percent)
}

fn round_minor(value: Decimal) -> Result<i64, ServiceError> {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| ServiceError::ValidationError(format!("Amount {} is out of range", value)))
}

/// Prices a checkout: product lines first, then CGST, SGST, the platform
/// charge and, when configured above zero, the delivery charge.
pub fn price_checkout(
    items: &[PricingInput],
    subtotal: Decimal,
    schedule: &ChargeSchedule,
) -> Result<CheckoutBreakdown, ServiceError> {
    let platform_percent = schedule.platform_percent().ok_or_else(|| {
        ServiceError::ConfigurationMissing(format!("{} is not configured", PLATFORM_CHARGE))
    })?;

    if subtotal.is_sign_negative() {
        return Err(ServiceError::ValidationError(
            "Subtotal cannot be negative".to_string(),
        ));
    }

    let mut lines = Vec::with_capacity(items.len() + 4);
    for item in items {
        if item.unit_price.is_sign_negative() {
            return Err(ServiceError::ValidationError(format!(
                "Price of {} cannot be negative",
                item.name
            )));
        }
        lines.push(CheckoutLine {
            name: item.name.clone(),
            unit_amount: to_minor_units(item.unit_price)?,
            quantity: item.quantity,
        });
    }

    lines.push(CheckoutLine {
        name: CGST_LABEL.to_string(),
        unit_amount: percent_of_subtotal(subtotal, CGST_PERCENT)?,
        quantity: 1,
    });
    lines.push(CheckoutLine {
        name: SGST_LABEL.to_string(),
        unit_amount: percent_of_subtotal(subtotal, SGST_PERCENT)?,
        quantity: 1,
    });
    lines.push(CheckoutLine {
        name: platform_label(platform_percent),
        unit_amount: percent_of_subtotal(subtotal, platform_percent)?,
        quantity: 1,
    });

    if let Some(delivery_percent) = schedule.delivery_percent() {
        lines.push(CheckoutLine {
            name: DELIVERY_LABEL.to_string(),
            unit_amount: percent_of_subtotal(subtotal, delivery_percent)?,
            quantity: 1,
        });
    }

    Ok(CheckoutBreakdown { lines })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn schedule(platform: Decimal, delivery: Option<Decimal>) -> ChargeSchedule {
        let mut charges = vec![(PLATFORM_CHARGE, platform)];
        if let Some(delivery) = delivery {
            charges.push((DELIVERY_CHARGE, delivery));
        }
        ChargeSchedule::new(charges)
    }

    fn item(name: &str, price: Decimal, quantity: u32) -> PricingInput {
        PricingInput {
            name: name.to_string(),
            unit_price: price,
            quantity,
        }
    }

    #[test]
    fn subtotal_of_one_thousand_with_five_percent_platform() {
        let breakdown = price_checkout(&[], dec!(1000), &schedule(dec!(5), None)).unwrap();

        assert_eq!(
            breakdown.lines,
            vec![
                CheckoutLine {
                    name: "CGST (9%)".into(),
                    unit_amount: 9000,
                    quantity: 1
                },
                CheckoutLine {
                    name: "SGST (9%)".into(),
                    unit_amount: 9000,
                    quantity: 1
                },
                CheckoutLine {
                    name: "Platform Charges (5%)".into(),
                    unit_amount: 5000,
                    quantity: 1
                },
            ]
        );
    }

    #[test]
    fn product_lines_come_first_in_input_order() {
        let items = [item("Kettle", dec!(499.99), 2), item("Mug", dec!(120), 1)];
        let breakdown = price_checkout(&items, dec!(1119.98), &schedule(dec!(2), None)).unwrap();

        assert_eq!(breakdown.lines.len(), 5);
        assert_eq!(breakdown.lines[0].name, "Kettle");
        assert_eq!(breakdown.lines[0].unit_amount, 49999);
        assert_eq!(breakdown.lines[0].quantity, 2);
        assert_eq!(breakdown.lines[1].unit_amount, 12000);
        assert_eq!(breakdown.lines[2].name, CGST_LABEL);
    }

    #[test]
    fn unit_price_rounds_half_up() {
        assert_eq!(to_minor_units(dec!(10.005)).unwrap(), 1001);
        assert_eq!(to_minor_units(dec!(10.004)).unwrap(), 1000);
        assert_eq!(to_minor_units(dec!(0)).unwrap(), 0);
    }

    #[test]
    fn delivery_line_only_when_percent_is_positive() {
        let with_delivery =
            price_checkout(&[], dec!(200), &schedule(dec!(5), Some(dec!(2.5)))).unwrap();
        assert_eq!(with_delivery.lines.len(), 4);
        let delivery = with_delivery.lines.last().unwrap();
        assert_eq!(delivery.name, DELIVERY_LABEL);
        assert_eq!(delivery.unit_amount, 500);

        let zero_delivery =
            price_checkout(&[], dec!(200), &schedule(dec!(5), Some(dec!(0)))).unwrap();
        assert_eq!(zero_delivery.lines.len(), 3);
    }

    #[test]
    fn platform_label_uses_normalized_percent() {
        assert_eq!(platform_label(dec!(5.00)), "Platform Charges (5%)");
        assert_eq!(platform_label(dec!(2.50)), "Platform Charges (2.5%)");
    }

    #[test]
    fn missing_platform_charge_is_configuration_error() {
        let result = price_checkout(&[], dec!(100), &ChargeSchedule::default());
        assert_matches!(result, Err(ServiceError::ConfigurationMissing(_)));

        let delivery_only = ChargeSchedule::new([(DELIVERY_CHARGE, dec!(3))]);
        assert_matches!(
            price_checkout(&[], dec!(100), &delivery_only),
            Err(ServiceError::ConfigurationMissing(_))
        );
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert_matches!(
            price_checkout(&[], dec!(-1), &schedule(dec!(5), None)),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            price_checkout(&[item("Bad", dec!(-2), 1)], dec!(1), &schedule(dec!(5), None)),
            Err(ServiceError::ValidationError(_))
        );
    }

    proptest! {
        #[test]
        fn taxes_are_equal_and_rounded(cents in 0i64..1_000_000_000, platform_bp in 0i64..10_000) {
            let subtotal = Decimal::new(cents, 2);
            let platform = Decimal::new(platform_bp, 2);
            let breakdown = price_checkout(&[], subtotal, &schedule(platform, None)).unwrap();

            prop_assert_eq!(breakdown.lines.len(), 3);
            let expected_tax = (subtotal * dec!(9))
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_i64()
                .unwrap();
            prop_assert_eq!(breakdown.lines[0].unit_amount, expected_tax);
            prop_assert_eq!(breakdown.lines[1].unit_amount, expected_tax);
            prop_assert_eq!(
                breakdown.lines[0].unit_amount + breakdown.lines[1].unit_amount,
                expected_tax * 2
            );
        }

        #[test]
        fn line_count_tracks_delivery(cents in 0i64..100_000_000, delivery_bp in 0i64..2_000, items in 0usize..6) {
            let subtotal = Decimal::new(cents, 2);
            let products: Vec<PricingInput> = (0..items)
                .map(|i| item(&format!("item-{}", i), dec!(10), 1))
                .collect();
            let delivery = Decimal::new(delivery_bp, 2);
            let breakdown =
                price_checkout(&products, subtotal, &schedule(dec!(5), Some(delivery))).unwrap();

            let fixed = if delivery_bp > 0 { 4 } else { 3 };
            prop_assert_eq!(breakdown.lines.len(), items + fixed);
            prop_assert!(breakdown.lines.iter().all(|line| line.unit_amount >= 0));
        }
    }
}
