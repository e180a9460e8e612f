//! Value objects for the order domain.

use common::{MerchantId, ProductId};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Monetary amount as a fixed-point decimal with two fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Creates a money amount from minor units (e.g. 1234 = 12.34).
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// Creates a money amount from a decimal, rounded to two places.
    pub fn from_decimal(amount: Decimal) -> Self {
        Self(amount.round_dp(2))
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Returns the underlying decimal.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Lossy conversion for gauges.
    pub fn as_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or_default()
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money(self.0 * Decimal::from(quantity))
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// Optimistic concurrency version of a persisted order.
///
/// Starts at 0 before the first save and increments on every save.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of an order that has never been saved.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A line item, snapshotted at purchase time.
///
/// Name, image and unit price are copied from the catalog when the order is
/// placed and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub merchant_id: Option<MerchantId>,
    pub product_name: String,
    pub product_image: Option<String>,
    pub product_spec: Option<String>,
    pub unit_price: Money,
    pub quantity: u32,
    pub subtotal: Money,
}

impl OrderItem {
    /// Creates an item; the subtotal is computed from price and quantity.
    pub fn new(
        product_id: ProductId,
        product_name: impl Into<String>,
        unit_price: Money,
        quantity: u32,
    ) -> Self {
        Self {
            product_id,
            merchant_id: None,
            product_name: product_name.into(),
            product_image: None,
            product_spec: None,
            unit_price,
            quantity,
            subtotal: unit_price.multiply(quantity),
        }
    }

    pub fn with_merchant(mut self, merchant_id: MerchantId) -> Self {
        self.merchant_id = Some(merchant_id);
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.product_image = Some(image.into());
        self
    }

    pub fn with_spec(mut self, spec: impl Into<String>) -> Self {
        self.product_spec = Some(spec.into());
        self
    }
}

/// Delivery recipient captured at creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_from_cents() {
        let money = Money::from_cents(1234);
        assert_eq!(money.amount(), Decimal::new(1234, 2));
        assert_eq!(money.to_string(), "12.34");
    }

    #[test]
    fn test_money_from_decimal_rounds_to_cents() {
        let money = Money::from_decimal(Decimal::new(12345, 3));
        assert_eq!(money, Money::from_cents(1234));
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(250);

        assert_eq!(a + b, Money::from_cents(1250));
        assert_eq!(a - b, Money::from_cents(750));
        assert_eq!(a.multiply(3), Money::from_cents(3000));
        assert_eq!(vec![a, b, b].into_iter().sum::<Money>(), Money::from_cents(1500));
    }

    #[test]
    fn test_money_sign() {
        assert!(Money::from_cents(1).is_positive());
        assert!(Money::zero().is_zero());
        assert!(!Money::zero().is_positive());
        assert!(Money::from_cents(-1).is_negative());
    }

    #[test]
    fn test_order_item_subtotal() {
        let item = OrderItem::new(ProductId::new(1), "Widget", Money::from_cents(999), 3);
        assert_eq!(item.subtotal, Money::from_cents(2997));
    }

    #[test]
    fn test_version_sequence() {
        assert_eq!(Version::initial().next(), Version::new(1));
        assert!(Version::new(2) > Version::new(1));
    }
}
