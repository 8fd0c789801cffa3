//! Product Data Structures
//!
//! Products belong to zero or more categories. The leaf rule (products only on
//! childless categories) is enforced by the assignment gate, not here.

use super::category::{validate_name, ValidationError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Number of decimal places prices are stored with
pub const PRICE_SCALE: u32 = 2;

/// A catalog product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,

    #[serde(rename = "productName")]
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub price: Decimal,

    pub stock_quantity: u32,

    pub is_active: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Input for creating a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub stock_quantity: u32,
    pub is_active: bool,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, price: Decimal) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            price,
            stock_quantity: 0,
            is_active: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_stock(mut self, stock_quantity: u32) -> Self {
        self.stock_quantity = stock_quantity;
        self
    }

    /// Validate and return `(trimmed name, normalized price)`
    pub fn validate(&self, max_name_length: usize) -> Result<(String, Decimal), ValidationError> {
        let name = validate_name("productName", &self.name, max_name_length)?;
        let price = normalize_price(self.price)?;
        Ok((name, price))
    }
}

/// Reject negative prices and fix the scale to two decimal places
///
/// # Examples
///
/// ```
/// use rust_decimal::Decimal;
/// use storefront_core::models::normalize_price;
///
/// assert_eq!(normalize_price(Decimal::new(1, 0)).unwrap().to_string(), "1.00");
/// assert!(normalize_price(Decimal::new(-1, 2)).is_err());
/// ```
pub fn normalize_price(price: Decimal) -> Result<Decimal, ValidationError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(ValidationError::InvalidPrice(format!(
            "price cannot be negative: {}",
            price
        )));
    }

    let mut normalized = price.round_dp(PRICE_SCALE);
    normalized.rescale(PRICE_SCALE);
    Ok(normalized)
}

/// Product summary returned by category product listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: String,

    #[serde(rename = "productName")]
    pub product_name: String,

    /// Decimal rendered as a string to avoid float rounding on the wire
    pub price: String,
}

impl From<&Product> for ProductSummary {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.clone(),
            product_name: product.name.clone(),
            price: product.price.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MAX_NAME_LENGTH;
    use std::str::FromStr;

    #[test]
    fn test_normalize_price_scale() {
        let price = Decimal::from_str("9.9").unwrap();
        assert_eq!(normalize_price(price).unwrap().to_string(), "9.90");

        let price = Decimal::from_str("5.005").unwrap();
        assert_eq!(normalize_price(price).unwrap().to_string(), "5.00");
    }

    #[test]
    fn test_negative_price_rejected() {
        let input = NewProduct::new("Toy Car", Decimal::from_str("-0.01").unwrap());
        assert!(matches!(
            input.validate(MAX_NAME_LENGTH),
            Err(ValidationError::InvalidPrice(_))
        ));
    }

    #[test]
    fn test_zero_price_allowed() {
        let input = NewProduct::new("Sticker", Decimal::ZERO);
        let (_, price) = input.validate(MAX_NAME_LENGTH).unwrap();
        assert_eq!(price.to_string(), "0.00");
    }

    #[test]
    fn test_blank_product_name_rejected() {
        let input = NewProduct::new("   ", Decimal::ONE);
        assert_eq!(
            input.validate(MAX_NAME_LENGTH),
            Err(ValidationError::MissingField("productName".to_string()))
        );
    }

    #[test]
    fn test_summary_renders_price_as_string() {
        let now = Utc::now();
        let product = Product {
            id: "p1".to_string(),
            name: "Gizmo".to_string(),
            description: String::new(),
            price: Decimal::from_str("5.00").unwrap(),
            stock_quantity: 3,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let summary = ProductSummary::from(&product);
        assert_eq!(summary.price, "5.00");

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["productName"], "Gizmo");
        assert_eq!(value["price"], "5.00");
    }
}
