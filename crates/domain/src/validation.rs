//! Shape and constraint checks for customer and product input.
//!
//! Validation is pure: it never touches the store. Email uniqueness is the
//! store's job and surfaces as [`DomainError::DuplicateKey`].

use std::sync::LazyLock;

use entity_store::{NewCustomer, NewProduct};
use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::DomainError;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_PHONE_LEN: usize = 20;

/// Prices are stored as `NUMERIC(10, 2)`.
const MAX_PRICE_SCALE: u32 = 2;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s.]+(\.[^@\s.]+)+$").expect("Invalid regex"));

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\+?\d{1,4}[-.\s]?\(?\d{1,3}\)?[-.\s]?\d{1,4}[-.\s]?\d{1,4}[-.\s]?\d{1,9})$")
        .expect("Invalid regex")
});

/// Raw customer fields as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CustomerInput {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl CustomerInput {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Checks every field and produces the insert payload.
    pub fn validate(&self) -> Result<NewCustomer, DomainError> {
        let name = validate_name(&self.name)?;

        let email = self.email.trim();
        if email.is_empty() {
            return Err(DomainError::validation("email", "Email is required"));
        }
        if email.chars().count() > MAX_EMAIL_LEN || !EMAIL_RE.is_match(email) {
            return Err(DomainError::validation(
                "email",
                "Enter a valid email address",
            ));
        }

        let phone = match self.phone.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(phone) => {
                if phone.chars().count() > MAX_PHONE_LEN || !PHONE_RE.is_match(phone) {
                    return Err(DomainError::validation(
                        "phone",
                        "Phone number must be in the format: '+999999999' or '999-999-9999'",
                    ));
                }
                Some(phone.to_string())
            }
        };

        Ok(NewCustomer {
            name,
            email: email.to_string(),
            phone,
        })
    }
}

/// Raw product fields as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductInput {
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub stock: Option<i32>,
}

impl ProductInput {
    pub fn new(name: impl Into<String>, price: Decimal) -> Self {
        Self {
            name: name.into(),
            price,
            stock: None,
        }
    }

    pub fn with_stock(mut self, stock: i32) -> Self {
        self.stock = Some(stock);
        self
    }

    /// Checks every field and produces the insert payload. Stock defaults to 0.
    pub fn validate(&self) -> Result<NewProduct, DomainError> {
        let name = validate_name(&self.name)?;
        let price = validate_price(self.price)?;

        let stock = self.stock.unwrap_or(0);
        if stock < 0 {
            return Err(DomainError::validation(
                "stock",
                "Stock cannot be negative",
            ));
        }

        Ok(NewProduct { name, price, stock })
    }
}

fn validate_name(raw: &str) -> Result<String, DomainError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(DomainError::validation("name", "Name is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::validation(
            "name",
            format!("Name must be at most {MAX_NAME_LEN} characters"),
        ));
    }
    Ok(name.to_string())
}

fn validate_price(price: Decimal) -> Result<Decimal, DomainError> {
    if price < Decimal::new(1, 2) {
        return Err(DomainError::validation(
            "price",
            "Price must be at least 0.01",
        ));
    }
    if price.normalize().scale() > MAX_PRICE_SCALE {
        return Err(DomainError::validation(
            "price",
            "Price must have at most 2 decimal places",
        ));
    }
    if price >= Decimal::new(100_000_000, 0) {
        return Err(DomainError::validation(
            "price",
            "Price must have at most 10 digits",
        ));
    }
    let mut price = price;
    price.rescale(MAX_PRICE_SCALE);
    Ok(price)
}
