// Conversions between major-unit prices and the representations gateways expect

use crate::error::{PaymentError, Result};

/// Major units to minor units, rounded to the nearest cent.
pub fn to_minor_units(price: f64) -> i64 {
    (price * 100.0).round() as i64
}

pub fn from_minor_units(amount: i64) -> f64 {
    amount as f64 / 100.0
}

/// Two fixed decimals, e.g. `"100.00"`.
pub fn to_major_string(price: f64) -> String {
    // -0.0 formats with a sign
    let price = if price == 0.0 { 0.0 } else { price };
    format!("{:.2}", price)
}

/// Two decimals with trailing zeros and a dangling dot removed, e.g. `"100"`, `"9.9"`.
pub fn to_trimmed_string(price: f64) -> String {
    to_major_string(price)
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

pub fn parse_major_string(price: &str) -> Result<f64> {
    let trimmed = price.trim();
    let value: f64 = trimmed
        .parse()
        .map_err(|_| PaymentError::Decoding(format!("invalid price string: {:?}", price)))?;
    if !value.is_finite() {
        return Err(PaymentError::Decoding(format!("invalid price string: {:?}", price)));
    }
    Ok(value)
}
