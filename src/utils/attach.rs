//! Product context packed into a gateway's free-text field.
//!
//! The three values travel as one `|`-separated string (a product
//! description, an order subject, a WeChat `attach` field) so that a
//! later notification can recover them from the gateway's own record.

use crate::error::{PaymentError, Result};

pub const SEPARATOR: char = '|';

/// Field order inside the packed string. PayPal and WeChat put the display
/// name first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachLayout {
    /// `name|display_name|provider`
    NameFirst,
    /// `display_name|name|provider`
    DisplayFirst,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachment {
    pub product_name: String,
    pub product_display_name: String,
    pub provider_name: String,
}

impl Attachment {
    pub fn new(
        product_name: impl Into<String>,
        product_display_name: impl Into<String>,
        provider_name: impl Into<String>,
    ) -> Self {
        Self {
            product_name: product_name.into(),
            product_display_name: product_display_name.into(),
            provider_name: provider_name.into(),
        }
    }

    pub fn encode(&self, layout: AttachLayout) -> String {
        let (first, second) = match layout {
            AttachLayout::NameFirst => (&self.product_name, &self.product_display_name),
            AttachLayout::DisplayFirst => (&self.product_display_name, &self.product_name),
        };
        join_attach(&[first, second, &self.provider_name])
    }

    /// Fails when the string does not hold exactly three fields.
    pub fn decode(packed: &str, layout: AttachLayout) -> Result<Self> {
        let [first, second, provider] = parse_attach(packed)?;
        let (product_name, product_display_name) = match layout {
            AttachLayout::NameFirst => (first, second),
            AttachLayout::DisplayFirst => (second, first),
        };
        Ok(Self {
            product_name,
            product_display_name,
            provider_name: provider,
        })
    }

    /// For gateways where the product context is cosmetic: a malformed
    /// string yields empty fields.
    pub fn decode_lenient(packed: &str, layout: AttachLayout) -> Self {
        Self::decode(packed, layout).unwrap_or_default()
    }
}

pub fn join_attach<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(&SEPARATOR.to_string())
}

pub fn parse_attach(packed: &str) -> Result<[String; 3]> {
    let tokens: Vec<&str> = packed.split(SEPARATOR).collect();
    match tokens.as_slice() {
        [a, b, c] => Ok([a.to_string(), b.to_string(), c.to_string()]),
        _ => Err(PaymentError::Decoding(format!(
            "attachment expected 3 fields, got {}",
            tokens.len()
        ))),
    }
}
