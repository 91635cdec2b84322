use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceType {
    #[default]
    Individual,
    Organization,
}

/// Who the invoice is issued to, for gateways that can issue one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvoiceRequest {
    pub payment_name: String,
    pub person_name: String,
    pub person_id_card: String,
    pub person_email: String,
    pub person_phone: String,
    pub invoice_type: InvoiceType,
    pub invoice_title: String,
    pub invoice_tax_id: String,
}
