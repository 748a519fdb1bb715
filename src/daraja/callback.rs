//! STK Callback Types
//!
//! The confirmation webhook Daraja posts after the customer acts on the push.
//! Metadata arrives as a name/value item list whose values are sometimes
//! strings and sometimes bare JSON numbers (phone numbers included), and
//! items can carry no value at all. Every read goes through a typed getter
//! so a missing or malformed field is an explicit error, never a silent
//! null flowing into the reconciliation path.

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const FIELD_RECEIPT: &str = "MpesaReceiptNumber";
pub const FIELD_AMOUNT: &str = "Amount";
pub const FIELD_PHONE: &str = "PhoneNumber";
pub const FIELD_TRANSACTION_DATE: &str = "TransactionDate";

#[derive(Debug, Error, PartialEq)]
pub enum CallbackError {
    #[error("callback metadata missing field: {0}")]
    MissingField(&'static str),

    #[error("callback field {name} malformed: {value}")]
    MalformedField { name: &'static str, value: String },
}

/// The one body the webhook route ever answers with. Returned for every
/// notice, including unknown, duplicate and unparseable ones; anything else
/// makes the gateway retry or disable the callback URL.
#[derive(Debug, Clone, Serialize)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: &'static str,
}

impl Default for CallbackAck {
    fn default() -> Self {
        Self {
            result_code: 0,
            result_desc: "Success",
        }
    }
}

/// Top-level webhook body: `{"Body": {"stkCallback": {...}}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

/// One payment outcome notice. `result_code == 0` is success; anything else
/// is a failure with `result_desc` explaining (cancelled, timeout, no funds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    /// Correlation id: matches the CheckoutRequestID returned at push time.
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
    /// Present on success notices only.
    #[serde(
        rename = "CallbackMetadata",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub callback_metadata: Option<CallbackMetadata>,
}

impl StkCallback {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }

    fn metadata(&self) -> Result<&CallbackMetadata, CallbackError> {
        self.callback_metadata
            .as_ref()
            .ok_or(CallbackError::MissingField("CallbackMetadata"))
    }

    /// The gateway's own receipt number, e.g. `NLJ7RT61SV`.
    pub fn receipt_number(&self) -> Result<String, CallbackError> {
        self.metadata()?.string_field(FIELD_RECEIPT)
    }

    /// Confirmed amount actually charged.
    pub fn amount(&self) -> Result<Decimal, CallbackError> {
        self.metadata()?.decimal_field(FIELD_AMOUNT)
    }

    /// Payer MSISDN; arrives as a bare number.
    pub fn payer_phone(&self) -> Result<String, CallbackError> {
        self.metadata()?.string_field(FIELD_PHONE)
    }

    /// Gateway-side completion time as a packed `YYYYMMDDHHMMSS` integer.
    pub fn transaction_date(&self) -> Result<i64, CallbackError> {
        self.metadata()?.integer_field(FIELD_TRANSACTION_DATE)
    }

    /// Test/fixture constructor for a success notice.
    pub fn success(
        checkout_request_id: impl Into<String>,
        receipt: impl Into<String>,
        amount: Decimal,
    ) -> Self {
        Self {
            merchant_request_id: "29115-34620561-1".to_string(),
            checkout_request_id: checkout_request_id.into(),
            result_code: 0,
            result_desc: "The service request is processed successfully.".to_string(),
            callback_metadata: Some(CallbackMetadata {
                item: vec![
                    MetadataItem::number(FIELD_AMOUNT, amount),
                    MetadataItem::string(FIELD_RECEIPT, receipt.into()),
                    MetadataItem::integer(FIELD_TRANSACTION_DATE, 20240101120000),
                    MetadataItem::integer(FIELD_PHONE, 254712345678),
                ],
            }),
        }
    }

    /// Test/fixture constructor for a failure notice.
    pub fn failure(
        checkout_request_id: impl Into<String>,
        result_code: i64,
        result_desc: impl Into<String>,
    ) -> Self {
        Self {
            merchant_request_id: "29115-34620561-1".to_string(),
            checkout_request_id: checkout_request_id.into(),
            result_code,
            result_desc: result_desc.into(),
            callback_metadata: None,
        }
    }

    pub fn into_envelope(self) -> CallbackEnvelope {
        CallbackEnvelope {
            body: CallbackBody { stk_callback: self },
        }
    }
}

/// Tagged name/value bag: `{"Item": [{"Name": ..., "Value": ...}, ...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub item: Vec<MetadataItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name")]
    pub name: String,
    /// Some items (e.g. `Balance`) arrive with no value at all.
    #[serde(rename = "Value", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl MetadataItem {
    pub fn string(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: Some(serde_json::Value::String(value.into())),
        }
    }

    pub fn integer(name: &str, value: i64) -> Self {
        Self {
            name: name.to_string(),
            value: Some(serde_json::Value::from(value)),
        }
    }

    pub fn number(name: &str, value: Decimal) -> Self {
        Self {
            name: name.to_string(),
            value: serde_json::to_value(value).ok(),
        }
    }
}

impl CallbackMetadata {
    fn lookup(&self, name: &'static str) -> Result<&serde_json::Value, CallbackError> {
        self.item
            .iter()
            .find(|i| i.name == name)
            .and_then(|i| i.value.as_ref())
            .ok_or(CallbackError::MissingField(name))
    }

    /// String coercion: accepts strings and bare numbers.
    pub fn string_field(&self, name: &'static str) -> Result<String, CallbackError> {
        let value = self.lookup(name)?;
        match value {
            serde_json::Value::String(s) => Ok(s.clone()),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            other => Err(CallbackError::MalformedField {
                name,
                value: other.to_string(),
            }),
        }
    }

    pub fn decimal_field(&self, name: &'static str) -> Result<Decimal, CallbackError> {
        let value = self.lookup(name)?;
        let malformed = || CallbackError::MalformedField {
            name,
            value: value.to_string(),
        };
        match value {
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Decimal::from(i))
                } else {
                    n.as_f64()
                        .and_then(Decimal::from_f64)
                        .ok_or_else(malformed)
                }
            }
            serde_json::Value::String(s) => s.parse::<Decimal>().map_err(|_| malformed()),
            _ => Err(malformed()),
        }
    }

    pub fn integer_field(&self, name: &'static str) -> Result<i64, CallbackError> {
        let value = self.lookup(name)?;
        let malformed = || CallbackError::MalformedField {
            name,
            value: value.to_string(),
        };
        match value {
            serde_json::Value::Number(n) => n.as_i64().ok_or_else(malformed),
            serde_json::Value::String(s) => s.parse::<i64>().map_err(|_| malformed()),
            _ => Err(malformed()),
        }
    }
}
