//! Document catalogues shared with the tax authority

use serde::{Deserialize, Serialize};

/// Electronic tax document type
///
/// Wire format is the authority's two-digit catalogue code (`"01"`, `"03"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocumentType {
    #[serde(rename = "01")]
    Invoice,
    #[serde(rename = "03")]
    TaxCreditInvoice,
    #[serde(rename = "04")]
    DeliveryNote,
    #[serde(rename = "05")]
    CreditNote,
    #[serde(rename = "06")]
    DebitNote,
    #[serde(rename = "07")]
    WithholdingReceipt,
    #[serde(rename = "08")]
    SettlementReceipt,
    #[serde(rename = "09")]
    SettlementAccountingDocument,
    #[serde(rename = "11")]
    ExportInvoice,
    #[serde(rename = "14")]
    ExcludedSubjectInvoice,
    #[serde(rename = "15")]
    DonationReceipt,
}

impl DocumentType {
    pub const ALL: [DocumentType; 11] = [
        DocumentType::Invoice,
        DocumentType::TaxCreditInvoice,
        DocumentType::DeliveryNote,
        DocumentType::CreditNote,
        DocumentType::DebitNote,
        DocumentType::WithholdingReceipt,
        DocumentType::SettlementReceipt,
        DocumentType::SettlementAccountingDocument,
        DocumentType::ExportInvoice,
        DocumentType::ExcludedSubjectInvoice,
        DocumentType::DonationReceipt,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "01",
            DocumentType::TaxCreditInvoice => "03",
            DocumentType::DeliveryNote => "04",
            DocumentType::CreditNote => "05",
            DocumentType::DebitNote => "06",
            DocumentType::WithholdingReceipt => "07",
            DocumentType::SettlementReceipt => "08",
            DocumentType::SettlementAccountingDocument => "09",
            DocumentType::ExportInvoice => "11",
            DocumentType::ExcludedSubjectInvoice => "14",
            DocumentType::DonationReceipt => "15",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Schema version the authority expects for this document type
    pub fn schema_version(&self) -> u32 {
        match self {
            DocumentType::TaxCreditInvoice
            | DocumentType::DeliveryNote
            | DocumentType::CreditNote
            | DocumentType::DebitNote => 3,
            _ => 1,
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Authority environment (`"00"` test, `"01"` production)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Environment {
    #[serde(rename = "00")]
    Test,
    #[serde(rename = "01")]
    Production,
}

impl Environment {
    pub fn code(&self) -> &'static str {
        match self {
            Environment::Test => "00",
            Environment::Production => "01",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code.trim() {
            "00" | "test" => Some(Environment::Test),
            "01" | "production" => Some(Environment::Production),
            _ => None,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Maximum length the authority accepts for a contingency reason text
pub const MAX_REASON_LEN: usize = 150;

/// Contingency type from the authority's catalogue plus its reason text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContingencyReason {
    pub code: u8,
    pub text: String,
}

impl ContingencyReason {
    /// Type 1: the authority's reception system is unavailable
    pub fn authority_unavailable() -> Self {
        Self {
            code: 1,
            text: "No disponibilidad de sistema del MH".to_string(),
        }
    }

    /// Type 2: the issuer's own system is unavailable
    pub fn issuer_system_unavailable() -> Self {
        Self {
            code: 2,
            text: "No disponibilidad de sistema del emisor".to_string(),
        }
    }

    /// Type 3: the issuer lost internet connectivity
    pub fn issuer_connectivity() -> Self {
        Self {
            code: 3,
            text: "Falla en el suministro de servicio de Internet del Emisor".to_string(),
        }
    }

    /// Type 5: anything else, described by free text
    pub fn other(text: &str) -> Self {
        let text = if text.trim().is_empty() {
            "Otro".to_string()
        } else {
            text.trim().chars().take(MAX_REASON_LEN).collect()
        };
        Self { code: 5, text }
    }
}
