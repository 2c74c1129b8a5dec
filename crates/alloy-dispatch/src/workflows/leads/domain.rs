use serde::{Deserialize, Serialize};

/// Cleaning lead submitted from the website booking form.
///
/// Every field is optional at the wire level so validation can report all problems at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningLeadRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    /// Free text such as "3-4 bedrooms".
    #[serde(default)]
    pub home_size: Option<String>,
    #[serde(default)]
    pub bedrooms: Option<u32>,
    #[serde(default)]
    pub bathrooms: Option<u32>,
    /// weekly, bi-weekly, monthly, one-time.
    #[serde(default)]
    pub preferred_frequency: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Contractor ("pro") application submitted from the recruiting page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProsApplicationRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub experience: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadKind {
    Cleaning,
    ProsApplication,
}

impl LeadKind {
    pub const fn tags(self) -> [&'static str; 2] {
        match self {
            LeadKind::Cleaning => ["cleaning_lead", "website_lead"],
            LeadKind::ProsApplication => ["pros_application", "website_lead"],
        }
    }

    pub const fn confirmation(self) -> &'static str {
        match self {
            LeadKind::Cleaning => "Lead submitted successfully. We'll contact you shortly.",
            LeadKind::ProsApplication => {
                "Application submitted successfully. We'll review and contact you soon."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeadReceipt {
    pub kind: LeadKind,
    pub contact_id: String,
}
