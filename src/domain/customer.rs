//! Local directory records (customers, agents) and CRM lookup candidates.

use serde::{Deserialize, Serialize};

/// Customer cached locally from the CRM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub tenant_id: String,
    pub crm_id: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// Agent with a phone extension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub extension: Option<String>,
}

/// A customer returned by a CRM phone lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrmCandidate {
    pub crm_id: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,

    /// Ranking score in `0.0..=1.0`, filled in by identity resolution
    #[serde(default)]
    pub confidence: f64,
}

impl From<&Customer> for CrmCandidate {
    fn from(c: &Customer) -> Self {
        Self {
            crm_id: c.crm_id.clone(),
            name: c.name.clone(),
            phone: c.phone.clone(),
            email: c.email.clone(),
            confidence: 1.0,
        }
    }
}
