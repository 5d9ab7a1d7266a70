//! Contact details collected at the end of the funnel

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::api::FinalizePayload;

static DIAL_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+[0-9]{1,4}$").unwrap());
static PHONE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{6,15}$").unwrap());
static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Contact {
    Whatsapp {
        /// ISO country, e.g. `PT`
        country_code: String,
        /// International prefix, e.g. `+351`
        dial_code: String,
        number: String,
    },
    Email {
        address: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lead {
    pub first_name: String,
    pub last_name: String,
    pub contact: Contact,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeadError {
    #[error("first name is required")]
    MissingFirstName,
    #[error("last name is required")]
    MissingLastName,
    #[error("'{0}' is not a dial code (expected + followed by 1-4 digits)")]
    InvalidDialCode(String),
    #[error("'{0}' is not a phone number (expected 6-15 digits)")]
    InvalidPhoneNumber(String),
    #[error("'{0}' is not an email address")]
    InvalidEmail(String),
}

/// Digits of a phone number with spaces and dashes removed
fn normalize_number(number: &str) -> String {
    number
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

impl Lead {
    pub fn whatsapp(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        country_code: impl Into<String>,
        dial_code: impl Into<String>,
        number: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            contact: Contact::Whatsapp {
                country_code: country_code.into(),
                dial_code: dial_code.into(),
                number: number.into(),
            },
        }
    }

    pub fn email(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            contact: Contact::Email {
                address: address.into(),
            },
        }
    }

    pub fn validate(&self) -> Result<(), LeadError> {
        if self.first_name.trim().is_empty() {
            return Err(LeadError::MissingFirstName);
        }
        if self.last_name.trim().is_empty() {
            return Err(LeadError::MissingLastName);
        }

        match &self.contact {
            Contact::Whatsapp {
                dial_code, number, ..
            } => {
                if !DIAL_CODE.is_match(dial_code.trim()) {
                    return Err(LeadError::InvalidDialCode(dial_code.clone()));
                }
                if !PHONE_NUMBER.is_match(&normalize_number(number)) {
                    return Err(LeadError::InvalidPhoneNumber(number.clone()));
                }
            }
            Contact::Email { address } => {
                if !EMAIL.is_match(address.trim()) {
                    return Err(LeadError::InvalidEmail(address.clone()));
                }
            }
        }
        Ok(())
    }

    /// Full international WhatsApp number, e.g. `+351912345678`
    pub fn whatsapp_full(&self) -> Option<String> {
        match &self.contact {
            Contact::Whatsapp {
                dial_code, number, ..
            } => Some(format!("{}{}", dial_code.trim(), normalize_number(number))),
            Contact::Email { .. } => None,
        }
    }

    /// Build the `finalize_session` body for a session
    pub fn to_payload(&self, session_id: &str) -> FinalizePayload {
        let mut payload = FinalizePayload {
            session_id: session_id.to_string(),
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            whatsapp_full: self.whatsapp_full(),
            email: None,
            country_code: None,
            dial_code: None,
            whatsapp_number: None,
        };

        match &self.contact {
            Contact::Whatsapp {
                country_code,
                dial_code,
                number,
            } => {
                payload.country_code = Some(country_code.clone());
                payload.dial_code = Some(dial_code.trim().to_string());
                payload.whatsapp_number = Some(normalize_number(number));
            }
            Contact::Email { address } => {
                payload.email = Some(address.trim().to_string());
            }
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_whatsapp_lead() {
        let lead = Lead::whatsapp("Ana", "Silva", "PT", "+351", "912 345-678");
        assert_eq!(lead.validate(), Ok(()));
        assert_eq!(lead.whatsapp_full().as_deref(), Some("+351912345678"));
    }

    #[test]
    fn test_names_required() {
        let lead = Lead::email("  ", "Silva", "ana@example.com");
        assert_eq!(lead.validate(), Err(LeadError::MissingFirstName));

        let lead = Lead::email("Ana", "", "ana@example.com");
        assert_eq!(lead.validate(), Err(LeadError::MissingLastName));
    }

    #[test]
    fn test_dial_code_and_number_rules() {
        let lead = Lead::whatsapp("Ana", "Silva", "PT", "351", "912345678");
        assert!(matches!(lead.validate(), Err(LeadError::InvalidDialCode(_))));

        let lead = Lead::whatsapp("Ana", "Silva", "PT", "+35100", "912345678");
        assert!(matches!(lead.validate(), Err(LeadError::InvalidDialCode(_))));

        let lead = Lead::whatsapp("Ana", "Silva", "PT", "+351", "12345");
        assert!(matches!(
            lead.validate(),
            Err(LeadError::InvalidPhoneNumber(_))
        ));

        let lead = Lead::whatsapp("Ana", "Silva", "PT", "+351", "91234567a");
        assert!(matches!(
            lead.validate(),
            Err(LeadError::InvalidPhoneNumber(_))
        ));
    }

    #[test]
    fn test_email_shape() {
        assert!(Lead::email("Ana", "Silva", "ana@example.com").validate().is_ok());
        assert!(matches!(
            Lead::email("Ana", "Silva", "ana@example").validate(),
            Err(LeadError::InvalidEmail(_))
        ));
        assert!(matches!(
            Lead::email("Ana", "Silva", "ana example.com").validate(),
            Err(LeadError::InvalidEmail(_))
        ));
    }

    #[test]
    fn test_payload_fields() {
        let payload = Lead::whatsapp(" Ana ", "Silva", "PT", "+351", "912 345 678").to_payload("s-1");
        assert_eq!(payload.session_id, "s-1");
        assert_eq!(payload.first_name, "Ana");
        assert_eq!(payload.whatsapp_full.as_deref(), Some("+351912345678"));
        assert_eq!(payload.whatsapp_number.as_deref(), Some("912345678"));
        assert_eq!(payload.email, None);

        let payload = Lead::email("Ana", "Silva", "ana@example.com").to_payload("s-2");
        assert_eq!(payload.email.as_deref(), Some("ana@example.com"));
        assert_eq!(payload.whatsapp_full, None);
        assert_eq!(payload.dial_code, None);
    }
}
