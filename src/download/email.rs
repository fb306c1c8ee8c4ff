//! Validated email address.

use email_address::{EmailAddress, Options};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ReportGateError, Result};

/// An email address that passed RFC 5322 validation, stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    pub fn parse(input: &str) -> Result<Self> {
        let email = input.trim();

        // Only a bare `local@domain.tld`: no display name, no domain literal,
        // no single-label host such as `localhost`.
        let options = Options::default()
            .without_display_text()
            .without_domain_literal();
        let address = EmailAddress::parse_with_options(email, options)
            .map_err(|_| ReportGateError::Validation(input.to_string()))?;
        if !address.domain().contains('.') {
            return Err(ReportGateError::Validation(input.to_string()));
        }

        Ok(Self(address.email().to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
