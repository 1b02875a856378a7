// XMPP-style addresses (user@domain[/resource])

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("address '{0}' has no domain part")]
    MissingDomain(String),
    #[error("address '{0}' has an empty node before '@'")]
    MissingNode(String),
}

/// A bare identity plus an optional resource.
///
/// A missing resource means "the bare identity as a whole". The node and
/// domain are case-insensitive and stored lower-cased, the resource is kept
/// exactly as received.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    bare: String,
    resource: Option<String>,
}

impl Address {
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(AddressError::Empty);
        }

        let (bare, resource) = match input.split_once('/') {
            Some((bare, resource)) => (bare, Some(resource)),
            None => (input, None),
        };

        // Domain is whatever follows the last '@', and must be non-empty
        let domain = bare.rsplit('@').next().unwrap_or("");
        if bare.is_empty() || domain.is_empty() {
            return Err(AddressError::MissingDomain(input.to_string()));
        }
        if bare.contains('@') && bare.split('@').next().map_or(true, str::is_empty) {
            return Err(AddressError::MissingNode(input.to_string()));
        }

        Ok(Self {
            bare: bare.to_lowercase(),
            resource: resource.filter(|r| !r.is_empty()).map(str::to_string),
        })
    }

    pub fn bare_str(&self) -> &str {
        &self.bare
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    pub fn is_bare(&self) -> bool {
        self.resource.is_none()
    }

    /// The same identity with the resource dropped.
    pub fn to_bare(&self) -> Address {
        Address {
            bare: self.bare.clone(),
            resource: None,
        }
    }

    pub fn with_resource(&self, resource: &str) -> Address {
        Address {
            bare: self.bare.clone(),
            resource: if resource.is_empty() { None } else { Some(resource.to_string()) },
        }
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource {
            Some(resource) => write!(f, "{}/{}", self.bare, resource),
            None => f.write_str(&self.bare),
        }
    }
}
