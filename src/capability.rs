//! Closed capability vocabulary for console access checks.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// A single console privilege granted to an operator.
///
/// The vocabulary is closed: capabilities the server does not grant simply
/// never appear in a profile, and there is no implication between tags.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    ViewDashboard,
    ReadTransactions,
    ReadUsers,
    ManageUsers,
    ManageAdmins,
    VerifyKyc,
    ReadWallets,
    ManageWallets,
    ManageFees,
    ViewReports,
}

impl Capability {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ViewDashboard => "VIEW_DASHBOARD",
            Self::ReadTransactions => "READ_TRANSACTIONS",
            Self::ReadUsers => "READ_USERS",
            Self::ManageUsers => "MANAGE_USERS",
            Self::ManageAdmins => "MANAGE_ADMINS",
            Self::VerifyKyc => "VERIFY_KYC",
            Self::ReadWallets => "READ_WALLETS",
            Self::ManageWallets => "MANAGE_WALLETS",
            Self::ManageFees => "MANAGE_FEES",
            Self::ViewReports => "VIEW_REPORTS",
        }
    }

    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "VIEW_DASHBOARD" => Some(Self::ViewDashboard),
            "READ_TRANSACTIONS" => Some(Self::ReadTransactions),
            "READ_USERS" => Some(Self::ReadUsers),
            "MANAGE_USERS" => Some(Self::ManageUsers),
            "MANAGE_ADMINS" => Some(Self::ManageAdmins),
            "VERIFY_KYC" => Some(Self::VerifyKyc),
            "READ_WALLETS" => Some(Self::ReadWallets),
            "MANAGE_WALLETS" => Some(Self::ManageWallets),
            "MANAGE_FEES" => Some(Self::ManageFees),
            "VIEW_REPORTS" => Some(Self::ViewReports),
            _ => None,
        }
    }
}

/// Parses capability tags from a profile payload.
///
/// Unknown tags are dropped so older consoles keep working against newer
/// servers; each drop is logged once per parse.
#[must_use]
pub fn parse_tags<'a, I>(tags: I) -> HashSet<Capability>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut capabilities = HashSet::new();
    for tag in tags {
        match Capability::from_str(tag) {
            Some(capability) => {
                capabilities.insert(capability);
            }
            None => warn!("Ignoring unknown capability tag: {tag}"),
        }
    }
    capabilities
}
