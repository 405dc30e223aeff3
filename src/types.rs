//! Core domain types for the escrow core
//!
//! All types are designed for:
//! - Explicit network scoping (listings never cross networks)
//! - Exact arithmetic (Decimal for prices, integer smallest units on the ledger)
//! - Serde round-tripping for reports and wire payloads

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{EscrowError, Result};

/// Ledger account identifying a token. NFTs are supply-1, zero-decimal tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenAddress(String);

impl TokenAddress {
    /// Create new token address
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ledger account held by a participant (seller, buyer, anchor).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountAddress(String);

impl AccountAddress {
    /// Create new account address
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Isolated ledger environment. Listings and custody never cross networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production ledger
    Production,
    /// Test ledger
    Test,
}

impl Network {
    /// Network code
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Production => "production",
            Network::Test => "test",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "production" => Some(Network::Production),
            "test" => Some(Network::Test),
            _ => None,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Supported settlement currencies (fungible tokens on the ledger).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// USD stablecoin
    Usdc,
    /// Native ledger token
    Xlm,
}

impl Currency {
    /// Asset code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usdc => "USDC",
            Currency::Xlm => "XLM",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "USDC" => Some(Currency::Usdc),
            "XLM" => Some(Currency::Xlm),
            _ => None,
        }
    }

    /// Price precision in decimal places
    pub fn decimals(&self) -> u32 {
        match self {
            Currency::Usdc => 7,
            Currency::Xlm => 7,
        }
    }

    /// Ledger token address of this currency on the given network.
    ///
    /// Issuers differ per network, so the address is network-scoped.
    pub fn asset_address(&self, network: Network) -> TokenAddress {
        TokenAddress::new(format!("{}:{}", self.code(), network))
    }

    /// Convert a decimal price into smallest ledger units.
    ///
    /// Rejects non-positive amounts and amounts with more precision than
    /// the currency supports.
    pub fn to_base_units(&self, amount: Decimal) -> Result<i64> {
        if amount <= Decimal::ZERO {
            return Err(EscrowError::Validation(format!(
                "amount must be positive, got {}",
                amount
            )));
        }

        let factor = Decimal::from(10_i64.pow(self.decimals()));
        let scaled = amount.checked_mul(factor).ok_or_else(|| {
            EscrowError::Validation(format!("amount {} out of range", amount))
        })?;

        if scaled.normalize().scale() != 0 {
            return Err(EscrowError::Validation(format!(
                "amount {} exceeds {} precision ({} decimal places)",
                amount,
                self.code(),
                self.decimals()
            )));
        }

        scaled.to_i64().ok_or_else(|| {
            EscrowError::Validation(format!("amount {} out of range", amount))
        })
    }

    /// Convert smallest ledger units back into a decimal amount.
    pub fn from_base_units(&self, units: i64) -> Decimal {
        Decimal::new(units, self.decimals())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Listing lifecycle status.
///
/// Legal transitions: `Active -> Sold`, `Active -> Cancelled`, and
/// `Cancelled -> Active` (recovery only, after custody is re-verified).
/// `Sold` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    /// Offered for sale, NFT in anchor custody
    Active,
    /// Settled, NFT released to the buyer
    Sold,
    /// Withdrawn or corrected
    Cancelled,
}

impl ListingStatus {
    /// Status code
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Active => "active",
            ListingStatus::Sold => "sold",
            ListingStatus::Cancelled => "cancelled",
        }
    }

    /// Whether no further transitions are legal from this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, ListingStatus::Sold)
    }

    /// Whether a direct transition to `next` is legal
    pub fn can_transition_to(&self, next: ListingStatus) -> bool {
        matches!(
            (self, next),
            (ListingStatus::Active, ListingStatus::Sold)
                | (ListingStatus::Active, ListingStatus::Cancelled)
                | (ListingStatus::Cancelled, ListingStatus::Active)
        )
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An offer to sell one NFT for a fixed price in a settlement currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Listing id
    pub id: Uuid,
    /// Ledger token identifying the NFT
    pub token: TokenAddress,
    /// Seller account, receives the NFT back on cancel
    pub seller: AccountAddress,
    /// Sale price, positive, precision fixed by `currency`
    pub price: Decimal,
    /// Settlement currency
    pub currency: Currency,
    /// Ledger environment this listing belongs to
    pub network: Network,
    /// Lifecycle status
    pub status: ListingStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
    /// Set by the sold transition
    pub sold_at: Option<DateTime<Utc>>,
}

/// Listing creation request. The NFT must already be in anchor custody.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewListing {
    /// Ledger token identifying the NFT
    pub token: TokenAddress,
    /// Seller account
    pub seller: AccountAddress,
    /// Sale price
    pub price: Decimal,
    /// Settlement currency
    pub currency: Currency,
    /// Ledger environment
    pub network: Network,
}

impl NewListing {
    /// Validate input shape. Rejected requests have no side effects.
    pub fn validate(&self) -> Result<()> {
        if self.token.as_str().is_empty() {
            return Err(EscrowError::Validation("token address is empty".to_string()));
        }
        if self.seller.as_str().is_empty() {
            return Err(EscrowError::Validation("seller address is empty".to_string()));
        }
        self.currency.to_base_units(self.price).map(|_| ())
    }
}
