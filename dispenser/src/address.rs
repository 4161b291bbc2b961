use core::fmt;

use serde::{Deserialize, Serialize};
use sp_core::crypto::{AccountId32, Ss58Codec};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("not a 40-hex-character evm address")]
    InvalidEvm,
    #[error("not an ss58 or 32-byte hex substrate address")]
    InvalidSubstrate,
}

/// Lowercased, `0x`-prefixed, 40-hex-character EVM address.
///
/// Parsing is the chain-specific validity check of the `VALIDATED` state:
/// anything that fails here must reach neither the ledger nor the chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EvmAddress(String);

impl EvmAddress {
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let lowered = raw.to_ascii_lowercase();
        let bare = lowered.strip_prefix("0x").unwrap_or(&lowered);
        if bare.len() == 40 && bare.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(format!("0x{bare}")))
        } else {
            Err(AddressError::InvalidEvm)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Bare hex digits, without the `0x` prefix.
    pub fn hex_digits(&self) -> &str {
        &self.0[2..]
    }

    pub fn to_bytes(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        for (i, chunk) in self.hex_digits().as_bytes().chunks(2).enumerate() {
            let hi = (chunk[0] as char).to_digit(16).unwrap_or(0) as u8;
            let lo = (chunk[1] as char).to_digit(16).unwrap_or(0) as u8;
            out[i] = (hi << 4) | lo;
        }
        out
    }
}

impl fmt::Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EvmAddress {
    type Error = AddressError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<EvmAddress> for String {
    fn from(address: EvmAddress) -> Self {
        address.0
    }
}

/// Substrate-side validity check for drip recipients: ss58 checksum decode,
/// or a raw 32-byte hex public key.
pub fn parse_substrate_address(raw: &str) -> Result<AccountId32, AddressError> {
    if let Some(bare) = raw.strip_prefix("0x") {
        if bare.len() == 64 && bare.bytes().all(|b| b.is_ascii_hexdigit()) {
            let mut bytes = [0u8; 32];
            for (i, chunk) in bare.as_bytes().chunks(2).enumerate() {
                let hi = (chunk[0] as char).to_digit(16).unwrap_or(0) as u8;
                let lo = (chunk[1] as char).to_digit(16).unwrap_or(0) as u8;
                bytes[i] = (hi << 4) | lo;
            }
            return Ok(AccountId32::from(bytes));
        }
        return Err(AddressError::InvalidSubstrate);
    }
    AccountId32::from_ss58check(raw).map_err(|_| AddressError::InvalidSubstrate)
}
