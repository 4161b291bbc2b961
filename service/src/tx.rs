//! Hand-rolled signed extrinsics and storage keys. The service stays
//! metadata-free: call indices and storage names come from [`ChainConfig`],
//! and the wire shapes here are the stable v4 conventions.

use codec::{Compact, Decode, Encode};
use sp_core::crypto::AccountId32;
use sp_core::hashing::{blake2_128, blake2_256, twox_128};
use sp_core::{Pair as _, sr25519};

use dripgate_dispenser::gateway::GatewayError;

/// Chain constants every signed payload commits to.
#[derive(Debug, Clone)]
pub struct RuntimeEnv {
    pub spec_version: u32,
    pub transaction_version: u32,
    pub genesis_hash: [u8; 32],
}

/// The service's sr25519 signing key, derived from a SURI kept out of the
/// config file.
pub struct Signer {
    pair: sr25519::Pair,
}

impl Signer {
    pub fn from_suri(suri: &str) -> Result<Self, GatewayError> {
        let pair = sr25519::Pair::from_string(suri, None)
            .map_err(|err| GatewayError::Submission(format!("unusable signer suri: {err:?}")))?;
        Ok(Self { pair })
    }

    pub fn account(&self) -> AccountId32 {
        self.pair.public().into()
    }
}

/// Signed extrinsic v4: immortal era, zero tip, `MultiAddress::Id` sender.
/// Payloads longer than 256 bytes are signed through their blake2 digest.
pub fn build_signed(signer: &Signer, env: &RuntimeEnv, nonce: u32, call: &[u8]) -> Vec<u8> {
    let mut payload = call.to_vec();
    payload.push(0u8); // immortal era
    Compact(nonce).encode_to(&mut payload);
    Compact(0u128).encode_to(&mut payload); // tip
    env.spec_version.encode_to(&mut payload);
    env.transaction_version.encode_to(&mut payload);
    payload.extend_from_slice(&env.genesis_hash);
    payload.extend_from_slice(&env.genesis_hash); // immortal: checkpoint is genesis

    let signature = if payload.len() > 256 {
        signer.pair.sign(&blake2_256(&payload))
    } else {
        signer.pair.sign(&payload)
    };

    let account = signer.account();
    let mut body = Vec::with_capacity(call.len() + 112);
    body.push(0x84); // version 4 | signed bit
    body.push(0x00); // MultiAddress::Id
    body.extend_from_slice(account.as_ref());
    body.push(0x01); // MultiSignature::Sr25519
    body.extend_from_slice(signature.as_ref());
    body.push(0u8);
    Compact(nonce).encode_to(&mut body);
    Compact(0u128).encode_to(&mut body);
    body.extend_from_slice(call);

    let mut out = Vec::with_capacity(body.len() + 4);
    Compact(body.len() as u32).encode_to(&mut out);
    out.extend_from_slice(&body);
    out
}

/// Allowlist registration call: `(mint_id, evm_address)`.
pub fn allowlist_call(index: [u8; 2], mint_id: u32, holder: [u8; 20]) -> Vec<u8> {
    let mut call = index.to_vec();
    mint_id.encode_to(&mut call);
    call.extend_from_slice(&holder);
    call
}

/// `transfer_keep_alive { dest, value }` with an id-addressed destination.
pub fn transfer_call(index: [u8; 2], dest: &AccountId32, amount: u128) -> Vec<u8> {
    let mut call = index.to_vec();
    call.push(0x00); // MultiAddress::Id
    call.extend_from_slice(dest.as_ref());
    Compact(amount).encode_to(&mut call);
    call
}

fn append_blake2_128_concat(key: &mut Vec<u8>, raw: &[u8]) {
    key.extend_from_slice(&blake2_128(raw));
    key.extend_from_slice(raw);
}

fn to_hex(raw: &[u8]) -> String {
    let mut out = String::with_capacity(2 + raw.len() * 2);
    out.push_str("0x");
    for byte in raw {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Double-map entry key: twox prefixes, then blake2_128_concat on each of
/// the mint id and the EVM address.
pub fn allowlist_storage_key(pallet: &str, storage: &str, mint_id: u32, holder: [u8; 20]) -> String {
    let mut key = Vec::with_capacity(32 + 20 + 20 + 36);
    key.extend_from_slice(&twox_128(pallet.as_bytes()));
    key.extend_from_slice(&twox_128(storage.as_bytes()));
    append_blake2_128_concat(&mut key, &mint_id.encode());
    append_blake2_128_concat(&mut key, &holder);
    to_hex(&key)
}

/// `System.Account` entry key for one account.
pub fn account_storage_key(who: &AccountId32) -> String {
    let mut key = Vec::with_capacity(32 + 48);
    key.extend_from_slice(&twox_128(b"System"));
    key.extend_from_slice(&twox_128(b"Account"));
    append_blake2_128_concat(&mut key, who.as_ref());
    to_hex(&key)
}

/// `System.Events` plain storage key (no map hasher).
pub fn events_storage_key() -> String {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(&twox_128(b"System"));
    key.extend_from_slice(&twox_128(b"Events"));
    to_hex(&key)
}

/// `System.Account` storage value, as far as the service needs it.
#[derive(Debug, Clone, Decode)]
pub struct AccountInfo {
    pub nonce: u32,
    pub consumers: u32,
    pub providers: u32,
    pub sufficients: u32,
    pub data: AccountData,
}

#[derive(Debug, Clone, Decode)]
pub struct AccountData {
    pub free: u128,
    pub reserved: u128,
    pub frozen: u128,
    pub flags: u128,
}

/// Allowlist storage value: the entry carries the minted token id once the
/// registration has been consumed.
#[derive(Debug, Clone, Decode)]
pub enum AllowlistEntry {
    Available,
    AlreadyMinted(u128),
}
