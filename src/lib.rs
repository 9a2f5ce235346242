//! Anonymous payments on top of a fungible token ledger.
//!
//! A payer turns one unit of visible balance into a bearer token blindly
//! signed by the issuer (RSA-FDH blind signatures). Anyone holding the token
//! can redeem it for one unit without the issuer being able to link the
//! redemption to the original debit.
//!
//! ```text
//! payer                       issuer peer                 payee
//! blind_token(id)
//! debit_my_account(blinded) ->
//!                             blind_sign_token(blinded)
//! unblind_signature(sig, u)
//!                       --- hands (id, signature) over -->
//!                                                         credit_my_account(sig, id)
//! ```
//!
//! Storage, identity and the base token ledger are supplied by the host
//! through the traits in [`ledger`]; [`MemoryLedger`] is an in-process
//! implementation.

mod auth;
mod blind_sigs;
mod config;
mod context;
mod custodian;
mod error;
mod keys;
pub mod ledger;
mod memory;
mod payment;
mod utils;

pub use crate::auth::{ensure_issuer, is_issuer, Operation};
pub use crate::blind_sigs::{
    verify_signature, BlindSigner, Blinder, Envelope, SignedEnvelope, Slip, SlipSignature,
    Unblinder,
};
pub use crate::config::{IssuerConfig, DEFAULT_ISSUER_ORG, DEFAULT_KEY_BITS};
pub use crate::context::{CallerContext, ConfidentialInput};
pub use crate::custodian::{KeyCustodian, CONFIDENTIAL_KEY_FIELD};
pub use crate::error::{Error, PaymentError, Result};
pub use crate::keys::{
    fingerprint, private_key_from_json, private_key_to_json, public_key_from_base64,
    public_key_to_base64, PrivateKeyRecord, PublicKeyRecord,
};
pub use crate::ledger::{
    FungibleLedger, Ledger, LedgerKey, Partition, PrivateState, StoreError, TransferError,
    WorldState,
};
pub use crate::memory::{MemoryLedger, Transaction};
pub use crate::payment::{BlindedToken, PaymentEngine, TOKEN_VALUE};
