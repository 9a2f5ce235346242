//! The anonymous payment protocol.
//!
//! A token moves through `Created → Blinded → Debited → Signed → Unblinded →
//! Credited`. Only `Debited` and `Credited` leave a trace on the ledger, as a
//! debit proof keyed by the blinded message and a credit proof keyed by the
//! plaintext token id. The two keys are unrelated, which is what keeps the
//! issuer from linking a redemption to the payment that funded it.
//!
//! Payer side: [`PaymentEngine::blind_token`], [`PaymentEngine::debit_my_account`],
//! [`PaymentEngine::unblind_signature`]. Issuer side:
//! [`PaymentEngine::blind_sign_token`]. Payee side:
//! [`PaymentEngine::credit_my_account`].

use crate::blind_sigs::{
    verify_signature, BlindSigner, Blinder, Envelope, SignedEnvelope, SlipSignature, Unblinder,
};
use crate::config::IssuerConfig;
use crate::context::CallerContext;
use crate::custodian::KeyCustodian;
use crate::error::{Error, Result};
use crate::keys;
use crate::ledger::{FungibleLedger, LedgerKey, PrivateState, WorldState};
use serde::{Deserialize, Serialize};

/// Every token is worth exactly one unit of the base currency.
pub const TOKEN_VALUE: u64 = 1;

/// Output of the blinding step. Both halves stay with the payer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindedToken {
    #[serde(rename = "Blinded")]
    pub blinded: String,
    #[serde(rename = "Unblinder")]
    pub unblinder: String,
}

impl BlindedToken {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::encoding("blinded token", e))
    }
}

#[derive(Clone, Debug, Default)]
pub struct PaymentEngine {
    custodian: KeyCustodian,
}

impl PaymentEngine {
    pub fn new(config: IssuerConfig) -> Self {
        Self {
            custodian: KeyCustodian::new(config),
        }
    }

    pub fn config(&self) -> &IssuerConfig {
        self.custodian.config()
    }

    /// Step 0: hide `token_id` from the issuer.
    ///
    /// Writes nothing. Should run on a peer the payer trusts, since the
    /// request carries the plaintext token id.
    pub fn blind_token<L>(&self, ledger: &L, token_id: &str) -> Result<BlindedToken>
    where
        L: WorldState + ?Sized,
    {
        if token_id.is_empty() {
            return Err(Error::MissingInput("token id"));
        }
        let pk = self.custodian.load_public_key(ledger)?;
        let (envelope, unblinder) =
            Blinder::new(pk).place_slip_in_envelope(token_id.as_bytes())?;

        tracing::debug!("token blinded");
        Ok(BlindedToken {
            blinded: envelope.to_base64(),
            unblinder: unblinder.to_base64(),
        })
    }

    /// Step 1: pay one unit to the settlement account for `blinded`.
    ///
    /// A blinded message can be paid for once. The proof and the transfer
    /// are written in the caller's transaction and commit together.
    pub fn debit_my_account<L>(
        &self,
        ctx: &CallerContext,
        ledger: &mut L,
        blinded: &str,
    ) -> Result<()>
    where
        L: WorldState + FungibleLedger + ?Sized,
    {
        let account = self.custodian.load_settlement_account(&*ledger)?;

        let pk = self.custodian.load_public_key(&*ledger)?;
        if Envelope::from_base64(blinded, &pk)?.to_base64() != blinded {
            return Err(Error::encoding("blinded message", "not in canonical form"));
        }

        let proof = LedgerKey::DebitProof(blinded.to_string());
        if !ledger.insert_if_absent(&proof, blinded.as_bytes())? {
            tracing::warn!(payer = ctx.client_id(), "blinded token already debited");
            return Err(Error::AlreadyDebited);
        }

        ledger.transfer(ctx.client_id(), &account, TOKEN_VALUE)?;
        tracing::info!(
            payer = ctx.client_id(),
            org = ctx.org_id(),
            "debited one unit for blind signing"
        );
        Ok(())
    }

    /// Step 2: the issuer signs a paid-for blinded message.
    ///
    /// Only succeeds on an issuer peer, where the private partition is
    /// readable. The plaintext token id is never seen here.
    pub fn blind_sign_token<L>(
        &self,
        ctx: &CallerContext,
        ledger: &L,
        blinded: &str,
    ) -> Result<String>
    where
        L: WorldState + PrivateState + ?Sized,
    {
        if !ledger.contains(&LedgerKey::DebitProof(blinded.to_string()))? {
            return Err(Error::NotPaid);
        }

        let sk = self.custodian.load_private_key(ledger)?;
        let envelope = Envelope::from_base64(blinded, &sk.to_public_key())?;
        let signed = BlindSigner::new(sk).sign_envelope(&envelope)?;

        tracing::info!(peer = ctx.peer_org(), "blinded token signed");
        Ok(signed.to_base64())
    }

    /// Step 3: strip the blinding from the issuer's signature. Pure.
    pub fn unblind_signature<L>(
        &self,
        ledger: &L,
        signature: &str,
        unblinder: &str,
    ) -> Result<String>
    where
        L: WorldState + ?Sized,
    {
        let pk = self.custodian.load_public_key(ledger)?;
        let signed = SignedEnvelope::from_base64(signature, &pk)?;
        let unblinder = Unblinder::from_base64(unblinder, &pk)?;

        let sig = Blinder::new(pk).signature_for_slip(&signed, &unblinder)?;
        Ok(sig.to_base64())
    }

    /// Step 4: redeem a signed token for one unit.
    ///
    /// Each plaintext token id can be redeemed once, however many blinded
    /// messages it was signed under.
    pub fn credit_my_account<L>(
        &self,
        ctx: &CallerContext,
        ledger: &mut L,
        unblinded_signature: &str,
        token_id: &str,
    ) -> Result<()>
    where
        L: WorldState + FungibleLedger + ?Sized,
    {
        if token_id.is_empty() {
            return Err(Error::MissingInput("token id"));
        }
        let pk = self.custodian.load_public_key(&*ledger)?;
        let sig = SlipSignature::from_base64(unblinded_signature, &pk)?;
        if let Err(e) = verify_signature(token_id.as_bytes(), &sig, &pk) {
            tracing::warn!(
                payee = ctx.client_id(),
                key = %keys::fingerprint(&pk),
                "rejected token signature"
            );
            return Err(e);
        }

        let proof = LedgerKey::CreditProof(token_id.to_string());
        if !ledger.insert_if_absent(&proof, sig.to_base64().as_bytes())? {
            tracing::warn!(payee = ctx.client_id(), "token already credited");
            return Err(Error::AlreadyCredited);
        }

        let account = self.custodian.load_settlement_account(&*ledger)?;
        ledger.transfer(&account, ctx.client_id(), TOKEN_VALUE)?;
        tracing::info!(
            payee = ctx.client_id(),
            org = ctx.org_id(),
            "credited one unit for token"
        );
        Ok(())
    }

    /// Whether `blinded` has been paid for.
    pub fn is_debited<L>(&self, ledger: &L, blinded: &str) -> Result<bool>
    where
        L: WorldState + ?Sized,
    {
        Ok(ledger.contains(&LedgerKey::DebitProof(blinded.to_string()))?)
    }

    /// Whether `token_id` has been redeemed.
    pub fn is_credited<L>(&self, ledger: &L, token_id: &str) -> Result<bool>
    where
        L: WorldState + ?Sized,
    {
        Ok(ledger.contains(&LedgerKey::CreditProof(token_id.to_string()))?)
    }
}
