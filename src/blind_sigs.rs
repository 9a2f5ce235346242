use crate::error::{Error, Result};
use crate::utils::*;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use num_bigint_dig::BigUint;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{RsaPrivateKey, RsaPublicKey};
use subtle::ConstantTimeEq;

/// Represents the token id the payer wants signed
/// without the issuer ever seeing it.
pub type Slip = Vec<u8>;

/// Decode a Base64 residue modulo `n`, rejecting values outside the group.
fn decode_residue(what: &'static str, b64: &str, n: &BigUint) -> Result<BigUint> {
    let bytes = BASE64_STANDARD
        .decode(b64.trim())
        .map_err(|e| Error::encoding(what, e))?;
    if bytes.is_empty() || bytes.len() > byte_len(n) {
        return Err(Error::encoding(
            what,
            format!("expected at most {} bytes, got {}", byte_len(n), bytes.len()),
        ));
    }
    let x = BigUint::from_bytes_be(&bytes);
    if &x >= n {
        return Err(Error::encoding(what, "value is not below the modulus"));
    }
    Ok(x)
}

fn encode_residue(x: &BigUint, n: &BigUint) -> String {
    BASE64_STANDARD.encode(int_to_be_bytes(x, byte_len(n)))
}

/// Represents the party that hides a Slip
/// inside an Envelope, using the issuer's public key.
#[derive(Clone, Debug)]
pub struct Blinder {
    pk: RsaPublicKey,
}

impl Blinder {
    pub fn new(pk: RsaPublicKey) -> Self {
        Self { pk }
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.pk
    }

    pub fn place_slip_in_envelope(&self, slip: &[u8]) -> Result<(Envelope, Unblinder)> {
        self.place_slip_in_envelope_with(&mut OsRng, slip)
    }

    pub fn place_slip_in_envelope_with<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        slip: &[u8],
    ) -> Result<(Envelope, Unblinder)> {
        let n = self.pk.n();
        let msg = hash_to_int_with_dst(slip, n);

        let (r, r_inv) = random_unit(rng, n).ok_or_else(|| {
            Error::BlindingFailed("no invertible blinding factor found".to_string())
        })?;
        let blinded_msg = blind(&msg, &r, self.pk.e(), n);

        Ok((
            Envelope {
                blinded_msg,
                modulus: n.clone(),
            },
            Unblinder {
                r_inv,
                modulus: n.clone(),
            },
        ))
    }

    /// Removes the blinding from a signed envelope, yielding
    /// a signature on the Slip inside.
    pub fn signature_for_slip(
        &self,
        signed: &SignedEnvelope,
        unblinder: &Unblinder,
    ) -> Result<SlipSignature> {
        let n = self.pk.n();
        if unblinder.modulus != *n || signed.modulus != *n {
            return Err(Error::encoding(
                "unblinder",
                "blinding was made under a different issuer key",
            ));
        }
        let sig = unblind(&signed.signature, &unblinder.r_inv, n);
        Ok(SlipSignature {
            sig,
            modulus: n.clone(),
        })
    }
}

/// An Envelope holds a Slip inside without
/// revealing the Slip's contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    blinded_msg: BigUint,
    modulus: BigUint,
}

impl Envelope {
    pub fn from_base64(b64: &str, pk: &RsaPublicKey) -> Result<Self> {
        let blinded_msg = decode_residue("blinded message", b64, pk.n())?;
        Ok(Self {
            blinded_msg,
            modulus: pk.n().clone(),
        })
    }

    pub fn to_base64(&self) -> String {
        encode_residue(&self.blinded_msg, &self.modulus)
    }
}

/// The secret factor that removes the blinding.
/// Only the party that made the Envelope holds it.
#[derive(Clone, PartialEq, Eq)]
pub struct Unblinder {
    r_inv: BigUint,
    modulus: BigUint,
}

impl Unblinder {
    pub fn from_base64(b64: &str, pk: &RsaPublicKey) -> Result<Self> {
        let r_inv = decode_residue("unblinder", b64, pk.n())?;
        Ok(Self {
            r_inv,
            modulus: pk.n().clone(),
        })
    }

    pub fn to_base64(&self) -> String {
        encode_residue(&self.r_inv, &self.modulus)
    }
}

impl std::fmt::Debug for Unblinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Unblinder(<redacted>)")
    }
}

/// An Envelope which has a signature written
/// on it by the BlindSigner party.
///
/// Like an envelope lined with carbon paper, the
/// signature also lands on the Slip inside, even though
/// the BlindSigner party has never seen the Slip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedEnvelope {
    signature: BigUint,
    modulus: BigUint,
}

impl SignedEnvelope {
    pub fn from_base64(b64: &str, pk: &RsaPublicKey) -> Result<Self> {
        let signature = decode_residue("signature", b64, pk.n())?;
        Ok(Self {
            signature,
            modulus: pk.n().clone(),
        })
    }

    pub fn to_base64(&self) -> String {
        encode_residue(&self.signature, &self.modulus)
    }
}

/// A plain RSA-FDH signature on a Slip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlipSignature {
    sig: BigUint,
    modulus: BigUint,
}

impl SlipSignature {
    pub fn from_base64(b64: &str, pk: &RsaPublicKey) -> Result<Self> {
        let sig = decode_residue("signature", b64, pk.n())?;
        Ok(Self {
            sig,
            modulus: pk.n().clone(),
        })
    }

    pub fn to_base64(&self) -> String {
        encode_residue(&self.sig, &self.modulus)
    }
}

/// Check `sig` against the plain Slip under the issuer key.
pub fn verify_signature(slip: &[u8], sig: &SlipSignature, pk: &RsaPublicKey) -> Result<()> {
    let n = pk.n();
    if sig.modulus != *n {
        return Err(Error::InvalidSignature);
    }
    let len = byte_len(n);
    let expected = int_to_be_bytes(&hash_to_int_with_dst(slip, n), len);
    let opened = int_to_be_bytes(&open_int(&sig.sig, pk.e(), n), len);

    if bool::from(expected.ct_eq(&opened)) {
        Ok(())
    } else {
        Err(Error::InvalidSignature)
    }
}

/// Represents the party that signs the Envelope
/// without seeing the Slip inside.
pub struct BlindSigner {
    sk: RsaPrivateKey,
}

impl BlindSigner {
    pub fn new(sk: RsaPrivateKey) -> Self {
        Self { sk }
    }

    pub fn public_key(&self) -> RsaPublicKey {
        self.sk.to_public_key()
    }

    pub fn sign_envelope(&self, e: &Envelope) -> Result<SignedEnvelope> {
        let n = self.sk.n();
        if e.modulus != *n {
            return Err(Error::Signing(
                "envelope was blinded under a different key".to_string(),
            ));
        }
        // Note we sign the blinded integer directly, there is no hashing or
        // padding here. The payer already applied the full-domain hash.
        let signature = sign_int(&e.blinded_msg, self.sk.d(), n);

        // refuse to release a faulty signature
        if open_int(&signature, self.sk.e(), n) != e.blinded_msg {
            return Err(Error::Signing("signature self-check failed".to_string()));
        }

        Ok(SignedEnvelope {
            signature,
            modulus: n.clone(),
        })
    }
}

impl From<RsaPrivateKey> for BlindSigner {
    fn from(sk: RsaPrivateKey) -> Self {
        Self { sk }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::OnceLock;

    /// A 1024-bit key shared by every test in the crate.
    pub(crate) fn test_key() -> &'static RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 1024).expect("generate test key"))
    }

    #[test]
    fn single_signer() -> Result<()> {
        let official = BlindSigner::from(test_key().clone());
        let payer = Blinder::new(official.public_key());

        let slip: Slip = b"2f1c1c1e-4e53-4a0b-9c53-7e1c0f0f6a11".to_vec();
        let (envelope, unblinder) = payer.place_slip_in_envelope(&slip)?;

        let signed_envelope = official.sign_envelope(&envelope)?;
        let slip_sig = payer.signature_for_slip(&signed_envelope, &unblinder)?;

        verify_signature(&slip, &slip_sig, payer.public_key())?;
        Ok(())
    }

    #[test]
    fn signature_does_not_transfer_to_other_slips() -> Result<()> {
        let official = BlindSigner::from(test_key().clone());
        let payer = Blinder::new(official.public_key());

        let (envelope, unblinder) = payer.place_slip_in_envelope(b"token-a")?;
        let signed = official.sign_envelope(&envelope)?;
        let sig = payer.signature_for_slip(&signed, &unblinder)?;

        let result = verify_signature(b"token-b", &sig, payer.public_key());
        assert!(matches!(result, Err(Error::InvalidSignature)));
        Ok(())
    }

    #[test]
    fn envelopes_of_one_slip_are_unlinkable() -> Result<()> {
        let payer = Blinder::new(test_key().to_public_key());
        let (a, _) = payer.place_slip_in_envelope(b"same token")?;
        let (b, _) = payer.place_slip_in_envelope(b"same token")?;
        assert_ne!(a, b);
        Ok(())
    }

    #[test]
    fn base64_round_trip_preserves_envelope() -> Result<()> {
        let pk = test_key().to_public_key();
        let payer = Blinder::new(pk.clone());
        let (envelope, unblinder) = payer.place_slip_in_envelope(b"token")?;

        assert_eq!(Envelope::from_base64(&envelope.to_base64(), &pk)?, envelope);
        assert_eq!(Unblinder::from_base64(&unblinder.to_base64(), &pk)?, unblinder);
        assert_eq!(envelope.to_base64().len(), unblinder.to_base64().len());
        Ok(())
    }

    #[test]
    fn rejects_out_of_range_values() {
        let pk = test_key().to_public_key();
        let too_big = BASE64_STANDARD.encode(vec![0xffu8; byte_len(pk.n())]);
        let err = Envelope::from_base64(&too_big, &pk).unwrap_err();
        assert!(matches!(err, Error::Encoding { .. }));

        let err = SignedEnvelope::from_base64("BAD_MESSAGE", &pk).unwrap_err();
        assert!(err.to_string().starts_with("failed to decode signature: "));
    }
}
