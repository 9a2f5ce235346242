//! Structured encoding of issuer keys.
//!
//! Keys travel as JSON records whose integers are bare JSON numbers of any
//! length: modulus and public exponent for the public half, plus the private
//! exponent, the primes and the CRT values for the private half. Anything
//! exposed as text is the Base64 of that JSON.

use crate::error::{Error, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use num_bigint_dig::BigUint;
use rand::{CryptoRng, RngCore};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Smallest modulus accepted from storage.
pub const MIN_MODULUS_BITS: usize = 1024;

fn check_modulus(n: &BigUint) -> Result<()> {
    if n.bits() < MIN_MODULUS_BITS {
        return Err(Error::KeyUnavailable(format!(
            "modulus of {} bits is below the {} bit minimum",
            n.bits(),
            MIN_MODULUS_BITS
        )));
    }
    Ok(())
}

/// Serde helpers writing `BigUint` as an unquoted JSON number.
mod json_int {
    use num_bigint_dig::BigUint;
    use serde::ser::SerializeSeq;
    use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Number;
    use std::str::FromStr;

    fn to_number<E: ser::Error>(x: &BigUint) -> Result<Number, E> {
        Number::from_str(&x.to_string()).map_err(E::custom)
    }

    fn from_number<E: de::Error>(n: &Number) -> Result<BigUint, E> {
        let digits = n.to_string();
        BigUint::from_str(&digits)
            .map_err(|_| E::custom(format!("expected a non-negative integer, got {}", digits)))
    }

    pub fn serialize<S>(x: &BigUint, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        to_number::<S::Error>(x)?.serialize(s)
    }

    pub fn deserialize<'de, D>(de: D) -> Result<BigUint, D::Error>
    where
        D: Deserializer<'de>,
    {
        from_number(&Number::deserialize(de)?)
    }

    pub fn serialize_vec<S>(xs: &[BigUint], s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = s.serialize_seq(Some(xs.len()))?;
        for x in xs {
            seq.serialize_element(&to_number::<S::Error>(x)?)?;
        }
        seq.end()
    }

    pub fn deserialize_vec<'de, D>(de: D) -> Result<Vec<BigUint>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<Number>::deserialize(de)?
            .iter()
            .map(from_number)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyRecord {
    #[serde(rename = "N", with = "json_int")]
    pub n: BigUint,
    #[serde(rename = "E", with = "json_int")]
    pub e: BigUint,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateKeyRecord {
    #[serde(rename = "N", with = "json_int")]
    pub n: BigUint,
    #[serde(rename = "E", with = "json_int")]
    pub e: BigUint,
    #[serde(rename = "D", with = "json_int")]
    pub d: BigUint,
    #[serde(
        rename = "Primes",
        serialize_with = "json_int::serialize_vec",
        deserialize_with = "json_int::deserialize_vec"
    )]
    pub primes: Vec<BigUint>,
    #[serde(rename = "Precomputed")]
    pub precomputed: Precomputed,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precomputed {
    #[serde(rename = "Dp", with = "json_int")]
    pub dp: BigUint,
    #[serde(rename = "Dq", with = "json_int")]
    pub dq: BigUint,
    #[serde(rename = "Qinv", with = "json_int")]
    pub qinv: BigUint,
    /// Extra CRT values of multi-prime keys. Written empty and ignored on
    /// read; `to_key` precomputes them again.
    #[serde(rename = "CRTValues", default)]
    pub crt_values: Vec<CrtValue>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrtValue {
    #[serde(rename = "Exp", with = "json_int")]
    pub exp: BigUint,
    #[serde(rename = "Coeff", with = "json_int")]
    pub coeff: BigUint,
    #[serde(rename = "R", with = "json_int")]
    pub r: BigUint,
}

impl std::fmt::Debug for PrivateKeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKeyRecord")
            .field("n", &self.n)
            .field("e", &self.e)
            .finish_non_exhaustive()
    }
}

impl From<&RsaPublicKey> for PublicKeyRecord {
    fn from(key: &RsaPublicKey) -> Self {
        Self {
            n: key.n().clone(),
            e: key.e().clone(),
        }
    }
}

impl PublicKeyRecord {
    pub fn to_key(&self) -> Result<RsaPublicKey> {
        check_modulus(&self.n)?;
        RsaPublicKey::new(self.n.clone(), self.e.clone())
            .map_err(|e| Error::KeyUnavailable(format!("invalid public key: {}", e)))
    }
}

impl PrivateKeyRecord {
    pub fn from_key(key: &RsaPrivateKey) -> Result<Self> {
        let missing = || Error::KeyUnavailable("private key has no CRT values".to_string());
        Ok(Self {
            n: key.n().clone(),
            e: key.e().clone(),
            d: key.d().clone(),
            primes: key.primes().to_vec(),
            precomputed: Precomputed {
                dp: key.dp().ok_or_else(missing)?.clone(),
                dq: key.dq().ok_or_else(missing)?.clone(),
                qinv: key
                    .qinv()
                    .and_then(|q| q.to_biguint())
                    .ok_or_else(missing)?,
                crt_values: Vec::new(),
            },
        })
    }

    /// Rebuild and validate the key. `Dp`, `Dq` and `Qinv` must agree with
    /// the ones derived from the primes.
    pub fn to_key(&self) -> Result<RsaPrivateKey> {
        let invalid =
            |e: rsa::Error| Error::KeyUnavailable(format!("invalid private key: {}", e));
        check_modulus(&self.n)?;

        let mut key = RsaPrivateKey::from_components(
            self.n.clone(),
            self.e.clone(),
            self.d.clone(),
            self.primes.clone(),
        )
        .map_err(invalid)?;
        key.validate().map_err(invalid)?;
        key.precompute().map_err(invalid)?;

        let derived = Self::from_key(&key)?.precomputed;
        let stored = &self.precomputed;
        if (&derived.dp, &derived.dq, &derived.qinv) != (&stored.dp, &stored.dq, &stored.qinv) {
            return Err(Error::KeyUnavailable(
                "invalid private key: CRT values do not match primes".to_string(),
            ));
        }
        Ok(key)
    }

    pub fn public(&self) -> PublicKeyRecord {
        PublicKeyRecord {
            n: self.n.clone(),
            e: self.e.clone(),
        }
    }
}

/// Fresh keypair, returned as the JSON bytes of its private record.
pub fn generate_private_key<R: RngCore + CryptoRng>(
    rng: &mut R,
    bits: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    let key = RsaPrivateKey::new(rng, bits)?;
    private_key_to_json(&key)
}

pub fn private_key_to_json(key: &RsaPrivateKey) -> Result<Zeroizing<Vec<u8>>> {
    let record = PrivateKeyRecord::from_key(key)?;
    serde_json::to_vec(&record)
        .map(Zeroizing::new)
        .map_err(|e| Error::encoding("private key", e))
}

pub fn private_key_from_json(raw: &[u8]) -> Result<PrivateKeyRecord> {
    serde_json::from_slice(raw).map_err(|e| Error::encoding("private key", e))
}

pub fn public_key_to_base64(key: &RsaPublicKey) -> Result<String> {
    let raw = serde_json::to_vec(&PublicKeyRecord::from(key))
        .map_err(|e| Error::encoding("pubkey", e))?;
    Ok(BASE64_STANDARD.encode(raw))
}

/// Parse a Base64 public key. Bad Base64 or JSON is an encoding error, a
/// well-formed record holding an unusable key is `KeyUnavailable`.
pub fn public_key_from_base64(b64: &str) -> Result<RsaPublicKey> {
    let raw = BASE64_STANDARD
        .decode(b64.trim())
        .map_err(|e| Error::encoding("pubkey", e))?;
    let record: PublicKeyRecord =
        serde_json::from_slice(&raw).map_err(|e| Error::encoding("pubkey", e))?;
    record.to_key()
}

/// Short, non-secret identifier of a public key, for logs.
pub fn fingerprint(key: &RsaPublicKey) -> String {
    let digest = Sha256::new()
        .chain_update(key.n().to_bytes_be())
        .chain_update(key.e().to_bytes_be())
        .finalize();
    digest[..6].iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blind_sigs::tests::test_key;

    #[test]
    fn private_record_round_trip() -> Result<()> {
        let key = test_key();
        let json = private_key_to_json(key)?;
        let record = private_key_from_json(&json)?;
        assert_eq!(record.primes.len(), 2);
        assert_eq!(&record.to_key()?, key);
        Ok(())
    }

    #[test]
    fn public_half_matches() -> Result<()> {
        let key = test_key();
        let record = PrivateKeyRecord::from_key(key)?;
        assert_eq!(record.public().to_key()?, key.to_public_key());

        let b64 = public_key_to_base64(&key.to_public_key())?;
        assert_eq!(public_key_from_base64(&b64)?, key.to_public_key());
        Ok(())
    }

    #[test]
    fn tampered_crt_values_are_rejected() -> Result<()> {
        let mut record = PrivateKeyRecord::from_key(test_key())?;
        record.precomputed.dp = BigUint::from(12345u32);
        assert!(matches!(record.to_key(), Err(Error::KeyUnavailable(_))));
        Ok(())
    }

    #[test]
    fn bad_public_keys() {
        let err = public_key_from_base64("BAD_KEY").unwrap_err();
        assert!(err.to_string().starts_with("failed to decode pubkey: "));

        let not_json = BASE64_STANDARD.encode("BAD_KEY");
        let err = public_key_from_base64(&not_json).unwrap_err();
        assert!(matches!(err, Error::Encoding { what: "pubkey", .. }));

        let weak = BASE64_STANDARD.encode(r#"{"N":3233,"E":1}"#);
        let err = public_key_from_base64(&weak).unwrap_err();
        assert!(matches!(err, Error::KeyUnavailable(_)));

        for bad in [r#"{"N":-3233,"E":17}"#, r#"{"N":3.5,"E":17}"#, r#"{"N":"3233","E":17}"#] {
            let err = public_key_from_base64(&BASE64_STANDARD.encode(bad)).unwrap_err();
            assert!(matches!(err, Error::Encoding { what: "pubkey", .. }), "{}", bad);
        }
    }

    const ISSUER_KEY: &str = include_str!("../tests/data/issuer_key.json");
    const ISSUER_PUBKEY: &str = include_str!("../tests/data/issuer_pubkey.b64");

    #[test]
    fn integers_are_written_as_json_numbers() -> Result<()> {
        let json = private_key_to_json(test_key())?;
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert!(value["N"].is_number());
        assert!(value["Primes"][0].is_number());
        assert!(value["Precomputed"]["Qinv"].is_number());
        assert_eq!(value["Precomputed"]["CRTValues"], serde_json::json!([]));

        let b64 = public_key_to_base64(&test_key().to_public_key())?;
        let raw = BASE64_STANDARD.decode(b64).unwrap();
        let expected = format!(r#"{{"N":{},"E":65537}}"#, test_key().n());
        assert_eq!(String::from_utf8(raw).unwrap(), expected);
        Ok(())
    }

    #[test]
    fn reads_keys_written_by_existing_issuers() -> Result<()> {
        let pk = public_key_from_base64(ISSUER_PUBKEY)?;
        assert_eq!(pk.n().bits(), 2048);
        assert_eq!(pk.e(), &BigUint::from(65537u32));

        let record = private_key_from_json(ISSUER_KEY.trim().as_bytes())?;
        let sk = record.to_key()?;
        assert_eq!(sk.to_public_key(), pk);
        assert_eq!(PrivateKeyRecord::from_key(&sk)?, record);
        Ok(())
    }

    #[test]
    fn fingerprint_is_stable() {
        let pk = test_key().to_public_key();
        assert_eq!(fingerprint(&pk), fingerprint(&pk));
        assert_eq!(fingerprint(&pk).len(), 12);
    }
}
