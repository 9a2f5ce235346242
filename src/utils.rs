use num_bigint_dig::{BigUint, ModInverse};
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};

// Domain separation tag for hashing token ids onto the RSA group.
const TOKEN_DST: &[u8] = b"BLINDPAY_RSA-FDH_SHA-256_V1_";

// Attempts before giving up on finding an invertible blinding factor. For an
// RSA modulus a non-invertible draw means a factor of n was hit.
const MAX_BLINDING_ATTEMPTS: usize = 64;

/// Full-domain hash of `msg` to an integer strictly below `n`.
///
/// SHA-256 is run in counter mode over `dst || counter || len(msg) || msg`
/// until enough bytes are produced, then truncated to `bits(n) - 1` bits.
pub(crate) fn hash_to_int_with_dst(msg: &[u8], n: &BigUint) -> BigUint {
    let target_bits = n.bits().saturating_sub(1);
    let len = (target_bits + 7) / 8;

    let mut out = Vec::with_capacity(len + 32);
    let mut counter: u32 = 0;
    while out.len() < len {
        let mut hasher = Sha256::new();
        hasher.update(TOKEN_DST);
        hasher.update(counter.to_be_bytes());
        hasher.update((msg.len() as u64).to_be_bytes());
        hasher.update(msg);
        out.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    out.truncate(len);

    let excess = len * 8 - target_bits;
    if excess > 0 {
        out[0] &= 0xff >> excess;
    }
    BigUint::from_bytes_be(&out)
}

/// Draw `r` uniformly from the units modulo `n`, returning `(r, r^-1 mod n)`.
pub(crate) fn random_unit<R: RngCore + CryptoRng>(
    rng: &mut R,
    n: &BigUint,
) -> Option<(BigUint, BigUint)> {
    let one = BigUint::from(1u32);
    let mut bytes = vec![0u8; byte_len(n)];

    for _ in 0..MAX_BLINDING_ATTEMPTS {
        rng.fill_bytes(&mut bytes);
        let r = BigUint::from_bytes_be(&bytes) % n;
        if r <= one {
            continue;
        }
        let inverse = r
            .clone()
            .mod_inverse(n)
            .and_then(|inv| inv.to_biguint());
        if let Some(inverse) = inverse {
            return Some((r, inverse));
        }
    }
    None
}

// y = x * r^e mod n
pub(crate) fn blind(msg: &BigUint, r: &BigUint, e: &BigUint, n: &BigUint) -> BigUint {
    (msg * r.modpow(e, n)) % n
}

// x = y * r^-1 mod n
pub(crate) fn unblind(sig: &BigUint, r_inv: &BigUint, n: &BigUint) -> BigUint {
    (sig * r_inv) % n
}

// s = m^d mod n
pub(crate) fn sign_int(msg: &BigUint, d: &BigUint, n: &BigUint) -> BigUint {
    msg.modpow(d, n)
}

// m = s^e mod n
pub(crate) fn open_int(sig: &BigUint, e: &BigUint, n: &BigUint) -> BigUint {
    sig.modpow(e, n)
}

/// Number of bytes needed to hold any residue modulo `n`.
pub(crate) fn byte_len(n: &BigUint) -> usize {
    (n.bits() + 7) / 8
}

/// Big-endian bytes of `x`, left-padded with zeros to `len`.
pub(crate) fn int_to_be_bytes(x: &BigUint, len: usize) -> Vec<u8> {
    let raw = x.to_bytes_be();
    if raw.len() >= len {
        return raw;
    }
    let mut padded = vec![0u8; len - raw.len()];
    padded.extend_from_slice(&raw);
    padded
}
