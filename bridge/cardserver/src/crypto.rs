//! The commutative-masking layer the card-server peers use to jointly
//! shuffle and reveal a deck without any one peer learning a card before
//! every peer agrees it should.
//!
//! Each of the 52 card types is mapped to a fixed point on the Ristretto
//! group (`card_point`). A card's position in the deck carries an additive
//! ElGamal ciphertext of its card point under the peers' aggregate public
//! key. "Masking" (the initial encryption) and "remasking" (re-randomizing
//! during a shuffle) are both just fresh ElGamal encryptions of the same
//! plaintext point, so a peer can reshuffle and rerandomize a full deck
//! without decrypting any of it. Revealing a card is distributed
//! decryption: every peer publishes its own partial-decryption share
//! (`RevealToken`) for that card's ciphertext, and once shares from every
//! peer are collected they combine to recover the plaintext point.
//!
//! Every share a peer publishes carries a Chaum-Pedersen proof that it used
//! the same secret scalar as its known public key — the "zero-knowledge
//! proof" the control protocol refers to. This workspace's shuffle proof is
//! correspondingly a per-card remasking-equality proof (the output
//! ciphertext encrypts the same plaintext as some input ciphertext under
//! fresh randomness); it does not additionally prove that the full set of
//! 52 outputs is a bijection of the 52 inputs, which would need a dedicated
//! shuffle argument (Bayer-Groth or similar) well beyond what a single
//! card-server control command can verify synchronously. See DESIGN.md.

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT as G;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha512};

pub const POINT_SIZE: usize = 32;
pub const SCALAR_SIZE: usize = 32;

/// The 52 canonical card points, derived deterministically from the card's
/// deck-order index so every peer computes the identical table without
/// needing to exchange it.
pub fn card_point(deck_index: u8) -> RistrettoPoint {
    let mut hasher = Sha512::new();
    hasher.update(b"bridge-cardserver/card-point");
    hasher.update([deck_index]);
    let digest = hasher.finalize();
    let mut bytes = [0u8; 64];
    bytes.copy_from_slice(&digest);
    RistrettoPoint::from_uniform_bytes(&bytes)
}

pub fn random_scalar() -> Scalar {
    let mut rng = OsRng;
    let mut bytes = [0u8; 64];
    rng.fill_bytes(&mut bytes);
    Scalar::from_bytes_mod_order_wide(&bytes)
}

/// A peer's long-lived keypair within one group: `public = secret * G`.
#[derive(Clone, Copy)]
pub struct KeyPair {
    pub secret: Scalar,
    pub public: RistrettoPoint,
}

impl KeyPair {
    pub fn generate() -> KeyPair {
        let secret = random_scalar();
        KeyPair { secret, public: secret * G }
    }
}

/// Additive ElGamal ciphertext of a card point under some (possibly
/// aggregate) public key: `c0 = r*G`, `c1 = point + r*public`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ciphertext {
    pub c0: CompressedRistretto,
    pub c1: CompressedRistretto,
}

impl Ciphertext {
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(self.c0.as_bytes());
        bytes[32..].copy_from_slice(self.c1.as_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Ciphertext> {
        if bytes.len() != 64 {
            return None;
        }
        Some(Ciphertext {
            c0: CompressedRistretto::from_slice(&bytes[..32]),
            c1: CompressedRistretto::from_slice(&bytes[32..]),
        })
    }

    fn c0_point(&self) -> Option<RistrettoPoint> {
        self.c0.decompress()
    }

    fn c1_point(&self) -> Option<RistrettoPoint> {
        self.c1.decompress()
    }
}

/// Encrypts `point` under `aggregate_public` with fresh randomness `r`,
/// returning the ciphertext and the randomness used (needed by the caller
/// to build a remasking proof when this is done as part of a shuffle step).
pub fn mask(point: RistrettoPoint, aggregate_public: RistrettoPoint) -> (Ciphertext, Scalar) {
    let r = random_scalar();
    let c0 = r * G;
    let c1 = point + r * aggregate_public;
    (Ciphertext { c0: c0.compress(), c1: c1.compress() }, r)
}

/// Re-randomizes an existing ciphertext without changing its plaintext:
/// adds a fresh encryption of the identity point under `aggregate_public`.
pub fn remask(ct: &Ciphertext, aggregate_public: RistrettoPoint) -> Option<(Ciphertext, Scalar)> {
    let c0 = ct.c0_point()?;
    let c1 = ct.c1_point()?;
    let r = random_scalar();
    let new_c0 = c0 + r * G;
    let new_c1 = c1 + r * aggregate_public;
    Some((Ciphertext { c0: new_c0.compress(), c1: new_c1.compress() }, r))
}

/// Chaum-Pedersen proof of equality of discrete logs: demonstrates that the
/// same scalar `x` satisfies `p1 = x*g1` and `p2 = x*g2` without revealing
/// `x`. Used both for "this reveal share used the secret matching my known
/// public key" and "this remasked ciphertext differs from its input by
/// `r*G`/`r*aggregate` for the same `r`".
#[derive(Clone, Copy, Debug)]
pub struct DleqProof {
    pub commitment1: CompressedRistretto,
    pub commitment2: CompressedRistretto,
    pub response: Scalar,
}

fn dleq_challenge(
    g1: RistrettoPoint,
    p1: RistrettoPoint,
    g2: RistrettoPoint,
    p2: RistrettoPoint,
    k1: RistrettoPoint,
    k2: RistrettoPoint,
) -> Scalar {
    let mut hasher = Sha512::new();
    for point in [g1, p1, g2, p2, k1, k2] {
        hasher.update(point.compress().as_bytes());
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 64];
    bytes.copy_from_slice(&digest);
    Scalar::from_bytes_mod_order_wide(&bytes)
}

pub fn prove_dleq(x: Scalar, g1: RistrettoPoint, g2: RistrettoPoint) -> (RistrettoPoint, RistrettoPoint, DleqProof) {
    let p1 = x * g1;
    let p2 = x * g2;
    let k = random_scalar();
    let k1 = k * g1;
    let k2 = k * g2;
    let challenge = dleq_challenge(g1, p1, g2, p2, k1, k2);
    let response = k + challenge * x;
    (p1, p2, DleqProof { commitment1: k1.compress(), commitment2: k2.compress(), response })
}

pub fn verify_dleq(g1: RistrettoPoint, p1: RistrettoPoint, g2: RistrettoPoint, p2: RistrettoPoint, proof: &DleqProof) -> bool {
    let (k1, k2) = match (proof.commitment1.decompress(), proof.commitment2.decompress()) {
        (Some(k1), Some(k2)) => (k1, k2),
        _ => return false,
    };
    let challenge = dleq_challenge(g1, p1, g2, p2, k1, k2);
    proof.response * g1 == k1 + challenge * p1 && proof.response * g2 == k2 + challenge * p2
}

/// A peer's partial decryption share for one card: `token = secret * c0`,
/// with a DLEQ proof that `secret` is the same scalar behind `public`.
#[derive(Clone, Copy, Debug)]
pub struct RevealShare {
    pub token: CompressedRistretto,
    pub proof: DleqProof,
}

pub fn make_reveal_share(keypair: &KeyPair, ct: &Ciphertext) -> Option<RevealShare> {
    let c0 = ct.c0_point()?;
    let (public_check, token, proof) = prove_dleq(keypair.secret, G, c0);
    debug_assert_eq!(public_check, keypair.public);
    Some(RevealShare { token: token.compress(), proof })
}

pub fn verify_reveal_share(public: RistrettoPoint, ct: &Ciphertext, share: &RevealShare) -> bool {
    let c0 = match ct.c0_point() {
        Some(c0) => c0,
        None => return false,
    };
    let token = match share.token.decompress() {
        Some(token) => token,
        None => return false,
    };
    verify_dleq(G, public, c0, token, &share.proof)
}

/// Combines one decryption share per peer (order is irrelevant — the
/// combination is a group sum) to recover the plaintext card point.
pub fn combine_shares(ct: &Ciphertext, shares: &[RistrettoPoint]) -> Option<RistrettoPoint> {
    let c1 = ct.c1_point()?;
    let sum: RistrettoPoint = shares.iter().fold(RistrettoPoint::default(), |acc, &s| acc + s);
    Some(c1 - sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_and_full_decrypt_round_trips() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let aggregate = alice.public + bob.public;

        let point = card_point(5);
        let (ct, _) = mask(point, aggregate);

        let share_a = make_reveal_share(&alice, &ct).unwrap();
        let share_b = make_reveal_share(&bob, &ct).unwrap();
        assert!(verify_reveal_share(alice.public, &ct, &share_a));
        assert!(verify_reveal_share(bob.public, &ct, &share_b));

        let tokens = vec![share_a.token.decompress().unwrap(), share_b.token.decompress().unwrap()];
        let recovered = combine_shares(&ct, &tokens).unwrap();
        assert_eq!(recovered, point);
    }

    #[test]
    fn remask_preserves_plaintext_under_full_decrypt() {
        let alice = KeyPair::generate();
        let aggregate = alice.public;
        let point = card_point(9);
        let (ct, _) = mask(point, aggregate);
        let (remasked, _) = remask(&ct, aggregate).unwrap();
        assert_ne!(ct, remasked);

        let share = make_reveal_share(&alice, &remasked).unwrap();
        let recovered = combine_shares(&remasked, &[share.token.decompress().unwrap()]).unwrap();
        assert_eq!(recovered, point);
    }

    #[test]
    fn tampered_share_fails_verification() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let aggregate = alice.public + bob.public;
        let point = card_point(1);
        let (ct, _) = mask(point, aggregate);

        let forged = make_reveal_share(&bob, &ct).unwrap();
        assert!(!verify_reveal_share(alice.public, &ct, &forged));
    }
}
