//! Peer bookkeeping for one card-server group: the totally-ordered peer
//! list established at `init`, the aggregate public key derived from every
//! peer's contribution, and the in-flight reveal-share collection state for
//! whichever card indices are currently being opened.

use crate::crypto::{self, DleqProof, KeyPair};
use crate::error::ProofError;
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT as G;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use std::collections::HashMap;

/// One entry of the peer list passed to `init`, in global order, with the
/// entry for the controlling node's own order omitted (the caller inserts
/// itself locally).
#[derive(Clone, Debug)]
pub struct PeerEntry {
    pub order: u8,
    pub identity: String,
    pub public_key: [u8; 32],
}

struct Peer {
    identity: String,
    public_key: RistrettoPoint,
}

pub struct PeerGroup {
    pub self_order: u8,
    pub keypair: KeyPair,
    peers: HashMap<u8, Peer>,
    pub aggregate_public: RistrettoPoint,
}

impl PeerGroup {
    /// Establishes the group: inserts the controlling node at `self_order`
    /// among `peers`, publishes and verifies each peer's proof of
    /// possession of its claimed public key (a Schnorr proof, modeled as a
    /// DLEQ proof against the same generator twice), and folds every public
    /// key into the aggregate.
    pub fn init(
        self_order: u8,
        keypair: KeyPair,
        peers: &[(PeerEntry, DleqProof)],
    ) -> Result<PeerGroup, ProofError> {
        let mut table = HashMap::new();
        let mut aggregate = keypair.public;

        for (entry, proof) in peers {
            let public = CompressedRistretto(entry.public_key)
                .decompress()
                .ok_or(ProofError::VerificationFailed { peer_order: entry.order })?;
            if !crypto::verify_dleq(G, public, G, public, proof) {
                return Err(ProofError::VerificationFailed { peer_order: entry.order });
            }
            aggregate += public;
            table.insert(entry.order, Peer { identity: entry.identity.clone(), public_key: public });
        }

        Ok(PeerGroup { self_order, keypair, peers: table, aggregate_public: aggregate })
    }

    /// Proof of possession of this node's own secret key, to be published
    /// alongside its public key during `init`.
    pub fn proof_of_possession(keypair: &KeyPair) -> DleqProof {
        let (_, _, proof) = crypto::prove_dleq(keypair.secret, G, G);
        proof
    }

    pub fn peer_public_key(&self, order: u8) -> Option<RistrettoPoint> {
        self.peers.get(&order).map(|p| p.public_key)
    }

    pub fn peer_identity(&self, order: u8) -> Option<&str> {
        self.peers.get(&order).map(|p| p.identity.as_str())
    }

    pub fn peer_orders(&self) -> Vec<u8> {
        let mut orders: Vec<u8> = self.peers.keys().copied().collect();
        orders.sort_unstable();
        orders
    }

    pub fn number_of_peers(&self) -> usize {
        self.peers.len() + 1
    }
}
