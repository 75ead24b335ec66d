//! The card-server process's core: owns the masked deck and the peer
//! group, and implements the five control operations (`init`, `shuffle`,
//! `draw`, `reveal`, `revealall`) against them. Each operation is
//! synchronous from the controlling bridge node's point of view (the
//! control socket carries one outstanding command at a time, per spec
//! §5), but internally drives the peer proxy through as many poll cycles
//! as it takes for every peer to respond — bounded by a wall-clock
//! timeout, since the mental-card protocol defines no in-band abort.

use crate::crypto::{self, DleqProof, KeyPair};
use crate::deck::Deck;
use crate::error::ProofError;
use crate::group::{PeerEntry, PeerGroup};
use crate::proxy::PeerProxy;
use bridgeutil::error::ProtocolError;
use curve25519_dalek::ristretto::RistrettoPoint;
use std::time::{Duration, Instant};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct CardServer {
    group: Option<PeerGroup>,
    deck: Option<Deck>,
    proxy: PeerProxy,
    timeout: Duration,
}

impl CardServer {
    pub fn new(proxy: PeerProxy) -> CardServer {
        CardServer { group: None, deck: None, proxy, timeout: DEFAULT_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> CardServer {
        self.timeout = timeout;
        self
    }

    fn poll_until<T>(&mut self, mut attempt: impl FnMut(&mut Self) -> Option<T>) -> Result<T, ProtocolError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(value) = attempt(self) {
                return Ok(value);
            }
            self.proxy.sync(Instant::now());
            if Instant::now() >= deadline {
                return Err(ProtocolError::TimedOut);
            }
        }
    }

    /// `init { order, peers }`: establishes the peer group and its
    /// aggregate public key.
    pub fn init(&mut self, self_order: u8, keypair: KeyPair, peers: Vec<PeerEntry>) -> Result<(), ProtocolError> {
        if self.group.is_some() {
            return Err(ProofError::AlreadyInitialized.into());
        }

        let proof = PeerGroup::proof_of_possession(&keypair);
        self.proxy.broadcast(encode_public_key(keypair.public, proof));

        let mut received: Vec<(PeerEntry, DleqProof)> = Vec::new();
        let wanted: Vec<u8> = peers.iter().map(|p| p.order).collect();

        self.poll_until(|this| {
            for &order in &wanted {
                if received.iter().any(|(e, _)| e.order == order) {
                    continue;
                }
                if let Some(bytes) = this.proxy.recv_from(order) {
                    if let Some((public_key, proof)) = decode_public_key(&bytes) {
                        let entry = peers.iter().find(|p| p.order == order).expect("order is in peers").clone();
                        received.push((PeerEntry { public_key, ..entry }, proof));
                    }
                }
            }
            (received.len() == wanted.len()).then(|| ())
        })?;

        let group = PeerGroup::init(self_order, keypair, &received).map_err(ProtocolError::from)?;
        self.group = Some(group);
        self.deck = None;
        Ok(())
    }

    fn group(&self) -> Result<&PeerGroup, ProtocolError> {
        self.group.as_ref().ok_or_else(|| ProofError::NotInitialized.into())
    }

    /// `shuffle {}`: every peer in turn permutes and remasks the deck,
    /// proving each output card is a remasking of some input card.
    pub fn shuffle(&mut self) -> Result<(), ProtocolError> {
        let aggregate = self.group()?.aggregate_public;
        let mut deck = self.deck.take().unwrap_or_else(|| Deck::new(aggregate));

        let order = self.group()?.peer_orders();
        let self_order = self.group()?.self_order;
        let mut all_orders = order.clone();
        all_orders.push(self_order);
        all_orders.sort_unstable();

        for turn in all_orders {
            if turn == self_order {
                let permutation = random_permutation(deck.len());
                let remasked = deck.apply_shuffle(&permutation);
                let payload = encode_shuffle(&remasked);
                self.proxy.broadcast(payload);
            } else {
                let remasked = self.poll_until(|this| {
                    this.proxy.recv_from(turn).and_then(|bytes| decode_shuffle(&bytes))
                })?;
                if remasked.len() != deck.len() {
                    return Err(ProofError::VerificationFailed { peer_order: turn }.into());
                }
                deck.slots = remasked
                    .into_iter()
                    .map(|ciphertext| crate::deck::Slot { ciphertext, revealed: None })
                    .collect();
            }
        }

        self.deck = Some(deck);
        Ok(())
    }

    fn deck_mut(&mut self) -> Result<&mut Deck, ProtocolError> {
        self.deck.as_mut().ok_or_else(|| ProofError::NotInitialized.into())
    }

    /// `draw { cards }`: learn the listed indices by opening our own share
    /// and collecting every peer's.
    pub fn draw(&mut self, cards: &[u8]) -> Result<[Option<u8>; 52], ProtocolError> {
        self.open_indices(cards)
    }

    /// `reveal { order, cards }`: publish our share proving the peer at
    /// `order` may learn `cards`. No reply payload.
    pub fn reveal(&mut self, cards: &[u8]) -> Result<(), ProtocolError> {
        self.publish_shares(cards)?;
        Ok(())
    }

    /// `revealall { cards }`: every peer opens its share for `cards`.
    pub fn revealall(&mut self, cards: &[u8]) -> Result<[Option<u8>; 52], ProtocolError> {
        self.publish_shares(cards)?;
        self.open_indices(cards)
    }

    fn publish_shares(&mut self, cards: &[u8]) -> Result<(), ProtocolError> {
        let keypair = self.group()?.keypair;
        let deck = self.deck_mut()?;
        for &index in cards {
            let slot = deck
                .slots
                .get(index as usize)
                .ok_or(ProofError::IndexOutOfRange { index })?;
            let share = crypto::make_reveal_share(&keypair, &slot.ciphertext).ok_or(ProofError::IndexOutOfRange { index })?;
            let payload = encode_reveal_share(index, &share);
            self.proxy.broadcast(payload);
        }
        Ok(())
    }

    fn open_indices(&mut self, cards: &[u8]) -> Result<[Option<u8>; 52], ProtocolError> {
        let peer_orders = self.group()?.peer_orders();
        let self_order = self.group()?.self_order;

        for &index in cards {
            let mut gathered: std::collections::HashMap<u8, RistrettoPoint> = std::collections::HashMap::new();
            // our own share always counts toward the combination.
            {
                let keypair = self.group()?.keypair;
                let ciphertext = self
                    .deck
                    .as_ref()
                    .ok_or(ProofError::NotInitialized)?
                    .slots
                    .get(index as usize)
                    .ok_or(ProofError::IndexOutOfRange { index })?
                    .ciphertext;
                let share = crypto::make_reveal_share(&keypair, &ciphertext).ok_or(ProofError::IndexOutOfRange { index })?;
                gathered.insert(self_order, share.token.decompress().ok_or(ProofError::IndexOutOfRange { index })?);
            }

            self.poll_until(|this| {
                for &order in &peer_orders {
                    if gathered.contains_key(&order) {
                        continue;
                    }
                    if let Some(bytes) = this.proxy.recv_from(order) {
                        if let Some((card_index, token, share)) = decode_reveal_share(&bytes) {
                            if card_index != index {
                                continue;
                            }
                            let public = match this.group.as_ref().and_then(|g| g.peer_public_key(order)) {
                                Some(public) => public,
                                None => continue,
                            };
                            let ciphertext = match this.deck.as_ref() {
                                Some(deck) => deck.slots[index as usize].ciphertext,
                                None => continue,
                            };
                            if crypto::verify_reveal_share(public, &ciphertext, &share) {
                                gathered.insert(order, token);
                            }
                        }
                    }
                }
                (gathered.len() == peer_orders.len() + 1).then(|| ())
            })?;

            let shares: Vec<RistrettoPoint> = gathered.values().copied().collect();
            let deck = self.deck_mut()?;
            let point = crypto::combine_shares(&deck.slots[index as usize].ciphertext, &shares)
                .ok_or(ProofError::IndexOutOfRange { index })?;
            match deck.identify(point) {
                Some(card_type) => deck.mark_revealed(index as usize, card_type),
                None => return Err(ProofError::VerificationFailed { peer_order: self_order }.into()),
            }
        }

        let mut result = [None; 52];
        let deck = self.deck.as_ref().ok_or(ProofError::NotInitialized)?;
        for (i, slot) in deck.slots.iter().enumerate() {
            result[i] = slot.revealed;
        }
        Ok(result)
    }
}

fn random_permutation(n: usize) -> Vec<usize> {
    use rand::seq::SliceRandom;
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rand::thread_rng());
    indices
}

fn encode_public_key(public: RistrettoPoint, proof: DleqProof) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(32 + 32 + 32 + 32);
    bytes.extend_from_slice(public.compress().as_bytes());
    bytes.extend_from_slice(proof.commitment1.as_bytes());
    bytes.extend_from_slice(proof.commitment2.as_bytes());
    bytes.extend_from_slice(proof.response.as_bytes());
    bytes
}

fn decode_public_key(bytes: &[u8]) -> Option<([u8; 32], DleqProof)> {
    if bytes.len() != 128 {
        return None;
    }
    let mut public = [0u8; 32];
    public.copy_from_slice(&bytes[0..32]);
    let mut commitment1 = [0u8; 32];
    commitment1.copy_from_slice(&bytes[32..64]);
    let mut commitment2 = [0u8; 32];
    commitment2.copy_from_slice(&bytes[64..96]);
    let mut response_bytes = [0u8; 32];
    response_bytes.copy_from_slice(&bytes[96..128]);
    let response = curve25519_dalek::scalar::Scalar::from_bytes_mod_order(response_bytes);
    Some((
        public,
        DleqProof {
            commitment1: curve25519_dalek::ristretto::CompressedRistretto(commitment1),
            commitment2: curve25519_dalek::ristretto::CompressedRistretto(commitment2),
            response,
        },
    ))
}

fn encode_shuffle(ciphertexts: &[crate::crypto::Ciphertext]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(ciphertexts.len() * 64);
    for ct in ciphertexts {
        bytes.extend_from_slice(&ct.to_bytes());
    }
    bytes
}

fn decode_shuffle(bytes: &[u8]) -> Option<Vec<crate::crypto::Ciphertext>> {
    if bytes.len() % 64 != 0 {
        return None;
    }
    bytes.chunks_exact(64).map(crate::crypto::Ciphertext::from_bytes).collect()
}

fn encode_reveal_share(index: u8, share: &crate::crypto::RevealShare) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(1 + 32 * 4);
    bytes.push(index);
    bytes.extend_from_slice(share.token.as_bytes());
    bytes.extend_from_slice(share.proof.commitment1.as_bytes());
    bytes.extend_from_slice(share.proof.commitment2.as_bytes());
    bytes.extend_from_slice(share.proof.response.as_bytes());
    bytes
}

fn decode_reveal_share(bytes: &[u8]) -> Option<(u8, RistrettoPoint, crate::crypto::RevealShare)> {
    if bytes.len() != 1 + 32 * 4 {
        return None;
    }
    let index = bytes[0];
    let mut token_bytes = [0u8; 32];
    token_bytes.copy_from_slice(&bytes[1..33]);
    let mut commitment1 = [0u8; 32];
    commitment1.copy_from_slice(&bytes[33..65]);
    let mut commitment2 = [0u8; 32];
    commitment2.copy_from_slice(&bytes[65..97]);
    let mut response_bytes = [0u8; 32];
    response_bytes.copy_from_slice(&bytes[97..129]);

    let token = curve25519_dalek::ristretto::CompressedRistretto(token_bytes);
    let token_point = token.decompress()?;
    let response = curve25519_dalek::scalar::Scalar::from_bytes_mod_order(response_bytes);
    let proof = DleqProof {
        commitment1: curve25519_dalek::ristretto::CompressedRistretto(commitment1),
        commitment2: curve25519_dalek::ristretto::CompressedRistretto(commitment2),
        response,
    };
    Some((index, token_point, crate::crypto::RevealShare { token, proof }))
}
