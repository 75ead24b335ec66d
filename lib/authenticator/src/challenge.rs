//! Validates a connecting peer's declared public key by challenge/response,
//! then mints a connection token for the destination node it wants to
//! reach (spec.md §4 "Authenticator": "validate connections via challenge
//! keys; map public keys to stable user IDs"). Runs as the background
//! "authenticator worker" thread of spec.md §5; `worker::run` wires this
//! core logic to the dedicated internal socket it listens on.
//!
//! The proof step relies entirely on `bridgeutil::crypto::seal`: a nonce
//! sealed under the peer's claimed public key can only be opened by the
//! holder of the matching secret key, so echoing it back is proof of
//! possession without a second cryptographic primitive.

use crate::error::AuthError;
use crate::registry::UserRegistry;
use bridgeutil::crypto::{self, PUBLIC_KEY_SIZE};
use bridgeutil::logging::{debug, info, Logger};
use bridgeutil::UserId;
use messaging::channel::Channel;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A pending challenge is forgotten (and any late response rejected) after
/// this long.
pub const CHALLENGE_TIMEOUT: Duration = Duration::from_secs(10);
const NONCE_SIZE: usize = 32;

struct Pending {
    public_key: [u8; PUBLIC_KEY_SIZE],
    nonce: [u8; NONCE_SIZE],
    issued: Instant,
}

/// Validates peer identity and mints connection tokens. One instance
/// typically backs one node's authenticator worker thread; `node_secrets`
/// holds the symmetric key shared with every destination node this
/// authenticator is trusted to vouch for (itself included, for loopback
/// connections).
pub struct Authenticator {
    node_secrets: HashMap<String, [u8; crypto::KEY_SIZE]>,
    registry: UserRegistry,
    pending: HashMap<u64, Pending>,
    next_challenge_id: u64,
    log: Logger,
}

impl Authenticator {
    pub fn new(
        node_secrets: HashMap<String, [u8; crypto::KEY_SIZE]>,
        registry: UserRegistry,
        log: Logger,
    ) -> Authenticator {
        Authenticator {
            node_secrets,
            registry,
            pending: HashMap::new(),
            next_challenge_id: 0,
            log,
        }
    }

    pub fn registry(&self) -> &UserRegistry {
        &self.registry
    }

    pub fn log(&self) -> &Logger {
        &self.log
    }

    /// Step 1: a peer declares `public_key`. Returns a challenge id and a
    /// nonce sealed under that key; the caller is expected to forward the
    /// sealed nonce to the peer and collect its response via
    /// `complete_challenge`.
    pub fn begin_challenge(&mut self, public_key: [u8; PUBLIC_KEY_SIZE]) -> (u64, Vec<u8>) {
        self.sweep_expired();

        let mut nonce = [0u8; NONCE_SIZE];
        crypto::random_bytes(&mut nonce);

        let challenge_id = self.next_challenge_id;
        self.next_challenge_id += 1;

        let sealed = crypto::seal(&nonce, &public_key);
        self.pending.insert(challenge_id, Pending { public_key, nonce, issued: Instant::now() });

        debug!(self.log, "authenticator challenge issued"; "challenge_id" => challenge_id);

        (challenge_id, sealed)
    }

    /// Step 2: the peer echoes back the nonce it recovered from the sealed
    /// challenge. On a match, resolves (creating if unseen) the stable user
    /// id for the claimed public key and mints a connection token addressed
    /// at `node`, encrypted under the secret key this authenticator shares
    /// with it.
    #[allow(clippy::too_many_arguments)]
    pub fn complete_challenge(
        &mut self,
        challenge_id: u64,
        response_nonce: &[u8],
        node: &str,
        version: [u8; 16],
        protocol: u16,
        server_key: [u8; crypto::KEY_SIZE],
        client_key: [u8; crypto::KEY_SIZE],
    ) -> Result<(UserId, Vec<u8>), AuthError> {
        let pending = self.pending.remove(&challenge_id).ok_or(AuthError::NoSuchChallenge)?;

        if pending.issued.elapsed() > CHALLENGE_TIMEOUT || response_nonce != &pending.nonce[..] {
            return Err(AuthError::ChallengeFailed);
        }

        let secret_key = self
            .node_secrets
            .get(node)
            .ok_or_else(|| AuthError::UnknownNode(node.to_string()))?;

        let user_id = self.registry.resolve(&pending.public_key);

        let token = Channel::encode_connection_token(secret_key, version, protocol, &user_id, server_key, client_key)
            .map_err(|_| AuthError::Malformed("token encryption failed".into()))?;

        info!(
            self.log,
            "authenticator issued connection token";
            "node" => node,
            "user_id" => &user_id
        );

        Ok((user_id, token))
    }

    fn sweep_expired(&mut self) {
        let now = Instant::now();
        self.pending.retain(|_, pending| now.duration_since(pending.issued) <= CHALLENGE_TIMEOUT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridgeutil::logging;

    fn log() -> Logger {
        logging::init::<&str>(None)
    }

    #[test]
    fn matching_response_resolves_a_user_id_and_mints_a_token() {
        let keypair = crypto::generate_keypair();
        let mut node_secrets = HashMap::new();
        node_secrets.insert("north".to_string(), [5u8; crypto::KEY_SIZE]);

        let mut auth = Authenticator::new(node_secrets, UserRegistry::new(), log());

        let (challenge_id, sealed) = auth.begin_challenge(keypair.public_key);
        let nonce = crypto::open_sealed(&sealed, &keypair.public_key, &keypair.secret_key).unwrap();

        let (user_id, token) = auth
            .complete_challenge(challenge_id, &nonce, "north", [0u8; 16], 1, [1u8; 32], [2u8; 32])
            .unwrap();

        assert!(!user_id.is_empty());
        assert!(!token.is_empty());

        // the same public key always resolves to the same user id.
        let (challenge_id2, sealed2) = auth.begin_challenge(keypair.public_key);
        let nonce2 = crypto::open_sealed(&sealed2, &keypair.public_key, &keypair.secret_key).unwrap();
        let (user_id2, _) = auth
            .complete_challenge(challenge_id2, &nonce2, "north", [0u8; 16], 1, [1u8; 32], [2u8; 32])
            .unwrap();
        assert_eq!(user_id, user_id2);
    }

    #[test]
    fn wrong_nonce_is_rejected() {
        let keypair = crypto::generate_keypair();
        let mut auth = Authenticator::new(HashMap::new(), UserRegistry::new(), log());
        let (challenge_id, _) = auth.begin_challenge(keypair.public_key);

        let result = auth.complete_challenge(challenge_id, &[0u8; NONCE_SIZE], "north", [0u8; 16], 1, [1u8; 32], [2u8; 32]);
        assert_eq!(result.unwrap_err(), AuthError::ChallengeFailed);
    }

    #[test]
    fn unconfigured_node_is_rejected() {
        let keypair = crypto::generate_keypair();
        let mut auth = Authenticator::new(HashMap::new(), UserRegistry::new(), log());
        let (challenge_id, sealed) = auth.begin_challenge(keypair.public_key);
        let nonce = crypto::open_sealed(&sealed, &keypair.public_key, &keypair.secret_key).unwrap();

        let result = auth.complete_challenge(challenge_id, &nonce, "nowhere", [0u8; 16], 1, [1u8; 32], [2u8; 32]);
        assert_eq!(result.unwrap_err(), AuthError::UnknownNode("nowhere".to_string()));
    }

    #[test]
    fn unknown_challenge_id_is_rejected() {
        let mut auth = Authenticator::new(HashMap::new(), UserRegistry::new(), log());
        let result = auth.complete_challenge(42, &[0u8; NONCE_SIZE], "north", [0u8; 16], 1, [1u8; 32], [2u8; 32]);
        assert_eq!(result.unwrap_err(), AuthError::NoSuchChallenge);
    }
}
