//! Wires `Authenticator` to a dedicated TCP listener: a two-step
//! hello/challenge/prove exchange per connection (spec.md §5's
//! "authenticator worker... services challenge/response on a dedicated
//! internal socket"). One connection is handled start to finish before the
//! next is accepted; this socket only ever carries a short-lived handshake,
//! never the bulk bridge traffic, so there is no need for the main loop's
//! mio-driven multiplexing here.
//!
//! `run` blocks and is meant to be spawned on its own thread; per spec.md
//! §5 ("Blocking I/O on worker thread must block SIGINT and SIGTERM") the
//! caller is expected to have masked those signals on the spawning thread
//! before calling `std::thread::spawn`, so the mask is inherited here.

use crate::challenge::Authenticator;
use crate::error::AuthError;
use bridgeutil::crypto::PUBLIC_KEY_SIZE;
use bridgeutil::logging::warn;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use messaging::message::Message;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs the accept loop until `terminate` is set.
pub fn run(mut authenticator: Authenticator, listener: TcpListener, terminate: Arc<AtomicBool>) {
    listener.set_nonblocking(true).ok();

    while !terminate.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, _addr)) => {
                stream.set_nonblocking(false).ok();
                if let Err(err) = handle_connection(&mut authenticator, stream) {
                    warn!(authenticator.log(), "authenticator handshake failed"; "reason" => err.to_string());
                }
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(_) => std::thread::sleep(POLL_INTERVAL),
        }
    }
}

fn handle_connection(authenticator: &mut Authenticator, mut stream: TcpStream) -> Result<(), AuthError> {
    let hello = read_message(&mut stream).map_err(|_| AuthError::Malformed("truncated hello".into()))?;
    if hello.frame(0) != Some(&b"hello"[..]) {
        return Err(AuthError::Malformed("expected hello".into()));
    }
    let public_key_bytes = hello.frame(1).ok_or_else(|| AuthError::Malformed("missing public key".into()))?;
    if public_key_bytes.len() != PUBLIC_KEY_SIZE {
        return Err(AuthError::Malformed("public key must be 32 bytes".into()));
    }
    let mut public_key = [0u8; PUBLIC_KEY_SIZE];
    public_key.copy_from_slice(public_key_bytes);

    let (challenge_id, sealed) = authenticator.begin_challenge(public_key);

    let mut challenge_reply = Message::new();
    challenge_reply.push(b"challenge".to_vec());
    challenge_reply.push(challenge_id.to_be_bytes().to_vec());
    challenge_reply.push(sealed);
    write_message(&mut stream, &challenge_reply).map_err(|_| AuthError::Malformed("write failed".into()))?;

    let prove = read_message(&mut stream).map_err(|_| AuthError::Malformed("truncated prove".into()))?;
    if prove.frame(0) != Some(&b"prove"[..]) {
        return Err(AuthError::Malformed("expected prove".into()));
    }

    let frames = prove.frames();
    if frames.len() != 6 {
        return Err(AuthError::Malformed("prove takes 5 parameters".into()));
    }

    let challenge_id = (&frames[1][..])
        .read_u64::<BigEndian>()
        .map_err(|_| AuthError::Malformed("challenge id must be 8 bytes".into()))?;
    let nonce = &frames[2];
    let node = String::from_utf8(frames[3].clone()).map_err(|_| AuthError::Malformed("node name not utf8".into()))?;
    let server_key = fixed_32(&frames[4])?;
    let client_key = fixed_32(&frames[5])?;

    let result = authenticator.complete_challenge(
        challenge_id,
        nonce,
        &node,
        bridgeutil::VERSION_ID,
        bridgeutil::PROTOCOL_ID,
        server_key,
        client_key,
    );

    let reply = match result {
        Ok((user_id, token)) => {
            let mut message = Message::new();
            message.push(b"ok".to_vec());
            message.push(user_id.into_bytes());
            message.push(token);
            message
        }
        Err(err) => {
            let mut message = Message::new();
            message.push(b"error".to_vec());
            message.push(err.to_string().into_bytes());
            message
        }
    };

    write_message(&mut stream, &reply).map_err(|_| AuthError::Malformed("write failed".into()))
}

fn fixed_32(bytes: &[u8]) -> Result<[u8; 32], AuthError> {
    if bytes.len() != 32 {
        return Err(AuthError::Malformed("expected a 32-byte key".into()));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(bytes);
    Ok(out)
}

fn read_message(stream: &mut TcpStream) -> io::Result<Message> {
    let len = stream.read_u32::<BigEndian>()?;
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf)?;
    Message::decode(&buf).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "malformed authenticator message"))
}

fn write_message(stream: &mut TcpStream, message: &Message) -> io::Result<()> {
    let bytes = message
        .encode()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "authenticator message too large"))?;
    stream.write_u32::<BigEndian>(bytes.len() as u32)?;
    stream.write_all(&bytes)?;
    Ok(())
}

/// Client-side half of the handshake, used by the connecting peer (and by
/// tests) to drive the exchange `run` services.
pub fn authenticate(
    stream: &mut TcpStream,
    public_key: [u8; PUBLIC_KEY_SIZE],
    secret_key: &[u8; bridgeutil::crypto::SECRET_KEY_SIZE],
    node: &str,
    server_key: [u8; 32],
    client_key: [u8; 32],
) -> Result<(String, Vec<u8>), AuthError> {
    let mut hello = Message::new();
    hello.push(b"hello".to_vec());
    hello.push(public_key.to_vec());
    write_message(stream, &hello).map_err(|_| AuthError::Malformed("write failed".into()))?;

    let challenge = read_message(stream).map_err(|_| AuthError::Malformed("truncated challenge".into()))?;
    if challenge.frame(0) != Some(&b"challenge"[..]) {
        return Err(AuthError::Malformed("expected challenge".into()));
    }
    let challenge_id_bytes = challenge.frame(1).ok_or_else(|| AuthError::Malformed("missing challenge id".into()))?;
    let sealed = challenge.frame(2).ok_or_else(|| AuthError::Malformed("missing sealed nonce".into()))?;

    let nonce = bridgeutil::crypto::open_sealed(sealed, &public_key, secret_key)
        .ok_or(AuthError::ChallengeFailed)?;

    let mut prove = Message::new();
    prove.push(b"prove".to_vec());
    prove.push(challenge_id_bytes.to_vec());
    prove.push(nonce);
    prove.push(node.as_bytes().to_vec());
    prove.push(server_key.to_vec());
    prove.push(client_key.to_vec());
    write_message(stream, &prove).map_err(|_| AuthError::Malformed("write failed".into()))?;

    let reply = read_message(stream).map_err(|_| AuthError::Malformed("truncated reply".into()))?;
    match reply.frame(0) {
        Some(b"ok") => {
            let user_id = reply
                .frame(1)
                .and_then(|bytes| String::from_utf8(bytes.to_vec()).ok())
                .ok_or_else(|| AuthError::Malformed("missing user id".into()))?;
            let token = reply.frame(2).ok_or_else(|| AuthError::Malformed("missing token".into()))?.to_vec();
            Ok((user_id, token))
        }
        _ => Err(AuthError::ChallengeFailed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::UserRegistry;
    use bridgeutil::crypto;
    use bridgeutil::logging;
    use std::collections::HashMap;

    #[test]
    fn full_handshake_over_a_real_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let keypair = crypto::generate_keypair();
        let mut node_secrets = HashMap::new();
        node_secrets.insert("north".to_string(), [3u8; crypto::KEY_SIZE]);

        let authenticator = Authenticator::new(node_secrets, UserRegistry::new(), logging::init::<&str>(None));
        let terminate = Arc::new(AtomicBool::new(false));
        let server_terminate = terminate.clone();

        let handle = std::thread::spawn(move || run(authenticator, listener, server_terminate));

        let mut client = TcpStream::connect(addr).unwrap();
        let (user_id, token) = authenticate(
            &mut client,
            keypair.public_key,
            &keypair.secret_key,
            "north",
            [1u8; 32],
            [2u8; 32],
        )
        .unwrap();

        assert!(!user_id.is_empty());
        assert!(!token.is_empty());

        terminate.store(true, Ordering::Relaxed);
        // unblock the accept loop's next poll by connecting once more.
        TcpStream::connect(addr).ok();
        handle.join().unwrap();
    }
}
