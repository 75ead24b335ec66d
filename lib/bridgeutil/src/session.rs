//! Connection tokens handed out by the authenticator and consumed by a
//! node's socket layer during the handshake. Mirrors the teacher's
//! server/user session split: a `SessionKey` is shared between a node and
//! its authenticator; `PrivateData` is the payload a node decrypts out of a
//! client-presented token to learn who it is talking to.

/// Shared infrastructure pertaining to the authenticator-to-node session: the
/// key the authenticator uses to encrypt tokens that only the owning node can
/// open.
pub mod server {
    use crate::encoding::base64;
    use serde::{de, Deserialize, Deserializer};
    use serde_derive::{Deserialize, Serialize};
    use std::ops::{Deref, DerefMut};

    const SESSION_KEY_SIZE: usize = 32;

    #[derive(Serialize, Deserialize, Clone)]
    pub struct SessionKey(
        #[serde(
            serialize_with = "base64::serialize",
            deserialize_with = "deserialize_b64_key"
        )]
        [u8; SESSION_KEY_SIZE],
    );

    #[inline]
    fn deserialize_b64_key<'de, D>(deserializer: D) -> Result<[u8; SESSION_KEY_SIZE], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <&str>::deserialize(deserializer)?;
        let decoded = base64::decode_str(s).map_err(de::Error::custom)?;

        if decoded.len() != SESSION_KEY_SIZE {
            return Err(de::Error::custom("session key must be 32 bytes"));
        }

        let mut fixed = [0u8; SESSION_KEY_SIZE];
        fixed.copy_from_slice(&decoded);
        Ok(fixed)
    }

    impl SessionKey {
        pub const SIZE: usize = SESSION_KEY_SIZE;

        #[inline]
        pub fn new(key: [u8; Self::SIZE]) -> SessionKey {
            SessionKey(key)
        }
    }

    impl Deref for SessionKey {
        type Target = [u8; SessionKey::SIZE];

        #[inline]
        fn deref(&self) -> &[u8; SessionKey::SIZE] {
            &self.0
        }
    }

    impl DerefMut for SessionKey {
        #[inline]
        fn deref_mut(&mut self) -> &mut [u8; SessionKey::SIZE] {
            &mut self.0
        }
    }
}

/// Shared infrastructure pertaining to a user session: the private data
/// carried inside a connection token, visible only to the node that decrypts
/// it.
pub mod user {
    use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
    use std::io::{Error, Read, Write};

    /// Private data part (visible only to the server) of the connection token.
    /// `user_id` is transmitted as a UTF-8 length-prefixed string so it can
    /// carry an arbitrary application-assigned principal name.
    pub struct PrivateData {
        pub user_id: String,
        pub server_key: [u8; 32],
        pub client_key: [u8; 32],
    }

    impl PrivateData {
        /// Parse the supplied stream as a private data structure.
        pub fn read<R: Read>(mut stream: R) -> Result<PrivateData, Error> {
            let user_id_len = stream.read_u16::<BigEndian>()? as usize;
            let mut user_id_bytes = vec![0u8; user_id_len];
            stream.read_exact(&mut user_id_bytes)?;
            let user_id = String::from_utf8(user_id_bytes)
                .map_err(|e| Error::new(std::io::ErrorKind::InvalidData, e))?;

            let mut server_key = [0u8; 32];
            let mut client_key = [0u8; 32];
            stream.read_exact(&mut server_key)?;
            stream.read_exact(&mut client_key)?;

            Ok(PrivateData {
                user_id,
                server_key,
                client_key,
            })
        }

        /// Write the private data to the supplied stream.
        pub fn write<W: Write>(&self, mut stream: W) -> Result<(), Error> {
            let user_id_bytes = self.user_id.as_bytes();
            stream.write_u16::<BigEndian>(user_id_bytes.len() as u16)?;
            stream.write_all(user_id_bytes)?;
            stream.write_all(&self.client_key)?;
            stream.write_all(&self.server_key)
        }

        /// Size of the encoded form for a given user id length.
        #[inline]
        pub fn encoded_size(user_id: &str) -> usize {
            2 + user_id.len() + 32 + 32
        }

        /// Construct the additional encryption data.
        pub fn additional_data(version: &[u8], protocol: u16, expires: u64) -> Result<Vec<u8>, Error> {
            let mut additional_data = Vec::with_capacity(version.len() + 10);
            additional_data.extend_from_slice(version);
            additional_data.write_u16::<BigEndian>(protocol)?;
            additional_data.write_u64::<BigEndian>(expires)?;
            Ok(additional_data)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn private_data_round_trips() {
            let data = PrivateData {
                user_id: "alice".into(),
                server_key: [1u8; 32],
                client_key: [2u8; 32],
            };

            let mut buf = Vec::new();
            data.write(&mut buf).unwrap();
            assert_eq!(buf.len(), PrivateData::encoded_size("alice"));

            let back = PrivateData::read(&buf[..]).unwrap();
            assert_eq!(back.user_id, data.user_id);
            assert_eq!(back.server_key, data.server_key);
            assert_eq!(back.client_key, data.client_key);
        }
    }
}
