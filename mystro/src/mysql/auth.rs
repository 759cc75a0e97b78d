//! Authentication plugins.
//!
//! The supported plugin set is closed: a plugin the server requests that is
//! not listed here fails the handshake instead of degrading silently.
use std::fmt;

/// Authentication plugin negotiated during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPlugin {
    /// `mysql_native_password`, SHA1 challenge response.
    NativePassword,
    /// `caching_sha2_password`, SHA256 challenge response with a cached fast
    /// path on the server.
    CachingSha2,
    /// `mysql_clear_password`, only ever sent over TLS.
    ClearPassword,
}

impl AuthPlugin {
    pub fn from_name(name: &str) -> Result<Self, UnsupportedAuth> {
        match name {
            "mysql_native_password" => Ok(Self::NativePassword),
            "caching_sha2_password" => Ok(Self::CachingSha2),
            "mysql_clear_password" => Ok(Self::ClearPassword),
            _ => Err(UnsupportedAuth::Plugin(name.into())),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::NativePassword => "mysql_native_password",
            Self::CachingSha2 => "caching_sha2_password",
            Self::ClearPassword => "mysql_clear_password",
        }
    }

    /// Compute the auth response for the server challenge `nonce`.
    ///
    /// `secure` is `true` once the stream is TLS wrapped, plugins that would
    /// leak the password on a plain link refuse to answer.
    pub(crate) fn auth_response(
        self,
        password: &str,
        nonce: &[u8],
        secure: bool,
    ) -> Result<Vec<u8>, UnsupportedAuth> {
        match self {
            Self::NativePassword => Ok(native_scramble(password, nonce)),
            Self::CachingSha2 => Ok(caching_sha2_scramble(password, nonce)),
            Self::ClearPassword => {
                if !secure {
                    return Err(UnsupportedAuth::ClearPasswordInsecure);
                }
                let mut out = Vec::with_capacity(password.len() + 1);
                out.extend_from_slice(password.as_bytes());
                out.push(0);
                Ok(out)
            },
        }
    }
}

fn sha1(data: &[u8]) -> [u8; 20] {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn sha256(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// `SHA1(password) XOR SHA1(nonce + SHA1(SHA1(password)))`
pub(crate) fn native_scramble(password: &str, nonce: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let password_hash = sha1(password.as_bytes());
    let double_hash = sha1(&password_hash);

    let mut combined = Vec::with_capacity(nonce.len() + 20);
    combined.extend_from_slice(nonce);
    combined.extend_from_slice(&double_hash);
    let challenge_hash = sha1(&combined);

    password_hash
        .iter()
        .zip(challenge_hash.iter())
        .map(|(a, b)| a ^ b)
        .collect()
}

/// `SHA256(password) XOR SHA256(SHA256(SHA256(password)) + nonce)`
pub(crate) fn caching_sha2_scramble(password: &str, nonce: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let password_hash = sha256(password.as_bytes());
    let double_hash = sha256(&password_hash);

    let mut combined = Vec::with_capacity(32 + nonce.len());
    combined.extend_from_slice(&double_hash);
    combined.extend_from_slice(nonce);
    let challenge_hash = sha256(&combined);

    password_hash
        .iter()
        .zip(challenge_hash.iter())
        .map(|(a, b)| a ^ b)
        .collect()
}

/// An authentication method the client refuses to perform.
pub enum UnsupportedAuth {
    /// Server requested a plugin outside the supported set.
    Plugin(Box<str>),
    /// `mysql_clear_password` on an unencrypted stream.
    ClearPasswordInsecure,
    /// `caching_sha2_password` full authentication on an unencrypted stream.
    FullAuthInsecure,
}

impl std::error::Error for UnsupportedAuth { }

impl fmt::Display for UnsupportedAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plugin(name) => write!(f, "unsupported authentication plugin `{name}`"),
            Self::ClearPasswordInsecure => {
                f.write_str("mysql_clear_password requires a TLS connection")
            },
            Self::FullAuthInsecure => {
                f.write_str("caching_sha2_password full authentication requires a TLS connection")
            },
        }
    }
}

impl fmt::Debug for UnsupportedAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
        a.iter().zip(b).map(|(x, y)| x ^ y).collect()
    }

    // Replays the server side verification: the scramble XORed with the
    // challenge hash must recover SHA1(password), whose hash matches the
    // stored SHA1(SHA1(password)).
    #[test]
    fn native_scramble_verifies() {
        let password = "s3cret";
        let nonce: Vec<u8> = (0u8..20).collect();

        let reply = native_scramble(password, &nonce);
        assert_eq!(reply.len(), 20);

        let stored = sha1(&sha1(password.as_bytes()));
        let mut combined = nonce.clone();
        combined.extend_from_slice(&stored);
        let stage1 = xor(&reply, &sha1(&combined));

        assert_eq!(sha1(&stage1), stored);
    }

    #[test]
    fn caching_sha2_scramble_verifies() {
        let password = "s3cret";
        let nonce: Vec<u8> = (0u8..20).collect();

        let reply = caching_sha2_scramble(password, &nonce);
        assert_eq!(reply.len(), 32);

        let stored = sha256(&sha256(password.as_bytes()));
        let mut combined = stored.to_vec();
        combined.extend_from_slice(&nonce);
        let stage1 = xor(&reply, &sha256(&combined));

        assert_eq!(sha256(&stage1), stored);
    }

    #[test]
    fn empty_password_is_empty_response() {
        assert!(native_scramble("", b"12345678").is_empty());
        assert!(caching_sha2_scramble("", b"12345678").is_empty());
    }

    #[test]
    fn clear_password_requires_tls() {
        let err = AuthPlugin::ClearPassword.auth_response("pw", b"", false);
        assert!(matches!(err, Err(UnsupportedAuth::ClearPasswordInsecure)));

        let ok = AuthPlugin::ClearPassword.auth_response("pw", b"", true).unwrap();
        assert_eq!(ok, b"pw\0");
    }

    #[test]
    fn unknown_plugin_is_rejected() {
        assert!(AuthPlugin::from_name("dialog").is_err());
        assert_eq!(
            AuthPlugin::from_name("mysql_native_password").unwrap(),
            AuthPlugin::NativePassword,
        );
    }
}
