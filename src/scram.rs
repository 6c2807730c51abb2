//! SCRAM-SHA-256 SASL authentication.
//!
//! <https://www.rfc-editor.org/rfc/rfc7677>, <https://www.rfc-editor.org/rfc/rfc5802>
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::common::unit_error;

type HmacSha256 = Hmac<Sha256>;

const MECHANISM: &str = "SCRAM-SHA-256";
const GS2_HEADER: &str = "n,,";

unit_error! {
    /// SCRAM authentication failed: server is not trustworthy, or rejected our credentials.
    pub struct AuthError("SCRAM authentication failed");
}

/// Escape a SASL name per RFC 5802 §5.1: `=` -> `=3D`, `,` -> `=2C`.
fn saslname(s: &str) -> String {
    s.replace('=', "=3D").replace(',', "=2C")
}

fn b64_encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn b64_decode(s: &str) -> Result<Vec<u8>, AuthError> {
    base64::engine::general_purpose::STANDARD.decode(s).map_err(|_| AuthError)
}

fn hmac(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn xor(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = a[i] ^ b[i];
    }
    out
}

/// Salted Hi(password, salt, iterations), PBKDF2-HMAC-SHA256.
fn hi(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut salt_block = Vec::with_capacity(salt.len() + 4);
    salt_block.extend_from_slice(salt);
    salt_block.extend_from_slice(&1u32.to_be_bytes());

    let mut u = hmac(password, &salt_block);
    let mut result = u;

    for _ in 1..iterations {
        u = hmac(password, &u);
        result = xor(&result, &u);
    }

    result
}

/// Pick the mechanism to use from the server-advertised list.
///
/// SCRAM-SHA-256-PLUS (channel binding) is deliberately never selected,
/// even when offered alongside plain SCRAM-SHA-256.
pub fn select_mechanism<'a>(mechanisms: impl IntoIterator<Item = &'a str>) -> Option<&'static str> {
    mechanisms.into_iter().any(|m| m == MECHANISM).then_some(MECHANISM)
}

/// The exchange, started with [`Scram::client_first`] and driven forward
/// by the two server responses.
pub struct Scram {
    username_escaped: String,
    client_nonce: String,
    client_first_bare: String,
}

/// Returned from [`Scram::client_first`]: the message to send and the
/// state to carry into the next step.
pub struct ClientFirst {
    pub message: Vec<u8>,
    pub state: Scram,
}

/// Returned from [`Scram::server_first`]: the message to send and the
/// state to carry into the final verification step.
pub struct ClientFinal {
    pub message: Vec<u8>,
    pub state: ScramVerify,
}

/// State carried from the `client-final` message to server signature verification.
pub struct ScramVerify {
    salted_password: [u8; 32],
    auth_message: String,
}

impl Scram {
    /// Begin the exchange: `client-first-message`.
    pub fn client_first(username: &str) -> ClientFirst {
        let mut nonce_bytes = [0u8; 24];
        rand::rng().fill_bytes(&mut nonce_bytes);
        Self::client_first_with_nonce(username, &b64_encode(&nonce_bytes))
    }

    fn client_first_with_nonce(username: &str, client_nonce: &str) -> ClientFirst {
        let username_escaped = saslname(username);
        let client_first_bare = format!("n={username_escaped},r={client_nonce}");
        let message = format!("{GS2_HEADER}{client_first_bare}").into_bytes();

        ClientFirst {
            message,
            state: Scram {
                username_escaped,
                client_nonce: client_nonce.to_owned(),
                client_first_bare,
            },
        }
    }

    /// Consume `server-first-message` (the `SASLContinue` payload),
    /// producing `client-final-message`.
    pub fn server_first(self, data: &[u8], password: &str) -> Result<ClientFinal, AuthError> {
        let server_first = std::str::from_utf8(data).map_err(|_| AuthError)?;

        let mut server_nonce = None;
        let mut salt = None;
        let mut iterations = None;

        for part in server_first.split(',') {
            let (key, value) = part.split_once('=').ok_or(AuthError)?;
            match key {
                "r" => server_nonce = Some(value),
                "s" => salt = Some(value),
                "i" => iterations = value.parse::<u32>().ok(),
                _ => {}
            }
        }

        let server_nonce = server_nonce.ok_or(AuthError)?;
        let salt = b64_decode(salt.ok_or(AuthError)?)?;
        let iterations = iterations.ok_or(AuthError)?;

        if !server_nonce.starts_with(&self.client_nonce) {
            return Err(AuthError);
        }

        let salted_password = hi(password.as_bytes(), &salt, iterations);
        let client_key = hmac(&salted_password, b"Client Key");
        let stored_key = sha256(&client_key);

        let channel_binding = format!("c={}", b64_encode(GS2_HEADER.as_bytes()));
        let client_final_without_proof = format!("{channel_binding},r={server_nonce}");

        let auth_message =
            format!("{},{server_first},{client_final_without_proof}", self.client_first_bare);

        let client_signature = hmac(&stored_key, auth_message.as_bytes());
        let client_proof = xor(&client_key, &client_signature);

        let message =
            format!("{client_final_without_proof},p={}", b64_encode(&client_proof)).into_bytes();

        Ok(ClientFinal {
            message,
            state: ScramVerify { salted_password, auth_message },
        })
    }
}

impl ScramVerify {
    /// Consume `server-final-message` (the `SASLFinal` payload) and verify
    /// the server's signature.
    pub fn server_final(self, data: &[u8]) -> Result<(), AuthError> {
        let server_final = std::str::from_utf8(data).map_err(|_| AuthError)?;

        if server_final.starts_with("e=") {
            return Err(AuthError);
        }

        let signature_b64 = server_final.strip_prefix("v=").ok_or(AuthError)?;
        let expected = b64_decode(signature_b64)?;

        let server_key = hmac(&self.salted_password, b"Server Key");
        let server_signature = hmac(&server_key, self.auth_message.as_bytes());

        if server_signature[..] == expected[..] {
            Ok(())
        } else {
            Err(AuthError)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fixed-nonce reproduction of the worked example used across the
    /// PostgreSQL/libpq test suites.
    #[test]
    fn scram_sha256_reference_vector() {
        let ClientFirst { state, .. } =
            Scram::client_first_with_nonce("user", "rOprNGfwEbeRWgbNEkqO");

        let server_first =
            b"r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";

        let ClientFinal { message, state } = state.server_first(server_first, "pencil").unwrap();

        let message = std::str::from_utf8(&message).unwrap();
        let proof = message.rsplit_once("p=").unwrap().1;
        assert_eq!(proof, "dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ=");

        let server_final =
            b"v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=";
        state.server_final(server_final).unwrap();
    }

    #[test]
    fn server_final_rejects_bad_signature() {
        let ClientFirst { state, .. } =
            Scram::client_first_with_nonce("user", "rOprNGfwEbeRWgbNEkqO");
        let server_first =
            b"r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
        let ClientFinal { state, .. } = state.server_first(server_first, "pencil").unwrap();

        let bogus = b64_encode(&[0u8; 32]);
        assert!(state.server_final(format!("v={bogus}").as_bytes()).is_err());
    }

    #[test]
    fn select_mechanism_never_picks_plus() {
        let chosen = select_mechanism(["SCRAM-SHA-256-PLUS", "SCRAM-SHA-256"]);
        assert_eq!(chosen, Some("SCRAM-SHA-256"));
    }

    #[test]
    fn saslname_escapes_reserved_chars() {
        assert_eq!(saslname("a=b,c"), "a=3Db=2Cc");
    }
}
