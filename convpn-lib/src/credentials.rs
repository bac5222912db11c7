//! At-rest obfuscation of the OpenVPN username/password pair.
//!
//! This is deliberately not strong cryptography: the key is derived from
//! `/etc/machine-id`, which is readable by anyone who can already read the
//! config file it protects. It raises the bar against casual disclosure
//! (pasting a config file, a backup tool scooping up plaintext) without
//! claiming to resist a determined local attacker.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::io;

const MACHINE_ID_PATH: &str = "/etc/machine-id";

#[derive(Debug, Error)]
pub enum Error {
    #[error("unable to read machine id at `{MACHINE_ID_PATH}`: {0}")]
    MachineId(#[from] io::Error),
    #[error("stored credentials are not valid hex")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("decoded credentials are not valid UTF-8")]
    InvalidUtf8,
    #[error("credentials must be formatted as `username\\npassword`")]
    MissingPassword,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncryptedCredentials {
    hex: String,
}

pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn encrypt(&self) -> Result<EncryptedCredentials, Error> {
        let key = machine_key()?;
        let plain = format!("{}\n{}", self.username, self.password);
        let xored: Vec<u8> = plain.bytes().zip(key.iter().cycle()).map(|(b, k)| b ^ k).collect();
        Ok(EncryptedCredentials { hex: hex::encode(xored) })
    }
}

impl EncryptedCredentials {
    pub fn decrypt(&self) -> Result<Credentials, Error> {
        let key = machine_key()?;
        let bytes = hex::decode(&self.hex)?;
        let xored: Vec<u8> = bytes.iter().zip(key.iter().cycle()).map(|(b, k)| b ^ k).collect();
        let plain = String::from_utf8(xored).map_err(|_| Error::InvalidUtf8)?;
        let (username, password) = plain.split_once('\n').ok_or(Error::MissingPassword)?;
        Ok(Credentials { username: username.to_string(), password: password.to_string() })
    }
}

fn machine_key() -> Result<Vec<u8>, Error> {
    let id = std::fs::read_to_string(MACHINE_ID_PATH)?;
    Ok(id.trim().bytes().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Credentials {
        Credentials { username: "vpnuser".into(), password: "hunter2".into() }
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let creds = sample();
        let encrypted = creds.encrypt().expect("encrypt");
        let decrypted = encrypted.decrypt().expect("decrypt");
        assert_eq!(decrypted.username, "vpnuser");
        assert_eq!(decrypted.password, "hunter2");
    }

    #[test]
    fn encrypted_form_is_not_plaintext() {
        let creds = sample();
        let encrypted = creds.encrypt().expect("encrypt");
        assert!(!encrypted.hex.contains("hunter2"));
    }

    #[test]
    fn garbage_hex_fails_to_decode() {
        let bogus = EncryptedCredentials { hex: "not hex".into() };
        assert!(bogus.decrypt().is_err());
    }
}
