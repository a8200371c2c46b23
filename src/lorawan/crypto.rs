//! FRMPayload encryption.
//!
//! LoRaWAN encrypts application payloads with an AES-128 keystream built from
//! `A` blocks. The operation is its own inverse, so the same call encrypts and
//! decrypts; only the direction byte differs between uplink and downlink.

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use thiserror::Error;

use super::{AesKey, DevAddr};

const BLOCK_SIZE: usize = 16;

/// Frame direction, part of the keystream block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Device to network
    Uplink = 0,
    /// Network to device
    Downlink = 1,
}

/// Errors from payload encryption.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The payload needs more keystream blocks than the one-byte block counter allows.
    #[error("payload of {0} bytes is too long to encrypt")]
    TooLong(usize),
}

/// XOR `payload` with the FRMPayload keystream.
///
/// The block counter starts at 1. The device address goes into the block in
/// little-endian order, the frame counter likewise.
pub fn encrypt_frm_payload(
    key: &AesKey,
    direction: Direction,
    dev_addr: DevAddr,
    f_cnt: u32,
    payload: &[u8],
) -> Result<Vec<u8>, PayloadError> {
    let blocks = payload.len().div_ceil(BLOCK_SIZE);
    if blocks > usize::from(u8::MAX) {
        return Err(PayloadError::TooLong(payload.len()));
    }

    let cipher = Aes128::new(key.as_bytes().into());
    let mut addr_le = dev_addr.0;
    addr_le.reverse();

    let mut out = Vec::with_capacity(payload.len());
    for (i, chunk) in payload.chunks(BLOCK_SIZE).enumerate() {
        let mut a = [0u8; BLOCK_SIZE];
        a[0] = 0x01;
        a[5] = direction as u8;
        a[6..10].copy_from_slice(&addr_le);
        a[10..14].copy_from_slice(&f_cnt.to_le_bytes());
        a[15] = (i + 1) as u8;

        cipher.encrypt_block((&mut a).into());
        out.extend(chunk.iter().zip(a.iter()).map(|(p, s)| p ^ s));
    }
    Ok(out)
}
