//! AES helpers for the standard security handler.

use crate::error::{PdfError, Result};
use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit};
use cbc::{Decryptor, Encryptor};

type Aes128CbcDec = Decryptor<aes::Aes128>;
type Aes256CbcDec = Decryptor<aes::Aes256>;
type Aes128CbcEnc = Encryptor<aes::Aes128>;
type Aes256CbcEnc = Encryptor<aes::Aes256>;

fn key_error(len: usize) -> PdfError {
    PdfError::EncryptionError(format!("AES key must be 16 or 32 bytes, got {len}"))
}

/// AES-CBC decrypt without padding removal. Key is 16 or 32 bytes.
pub fn aes_cbc_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let usable = data.len() - data.len() % 16;
    let mut buf = data[..usable].to_vec();
    let bad_iv = |_| PdfError::EncryptionError("AES IV must be 16 bytes".into());
    let res = match key.len() {
        16 => Aes128CbcDec::new_from_slices(key, iv)
            .map_err(bad_iv)?
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map(<[u8]>::len),
        32 => Aes256CbcDec::new_from_slices(key, iv)
            .map_err(bad_iv)?
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map(<[u8]>::len),
        n => return Err(key_error(n)),
    };
    let len = res.map_err(|_| PdfError::EncryptionError("AES decrypt failed".into()))?;
    buf.truncate(len);
    Ok(buf)
}

/// AES-CBC encrypt without padding; `data` must be block aligned.
pub fn aes_cbc_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() % 16 != 0 {
        return Err(PdfError::EncryptionError("AES input not block aligned".into()));
    }
    let mut buf = data.to_vec();
    let bad_iv = |_| PdfError::EncryptionError("AES IV must be 16 bytes".into());
    let len = data.len();
    let res = match key.len() {
        16 => Aes128CbcEnc::new_from_slices(key, iv)
            .map_err(bad_iv)?
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
            .map(<[u8]>::len),
        32 => Aes256CbcEnc::new_from_slices(key, iv)
            .map_err(bad_iv)?
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
            .map(<[u8]>::len),
        n => return Err(key_error(n)),
    };
    res.map_err(|_| PdfError::EncryptionError("AES encrypt failed".into()))?;
    Ok(buf)
}

/// Decrypt a PDF AES payload: 16-byte IV followed by PKCS#7 padded data.
pub fn aes_decrypt_payload(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 16 {
        // Too short to carry an IV; treat as empty.
        return Ok(Vec::new());
    }
    let (iv, body) = data.split_at(16);
    let plain = aes_cbc_decrypt(key, iv, body)?;
    let len = unpad_aes(&plain).len();
    let mut plain = plain;
    plain.truncate(len);
    Ok(plain)
}

/// Encrypt a PDF AES payload with a random IV and PKCS#7 padding.
pub fn aes_encrypt_payload(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let iv: [u8; 16] = rand::random();
    let padded_len = (data.len() / 16 + 1) * 16;
    let mut buf = vec![0u8; padded_len];
    buf[..data.len()].copy_from_slice(data);
    let res = match key.len() {
        16 => Aes128CbcEnc::new_from_slices(key, &iv)
            .map_err(|_| key_error(key.len()))?
            .encrypt_padded_mut::<Pkcs7>(&mut buf, data.len())
            .map(<[u8]>::len),
        32 => Aes256CbcEnc::new_from_slices(key, &iv)
            .map_err(|_| key_error(key.len()))?
            .encrypt_padded_mut::<Pkcs7>(&mut buf, data.len())
            .map(<[u8]>::len),
        n => return Err(key_error(n)),
    };
    let len = res.map_err(|_| PdfError::EncryptionError("AES encrypt failed".into()))?;
    let mut out = Vec::with_capacity(16 + len);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&buf[..len]);
    Ok(out)
}

/// AES-256-ECB on a single block, used for /Perms.
pub fn aes256_ecb_block(key: &[u8], block: &[u8], encrypt: bool) -> Result<[u8; 16]> {
    let cipher = aes::Aes256::new_from_slice(key).map_err(|_| key_error(key.len()))?;
    if block.len() < 16 {
        return Err(PdfError::EncryptionError("/Perms must be 16 bytes".into()));
    }
    let mut b = aes::Block::clone_from_slice(&block[..16]);
    if encrypt {
        cipher.encrypt_block(&mut b);
    } else {
        cipher.decrypt_block(&mut b);
    }
    let mut out = [0u8; 16];
    out.copy_from_slice(&b);
    Ok(out)
}

/// Remove PKCS#7 padding, returning data unchanged if the padding is invalid.
pub fn unpad_aes(data: &[u8]) -> &[u8] {
    let Some(&last) = data.last() else {
        return data;
    };
    let pad_len = last as usize;
    if pad_len == 0 || pad_len > 16 || pad_len > data.len() {
        return data;
    }
    let start = data.len() - pad_len;
    if data[start..].iter().all(|&b| b == last) {
        &data[..start]
    } else {
        data
    }
}
