//! Standard security handler.
//!
//! Covers revisions 2 through 6: RC4 with MD5 key derivation for R2-R4
//! (AES-128 on R4 crypt filters) and AES-256 with SHA-2 hashing for R5/R6.
//! The same state both authenticates a loaded file and produces the
//! /Encrypt dictionary for a file being written.

use crate::codec::aes::{aes_cbc_decrypt, aes_cbc_encrypt, aes_decrypt_payload, aes_encrypt_payload, aes256_ecb_block};
use crate::codec::arcfour::rc4;
use crate::config::EncryptAlgorithm;
use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, ObjRef, Object, Stream};
use sha2::{Digest, Sha256, Sha384, Sha512};
use tracing::{debug, warn};

/// Password padding constant from PDF spec.
pub const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Cipher selected by a crypt filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    Identity,
    Rc4,
    AesV2,
    AesV3,
}

impl CryptMethod {
    fn from_cfm(cfm: &str) -> Result<Self> {
        match cfm {
            "None" | "Identity" => Ok(Self::Identity),
            "V2" => Ok(Self::Rc4),
            "AESV2" => Ok(Self::AesV2),
            "AESV3" => Ok(Self::AesV3),
            other => Err(PdfError::Unsupported(format!("crypt filter method {other}"))),
        }
    }

    const fn cfm(self) -> &'static str {
        match self {
            Self::Identity => "None",
            Self::Rc4 => "V2",
            Self::AesV2 => "AESV2",
            Self::AesV3 => "AESV3",
        }
    }
}

/// Which password opened the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Owner,
}

/// Encryption parameters of one document plus the derived file key.
#[derive(Debug, Clone)]
pub struct EncryptionState {
    pub algorithm: EncryptAlgorithm,
    pub v: i64,
    pub r: i64,
    /// File key length in bytes.
    pub length: usize,
    pub p: i32,
    /// First element of the trailer /ID.
    pub id: Vec<u8>,
    pub o: Vec<u8>,
    pub u: Vec<u8>,
    pub oe: Vec<u8>,
    pub ue: Vec<u8>,
    pub perms: Vec<u8>,
    pub encrypt_metadata: bool,
    pub string_method: CryptMethod,
    pub stream_method: CryptMethod,
    pub role: Option<Role>,
    key: Vec<u8>,
    user_password: Option<Vec<u8>>,
    owner_password: Option<Vec<u8>>,
}

impl EncryptionState {
    /// Read the /Encrypt dictionary. `id` is the first trailer /ID string.
    pub fn from_dict(dict: &Dict, id: &[u8]) -> Result<Self> {
        let filter = dict.get_name("Filter").unwrap_or("Standard");
        if filter != "Standard" {
            return Err(PdfError::Unsupported(format!("security handler {filter}")));
        }
        let v = dict.get_int("V").unwrap_or(0);
        let r = dict
            .get_int("R")
            .ok_or_else(|| PdfError::validation("Encrypt", "missing /R"))?;
        if !(2..=6).contains(&r) {
            return Err(PdfError::Unsupported(format!("security handler revision {r}")));
        }
        let p = dict
            .get_int("P")
            .map(|p| p as i32)
            .ok_or_else(|| PdfError::validation("Encrypt", "missing /P"))?;
        let bytes = |key: &str| -> Vec<u8> {
            dict.get(key)
                .and_then(|o| o.as_string().ok())
                .map(<[u8]>::to_vec)
                .unwrap_or_default()
        };
        let encrypt_metadata = dict
            .get("EncryptMetadata")
            .and_then(|o| o.as_bool().ok())
            .unwrap_or(true);

        let (stream_method, string_method) = match v {
            1 | 2 => (CryptMethod::Rc4, CryptMethod::Rc4),
            4 | 5 => (
                resolve_crypt_method(dict, "StmF")?,
                resolve_crypt_method(dict, "StrF")?,
            ),
            other => return Err(PdfError::Unsupported(format!("encryption version {other}"))),
        };

        let length = match v {
            1 => 5,
            5 => 32,
            4 => crypt_filter_length(dict).unwrap_or(16),
            _ => {
                let bits = dict.get_int("Length").unwrap_or(40);
                if bits % 8 != 0 || !(40..=128).contains(&bits) {
                    return Err(PdfError::validation("Encrypt", format!("bad /Length {bits}")));
                }
                (bits / 8) as usize
            }
        };

        // R2-R4 derive keys from a 16-byte MD5 digest; R5+ needs the 32-byte AES-256 key.
        if (r <= 4 && length > 16) || (r >= 5) != (v == 5) {
            return Err(PdfError::Unsupported(format!(
                "encryption version {v} with revision {r} and {length}-byte key"
            )));
        }

        let algorithm = match (v, stream_method, string_method) {
            (5, ..) => EncryptAlgorithm::Aes256,
            (4, CryptMethod::AesV2, _) | (4, CryptMethod::Identity, CryptMethod::AesV2) => {
                EncryptAlgorithm::Aes128
            }
            _ if length == 5 => EncryptAlgorithm::Rc4_40,
            _ => EncryptAlgorithm::Rc4_128,
        };

        let state = Self {
            algorithm,
            v,
            r,
            length,
            p,
            id: id.to_vec(),
            o: bytes("O"),
            u: bytes("U"),
            oe: bytes("OE"),
            ue: bytes("UE"),
            perms: bytes("Perms"),
            encrypt_metadata,
            string_method,
            stream_method,
            role: None,
            key: Vec::new(),
            user_password: None,
            owner_password: None,
        };
        state.check_lengths()?;
        debug!(v, r, length, ?algorithm, "read encryption dictionary");
        Ok(state)
    }

    fn check_lengths(&self) -> Result<()> {
        let (ou, eo) = if self.r >= 5 { (48, 32) } else { (32, 0) };
        if self.o.len() < ou || self.u.len() < ou {
            return Err(PdfError::validation("Encrypt", "/O or /U too short"));
        }
        if self.oe.len() < eo || self.ue.len() < eo {
            return Err(PdfError::validation("Encrypt", "/OE or /UE too short"));
        }
        Ok(())
    }

    /// Fresh encryption parameters for writing, authenticated as owner.
    pub fn new(
        algorithm: EncryptAlgorithm,
        user_password: &[u8],
        owner_password: &[u8],
        p: i32,
        id: &[u8],
    ) -> Result<Self> {
        let (v, r, length, method) = match algorithm {
            EncryptAlgorithm::Rc4_40 => (1, 2, 5, CryptMethod::Rc4),
            EncryptAlgorithm::Rc4_128 => (2, 3, 16, CryptMethod::Rc4),
            EncryptAlgorithm::Aes128 => (4, 4, 16, CryptMethod::AesV2),
            EncryptAlgorithm::Aes256 => (5, 6, 32, CryptMethod::AesV3),
        };
        let mut state = Self {
            algorithm,
            v,
            r,
            length,
            p,
            id: id.to_vec(),
            o: Vec::new(),
            u: Vec::new(),
            oe: Vec::new(),
            ue: Vec::new(),
            perms: Vec::new(),
            encrypt_metadata: true,
            string_method: method,
            stream_method: method,
            role: Some(Role::Owner),
            key: Vec::new(),
            user_password: None,
            owner_password: None,
        };
        state.generate(user_password, owner_password)?;
        Ok(state)
    }

    /// Derive the file key from the supplied passwords.
    ///
    /// Both passwords are tried; a successful owner check wins. The empty
    /// password is a valid candidate for either role.
    pub fn authenticate(&mut self, user_password: &[u8], owner_password: &[u8]) -> Result<Role> {
        let as_user = self.check_user(user_password)?;
        let as_owner = self.check_owner(owner_password)?;
        let user_ok = as_user.is_some();
        let role = match (as_owner, as_user) {
            (Some((key, recovered)), _) => {
                self.key = key;
                self.owner_password = Some(owner_password.to_vec());
                // R5/R6 keep no recoverable user password.
                self.user_password = if user_ok {
                    Some(user_password.to_vec())
                } else {
                    recovered.map(|padded| unpad_password(&padded).to_vec())
                };
                Role::Owner
            }
            (None, Some(key)) => {
                self.key = key;
                self.user_password = Some(user_password.to_vec());
                Role::User
            }
            (None, None) => return Err(PdfError::Auth),
        };
        if self.r >= 6 {
            self.check_perms();
        }
        self.role = Some(role);
        debug!(?role, r = self.r, "authenticated");
        Ok(role)
    }

    /// Update /P. R2-R4 need fresh /O /U values because P feeds the key.
    pub fn set_permissions(&mut self, p: i32) -> Result<()> {
        self.p = p;
        if self.r >= 5 {
            self.perms = self.compute_perms()?.to_vec();
            return Ok(());
        }
        let (Some(user), Some(owner)) = (self.user_password.clone(), self.owner_password.clone())
        else {
            return Err(PdfError::Auth);
        };
        self.generate(&user, &owner)
    }

    /// Replace both passwords, deriving new /O /U (and /OE /UE /Perms).
    pub fn change_passwords(&mut self, user_password: &[u8], owner_password: &[u8]) -> Result<()> {
        self.generate(user_password, owner_password)
    }

    pub fn user_password(&self) -> Option<&[u8]> {
        self.user_password.as_deref()
    }

    pub fn owner_password(&self) -> Option<&[u8]> {
        self.owner_password.as_deref()
    }

    fn generate(&mut self, user_password: &[u8], owner_password: &[u8]) -> Result<()> {
        // An empty owner password falls back to the user password.
        let owner = if owner_password.is_empty() {
            user_password
        } else {
            owner_password
        };
        if self.r >= 5 {
            self.generate_aes256(user_password, owner)?;
        } else {
            self.o = self.compute_o(owner, user_password);
            self.key = self.file_key(user_password);
            self.u = self.compute_u(&self.key);
            self.oe.clear();
            self.ue.clear();
            self.perms.clear();
        }
        self.user_password = Some(user_password.to_vec());
        self.owner_password = Some(owner_password.to_vec());
        self.role = Some(Role::Owner);
        Ok(())
    }

    fn generate_aes256(&mut self, user_password: &[u8], owner_password: &[u8]) -> Result<()> {
        let upw = truncate_utf8_password(user_password);
        let opw = truncate_utf8_password(owner_password);
        let key: [u8; 32] = rand::random();
        let (u_vsalt, u_ksalt): ([u8; 8], [u8; 8]) = (rand::random(), rand::random());
        let (o_vsalt, o_ksalt): ([u8; 8], [u8; 8]) = (rand::random(), rand::random());

        let mut u = self.password_hash(upw, &u_vsalt, None)?;
        u.extend_from_slice(&u_vsalt);
        u.extend_from_slice(&u_ksalt);
        let ue = aes_cbc_encrypt(&self.password_hash(upw, &u_ksalt, None)?, &[0u8; 16], &key)?;

        let mut o = self.password_hash(opw, &o_vsalt, Some(&u))?;
        o.extend_from_slice(&o_vsalt);
        o.extend_from_slice(&o_ksalt);
        let oe = aes_cbc_encrypt(&self.password_hash(opw, &o_ksalt, Some(&u))?, &[0u8; 16], &key)?;

        self.key = key.to_vec();
        self.u = u;
        self.ue = ue;
        self.o = o;
        self.oe = oe;
        self.perms = self.compute_perms()?.to_vec();
        Ok(())
    }

    /// The /Encrypt dictionary describing this state.
    pub fn to_dict(&self) -> Dict {
        let mut d = crate::dict! {
            "Filter" => Object::name("Standard"),
            "V" => self.v,
            "R" => self.r,
        };
        if self.v >= 2 {
            d.insert("Length", self.length * 8);
        }
        if self.v >= 4 {
            let method = match self.stream_method {
                CryptMethod::Identity => self.string_method,
                m => m,
            };
            let std_cf = crate::dict! {
                "AuthEvent" => Object::name("DocOpen"),
                "CFM" => Object::name(method.cfm()),
                "Length" => self.length,
            };
            d.insert("CF", crate::dict! { "StdCF" => std_cf });
            let filter_name = |m: CryptMethod| match m {
                CryptMethod::Identity => Object::name("Identity"),
                _ => Object::name("StdCF"),
            };
            d.insert("StmF", filter_name(self.stream_method));
            d.insert("StrF", filter_name(self.string_method));
        }
        d.insert("P", self.p);
        d.insert("O", Object::HexString(self.o.clone()));
        d.insert("U", Object::HexString(self.u.clone()));
        if self.r >= 5 {
            d.insert("OE", Object::HexString(self.oe.clone()));
            d.insert("UE", Object::HexString(self.ue.clone()));
            d.insert("Perms", Object::HexString(self.perms.clone()));
        }
        if !self.encrypt_metadata {
            d.insert("EncryptMetadata", false);
        }
        d
    }

    // --- R2-R4 (Algorithms 2 to 7) ---

    fn file_key(&self, password: &[u8]) -> Vec<u8> {
        let mut context = md5::Context::new();
        context.consume(pad_password(password));
        context.consume(&self.o[..self.o.len().min(32)]);
        context.consume(self.p.to_le_bytes());
        context.consume(&self.id);
        if self.r >= 4 && !self.encrypt_metadata {
            context.consume([0xFF; 4]);
        }
        let mut result = context.finalize().0.to_vec();
        let n = self.length;
        if self.r >= 3 {
            for _ in 0..50 {
                result = md5::compute(&result[..n]).0.to_vec();
            }
        }
        result.truncate(n);
        result
    }

    fn owner_key(&self, owner_password: &[u8]) -> Vec<u8> {
        let mut hash = md5::compute(pad_password(owner_password)).0.to_vec();
        if self.r >= 3 {
            for _ in 0..50 {
                hash = md5::compute(&hash).0.to_vec();
            }
        }
        hash.truncate(self.length);
        hash
    }

    fn compute_o(&self, owner_password: &[u8], user_password: &[u8]) -> Vec<u8> {
        let key = self.owner_key(owner_password);
        let mut result = rc4(&key, &pad_password(user_password));
        if self.r >= 3 {
            for i in 1..20u8 {
                result = rc4(&xor_key(&key, i), &result);
            }
        }
        result
    }

    fn compute_u(&self, key: &[u8]) -> Vec<u8> {
        if self.r == 2 {
            return rc4(key, &PASSWORD_PADDING);
        }
        let mut context = md5::Context::new();
        context.consume(PASSWORD_PADDING);
        context.consume(&self.id);
        let mut result = rc4(key, &context.finalize().0);
        for i in 1..20u8 {
            result = rc4(&xor_key(key, i), &result);
        }
        let mut padded = result.clone();
        padded.extend_from_slice(&result);
        padded.truncate(32);
        padded
    }

    fn check_user(&self, password: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.r >= 5 {
            return self.check_user_aes256(password);
        }
        let key = self.file_key(password);
        let computed = self.compute_u(&key);
        let matched = if self.r == 2 {
            computed[..] == self.u[..32]
        } else {
            computed[..16] == self.u[..16]
        };
        Ok(matched.then_some(key))
    }

    /// Owner check. For R2-R4 also yields the user password recovered from /O.
    fn check_owner(&self, password: &[u8]) -> Result<Option<(Vec<u8>, Option<Vec<u8>>)>> {
        if self.r >= 5 {
            return Ok(self.check_owner_aes256(password)?.map(|key| (key, None)));
        }
        let key = self.owner_key(password);
        let o = &self.o[..32];
        let user_password = if self.r == 2 {
            rc4(&key, o)
        } else {
            let mut result = o.to_vec();
            for i in (0..20u8).rev() {
                result = rc4(&xor_key(&key, i), &result);
            }
            result
        };
        Ok(self
            .check_user(&user_password)?
            .map(|key| (key, Some(user_password))))
    }

    // --- R5/R6 (Algorithms 2.A, 2.B, 8 to 10) ---

    fn check_user_aes256(&self, password: &[u8]) -> Result<Option<Vec<u8>>> {
        let password = truncate_utf8_password(password);
        let (hash, vsalt, ksalt) = (&self.u[..32], &self.u[32..40], &self.u[40..48]);
        if self.password_hash(password, vsalt, None)? != hash {
            return Ok(None);
        }
        let intermediate = self.password_hash(password, ksalt, None)?;
        aes_cbc_decrypt(&intermediate, &[0u8; 16], &self.ue[..32]).map(Some)
    }

    fn check_owner_aes256(&self, password: &[u8]) -> Result<Option<Vec<u8>>> {
        let password = truncate_utf8_password(password);
        let u = &self.u[..48];
        let (hash, vsalt, ksalt) = (&self.o[..32], &self.o[32..40], &self.o[40..48]);
        if self.password_hash(password, vsalt, Some(u))? != hash {
            return Ok(None);
        }
        let intermediate = self.password_hash(password, ksalt, Some(u))?;
        aes_cbc_decrypt(&intermediate, &[0u8; 16], &self.oe[..32]).map(Some)
    }

    fn password_hash(&self, password: &[u8], salt: &[u8], vector: Option<&[u8]>) -> Result<Vec<u8>> {
        let mut hasher = Sha256::new();
        hasher.update(password);
        hasher.update(salt);
        if let Some(v) = vector {
            hasher.update(v);
        }
        let k = hasher.finalize().to_vec();
        if self.r == 5 {
            return Ok(k);
        }
        hash_2b(password, k, vector.unwrap_or(&[]))
    }

    fn compute_perms(&self) -> Result<[u8; 16]> {
        let mut block = [0u8; 16];
        block[..4].copy_from_slice(&self.p.to_le_bytes());
        block[4..8].copy_from_slice(&[0xFF; 4]);
        block[8] = if self.encrypt_metadata { b'T' } else { b'F' };
        block[9..12].copy_from_slice(b"adb");
        block[12..].copy_from_slice(&rand::random::<[u8; 4]>());
        aes256_ecb_block(&self.key, &block, true)
    }

    fn check_perms(&self) {
        match aes256_ecb_block(&self.key, &self.perms, false) {
            Ok(block) if &block[9..12] == b"adb" => {
                let p = i32::from_le_bytes([block[0], block[1], block[2], block[3]]);
                if p != self.p {
                    warn!(perms = p, p = self.p, "/Perms disagrees with /P");
                }
            }
            Ok(_) => warn!("/Perms failed to decrypt to a valid block"),
            Err(e) => warn!(error = %e, "/Perms unreadable"),
        }
    }

    // --- per-object ciphers ---

    /// RC4 / AES-128 key for one object (Algorithm 1).
    fn object_key(&self, r: ObjRef, aes: bool) -> Vec<u8> {
        let mut context = md5::Context::new();
        context.consume(&self.key);
        context.consume(&r.num.to_le_bytes()[..3]);
        context.consume(&r.generation.to_le_bytes());
        if aes {
            context.consume(b"sAlT");
        }
        let hash = context.finalize();
        hash.0[..(self.key.len() + 5).min(16)].to_vec()
    }

    fn require_key(&self) -> Result<()> {
        if self.key.is_empty() {
            Err(PdfError::Auth)
        } else {
            Ok(())
        }
    }

    pub fn decrypt_bytes(&self, method: CryptMethod, r: ObjRef, data: &[u8]) -> Result<Vec<u8>> {
        self.require_key()?;
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => Ok(rc4(&self.object_key(r, false), data)),
            CryptMethod::AesV2 => aes_decrypt_payload(&self.object_key(r, true), data),
            CryptMethod::AesV3 => aes_decrypt_payload(&self.key, data),
        }
    }

    pub fn encrypt_bytes(&self, method: CryptMethod, r: ObjRef, data: &[u8]) -> Result<Vec<u8>> {
        self.require_key()?;
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => Ok(rc4(&self.object_key(r, false), data)),
            CryptMethod::AesV2 => aes_encrypt_payload(&self.object_key(r, true), data),
            CryptMethod::AesV3 => aes_encrypt_payload(&self.key, data),
        }
    }

    /// Whether a stream's payload goes through the stream cipher.
    fn crypts_stream(&self, stream: &Stream) -> bool {
        if stream.dict.has_type("XRef") {
            return false;
        }
        if !self.encrypt_metadata && stream.dict.has_type("Metadata") {
            return false;
        }
        // A leading /Crypt filter with no /Name selects Identity.
        let filters = crate::codec::filter_names(&stream.dict);
        if filters.first().map(String::as_str) == Some("Crypt") {
            let parms = crate::codec::decode_parms(&stream.dict, 1);
            let name = parms[0].as_ref().and_then(|p| p.get_name("Name").map(str::to_owned));
            return !matches!(name.as_deref(), None | Some("Identity"));
        }
        true
    }

    /// Decrypt every string and the stream payload of object `r` in place.
    pub fn decrypt_object(&self, r: ObjRef, obj: &mut Object) -> Result<()> {
        self.crypt_object(r, obj, Self::decrypt_bytes)
    }

    /// Encrypt every string and the stream payload of object `r` in place.
    /// Stream payloads must already be encoded.
    pub fn encrypt_object(&self, r: ObjRef, obj: &mut Object) -> Result<()> {
        self.crypt_object(r, obj, Self::encrypt_bytes)
    }

    fn crypt_object(
        &self,
        r: ObjRef,
        obj: &mut Object,
        cipher: fn(&Self, CryptMethod, ObjRef, &[u8]) -> Result<Vec<u8>>,
    ) -> Result<()> {
        obj.map_strings(&mut |s| cipher(self, self.string_method, r, s))?;
        if let Object::Stream(stream) = obj
            && self.crypts_stream(stream)
        {
            stream.data = cipher(self, self.stream_method, r, &stream.data)?;
        }
        Ok(())
    }
}

/// Method named by /StmF or /StrF, looked up in /CF.
fn resolve_crypt_method(dict: &Dict, key: &str) -> Result<CryptMethod> {
    let name = dict.get_name(key).unwrap_or("Identity");
    if name == "Identity" {
        return Ok(CryptMethod::Identity);
    }
    let cfm = dict
        .get("CF")
        .and_then(|cf| cf.as_dict().ok())
        .and_then(|cf| cf.get(name))
        .and_then(|f| f.as_dict().ok())
        .and_then(|f| f.get_name("CFM"))
        .unwrap_or("None");
    CryptMethod::from_cfm(cfm)
}

/// /Length of the stream crypt filter, in bytes (some writers use bits).
fn crypt_filter_length(dict: &Dict) -> Option<usize> {
    let name = dict.get_name("StmF")?;
    let len = dict
        .get("CF")?
        .as_dict()
        .ok()?
        .get(name)?
        .as_dict()
        .ok()?
        .get_int("Length")?;
    let bytes = if len > 32 { len / 8 } else { len };
    (5..=16).contains(&bytes).then_some(bytes as usize)
}

/// Strip the trailing run of padding from a password recovered out of /O.
fn unpad_password(padded: &[u8]) -> &[u8] {
    let len = (0..=padded.len())
        .find(|&i| {
            let tail = &padded[i..];
            tail.len() <= PASSWORD_PADDING.len() && PASSWORD_PADDING.starts_with(tail)
        })
        .unwrap_or(padded.len());
    &padded[..len]
}

fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PASSWORD_PADDING[..32 - len]);
    padded
}

fn xor_key(key: &[u8], i: u8) -> Vec<u8> {
    key.iter().map(|b| b ^ i).collect()
}

fn truncate_utf8_password(password: &[u8]) -> &[u8] {
    &password[..password.len().min(127)]
}

/// Iterated hash of ISO 32000-2 Algorithm 2.B.
fn hash_2b(password: &[u8], mut k: Vec<u8>, vector: &[u8]) -> Result<Vec<u8>> {
    let mut round_no = 0u32;
    let mut last_byte_val = 0u8;
    while round_no < 64 || last_byte_val > (round_no as u8).wrapping_sub(32) {
        let base: Vec<u8> = password
            .iter()
            .chain(k.iter())
            .chain(vector.iter())
            .copied()
            .collect();
        let k1 = base.repeat(64);
        let e = aes_cbc_encrypt(&k[..16], &k[16..32], &k1)?;
        k = match bytes_mod_3(&e[..16]) {
            0 => Sha256::digest(&e).to_vec(),
            1 => Sha384::digest(&e).to_vec(),
            _ => Sha512::digest(&e).to_vec(),
        };
        last_byte_val = e[e.len() - 1];
        round_no += 1;
    }
    k.truncate(32);
    Ok(k)
}

fn bytes_mod_3(input: &[u8]) -> usize {
    // 256 is 1 mod 3, so the byte sum has the same remainder.
    input.iter().map(|&b| (b % 3) as usize).sum::<usize>() % 3
}

/// A fresh file identifier: MD5 over the current time and `seed`.
pub fn generate_file_id(seed: &[u8]) -> Vec<u8> {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut context = md5::Context::new();
    context.consume(nanos.to_le_bytes());
    context.consume(seed);
    context.consume(rand::random::<[u8; 8]>());
    context.finalize().0.to_vec()
}
