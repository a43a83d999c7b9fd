//! Processing configuration.
//!
//! Every option a caller may set for one run through the pipeline. Loading
//! these from files is left to the caller; the serde derives exist for that.

use crate::error::{PdfError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The operation a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Command {
    Validate,
    Optimize,
    Trim,
    Split,
    MergeCreate,
    MergeAppend,
    ExtractImages,
    ExtractFonts,
    ExtractPages,
    ExtractContent,
    ExtractMetadata,
    Collect,
    Rotate,
    InsertPages,
    RemovePages,
    ListPermissions,
    SetPermissions,
    Encrypt,
    Decrypt,
    ChangeUserPw,
    ChangeOwnerPw,
    ListAttachments,
    AddAttachments,
    RemoveAttachments,
    ExtractAttachments,
    AddWatermarks,
    RemoveWatermarks,
    NUp,
}

impl Command {
    pub const ALL: [Command; 28] = [
        Self::Validate,
        Self::Optimize,
        Self::Trim,
        Self::Split,
        Self::MergeCreate,
        Self::MergeAppend,
        Self::ExtractImages,
        Self::ExtractFonts,
        Self::ExtractPages,
        Self::ExtractContent,
        Self::ExtractMetadata,
        Self::Collect,
        Self::Rotate,
        Self::InsertPages,
        Self::RemovePages,
        Self::ListPermissions,
        Self::SetPermissions,
        Self::Encrypt,
        Self::Decrypt,
        Self::ChangeUserPw,
        Self::ChangeOwnerPw,
        Self::ListAttachments,
        Self::AddAttachments,
        Self::RemoveAttachments,
        Self::ExtractAttachments,
        Self::AddWatermarks,
        Self::RemoveWatermarks,
        Self::NUp,
    ];

    pub const fn tag(self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Optimize => "optimize",
            Self::Trim => "trim",
            Self::Split => "split",
            Self::MergeCreate => "merge-create",
            Self::MergeAppend => "merge-append",
            Self::ExtractImages => "extract-images",
            Self::ExtractFonts => "extract-fonts",
            Self::ExtractPages => "extract-pages",
            Self::ExtractContent => "extract-content",
            Self::ExtractMetadata => "extract-metadata",
            Self::Collect => "collect",
            Self::Rotate => "rotate",
            Self::InsertPages => "insert-pages",
            Self::RemovePages => "remove-pages",
            Self::ListPermissions => "list-permissions",
            Self::SetPermissions => "set-permissions",
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
            Self::ChangeUserPw => "change-user-pw",
            Self::ChangeOwnerPw => "change-owner-pw",
            Self::ListAttachments => "list-attachments",
            Self::AddAttachments => "add-attachments",
            Self::RemoveAttachments => "remove-attachments",
            Self::ExtractAttachments => "extract-attachments",
            Self::AddWatermarks => "add-watermarks",
            Self::RemoveWatermarks => "remove-watermarks",
            Self::NUp => "n-up",
        }
    }
}

impl FromStr for Command {
    type Err = PdfError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.tag() == s)
            .ok_or_else(|| PdfError::Unsupported(format!("command {s}")))
    }
}

/// Encryption algorithm used when writing an encrypted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptAlgorithm {
    #[serde(rename = "RC4-40")]
    Rc4_40,
    #[serde(rename = "RC4-128")]
    Rc4_128,
    #[serde(rename = "AES-128")]
    Aes128,
    #[serde(rename = "AES-256")]
    Aes256,
}

impl FromStr for EncryptAlgorithm {
    type Err = PdfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "RC4-40" => Ok(Self::Rc4_40),
            "RC4-128" => Ok(Self::Rc4_128),
            "AES-128" => Ok(Self::Aes128),
            "AES-256" => Ok(Self::Aes256),
            _ => Err(PdfError::Unsupported(format!("encryption algorithm {s}"))),
        }
    }
}

/// Permission bits requested for writing, raw or symbolic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionsSpec {
    None,
    All,
    Bits(i32),
}

impl PermissionsSpec {
    /// The /P value this resolves to.
    pub fn bits(self) -> i32 {
        use crate::document::permissions::Permissions;
        match self {
            Self::None => Permissions::NONE,
            Self::All => Permissions::ALL,
            Self::Bits(p) => Permissions::normalize(p),
        }
    }
}

impl FromStr for PermissionsSpec {
    type Err = PdfError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "all" => Ok(Self::All),
            other => other
                .parse::<i64>()
                .ok()
                .and_then(|v| i32::try_from(v).ok().or(u32::try_from(v).ok().map(|u| u as i32)))
                .map(Self::Bits)
                .ok_or_else(|| PdfError::Unsupported(format!("permissions {other}"))),
        }
    }
}

/// How strictly the validator enforces conformance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationMode {
    None,
    #[default]
    Relaxed,
    Strict,
}

impl FromStr for ValidationMode {
    type Err = PdfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "relaxed" => Ok(Self::Relaxed),
            "strict" => Ok(Self::Strict),
            _ => Err(PdfError::Unsupported(format!("validation mode {s}"))),
        }
    }
}

/// Line terminator used by the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Eol {
    #[default]
    #[serde(rename = "LF")]
    Lf,
    #[serde(rename = "CR")]
    Cr,
    #[serde(rename = "CRLF")]
    CrLf,
}

impl Eol {
    pub const fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Lf => b"\n",
            Self::Cr => b"\r",
            Self::CrLf => b"\r\n",
        }
    }
}

impl FromStr for Eol {
    type Err = PdfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "LF" => Ok(Self::Lf),
            "CR" => Ok(Self::Cr),
            "CRLF" => Ok(Self::CrLf),
            _ => Err(PdfError::Unsupported(format!("eol {s}"))),
        }
    }
}

/// Options for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Configuration {
    pub command: Command,
    pub user_password: Vec<u8>,
    pub owner_password: Vec<u8>,
    pub encrypt_using: EncryptAlgorithm,
    pub permissions: PermissionsSpec,
    pub validation_mode: ValidationMode,
    pub eol: Eol,
    pub write_object_streams: bool,
    pub write_xref_stream: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            command: Command::Validate,
            user_password: Vec::new(),
            owner_password: Vec::new(),
            encrypt_using: EncryptAlgorithm::Aes256,
            permissions: PermissionsSpec::None,
            validation_mode: ValidationMode::Relaxed,
            eol: Eol::Lf,
            write_object_streams: false,
            write_xref_stream: false,
        }
    }
}

impl Configuration {
    pub fn for_command(command: Command) -> Self {
        Self {
            command,
            ..Self::default()
        }
    }

    pub fn with_passwords(mut self, user: &[u8], owner: &[u8]) -> Self {
        self.user_password = user.to_vec();
        self.owner_password = owner.to_vec();
        self
    }

    pub fn is_strict(&self) -> bool {
        self.validation_mode == ValidationMode::Strict
    }

    /// Object streams can only be indexed by an xref stream.
    pub fn uses_xref_stream(&self) -> bool {
        self.write_xref_stream || self.write_object_streams
    }
}
