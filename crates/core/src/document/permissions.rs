//! Access permission bits (/P) and their enforcement.

use crate::config::Command;
use serde::{Deserialize, Serialize};

/// A capability granted by one bit of /P.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    Print,
    Modify,
    Extract,
    Annotate,
    FillForms,
    ExtractAccessibility,
    Assemble,
    PrintHighQuality,
}

impl Permission {
    pub const ALL: [Permission; 8] = [
        Self::Print,
        Self::Modify,
        Self::Extract,
        Self::Annotate,
        Self::FillForms,
        Self::ExtractAccessibility,
        Self::Assemble,
        Self::PrintHighQuality,
    ];

    /// Bit position, numbered from 1.
    pub const fn bit(self) -> u32 {
        match self {
            Self::Print => 3,
            Self::Modify => 4,
            Self::Extract => 5,
            Self::Annotate => 6,
            Self::FillForms => 9,
            Self::ExtractAccessibility => 10,
            Self::Assemble => 11,
            Self::PrintHighQuality => 12,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Print => "print",
            Self::Modify => "modify",
            Self::Extract => "extract",
            Self::Annotate => "annotate",
            Self::FillForms => "fill-forms",
            Self::ExtractAccessibility => "extract-accessibility",
            Self::Assemble => "assemble",
            Self::PrintHighQuality => "print-high-quality",
        }
    }

    /// R2 defines only bits 3-6; later bits fall back to their R2 ancestor.
    const fn revision_2_bit(self) -> u32 {
        match self {
            Self::FillForms => Self::Annotate.bit(),
            Self::ExtractAccessibility => Self::Extract.bit(),
            Self::Assemble => Self::Modify.bit(),
            Self::PrintHighQuality => Self::Print.bit(),
            other => other.bit(),
        }
    }
}

/// Decoded /P for a given security handler revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub bits: i32,
    pub revision: i64,
}

/// Bits 7, 8 and 13-32 must be set.
const RESERVED: u32 = 0xFFFF_F0C0;

impl Permissions {
    /// Nothing granted beyond the reserved bits.
    pub const NONE: i32 = RESERVED as i32;
    /// Every capability granted.
    pub const ALL: i32 = 0xFFFF_FFFC_u32 as i32;

    pub const fn new(bits: i32, revision: i64) -> Self {
        Self { bits, revision }
    }

    /// Force reserved bits on and bits 1-2 off.
    pub const fn normalize(bits: i32) -> i32 {
        ((bits as u32 | RESERVED) & !3) as i32
    }

    pub const fn allows(&self, perm: Permission) -> bool {
        let bit = if self.revision <= 2 {
            perm.revision_2_bit()
        } else {
            perm.bit()
        };
        (self.bits as u32) & (1 << (bit - 1)) != 0
    }

    /// Granted capabilities, in bit order.
    pub fn capabilities(&self) -> Vec<Permission> {
        Permission::ALL
            .into_iter()
            .filter(|p| self.allows(*p))
            .collect()
    }

    /// One line per capability, for listings.
    pub fn describe(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "permission bits: {:012b} (P = {})",
            (self.bits as u32) & 0xFFF,
            self.bits
        )];
        lines.extend(Permission::ALL.into_iter().map(|p| {
            let state = if self.allows(p) { "yes" } else { "no" };
            format!("bit {:>2} {}: {state}", p.bit(), p.label())
        }));
        lines
    }
}

/// What a command needs from the authenticated role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Nothing,
    Permission(Permission),
    /// Only the owner may run it on an encrypted document.
    Owner,
}

pub const fn requirement(command: Command) -> Requirement {
    use Command::*;
    match command {
        ExtractImages | ExtractFonts | ExtractContent | ExtractMetadata | ExtractAttachments => {
            Requirement::Permission(Permission::Extract)
        }
        Trim | Split | MergeCreate | MergeAppend | ExtractPages | Collect | Rotate | InsertPages
        | RemovePages | NUp => Requirement::Permission(Permission::Assemble),
        AddAttachments | RemoveAttachments | AddWatermarks | RemoveWatermarks => {
            Requirement::Permission(Permission::Modify)
        }
        SetPermissions | Encrypt | Decrypt | ChangeUserPw | ChangeOwnerPw => Requirement::Owner,
        Validate | Optimize | ListPermissions | ListAttachments => Requirement::Nothing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_grants_nothing() {
        let perms = Permissions::new(Permissions::NONE, 6);
        assert!(perms.capabilities().is_empty());
        assert_eq!(Permissions::NONE, -3904);
    }

    #[test]
    fn test_all_grants_everything() {
        let perms = Permissions::new(Permissions::ALL, 4);
        assert_eq!(perms.capabilities().len(), 8);
    }

    #[test]
    fn test_revision_2_assembly_follows_modify() {
        let modify_only = Permissions::normalize(1 << 3);
        assert!(Permissions::new(modify_only, 2).allows(Permission::Assemble));
        assert!(!Permissions::new(modify_only, 3).allows(Permission::Assemble));
    }

    #[test]
    fn test_normalize_clears_low_bits() {
        assert_eq!(Permissions::normalize(-1), -4);
        assert_eq!(Permissions::normalize(0), Permissions::NONE);
    }
}
