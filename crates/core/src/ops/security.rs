//! Password and permission changes.
//!
//! Everything here edits `ctx.encrypt`; the writer derives the /Encrypt
//! dictionary and the ciphertext from it. Apart from `encrypt` and
//! `list_permissions`, each operation needs the owner role.

use crate::document::permissions::{Permission, Permissions};
use crate::document::security::{EncryptionState, Role, generate_file_id};
use crate::error::{PdfError, Result};
use crate::model::Context;
use tracing::info;

/// Decoded permissions of an encrypted document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionListing {
    pub bits: i32,
    pub revision: i64,
    pub capabilities: Vec<Permission>,
    pub lines: Vec<String>,
}

fn owner_state(ctx: &mut Context) -> Result<&mut EncryptionState> {
    let state = ctx
        .encrypt
        .as_mut()
        .ok_or_else(|| PdfError::EncryptionError("document is not encrypted".into()))?;
    if state.role != Some(Role::Owner) {
        return Err(PdfError::Auth);
    }
    Ok(state)
}

/// Encrypt with the configured algorithm, passwords and permissions.
pub fn encrypt(ctx: &mut Context) -> Result<()> {
    if ctx.encrypt.is_some() {
        return Err(PdfError::EncryptionError("document is already encrypted".into()));
    }
    let id = ctx
        .file_id()
        .map(|(first, _)| first)
        .unwrap_or_else(|| generate_file_id(ctx.source()));
    let config = &ctx.config;
    let state = EncryptionState::new(
        config.encrypt_using,
        &config.user_password,
        &config.owner_password,
        config.permissions.bits(),
        &id,
    )?;
    info!(algorithm = ?state.algorithm, r = state.r, "encrypting");
    ctx.encrypt = Some(state);
    Ok(())
}

pub fn decrypt(ctx: &mut Context) -> Result<()> {
    owner_state(ctx)?;
    ctx.encrypt = None;
    ctx.trailer.remove("Encrypt");
    if let Some(r) = ctx.encrypt_ref.take() {
        ctx.free_object(r.num);
    }
    info!("decrypted");
    Ok(())
}

/// Replace the user password; `old` must match the current one.
pub fn change_user_password(ctx: &mut Context, old: &[u8], new: &[u8]) -> Result<()> {
    let state = owner_state(ctx)?;
    if state.user_password() != Some(old) {
        return Err(PdfError::Auth);
    }
    let owner = state.owner_password().map(<[u8]>::to_vec).ok_or(PdfError::Auth)?;
    state.change_passwords(new, &owner)
}

/// Replace the owner password; `old` must match the current one. The user
/// password must be known to derive the new values.
pub fn change_owner_password(ctx: &mut Context, old: &[u8], new: &[u8]) -> Result<()> {
    let state = owner_state(ctx)?;
    if state.owner_password() != Some(old) {
        return Err(PdfError::Auth);
    }
    let user = state.user_password().map(<[u8]>::to_vec).ok_or(PdfError::Auth)?;
    state.change_passwords(&user, new)
}

pub fn set_permissions(ctx: &mut Context, p: i32) -> Result<()> {
    let state = owner_state(ctx)?;
    state.set_permissions(Permissions::normalize(p))?;
    info!(p = state.p, "permissions set");
    Ok(())
}

/// `None` for unencrypted documents. Works without authentication.
pub fn list_permissions(ctx: &Context) -> Option<PermissionListing> {
    let perms = ctx.permissions()?;
    Some(PermissionListing {
        bits: perms.bits,
        revision: perms.revision,
        capabilities: perms.capabilities(),
        lines: perms.describe(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Command, Configuration, EncryptAlgorithm, PermissionsSpec};
    use crate::writer::write_to_vec;

    fn config(alg: EncryptAlgorithm) -> Configuration {
        Configuration {
            encrypt_using: alg,
            permissions: PermissionsSpec::All,
            ..Configuration::default()
        }
        .with_passwords(b"upw", b"opw")
    }

    #[test]
    fn test_encrypt_twice_fails() {
        let mut ctx = Context::new(config(EncryptAlgorithm::Aes128));
        encrypt(&mut ctx).unwrap();
        assert!(matches!(encrypt(&mut ctx), Err(PdfError::EncryptionError(_))));
    }

    #[test]
    fn test_written_file_opens_as_user() {
        let mut ctx = Context::new(config(EncryptAlgorithm::Rc4_128));
        encrypt(&mut ctx).unwrap();
        let bytes = write_to_vec(&mut ctx).unwrap();
        let conf = Configuration::default().with_passwords(b"upw", b"");
        let reopened = Context::from_bytes(bytes, conf).unwrap();
        let state = reopened.encrypt.as_ref().unwrap();
        assert_eq!(state.role, Some(Role::User));
        assert_eq!(state.p, Permissions::ALL);
    }

    #[test]
    fn test_change_passwords_checks_old() {
        let mut ctx = Context::new(config(EncryptAlgorithm::Aes256));
        encrypt(&mut ctx).unwrap();
        assert!(matches!(change_user_password(&mut ctx, b"wrong", b"x"), Err(PdfError::Auth)));
        change_user_password(&mut ctx, b"upw", b"new-user").unwrap();
        change_owner_password(&mut ctx, b"opw", b"new-owner").unwrap();
        let state = ctx.encrypt.as_ref().unwrap();
        assert_eq!(state.user_password(), Some(&b"new-user"[..]));
        assert_eq!(state.owner_password(), Some(&b"new-owner"[..]));
    }

    #[test]
    fn test_change_user_password_after_reopen_rc4() {
        let mut ctx = Context::new(config(EncryptAlgorithm::Rc4_128));
        encrypt(&mut ctx).unwrap();
        let bytes = write_to_vec(&mut ctx).unwrap();

        let both = Configuration::default().with_passwords(b"upw", b"opw");
        let mut reopened = Context::from_bytes(bytes.clone(), both).unwrap();
        change_user_password(&mut reopened, b"upw", b"new-user").unwrap();

        let owner_only = Configuration::default().with_passwords(b"", b"opw");
        let mut reopened = Context::from_bytes(bytes, owner_only).unwrap();
        change_user_password(&mut reopened, b"upw", b"new-user").unwrap();
        let rewritten = write_to_vec(&mut reopened).unwrap();

        let conf = Configuration::default().with_passwords(b"new-user", b"");
        let state = Context::from_bytes(rewritten, conf).unwrap().encrypt.unwrap();
        assert_eq!(state.role, Some(Role::User));
    }

    #[test]
    fn test_user_role_cannot_decrypt() {
        let mut ctx = Context::new(config(EncryptAlgorithm::Aes256));
        encrypt(&mut ctx).unwrap();
        let bytes = write_to_vec(&mut ctx).unwrap();
        let conf = Configuration::for_command(Command::Decrypt).with_passwords(b"upw", b"");
        let mut reopened = Context::from_bytes(bytes, conf).unwrap();
        assert!(matches!(decrypt(&mut reopened), Err(PdfError::Auth)));
    }

    #[test]
    fn test_list_and_set_permissions() {
        let mut ctx = Context::new(config(EncryptAlgorithm::Rc4_40));
        assert!(list_permissions(&Context::new(Configuration::default())).is_none());
        encrypt(&mut ctx).unwrap();
        set_permissions(&mut ctx, Permissions::NONE).unwrap();
        let listing = list_permissions(&ctx).unwrap();
        assert_eq!(listing.bits, Permissions::NONE);
        assert!(listing.capabilities.is_empty());
        assert_eq!(listing.revision, 2);
    }
}
