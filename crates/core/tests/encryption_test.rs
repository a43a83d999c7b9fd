mod common;

use common::{config, open, open_with, pages_document};
use quire_core::config::PermissionsSpec;
use quire_core::document::permissions::{Requirement, requirement};
use quire_core::document::{Permission, page_refs};
use quire_core::{Command, Configuration, Context, EncryptAlgorithm, Output, Params, PdfError, process};

const ALGORITHMS: [EncryptAlgorithm; 4] = [
    EncryptAlgorithm::Rc4_40,
    EncryptAlgorithm::Rc4_128,
    EncryptAlgorithm::Aes128,
    EncryptAlgorithm::Aes256,
];

fn document(out: Output) -> Vec<u8> {
    match out {
        Output::Documents(mut docs) => docs.remove(0).data,
        other => panic!("expected documents, got {other:?}"),
    }
}

fn encrypt(input: Vec<u8>, alg: EncryptAlgorithm, permissions: PermissionsSpec) -> Vec<u8> {
    let mut conf = config(Command::Encrypt).with_passwords(b"upw", b"opw");
    conf.encrypt_using = alg;
    conf.permissions = permissions;
    document(process([input], &Params::default(), &conf).unwrap())
}

fn page_texts(ctx: &mut Context) -> Vec<Vec<u8>> {
    page_refs(ctx)
        .unwrap()
        .iter()
        .map(|p| p.contents(ctx).unwrap().concat())
        .collect()
}

#[test]
fn test_encrypt_then_decrypt_restores_content() {
    let plain = pages_document(&[100, 200]);
    let expected = page_texts(&mut open(&plain));
    for alg in ALGORITHMS {
        let encrypted = encrypt(plain.clone(), alg, PermissionsSpec::All);
        assert!(
            !encrypted.windows(6).any(|w| w == b"Tj ET"),
            "{alg:?} left content in the clear"
        );
        assert_eq!(page_texts(&mut open_with(&encrypted, b"upw", b"")), expected, "{alg:?}");

        let conf = config(Command::Decrypt).with_passwords(b"", b"opw");
        let decrypted = document(process([encrypted], &Params::default(), &conf).unwrap());
        let mut ctx = open(&decrypted);
        assert!(!ctx.is_encrypted());
        assert!(ctx.trailer.get("Encrypt").is_none());
        assert_eq!(page_texts(&mut ctx), expected, "{alg:?}");
    }
}

#[test]
fn test_wrong_password_rejected() {
    let encrypted = encrypt(pages_document(&[100]), EncryptAlgorithm::Aes128, PermissionsSpec::All);
    let conf = Configuration::default().with_passwords(b"nope", b"nope");
    assert!(matches!(Context::from_bytes(encrypted.clone(), conf), Err(PdfError::Auth)));

    let listing = config(Command::ListPermissions).with_passwords(b"nope", b"");
    let Output::Listing(lines) = process([encrypted], &Params::default(), &listing).unwrap() else {
        panic!("expected a listing");
    };
    assert!(lines[0].starts_with("permission bits:"));
}

#[test]
fn test_user_cannot_decrypt() {
    let encrypted = encrypt(pages_document(&[100]), EncryptAlgorithm::Aes256, PermissionsSpec::All);
    let conf = config(Command::Decrypt).with_passwords(b"upw", b"");
    let result = process([encrypted], &Params::default(), &conf);
    assert!(matches!(result, Err(PdfError::Auth)));
}

#[test]
fn test_change_user_password() {
    for alg in [EncryptAlgorithm::Rc4_128, EncryptAlgorithm::Aes256] {
        let encrypted = encrypt(pages_document(&[100]), alg, PermissionsSpec::All);
        let conf = config(Command::ChangeUserPw).with_passwords(b"upw", b"opw");
        let params = Params {
            new_password: b"fresh".to_vec(),
            ..Params::default()
        };
        let changed = document(process([encrypted], &params, &conf).unwrap());

        let stale = Configuration::default().with_passwords(b"upw", b"");
        assert!(matches!(Context::from_bytes(changed.clone(), stale), Err(PdfError::Auth)));
        let ctx = open_with(&changed, b"fresh", b"");
        assert!(ctx.is_encrypted());
        open_with(&changed, b"", b"opw");
    }
}

#[test]
fn test_change_owner_password() {
    let encrypted = encrypt(pages_document(&[100]), EncryptAlgorithm::Aes128, PermissionsSpec::All);
    let conf = config(Command::ChangeOwnerPw).with_passwords(b"upw", b"opw");
    let params = Params {
        new_password: b"boss".to_vec(),
        ..Params::default()
    };
    let changed = document(process([encrypted], &params, &conf).unwrap());
    let stale = Configuration::default().with_passwords(b"", b"opw");
    assert!(matches!(Context::from_bytes(changed.clone(), stale), Err(PdfError::Auth)));
    open_with(&changed, b"", b"boss");
}

#[test]
fn test_revision_2_permissions_follow_base_bits() {
    let p = -3904 | (1 << 2);
    let encrypted = encrypt(pages_document(&[100]), EncryptAlgorithm::Rc4_40, PermissionsSpec::Bits(p));
    let perms = open_with(&encrypted, b"upw", b"").permissions().unwrap();
    assert_eq!(perms.revision, 2);
    assert!(perms.allows(Permission::Print));
    assert!(perms.allows(Permission::PrintHighQuality));
    assert!(!perms.allows(Permission::Extract));
}

#[test]
fn test_command_requirements() {
    assert_eq!(
        requirement(Command::ExtractImages),
        Requirement::Permission(Permission::Extract)
    );
    assert_eq!(
        requirement(Command::MergeAppend),
        Requirement::Permission(Permission::Assemble)
    );
    assert_eq!(
        requirement(Command::AddAttachments),
        Requirement::Permission(Permission::Modify)
    );
    assert_eq!(requirement(Command::ChangeOwnerPw), Requirement::Owner);
    assert_eq!(requirement(Command::Validate), Requirement::Nothing);
}

#[test]
fn test_user_permission_matrix() {
    let print_only = -3904 | (1 << 2);
    let encrypted = encrypt(
        pages_document(&[100, 200]),
        EncryptAlgorithm::Aes256,
        PermissionsSpec::Bits(print_only),
    );
    for command in [Command::Trim, Command::ExtractContent, Command::AddAttachments] {
        let conf = config(command).with_passwords(b"upw", b"");
        let result = process([encrypted.clone()], &Params::default(), &conf);
        assert!(matches!(result, Err(PdfError::Permission(_))), "{command:?}");
    }
    for command in [Command::Validate, Command::ListAttachments, Command::Optimize] {
        let conf = config(command).with_passwords(b"upw", b"");
        assert!(process([encrypted.clone()], &Params::default(), &conf).is_ok(), "{command:?}");
    }
}
