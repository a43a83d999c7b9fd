//! Operations on whole documents: page edits, copying, attachments and
//! security changes.

pub mod attach;
pub mod copy;
pub mod pages;
pub mod security;

pub use attach::{Attachment, AttachmentInfo, add_attachment, extract_attachments, list_attachments, remove_attachments};
pub use copy::{Copier, collect, extract_each_page, extract_pages};
pub use pages::{insert_pages, merge, remove_pages, rotate, split, trim};
pub use security::{
    PermissionListing, change_owner_password, change_user_password, decrypt, encrypt, list_permissions,
    set_permissions,
};
