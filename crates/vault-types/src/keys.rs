//! Object key formats and the classifier that turns a key back into an
//! upload intent.
//!
//! The formats are part of the storage contract and must stay bit-exact:
//!
//! - `attachments/{noteId}/{filename}`
//! - `avatars/{userId}`

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

pub const ATTACHMENTS_PREFIX: &str = "attachments";
pub const AVATARS_PREFIX: &str = "avatars";

pub fn attachment_key(note_id: Uuid, filename: &str) -> String {
    format!("{ATTACHMENTS_PREFIX}/{note_id}/{filename}")
}

pub fn avatar_key(user_id: Uuid) -> String {
    format!("{AVATARS_PREFIX}/{user_id}")
}

/// A filename is usable in an attachment key when it is exactly one
/// non-empty path segment.
pub fn is_valid_filename(filename: &str) -> bool {
    !filename.is_empty() && filename != "." && filename != ".." && !filename.contains('/')
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyDecodeError {
    #[error("malformed percent escape at byte {0}")]
    MalformedEscape(usize),
    #[error("decoded key is not valid UTF-8")]
    InvalidUtf8,
}

/// Decode a key the way storage notifications deliver it: form-encoded,
/// so `+` stands for a space and `%XX` for an escaped byte.
pub fn decode_event_key(raw: &str) -> Result<String, KeyDecodeError> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escaped = bytes.get(i + 1..i + 3).filter(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if escaped.is_none() {
                return Err(KeyDecodeError::MalformedEscape(i));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|key| key.into_owned())
        .map_err(|_| KeyDecodeError::InvalidUtf8)
}

/// Inverse of [`decode_event_key`], used when this service publishes its own
/// notifications.
pub fn encode_event_key(key: &str) -> String {
    urlencoding::encode(key).into_owned()
}

/// What an uploaded object is for, derived purely from its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadIntent {
    Attachment { note_id: Uuid, filename: String },
    Avatar { user_id: Uuid },
    Unrecognized(Unrecognized),
}

/// Why a key did not classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unrecognized {
    UnknownPrefix,
    SegmentCount { expected: usize, found: usize },
    InvalidId,
    EmptyFilename,
    InvalidFilename,
}

impl fmt::Display for Unrecognized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unrecognized::UnknownPrefix => write!(f, "unrecognized upload type"),
            Unrecognized::SegmentCount { expected, found } => {
                write!(f, "expected {expected} key segments, found {found}")
            }
            Unrecognized::InvalidId => write!(f, "key does not carry a valid id"),
            Unrecognized::EmptyFilename => write!(f, "attachment key has an empty filename"),
            Unrecognized::InvalidFilename => write!(f, "attachment filename is not a usable path segment"),
        }
    }
}

/// Classify an already-decoded object key.
pub fn classify(key: &str) -> UploadIntent {
    let parts: Vec<&str> = key.split('/').collect();

    match parts[0] {
        ATTACHMENTS_PREFIX => {
            if parts.len() != 3 {
                return UploadIntent::Unrecognized(Unrecognized::SegmentCount {
                    expected: 3,
                    found: parts.len(),
                });
            }
            let Ok(note_id) = Uuid::parse_str(parts[1]) else {
                return UploadIntent::Unrecognized(Unrecognized::InvalidId);
            };
            if parts[2].is_empty() {
                return UploadIntent::Unrecognized(Unrecognized::EmptyFilename);
            }
            if !is_valid_filename(parts[2]) {
                return UploadIntent::Unrecognized(Unrecognized::InvalidFilename);
            }
            UploadIntent::Attachment {
                note_id,
                filename: parts[2].to_string(),
            }
        }
        AVATARS_PREFIX => {
            if parts.len() != 2 {
                return UploadIntent::Unrecognized(Unrecognized::SegmentCount {
                    expected: 2,
                    found: parts.len(),
                });
            }
            match Uuid::parse_str(parts[1]) {
                Ok(user_id) => UploadIntent::Avatar { user_id },
                Err(_) => UploadIntent::Unrecognized(Unrecognized::InvalidId),
            }
        }
        _ => UploadIntent::Unrecognized(Unrecognized::UnknownPrefix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produced_keys_classify_back() {
        let note_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        assert_eq!(
            classify(&attachment_key(note_id, "report.pdf")),
            UploadIntent::Attachment {
                note_id,
                filename: "report.pdf".into()
            }
        );
        assert_eq!(classify(&avatar_key(user_id)), UploadIntent::Avatar { user_id });
    }

    #[test]
    fn key_formats_are_exact() {
        let id = Uuid::parse_str("123e4567-e89b-12d3-a456-426614174000").unwrap();
        assert_eq!(
            attachment_key(id, "a.txt"),
            "attachments/123e4567-e89b-12d3-a456-426614174000/a.txt"
        );
        assert_eq!(avatar_key(id), "avatars/123e4567-e89b-12d3-a456-426614174000");
    }

    #[test]
    fn wrong_segment_counts_are_unrecognized() {
        let id = Uuid::new_v4();
        assert_eq!(
            classify(&format!("attachments/{id}")),
            UploadIntent::Unrecognized(Unrecognized::SegmentCount { expected: 3, found: 2 })
        );
        assert_eq!(
            classify(&format!("attachments/{id}/nested/file.txt")),
            UploadIntent::Unrecognized(Unrecognized::SegmentCount { expected: 3, found: 4 })
        );
        assert_eq!(
            classify(&format!("avatars/{id}/extra")),
            UploadIntent::Unrecognized(Unrecognized::SegmentCount { expected: 2, found: 3 })
        );
    }

    #[test]
    fn bad_ids_and_prefixes_are_unrecognized() {
        assert_eq!(
            classify("attachments/not-a-uuid/file.txt"),
            UploadIntent::Unrecognized(Unrecognized::InvalidId)
        );
        assert_eq!(classify("avatars/42"), UploadIntent::Unrecognized(Unrecognized::InvalidId));
        assert_eq!(classify("thumbnails/x"), UploadIntent::Unrecognized(Unrecognized::UnknownPrefix));
        assert_eq!(classify(""), UploadIntent::Unrecognized(Unrecognized::UnknownPrefix));
        assert_eq!(
            classify(&format!("attachments/{}/", Uuid::new_v4())),
            UploadIntent::Unrecognized(Unrecognized::EmptyFilename)
        );
    }

    #[test]
    fn dot_filenames_are_unrecognized() {
        let id = Uuid::new_v4();
        for name in [".", ".."] {
            assert!(!is_valid_filename(name));
            assert_eq!(
                classify(&format!("attachments/{id}/{name}")),
                UploadIntent::Unrecognized(Unrecognized::InvalidFilename)
            );
        }
        assert!(matches!(classify(&format!("attachments/{id}/.hidden")), UploadIntent::Attachment { .. }));
    }

    #[test]
    fn decodes_form_encoded_keys() {
        assert_eq!(
            decode_event_key("attachments/abc/my+file%281%29.pdf").unwrap(),
            "attachments/abc/my file(1).pdf"
        );
        assert_eq!(decode_event_key("a%2Bb").unwrap(), "a+b");
        assert_eq!(decode_event_key("avatars%2Fx").unwrap(), "avatars/x");
    }

    #[test]
    fn rejects_malformed_escapes() {
        assert_eq!(decode_event_key("bad%zzkey"), Err(KeyDecodeError::MalformedEscape(3)));
        assert_eq!(decode_event_key("trailing%4"), Err(KeyDecodeError::MalformedEscape(8)));
        assert_eq!(decode_event_key("%ff%fe"), Err(KeyDecodeError::InvalidUtf8));
    }

    #[test]
    fn encoding_round_trips_awkward_names() {
        let key = "attachments/n/quarterly report + notes.pdf";
        assert_eq!(decode_event_key(&encode_event_key(key)).unwrap(), key);
    }

    #[test]
    fn filename_validation() {
        assert!(is_valid_filename("report.pdf"));
        assert!(!is_valid_filename(""));
        assert!(!is_valid_filename(".."));
        assert!(!is_valid_filename("a/b"));
    }
}
