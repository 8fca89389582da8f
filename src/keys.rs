//! Key path normalization.
//!
//! Callers address values with hierarchical paths such as
//! `["users", "42", "profile"]`. Every path is folded into one canonical key
//! (`users:42:profile`) so that the same logical path always hits the same
//! store key, and so that keys never contain glob meta-characters that would
//! turn a literal lookup into a pattern.

use crate::error::{Error, Result};

/// Separator placed between path segments
pub const KEY_SEPARATOR: char = ':';

/// Largest key the store accepts (512 MiB)
pub const MAX_KEY_SIZE: usize = 512 * 1024 * 1024;

/// Joins `segments` with `:` and canonicalizes the result.
///
/// Fails with [`Error::InvalidKeyPath`] when the path is empty, a segment is
/// empty, or nothing is left after normalization, and with
/// [`Error::KeySizeExceeded`] when the key is over [`MAX_KEY_SIZE`].
///
/// ```
/// use redisgk::keys::normalize_key_path;
///
/// let key = normalize_key_path(&["User Profile", "Name!"]).unwrap();
/// assert_eq!(key, "user_profile:name");
/// ```
pub fn normalize_key_path<S: AsRef<str>>(segments: &[S]) -> Result<String> {
    if segments.is_empty() {
        return Err(Error::InvalidKeyPath("key path is empty".to_string()));
    }

    if let Some(index) = segments.iter().position(|s| s.as_ref().is_empty()) {
        return Err(Error::InvalidKeyPath(format!(
            "segment {} of key path is empty",
            index
        )));
    }

    let joined = segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(":");

    let key = normalize_key(&joined);
    if key.is_empty() {
        return Err(Error::InvalidKeyPath(format!(
            "key path {:?} is empty after normalization",
            joined
        )));
    }

    check_key_size(&key)?;
    Ok(key)
}

/// Canonicalizes an already joined key.
///
/// Lower-cases, drops every character that is not alphanumeric, `_`, `-`,
/// `:` or a space (this removes the glob meta-characters `* ? [ ] .`),
/// collapses runs of `:`, turns spaces into `_` and trims `:` from both ends.
/// The function is idempotent.
pub fn normalize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());

    for c in key.chars().flat_map(char::to_lowercase) {
        match c {
            KEY_SEPARATOR => {
                if !out.ends_with(KEY_SEPARATOR) {
                    out.push(KEY_SEPARATOR);
                }
            }
            ' ' => out.push('_'),
            '_' | '-' => out.push(c),
            c if c.is_alphanumeric() => out.push(c),
            _ => {}
        }
    }

    out.trim_matches(KEY_SEPARATOR).to_string()
}

/// Rejects keys over the store's size ceiling.
pub(crate) fn check_key_size(key: &str) -> Result<()> {
    if key.len() > MAX_KEY_SIZE {
        return Err(Error::KeySizeExceeded {
            size: key.len(),
            max: MAX_KEY_SIZE,
        });
    }
    Ok(())
}
