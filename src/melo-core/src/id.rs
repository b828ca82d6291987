/// Returns `true` if `id` is usable as a registry identifier.
///
/// Identifiers are made of lowercase ASCII letters, digits and `.`, `-`, `_`,
/// typically a reversed domain name such as `com.sparod.file.player`.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'_'))
}
