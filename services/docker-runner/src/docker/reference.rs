//! Image reference parsing.

/// Split an image reference into repository and tag.
///
/// A digest suffix (`@sha256:...`) is dropped. The last `:` only separates a
/// tag when no `/` follows it, so a registry port (`host:5000/img`) stays part
/// of the repository. The tag is empty when the reference has none.
pub fn parse_repository_tag(reference: &str) -> (&str, &str) {
    let reference = reference
        .split_once('@')
        .map_or(reference, |(name, _digest)| name);

    match reference.rsplit_once(':') {
        Some((repository, tag)) if !tag.contains('/') => (repository, tag),
        _ => (reference, ""),
    }
}
