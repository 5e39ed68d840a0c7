//! Identifier classification.

/// Which default policy an identifier falls under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    Token,
    IpAddress,
}

/// Classify an identifier by its characters.
///
/// Anything made only of ASCII letters and digits is a token, including the
/// empty string. Any other character (`.`, `:` and so on) marks an IP
/// address. This only picks a default policy; it does not validate addresses.
pub fn classify(identifier: &str) -> IdentifierKind {
    if identifier.bytes().all(|b| b.is_ascii_alphanumeric()) {
        IdentifierKind::Token
    } else {
        IdentifierKind::IpAddress
    }
}
