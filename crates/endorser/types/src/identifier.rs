//! Party identifiers and the hidden sentinel.

/// Substituted for any identifier a viewer may not see.
pub const HIDDEN_SENTINEL: &str = "did:none:HIDDEN";

/// `did:<method>:<rest>` with an alphanumeric method and a non-empty rest.
pub fn is_identifier_shaped(text: &str) -> bool {
    let Some(rest) = text.strip_prefix("did:") else {
        return false;
    };
    let Some((method, tail)) = rest.split_once(':') else {
        return false;
    };
    !method.is_empty() && method.bytes().all(|b| b.is_ascii_alphanumeric()) && !tail.is_empty()
}

/// True for the sentinel itself and for indexed key sentinels.
pub fn is_hidden_sentinel(text: &str) -> bool {
    text.starts_with(HIDDEN_SENTINEL)
}

/// Replacement for a hidden mapping key at `position`; keys must stay unique.
pub fn hidden_key(position: usize) -> String {
    format!("{HIDDEN_SENTINEL}_{position}")
}

/// Replace every identifier-shaped token in free text with the sentinel.
/// Used for text that is stored and later shown to arbitrary viewers.
pub fn mask_identifiers(text: &str) -> String {
    let mut masked = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("did:") {
        let (before, candidate) = rest.split_at(start);
        masked.push_str(before);
        let end = candidate
            .find(|c: char| c.is_whitespace() || "'\",;()[]{}<>".contains(c))
            .unwrap_or(candidate.len());
        let (token, after) = candidate.split_at(end);
        if is_identifier_shaped(token) {
            masked.push_str(HIDDEN_SENTINEL);
        } else {
            masked.push_str(token);
        }
        rest = after;
    }
    masked.push_str(rest);
    masked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_identifier_shape() {
        assert!(is_identifier_shaped(
            "did:ethr:0x00000000C0293c8cA34Dac9BCC0F953532D34e4d"
        ));
        assert!(is_identifier_shaped("did:peer:0zQm"));
        assert!(!is_identifier_shaped("did:ethr:"));
        assert!(!is_identifier_shaped("did::abc"));
        assert!(!is_identifier_shaped("did:web-x:abc"));
        assert!(!is_identifier_shaped("https://endorser.ch/entity/claim-1"));
        assert!(!is_identifier_shaped("diddly:do:dah"));
    }

    #[test]
    fn sentinel_is_identifier_shaped_and_recognized() {
        assert!(is_identifier_shaped(HIDDEN_SENTINEL));
        assert!(is_hidden_sentinel(HIDDEN_SENTINEL));
        assert!(is_hidden_sentinel(&hidden_key(2)));
        assert_eq!(hidden_key(2), "did:none:HIDDEN_2");
        assert!(!is_hidden_sentinel("did:none:VISIBLE"));
    }

    #[test]
    fn masks_identifiers_in_text() {
        let x = "did:ethr:0x1111111111111111111111111111111111111111";
        assert_eq!(
            mask_identifiers(&format!("handle '{x}' is taken by {x}")),
            format!("handle '{HIDDEN_SENTINEL}' is taken by {HIDDEN_SENTINEL}")
        );
        assert_eq!(mask_identifiers("did: nothing here"), "did: nothing here");
        assert_eq!(mask_identifiers("plain text"), "plain text");
    }
}
