//! Wire format of the L402 HTTP headers.

use crate::token::Macaroon;

/// Authorization scheme name.
pub const L402_SCHEME: &str = "L402";

/// Parsed `Authorization: L402 <macaroon>:<preimage>` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L402Authorization {
    pub macaroon: Macaroon,
    pub preimage: String,
}

/// Parse the L402 authorization header value.
///
/// Returns `None` for a missing scheme or a value that is not exactly
/// `macaroon:preimage`, in which case the gate issues a fresh challenge.
pub fn parse_authorization(header: &str) -> Option<L402Authorization> {
    let rest = header.strip_prefix(L402_SCHEME)?.strip_prefix(' ')?;
    let (macaroon, preimage) = rest.split_once(':')?;
    if macaroon.is_empty() || preimage.is_empty() || preimage.contains(':') {
        return None;
    }
    Some(L402Authorization {
        macaroon: Macaroon(macaroon.to_string()),
        preimage: preimage.to_string(),
    })
}

/// Render the `WWW-Authenticate` challenge value for a 402 response.
pub fn www_authenticate(macaroon: &Macaroon, invoice: &str) -> String {
    format!("{L402_SCHEME} macaroon=\"{macaroon}\", invoice=\"{invoice}\"")
}

/// Render the retry `Authorization` value a client sends after settlement.
pub fn authorization(macaroon: &Macaroon, preimage_hex: &str) -> String {
    format!("{L402_SCHEME} {macaroon}:{preimage_hex}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_header() {
        let parsed = parse_authorization("L402 dG9rZW4=:00ff").unwrap();
        assert_eq!(parsed.macaroon.0, "dG9rZW4=");
        assert_eq!(parsed.preimage, "00ff");
    }

    #[test]
    fn rejects_other_schemes_and_shapes() {
        assert!(parse_authorization("Bearer abc").is_none());
        assert!(parse_authorization("L402 onlyonepart").is_none());
        assert!(parse_authorization("L402 a:b:c").is_none());
        assert!(parse_authorization("L402 :preimage").is_none());
    }

    #[test]
    fn authorization_roundtrips_through_parse() {
        let macaroon = Macaroon("dG9rZW4=".to_string());
        let value = authorization(&macaroon, "00ff");
        let parsed = parse_authorization(&value).unwrap();
        assert_eq!(parsed.macaroon, macaroon);
        assert_eq!(parsed.preimage, "00ff");
    }

    #[test]
    fn challenge_header_shape() {
        let macaroon = Macaroon("bWFj".to_string());
        assert_eq!(
            www_authenticate(&macaroon, "lnbc1..."),
            "L402 macaroon=\"bWFj\", invoice=\"lnbc1...\""
        );
    }
}
