//! Unverified decoding of JWT-shaped strings for display.
//!
//! Nothing here checks signatures, expiry or issuer. Claims produced by
//! [`parse_unverified`] must not be used for authorization decisions.

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::TokenError;

/// JSON object of claims or header parameters.
pub type Claims = Map<String, Value>;

/// A decoded, unverified token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParsedToken {
    pub raw: String,
    /// Signing algorithm named by the header.
    pub method: Algorithm,
    pub header: Claims,
    pub claims: Claims,
    /// Decoded signature bytes, shown as standard base64.
    #[serde(serialize_with = "as_base64")]
    pub signature: Vec<u8>,
    /// Always false: the signature is never checked.
    pub valid: bool,
}

impl ParsedToken {
    /// The `alg` header parameter.
    pub fn algorithm(&self) -> Algorithm {
        self.method
    }

    /// Look up a single claim.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }
}

/// Decode a token's header, claims and signature without verifying it.
pub fn parse_unverified(token: &str) -> Result<ParsedToken, TokenError> {
    let header = decode_header(token).map_err(TokenError::Header)?;

    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(TokenError::Claims)?;

    let signature = token
        .rsplit('.')
        .next()
        .map(|segment| URL_SAFE_NO_PAD.decode(segment))
        .transpose()
        .map_err(|_| TokenError::Signature)?
        .unwrap_or_default();

    let header_fields = match serde_json::to_value(&data.header) {
        Ok(Value::Object(map)) => map,
        _ => Claims::new(),
    };

    Ok(ParsedToken {
        raw: token.to_string(),
        method: data.header.alg,
        header: header_fields,
        claims: data.claims,
        signature,
        valid: false,
    })
}

fn as_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}
