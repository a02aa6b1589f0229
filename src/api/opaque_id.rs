use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;

pub const PRODUCT_NAMESPACE: &str = "catalog/product";
pub const SHOP_NAMESPACE: &str = "catalog/shop";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpaqueIdError {
    #[error("'{0}' is not a valid opaque id")]
    Malformed(String),

    #[error("expected a {expected} id, got a {found} id")]
    WrongNamespace { expected: &'static str, found: String },
}

/// Public ids are base64 of `<namespace>:<internal id>`
pub fn encode(namespace: &str, id: &str) -> String {
    BASE64.encode(format!("{}:{}", namespace, id))
}

pub fn decode(namespace: &'static str, opaque: &str) -> Result<String, OpaqueIdError> {
    let malformed = || OpaqueIdError::Malformed(opaque.to_string());

    let bytes = BASE64.decode(opaque.trim()).map_err(|_| malformed())?;
    let text = String::from_utf8(bytes).map_err(|_| malformed())?;
    let (found, id) = text.split_once(':').ok_or_else(malformed)?;

    if found != namespace {
        return Err(OpaqueIdError::WrongNamespace { expected: namespace, found: found.to_string() });
    }
    if id.is_empty() {
        return Err(malformed());
    }
    Ok(id.to_string())
}

pub fn encode_product_id(id: &str) -> String {
    encode(PRODUCT_NAMESPACE, id)
}

pub fn decode_product_id(opaque: &str) -> Result<String, OpaqueIdError> {
    decode(PRODUCT_NAMESPACE, opaque)
}

pub fn encode_shop_id(id: &str) -> String {
    encode(SHOP_NAMESPACE, id)
}

pub fn decode_shop_id(opaque: &str) -> Result<String, OpaqueIdError> {
    decode(SHOP_NAMESPACE, opaque)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_id_round_trip() {
        let opaque = encode_product_id("p1:with-colon");
        assert_eq!(opaque, BASE64.encode("catalog/product:p1:with-colon"));
        assert_eq!(decode_product_id(&opaque).unwrap(), "p1:with-colon");
    }

    #[test]
    fn rejects_wrong_namespace_and_garbage() {
        let shop = encode_shop_id("s1");
        assert!(matches!(decode_product_id(&shop), Err(OpaqueIdError::WrongNamespace { .. })));
        assert!(matches!(decode_product_id("%%%"), Err(OpaqueIdError::Malformed(_))));
        assert!(matches!(decode_product_id(&BASE64.encode("no-separator")), Err(OpaqueIdError::Malformed(_))));
        assert!(matches!(decode_shop_id(&BASE64.encode("catalog/shop:")), Err(OpaqueIdError::Malformed(_))));
    }
}
