use crate::crypto::CryptoProvider;

/// Signs the query payload of an event.
///
/// ```text
/// inner    = md5(query)                          without payload
///          = md5(md5(query) ++ md5(payload))     with payload
/// checksum = md5(inner ++ signing_key)
/// ```
pub(super) fn compute(
    query: &str,
    payload: Option<&[u8]>,
    signing_key: &str,
    crypto: &dyn CryptoProvider,
) -> String {
    let query_digest = crypto.md5_hex(query.as_bytes().to_vec());
    let inner = match payload {
        None => query_digest,
        Some(payload) => {
            let payload_digest = crypto.md5_hex(payload.to_vec());
            crypto.md5_hex(format!("{query_digest}{payload_digest}").into_bytes())
        }
    };
    crypto.md5_hex(format!("{inner}{signing_key}").into_bytes())
}
