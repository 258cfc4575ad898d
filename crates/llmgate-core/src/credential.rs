/// Outbound credential header for the configured upstream variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCredential {
    pub header_name: &'static str,
    pub value: String,
}

/// Maps the inbound `Authorization` value onto the upstream scheme.
///
/// Default provider: pass the value through under `authorization`. Azure:
/// the key goes under `api-key` with the bearer prefix stripped. An absent
/// credential yields an empty value which is forwarded as-is; rejecting it
/// is the upstream's job.
pub fn translate_credential(inbound: Option<&str>, azure: bool) -> OutboundCredential {
    let inbound = inbound.unwrap_or_default();
    if azure {
        OutboundCredential {
            header_name: "api-key",
            value: inbound.trim().replace("Bearer", "").trim().to_string(),
        }
    } else {
        OutboundCredential {
            header_name: "authorization",
            value: inbound.to_string(),
        }
    }
}
