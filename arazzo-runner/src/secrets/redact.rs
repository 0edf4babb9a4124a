use std::collections::BTreeMap;

const REDACTED: &str = "<redacted>";

#[derive(Debug, Clone)]
pub struct RedactionPolicy {
    pub redact_authorization: bool,
    pub redact_cookie: bool,
    pub redact_set_cookie: bool,
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self {
            redact_authorization: true,
            redact_cookie: true,
            redact_set_cookie: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedactedHeaders {
    pub headers: BTreeMap<String, String>,
}

/// Copy of `headers` safe to log. `credential_header_names` lists headers
/// that carry injected credentials (api keys, custom schemes).
pub fn redact_headers(
    headers: &BTreeMap<String, String>,
    policy: &RedactionPolicy,
    credential_header_names: &[String],
) -> RedactedHeaders {
    let mut out = headers.clone();

    if policy.redact_authorization {
        mask(&mut out, "authorization");
    }
    if policy.redact_cookie {
        mask(&mut out, "cookie");
    }
    if policy.redact_set_cookie {
        mask(&mut out, "set-cookie");
    }
    for name in credential_header_names {
        mask(&mut out, name);
    }

    RedactedHeaders { headers: out }
}

fn mask(map: &mut BTreeMap<String, String>, header: &str) {
    for (k, v) in map.iter_mut() {
        if k.eq_ignore_ascii_case(header) {
            *v = REDACTED.to_string();
        }
    }
}
