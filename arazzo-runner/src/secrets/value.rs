use std::sync::Arc;

use zeroize::Zeroizing;

/// Credential material that never prints and is zeroized on drop.
#[derive(Clone)]
pub struct SecretValue(Arc<Zeroizing<Vec<u8>>>);

impl SecretValue {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(Arc::new(Zeroizing::new(bytes)))
    }

    pub fn from_string(s: String) -> Self {
        Self::from_bytes(s.into_bytes())
    }

    pub fn expose_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// The secret as text. Non UTF-8 material yields `None`.
    pub fn expose_str(&self) -> Option<&str> {
        std::str::from_utf8(self.expose_bytes()).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for SecretValue {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretValue(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_is_redacted() {
        let s = SecretValue::from_string("hunter2".into());
        assert_eq!(format!("{s:?}"), "SecretValue(<redacted>)");
        assert_eq!(s.expose_str(), Some("hunter2"));
    }
}
