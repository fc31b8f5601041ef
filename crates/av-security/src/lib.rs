//! Host policy: what the embedding viewer lets archived content do.

use av_core::ViewerError;
use av_core::ViewerResult;

/// Capabilities the host grants to archived content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPolicy {
    /// Inline `<script>` text may run in place.
    pub allow_inline_scripts: bool,
    /// `<script src>` may load from outside the archive.
    pub allow_external_scripts: bool,
    /// `embed`/`object`/`applet` may load bytes from outside the archive.
    pub allow_external_plugin_bytes: bool,
    /// Documents get the privileged API sanitizer script.
    pub remove_privileged_apis: bool,
}

impl Default for HostPolicy {
    fn default() -> Self {
        Self {
            allow_inline_scripts: true,
            allow_external_scripts: false,
            allow_external_plugin_bytes: false,
            remove_privileged_apis: true,
        }
    }
}

impl HostPolicy {
    pub fn validate(&self) -> ViewerResult<()> {
        if self.allow_external_scripts && !self.remove_privileged_apis {
            return Err(ViewerError::new(
                "security.invalid_policy",
                "external scripts require privileged API removal",
            ));
        }

        Ok(())
    }

    /// External script sources must be copied into locators.
    pub fn localize_external_scripts(&self) -> bool {
        !self.allow_external_scripts
    }

    /// Inline script text must be moved behind a locator.
    pub fn localize_inline_scripts(&self) -> bool {
        !self.allow_inline_scripts
    }

    pub fn localize_plugin_bytes(&self) -> bool {
        !self.allow_external_plugin_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::HostPolicy;

    #[test]
    fn default_policy_is_valid_and_strict() {
        let policy = HostPolicy::default();
        assert!(policy.validate().is_ok());
        assert!(policy.localize_external_scripts());
        assert!(!policy.localize_inline_scripts());
        assert!(policy.localize_plugin_bytes());
    }

    #[test]
    fn external_scripts_need_sanitizer() {
        let policy = HostPolicy {
            allow_external_scripts: true,
            remove_privileged_apis: false,
            ..HostPolicy::default()
        };
        let validated = policy.validate();
        assert!(validated.is_err());
        if let Err(error) = validated {
            assert_eq!(error.code, "security.invalid_policy");
        }
    }
}
