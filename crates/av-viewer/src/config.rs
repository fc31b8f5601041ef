use av_core::ViewerResult;
use av_net::VirtualBase;
use av_security::HostPolicy;

/// Stylesheet linked into every rewritten HTML/XHTML document.
pub const DEFAULT_RESET_STYLESHEET: &str = "html {\n  -webkit-text-size-adjust: 100%;\n  text-size-adjust: 100%;\n}\n";

/// Viewer-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerConfig {
    pub virtual_base: VirtualBase,
    pub policy: HostPolicy,
    /// Empty disables the reset stylesheet link.
    pub reset_stylesheet: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            virtual_base: VirtualBase::default(),
            policy: HostPolicy::default(),
            reset_stylesheet: DEFAULT_RESET_STYLESHEET.to_owned(),
        }
    }
}

impl ViewerConfig {
    pub fn validate(&self) -> ViewerResult<()> {
        self.virtual_base.validate()?;
        self.policy.validate()
    }
}
