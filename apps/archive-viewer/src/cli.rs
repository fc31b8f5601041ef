use av_core::ViewerResult;
use av_net::VirtualBase;
use av_security::HostPolicy;
use av_viewer::ViewerConfig;
use clap::Parser;
use std::path::PathBuf;

/// Rewrites an unpacked web archive so it renders entirely from local
/// locators, and writes the root document.
#[derive(Parser, Debug)]
#[command(name = "archive-viewer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the unpacked archive
    pub archive: PathBuf,

    /// Archive path of the root document
    #[arg(long, default_value = "index.html")]
    pub index: String,

    /// Fragment to open the root document at
    #[arg(long)]
    pub fragment: Option<String>,

    /// Write the rewritten root document here instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Print the locator manifest after rewriting
    #[arg(long)]
    pub manifest: bool,

    /// Virtual base the archive is mounted under
    #[arg(long)]
    pub virtual_base: Option<String>,

    /// Let `<script src>` load from outside the archive
    #[arg(long)]
    pub allow_external_scripts: bool,

    /// Move inline script text behind locators
    #[arg(long)]
    pub disallow_inline_scripts: bool,

    /// Do not insert the privileged API sanitizer
    #[arg(long)]
    pub keep_privileged_apis: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    pub fn viewer_config(&self) -> ViewerResult<ViewerConfig> {
        let virtual_base = match self.virtual_base.as_deref() {
            Some(base) => VirtualBase::parse(base)?,
            None => VirtualBase::default(),
        };
        let policy = HostPolicy {
            allow_inline_scripts: !self.disallow_inline_scripts,
            allow_external_scripts: self.allow_external_scripts,
            remove_privileged_apis: !self.keep_privileged_apis,
            ..HostPolicy::default()
        };

        let config = ViewerConfig {
            virtual_base,
            policy,
            ..ViewerConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}
