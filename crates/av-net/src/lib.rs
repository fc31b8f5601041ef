//! Addressing contracts: archive paths, the virtual base they live under,
//! and the collaborator that fetches bytes from outside the archive.

pub mod fetch;
pub mod path;

pub use fetch::ExternalFetcher;
pub use fetch::FetchedBytes;
pub use fetch::OfflineFetcher;
pub use fetch::StaticFetcher;
pub use fetch::validate_fetch_url;
pub use path::ArchivePath;
pub use path::DEFAULT_VIRTUAL_BASE;
pub use path::VirtualBase;
pub use url::Url;
