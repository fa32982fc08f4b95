pub mod archive;
pub mod artifact;
pub mod cleanup;
pub mod collection;
pub mod config;
pub mod error;
pub mod layout;
pub mod migrate;
pub mod platform;
pub mod provider;
pub mod runtime;
pub mod version;

pub use archive::{BsdtarUnpacker, Unpacker};
pub use artifact::{BoxArtifact, BoxMetadata};
pub use collection::{AddOptions, BoxCollection, BoxEntry, MetadataUrlHook};
pub use config::CollectionConfig;
pub use error::{BoxError, Result};
pub use platform::ArchSelector;
pub use provider::ProviderId;
pub use version::{Version, VersionRequirement};
