pub mod archive;
pub mod layout;
pub mod lock;

pub use archive::{
    extract_archive, extract_archive_blocking, flatten_directory, mark_executable, ArchiveKind,
};
pub use layout::InstallLayout;
pub use lock::InstallLease;
