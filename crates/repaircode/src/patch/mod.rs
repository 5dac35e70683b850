//! Deterministic patch application and archive rebuild.

pub mod apply;
pub mod archive;

pub use apply::apply_patch;
pub use archive::{
    build_archive, read_archive, read_zip, rebuild_entries, render_archive, text_files,
    write_archive, write_zip, RebuiltArchive, RebuiltEntries,
};
