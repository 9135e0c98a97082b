//! Default output names for archives and restored files.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Extension given to parallel archives.
pub const ARCHIVE_EXT: &str = "plzo";

/// Suffix appended to the stem of a file restored from an archive.
pub const RESTORED_SUFFIX: &str = "_dp";

/// `notes.txt` -> `notes.plzo`, `book1` -> `book1.plzo`.
pub fn archive_name_for(input: &Path) -> PathBuf {
    input.with_extension(ARCHIVE_EXT)
}

/// `notes.plzo` -> `notes_dp`, `book1` -> `book1_dp`.
pub fn restored_name_for(archive: &Path) -> PathBuf {
    let stem = archive
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| OsString::from("output"));
    let mut name = stem;
    name.push(RESTORED_SUFFIX);
    archive.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_is_replaced_or_added() {
        assert_eq!(archive_name_for(Path::new("paper1")), PathBuf::from("paper1.plzo"));
        assert_eq!(archive_name_for(Path::new("dir/news.txt")), PathBuf::from("dir/news.plzo"));
        assert_eq!(archive_name_for(Path::new("a.b.c")), PathBuf::from("a.b.plzo"));
    }

    #[test]
    fn test_restored_name_drops_extension() {
        assert_eq!(restored_name_for(Path::new("paper1.plzo")), PathBuf::from("paper1_dp"));
        assert_eq!(restored_name_for(Path::new("dir/geo.plzo")), PathBuf::from("dir/geo_dp"));
        assert_eq!(restored_name_for(Path::new("obj2")), PathBuf::from("obj2_dp"));
    }
}
