//! Environment file discovery
//!
//! Kept in its own test binary because it changes the working directory.

use std::fs;

use dsc_core::util::load_env_file;

#[test]
fn test_load_env_file_reports_the_file_read() {
    let dir = tempfile::tempdir().unwrap();
    let previous = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    // Nothing in the working directory: only user-level files can be found
    let before = load_env_file();
    assert!(before.map_or(true, |path| path.is_absolute()));

    fs::write("dsc.env", "DSC_ENV_FILE_TEST_KEY=loaded\n").unwrap();
    let loaded = load_env_file();
    std::env::set_current_dir(previous).unwrap();

    assert_eq!(loaded.as_deref(), Some(std::path::Path::new("dsc.env")));
    assert_eq!(std::env::var("DSC_ENV_FILE_TEST_KEY").unwrap(), "loaded");
}
