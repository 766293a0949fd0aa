use {
    crate::natives::utils::absolutize,
    std::{
        env,
        path::{Path, PathBuf},
    },
};

/// Find the package boundary owning `file_path`.
///
/// Walks up from the file's directory and stops at the first directory holding
/// either `package.json` or `node_modules`. When the filesystem root is reached
/// without a match, the last visited directory is returned.
pub fn locate(file_path: &Path) -> PathBuf {
    let start = file_path.parent().unwrap_or(Path::new(""));
    let mut dir = if start.as_os_str().is_empty() || start == Path::new(".") {
        env::current_dir().unwrap_or_else(|_| PathBuf::from("/"))
    } else {
        absolutize(start)
    };

    loop {
        if dir.join("package.json").exists() || dir.join("node_modules").exists() {
            return dir;
        }
        match dir.parent() {
            Some(parent) => dir = parent.to_path_buf(),
            None => return dir,
        }
    }
}
