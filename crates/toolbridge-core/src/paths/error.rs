use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to locate or prepare one of the data directories.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("no home directory to expand `~` against")]
    HomeUnavailable,

    #[error("no per-user data directory on this platform; set TOOLBRIDGE_DATA_DIR")]
    DataDirUnavailable,

    #[error("could not create {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("path is blank")]
    Blank,

    #[error("relative path given but the working directory is unreadable: {0}")]
    WorkingDir(#[source] io::Error),
}
