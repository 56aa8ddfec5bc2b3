use std::io;
use std::path::Path;

use crate::{MusicDlError, Result};

fn move_error(destination: &Path, source: io::Error) -> anyhow::Error {
    MusicDlError::Move {
        destination: destination.display().to_string(),
        source,
    }
    .into()
}

/// Move `source` to `destination`.
///
/// With `overwrite` an existing destination file is replaced. The destination directory
/// must already exist. A rename across filesystems falls back to copy and remove.
pub async fn place(source: &Path, destination: &Path, overwrite: bool) -> Result<()> {
    if !overwrite && fs_err::tokio::metadata(destination).await.is_ok() {
        return Err(move_error(
            destination,
            io::Error::new(io::ErrorKind::AlreadyExists, "destination already exists"),
        ));
    }

    match fs_err::tokio::rename(source, destination).await {
        Ok(()) => {}
        Err(e) if is_cross_device(&e) => {
            tracing::debug!(
                "Rename across filesystems, copying {} to {}",
                source.display(),
                destination.display()
            );
            fs_err::tokio::copy(source, destination)
                .await
                .map_err(|e| move_error(destination, e))?;
            fs_err::tokio::remove_file(source)
                .await
                .map_err(|e| move_error(destination, e))?;
        }
        Err(e) => return Err(move_error(destination, e)),
    }

    tracing::info!("File moved to: {}", destination.display());
    Ok(())
}

fn is_cross_device(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::CrossesDevices
}
