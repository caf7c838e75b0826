// Writes one buffer to disk as a PNG.
// File name: <YYYY-MM-DD-HH-MM-SS>_<kind>_<index>.png. Two saves of the same
// kind and index inside one clock second land on the same name; the later
// one wins.
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use image::ImageFormat;
use tracing::info;

use crate::buffer::SharedFrameBuffer;
use crate::error::Result;
use crate::types::{DisplayMode, SnapshotKind};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

pub fn snapshot_file_name(at: DateTime<Local>, kind: SnapshotKind, index: i32) -> String {
    format!("{}_{}_{}.png", at.format(TIMESTAMP_FORMAT), kind, index)
}

/// Copy the buffer under the lock, then encode and write outside it.
pub fn save(
    frames: &SharedFrameBuffer,
    kind: SnapshotKind,
    mode: DisplayMode,
    dir: &Path,
    index: i32,
) -> Result<PathBuf> {
    let image = frames.snapshot(kind, mode)?;
    fs::create_dir_all(dir)?;
    let path = dir.join(snapshot_file_name(Local::now(), kind, index));
    image.save_with_format(&path, ImageFormat::Png)?;
    info!(path = %path.display(), %kind, index, "saved frame");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_name_has_timestamp_kind_and_index() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            snapshot_file_name(at, SnapshotKind::Subtracted, 12),
            "2024-03-09-07-05-01_subtracted_12.png"
        );
    }

    #[test]
    fn nothing_saved_before_first_frame() {
        let dir = tempfile::tempdir().unwrap();
        let frames = SharedFrameBuffer::new(2, 2);
        let result = save(&frames, SnapshotKind::Original, DisplayMode::Original, dir.path(), 1);
        assert!(result.is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn saved_png_decodes_to_frame_size() {
        let dir = tempfile::tempdir().unwrap();
        let frames = SharedFrameBuffer::new(6, 3);
        frames
            .with_writer(|w| {
                w.commit(|dst, _, _, _| {
                    dst.fill(90);
                    Ok(())
                })
            })
            .unwrap();

        let path = save(&frames, SnapshotKind::Current, DisplayMode::Original, dir.path(), 4).unwrap();
        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (6, 3));
        assert!(path.file_name().unwrap().to_string_lossy().ends_with("_current_4.png"));
    }
}
