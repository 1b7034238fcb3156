use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Name of the per-user directory that holds recordings, config and logs.
pub const SAVE_DIR_NAME: &str = "rtsp_saved";

/// Root of everything this program writes: `~/rtsp_saved`.
pub fn output_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(SAVE_DIR_NAME)
}

pub fn config_dir() -> PathBuf {
    output_root().join("config")
}

pub fn log_dir() -> PathBuf {
    output_root().join("logs")
}

/// The connection history file: `~/rtsp_saved/config/config.json`.
pub fn history_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Recording file for a session started at `now`:
/// `<root>/<YYYYMMDD>/saved_<YYYYMMDD_HHMMSS>.<ext>`.
pub fn recording_path(root: &Path, now: DateTime<Local>, ext: &str) -> PathBuf {
    let day = now.format("%Y%m%d").to_string();
    let stamp = now.format("%Y%m%d_%H%M%S").to_string();
    root.join(day).join(format!("saved_{}.{}", stamp, ext))
}

#[cfg(unix)]
fn ffmpeg_binary_names() -> &'static [&'static str] {
    &["ffmpeg"]
}

#[cfg(windows)]
fn ffmpeg_binary_names() -> &'static [&'static str] {
    &["ffmpeg.exe", "ffmpeg"]
}

#[cfg(unix)]
fn ffprobe_binary_names() -> &'static [&'static str] {
    &["ffprobe"]
}

#[cfg(windows)]
fn ffprobe_binary_names() -> &'static [&'static str] {
    &["ffprobe.exe", "ffprobe"]
}

fn find_beside_exe(names: &[&str]) -> Option<PathBuf> {
    let current_exe = std::env::current_exe().ok()?;
    let dir = current_exe.parent()?;
    for name in names {
        let p = dir.join(name);
        if p.exists() {
            return Some(p);
        }
        let p = dir.join("external").join(name);
        if p.exists() {
            return Some(p);
        }
    }
    None
}

fn find_on_path(names: &[&str]) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        for name in names {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }
    None
}

fn find_binary(env_key: &str, names: &[&str]) -> Option<PathBuf> {
    if let Ok(p) = std::env::var(env_key) {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }
    find_beside_exe(names).or_else(|| find_on_path(names))
}

/// Find the ffmpeg binary used for decoding and recording.
/// Checks `FFMPEG_PATH`, then beside the current exe, then PATH.
pub fn find_ffmpeg_binary() -> Option<PathBuf> {
    find_binary("FFMPEG_PATH", ffmpeg_binary_names())
}

/// Find the ffprobe binary used for stream probing.
/// Checks `FFPROBE_PATH`, then beside the current exe, then PATH.
pub fn find_ffprobe_binary() -> Option<PathBuf> {
    find_binary("FFPROBE_PATH", ffprobe_binary_names())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn recording_path_encodes_date_and_time() {
        let now = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 42).unwrap();
        let path = recording_path(Path::new("/data/rtsp_saved"), now, "mp4");
        assert_eq!(
            path,
            PathBuf::from("/data/rtsp_saved/20240307/saved_20240307_090542.mp4")
        );
    }

    #[test]
    fn history_lives_under_config_dir() {
        let path = history_path();
        assert!(path.ends_with("rtsp_saved/config/config.json"));
    }
}
