#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// yt-dlp stand-in: writes "audio from <url>" to the --output template with the ext filled in
pub const FAKE_YT_DLP: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "2024.08.06"
  exit 0
fi
out=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "--output" ]; then out="$arg"; fi
  prev="$arg"
done
sleep __DELAY__
out=$(printf '%s' "$out" | sed 's/%(ext)s/mp3/')
printf 'audio from %s' "$prev" > "$out"
"#;

/// yt-dlp stand-in that always fails the way a removed video does
pub const FAILING_YT_DLP: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "2024.08.06"
  exit 0
fi
echo "ERROR: [youtube] abc: Video unavailable" >&2
exit 1
"#;

/// ffmpeg stand-in: prefixes the input with "transcoded:" and writes the last argument
pub const FAKE_FFMPEG: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "ffmpeg version 6.0"
  exit 0
fi
in=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-i" ]; then in="$arg"; fi
  prev="$arg"
done
{ printf 'transcoded:'; cat "$in"; } > "$prev"
"#;

#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
pub fn fake_yt_dlp(dir: &Path, delay_secs: u32) -> PathBuf {
    write_script(
        dir,
        "yt-dlp",
        &FAKE_YT_DLP.replace("__DELAY__", &delay_secs.to_string()),
    )
}

#[cfg(unix)]
pub fn fake_ffmpeg(dir: &Path) -> PathBuf {
    write_script(dir, "ffmpeg", FAKE_FFMPEG)
}

pub fn dir_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}
