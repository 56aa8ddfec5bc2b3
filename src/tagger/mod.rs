//! ID3 tag writing for finished audio files
//!
//! Tags are written in place as ID3v2.4. Callers treat failures here as non-fatal: the
//! audio is the deliverable and metadata is a best-effort extra.

use id3::frame::{Picture, PictureType};
use id3::{Tag, TagLike, Version};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::pipeline::TrackDescriptor;
use crate::{MusicDlError, Result};

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// Descriptive fields written into the tag container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPayload {
    pub title: String,
    pub artist: String,
    pub album: String,
}

/// Front cover picture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cover {
    pub mime_type: String,
    pub data: Vec<u8>,
}

fn or_unknown(value: Option<&str>, fallback: &str) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

impl TagPayload {
    pub fn new(title: Option<&str>, artist: Option<&str>, album: Option<&str>) -> Self {
        Self {
            title: or_unknown(title, UNKNOWN_TITLE),
            artist: or_unknown(artist, UNKNOWN_ARTIST),
            album: or_unknown(album, UNKNOWN_ALBUM),
        }
    }

    pub fn from_track(track: &TrackDescriptor) -> Self {
        let artists = track.display_artists();
        Self::new(
            track.name.as_deref(),
            Some(artists.as_str()),
            track.album_name.as_deref(),
        )
    }
}

/// Replace title, artist, album and optionally the front cover of the file's ID3 tag
pub fn write_tags(path: &Path, payload: &TagPayload, cover: Option<&Cover>) -> Result<()> {
    let mut tag = match Tag::read_from_path(path) {
        Ok(tag) => tag,
        Err(e) if matches!(e.kind, id3::ErrorKind::NoTag) => Tag::new(),
        Err(e) => return Err(MusicDlError::TagWrite(format!("{}: {}", path.display(), e)).into()),
    };

    tag.set_title(payload.title.as_str());
    tag.set_artist(payload.artist.as_str());
    tag.set_album(payload.album.as_str());

    if let Some(cover) = cover {
        tag.remove_picture_by_type(PictureType::CoverFront);
        tag.add_frame(Picture {
            mime_type: cover.mime_type.clone(),
            picture_type: PictureType::CoverFront,
            description: "Cover".to_string(),
            data: cover.data.clone(),
        });
    }

    tag.write_to_path(path, Version::Id3v24)
        .map_err(|e| MusicDlError::TagWrite(format!("{}: {}", path.display(), e)))?;

    tracing::debug!(
        path = %path.display(),
        title = %payload.title,
        artist = %payload.artist,
        album = %payload.album,
        cover = cover.is_some(),
        "ID3 tags written"
    );
    Ok(())
}

/// Read back the descriptive fields; missing frames come back as the fallback values
pub fn read_tags(path: &Path) -> Result<TagPayload> {
    let tag = Tag::read_from_path(path)
        .map_err(|e| MusicDlError::TagWrite(format!("{}: {}", path.display(), e)))?;

    Ok(TagPayload::new(tag.title(), tag.artist(), tag.album()))
}

/// Whether the file carries a front cover picture
pub fn has_cover(path: &Path) -> bool {
    Tag::read_from_path(path)
        .map(|tag| {
            tag.pictures()
                .any(|picture| picture.picture_type == PictureType::CoverFront)
        })
        .unwrap_or(false)
}
