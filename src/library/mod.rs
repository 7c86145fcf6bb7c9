pub mod artwork;
pub mod nfo;

use std::io;
use std::path::{Path, PathBuf};

use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use lofty::config::{ParseOptions, WriteOptions};
use lofty::file::{AudioFile, TaggedFile, TaggedFileExt};
use lofty::picture::{Picture, PictureType};
use lofty::prelude::{Accessor, TagExt};
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag, TagType};
use reqwest::Client;
use tracing::instrument;

use crate::library::artwork::{Artwork, fetch_artwork};
use crate::library::nfo::{ARTIST_NFO_FILE, render_artist_nfo};
use crate::models::{AcquisitionRequest, ArtistBootstrapJob};

const COVER_STEM: &str = "cover";

#[derive(Debug, Clone, thiserror::Error)]
pub enum FinalizeError {
    #[error("Downloaded file is missing: {path}")]
    MissingDownload { path: String },

    #[error("A file already exists at the library destination: {path}")]
    DestinationExists { path: String },

    #[error("File system error during {operation} on {path}: {error_message}")]
    FileSystemError {
        operation: String,
        path: String,
        error_message: String,
    },

    #[error("Failed to tag {path}: {reason}")]
    TaggingError { path: String, reason: String },
}

fn fs_error(operation: &str, path: impl std::fmt::Display, e: impl ToString) -> FinalizeError {
    FinalizeError::FileSystemError {
        operation: operation.to_string(),
        path: path.to_string(),
        error_message: e.to_string(),
    }
}

/// Sanitize a path component (remove characters invalid on common filesystems)
pub fn sanitize_component(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .collect::<String>()
        .trim()
        .to_string()
}

fn component_or(name: &str, fallback: &str) -> String {
    let sanitized = sanitize_component(name);
    // `.` and `..` would walk out of the library.
    if sanitized.chars().all(|c| c == '.') {
        fallback.to_string()
    } else {
        sanitized
    }
}

/// Music library laid out as `<root>/<artist>/<album>/<track>.<ext>`.
#[derive(Debug, Clone)]
pub struct Library {
    root: PathBuf,
    http: Client,
}

impl Library {
    pub fn new(root: PathBuf) -> Self {
        Self::with_client(root, Client::new())
    }

    pub fn with_client(root: PathBuf, http: Client) -> Self {
        Self { root, http }
    }

    pub fn artist_dir(&self, artist: &str) -> PathBuf {
        self.root.join(component_or(artist, "Unknown Artist"))
    }

    pub fn track_destination(&self, request: &AcquisitionRequest, extension: &str) -> PathBuf {
        let album = component_or(request.album_name.trim(), "Unknown Album");
        let track = component_or(&request.track_name, "Unknown Track");
        let file_name = if extension.is_empty() {
            track
        } else {
            format!("{}.{}", track, extension)
        };
        self.artist_dir(request.primary_artist())
            .join(album)
            .join(file_name)
    }

    /// Tag the staged download and move it into the library.
    ///
    /// Nothing is overwritten: an existing destination fails the call and
    /// leaves the staged file where it is.
    #[instrument(skip(self, request), fields(search_id = %request.search_id))]
    pub async fn finalize_track(
        &self,
        request: &AcquisitionRequest,
        staged: &Path,
    ) -> Result<PathBuf, FinalizeError> {
        if !staged.is_file() {
            return Err(FinalizeError::MissingDownload {
                path: staged.display().to_string(),
            });
        }

        let extension = staged
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();
        let destination = self.track_destination(request, &extension);
        if destination.exists() {
            return Err(FinalizeError::DestinationExists {
                path: destination.display().to_string(),
            });
        }

        let artwork = match request.image_url.as_deref().filter(|url| !url.is_empty()) {
            Some(url) => match fetch_artwork(&self.http, url).await {
                Ok(artwork) => Some(artwork),
                Err(e) => {
                    tracing::warn!("Continuing without artwork: {:?}", e);
                    None
                }
            },
            None => None,
        };

        write_tags(staged.to_path_buf(), request.clone(), artwork.clone()).await?;

        let album_dir = destination
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        tracing::debug!("Creating directory structure: {}", album_dir.display());
        tokio::fs::create_dir_all(&album_dir)
            .await
            .map_err(|e| fs_error("create directory", album_dir.display(), e))?;

        if let Some(artwork) = &artwork {
            write_cover_if_missing(&album_dir, artwork).await?;
        }

        move_file(staged, &destination).await?;
        tracing::info!("Imported {} into the library", destination.display());
        Ok(destination)
    }

    /// Create the artist directory with its image and `artist.nfo`.
    #[instrument(skip(self, job), fields(artist_id = %job.artist_id))]
    pub async fn bootstrap_artist(&self, job: &ArtistBootstrapJob) -> Result<PathBuf> {
        let artist_dir = self.artist_dir(&job.name);
        tokio::fs::create_dir_all(&artist_dir)
            .await
            .wrap_err_with(|| format!("Failed to create {}", artist_dir.display()))?;

        if let Some(url) = job.primary_image() {
            match fetch_artwork(&self.http, url).await {
                Ok(artwork) => {
                    if let Err(e) = write_cover_if_missing(&artist_dir, &artwork).await {
                        tracing::warn!("Failed to write artist image: {}", e);
                    }
                }
                Err(e) => tracing::warn!("Failed to download artist image: {:?}", e),
            }
        }

        let nfo_path = artist_dir.join(ARTIST_NFO_FILE);
        tokio::fs::write(&nfo_path, render_artist_nfo(job)?)
            .await
            .wrap_err_with(|| format!("Failed to write {}", nfo_path.display()))?;

        Ok(artist_dir)
    }
}

async fn write_tags(
    path: PathBuf,
    request: AcquisitionRequest,
    artwork: Option<Artwork>,
) -> Result<(), FinalizeError> {
    let display = path.display().to_string();
    let tagging_error = |reason: String| FinalizeError::TaggingError {
        path: display.clone(),
        reason,
    };

    tokio::task::spawn_blocking(move || tag_file(&path, &request, artwork.as_ref()))
        .await
        .map_err(|e| tagging_error(e.to_string()))?
        .map_err(|e| tagging_error(format!("{:#}", e)))
}

/// Open an audio file for tagging. The content decides the container, so a
/// misnamed extension still works; audio properties are never needed here.
fn read_tagged_file(path: &Path) -> Result<TaggedFile> {
    Probe::open(path)
        .wrap_err("Failed to open audio file")?
        .options(ParseOptions::new().read_properties(false))
        .guess_file_type()
        .wrap_err("Failed to detect audio format")?
        .read()
        .wrap_err("Failed to read audio tags")
}

/// Replace whatever tags the uploader left with the requested metadata.
fn tag_file(path: &Path, request: &AcquisitionRequest, artwork: Option<&Artwork>) -> Result<()> {
    let mut tagged_file = read_tagged_file(path)?;

    // Every tag in the file is emptied, the primary one is then refilled.
    let present: Vec<TagType> = tagged_file.tags().iter().map(|tag| tag.tag_type()).collect();
    for tag_type in present {
        if let Some(tag) = tagged_file.tag_mut(tag_type) {
            tag.clear();
        }
    }

    let tag_type = tagged_file.primary_tag_type();
    if tagged_file.tag(tag_type).is_none() {
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged_file
        .tag_mut(tag_type)
        .ok_or_else(|| eyre!("No writable {:?} tag", tag_type))?;

    tag.set_title(request.track_name.clone());
    tag.set_artist(request.artists.join(";"));
    if !request.album_artists.is_empty() {
        tag.insert_text(ItemKey::AlbumArtist, request.album_artists.join(";"));
    }
    tag.set_album(request.album_name.clone());

    if let Some(artwork) = artwork
        && artwork.format.is_embeddable()
    {
        match Picture::from_reader(&mut artwork.bytes.as_slice()) {
            Ok(mut picture) => {
                picture.set_pic_type(PictureType::CoverFront);
                tag.push_picture(picture);
            }
            Err(e) => tracing::warn!("Not embedding unreadable artwork: {}", e),
        }
    }

    tagged_file
        .save_to_path(path, WriteOptions::default())
        .wrap_err("Failed to write audio tags")?;
    Ok(())
}

async fn write_cover_if_missing(dir: &Path, artwork: &Artwork) -> Result<(), FinalizeError> {
    if has_cover(dir).await {
        return Ok(());
    }
    let cover_path = dir.join(artwork.cover_file_name());
    tokio::fs::write(&cover_path, &artwork.bytes)
        .await
        .map_err(|e| fs_error("write cover", cover_path.display(), e))
}

async fn has_cover(dir: &Path) -> bool {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return false;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.file_stem().and_then(|s| s.to_str()) == Some(COVER_STEM) {
            return true;
        }
    }
    false
}

async fn move_file(source: &Path, destination: &Path) -> Result<(), FinalizeError> {
    if tokio::fs::metadata(destination).await.is_ok() {
        return Err(FinalizeError::DestinationExists {
            path: destination.display().to_string(),
        });
    }

    tracing::debug!(
        "Moving file from {} to {}",
        source.display(),
        destination.display()
    );
    if tokio::fs::rename(source, destination).await.is_ok() {
        return Ok(());
    }

    // Rename fails across filesystems; copy without clobbering instead.
    tracing::debug!("Rename failed, copying file across filesystems");
    let source_owned = source.to_path_buf();
    let destination_owned = destination.to_path_buf();
    tokio::task::spawn_blocking(move || copy_new(&source_owned, &destination_owned))
        .await
        .map_err(|e| fs_error("copy file", destination.display(), e))?
        .map_err(|e| {
            fs_error(
                "copy file",
                format!("{} -> {}", source.display(), destination.display()),
                e,
            )
        })?;

    tokio::fs::remove_file(source)
        .await
        .map_err(|e| fs_error("remove file", source.display(), e))
}

fn copy_new(source: &Path, destination: &Path) -> io::Result<()> {
    let mut reader = std::fs::File::open(source)?;
    let mut writer = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)?;
    io::copy(&mut reader, &mut writer)?;
    writer.sync_all()
}
