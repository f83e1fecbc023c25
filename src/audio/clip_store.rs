//! Filesystem clip store.
//!
//! Clips are flat files in a single directory (the mounted SD card on the
//! device). `.raw` files are streamed as-is; `.wav` files must be mono
//! 16-bit and are decoded up front with `hound` into the same raw
//! little-endian layout.

use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::audio::io::{ClipStore, ClipStream};
use crate::error::AudioError;

/// Clip stream over an in-memory PCM buffer
pub struct PcmClipStream {
    clip: String,
    data: Arc<Vec<u8>>,
    position: usize,
}

impl PcmClipStream {
    pub fn new(clip: impl Into<String>, data: Arc<Vec<u8>>) -> Self {
        Self {
            clip: clip.into(),
            data,
            position: 0,
        }
    }

    pub fn clip(&self) -> &str {
        &self.clip
    }
}

impl ClipStream for PcmClipStream {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, AudioError> {
        let remaining = &self.data[self.position.min(self.data.len())..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }

    fn rewind(&mut self) -> Result<(), AudioError> {
        self.position = 0;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position as u64
    }
}

/// Clip stream reading a raw PCM file
struct FileClipStream {
    clip: String,
    reader: BufReader<File>,
    position: u64,
}

impl FileClipStream {
    fn read_error(&self, err: std::io::Error) -> AudioError {
        AudioError::ClipRead {
            clip: self.clip.clone(),
            reason: err.to_string(),
        }
    }
}

impl ClipStream for FileClipStream {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, AudioError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(self.read_error(err)),
            }
        }
        self.position += filled as u64;
        Ok(filled)
    }

    fn rewind(&mut self) -> Result<(), AudioError> {
        self.reader
            .seek(SeekFrom::Start(0))
            .map_err(|err| self.read_error(err))?;
        self.position = 0;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }
}

/// Clip store backed by a directory
#[derive(Debug, Clone)]
pub struct FsClipStore {
    root: PathBuf,
}

impl FsClipStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a clip id to a path inside the root, rejecting traversal
    fn resolve(&self, clip: &str) -> Option<PathBuf> {
        let candidate = Path::new(clip);
        let single_component = candidate.components().count() == 1
            && candidate.file_name().map(|name| name == candidate.as_os_str()) == Some(true);
        if clip.is_empty() || !single_component {
            return None;
        }
        let path = self.root.join(candidate);
        path.is_file().then_some(path)
    }

    fn open_wav(&self, clip: &str, path: &Path) -> Result<Box<dyn ClipStream>, AudioError> {
        let read_error = |reason: String| AudioError::ClipRead {
            clip: clip.to_string(),
            reason,
        };

        let mut reader = hound::WavReader::open(path).map_err(|e| read_error(e.to_string()))?;
        let spec = reader.spec();
        if spec.channels != 1
            || spec.bits_per_sample != 16
            || spec.sample_format != hound::SampleFormat::Int
        {
            return Err(read_error(format!(
                "unsupported WAV layout: {} channel(s), {}-bit {:?}",
                spec.channels, spec.bits_per_sample, spec.sample_format
            )));
        }

        let mut data = Vec::with_capacity(reader.len() as usize * 2);
        for sample in reader.samples::<i16>() {
            let sample = sample.map_err(|e| read_error(e.to_string()))?;
            data.extend_from_slice(&sample.to_le_bytes());
        }

        Ok(Box::new(PcmClipStream::new(clip, Arc::new(data))))
    }
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("wav"))
        .unwrap_or(false)
}

impl ClipStore for FsClipStore {
    fn open(&self, clip: &str) -> Result<Box<dyn ClipStream>, AudioError> {
        let path = self.resolve(clip).ok_or_else(|| AudioError::ClipNotFound {
            clip: clip.to_string(),
        })?;

        if is_wav(&path) {
            return self.open_wav(clip, &path);
        }

        let file = File::open(&path).map_err(|err| AudioError::ClipRead {
            clip: clip.to_string(),
            reason: err.to_string(),
        })?;
        Ok(Box::new(FileClipStream {
            clip: clip.to_string(),
            reader: BufReader::new(file),
            position: 0,
        }))
    }

    fn contains(&self, clip: &str) -> bool {
        self.resolve(clip).is_some()
    }

    fn list(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                log::warn!("[ClipStore] Cannot list {:?}: {}", self.root, err);
                return Vec::new();
            }
        };

        let mut clips: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter_map(|path| path.file_name().and_then(|n| n.to_str()).map(String::from))
            .collect();
        clips.sort();
        clips
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "ambient_clip_store_{}_{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_raw_clip_streams_and_rewinds() {
        let dir = temp_dir("raw");
        let data: Vec<u8> = (0..=255u8).cycle().take(3000).collect();
        File::create(dir.join("joey.raw"))
            .unwrap()
            .write_all(&data)
            .unwrap();

        let store = FsClipStore::new(&dir);
        assert!(store.contains("joey.raw"));
        let mut stream = store.open("joey.raw").unwrap();

        let mut buf = vec![0u8; 1024];
        let mut collected = Vec::new();
        loop {
            let n = stream.read_chunk(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
        }
        assert_eq!(collected, data);
        assert_eq!(stream.position(), 3000);

        stream.rewind().unwrap();
        assert_eq!(stream.position(), 0);
        assert_eq!(stream.read_chunk(&mut buf).unwrap(), 1024);
        assert_eq!(&buf[..4], &data[..4]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_clip_is_not_found() {
        let dir = temp_dir("missing");
        let store = FsClipStore::new(&dir);
        assert!(matches!(
            store.open("nope.raw"),
            Err(AudioError::ClipNotFound { .. })
        ));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_traversal_rejected() {
        let dir = temp_dir("traversal");
        let store = FsClipStore::new(dir.join("inner"));
        fs::create_dir_all(dir.join("inner")).unwrap();
        File::create(dir.join("secret.raw")).unwrap();
        assert!(!store.contains("../secret.raw"));
        assert!(matches!(
            store.open("../secret.raw"),
            Err(AudioError::ClipNotFound { .. })
        ));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_wav_clip_decodes_to_raw() {
        let dir = temp_dir("wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(dir.join("tone.wav"), spec).unwrap();
        for sample in [1i16, -2, 300] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let store = FsClipStore::new(&dir);
        let mut stream = store.open("tone.wav").unwrap();
        let mut buf = vec![0u8; 16];
        let n = stream.read_chunk(&mut buf).unwrap();
        assert_eq!(n, 6);
        assert_eq!(&buf[..6], &[1, 0, 0xFE, 0xFF, 0x2C, 0x01]);
        assert_eq!(store.list(), vec!["tone.wav".to_string()]);

        let _ = fs::remove_dir_all(&dir);
    }
}
