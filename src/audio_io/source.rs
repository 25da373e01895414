use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::config::VideoSettings;
use crate::error::{Error, Result};
use crate::traits::MediaDecoder;
use crate::types::AudioBuffer;

/// Decodes with symphonia; pulls audio out of video containers with `ffmpeg`.
pub struct SymphoniaDecoder {
    ffmpeg: PathBuf,
}

impl SymphoniaDecoder {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }
}

impl Default for SymphoniaDecoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl MediaDecoder for SymphoniaDecoder {
    fn decode(&self, path: &Path) -> Result<AudioBuffer> {
        let src = File::open(path).map_err(|e| Error::decode(path, e))?;
        let mss = MediaSourceStream::new(Box::new(src), Default::default());
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::decode(path, e))?;

        let mut format = probed.format;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::decode(path, "no audio track found"))?;
        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate;
        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::decode(path, e))?;

        let mut samples: Vec<f32> = Vec::new();
        let mut interleaved: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(SymphoniaError::ResetRequired) => continue,
                Err(err) => return Err(Error::decode(path, err)),
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    sample_rate = Some(spec.rate);
                    let channels = spec.channels.count().max(1);

                    let needed = decoded.capacity() * channels;
                    if interleaved.as_ref().is_none_or(|buf| buf.capacity() < needed) {
                        interleaved = Some(SampleBuffer::<f32>::new(
                            decoded.capacity() as u64,
                            spec,
                        ));
                    }
                    if let Some(buf) = interleaved.as_mut() {
                        buf.copy_interleaved_ref(decoded);
                        // Downmix to mono.
                        samples.extend(
                            buf.samples()
                                .chunks(channels)
                                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
                        );
                    }
                }
                Err(SymphoniaError::IoError(_)) => break,
                Err(SymphoniaError::DecodeError(e)) => {
                    log::warn!("{}: skipping corrupt packet: {e}", path.display());
                    continue;
                }
                Err(err) => return Err(Error::decode(path, err)),
            }
        }

        let sample_rate = sample_rate
            .filter(|&rate| rate > 0)
            .ok_or_else(|| Error::decode(path, "unknown sample rate"))?;
        log::info!(
            "decoded {}: {} samples at {sample_rate} Hz",
            path.display(),
            samples.len()
        );
        AudioBuffer::new(samples, sample_rate)
    }

    fn demux_audio_track(&self, video: &Path, dest: &Path) -> Result<()> {
        log::info!("extracting audio from {}", video.display());
        let output = Command::new(&self.ffmpeg)
            .arg("-y")
            .arg("-v")
            .arg("error")
            .arg("-i")
            .arg(video)
            .arg("-vn")
            .arg("-acodec")
            .arg("pcm_s16le")
            .arg(dest)
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => Error::demux(
                    video,
                    format!("`{}` not found; install ffmpeg", self.ffmpeg.display()),
                ),
                _ => Error::demux(video, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = if stderr.contains("does not contain any stream")
                || stderr.contains("matches no streams")
            {
                "no audio track".to_string()
            } else {
                format!("ffmpeg exited with {}: {}", output.status, stderr.trim())
            };
            return Err(Error::demux(video, reason));
        }
        Ok(())
    }
}

/// Extension check against the configured video extensions, ignoring case.
pub fn is_video_path(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|v| v.eq_ignore_ascii_case(ext)))
}

/// Loads audio and video files through a [`MediaDecoder`].
pub struct AudioSource {
    decoder: Box<dyn MediaDecoder>,
    video_extensions: Vec<String>,
}

impl AudioSource {
    pub fn new(decoder: Box<dyn MediaDecoder>, video_extensions: Vec<String>) -> Self {
        Self {
            decoder,
            video_extensions,
        }
    }

    pub fn from_settings(settings: &VideoSettings) -> Self {
        Self::new(
            Box::new(SymphoniaDecoder::new(&settings.ffmpeg_path)),
            settings.extensions.clone(),
        )
    }

    pub fn load_audio(&self, path: &Path) -> Result<AudioBuffer> {
        log::info!("loading audio from {}", path.display());
        self.decoder.decode(path)
    }

    /// Decode the audio track of `video`.
    ///
    /// The track goes through an intermediate WAV file. With `keep` set it is
    /// written there and left in place; otherwise a temporary file is used and
    /// removed once decoded.
    pub fn extract_audio_from_video(&self, video: &Path, keep: Option<&Path>) -> Result<AudioBuffer> {
        if let Some(dest) = keep {
            self.decoder.demux_audio_track(video, dest)?;
            return self.decoder.decode(dest);
        }

        let temp = tempfile::Builder::new()
            .prefix("slowdowner-")
            .suffix(".wav")
            .tempfile()?
            .into_temp_path();
        self.decoder.demux_audio_track(video, &temp)?;
        let buffer = self.decoder.decode(&temp);
        if let Err(e) = temp.close() {
            log::warn!("could not remove temporary audio file: {e}");
        }
        buffer
    }

    /// Dispatch on the file extension.
    pub fn load_media(&self, path: &Path) -> Result<AudioBuffer> {
        if is_video_path(path, &self.video_extensions) {
            self.extract_audio_from_video(path, None)
        } else {
            self.load_audio(path)
        }
    }
}

impl Default for AudioSource {
    fn default() -> Self {
        Self::from_settings(&VideoSettings::default())
    }
}

/// [`AudioSource::load_audio`] with the default decoder.
pub fn load_audio(path: impl AsRef<Path>) -> Result<AudioBuffer> {
    AudioSource::default().load_audio(path.as_ref())
}

/// [`AudioSource::load_media`] with the default decoder.
pub fn load_media(path: impl AsRef<Path>) -> Result<AudioBuffer> {
    AudioSource::default().load_media(path.as_ref())
}

/// [`AudioSource::extract_audio_from_video`] with the default decoder.
pub fn extract_audio_from_video(video: impl AsRef<Path>, keep: Option<&Path>) -> Result<AudioBuffer> {
    AudioSource::default().extract_audio_from_video(video.as_ref(), keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sine, write_wav};
    use std::sync::{Arc, Mutex};

    #[test]
    fn decodes_mono_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let tone = sine(440.0, 22050, 0.5);
        write_wav(&path, tone.samples(), 22050, 1);

        let buffer = load_audio(&path).unwrap();
        assert_eq!(buffer.sample_rate(), 22050);
        assert_eq!(buffer.len(), tone.len());
        for (a, b) in buffer.samples().iter().zip(tone.samples()).step_by(97) {
            approx::assert_abs_diff_eq!(*a, *b, epsilon = 1e-3);
        }
    }

    #[test]
    fn downmixes_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let interleaved: Vec<f32> = (0..2000)
            .flat_map(|_| [0.5f32, -0.25f32])
            .collect();
        write_wav(&path, &interleaved, 8000, 2);

        let buffer = load_audio(&path).unwrap();
        assert_eq!(buffer.len(), 2000);
        assert_eq!(buffer.sample_rate(), 8000);
        for s in buffer.samples() {
            approx::assert_abs_diff_eq!(*s, 0.125, epsilon = 1e-3);
        }
    }

    #[test]
    fn missing_file_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_audio(dir.path().join("nope.wav")).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn garbage_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.mp3");
        std::fs::write(&path, b"definitely not audio").unwrap();
        assert!(matches!(load_audio(&path), Err(Error::Decode { .. })));
    }

    #[test]
    fn video_extensions_ignore_case() {
        let exts = VideoSettings::default().extensions;
        assert!(is_video_path(Path::new("clip.MP4"), &exts));
        assert!(is_video_path(Path::new("/a/b/clip.mkv"), &exts));
        assert!(!is_video_path(Path::new("song.flac"), &exts));
        assert!(!is_video_path(Path::new("no_extension"), &exts));
    }

    #[test]
    fn missing_ffmpeg_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"").unwrap();
        let source = AudioSource::new(
            Box::new(SymphoniaDecoder::new(dir.path().join("no-such-ffmpeg"))),
            VideoSettings::default().extensions,
        );
        match source.load_media(&video) {
            Err(Error::Decode { reason, .. }) => assert!(reason.contains("not found")),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    /// Writes a fixed tone instead of running ffmpeg and remembers where.
    struct StubDemuxer {
        written: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl MediaDecoder for StubDemuxer {
        fn decode(&self, path: &Path) -> Result<AudioBuffer> {
            SymphoniaDecoder::default().decode(path)
        }

        fn demux_audio_track(&self, _video: &Path, dest: &Path) -> Result<()> {
            write_wav(dest, sine(220.0, 16000, 0.25).samples(), 16000, 1);
            self.written.lock().unwrap().push(dest.to_path_buf());
            Ok(())
        }
    }

    #[test]
    fn temporary_track_is_removed() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let source = AudioSource::new(
            Box::new(StubDemuxer {
                written: Arc::clone(&written),
            }),
            VideoSettings::default().extensions,
        );
        let buffer = source.load_media(Path::new("holiday.mov")).unwrap();
        assert_eq!(buffer.len(), 4000);
        assert_eq!(buffer.sample_rate(), 16000);

        let written = written.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert!(!written[0].exists());
    }

    #[test]
    fn kept_track_stays_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let keep = dir.path().join("track.wav");
        let source = AudioSource::new(
            Box::new(StubDemuxer {
                written: Arc::new(Mutex::new(Vec::new())),
            }),
            VideoSettings::default().extensions,
        );
        let buffer = source
            .extract_audio_from_video(Path::new("holiday.mov"), Some(&keep))
            .unwrap();
        assert_eq!(buffer.len(), 4000);
        assert!(keep.exists());
    }
}
