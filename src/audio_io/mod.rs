//! Getting audio in and out: file/video decoding and device playback.

pub mod output;
pub mod source;

pub use output::CpalSink;
pub use source::{
    AudioSource, SymphoniaDecoder, extract_audio_from_video, is_video_path, load_audio, load_media,
};
