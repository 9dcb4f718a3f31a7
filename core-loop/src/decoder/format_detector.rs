//! Codec identification and probe hints.

use crate::error::{LoopError, Result};
use crate::traits::AudioCodec;
use std::path::Path;
use symphonia::core::codecs::*;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

const COMPRESSED_CODECS: [(CodecType, AudioCodec); 6] = [
    (CODEC_TYPE_MP3, AudioCodec::Mp3),
    (CODEC_TYPE_AAC, AudioCodec::Aac),
    (CODEC_TYPE_FLAC, AudioCodec::Flac),
    (CODEC_TYPE_VORBIS, AudioCodec::Vorbis),
    (CODEC_TYPE_OPUS, AudioCodec::Opus),
    (CODEC_TYPE_ALAC, AudioCodec::Alac),
];

/// Uncompressed sample layouts carried by WAV/AIFF.
const PCM_CODECS: [CodecType; 11] = [
    CODEC_TYPE_PCM_U8,
    CODEC_TYPE_PCM_S16LE,
    CODEC_TYPE_PCM_S16BE,
    CODEC_TYPE_PCM_S24LE,
    CODEC_TYPE_PCM_S24BE,
    CODEC_TYPE_PCM_S32LE,
    CODEC_TYPE_PCM_S32BE,
    CODEC_TYPE_PCM_F32LE,
    CODEC_TYPE_PCM_F32BE,
    CODEC_TYPE_PCM_F64LE,
    CODEC_TYPE_PCM_F64BE,
];

/// Maps containers and codec identifiers onto [`AudioCodec`].
pub struct FormatDetector;

impl FormatDetector {
    /// Probe hint from the file extension.
    ///
    /// Files without an extension are left to content sniffing.
    pub fn hint_from_path(path: &Path) -> Hint {
        let mut hint = Hint::new();

        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            debug!("Setting probe hint extension: {}", extension);
            hint.with_extension(extension);
        }

        hint
    }

    /// Translate a Symphonia codec identifier.
    pub fn detect_codec(codec_type: CodecType) -> AudioCodec {
        if codec_type == CODEC_TYPE_NULL {
            return AudioCodec::Unknown;
        }
        if PCM_CODECS.contains(&codec_type) {
            return AudioCodec::Wav;
        }

        match COMPRESSED_CODECS.iter().find(|(ty, _)| *ty == codec_type) {
            Some((_, codec)) => codec.clone(),
            None => {
                warn!(codec = %codec_type, "Unrecognised codec type");
                AudioCodec::Other(codec_type.to_string())
            }
        }
    }

    /// Reject codecs the clip pipeline cannot decode.
    pub fn validate_codec_support(codec: &AudioCodec) -> Result<()> {
        match codec {
            AudioCodec::Unknown => Err(LoopError::Format("Unknown audio codec".to_string())),
            AudioCodec::Other(name) => {
                Err(LoopError::Format(format!("Unsupported codec: {}", name)))
            }
            _ => Ok(()),
        }
    }
}
