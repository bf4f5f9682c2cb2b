use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::DecodeError;

/// Where a resource locator points
#[derive(Debug, Clone, PartialEq)]
pub enum Locator {
    File(PathBuf),
    /// Inline `data:` payload
    Inline { mime: String, bytes: Vec<u8> },
}

impl Locator {
    /// Classify a locator string. Remote schemes are rejected.
    pub fn parse(locator: &str) -> Result<Self, DecodeError> {
        let trimmed = locator.trim();

        if let Some(rest) = trimmed.strip_prefix("data:") {
            return Self::parse_data_uri(rest);
        }
        if let Some(path) = trimmed.strip_prefix("file://") {
            return Ok(Locator::File(PathBuf::from(path)));
        }
        if trimmed.contains("://") {
            return Err(DecodeError::UnsupportedLocator {
                locator: locator.to_string(),
            });
        }
        if trimmed.is_empty() {
            return Err(DecodeError::UnsupportedLocator {
                locator: locator.to_string(),
            });
        }
        Ok(Locator::File(PathBuf::from(trimmed)))
    }

    fn parse_data_uri(rest: &str) -> Result<Self, DecodeError> {
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| DecodeError::InvalidDataUri("missing ',' separator".to_string()))?;

        let mime = meta
            .strip_suffix(";base64")
            .ok_or_else(|| DecodeError::InvalidDataUri("only base64 payloads are supported".to_string()))?;

        let bytes = general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| DecodeError::InvalidDataUri(e.to_string()))?;

        Ok(Locator::Inline {
            mime: mime.to_string(),
            bytes,
        })
    }

    /// Format hint from the file extension or the MIME subtype
    fn hint(&self) -> Hint {
        let mut hint = Hint::new();
        match self {
            Locator::File(path) => {
                if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                    hint.with_extension(ext);
                }
            }
            Locator::Inline { mime, .. } => {
                if !mime.is_empty() {
                    hint.mime_type(mime);
                }
                if let Some(subtype) = mime.strip_prefix("audio/") {
                    let extension = match subtype {
                        "mpeg" => "mp3",
                        "x-wav" | "wave" => "wav",
                        "x-flac" => "flac",
                        other => other,
                    };
                    hint.with_extension(extension);
                }
            }
        }
        hint
    }
}

/// Fully decoded resource, interleaved f32
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Resolve and decode a whole resource into memory
pub fn decode_locator(locator: &str) -> Result<DecodedAudio, DecodeError> {
    let parsed = Locator::parse(locator)?;
    let hint = parsed.hint();

    let source: Box<dyn MediaSource> = match parsed {
        Locator::File(path) => Box::new(open_file(&path)?),
        Locator::Inline { bytes, .. } => Box::new(Cursor::new(bytes)),
    };

    decode_stream(MediaSourceStream::new(source, Default::default()), &hint)
}

fn open_file(path: &Path) -> Result<File, DecodeError> {
    debug!("Opening audio file {}", path.display());
    Ok(File::open(path)?)
}

fn decode_stream(media_source: MediaSourceStream, hint: &Hint) -> Result<DecodedAudio, DecodeError> {
    let probed = symphonia::default::get_probe()
        .format(hint, media_source, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DecodeError::CorruptedSource(format!("probe failed: {}", e)))?;

    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::CorruptedSource("no audio track found".to_string()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16).unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::DecodeFailed(format!("failed to create decoder: {}", e)))?;

    let mut samples = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(DecodeError::DecodeFailed(format!("failed to read packet: {}", err))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(audio_buf) => {
                let spec = *audio_buf.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;

                let needs_realloc = sample_buf
                    .as_ref()
                    .map_or(true, |buf| buf.capacity() < audio_buf.capacity());
                if needs_realloc {
                    sample_buf = Some(SampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec));
                }
                if let Some(buf) = sample_buf.as_mut() {
                    buf.copy_interleaved_ref(audio_buf);
                    samples.extend_from_slice(buf.samples());
                }
            }
            Err(SymphoniaError::DecodeError(msg)) => {
                warn!("Skipping undecodable packet: {}", msg);
            }
            Err(err) => return Err(DecodeError::DecodeFailed(err.to_string())),
        }
    }

    if sample_rate == 0 {
        return Err(DecodeError::CorruptedSource("unknown sample rate".to_string()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels: channels.max(1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Minimal 16-bit PCM WAV
    fn wav_bytes(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let block_align = channels * 2;
        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn test_parse_locators() {
        assert_eq!(Locator::parse("/music/a.wav").unwrap(), Locator::File(PathBuf::from("/music/a.wav")));
        assert_eq!(Locator::parse("file:///music/a.wav").unwrap(), Locator::File(PathBuf::from("/music/a.wav")));

        match Locator::parse("https://example.com/a.mp3") {
            Err(DecodeError::UnsupportedLocator { locator }) => assert_eq!(locator, "https://example.com/a.mp3"),
            other => panic!("Expected UnsupportedLocator, got {:?}", other),
        }
        assert!(Locator::parse("   ").is_err());
    }

    #[test]
    fn test_parse_data_uri() {
        let locator = Locator::parse("data:audio/wav;base64,UklGRg==").unwrap();
        assert_eq!(
            locator,
            Locator::Inline { mime: "audio/wav".to_string(), bytes: b"RIFF".to_vec() }
        );
    }

    #[test]
    fn test_invalid_data_uris() {
        assert!(matches!(Locator::parse("data:audio/wav;base64"), Err(DecodeError::InvalidDataUri(_))));
        assert!(matches!(Locator::parse("data:audio/wav,RIFF"), Err(DecodeError::InvalidDataUri(_))));
        assert!(matches!(Locator::parse("data:audio/wav;base64,@@@"), Err(DecodeError::InvalidDataUri(_))));
    }

    #[test]
    fn test_decode_wav_file() {
        let samples: Vec<i16> = (0..800).map(|i| if i % 2 == 0 { 16384 } else { -16384 }).collect();
        let mut file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        file.write_all(&wav_bytes(8000, 2, &samples)).unwrap();

        let decoded = decode_locator(file.path().to_str().unwrap()).unwrap();
        assert_eq!(decoded.sample_rate, 8000);
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.frames(), 400);
        assert!((decoded.duration_secs() - 0.05).abs() < 1e-9);
        assert!((decoded.samples[0] - 0.5).abs() < 1e-3);
        assert!((decoded.samples[1] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_decode_inline_wav() {
        let payload = general_purpose::STANDARD.encode(wav_bytes(16000, 1, &[0; 1600]));
        let decoded = decode_locator(&format!("data:audio/wav;base64,{}", payload)).unwrap();
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.sample_rate, 16000);
        assert_eq!(decoded.frames(), 1600);
    }

    #[test]
    fn test_decode_missing_file() {
        match decode_locator("/definitely/not/here.wav") {
            Err(DecodeError::Io(_)) => {}
            other => panic!("Expected Io error, got {:?}", other.map(|d| d.frames())),
        }
    }

    #[test]
    fn test_decode_garbage() {
        let mut file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        file.write_all(b"this is not audio at all").unwrap();
        assert!(decode_locator(file.path().to_str().unwrap()).is_err());
    }
}
