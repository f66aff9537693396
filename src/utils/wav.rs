//! WAV container helpers
//!
//! The WebSocket and embedded-device surfaces hand out raw 16-bit PCM, but
//! several engines only produce WAV containers. Extraction walks the RIFF
//! sub-chunks instead of assuming a fixed 44-byte header: encoders routinely
//! emit extra chunks (`LIST`, `INFO`, ...) before `data`, so the header size
//! is not constant.

use std::io::Cursor;

use anyhow::{Context, Result, bail};

/// Raw samples pulled out of a WAV container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPcm {
    /// Contents of the `data` chunk, verbatim
    pub samples: Vec<u8>,
    /// Sample rate declared by the `fmt ` chunk
    pub sample_rate: u32,
    /// Channel count declared by the `fmt ` chunk
    pub channels: u16,
    /// Bits per sample declared by the `fmt ` chunk
    pub bits_per_sample: u16,
}

fn read_u32_le(bytes: &[u8], offset: usize) -> Option<u32> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_u16_le(bytes: &[u8], offset: usize) -> Option<u16> {
    bytes
        .get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
}

/// Extract raw PCM samples and the declared sample rate from a WAV buffer.
///
/// Scans RIFF sub-chunks for `fmt ` and `data`; any other chunks are skipped.
/// Chunk payloads are padded to even lengths per the RIFF spec.
pub fn extract_pcm_from_wav(wav: &[u8]) -> Result<ExtractedPcm> {
    if wav.len() < 12 || &wav[0..4] != b"RIFF" || &wav[8..12] != b"WAVE" {
        bail!("not a RIFF/WAVE buffer ({} bytes)", wav.len());
    }

    let mut fmt: Option<(u32, u16, u16)> = None;
    let mut data: Option<Vec<u8>> = None;

    let mut offset = 12usize;
    while offset + 8 <= wav.len() {
        let chunk_id = &wav[offset..offset + 4];
        let chunk_len = read_u32_le(wav, offset + 4).context("truncated chunk header")? as usize;
        let body_start = offset + 8;
        let body_end = body_start.saturating_add(chunk_len).min(wav.len());

        match chunk_id {
            b"fmt " => {
                let channels = read_u16_le(wav, body_start + 2).context("truncated fmt chunk")?;
                let sample_rate = read_u32_le(wav, body_start + 4).context("truncated fmt chunk")?;
                let bits = read_u16_le(wav, body_start + 14).context("truncated fmt chunk")?;
                fmt = Some((sample_rate, channels, bits));
            }
            b"data" => {
                data = Some(wav[body_start..body_end].to_vec());
            }
            _ => {}
        }

        // Chunks are word-aligned; odd lengths carry a pad byte.
        offset = body_start + chunk_len + (chunk_len & 1);
    }

    let (sample_rate, channels, bits_per_sample) =
        fmt.context("WAV buffer has no 'fmt ' chunk")?;
    let samples = data.context("WAV buffer has no 'data' chunk")?;

    Ok(ExtractedPcm {
        samples,
        sample_rate,
        channels,
        bits_per_sample,
    })
}

/// Wrap raw 16-bit mono PCM in a minimal WAV container.
pub fn wrap_pcm_in_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).context("failed to start WAV writer")?;
        for chunk in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))
                .context("failed to write WAV sample")?;
        }
        writer.finalize().context("failed to finalize WAV")?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a WAV buffer by hand with arbitrary chunks before `data`.
    fn build_wav(sample_rate: u32, extra_chunks: &[(&[u8; 4], &[u8])], pcm: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();

        // fmt chunk: PCM, mono, 16-bit
        body.extend_from_slice(b"fmt ");
        body.extend_from_slice(&16u32.to_le_bytes());
        body.extend_from_slice(&1u16.to_le_bytes()); // audio format = PCM
        body.extend_from_slice(&1u16.to_le_bytes()); // channels
        body.extend_from_slice(&sample_rate.to_le_bytes());
        body.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
        body.extend_from_slice(&2u16.to_le_bytes()); // block align
        body.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

        for (id, payload) in extra_chunks {
            body.extend_from_slice(*id);
            body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            body.extend_from_slice(payload);
            if payload.len() % 2 == 1 {
                body.push(0);
            }
        }

        body.extend_from_slice(b"data");
        body.extend_from_slice(&(pcm.len() as u32).to_le_bytes());
        body.extend_from_slice(pcm);

        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
        wav.extend_from_slice(b"WAVE");
        wav.extend_from_slice(&body);
        wav
    }

    #[test]
    fn test_extracts_data_chunk_exactly() {
        let pcm: Vec<u8> = (0..200u16).flat_map(|s| s.to_le_bytes()).collect();
        let wav = build_wav(22050, &[], &pcm);

        let extracted = extract_pcm_from_wav(&wav).unwrap();
        assert_eq!(extracted.samples, pcm);
        assert_eq!(extracted.sample_rate, 22050);
        assert_eq!(extracted.channels, 1);
        assert_eq!(extracted.bits_per_sample, 16);
    }

    #[test]
    fn test_extraction_skips_list_chunk_before_data() {
        let pcm = vec![1u8, 2, 3, 4, 5, 6];
        let wav = build_wav(
            48000,
            &[(b"LIST", b"INFOsome encoder metadata"), (b"junk", &[0xAA; 7])],
            &pcm,
        );

        let extracted = extract_pcm_from_wav(&wav).unwrap();
        assert_eq!(extracted.samples, pcm);
        assert_eq!(extracted.sample_rate, 48000);
    }

    #[test]
    fn test_rejects_non_wav_buffer() {
        assert!(extract_pcm_from_wav(b"ID3\x03mp3 data here").is_err());
        assert!(extract_pcm_from_wav(b"").is_err());
    }

    #[test]
    fn test_missing_data_chunk_is_an_error() {
        let wav = build_wav(16000, &[], &[]);
        // Empty data chunk is fine...
        assert!(extract_pcm_from_wav(&wav).is_ok());

        // ...but a buffer with no data chunk at all is not.
        let truncated = &wav[..wav.len() - 8];
        assert!(extract_pcm_from_wav(truncated).is_err());
    }

    #[test]
    fn test_wrap_then_extract_round_trip() {
        let pcm: Vec<u8> = (0..100i16).flat_map(|s| s.to_le_bytes()).collect();
        let wav = wrap_pcm_in_wav(&pcm, 16000).unwrap();
        let extracted = extract_pcm_from_wav(&wav).unwrap();
        assert_eq!(extracted.samples, pcm);
        assert_eq!(extracted.sample_rate, 16000);
    }
}
