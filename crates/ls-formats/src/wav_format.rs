//! WAV encoding and decoding for PCM audio.

use crate::FormatError;
use ls_ir::{Sample, SampleData};
use std::io::Write;

const FORMAT_PCM: u16 = 1;
const FORMAT_FLOAT: u16 = 3;
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

// --- Writing ---

/// Write interleaved f32 audio as 16-bit PCM.
pub fn write_wav(
    w: &mut impl Write,
    samples: &[f32],
    channels: u16,
    sample_rate: u32,
) -> std::io::Result<()> {
    w.write_all(&frames_to_wav(samples, channels, sample_rate))
}

/// Encode interleaved f32 audio as a 16-bit PCM WAV file.
pub fn frames_to_wav(samples: &[f32], channels: u16, sample_rate: u32) -> Vec<u8> {
    let channels = channels.max(1);
    let bits_per_sample: u16 = 16;
    let block_align = channels * (bits_per_sample / 8);
    let frames = samples.len() / channels as usize;
    let data_size = (frames * block_align as usize) as u32;

    let mut buf = Vec::with_capacity(44 + data_size as usize);
    write_riff_header(&mut buf, data_size);
    write_fmt_chunk(&mut buf, channels, sample_rate, block_align, bits_per_sample);
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &s in &samples[..frames * channels as usize] {
        buf.extend_from_slice(&to_i16(s).to_le_bytes());
    }
    buf
}

fn to_i16(s: f32) -> i16 {
    let s = if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 };
    (s * i16::MAX as f32).round() as i16
}

fn write_riff_header(buf: &mut Vec<u8>, data_size: u32) {
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_size).to_le_bytes());
    buf.extend_from_slice(b"WAVE");
}

fn write_fmt_chunk(
    buf: &mut Vec<u8>,
    num_channels: u16,
    sample_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
) {
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&FORMAT_PCM.to_le_bytes());
    buf.extend_from_slice(&num_channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());
}

// --- Reading ---

/// Decode a WAV file from raw bytes into a normalized f32 Sample.
///
/// Accepts 8/16/24-bit integer PCM and 32-bit float, mono or stereo.
pub fn load_wav(data: &[u8], name: &str) -> Result<Sample, FormatError> {
    let header = parse_header(data)?;
    let mut sample = Sample::new(name, header.sample_rate);
    sample.data = read_pcm_data(data, &header)?;
    log::debug!(
        "decoded '{}': {} ch, {} Hz, {} bit, {} frames",
        name,
        header.num_channels,
        header.sample_rate,
        header.bits_per_sample,
        sample.len()
    );
    Ok(sample)
}

struct WavHeader {
    format: u16,
    num_channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    data_offset: usize,
    data_size: usize,
}

fn parse_header(data: &[u8]) -> Result<WavHeader, FormatError> {
    if data.len() < 12 {
        return Err(FormatError::UnexpectedEof);
    }
    if &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return Err(FormatError::InvalidHeader);
    }

    let mut pos = 12;
    let mut fmt: Option<(u16, u16, u32, u16)> = None;
    let mut data_chunk: Option<(usize, usize)> = None;

    while pos + 8 <= data.len() {
        let chunk_id = &data[pos..pos + 4];
        let chunk_size = read_u32_le(data, pos + 4) as usize;

        if chunk_id == b"fmt " {
            if chunk_size < 16 || pos + 24 > data.len() {
                return Err(FormatError::UnexpectedEof);
            }
            let mut format = read_u16_le(data, pos + 8);
            let channels = read_u16_le(data, pos + 10);
            let rate = read_u32_le(data, pos + 12);
            let bits = read_u16_le(data, pos + 22);
            // WAVE_FORMAT_EXTENSIBLE keeps the real format in the sub-format GUID
            if format == FORMAT_EXTENSIBLE && chunk_size >= 40 && pos + 34 <= data.len() {
                format = read_u16_le(data, pos + 32);
            }
            fmt = Some((format, channels, rate, bits));
        } else if chunk_id == b"data" {
            data_chunk = Some((pos + 8, chunk_size));
        }

        pos = pos.saturating_add(8 + chunk_size);
        if pos % 2 != 0 {
            pos += 1;
        }
    }

    let (format, num_channels, sample_rate, bits_per_sample) =
        fmt.ok_or(FormatError::InvalidHeader)?;
    let (data_offset, data_size) = data_chunk.ok_or(FormatError::InvalidHeader)?;

    match (format, bits_per_sample) {
        (FORMAT_PCM, 8 | 16 | 24) | (FORMAT_FLOAT, 32) => {}
        _ => {
            return Err(FormatError::UnsupportedEncoding(format!(
                "format tag {format}, {bits_per_sample} bit"
            )))
        }
    }
    if !(1..=2).contains(&num_channels) {
        return Err(FormatError::UnsupportedEncoding(format!(
            "{num_channels} channels"
        )));
    }
    if sample_rate == 0 {
        return Err(FormatError::InvalidHeader);
    }

    Ok(WavHeader {
        format,
        num_channels,
        sample_rate,
        bits_per_sample,
        data_offset,
        data_size,
    })
}

fn read_pcm_data(data: &[u8], header: &WavHeader) -> Result<SampleData, FormatError> {
    let end = (header.data_offset + header.data_size).min(data.len());
    let raw = data.get(header.data_offset..end).ok_or(FormatError::UnexpectedEof)?;

    let width = (header.bits_per_sample / 8) as usize;
    let decode = |c: &[u8]| -> f32 {
        match (header.format, width) {
            (FORMAT_FLOAT, _) => f32::from_le_bytes([c[0], c[1], c[2], c[3]]),
            // 8-bit WAV is unsigned, centered on 128
            (_, 1) => (c[0] as f32 - 128.0) / 128.0,
            (_, 2) => i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0,
            _ => {
                let v = i32::from_le_bytes([0, c[0], c[1], c[2]]) >> 8;
                v as f32 / 8_388_608.0
            }
        }
    };

    let samples = raw.chunks_exact(width).map(decode);
    match header.num_channels {
        1 => Ok(SampleData::Mono(samples.collect())),
        _ => {
            let interleaved: Vec<f32> = samples.collect();
            let frames = interleaved.len() / 2;
            let mut left = Vec::with_capacity(frames);
            let mut right = Vec::with_capacity(frames);
            for pair in interleaved.chunks_exact(2) {
                left.push(pair[0]);
                right.push(pair[1]);
            }
            Ok(SampleData::Stereo(left, right))
        }
    }
}

fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}
