#![allow(dead_code)]

use std::path::{Path, PathBuf};

const WAV_SAMPLE_RATE: u32 = 8000;
const FLAC_SAMPLE_RATE: u64 = 44100;

fn write_bytes(path: &Path, bytes: Vec<u8>) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, bytes).unwrap();
    path.to_path_buf()
}

/// Write a silent 16-bit mono PCM WAV of `millis` milliseconds at 8 kHz
pub fn write_wav(path: &Path, millis: u32) -> PathBuf {
    write_tagged_wav(path, millis, &[])
}

/// Same as [`write_wav`] with a `LIST/INFO` chunk holding `info` entries.
///
/// Values are stored NUL-terminated and padded to an even length, the way
/// RIFF writers lay them out.
pub fn write_tagged_wav(path: &Path, millis: u32, info: &[(&[u8; 4], &str)]) -> PathBuf {
    let samples = WAV_SAMPLE_RATE * millis / 1000;
    let data_len = samples * 2;

    let mut list = Vec::new();
    if !info.is_empty() {
        let mut entries = Vec::new();
        for (id, value) in info {
            let mut value = value.as_bytes().to_vec();
            value.push(0);
            if value.len() % 2 == 1 {
                value.push(0);
            }
            entries.extend_from_slice(*id);
            entries.extend_from_slice(&(value.len() as u32).to_le_bytes());
            entries.extend_from_slice(&value);
        }
        list.extend_from_slice(b"LIST");
        list.extend_from_slice(&(4 + entries.len() as u32).to_le_bytes());
        list.extend_from_slice(b"INFO");
        list.extend_from_slice(&entries);
    }

    let mut bytes = Vec::with_capacity(44 + list.len() + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + list.len() as u32 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&WAV_SAMPLE_RATE.to_le_bytes());
    bytes.extend_from_slice(&(WAV_SAMPLE_RATE * 2).to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(&list);
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.resize(bytes.len() + data_len as usize, 0);

    write_bytes(path, bytes)
}

/// Write a FLAC stream that is only a `STREAMINFO` block announcing `millis`
/// milliseconds of 16-bit stereo at 44.1 kHz. Tags and pictures are added
/// afterwards with `metaflac`.
pub fn write_flac(path: &Path, millis: u64) -> PathBuf {
    let total_samples = FLAC_SAMPLE_RATE * millis / 1000;

    let mut bytes = Vec::with_capacity(42);
    bytes.extend_from_slice(b"fLaC");
    // last-metadata-block flag, type 0 (STREAMINFO), 34 byte body
    bytes.extend_from_slice(&[0x80, 0x00, 0x00, 34]);
    bytes.extend_from_slice(&4096u16.to_be_bytes()); // min block size
    bytes.extend_from_slice(&4096u16.to_be_bytes()); // max block size
    bytes.extend_from_slice(&[0; 3]); // min frame size, unknown
    bytes.extend_from_slice(&[0; 3]); // max frame size, unknown
    let packed = (FLAC_SAMPLE_RATE << 44) | (1 << 41) | (15 << 36) | total_samples;
    bytes.extend_from_slice(&packed.to_be_bytes());
    bytes.extend_from_slice(&[0; 16]); // md5, unset

    write_bytes(path, bytes)
}

/// PNG bytes of a solid `width` x `height` image
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 90]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}
