//! Minimal EXIF reader that extracts the Orientation tag (`0x0112`).
//!
//! The TIFF structure holding EXIF data is located per container:
//! - JPEG: APP1 marker whose payload starts with `Exif\0\0`.
//! - TIFF: the file itself; IFD0 carries the tag.
//! - PNG: the `eXIf` chunk.
//! - WebP: the `EXIF` RIFF chunk.
//!
//! The container is recognized by its magic bytes, not the file extension.
//! Anything unexpected (truncated data, bad offsets, unknown container)
//! yields `None`; orientation is never worth failing a load over.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

/// EXIF tag number for Orientation.
const ORIENTATION_TAG: u16 = 0x0112;
/// TIFF field type SHORT.
const TYPE_SHORT: u16 = 3;

const EXIF_HEADER: &[u8] = b"Exif\0\0";
const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Most bytes read from a PNG or WebP EXIF chunk; IFD0 sits at its start.
const MAX_EXIF_BLOCK: u64 = 64 * 1024;

/// Read the EXIF orientation code (1-8) of an image file.
///
/// Only container headers and the EXIF block itself are read; pixel data
/// is skipped with seeks. Returns `None` when the file cannot be read,
/// carries no EXIF block, or the stored value is out of range.
pub fn read_exif_orientation(path: &Path) -> Option<u16> {
    let mut reader = BufReader::new(File::open(path).ok()?);
    orientation_from_reader(&mut reader)
}

/// Same as [`read_exif_orientation`] for an in-memory file.
pub fn orientation_from_bytes(data: &[u8]) -> Option<u16> {
    orientation_from_reader(&mut Cursor::new(data))
}

fn orientation_from_reader<R: Read + Seek>(r: &mut R) -> Option<u16> {
    let mut head = Vec::with_capacity(12);
    r.by_ref().take(12).read_to_end(&mut head).ok()?;

    let value = if head.starts_with(&[0xFF, 0xD8]) {
        orientation_from_jpeg(r)
    } else if head.starts_with(b"II*\0") || head.starts_with(b"MM\0*") {
        orientation_from_tiff_file(r, &head)
    } else if head.starts_with(PNG_SIGNATURE) {
        orientation_from_png(r)
    } else if head.len() == 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"WEBP" {
        orientation_from_webp(r)
    } else {
        None
    }?;
    (1..=8).contains(&value).then_some(value)
}

fn read_array<const N: usize, R: Read>(r: &mut R) -> Option<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf).ok()?;
    Some(buf)
}

fn read_u8<R: Read>(r: &mut R) -> Option<u8> {
    read_array::<1, R>(r).map(|[b]| b)
}

/// Up to `len` bytes; a truncated file yields what is there.
fn read_body<R: Read>(r: &mut R, len: u64) -> Option<Vec<u8>> {
    let mut body = Vec::new();
    r.by_ref().take(len).read_to_end(&mut body).ok()?;
    Some(body)
}

fn skip<R: Seek>(r: &mut R, len: u64) -> Option<()> {
    r.seek(SeekFrom::Current(i64::try_from(len).ok()?)).ok()?;
    Some(())
}

// ---------------------------------------------------------------------------
// Containers
// ---------------------------------------------------------------------------

/// Walk JPEG markers up to the start of scan looking for an Exif APP1.
fn orientation_from_jpeg<R: Read + Seek>(r: &mut R) -> Option<u16> {
    r.seek(SeekFrom::Start(2)).ok()?;
    loop {
        if read_u8(r)? != 0xFF {
            continue;
        }
        let mut marker = read_u8(r)?;
        // Fill bytes
        while marker == 0xFF {
            marker = read_u8(r)?;
        }
        // SOS (0xDA) starts the image data; no EXIF past here
        if marker == 0xDA || marker == 0xD9 {
            return None;
        }
        // Markers without length field
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            continue;
        }

        let seg_len = u16::from_be_bytes(read_array(r)?) as u64;
        if seg_len < 2 {
            return None;
        }
        if marker != 0xE1 {
            skip(r, seg_len - 2)?;
            continue;
        }
        let segment = read_body(r, seg_len - 2)?;
        if let Some(tiff) = segment.strip_prefix(EXIF_HEADER)
            && let Some(value) = orientation_from_tiff(tiff)
        {
            return Some(value);
        }
    }
}

/// Walk PNG chunks looking for `eXIf`. It must precede the image data.
fn orientation_from_png<R: Read + Seek>(r: &mut R) -> Option<u16> {
    r.seek(SeekFrom::Start(PNG_SIGNATURE.len() as u64)).ok()?;
    loop {
        let len = u32::from_be_bytes(read_array(r)?) as u64;
        let kind: [u8; 4] = read_array(r)?;
        match &kind {
            b"eXIf" => return orientation_from_tiff(&read_body(r, len.min(MAX_EXIF_BLOCK))?),
            b"IDAT" | b"IEND" => return None,
            // Body + CRC
            _ => skip(r, len + 4)?,
        }
    }
}

/// Walk RIFF chunks looking for `EXIF`, which usually follows the bitstream.
fn orientation_from_webp<R: Read + Seek>(r: &mut R) -> Option<u16> {
    r.seek(SeekFrom::Start(12)).ok()?;
    loop {
        let kind: [u8; 4] = read_array(r)?;
        let len = u32::from_le_bytes(read_array(r)?) as u64;
        if &kind == b"EXIF" {
            let body = read_body(r, len.min(MAX_EXIF_BLOCK))?;
            // Some writers keep the JPEG-style header inside the chunk
            let tiff = body.strip_prefix(EXIF_HEADER).unwrap_or(&body);
            return orientation_from_tiff(tiff);
        }
        // Chunks are padded to even length
        skip(r, len + len % 2)?;
    }
}

/// A TIFF file may put IFD0 anywhere. Seek to it and rebuild a compact
/// block with the header followed directly by that IFD.
fn orientation_from_tiff_file<R: Read + Seek>(r: &mut R, head: &[u8]) -> Option<u16> {
    let big_endian = head.starts_with(b"MM");
    let offset: [u8; 4] = head.get(4..8)?.try_into().ok()?;
    let ifd_offset = if big_endian {
        u32::from_be_bytes(offset)
    } else {
        u32::from_le_bytes(offset)
    };

    r.seek(SeekFrom::Start(ifd_offset as u64)).ok()?;
    let count: [u8; 2] = read_array(r)?;
    let entries = if big_endian {
        u16::from_be_bytes(count)
    } else {
        u16::from_le_bytes(count)
    } as u64;

    let mut block = head[..4].to_vec();
    block.extend_from_slice(&if big_endian {
        8u32.to_be_bytes()
    } else {
        8u32.to_le_bytes()
    });
    block.extend_from_slice(&count);
    r.by_ref().take(entries * 12).read_to_end(&mut block).ok()?;
    orientation_from_tiff(&block)
}

// ---------------------------------------------------------------------------
// TIFF structure
// ---------------------------------------------------------------------------

/// Read the Orientation tag from IFD0 of a TIFF structure.
fn orientation_from_tiff(data: &[u8]) -> Option<u16> {
    if data.len() < 8 {
        return None;
    }

    // Determine byte order
    let big_endian = match &data[0..2] {
        b"MM" => true,
        b"II" => false,
        _ => return None,
    };

    let read_u16 = |offset: usize| -> Option<u16> {
        let bytes = [*data.get(offset)?, *data.get(offset + 1)?];
        Some(if big_endian {
            u16::from_be_bytes(bytes)
        } else {
            u16::from_le_bytes(bytes)
        })
    };

    let read_u32 = |offset: usize| -> Option<u32> {
        let bytes = [
            *data.get(offset)?,
            *data.get(offset + 1)?,
            *data.get(offset + 2)?,
            *data.get(offset + 3)?,
        ];
        Some(if big_endian {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        })
    };

    // Verify TIFF magic (42)
    if read_u16(2)? != 42 {
        return None;
    }

    let ifd_offset = read_u32(4)? as usize;
    let entry_count = read_u16(ifd_offset)? as usize;
    let entries_start = ifd_offset + 2;

    for i in 0..entry_count {
        let entry_offset = entries_start + i * 12;
        let tag = read_u16(entry_offset)?;
        if tag != ORIENTATION_TAG {
            continue;
        }
        let typ = read_u16(entry_offset + 2)?;
        if typ != TYPE_SHORT {
            return None;
        }
        // A single SHORT is stored left-justified in the value field
        return read_u16(entry_offset + 8);
    }

    None
}
