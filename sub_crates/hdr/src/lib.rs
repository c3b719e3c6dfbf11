//! Reading and writing of Radiance .hdr images.

mod rgbe;

use std::io::{BufRead, Error, ErrorKind, Read, Write};

pub use rgbe::{decode as decode_rgbe, encode as encode_rgbe};

/// Largest image `read_hdr` accepts, in pixels.
pub const MAX_PIXELS: usize = 1 << 28;

/// A decoded Radiance image.
#[derive(Debug, Clone)]
pub struct HdrImage {
    pub width: usize,
    pub height: usize,
    /// Linear RGB pixels, top row first.
    pub pixels: Vec<[f32; 3]>,
    /// The `EXPOSURE=` header value, if any.  Pixel values are already
    /// divided by it.
    pub exposure: Option<f32>,
}

/// Returns true if `header` starts with a Radiance magic string.
pub fn is_hdr(header: &[u8]) -> bool {
    header.starts_with(b"#?RADIANCE") || header.starts_with(b"#?RGBE")
}

pub fn write_hdr<W: Write>(
    out: &mut W,
    image: &[[f32; 3]],
    width: usize,
    height: usize,
    exposure: f32,
) -> std::io::Result<()> {
    assert_eq!(image.len(), width * height);

    out.write_all(b"#?RADIANCE\n")?;
    out.write_all(b"FORMAT=32-bit_rle_rgbe\n\n")?;
    out.write_all(format!("-Y {} +X {}\n", height, width).as_bytes())?;
    for pixel in image.iter() {
        out.write_all(&rgbe::encode([
            pixel[0] * exposure,
            pixel[1] * exposure,
            pixel[2] * exposure,
        ]))?;
    }
    out.flush()?;

    Ok(())
}

pub fn read_hdr<R: BufRead>(input: &mut R) -> std::io::Result<HdrImage> {
    //-------
    // Header.
    let mut line = String::new();
    input.read_line(&mut line)?;
    if !is_hdr(line.as_bytes()) {
        return Err(invalid("missing Radiance magic number"));
    }

    let mut exposure = None;
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Err(Error::new(ErrorKind::UnexpectedEof, "header ended early"));
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            break;
        }
        if let Some(format) = trimmed.strip_prefix("FORMAT=") {
            if format != "32-bit_rle_rgbe" {
                return Err(Error::new(
                    ErrorKind::Unsupported,
                    format!("unsupported pixel format \"{}\"", format),
                ));
            }
        } else if let Some(value) = trimmed.strip_prefix("EXPOSURE=") {
            let value: f32 = value
                .trim()
                .parse()
                .map_err(|_| invalid("bad EXPOSURE value"))?;
            if value > 0.0 {
                exposure = Some(exposure.unwrap_or(1.0) * value);
            }
        }
    }

    //-----------
    // Resolution.
    line.clear();
    input.read_line(&mut line)?;
    let (width, height) = parse_resolution(line.trim())?;
    let pixel_count = width
        .checked_mul(height)
        .filter(|&n| n > 0 && n <= MAX_PIXELS)
        .ok_or_else(|| invalid("image dimensions are empty or too large"))?;

    //-------
    // Pixels.  Memory grows with the data actually read.
    let mut pixels = Vec::with_capacity(pixel_count.min(1 << 20));
    let mut scanline = vec![[0u8; 4]; width];
    for _ in 0..height {
        read_scanline(input, &mut scanline)?;
        let inv_exposure = 1.0 / exposure.unwrap_or(1.0);
        pixels.extend(scanline.iter().map(|&p| {
            let [r, g, b] = rgbe::decode(p);
            [r * inv_exposure, g * inv_exposure, b * inv_exposure]
        }));
    }

    Ok(HdrImage {
        width,
        height,
        pixels,
        exposure,
    })
}

fn invalid(message: &str) -> Error {
    Error::new(ErrorKind::InvalidData, message.to_string())
}

/// Only the standard "-Y h +X w" orientation is supported.
fn parse_resolution(line: &str) -> std::io::Result<(usize, usize)> {
    let parts: Vec<_> = line.split_whitespace().collect();
    match parts[..] {
        ["-Y", h, "+X", w] => {
            let h = h.parse().map_err(|_| invalid("bad image height"))?;
            let w = w.parse().map_err(|_| invalid("bad image width"))?;
            Ok((w, h))
        }
        _ => Err(Error::new(
            ErrorKind::Unsupported,
            format!("unsupported resolution line \"{}\"", line),
        )),
    }
}

fn read_scanline<R: Read>(input: &mut R, scanline: &mut [[u8; 4]]) -> std::io::Result<()> {
    let width = scanline.len();
    let mut first = [0u8; 4];
    input.read_exact(&mut first)?;

    // New-style run-length encoding only applies to widths in [8, 32767]
    // and is signalled by a 2, 2 prefix.
    let is_rle = (8..0x8000).contains(&width) && first[0] == 2 && first[1] == 2 && first[2] & 0x80 == 0;
    if !is_rle {
        scanline[0] = first;
        for pixel in scanline[1..].iter_mut() {
            input.read_exact(pixel)?;
        }
        return Ok(());
    }

    let encoded_width = ((first[2] as usize) << 8) | first[3] as usize;
    if encoded_width != width {
        return Err(invalid("scanline width mismatch"));
    }

    // Each component is stored as its own run-length encoded plane.
    for component in 0..4 {
        let mut x = 0;
        while x < width {
            let mut count = [0u8; 1];
            input.read_exact(&mut count)?;
            let count = count[0] as usize;
            if count > 128 {
                let run = count - 128;
                if x + run > width {
                    return Err(invalid("run overflows scanline"));
                }
                let mut value = [0u8; 1];
                input.read_exact(&mut value)?;
                for pixel in scanline[x..(x + run)].iter_mut() {
                    pixel[component] = value[0];
                }
                x += run;
            } else {
                if count == 0 || x + count > width {
                    return Err(invalid("bad literal run"));
                }
                let mut values = [0u8; 128];
                input.read_exact(&mut values[..count])?;
                for (pixel, &v) in scanline[x..(x + count)].iter_mut().zip(values.iter()) {
                    pixel[component] = v;
                }
                x += count;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // RGBE precision is relative to the largest component of a pixel.
    fn close(a: f32, b: f32, pixel_max: f32) -> bool {
        (a - b).abs() <= pixel_max * 0.01 + 0.0001
    }

    #[test]
    fn write_then_read() {
        let pixels = vec![
            [0.0, 0.5, 1.0],
            [2.0, 4.0, 8.0],
            [0.1, 0.2, 0.3],
            [100.0, 0.0, 1.0],
            [0.0, 0.0, 0.0],
            [1.0, 1.0, 1.0],
        ];
        let mut bytes = Vec::new();
        write_hdr(&mut bytes, &pixels, 3, 2, 1.0).unwrap();

        let image = read_hdr(&mut &bytes[..]).unwrap();
        assert_eq!((image.width, image.height), (3, 2));
        for (a, b) in image.pixels.iter().zip(pixels.iter()) {
            let pixel_max = b[0].max(b[1]).max(b[2]);
            for c in 0..3 {
                assert!(close(a[c], b[c], pixel_max), "{:?} vs {:?}", a, b);
            }
        }
    }

    #[test]
    fn rle_scanline() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y 1 +X 8\n");
        bytes.extend_from_slice(&[2, 2, 0, 8]);
        // R, G and B planes: a run of 8 identical bytes each.
        for _ in 0..3 {
            bytes.extend_from_slice(&[128 + 8, 128]);
        }
        // Exponent plane: literal run of 8.
        bytes.push(8);
        bytes.extend_from_slice(&[129; 8]);

        let image = read_hdr(&mut &bytes[..]).unwrap();
        assert_eq!(image.pixels.len(), 8);
        for p in image.pixels.iter() {
            assert_eq!(*p, [1.0, 1.0, 1.0]);
        }
    }

    #[test]
    fn exposure_header_is_undone() {
        let mut input = b"#?RADIANCE\nEXPOSURE=2\nFORMAT=32-bit_rle_rgbe\n\n-Y 1 +X 1\n".to_vec();
        input.extend_from_slice(&encode_rgbe([2.0, 2.0, 2.0]));

        let image = read_hdr(&mut &input[..]).unwrap();
        assert_eq!(image.exposure, Some(2.0));
        assert_eq!(image.pixels[0], [1.0, 1.0, 1.0]);
    }

    #[test]
    fn truncated_data() {
        let mut bytes = Vec::new();
        write_hdr(&mut bytes, &[[1.0, 1.0, 1.0]; 4], 2, 2, 1.0).unwrap();
        bytes.truncate(bytes.len() - 3);
        let err = read_hdr(&mut &bytes[..]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn oversized_header() {
        for header in &[
            &b"#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y 4000000000 +X 4000000000\n"[..],
            &b"#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y 100000 +X 100000\n"[..],
            &b"#?RADIANCE\n\n-Y 18446744073709551615 +X 2\n"[..],
            &b"#?RADIANCE\n\n-Y 5 +X 0\n"[..],
        ] {
            let err = read_hdr(&mut &header[..]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidData);
        }

        // Plausible dimensions without the data are just truncated.
        let err = read_hdr(&mut &b"#?RADIANCE\n\n-Y 10000 +X 10000\n"[..]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn rejects_other_files() {
        assert!(!is_hdr(b"\x89PNG"));
        assert!(read_hdr(&mut &b"P6\n1 1\n255\n"[..]).is_err());
    }
}
