//! GIF re-encoding with interlaced frames.

use std::borrow::Cow;

use super::EncodeError;

/// Re-encode every frame of a GIF interlaced, keeping palettes, timing and looping.
pub fn interlace(data: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::Indexed);
    let mut decoder = options
        .read_info(data)
        .map_err(|e| EncodeError::Gif(e.to_string()))?;

    let (width, height) = (decoder.width(), decoder.height());
    let global_palette = decoder.global_palette().map(<[u8]>::to_vec).unwrap_or_default();
    let repeat = decoder.repeat();

    let mut out = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut out, width, height, &global_palette)
            .map_err(|e| EncodeError::Gif(e.to_string()))?;
        encoder
            .set_repeat(repeat)
            .map_err(|e| EncodeError::Gif(e.to_string()))?;

        // The decoder always hands back rows in display order.
        while let Some(frame) = decoder
            .read_next_frame()
            .map_err(|e| EncodeError::Gif(e.to_string()))?
        {
            let mut frame = frame.clone();
            let rows = interlace_rows(&frame.buffer, frame.width as usize, frame.height as usize);
            frame.buffer = Cow::Owned(rows);
            frame.interlaced = true;
            encoder
                .write_frame(&frame)
                .map_err(|e| EncodeError::Gif(e.to_string()))?;
        }
    }

    Ok(out)
}

/// Reorder rows into the four GIF interlace passes.
pub fn interlace_rows(buffer: &[u8], width: usize, height: usize) -> Vec<u8> {
    const PASSES: [(usize, usize); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];

    let mut out = Vec::with_capacity(buffer.len());
    for (start, step) in PASSES {
        for row in (start..height).step_by(step) {
            let begin = row * width;
            if let Some(line) = buffer.get(begin..begin + width) {
                out.extend_from_slice(line);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn striped_gif(width: u16, height: u16) -> (Vec<u8>, Vec<u8>) {
        let pixels: Vec<u8> = (0..height)
            .flat_map(|row| std::iter::repeat((row % 4) as u8).take(width as usize))
            .collect();
        let palette = [0, 0, 0, 255, 0, 0, 0, 255, 0, 0, 0, 255];

        let mut data = Vec::new();
        {
            let mut encoder = gif::Encoder::new(&mut data, width, height, &palette).unwrap();
            let frame = gif::Frame {
                width,
                height,
                buffer: Cow::Borrowed(&pixels),
                ..gif::Frame::default()
            };
            encoder.write_frame(&frame).unwrap();
        }
        (data, pixels)
    }

    #[test]
    fn orders_rows_by_pass() {
        let buffer: Vec<u8> = (0..10).collect();
        assert_eq!(
            interlace_rows(&buffer, 1, 10),
            vec![0, 8, 4, 2, 6, 1, 3, 5, 7, 9]
        );
    }

    #[test]
    fn interlaced_output_decodes_to_same_pixels() {
        let (data, pixels) = striped_gif(4, 11);

        let out = interlace(&data).unwrap();

        let mut options = gif::DecodeOptions::new();
        options.set_color_output(gif::ColorOutput::Indexed);
        let mut decoder = options.read_info(out.as_slice()).unwrap();
        // The decoder clears `interlaced` once it has reordered the rows, so
        // read the descriptor before the pixels.
        let interlaced = decoder.next_frame_info().unwrap().unwrap().interlaced;
        assert!(interlaced);

        let mut buffer = vec![0; decoder.buffer_size()];
        decoder.read_into_buffer(&mut buffer).unwrap();
        assert_eq!(buffer, pixels);
    }
}
