use std::path::Path;

use super::types::DecodedFrame;

/// Decoded packed clip: a single still or a run of timed frames.
pub enum MediaSource {
    /// Single packed image, shown for `hold_ms`.
    Static { frame: DecodedFrame, hold_ms: u32 },
    /// Pre-decoded frames + frame delays in milliseconds.
    Animated {
        frames: Vec<DecodedFrame>,
        delays_ms: Vec<u32>,
    },
}

impl MediaSource {
    pub fn frame_count(&self) -> usize {
        match self {
            MediaSource::Static { .. } => 1,
            MediaSource::Animated { frames, .. } => frames.len(),
        }
    }

    /// Packed frame dimensions (color and alpha halves together).
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            MediaSource::Static { frame, .. } => (frame.width, frame.height),
            MediaSource::Animated { frames, .. } => {
                frames.first().map_or((0, 0), |f| (f.width, f.height))
            }
        }
    }

    pub fn frame(&self, index: usize) -> Option<&DecodedFrame> {
        match self {
            MediaSource::Static { frame, .. } => (index == 0).then_some(frame),
            MediaSource::Animated { frames, .. } => frames.get(index),
        }
    }

    /// How long frame `index` stays on screen.
    pub fn delay_ms(&self, index: usize) -> u32 {
        match self {
            MediaSource::Static { hold_ms, .. } => *hold_ms,
            MediaSource::Animated { delays_ms, .. } => delays_ms.get(index).copied().unwrap_or(0),
        }
    }

    pub fn duration_secs(&self) -> f64 {
        let total_ms: f64 = (0..self.frame_count())
            .map(|i| self.delay_ms(i) as f64)
            .sum();
        total_ms / 1000.0
    }
}

/// Load a packed still or animated GIF from a file path.
pub fn load_image_media(path: &Path, still_frame_ms: u32) -> Result<MediaSource, String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    if ext == "gif" {
        load_gif(path)
    } else {
        load_static_image(path, still_frame_ms)
    }
}

fn load_static_image(path: &Path, hold_ms: u32) -> Result<MediaSource, String> {
    let img = image::open(path).map_err(|e| format!("Failed to open image: {e}"))?;
    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();

    Ok(MediaSource::Static {
        frame: DecodedFrame {
            data: rgba.into_raw(),
            width: w,
            height: h,
        },
        hold_ms: hold_ms.max(1),
    })
}

/// Load an animated GIF, pre-decoding all frames.
fn load_gif(path: &Path) -> Result<MediaSource, String> {
    use std::fs::File;

    let file = File::open(path).map_err(|e| format!("Failed to open GIF: {e}"))?;
    let mut decoder = gif::DecodeOptions::new();
    decoder.set_color_output(gif::ColorOutput::RGBA);
    let mut reader = decoder
        .read_info(file)
        .map_err(|e| format!("Failed to decode GIF: {e}"))?;

    let width = reader.width() as u32;
    let height = reader.height() as u32;

    let mut frames = Vec::new();
    let mut delays_ms = Vec::new();

    // GIF frames can be partial updates, so composite onto a running canvas.
    let mut canvas = vec![0u8; (width * height * 4) as usize];

    while let Some(frame) = reader
        .read_next_frame()
        .map_err(|e| format!("GIF frame error: {e}"))?
    {
        let delay = frame.delay as u32 * 10; // centiseconds
        delays_ms.push(delay.max(20));

        let fx = frame.left as u32;
        let fy = frame.top as u32;
        let fw = frame.width as u32;
        let fh = frame.height as u32;

        for y in 0..fh {
            for x in 0..fw {
                let src_idx = ((y * fw + x) * 4) as usize;
                let dst_x = fx + x;
                let dst_y = fy + y;
                if dst_x < width && dst_y < height {
                    let dst_idx = ((dst_y * width + dst_x) * 4) as usize;
                    let src = &frame.buffer[src_idx..src_idx + 4];
                    if src[3] > 0 {
                        canvas[dst_idx..dst_idx + 4].copy_from_slice(src);
                    }
                }
            }
        }

        frames.push(DecodedFrame {
            data: canvas.clone(),
            width,
            height,
        });
    }

    if frames.is_empty() {
        return Err("GIF has no frames".to_string());
    }

    log::info!(
        "Loaded packed GIF: {}x{}, {} frames",
        width,
        height,
        frames.len()
    );

    Ok(MediaSource::Animated { frames, delays_ms })
}
