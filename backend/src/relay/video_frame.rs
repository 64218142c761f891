//! Conversion of decoded GStreamer samples to RGB images.

use gstreamer as gst;
use gstreamer_video as gst_video;
use gstreamer_video::prelude::*;
use image::RgbImage;
use thiserror::Error;

/// Errors that can occur during video frame conversion.
#[derive(Debug, Error)]
pub enum VideoFrameError {
    #[error("Sample has no {0}")]
    Missing(&'static str),

    #[error("Failed to map video frame: {0}")]
    FrameMapping(String),

    #[error("Unsupported video format: {0}")]
    UnsupportedFormat(String),
}

/// Convert an RGB sample pulled from an appsink into an image.
///
/// Rows are copied individually since the stride may include padding.
pub fn sample_to_rgb(sample: &gst::Sample) -> Result<RgbImage, VideoFrameError> {
    let caps = sample.caps().ok_or(VideoFrameError::Missing("caps"))?;
    let buffer = sample.buffer().ok_or(VideoFrameError::Missing("buffer"))?;
    let info = gst_video::VideoInfo::from_caps(caps)
        .map_err(|e| VideoFrameError::FrameMapping(format!("Invalid video caps: {}", e)))?;

    let frame = gst_video::VideoFrameRef::from_buffer_ref_readable(buffer, &info)
        .map_err(|_| VideoFrameError::FrameMapping("Failed to map video frame".to_string()))?;

    convert_rgb(&frame)
}

fn convert_rgb(
    frame: &gst_video::VideoFrameRef<&gst::BufferRef>,
) -> Result<RgbImage, VideoFrameError> {
    if frame.format() != gst_video::VideoFormat::Rgb {
        return Err(VideoFrameError::UnsupportedFormat(format!(
            "{:?}",
            frame.format()
        )));
    }

    let width = frame.width();
    let height = frame.height();
    let data = frame
        .plane_data(0)
        .map_err(|e| VideoFrameError::FrameMapping(format!("Failed to get plane data: {}", e)))?;
    let stride = frame.plane_stride()[0] as usize;
    let row_len = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        let row = data.get(start..start + row_len).ok_or_else(|| {
            VideoFrameError::FrameMapping(format!("Row {} exceeds plane size", y))
        })?;
        pixels.extend_from_slice(row);
    }

    RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| VideoFrameError::FrameMapping("Pixel buffer size mismatch".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb_sample(width: u32, height: u32) -> gst::Sample {
        let info = gst_video::VideoInfo::builder(gst_video::VideoFormat::Rgb, width, height)
            .build()
            .unwrap();
        let stride = info.stride()[0] as usize;

        let mut buffer = gst::Buffer::with_size(info.size()).unwrap();
        {
            let buffer = buffer.get_mut().unwrap();
            let mut map = buffer.map_writable().unwrap();
            for y in 0..height as usize {
                for x in 0..width as usize {
                    let offset = y * stride + x * 3;
                    map[offset] = x as u8;
                    map[offset + 1] = y as u8;
                    map[offset + 2] = 200;
                }
            }
        }

        gst::Sample::builder()
            .buffer(&buffer)
            .caps(&info.to_caps().unwrap())
            .build()
    }

    #[test]
    fn test_sample_to_rgb_skips_row_padding() {
        gst::init().unwrap();

        // Width 5 gives a 15 byte row padded to a 16 byte stride
        let img = sample_to_rgb(&rgb_sample(5, 3)).unwrap();
        assert_eq!(img.dimensions(), (5, 3));
        assert_eq!(img.get_pixel(4, 2).0, [4, 2, 200]);
        assert_eq!(img.get_pixel(0, 1).0, [0, 1, 200]);
    }

    #[test]
    fn test_sample_without_caps_is_rejected() {
        gst::init().unwrap();

        let buffer = gst::Buffer::with_size(12).unwrap();
        let sample = gst::Sample::builder().buffer(&buffer).build();
        assert!(matches!(
            sample_to_rgb(&sample),
            Err(VideoFrameError::Missing("caps"))
        ));
    }
}
