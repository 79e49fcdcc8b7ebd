use bytes::Bytes;
use png::{BitDepth, ColorType, Encoder};

use crate::source::RasterBuffer;

/// A PNG-encoded page bitmap. Cloning shares the encoded bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub width: u32,
    pub height: u32,
    pub png: Bytes,
}

impl RenderedImage {
    pub fn encode(raster: &RasterBuffer) -> Result<Self, png::EncodingError> {
        let mut buffer = Vec::new();
        {
            let mut encoder = Encoder::new(&mut buffer, raster.width, raster.height);
            encoder.set_color(ColorType::Rgba);
            encoder.set_depth(BitDepth::Eight);
            let mut writer = encoder.write_header()?;
            writer.write_image_data(&raster.pixels)?;
            writer.finish()?;
        }
        Ok(Self {
            width: raster.width,
            height: raster.height,
            png: Bytes::from(buffer),
        })
    }
}
