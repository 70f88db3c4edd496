use image::imageops::FilterType;
use ndarray::Array4;

pub const INPUT_SIZE: u32 = 256;
pub const INPUT_CHANNELS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Failed to build input tensor: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Decodes an image and turns it into a `(1, 3, 256, 256)` channel-first
/// array with values in `[0, 1]`. Alpha and palette information is dropped.
pub fn preprocess_image(image_data: &[u8]) -> Result<Array4<f32>, PreprocessError> {
    let image = image::load_from_memory(image_data)?;
    let rgb = image
        .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
        .to_rgb8();

    let plane = (INPUT_SIZE * INPUT_SIZE) as usize;
    let mut data = vec![0f32; INPUT_CHANNELS * plane];
    for (i, pixel) in rgb.pixels().enumerate() {
        for channel in 0..INPUT_CHANNELS {
            data[channel * plane + i] = f32::from(pixel.0[channel]) / 255.0;
        }
    }

    let side = INPUT_SIZE as usize;
    Ok(Array4::from_shape_vec((1, INPUT_CHANNELS, side, side), data)?)
}
