use image::GenericImageView;

pub const MIN_WIDTH: u32 = 224;
pub const MIN_HEIGHT: u32 = 224;
pub const MIN_BRIGHTNESS: f64 = 40.0;

#[derive(Debug, Clone, PartialEq)]
pub enum QualityVerdict {
    Pass,
    LowResolution { width: u32, height: u32 },
    TooDark { brightness: f64 },
    Undecodable(String),
}

impl QualityVerdict {
    pub fn is_usable(&self) -> bool {
        matches!(self, QualityVerdict::Pass)
    }
}

/// Cheap pre-inference check on resolution and brightness. Never fails: an
/// image that cannot be decoded is reported as `Undecodable`.
pub fn check_image_quality(image_data: &[u8], image_ref: &str) -> QualityVerdict {
    let image = match image::load_from_memory(image_data) {
        Ok(image) => image,
        Err(e) => {
            log::warn!("Image {} could not be decoded for quality check: {}", image_ref, e);
            return QualityVerdict::Undecodable(e.to_string());
        }
    };

    let (width, height) = image.dimensions();
    if width < MIN_WIDTH || height < MIN_HEIGHT {
        log::warn!(
            "Image {} has insufficient resolution: {}x{}",
            image_ref,
            width,
            height
        );
        return QualityVerdict::LowResolution { width, height };
    }

    let brightness = mean_luminance(&image.to_rgb8());
    if brightness < MIN_BRIGHTNESS {
        log::warn!(
            "Image {} is too dark (brightness: {:.2})",
            image_ref,
            brightness
        );
        return QualityVerdict::TooDark { brightness };
    }

    log::info!("Image {} passed quality checks.", image_ref);
    QualityVerdict::Pass
}

/// Mean of the ITU-R 601-2 luma of every pixel, on a 0-255 scale.
pub fn mean_luminance(image: &image::RgbImage) -> f64 {
    let pixel_count = u64::from(image.width()) * u64::from(image.height());
    if pixel_count == 0 {
        return 0.0;
    }

    let total: u64 = image
        .pixels()
        .map(|pixel| {
            let [r, g, b] = pixel.0;
            (u64::from(r) * 19595 + u64::from(g) * 38470 + u64::from(b) * 7471 + 0x8000) >> 16
        })
        .sum();

    total as f64 / pixel_count as f64
}
