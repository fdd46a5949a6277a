//! Side-by-side (top/bottom) comparison images for manual inspection.

use std::path::{Path, PathBuf};

use image::{imageops, RgbImage};

use crate::error::EvaluationError;
use crate::media::frames::FramePair;

/// Writes the pair's source frame stacked above its encoded frame to
/// [`FramePair::two_up`] and returns that path.
pub fn write_two_up(pair: &FramePair) -> Result<PathBuf, EvaluationError> {
    let top = load_rgb(&pair.source)?;
    let bottom = load_rgb(&pair.encoded)?;
    let canvas = stack_vertically(&top, &bottom);

    let path = pair.two_up();
    canvas
        .save(&path)
        .map_err(|e| EvaluationError::ImageWriteFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
    Ok(path)
}

/// Canvas as wide as the wider image, `top` at the origin and `bottom`
/// directly below it. Uncovered pixels stay black.
pub fn stack_vertically(top: &RgbImage, bottom: &RgbImage) -> RgbImage {
    let width = top.width().max(bottom.width());
    let mut canvas = RgbImage::new(width, top.height() + bottom.height());
    imageops::overlay(&mut canvas, top, 0, 0);
    imageops::overlay(&mut canvas, bottom, 0, i64::from(top.height()));
    canvas
}

fn load_rgb(path: &Path) -> Result<RgbImage, EvaluationError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|e| EvaluationError::ImageLoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const RED: Rgb<u8> = Rgb([255, 0, 0]);
    const BLUE: Rgb<u8> = Rgb([0, 0, 255]);

    #[test]
    fn source_sits_above_encode() {
        let top = RgbImage::from_pixel(4, 2, RED);
        let bottom = RgbImage::from_pixel(4, 3, BLUE);

        let canvas = stack_vertically(&top, &bottom);

        assert_eq!(canvas.dimensions(), (4, 5));
        assert_eq!(*canvas.get_pixel(3, 1), RED);
        assert_eq!(*canvas.get_pixel(0, 2), BLUE);
        assert_eq!(*canvas.get_pixel(3, 4), BLUE);
    }

    #[test]
    fn narrower_frame_is_padded_black() {
        let top = RgbImage::from_pixel(6, 2, RED);
        let bottom = RgbImage::from_pixel(3, 2, BLUE);

        let canvas = stack_vertically(&top, &bottom);

        assert_eq!(canvas.dimensions(), (6, 4));
        assert_eq!(*canvas.get_pixel(5, 3), Rgb([0, 0, 0]));
    }

    #[test]
    fn writes_numbered_png_next_to_the_pair() {
        let dir = tempfile::tempdir().unwrap();
        let pair = FramePair::in_dir(dir.path(), 3, 48);
        RgbImage::from_pixel(8, 4, RED).save(&pair.source).unwrap();
        RgbImage::from_pixel(8, 4, BLUE).save(&pair.encoded).unwrap();

        let path = write_two_up(&pair).unwrap();

        assert_eq!(path, dir.path().join("3-2up.png"));
        let stacked = image::open(&path).unwrap().to_rgb8();
        assert_eq!(stacked.dimensions(), (8, 8));
        assert_eq!(*stacked.get_pixel(0, 0), RED);
        assert_eq!(*stacked.get_pixel(0, 7), BLUE);
    }

    #[test]
    fn unreadable_frame_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let pair = FramePair::in_dir(dir.path(), 1, 16);
        std::fs::write(&pair.source, b"not a png").unwrap();

        assert!(matches!(
            write_two_up(&pair),
            Err(EvaluationError::ImageLoadFailed { .. })
        ));
        assert!(!pair.two_up().exists());
    }
}
