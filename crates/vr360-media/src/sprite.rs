//! Sprite sheets for 360 video scrubbing previews.
//!
//! Tiles are packed row-major into one image and indexed by a WebVTT file
//! whose cues point at `sprite_url#xywh=x,y,w,h`.

use image::{imageops, RgbImage};
use vr360_models::Resolution;

use crate::error::{MediaError, MediaResult};

/// Tiles per sprite row.
pub const SPRITE_COLUMNS: u32 = 10;

/// A packed sprite image and its WebVTT index.
#[derive(Debug, Clone)]
pub struct SpriteSheet {
    pub image: RgbImage,
    pub webvtt: String,
    pub columns: u32,
    pub rows: u32,
    pub tile: Resolution,
}

/// Pack `(timestamp, frame)` tiles into a sprite sheet.
///
/// Every tile is resized to the first frame's size. Each cue lasts
/// `interval` seconds from its timestamp.
pub fn compose_sprite_sheet(
    frames: &[(f64, RgbImage)],
    columns: u32,
    interval: f64,
    sprite_url: &str,
) -> MediaResult<SpriteSheet> {
    let Some((_, first)) = frames.first() else {
        return Err(MediaError::invalid_dimensions("sprite sheet needs at least one frame"));
    };
    if columns == 0 {
        return Err(MediaError::invalid_dimensions("sprite sheet needs at least one column"));
    }
    if !(interval.is_finite() && interval > 0.0) {
        return Err(MediaError::invalid_dimensions(format!(
            "sprite interval must be positive, got {}",
            interval
        )));
    }

    let (tile_w, tile_h) = first.dimensions();
    if tile_w == 0 || tile_h == 0 {
        return Err(MediaError::invalid_dimensions("sprite tiles must not be empty"));
    }

    let count = frames.len() as u32;
    let columns = columns.min(count);
    let rows = count.div_ceil(columns);

    let mut sheet = RgbImage::new(tile_w * columns, tile_h * rows);
    let mut webvtt = String::from("WEBVTT\n\n");

    for (index, (timestamp, frame)) in frames.iter().enumerate() {
        let index = index as u32;
        let x = (index % columns) * tile_w;
        let y = (index / columns) * tile_h;

        if frame.dimensions() == (tile_w, tile_h) {
            imageops::replace(&mut sheet, frame, x as i64, y as i64);
        } else {
            let resized = imageops::resize(frame, tile_w, tile_h, imageops::FilterType::Triangle);
            imageops::replace(&mut sheet, &resized, x as i64, y as i64);
        }

        webvtt.push_str(&format!(
            "{} --> {}\n{}#xywh={},{},{},{}\n\n",
            vtt_timestamp(*timestamp),
            vtt_timestamp(timestamp + interval),
            sprite_url,
            x,
            y,
            tile_w,
            tile_h
        ));
    }

    Ok(SpriteSheet {
        image: sheet,
        webvtt,
        columns,
        rows,
        tile: Resolution::new(tile_w, tile_h),
    })
}

/// `HH:MM:SS.mmm`
fn vtt_timestamp(seconds: f64) -> String {
    let millis = (seconds.max(0.0) * 1000.0).round() as u64;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        millis / 3_600_000,
        (millis / 60_000) % 60,
        (millis / 1000) % 60,
        millis % 1000
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn tile(shade: u8) -> RgbImage {
        RgbImage::from_pixel(4, 2, Rgb([shade, shade, shade]))
    }

    #[test]
    fn test_vtt_timestamp() {
        assert_eq!(vtt_timestamp(0.0), "00:00:00.000");
        assert_eq!(vtt_timestamp(3723.25), "01:02:03.250");
    }

    #[test]
    fn test_sheet_layout_and_cues() {
        let frames: Vec<(f64, RgbImage)> = (0..12).map(|i| (i as f64 * 10.0, tile(i as u8 * 10))).collect();
        let sheet = compose_sprite_sheet(&frames, SPRITE_COLUMNS, 10.0, "sprite.jpg").unwrap();

        assert_eq!((sheet.columns, sheet.rows), (10, 2));
        assert_eq!(sheet.image.dimensions(), (40, 4));
        // tile 11 sits in row 1, column 1
        assert_eq!(*sheet.image.get_pixel(5, 3), Rgb([110, 110, 110]));

        assert!(sheet.webvtt.starts_with("WEBVTT\n\n00:00:00.000 --> 00:00:10.000\nsprite.jpg#xywh=0,0,4,2\n"));
        assert!(sheet.webvtt.contains("00:01:50.000 --> 00:02:00.000\nsprite.jpg#xywh=4,2,4,2\n"));
        assert_eq!(sheet.webvtt.matches("#xywh=").count(), 12);
    }

    #[test]
    fn test_few_frames_shrink_columns() {
        let sheet = compose_sprite_sheet(&[(0.0, tile(1)), (5.0, tile(2))], SPRITE_COLUMNS, 5.0, "s.jpg").unwrap();
        assert_eq!((sheet.columns, sheet.rows), (2, 1));
        assert_eq!(sheet.image.dimensions(), (8, 2));
    }

    #[test]
    fn test_mismatched_tiles_are_resized() {
        let big = RgbImage::from_pixel(8, 4, Rgb([200, 0, 0]));
        let sheet = compose_sprite_sheet(&[(0.0, tile(0)), (1.0, big)], 2, 1.0, "s.jpg").unwrap();
        assert_eq!(sheet.image.dimensions(), (8, 2));
        assert_eq!(*sheet.image.get_pixel(6, 1), Rgb([200, 0, 0]));
    }

    #[test]
    fn test_rejects_empty_input() {
        assert!(compose_sprite_sheet(&[], 10, 10.0, "s.jpg").is_err());
        assert!(compose_sprite_sheet(&[(0.0, tile(0))], 0, 10.0, "s.jpg").is_err());
        assert!(compose_sprite_sheet(&[(0.0, tile(0))], 10, 0.0, "s.jpg").is_err());
    }
}
