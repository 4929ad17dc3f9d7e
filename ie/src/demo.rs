//! Synthetic demo frame shown when no live source is available.
//!
//! Dark card with a red and a green tag, the classic pair that collapses under
//! red-green deficiencies, plus lighter body-text bars. Glyphs are drawn as
//! stroke bars so the frame needs no font assets.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

use crate::OwnedImage;

pub const DEMO_WIDTH: u32 = 1280;
pub const DEMO_HEIGHT: u32 = 720;

const BACKDROP: Rgb<u8> = Rgb([18, 20, 24]);
const CARD: Rgb<u8> = Rgb([30, 32, 38]);
const TAG_RED: Rgb<u8> = Rgb([231, 76, 60]);
const TAG_GREEN: Rgb<u8> = Rgb([46, 204, 113]);
const TITLE: Rgb<u8> = Rgb([255, 255, 255]);
const BODY: Rgb<u8> = Rgb([224, 224, 224]);

pub fn demo_frame() -> OwnedImage {
    let mut canvas = RgbImage::from_pixel(DEMO_WIDTH, DEMO_HEIGHT, BACKDROP);

    draw_filled_rect_mut(&mut canvas, Rect::at(80, 110).of_size(1120, 500), CARD);

    // Title line.
    text_bars(&mut canvas, 120, 150, 11, 48, TITLE);

    // Tags with their labels.
    draw_filled_rect_mut(&mut canvas, Rect::at(120, 250).of_size(420, 120), TAG_RED);
    draw_filled_rect_mut(&mut canvas, Rect::at(580, 250).of_size(420, 120), TAG_GREEN);
    text_bars(&mut canvas, 280, 290, 4, 40, TITLE);
    text_bars(&mut canvas, 740, 290, 4, 40, TITLE);

    // Body lines.
    text_bars(&mut canvas, 120, 435, 22, 30, BODY);
    text_bars(&mut canvas, 120, 490, 18, 30, BODY);

    OwnedImage::from_rgb_image(&canvas)
}

/// `count` glyph-sized stroke blocks starting at (`x`, `y`).
fn text_bars(canvas: &mut RgbImage, x: i32, y: i32, count: u32, height: u32, color: Rgb<u8>) {
    let advance = (height * 3 / 5) as i32;
    let stroke = (height / 5).max(2);
    for i in 0..count as i32 {
        let gx = x + i * advance;
        draw_filled_rect_mut(canvas, Rect::at(gx, y).of_size(stroke, height), color);
        draw_filled_rect_mut(canvas, Rect::at(gx, y).of_size(advance as u32 - 4, stroke), color);
    }
}
