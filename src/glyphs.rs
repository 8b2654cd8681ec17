//! Glyph drawing for the target rasterizer
//! Bitmap text layout (font8x8) and the procedural action-glyph library

use font8x8::legacy::{BASIC_LEGACY, LATIN_LEGACY};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::rect::Rect;
use std::f32::consts::{PI, TAU};

/// Side of a font8x8 glyph cell in pixels.
pub const GLYPH_CELL: u32 = 8;

const INK: Rgba<u8> = Rgba([255, 255, 255, 255]);

const SHRUG_RUN: &str = "¯\\_(°_°)_/¯";

pub fn glyph_for_char(ch: char) -> [u8; 8] {
    let index = ch as usize;
    if index < BASIC_LEGACY.len() {
        BASIC_LEGACY[index]
    } else if (0xA0..0xA0 + LATIN_LEGACY.len()).contains(&index) {
        LATIN_LEGACY[index - 0xA0]
    } else {
        BASIC_LEGACY[b'?' as usize]
    }
}

/// Greedy word wrap. Words longer than a line are hard-broken; lines past
/// `max_lines` are dropped.
pub fn wrap_text(text: &str, max_cols: usize, max_lines: usize) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    if max_cols == 0 || max_lines == 0 {
        return lines;
    }

    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();

        // Hard-break words that can never fit
        while word.len() > max_cols {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max_cols);
            lines.push(word.into_iter().collect());
            word = rest;
        }

        let current_len = current.chars().count();
        let needed = if current.is_empty() {
            word.len()
        } else {
            current_len + 1 + word.len()
        };
        if needed > max_cols && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.extend(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }

    lines.truncate(max_lines);
    lines
}

/// Draw `text` word-wrapped, center-aligned and vertically centered.
/// Returns the number of lines drawn.
pub fn draw_text(canvas: &mut RgbaImage, text: &str, scale: u32, line_spacing: f32) -> usize {
    let scale = scale.max(1);
    let cell = GLYPH_CELL * scale;
    let line_height = ((cell as f32) * line_spacing.max(1.0)).round() as u32;
    let max_cols = (canvas.width() / cell) as usize;
    let max_lines = if canvas.height() < cell {
        0
    } else {
        (1 + (canvas.height() - cell) / line_height.max(1)) as usize
    };

    let lines = wrap_text(text, max_cols, max_lines);
    if lines.is_empty() {
        return 0;
    }

    let block_height = cell + line_height * (lines.len() as u32 - 1);
    let top = (canvas.height().saturating_sub(block_height) / 2) as i32;

    for (row, line) in lines.iter().enumerate() {
        let cols = line.chars().count() as u32;
        let left = (canvas.width().saturating_sub(cols * cell) / 2) as i32;
        let y0 = top + (row as u32 * line_height) as i32;
        for (col, ch) in line.chars().enumerate() {
            let x0 = left + (col as u32 * cell) as i32;
            draw_glyph(canvas, glyph_for_char(ch), x0, y0, scale);
        }
    }

    lines.len()
}

fn draw_glyph(canvas: &mut RgbaImage, glyph: [u8; 8], x0: i32, y0: i32, scale: u32) {
    for (y_offset, bits) in glyph.iter().enumerate() {
        for x_bit in 0..GLYPH_CELL {
            if (bits >> x_bit) & 0x01 == 0 {
                continue;
            }
            let x = x0 + (x_bit * scale) as i32;
            let y = y0 + (y_offset as u32 * scale) as i32;
            draw_filled_rect_mut(canvas, Rect::at(x, y).of_size(scale, scale), INK);
        }
    }
}

/// Procedural silhouettes keyed by the action label.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ActionGlyph {
    Smile,
    Nod,
    Wave,
    Shrug,
    /// No dedicated silhouette: the label itself is drawn as text.
    Label,
}

impl ActionGlyph {
    pub fn from_label(label: &str) -> Self {
        let label = label.to_lowercase();
        if label.contains("smile") {
            Self::Smile
        } else if label.contains("nod") {
            Self::Nod
        } else if label.contains("wave") {
            Self::Wave
        } else if label.contains("shrug") {
            Self::Shrug
        } else {
            Self::Label
        }
    }
}

/// Draw the silhouette for an action label onto the canvas.
pub fn draw_action(canvas: &mut RgbaImage, label: &str, scale: u32, line_spacing: f32, stroke: u32) {
    let cx = canvas.width() as f32 / 2.0;
    let cy = canvas.height() as f32 / 2.0;
    let radius = stroke.max(1) as i32;

    match ActionGlyph::from_label(label) {
        ActionGlyph::Smile => {
            // Eyes
            draw_filled_circle_mut(canvas, ((cx - 50.0) as i32, (cy - 45.0) as i32), 16, INK);
            draw_filled_circle_mut(canvas, ((cx + 50.0) as i32, (cy - 45.0) as i32), 16, INK);
            // Mouth
            let mouth: Vec<(f32, f32)> = (0..=24)
                .map(|i| {
                    let a = PI * (0.15 + 0.7 * i as f32 / 24.0);
                    (cx + a.cos() * 85.0, cy - 15.0 + a.sin() * 85.0)
                })
                .collect();
            draw_polyline(canvas, &mouth, radius);
        }
        ActionGlyph::Nod => {
            let head: Vec<(f32, f32)> = (0..=32)
                .map(|i| {
                    let a = TAU * i as f32 / 32.0;
                    (cx + a.cos() * 36.0, cy - 80.0 + a.sin() * 36.0)
                })
                .collect();
            draw_polyline(canvas, &head, radius);
            draw_polyline(canvas, &[(cx, cy - 44.0), (cx, cy + 60.0)], radius);
            draw_polyline(
                canvas,
                &[(cx - 40.0, cy + 40.0), (cx, cy + 85.0), (cx + 40.0, cy + 40.0)],
                radius,
            );
        }
        ActionGlyph::Wave => {
            let wave: Vec<(f32, f32)> = (0..=88)
                .map(|i| {
                    let x = -220.0 + i as f32 * 5.0;
                    (cx + x, cy + (x / 150.0 * TAU).sin() * 50.0)
                })
                .collect();
            draw_polyline(canvas, &wave, radius);
        }
        ActionGlyph::Shrug => {
            draw_text(canvas, SHRUG_RUN, scale, line_spacing);
        }
        ActionGlyph::Label => {
            draw_text(canvas, label, scale, line_spacing);
        }
    }
}

/// Thick stroke along a polyline, stamped one pixel apart.
fn draw_polyline(canvas: &mut RgbaImage, points: &[(f32, f32)], radius: i32) {
    for pair in points.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        let length = ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt();
        let steps = length.ceil().max(1.0) as usize;
        for s in 0..=steps {
            let t = s as f32 / steps as f32;
            let x = x0 + (x1 - x0) * t;
            let y = y0 + (y1 - y0) * t;
            draw_filled_circle_mut(canvas, (x.round() as i32, y.round() as i32), radius, INK);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ink_count(canvas: &RgbaImage) -> usize {
        canvas.pixels().filter(|p| p[3] > 0).count()
    }

    #[test]
    fn wrap_breaks_on_words_and_long_tokens() {
        assert_eq!(wrap_text("hello world", 8, 4), vec!["hello", "world"]);
        assert_eq!(wrap_text("a b c", 8, 4), vec!["a b c"]);
        assert_eq!(wrap_text("abcdefghij", 4, 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap_text("one two three four", 5, 2), vec!["one", "two"]);
        assert!(wrap_text("anything", 0, 3).is_empty());
        assert!(wrap_text("   ", 10, 3).is_empty());
    }

    #[test]
    fn unknown_characters_fall_back_to_question_mark() {
        assert_eq!(glyph_for_char('ツ'), glyph_for_char('?'));
        assert_ne!(glyph_for_char('A'), glyph_for_char('?'));
        assert_ne!(glyph_for_char('°'), glyph_for_char('?'));
    }

    #[test]
    fn text_is_centered_on_canvas() {
        let mut canvas = RgbaImage::new(320, 160);
        let lines = draw_text(&mut canvas, "II", 4, 1.25);
        assert_eq!(lines, 1);

        let (mut min_x, mut max_x) = (u32::MAX, 0);
        for (x, _, p) in canvas.enumerate_pixels() {
            if p[3] > 0 {
                min_x = min_x.min(x);
                max_x = max_x.max(x);
            }
        }
        let mid = (min_x + max_x) as f32 / 2.0;
        assert!((mid - 160.0).abs() < 8.0, "text midpoint {mid}");
    }

    #[test]
    fn action_labels_map_by_substring() {
        assert_eq!(ActionGlyph::from_label("big SMILE"), ActionGlyph::Smile);
        assert_eq!(ActionGlyph::from_label("nodding"), ActionGlyph::Nod);
        assert_eq!(ActionGlyph::from_label("wave hello"), ActionGlyph::Wave);
        assert_eq!(ActionGlyph::from_label("shrug"), ActionGlyph::Shrug);
        assert_eq!(ActionGlyph::from_label("dance"), ActionGlyph::Label);
    }

    #[test]
    fn every_action_draws_something() {
        for label in ["smile", "nod", "wave", "shrug", "dance"] {
            let mut canvas = RgbaImage::new(640, 320);
            draw_action(&mut canvas, label, 4, 1.25, 7);
            assert!(ink_count(&canvas) > 100, "{label} drew nothing");
        }
    }
}
