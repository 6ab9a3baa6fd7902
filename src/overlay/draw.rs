// overlay/draw.rs - Backend-neutral draw primitives.
//
// The composer fills a `DrawList` every frame; a backend replays it. Keeping
// the list as plain data lets the composer run (and be tested) without a GL
// context.

/// RGBA, each channel 0..=1.
pub type Color = [f32; 4];

pub const WHITE: Color = [1.0, 1.0, 1.0, 0.98];
pub const SHADOW: Color = [0.0, 0.0, 0.0, 0.6];
pub const PANEL_BG: Color = [0.0, 0.0, 0.0, 0.63];
pub const HUD_BG: Color = [0.04, 0.04, 0.07, 0.82];
pub const HUD_BORDER: Color = [0.31, 0.47, 1.0, 0.47];
pub const STATS: Color = [0.78, 0.86, 1.0, 0.98];
pub const STATS_LOW: Color = [1.0, 0.39, 0.39, 0.98];
pub const HELD_ITEM: Color = [1.0, 0.78, 0.31, 0.98];
pub const BAR_BG: Color = [0.16, 0.16, 0.16, 0.78];
pub const CONTAINER_FILL: Color = [0.0, 0.0, 0.0, 0.35];
pub const STATUS: Color = [1.0, 0.15, 0.15, 1.0];

/// Glyph cell of the font atlas at scale 1.0, in pixels.
pub const GLYPH_W: f32 = 16.0;
pub const GLYPH_H: f32 = 32.0;

/// The font atlas is a 16 x 8 grid of the first 128 code points.
pub const ATLAS_COLS: usize = 16;
pub const ATLAS_ROWS: usize = 8;
pub const ATLAS_W: usize = ATLAS_COLS * GLYPH_W as usize;
pub const ATLAS_H: usize = ATLAS_ROWS * GLYPH_H as usize;

/// Atlas texture coordinates `[u0, v0, u1, v1]` of `c`. Anything outside
/// printable ASCII maps to `?`.
pub fn glyph_uv(c: char) -> [f32; 4] {
    let code = match c {
        ' '..='~' => c as usize,
        _ => '?' as usize,
    };
    let (col, row) = (code % ATLAS_COLS, code / ATLAS_COLS);
    let (w, h) = (1.0 / ATLAS_COLS as f32, 1.0 / ATLAS_ROWS as f32);
    [col as f32 * w, row as f32 * h, (col + 1) as f32 * w, (row + 1) as f32 * h]
}

/// White RGBA pixels whose alpha is the brightest channel of the
/// rasterised BGRA glyph bitmap.
pub fn coverage_to_rgba(bgra: &[u8]) -> Vec<u8> {
    bgra.chunks_exact(4)
        .flat_map(|px| [255, 255, 255, px[0].max(px[1]).max(px[2])])
        .collect()
}

/// Default text scale for overlay labels.
pub const TEXT_SCALE: f32 = 0.5;

/// Width of `text` at `scale`. The atlas is monospaced.
pub fn text_width(text: &str, scale: f32) -> f32 {
    text.chars().count() as f32 * GLYPH_W * scale
}

pub fn text_height(scale: f32) -> f32 {
    GLYPH_H * scale
}

/// Health bar colour: red when empty, green when full.
pub fn health_color(fraction: f32) -> Color {
    let f = fraction.clamp(0.0, 1.0);
    [1.0 - f, (220.0 * f + 35.0) / 255.0, 60.0 / 255.0, 1.0]
}

/// Container outline: orange up close fading to yellow at 40 blocks.
pub fn container_color(distance: f64) -> Color {
    let t = (distance / 40.0).clamp(0.0, 1.0) as f32;
    [1.0, (165.0 + 90.0 * t) / 255.0, 80.0 * t / 255.0, (220.0 - 40.0 * t) / 255.0]
}

#[derive(Clone, Debug, PartialEq)]
pub enum DrawCmd {
    FillRect { x0: f32, y0: f32, x1: f32, y1: f32, color: Color },
    OutlineRect { x0: f32, y0: f32, x1: f32, y1: f32, color: Color, width: f32 },
    /// Top-left anchored text.
    Text { x: f32, y: f32, text: String, color: Color, scale: f32 },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrawList {
    pub cmds: Vec<DrawCmd>,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.cmds.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    pub fn fill_rect(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, color: Color) {
        self.cmds.push(DrawCmd::FillRect { x0, y0, x1, y1, color });
    }

    pub fn outline_rect(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, color: Color, width: f32) {
        self.cmds.push(DrawCmd::OutlineRect { x0, y0, x1, y1, color, width });
    }

    pub fn text(&mut self, x: f32, y: f32, text: impl Into<String>, color: Color, scale: f32) {
        self.cmds.push(DrawCmd::Text { x, y, text: text.into(), color, scale });
    }

    /// Text with a one-pixel drop shadow.
    pub fn shadow_text(&mut self, x: f32, y: f32, text: &str, color: Color, scale: f32) {
        let shadow = [SHADOW[0], SHADOW[1], SHADOW[2], SHADOW[3] * color[3]];
        self.text(x + 1.0, y + 1.0, text, shadow, scale);
        self.text(x, y, text, color, scale);
    }

    /// All text runs, in draw order. Shadows included.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.cmds.iter().filter_map(|c| match c {
            DrawCmd::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monospaced_metrics() {
        assert_eq!(text_width("abcd", 0.5), 32.0);
        assert_eq!(text_width("", 1.0), 0.0);
        assert_eq!(text_height(0.5), 16.0);
    }

    #[test]
    fn glyph_cells() {
        assert_eq!(glyph_uv('A'), [1.0 / 16.0, 4.0 / 8.0, 2.0 / 16.0, 5.0 / 8.0]);
        assert_eq!(glyph_uv('\u{e9}'), glyph_uv('?'));
        assert_eq!(glyph_uv('\n'), glyph_uv('?'));
        assert_eq!((ATLAS_W, ATLAS_H), (256, 256));
    }

    #[test]
    fn coverage_becomes_alpha() {
        let rgba = coverage_to_rgba(&[10, 200, 30, 0, 0, 0, 0, 0]);
        assert_eq!(rgba, vec![255, 255, 255, 200, 255, 255, 255, 0]);
    }

    #[test]
    fn colour_ramps_are_clamped() {
        assert_eq!(health_color(2.0), health_color(1.0));
        assert_eq!(health_color(-1.0)[0], 1.0);
        assert_eq!(container_color(400.0), container_color(40.0));
        assert_eq!(container_color(0.0)[2], 0.0);
    }

    #[test]
    fn shadow_text_draws_twice() {
        let mut list = DrawList::new();
        list.shadow_text(10.0, 10.0, "hi", WHITE, 1.0);
        assert_eq!(list.texts().collect::<Vec<_>>(), vec!["hi", "hi"]);
        match &list.cmds[0] {
            DrawCmd::Text { x, y, color, .. } => {
                assert_eq!((*x, *y), (11.0, 11.0));
                assert_eq!(color[0], 0.0);
            }
            other => panic!("{other:?}"),
        }
    }
}
