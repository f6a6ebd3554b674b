use glam::Vec2;
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::texture::Texture;

/// Stored glyph record. Metrics are unscaled pixel units from the package;
/// scaling happens at query time.
#[derive(Clone, Debug, Default)]
pub struct BitmapGlyph {
    pub offset_x: i32,
    pub offset_y: i32,
    pub width: i32,
    pub height: i32,
    pub advance: i32,
    pub line_height: i32,
    pub uv: [Vec2; 4],
    /// 0 = n/a, 1 = red, 2 = green, 3 = blue, 4 = alpha.
    pub channel: u8,
}

/// Glyph query result with scaling applied.
#[derive(Clone, Debug, Default)]
pub struct GlyphInfo {
    pub width: f32,
    pub height: f32,
    pub vert_min: Vec2,
    pub vert_max: Vec2,
    pub uv: [Vec2; 4],
    pub channel: u8,
}

/// The package stores color channels as {1,2,3} = {R,G,B}; they decode
/// reversed. 0 (n/a) and the alpha channel pass through unchanged.
pub fn remap_channel(raw: u8) -> u8 {
    match raw {
        1 => 3,
        3 => 1,
        other => other,
    }
}

/// Decoded bitmap-font glyph table.
///
/// Two authoring modes share this type: TTF-rendered fonts cut every glyph
/// from one shared atlas sprite, legacy bitmap fonts give each glyph its own
/// image sub-item. Both are fully resolved at decode time; queries never
/// touch the package again.
pub struct BitmapFont {
    /// Resource url of the backing font item.
    pub name: String,
    /// Nominal font size, pixels.
    pub size: i32,
    pub ttf: bool,
    pub can_tint: bool,
    pub resizable: bool,
    pub has_channel: bool,
    pub main_texture: Option<Rc<Texture>>,
    glyphs: HashMap<char, BitmapGlyph>,
    scale: Cell<f32>,
}

impl BitmapFont {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        size: i32,
        ttf: bool,
        can_tint: bool,
        resizable: bool,
        has_channel: bool,
        main_texture: Option<Rc<Texture>>,
        glyphs: HashMap<char, BitmapGlyph>,
    ) -> Self {
        Self {
            name,
            size,
            ttf,
            can_tint,
            resizable,
            has_channel,
            main_texture,
            glyphs,
            scale: Cell::new(1.0),
        }
    }

    /// Set the render scale for subsequent glyph queries. Resizable fonts
    /// scale toward the requested point size, fixed fonts only honor the
    /// global scale factor.
    pub fn set_format(&self, requested_size: f32, font_size_scale: f32) {
        if self.resizable && self.size > 0 {
            self.scale
                .set(requested_size / self.size as f32 * font_size_scale);
        } else {
            self.scale.set(font_size_scale);
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale.get()
    }

    pub fn has_character(&self, ch: char) -> bool {
        ch == ' ' || self.glyphs.contains_key(&ch)
    }

    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    /// Unscaled stored record, mostly useful to tooling.
    pub fn raw_glyph(&self, ch: char) -> Option<&BitmapGlyph> {
        self.glyphs.get(&ch)
    }

    /// Advance/line box for layout. The space character is always
    /// synthesized from the font size and never looked up.
    pub fn glyph_size(&self, ch: char) -> Option<(f32, f32)> {
        let scale = self.scale.get();
        if ch == ' ' {
            return Some((
                (self.size as f32 * scale / 2.0).ceil(),
                (self.size as f32 * scale).ceil(),
            ));
        }
        self.glyphs.get(&ch).map(|g| {
            (
                (g.advance as f32 * scale).ceil(),
                (g.line_height as f32 * scale).ceil(),
            )
        })
    }

    pub fn glyph(&self, ch: char) -> Option<GlyphInfo> {
        let scale = self.scale.get();
        if ch == ' ' {
            return Some(GlyphInfo {
                width: (self.size as f32 * scale / 2.0).ceil(),
                height: (self.size as f32 * scale).ceil(),
                ..GlyphInfo::default()
            });
        }
        self.glyphs.get(&ch).map(|g| GlyphInfo {
            width: (g.advance as f32 * scale).ceil(),
            height: (g.line_height as f32 * scale).ceil(),
            vert_min: Vec2::new(g.offset_x as f32 * scale, g.offset_y as f32 * scale),
            vert_max: Vec2::new(
                (g.offset_x + g.width) as f32 * scale,
                (g.offset_y + g.height) as f32 * scale,
            ),
            uv: g.uv,
            channel: g.channel,
        })
    }
}
