use bincode::{Decode, Encode};
use num_enum::TryFromPrimitive;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::audio::AudioClip;
use crate::buffer::ByteBuf;
use crate::font::BitmapFont;
use crate::texture::Texture;

/// Resource kind byte tag, fixed at parse time.
///
/// Tag 6 was a legacy vector-animation kind; entries carrying it (or any
/// other unknown tag) are skipped via the declared-offset framing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum ItemKind {
    Image = 0,
    MovieClip = 1,
    Sound = 2,
    Component = 3,
    Atlas = 4,
    Font = 5,
    Misc = 7,
}

/// UI archetype tag consumed by the external object factory. For component
/// items the packed extension byte selects the specific archetype.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum ObjectType {
    Image = 0,
    MovieClip = 1,
    Swf = 2,
    Graph = 3,
    Loader = 4,
    Group = 5,
    Text = 6,
    RichText = 7,
    InputText = 8,
    #[default]
    Component = 9,
    List = 10,
    Label = 11,
    Button = 12,
    ComboBox = 13,
    ProgressBar = 14,
    Slider = 15,
    ScrollBar = 16,
}

/// Pixel-unit rectangle, top-left origin as stored in the package.
#[derive(Clone, Copy, Debug, Default, PartialEq, Encode, Decode)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn x_max(&self) -> f32 {
        self.x + self.width
    }

    pub fn y_max(&self) -> f32 {
        self.y + self.height
    }
}

/// A named sub-rectangle within an atlas item. Many sprites reference one
/// atlas item; the atlas surface is shared and decoded once.
#[derive(Clone)]
pub struct AtlasSprite {
    pub atlas: Rc<PackageItem>,
    pub rect: Rect,
    /// The sub-rect is stored transposed in the physical atlas.
    pub rotated: bool,
}

/// Advisory reference to another package this one expects to be loaded.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct PackageDependency {
    pub id: String,
    pub name: String,
}

/// Per-image hit-mask payload. The interior layout is a compatibility
/// contract matched byte-for-byte against authored packages, so it is
/// carried opaque.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelHitTestData {
    pub data: Vec<u8>,
}

/// One frame of a decoded movie clip.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct MovieFrame {
    pub rect: Rect,
    /// Extra delay appended to the clip interval for this frame, seconds.
    pub add_delay: f32,
    /// Normalized UV rect within the atlas surface; rotated sprites store
    /// it with width/height swapped.
    pub uv_rect: Rect,
    pub rotated: bool,
}

/// Decoded movie-clip payload: timing plus the ordered frame sequence.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct MovieClipData {
    /// Base frame interval, seconds.
    pub interval: f32,
    pub swing: bool,
    pub repeat_delay: f32,
    pub frames: Vec<MovieFrame>,
}

/// One resource descriptor within a package.
///
/// Descriptor fields are fixed at parse time; the derived-asset cells stay
/// `None` until first resolved, then keep their value (and identity) until
/// an explicit unload. Dependents hold `Rc` clones of the cell contents and
/// re-read through them, so an in-place reload propagates without any
/// notification mechanism.
pub struct PackageItem {
    pub kind: ItemKind,
    /// Unique within the owning package.
    pub id: String,
    /// Unique among named items; unnamed sub-items (e.g. bitmap-font glyph
    /// images) have none.
    pub name: Option<String>,
    /// External file reference; for atlas/sound/misc items the package's
    /// asset-name prefix is already applied.
    pub file: String,
    pub exported: bool,
    /// Authoring-time pixel size. May be stale for TTF-generated fonts.
    pub width: i32,
    pub height: i32,
    pub object_type: Cell<ObjectType>,

    // image-specific
    pub scale9_grid: Option<Rect>,
    pub tile_grid_indice: i32,
    pub scale_by_tile: bool,
    pub pixel_hit_test: RefCell<Option<PixelHitTestData>>,

    /// Embedded sub-buffer kept raw for lazy decode (component, font,
    /// movie clip).
    pub raw_data: Option<ByteBuf>,

    // lazily resolved derived assets
    pub texture: RefCell<Option<Rc<Texture>>>,
    pub audio: RefCell<Option<Rc<AudioClip>>>,
    pub bitmap_font: RefCell<Option<Rc<BitmapFont>>>,
    pub frames: RefCell<Option<Rc<MovieClipData>>>,
}

impl PackageItem {
    pub(crate) fn new(
        kind: ItemKind,
        id: String,
        name: Option<String>,
        file: String,
        exported: bool,
        width: i32,
        height: i32,
    ) -> Self {
        Self {
            kind,
            id,
            name,
            file,
            exported,
            width,
            height,
            object_type: Cell::new(ObjectType::Component),
            scale9_grid: None,
            tile_grid_indice: 0,
            scale_by_tile: false,
            pixel_hit_test: RefCell::new(None),
            raw_data: None,
            texture: RefCell::new(None),
            audio: RefCell::new(None),
            bitmap_font: RefCell::new(None),
            frames: RefCell::new(None),
        }
    }
}
