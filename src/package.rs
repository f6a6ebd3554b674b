use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::io;
use std::rc::Rc;
use tracing::{debug, error, warn};

use crate::audio::AudioClip;
use crate::buffer::ByteBuf;
use crate::error::PackageError;
use crate::factory::{ObjectFactory, UiObject};
use crate::font::{BitmapFont, BitmapGlyph, remap_channel};
use crate::item::{
    AtlasSprite, ItemKind, MovieClipData, MovieFrame, ObjectType, PackageDependency, PackageItem,
    PixelHitTestData, Rect,
};
use crate::loader::{AssetKind, DestroyPolicy, LoadedAsset, ResourceLoader};
use crate::texture::{NativeTexture, Texture, rotate_uv};

/// First four bytes of every package descriptor.
pub const PACKAGE_MAGIC: u32 = 0x4647_5549;

/// Suffix appended to an atlas file stem to address its separate
/// alpha-channel companion.
const ALPHA_SUFFIX: &str = "!a";

// offset-table slots of the top-level index
const SECTION_DEPENDENCIES: usize = 0;
const SECTION_ITEMS: usize = 1;
const SECTION_SPRITES: usize = 2;
const SECTION_HIT_TEST: usize = 3;
const SECTION_STRINGS: usize = 4;

/// Kind-appropriate decoded asset returned by the resolver.
pub enum ItemAsset {
    Texture(Rc<Texture>),
    Audio(Rc<AudioClip>),
    Font(Rc<BitmapFont>),
    MovieClip(Rc<MovieClipData>),
    /// Component descriptor payload, handed raw to the object-construction
    /// collaborator. Always positioned at 0.
    Raw(ByteBuf),
    Bytes(Vec<u8>),
}

/// A loaded unit of UI resources: the item directory parsed from one binary
/// descriptor, its sprite table, and the lazy resolution state.
pub struct Package {
    id: String,
    name: String,
    asset_path: Option<String>,
    pub(crate) custom_id: RefCell<Option<String>>,
    items: RefCell<Vec<Rc<PackageItem>>>,
    items_by_id: RefCell<HashMap<String, Rc<PackageItem>>>,
    items_by_name: RefCell<HashMap<String, Rc<PackageItem>>>,
    sprites: RefCell<HashMap<String, AtlasSprite>>,
    dependencies: Vec<PackageDependency>,
    loader: Rc<dyn ResourceLoader>,
}

impl std::fmt::Debug for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Package")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("asset_path", &self.asset_path)
            .finish_non_exhaustive()
    }
}

impl Package {
    /// Decode a package descriptor into a directory.
    ///
    /// `existing_name_for_id` exposes current registrations so a duplicate
    /// id under a different name fails the load before anything is
    /// registered. The object factory, when present, gets to re-classify
    /// component archetypes as their entries are read.
    pub(crate) fn load(
        data: Vec<u8>,
        source: &str,
        asset_prefix: Option<&str>,
        asset_path: Option<String>,
        loader: Rc<dyn ResourceLoader>,
        factory: Option<&dyn ObjectFactory>,
        editor_mode: bool,
        existing_name_for_id: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Package, PackageError> {
        let mut buf = ByteBuf::new(data);

        if buf.read_u32()? != PACKAGE_MAGIC {
            return Err(PackageError::Format(format!(
                "'{}' is not a ui package, or uses an unsupported legacy format",
                source
            )));
        }
        buf.version = buf.read_i32()?;
        buf.read_bool()?; // compressed flag; decompression happens upstream
        let id = buf.read_string()?;
        let name = buf.read_string()?;
        if let Some(existing) = existing_name_for_id(&id) {
            if existing != name {
                return Err(PackageError::IdConflict {
                    id,
                    existing,
                    incoming: name,
                });
            }
        }
        buf.skip(20)?;
        let index_pos = buf.pos();

        // The string pool must be in place before any section that
        // references strings by index.
        if !buf.seek(index_pos, SECTION_STRINGS)? {
            return Err(PackageError::Format(format!(
                "'{}' has no string table section",
                source
            )));
        }
        let count = buf.read_i32()?;
        let mut pool = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            pool.push(buf.read_string()?);
        }
        buf.string_pool = Rc::new(pool);

        let prefix = match asset_prefix {
            Some(p) if !p.is_empty() => format!("{}_", p),
            _ => String::new(),
        };

        let mut items: Vec<Rc<PackageItem>> = Vec::new();
        let mut items_by_id: HashMap<String, Rc<PackageItem>> = HashMap::new();
        let mut items_by_name: HashMap<String, Rc<PackageItem>> = HashMap::new();

        if !buf.seek(index_pos, SECTION_ITEMS)? {
            return Err(PackageError::Format(format!(
                "'{}' has no item directory section",
                source
            )));
        }
        let count = buf.read_i16()?;
        for _ in 0..count {
            // Entry framing: the declared offset of the next entry is
            // ground truth. Whatever the kind-specific branch consumes, the
            // cursor is forced there afterwards, so one corrupt or unknown
            // entry cannot desynchronize the rest of the stream.
            let declared = buf.read_i32()? as i64;
            let next = checked_next(&buf, declared)?;
            let tag = buf.read_u8()?;
            let kind = match ItemKind::try_from(tag) {
                Ok(kind) => kind,
                Err(_) => {
                    debug!("skipping item with unknown kind tag {} in '{}'", tag, name);
                    buf.set_pos(next)?;
                    continue;
                }
            };
            let item_id = buf.read_pooled_string()?.unwrap_or_default();
            let item_name = buf.read_pooled_string()?;
            buf.read_pooled_string()?; // legacy path, unused
            let file = buf.read_pooled_string()?.unwrap_or_default();
            let exported = buf.read_bool()?;
            let width = buf.read_i32()?;
            let height = buf.read_i32()?;
            let mut item =
                PackageItem::new(kind, item_id, item_name, file, exported, width, height);

            match kind {
                ItemKind::Image => {
                    item.object_type.set(ObjectType::Image);
                    let scale_option = buf.read_u8()?;
                    if scale_option == 1 {
                        item.scale9_grid = Some(Rect::new(
                            buf.read_i32()? as f32,
                            buf.read_i32()? as f32,
                            buf.read_i32()? as f32,
                            buf.read_i32()? as f32,
                        ));
                        item.tile_grid_indice = buf.read_i32()?;
                    } else if scale_option == 2 {
                        item.scale_by_tile = true;
                    }
                    buf.read_bool()?; // smoothing, unused
                }
                ItemKind::MovieClip => {
                    buf.read_bool()?; // smoothing, unused
                    item.object_type.set(ObjectType::MovieClip);
                    item.raw_data = Some(buf.read_buffer()?);
                }
                ItemKind::Font => {
                    item.raw_data = Some(buf.read_buffer()?);
                }
                ItemKind::Component => {
                    let extension = buf.read_u8()?;
                    if extension > 0 {
                        item.object_type
                            .set(ObjectType::try_from(extension).unwrap_or_default());
                    } else {
                        item.object_type.set(ObjectType::Component);
                    }
                    item.raw_data = Some(buf.read_buffer()?);
                    if let Some(factory) = factory {
                        factory.resolve_package_item_extension(&item);
                    }
                }
                ItemKind::Atlas | ItemKind::Sound | ItemKind::Misc => {
                    item.file = format!("{}{}", prefix, item.file);
                }
            }

            let item = Rc::new(item);
            items.push(Rc::clone(&item));
            items_by_id.insert(item.id.clone(), Rc::clone(&item));
            if let Some(n) = &item.name {
                items_by_name.insert(n.clone(), Rc::clone(&item));
            }
            buf.set_pos(next)?;
        }

        let mut sprites: HashMap<String, AtlasSprite> = HashMap::new();
        if !buf.seek(index_pos, SECTION_SPRITES)? {
            return Err(PackageError::Format(format!(
                "'{}' has no sprite table section",
                source
            )));
        }
        let count = buf.read_i16()?;
        for _ in 0..count {
            let declared = buf.read_i16()? as i64;
            let next = checked_next(&buf, declared)?;
            let sprite_id = buf.read_pooled_string()?.unwrap_or_default();
            let atlas_id = buf.read_pooled_string()?.unwrap_or_default();
            let atlas = items_by_id.get(&atlas_id).cloned().ok_or_else(|| {
                PackageError::Format(format!(
                    "sprite '{}' in '{}' references unknown atlas item '{}'",
                    sprite_id, name, atlas_id
                ))
            })?;
            let rect = Rect::new(
                buf.read_i32()? as f32,
                buf.read_i32()? as f32,
                buf.read_i32()? as f32,
                buf.read_i32()? as f32,
            );
            let rotated = buf.read_bool()?;
            sprites.insert(
                sprite_id,
                AtlasSprite {
                    atlas,
                    rect,
                    rotated,
                },
            );
            buf.set_pos(next)?;
        }

        // Optional section; older format versions omit it, which surfaces
        // as a failed seek.
        if buf.seek(index_pos, SECTION_HIT_TEST)? {
            let count = buf.read_i16()?;
            for _ in 0..count {
                let declared = buf.read_i32()? as i64;
                let next = checked_next(&buf, declared)?;
                let item_id = buf.read_pooled_string()?.unwrap_or_default();
                if let Some(item) = items_by_id.get(&item_id) {
                    if item.kind == ItemKind::Image {
                        let data = buf.read_bytes(next.saturating_sub(buf.pos()))?;
                        *item.pixel_hit_test.borrow_mut() = Some(PixelHitTestData { data });
                    }
                }
                buf.set_pos(next)?;
            }
        }

        // Deterministic alphabetic listing for tooling; runtime preserves
        // author order, which z-ordering-adjacent consumers rely on.
        if editor_mode {
            items.sort_by(|a, b| match (&a.name, &b.name) {
                (Some(x), Some(y)) => x.cmp(y),
                _ => Ordering::Equal,
            });
        }

        if !buf.seek(index_pos, SECTION_DEPENDENCIES)? {
            return Err(PackageError::Format(format!(
                "'{}' has no dependency section",
                source
            )));
        }
        let count = buf.read_i16()?;
        let mut dependencies = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            dependencies.push(PackageDependency {
                id: buf.read_pooled_string()?.unwrap_or_default(),
                name: buf.read_pooled_string()?.unwrap_or_default(),
            });
        }

        Ok(Package {
            id,
            name,
            asset_path,
            custom_id: RefCell::new(None),
            items: RefCell::new(items),
            items_by_id: RefCell::new(items_by_id),
            items_by_name: RefCell::new(items_by_name),
            sprites: RefCell::new(sprites),
            dependencies,
            loader,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn asset_path(&self) -> Option<&str> {
        self.asset_path.as_deref()
    }

    pub fn custom_id(&self) -> Option<String> {
        self.custom_id.borrow().clone()
    }

    /// Advisory (id, name) pairs of packages this one expects to be loaded.
    pub fn dependencies(&self) -> &[PackageDependency] {
        &self.dependencies
    }

    /// All items, in directory order (author order at runtime, sorted by
    /// name in editor mode).
    pub fn items(&self) -> Vec<Rc<PackageItem>> {
        self.items.borrow().clone()
    }

    pub fn item(&self, item_id: &str) -> Option<Rc<PackageItem>> {
        self.items_by_id.borrow().get(item_id).cloned()
    }

    pub fn item_by_name(&self, item_name: &str) -> Option<Rc<PackageItem>> {
        self.items_by_name.borrow().get(item_name).cloned()
    }

    /// Resolve the kind-appropriate asset for a named item. A lookup miss
    /// is a diagnostic, never a panic.
    pub fn item_asset_by_name(&self, res_name: &str) -> Option<ItemAsset> {
        match self.item_by_name(res_name) {
            Some(item) => self.item_asset(&item),
            None => {
                error!("resource not found - {} in {}", res_name, self.name);
                None
            }
        }
    }

    /// Lazily materialize the derived asset for an item. Idempotent: a
    /// second call returns the cached instance without re-decoding.
    pub fn item_asset(&self, item: &Rc<PackageItem>) -> Option<ItemAsset> {
        match item.kind {
            ItemKind::Image => {
                if item.texture.borrow().is_none() {
                    self.load_image(item);
                }
                item.texture.borrow().clone().map(ItemAsset::Texture)
            }
            ItemKind::Atlas => {
                if item.texture.borrow().is_none() {
                    self.load_atlas(item);
                }
                item.texture.borrow().clone().map(ItemAsset::Texture)
            }
            ItemKind::Sound => {
                if item.audio.borrow().is_none() {
                    self.load_sound(item);
                }
                item.audio.borrow().clone().map(ItemAsset::Audio)
            }
            ItemKind::Font => {
                if item.bitmap_font.borrow().is_none() {
                    self.load_font(item);
                }
                item.bitmap_font.borrow().clone().map(ItemAsset::Font)
            }
            ItemKind::MovieClip => {
                if item.frames.borrow().is_none() {
                    self.load_movie_clip(item);
                }
                item.frames.borrow().clone().map(ItemAsset::MovieClip)
            }
            ItemKind::Component => item.raw_data.clone().map(ItemAsset::Raw),
            ItemKind::Misc => self.load_binary(item).map(ItemAsset::Bytes),
        }
    }

    /// Resolve every item eagerly; useful before a scene transition.
    pub fn load_all_assets(&self) {
        for item in self.items() {
            self.item_asset(&item);
        }
    }

    /// Drop decoded pixel/audio data while keeping every descriptor and
    /// wrapper identity intact; a later resolve re-decodes in place.
    pub fn unload_assets(&self) {
        for item in self.items() {
            match item.kind {
                ItemKind::Atlas => {
                    if let Some(tex) = &*item.texture.borrow() {
                        tex.unload();
                    }
                }
                ItemKind::Sound => {
                    if let Some(clip) = &*item.audio.borrow() {
                        clip.unload();
                    }
                }
                _ => {}
            }
        }
    }

    /// Re-decode assets that were resolved before [`Package::unload_assets`].
    /// Dependents that captured references observe the new data without
    /// re-fetching them.
    pub fn reload_assets(&self) {
        for item in self.items() {
            match item.kind {
                ItemKind::Atlas => {
                    let needs = matches!(&*item.texture.borrow(), Some(t) if !t.is_loaded());
                    if needs {
                        self.load_atlas(&item);
                    }
                }
                ItemKind::Sound => {
                    let needs = matches!(&*item.audio.borrow(), Some(c) if !c.is_loaded());
                    if needs {
                        self.load_sound(&item);
                    }
                }
                _ => {}
            }
        }
    }

    /// Release every derived asset and empty the directory. Called once,
    /// on removal from the registry.
    pub fn dispose(&self) {
        for item in self.items() {
            match item.kind {
                ItemKind::Atlas => {
                    if let Some(tex) = item.texture.borrow_mut().take() {
                        tex.dispose();
                    }
                }
                ItemKind::Sound => {
                    if let Some(clip) = item.audio.borrow_mut().take() {
                        clip.unload();
                    }
                }
                _ => {}
            }
        }
        self.items.borrow_mut().clear();
        self.items_by_id.borrow_mut().clear();
        self.items_by_name.borrow_mut().clear();
        self.sprites.borrow_mut().clear();
    }

    /// Instantiate the UI object a named item describes. The item's asset
    /// is resolved first so construction never observes a half-loaded
    /// resource.
    pub fn create_object(
        self: Rc<Self>,
        res_name: &str,
        factory: &dyn ObjectFactory,
    ) -> Option<Box<dyn UiObject>> {
        match self.item_by_name(res_name) {
            Some(item) => self.create_object_item(&item, factory),
            None => {
                error!("resource not found - {} in {}", res_name, self.name);
                None
            }
        }
    }

    pub fn create_object_item(
        self: Rc<Self>,
        item: &Rc<PackageItem>,
        factory: &dyn ObjectFactory,
    ) -> Option<Box<dyn UiObject>> {
        self.item_asset(item);
        let mut obj = factory.new_object(item)?;
        obj.set_source(&self, item);
        obj.construct_from_resource();
        Some(obj)
    }

    pub(crate) fn sprite(&self, sprite_id: &str) -> Option<AtlasSprite> {
        self.sprites.borrow().get(sprite_id).cloned()
    }

    /// Resolve an atlas item's surface, loading it on first access.
    fn atlas_texture(&self, atlas: &Rc<PackageItem>) -> Rc<Texture> {
        if atlas.texture.borrow().is_none() {
            self.load_atlas(atlas);
        }
        let tex = atlas.texture.borrow().clone();
        tex.expect("atlas resolution always yields a surface")
    }

    fn load_atlas(&self, item: &Rc<PackageItem>) {
        let (stem, ext) = split_file_ext(&item.file);

        let mut loaded = None;
        let mut policy = DestroyPolicy::Unload;
        match self.loader.load(&stem, &ext, AssetKind::Texture) {
            Some((LoadedAsset::Texture {
                handle,
                width,
                height,
            }, dm)) => {
                loaded = Some((handle, width, height));
                policy = dm;
            }
            Some(_) => warn!(
                "'{}' in package '{}' did not load as a texture; check the asset settings",
                item.file, self.name
            ),
            None => warn!("texture '{}' not found in package '{}'", item.file, self.name),
        }

        let native = match loaded {
            Some((handle, width, height)) => {
                let alpha = match self.loader.load(
                    &format!("{}{}", stem, ALPHA_SUFFIX),
                    &ext,
                    AssetKind::Texture,
                ) {
                    Some((LoadedAsset::Texture { handle, .. }, _)) => Some(handle),
                    _ => None,
                };
                NativeTexture {
                    handle: Some(handle),
                    alpha,
                    width,
                    height,
                }
            }
            None => {
                policy = DestroyPolicy::Destroy;
                NativeTexture::empty()
            }
        };

        let existing = item.texture.borrow().clone();
        match existing {
            Some(tex) => {
                tex.reload(native);
                tex.set_destroy_policy(policy);
            }
            None => {
                let tex = Texture::new_root(native, item.width, item.height, policy);
                *item.texture.borrow_mut() = Some(tex);
            }
        }
    }

    fn load_image(&self, item: &Rc<PackageItem>) {
        let tex = match self.sprite(&item.id) {
            Some(sprite) => {
                let atlas_tex = self.atlas_texture(&sprite.atlas);
                Texture::sub(&atlas_tex, sprite.rect, sprite.rotated)
            }
            None => Texture::shared_empty(),
        };
        *item.texture.borrow_mut() = Some(tex);
    }

    fn load_sound(&self, item: &Rc<PackageItem>) {
        let (stem, ext) = split_file_ext(&item.file);
        let mut native = None;
        let mut policy = DestroyPolicy::Unload;
        match self.loader.load(&stem, &ext, AssetKind::Audio) {
            Some((LoadedAsset::Audio(handle), dm)) => {
                native = Some(handle);
                policy = dm;
            }
            Some(_) => warn!(
                "'{}' in package '{}' did not load as an audio clip",
                item.file, self.name
            ),
            None => warn!("sound '{}' not found in package '{}'", item.file, self.name),
        }

        let existing = item.audio.borrow().clone();
        match existing {
            Some(clip) => {
                clip.reload(native);
                clip.set_destroy_policy(policy);
            }
            None => {
                *item.audio.borrow_mut() = Some(AudioClip::new(native, policy));
            }
        }
    }

    fn load_binary(&self, item: &Rc<PackageItem>) -> Option<Vec<u8>> {
        let (stem, ext) = split_file_ext(&item.file);
        match self.loader.load(&stem, &ext, AssetKind::Bytes) {
            Some((LoadedAsset::Bytes(bytes), _)) => Some(bytes),
            Some((LoadedAsset::Text(text), _)) => Some(text.into_bytes()),
            Some(_) => {
                warn!(
                    "'{}' in package '{}' did not load as binary data",
                    item.file, self.name
                );
                None
            }
            None => {
                debug!("binary '{}' not found in package '{}'", item.file, self.name);
                None
            }
        }
    }

    fn load_movie_clip(&self, item: &Rc<PackageItem>) {
        let Some(raw) = &item.raw_data else {
            error!("movie clip '{}' in '{}' has no payload", item.id, self.name);
            return;
        };
        match self.decode_movie_clip(item, raw.clone()) {
            Ok(data) => *item.frames.borrow_mut() = Some(Rc::new(data)),
            Err(e) => error!(
                "failed to decode movie clip '{}' in '{}': {}",
                item.id, self.name, e
            ),
        }
    }

    fn decode_movie_clip(
        &self,
        item: &Rc<PackageItem>,
        mut buf: ByteBuf,
    ) -> io::Result<MovieClipData> {
        if !buf.seek(0, 0)? {
            return Err(payload_section_missing("movie clip", 0));
        }
        let interval = buf.read_i32()? as f32 / 1000.0;
        let swing = buf.read_bool()?;
        let repeat_delay = buf.read_i32()? as f32 / 1000.0;

        if !buf.seek(0, 1)? {
            return Err(payload_section_missing("movie clip", 1));
        }
        let frame_count = buf.read_i16()?;
        let mut frames = Vec::with_capacity(frame_count.max(0) as usize);
        for _ in 0..frame_count {
            let declared = buf.read_i16()? as i64;
            let next = checked_next(&buf, declared)?;
            let rect = Rect::new(
                buf.read_i32()? as f32,
                buf.read_i32()? as f32,
                buf.read_i32()? as f32,
                buf.read_i32()? as f32,
            );
            let add_delay = buf.read_i32()? as f32 / 1000.0;
            let sprite_id = buf.read_pooled_string()?;

            let mut frame = MovieFrame {
                rect,
                add_delay,
                uv_rect: Rect::default(),
                rotated: false,
            };
            if let Some(sprite) = sprite_id.as_deref().and_then(|id| self.sprite(id)) {
                // Frames share one atlas surface, resolved on the first
                // frame that needs it.
                let existing = item.texture.borrow().clone();
                let tex = match existing {
                    Some(tex) => tex,
                    None => {
                        let tex = self.atlas_texture(&sprite.atlas);
                        *item.texture.borrow_mut() = Some(Rc::clone(&tex));
                        tex
                    }
                };
                let (tw, th) = (tex.width(), tex.height());
                let tuv = tex.uv_rect();
                frame.uv_rect = Rect::new(
                    sprite.rect.x / tw * tuv.width,
                    1.0 - sprite.rect.y_max() * tuv.height / th,
                    sprite.rect.width * tuv.width / tw,
                    sprite.rect.height * tuv.height / th,
                );
                frame.rotated = sprite.rotated;
                if frame.rotated {
                    std::mem::swap(&mut frame.uv_rect.width, &mut frame.uv_rect.height);
                }
            }
            frames.push(frame);
            buf.set_pos(next)?;
        }

        Ok(MovieClipData {
            interval,
            swing,
            repeat_delay,
            frames,
        })
    }

    fn load_font(&self, item: &Rc<PackageItem>) {
        let Some(raw) = &item.raw_data else {
            error!("font '{}' in '{}' has no payload", item.id, self.name);
            return;
        };
        match self.decode_font(item, raw.clone()) {
            Ok(font) => *item.bitmap_font.borrow_mut() = Some(Rc::new(font)),
            Err(e) => error!(
                "failed to decode font '{}' in '{}': {}",
                item.id, self.name, e
            ),
        }
    }

    fn decode_font(&self, item: &Rc<PackageItem>, mut buf: ByteBuf) -> io::Result<BitmapFont> {
        if !buf.seek(0, 0)? {
            return Err(payload_section_missing("font", 0));
        }
        let ttf = buf.read_bool()?;
        let can_tint = buf.read_bool()?;
        let resizable = buf.read_bool()?;
        let has_channel = buf.read_bool()?;
        let mut font_size = buf.read_i32()?;
        let xadvance = buf.read_i32()?;
        let line_height = buf.read_i32()?;

        // TTF-rendered glyphs are all cut from one shared sprite belonging
        // to the font item itself.
        let main_sprite = if ttf { self.sprite(&item.id) } else { None };
        let mut main_texture: Option<Rc<Texture>> = None;
        let mut tex_scale = (1.0_f32, 1.0_f32);
        if let Some(sprite) = &main_sprite {
            let tex = self.atlas_texture(&sprite.atlas);
            let tuv = tex.uv_rect();
            tex_scale = (tuv.width / tex.width(), tuv.height / tex.height());
            main_texture = Some(tex);
        }

        if !buf.seek(0, 1)? {
            return Err(payload_section_missing("font", 1));
        }
        let count = buf.read_i32()?;
        let mut glyphs = HashMap::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            let declared = buf.read_i16()? as i64;
            let next = checked_next(&buf, declared)?;
            let ch = buf.read_char()?;
            let img = buf.read_pooled_string()?;
            let bx = buf.read_i32()?;
            let by = buf.read_i32()?;
            let mut glyph = BitmapGlyph {
                offset_x: buf.read_i32()?,
                offset_y: buf.read_i32()?,
                width: buf.read_i32()?,
                height: buf.read_i32()?,
                advance: buf.read_i32()?,
                ..BitmapGlyph::default()
            };
            glyph.channel = remap_channel(buf.read_u8()?);

            if ttf {
                if let Some(sprite) = &main_sprite {
                    let (sx, sy) = tex_scale;
                    let (w, h) = (glyph.width as f32, glyph.height as f32);
                    if sprite.rotated {
                        glyph.uv[0] = glam::Vec2::new(
                            (by as f32 + h + sprite.rect.x) * sx,
                            1.0 - (sprite.rect.y_max() - bx as f32) * sy,
                        );
                        glyph.uv[1] = glam::Vec2::new(glyph.uv[0].x - h * sx, glyph.uv[0].y);
                        glyph.uv[2] = glam::Vec2::new(glyph.uv[1].x, glyph.uv[0].y + w * sy);
                        glyph.uv[3] = glam::Vec2::new(glyph.uv[0].x, glyph.uv[2].y);
                    } else {
                        glyph.uv[0] = glam::Vec2::new(
                            (bx as f32 + sprite.rect.x) * sx,
                            1.0 - (by as f32 + h + sprite.rect.y) * sy,
                        );
                        glyph.uv[1] = glam::Vec2::new(glyph.uv[0].x, glyph.uv[0].y + h * sy);
                        glyph.uv[2] = glam::Vec2::new(glyph.uv[0].x + w * sx, glyph.uv[1].y);
                        glyph.uv[3] = glam::Vec2::new(glyph.uv[2].x, glyph.uv[0].y);
                    }
                }
                glyph.line_height = line_height;
            } else {
                // Legacy mode: each glyph is its own image sub-item.
                if let Some(char_item) = img.as_deref().and_then(|id| self.item(id)) {
                    self.item_asset(&char_item);
                    if let Some(char_tex) = char_item.texture.borrow().clone() {
                        let uv_rect = char_tex.uv_rect();
                        glyph.uv[0] = glam::Vec2::new(uv_rect.x, uv_rect.y);
                        glyph.uv[1] = glam::Vec2::new(uv_rect.x, uv_rect.y_max());
                        glyph.uv[2] = glam::Vec2::new(uv_rect.x_max(), uv_rect.y_max());
                        glyph.uv[3] = glam::Vec2::new(uv_rect.x_max(), uv_rect.y);
                        if char_tex.rotated() {
                            rotate_uv(&mut glyph.uv, &uv_rect);
                        }
                        glyph.width = char_tex.width() as i32;
                        glyph.height = char_tex.height() as i32;
                        if main_texture.is_none() {
                            main_texture = Some(char_tex.root(&char_tex));
                        }
                    }
                }

                if font_size == 0 {
                    font_size = glyph.height;
                }
                if glyph.advance == 0 {
                    if xadvance == 0 {
                        glyph.advance = glyph.offset_x + glyph.width;
                    } else {
                        glyph.advance = xadvance;
                    }
                }
                glyph.line_height = if glyph.offset_y < 0 {
                    glyph.height
                } else {
                    glyph.offset_y + glyph.height
                };
                if glyph.line_height < font_size {
                    glyph.line_height = font_size;
                }
            }

            glyphs.insert(ch, glyph);
            buf.set_pos(next)?;
        }

        Ok(BitmapFont::new(
            format!("{}{}{}", crate::registry::URL_PREFIX, self.id, item.id),
            font_size,
            ttf,
            can_tint,
            resizable,
            has_channel,
            main_texture,
            glyphs,
        ))
    }
}

fn payload_section_missing(what: &str, slot: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{} payload has no section {}", what, slot),
    )
}

/// Absolute position of the next entry from its declared relative offset,
/// validated against the buffer range.
fn checked_next(buf: &ByteBuf, declared: i64) -> io::Result<usize> {
    let next = declared + buf.pos() as i64;
    if next < 0 || next as usize > buf.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("entry offset {} outside buffer of {} bytes", next, buf.len()),
        ));
    }
    Ok(next as usize)
}

fn split_file_ext(file: &str) -> (String, String) {
    match file.rfind('.') {
        Some(i) => (file[..i].to_string(), file[i..].to_string()),
        None => (file.to_string(), String::new()),
    }
}
