#![allow(dead_code)]

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use uipack::{
    AssetKind, DestroyPolicy, LoadedAsset, ObjectFactory, Package, PackageItem, ResourceLoader,
    UiObject,
};

const STR_NULL: u16 = 65534;

/// Builds synthetic package buffers in the binary descriptor layout, for
/// driving the loader end-to-end. Section offsets are emitted through the
/// index table, with a physical order that differs from the logical one on
/// purpose.
pub struct PackageBuilder {
    id: String,
    name: String,
    version: i32,
    strings: Vec<String>,
    deps: Vec<(u16, u16)>,
    items: Vec<Vec<u8>>,
    sprites: Vec<Vec<u8>>,
    hit_tests: Vec<Vec<u8>>,
}

impl PackageBuilder {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            version: 3,
            strings: Vec::new(),
            deps: Vec::new(),
            items: Vec::new(),
            sprites: Vec::new(),
            hit_tests: Vec::new(),
        }
    }

    pub fn version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    fn sref(&mut self, s: Option<&str>) -> u16 {
        match s {
            None => STR_NULL,
            Some(s) => {
                if let Some(i) = self.strings.iter().position(|x| x == s) {
                    i as u16
                } else {
                    self.strings.push(s.to_string());
                    (self.strings.len() - 1) as u16
                }
            }
        }
    }

    pub fn add_dependency(&mut self, id: &str, name: &str) {
        let id = self.sref(Some(id));
        let name = self.sref(Some(name));
        self.deps.push((id, name));
    }

    fn item_header(
        &mut self,
        kind: u8,
        id: &str,
        name: Option<&str>,
        file: Option<&str>,
        width: i32,
        height: i32,
    ) -> Vec<u8> {
        let id = self.sref(Some(id));
        let name = self.sref(name);
        let file = self.sref(file);
        let mut body = Vec::new();
        body.push(kind);
        w_u16(&mut body, id);
        w_u16(&mut body, name);
        w_u16(&mut body, STR_NULL); // legacy path
        w_u16(&mut body, file);
        body.push(1); // exported
        w_i32(&mut body, width);
        w_i32(&mut body, height);
        body
    }

    pub fn add_atlas(&mut self, id: &str, name: Option<&str>, file: &str, width: i32, height: i32) {
        let body = self.item_header(4, id, name, Some(file), width, height);
        self.items.push(body);
    }

    pub fn add_image(&mut self, id: &str, name: Option<&str>, width: i32, height: i32) {
        let mut body = self.item_header(0, id, name, None, width, height);
        body.push(0); // scale option: none
        body.push(0); // smoothing
        self.items.push(body);
    }

    pub fn add_image_scale9(
        &mut self,
        id: &str,
        name: Option<&str>,
        width: i32,
        height: i32,
        grid: (i32, i32, i32, i32),
        tile_grid_indice: i32,
    ) {
        let mut body = self.item_header(0, id, name, None, width, height);
        body.push(1);
        w_i32(&mut body, grid.0);
        w_i32(&mut body, grid.1);
        w_i32(&mut body, grid.2);
        w_i32(&mut body, grid.3);
        w_i32(&mut body, tile_grid_indice);
        body.push(0); // smoothing
        self.items.push(body);
    }

    pub fn add_sound(&mut self, id: &str, name: Option<&str>, file: &str) {
        let body = self.item_header(2, id, name, Some(file), 0, 0);
        self.items.push(body);
    }

    pub fn add_misc(&mut self, id: &str, name: Option<&str>, file: &str) {
        let body = self.item_header(7, id, name, Some(file), 0, 0);
        self.items.push(body);
    }

    pub fn add_component(&mut self, id: &str, name: Option<&str>, extension: u8, payload: &[u8]) {
        let mut body = self.item_header(3, id, name, None, 100, 100);
        body.push(extension);
        w_i32(&mut body, payload.len() as i32);
        body.extend_from_slice(payload);
        self.items.push(body);
    }

    /// An item with an unrecognized kind tag; the parser must skip it via
    /// the declared-offset framing.
    pub fn add_unknown_kind(&mut self, tag: u8, id: &str) {
        let body = self.item_header(tag, id, None, None, 0, 0);
        self.items.push(body);
    }

    pub fn add_movie_clip(
        &mut self,
        id: &str,
        name: Option<&str>,
        width: i32,
        height: i32,
        interval_ms: i32,
        swing: bool,
        repeat_delay_ms: i32,
        frames: &[MovieFrameSpec],
    ) {
        let mut sec0 = Vec::new();
        w_i32(&mut sec0, interval_ms);
        sec0.push(swing as u8);
        w_i32(&mut sec0, repeat_delay_ms);

        let mut sec1 = Vec::new();
        w_i16(&mut sec1, frames.len() as i16);
        for f in frames {
            let sprite = self.sref(f.sprite_id.as_deref());
            let mut fb = Vec::new();
            w_i32(&mut fb, f.rect.0);
            w_i32(&mut fb, f.rect.1);
            w_i32(&mut fb, f.rect.2);
            w_i32(&mut fb, f.rect.3);
            w_i32(&mut fb, f.add_delay_ms);
            w_u16(&mut fb, sprite);
            w_i16(&mut sec1, fb.len() as i16);
            sec1.extend_from_slice(&fb);
        }
        let payload = two_section_payload(&sec0, &sec1);

        let mut body = self.item_header(1, id, name, None, width, height);
        body.push(0); // smoothing
        w_i32(&mut body, payload.len() as i32);
        body.extend_from_slice(&payload);
        self.items.push(body);
    }

    pub fn add_font(&mut self, id: &str, name: Option<&str>, spec: FontSpec) {
        let mut sec0 = Vec::new();
        sec0.push(spec.ttf as u8);
        sec0.push(spec.can_tint as u8);
        sec0.push(spec.resizable as u8);
        sec0.push(spec.has_channel as u8);
        w_i32(&mut sec0, spec.size);
        w_i32(&mut sec0, spec.xadvance);
        w_i32(&mut sec0, spec.line_height);

        let mut sec1 = Vec::new();
        w_i32(&mut sec1, spec.glyphs.len() as i32);
        for g in &spec.glyphs {
            let img = self.sref(g.img.as_deref());
            let mut gb = Vec::new();
            w_u16(&mut gb, g.ch as u16);
            w_u16(&mut gb, img);
            w_i32(&mut gb, g.bx);
            w_i32(&mut gb, g.by);
            w_i32(&mut gb, g.offset_x);
            w_i32(&mut gb, g.offset_y);
            w_i32(&mut gb, g.width);
            w_i32(&mut gb, g.height);
            w_i32(&mut gb, g.advance);
            gb.push(g.channel);
            w_i16(&mut sec1, gb.len() as i16);
            sec1.extend_from_slice(&gb);
        }
        let payload = two_section_payload(&sec0, &sec1);

        let mut body = self.item_header(5, id, name, None, 0, 0);
        w_i32(&mut body, payload.len() as i32);
        body.extend_from_slice(&payload);
        self.items.push(body);
    }

    /// Append junk to the last item body; its declared next-entry offset
    /// grows accordingly, the readable fields do not.
    pub fn pad_last_item(&mut self, junk: usize) {
        let body = self.items.last_mut().expect("no item to pad");
        body.extend(std::iter::repeat_n(0xee, junk));
    }

    pub fn add_sprite(
        &mut self,
        sprite_id: &str,
        atlas_id: &str,
        rect: (i32, i32, i32, i32),
        rotated: bool,
    ) {
        let sprite = self.sref(Some(sprite_id));
        let atlas = self.sref(Some(atlas_id));
        let mut body = Vec::new();
        w_u16(&mut body, sprite);
        w_u16(&mut body, atlas);
        w_i32(&mut body, rect.0);
        w_i32(&mut body, rect.1);
        w_i32(&mut body, rect.2);
        w_i32(&mut body, rect.3);
        body.push(rotated as u8);
        self.sprites.push(body);
    }

    pub fn pad_last_sprite(&mut self, junk: usize) {
        let body = self.sprites.last_mut().expect("no sprite to pad");
        body.extend(std::iter::repeat_n(0xee, junk));
    }

    pub fn add_hit_test(&mut self, item_id: &str, blob: &[u8]) {
        let item = self.sref(Some(item_id));
        let mut body = Vec::new();
        w_u16(&mut body, item);
        body.extend_from_slice(blob);
        self.hit_tests.push(body);
    }

    pub fn build(&self) -> Vec<u8> {
        let mut deps = Vec::new();
        w_i16(&mut deps, self.deps.len() as i16);
        for (id, name) in &self.deps {
            w_u16(&mut deps, *id);
            w_u16(&mut deps, *name);
        }

        let mut strings = Vec::new();
        w_i32(&mut strings, self.strings.len() as i32);
        for s in &self.strings {
            w_str(&mut strings, s);
        }

        let mut items = Vec::new();
        w_i16(&mut items, self.items.len() as i16);
        for body in &self.items {
            w_i32(&mut items, body.len() as i32);
            items.extend_from_slice(body);
        }

        let mut sprites = Vec::new();
        w_i16(&mut sprites, self.sprites.len() as i16);
        for body in &self.sprites {
            w_i16(&mut sprites, body.len() as i16);
            sprites.extend_from_slice(body);
        }

        let hit = if self.hit_tests.is_empty() {
            None
        } else {
            let mut out = Vec::new();
            w_i16(&mut out, self.hit_tests.len() as i16);
            for body in &self.hit_tests {
                w_i32(&mut out, body.len() as i32);
                out.extend_from_slice(body);
            }
            Some(out)
        };

        let mut out = Vec::new();
        w_u32(&mut out, 0x4647_5549);
        w_i32(&mut out, self.version);
        out.push(0); // compressed flag
        w_str(&mut out, &self.id);
        w_str(&mut out, &self.name);
        out.extend_from_slice(&[0u8; 20]);

        // Physical section order differs from the slot order on purpose;
        // the parser must follow the index table.
        let table_len = 2 + 5 * 4;
        let mut offset = table_len as i32;
        let mut place = |section: &[u8]| {
            let at = offset;
            offset += section.len() as i32;
            at
        };
        let items_off = place(&items);
        let sprites_off = place(&sprites);
        let strings_off = place(&strings);
        let deps_off = place(&deps);
        let hit_off = hit.as_deref().map(&mut place).unwrap_or(0);

        out.push(5); // slot count
        out.push(0); // wide entries
        w_i32(&mut out, deps_off); // slot 0
        w_i32(&mut out, items_off); // slot 1
        w_i32(&mut out, sprites_off); // slot 2
        w_i32(&mut out, hit_off); // slot 3
        w_i32(&mut out, strings_off); // slot 4

        out.extend_from_slice(&items);
        out.extend_from_slice(&sprites);
        out.extend_from_slice(&strings);
        out.extend_from_slice(&deps);
        if let Some(hit) = &hit {
            out.extend_from_slice(hit);
        }
        out
    }
}

pub struct MovieFrameSpec {
    pub rect: (i32, i32, i32, i32),
    pub add_delay_ms: i32,
    pub sprite_id: Option<String>,
}

#[derive(Default)]
pub struct FontSpec {
    pub ttf: bool,
    pub can_tint: bool,
    pub resizable: bool,
    pub has_channel: bool,
    pub size: i32,
    pub xadvance: i32,
    pub line_height: i32,
    pub glyphs: Vec<GlyphSpec>,
}

pub struct GlyphSpec {
    pub ch: char,
    pub img: Option<String>,
    pub bx: i32,
    pub by: i32,
    pub offset_x: i32,
    pub offset_y: i32,
    pub width: i32,
    pub height: i32,
    pub advance: i32,
    pub channel: u8,
}

impl Default for GlyphSpec {
    fn default() -> Self {
        Self {
            ch: 'a',
            img: None,
            bx: 0,
            by: 0,
            offset_x: 0,
            offset_y: 0,
            width: 0,
            height: 0,
            advance: 0,
            channel: 0,
        }
    }
}

fn two_section_payload(sec0: &[u8], sec1: &[u8]) -> Vec<u8> {
    let table_len = 2 + 2 * 4;
    let mut out = Vec::new();
    out.push(2);
    out.push(0);
    w_i32(&mut out, table_len as i32);
    w_i32(&mut out, (table_len + sec0.len()) as i32);
    out.extend_from_slice(sec0);
    out.extend_from_slice(sec1);
    out
}

fn w_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn w_i16(out: &mut Vec<u8>, v: i16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn w_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn w_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn w_str(out: &mut Vec<u8>, s: &str) {
    w_u16(out, s.len() as u16);
    out.extend_from_slice(s.as_bytes());
}

/// In-memory loader standing in for the embedding platform.
#[derive(Default)]
pub struct TestLoader {
    /// texture stem -> actual decoded pixel size
    pub textures: RefCell<HashMap<String, (u32, u32)>>,
    /// audio stem set
    pub sounds: RefCell<Vec<String>>,
    /// stem+ext -> raw bytes (descriptors and misc files)
    pub files: RefCell<HashMap<String, Vec<u8>>>,
    pub load_log: RefCell<Vec<String>>,
}

impl TestLoader {
    pub fn with_texture(self, stem: &str, width: u32, height: u32) -> Self {
        self.textures
            .borrow_mut()
            .insert(stem.to_string(), (width, height));
        self
    }

    pub fn with_sound(self, stem: &str) -> Self {
        self.sounds.borrow_mut().push(stem.to_string());
        self
    }

    pub fn with_file(self, name: &str, data: Vec<u8>) -> Self {
        self.files.borrow_mut().insert(name.to_string(), data);
        self
    }
}

impl ResourceLoader for TestLoader {
    fn load(&self, stem: &str, ext: &str, kind: AssetKind) -> Option<(LoadedAsset, DestroyPolicy)> {
        self.load_log.borrow_mut().push(format!("{}{}", stem, ext));
        match kind {
            AssetKind::Texture => {
                let (width, height) = *self.textures.borrow().get(stem)?;
                let handle: Rc<dyn Any> = Rc::new(stem.to_string());
                Some((
                    LoadedAsset::Texture {
                        handle,
                        width,
                        height,
                    },
                    DestroyPolicy::Unload,
                ))
            }
            AssetKind::Audio => {
                if self.sounds.borrow().iter().any(|s| s == stem) {
                    let handle: Rc<dyn Any> = Rc::new(stem.to_string());
                    Some((LoadedAsset::Audio(handle), DestroyPolicy::Unload))
                } else {
                    None
                }
            }
            AssetKind::Descriptor | AssetKind::Bytes => {
                let data = self
                    .files
                    .borrow()
                    .get(&format!("{}{}", stem, ext))
                    .cloned()?;
                Some((LoadedAsset::Bytes(data), DestroyPolicy::Unload))
            }
        }
    }
}

/// Host-side widget stub recording construction.
#[derive(Default)]
pub struct TestObject {
    pub source_item_id: Option<String>,
    pub source_package: Option<String>,
    pub constructed: bool,
}

impl UiObject for TestObject {
    fn set_source(&mut self, package: &Rc<Package>, item: &Rc<PackageItem>) {
        self.source_package = Some(package.name().to_string());
        self.source_item_id = Some(item.id.clone());
    }

    fn construct_from_resource(&mut self) {
        self.constructed = true;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Default)]
pub struct TestFactory {
    pub resolved_extensions: RefCell<Vec<String>>,
}

impl ObjectFactory for TestFactory {
    fn new_object(&self, _item: &Rc<PackageItem>) -> Option<Box<dyn UiObject>> {
        Some(Box::new(TestObject::default()))
    }

    fn resolve_package_item_extension(&self, item: &PackageItem) {
        self.resolved_extensions.borrow_mut().push(item.id.clone());
    }
}
