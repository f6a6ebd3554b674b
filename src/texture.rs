use glam::Vec2;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::item::Rect;
use crate::loader::{DestroyPolicy, NativeHandle};

/// Decoded pixel surface: an opaque engine handle plus its actual pixel
/// size and optional separate alpha-channel companion.
#[derive(Clone)]
pub struct NativeTexture {
    pub handle: Option<NativeHandle>,
    pub alpha: Option<NativeHandle>,
    pub width: u32,
    pub height: u32,
}

impl NativeTexture {
    /// Generated placeholder surface used when backing pixel data is
    /// missing or has the wrong format.
    pub fn empty() -> Self {
        Self {
            handle: None,
            alpha: None,
            width: 2,
            height: 2,
        }
    }
}

/// A logical texture: either a root surface owning a reloadable native
/// cell, or a cropped (possibly transposed) sub-region view of one.
///
/// The owning package item holds the root; every dependent view re-reads
/// the native cell through its root reference, so replacing pixel data in
/// place reaches all of them without changing anyone's identity.
pub struct Texture {
    root: Option<Rc<Texture>>,
    region: Rect,
    rotated: bool,
    uv_rect: Cell<Rect>,
    /// Declared (authoring-time) size the UV scale is computed against.
    declared: (f32, f32),
    native: RefCell<Option<NativeTexture>>,
    destroy_policy: Cell<DestroyPolicy>,
}

thread_local! {
    static EMPTY: Rc<Texture> =
        Texture::new_root(NativeTexture::empty(), 2, 2, DestroyPolicy::None);
}

impl Texture {
    pub fn new_root(
        native: NativeTexture,
        declared_width: i32,
        declared_height: i32,
        destroy_policy: DestroyPolicy,
    ) -> Rc<Texture> {
        let declared = (declared_width.max(1) as f32, declared_height.max(1) as f32);
        let uv = Rect::new(
            0.0,
            0.0,
            native.width as f32 / declared.0,
            native.height as f32 / declared.1,
        );
        Rc::new(Texture {
            root: None,
            region: Rect::new(0.0, 0.0, declared.0, declared.1),
            rotated: false,
            uv_rect: Cell::new(uv),
            declared,
            native: RefCell::new(Some(native)),
            destroy_policy: Cell::new(destroy_policy),
        })
    }

    /// The process-wide placeholder bound to images with no sprite mapping.
    pub fn shared_empty() -> Rc<Texture> {
        EMPTY.with(Rc::clone)
    }

    /// A view over `region` of `parent`'s surface. The UV rect is
    /// normalized against the surface's current pixel size; a transposed
    /// sprite swaps its UV width/height.
    pub fn sub(parent: &Rc<Texture>, region: Rect, rotated: bool) -> Rc<Texture> {
        let root = parent.root(parent);
        let mut region = region;
        region.x += parent.region.x;
        region.y += parent.region.y;

        let (pw, ph) = root.surface_size();
        let ruv = root.uv_rect.get();
        let mut uv = Rect::new(
            region.x * ruv.width / pw,
            1.0 - region.y_max() * ruv.height / ph,
            region.width * ruv.width / pw,
            region.height * ruv.height / ph,
        );
        if rotated {
            std::mem::swap(&mut uv.width, &mut uv.height);
        }
        Rc::new(Texture {
            root: Some(root),
            region,
            rotated,
            uv_rect: Cell::new(uv),
            declared: (region.width, region.height),
            native: RefCell::new(None),
            destroy_policy: Cell::new(DestroyPolicy::None),
        })
    }

    /// Root surface this texture reads pixels through (itself for roots).
    pub fn root(&self, self_rc: &Rc<Texture>) -> Rc<Texture> {
        match &self.root {
            Some(r) => Rc::clone(r),
            None => Rc::clone(self_rc),
        }
    }

    pub fn is_root(&self) -> bool {
        self.root.is_none()
    }

    pub fn uv_rect(&self) -> Rect {
        self.uv_rect.get()
    }

    pub fn rotated(&self) -> bool {
        self.rotated
    }

    pub fn region(&self) -> Rect {
        self.region
    }

    pub fn destroy_policy(&self) -> DestroyPolicy {
        self.destroy_policy.get()
    }

    pub fn set_destroy_policy(&self, policy: DestroyPolicy) {
        self.destroy_policy.set(policy);
    }

    /// Logical pixel width: the region size for views, the actual surface
    /// size for roots.
    pub fn width(&self) -> f32 {
        if self.root.is_some() {
            self.region.width
        } else {
            self.surface_size().0
        }
    }

    pub fn height(&self) -> f32 {
        if self.root.is_some() {
            self.region.height
        } else {
            self.surface_size().1
        }
    }

    /// Actual pixel size of the root surface; falls back to the declared
    /// size while unloaded so UV math stays finite.
    fn surface_size(&self) -> (f32, f32) {
        match &*self.native.borrow() {
            Some(n) => (n.width.max(1) as f32, n.height.max(1) as f32),
            None => self.declared,
        }
    }

    /// Whether the root surface currently has decoded pixel data.
    pub fn is_loaded(&self) -> bool {
        match &self.root {
            Some(r) => r.is_loaded(),
            None => self.native.borrow().is_some(),
        }
    }

    /// Engine handle of the root surface, if loaded.
    pub fn native_handle(&self) -> Option<NativeHandle> {
        match &self.root {
            Some(r) => r.native_handle(),
            None => self.native.borrow().as_ref().and_then(|n| n.handle.clone()),
        }
    }

    pub fn alpha_handle(&self) -> Option<NativeHandle> {
        match &self.root {
            Some(r) => r.alpha_handle(),
            None => self.native.borrow().as_ref().and_then(|n| n.alpha.clone()),
        }
    }

    /// Actual pixel size of the root surface, if loaded.
    pub fn native_size(&self) -> Option<(u32, u32)> {
        match &self.root {
            Some(r) => r.native_size(),
            None => self.native.borrow().as_ref().map(|n| (n.width, n.height)),
        }
    }

    /// Replace the root surface's pixel data in place. Identity is
    /// preserved: every view that already captured this texture keeps
    /// working and observes the new data.
    pub fn reload(&self, native: NativeTexture) {
        debug_assert!(self.is_root(), "reload targets the root surface");
        let uv = Rect::new(
            0.0,
            0.0,
            native.width as f32 / self.declared.0,
            native.height as f32 / self.declared.1,
        );
        self.uv_rect.set(uv);
        *self.native.borrow_mut() = Some(native);
    }

    /// Drop the decoded pixel data, keeping the descriptor-side identity so
    /// a later resolve re-decodes into the same cell.
    pub fn unload(&self) {
        *self.native.borrow_mut() = None;
    }

    /// Package teardown; the root surface is released exactly once here no
    /// matter how many views referenced it.
    pub fn dispose(&self) {
        *self.native.borrow_mut() = None;
    }
}

/// Remap a UV quad for a sprite whose pixels are stored transposed.
pub fn rotate_uv(uv: &mut [Vec2; 4], base: &Rect) {
    let x_min = base.x.min(base.x_max());
    let mut y_min = base.y;
    let mut y_max = base.y_max();
    if y_min > y_max {
        std::mem::swap(&mut y_min, &mut y_max);
    }
    for p in uv.iter_mut() {
        let tmp = p.y;
        p.y = y_min + p.x - x_min;
        p.x = x_min + y_max - tmp;
    }
}
