use std::any::Any;
use std::rc::Rc;

/// An opaque engine-side handle (texture object, audio clip, ...) owned by
/// the embedding application. The loader never looks inside.
pub type NativeHandle = Rc<dyn Any>;

/// What a [`ResourceLoader`] is being asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetKind {
    /// The binary package descriptor itself.
    Descriptor,
    Texture,
    Audio,
    Bytes,
}

/// How a loaded asset should be released when its package goes away.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DestroyPolicy {
    #[default]
    Unload,
    Destroy,
    None,
}

/// Asset produced by the embedder's loader.
pub enum LoadedAsset {
    Texture {
        handle: NativeHandle,
        /// Actual decoded pixel size, which may differ from the size the
        /// package declares (platform-specific compression, downscaling).
        width: u32,
        height: u32,
    },
    Audio(NativeHandle),
    Bytes(Vec<u8>),
    Text(String),
}

/// Resolves a logical file name to a platform asset.
///
/// `stem` carries no extension; `ext` keeps its leading dot. Returning
/// `None` is not fatal - the resolver degrades the resource to a
/// placeholder and the package load still succeeds.
pub trait ResourceLoader {
    fn load(&self, stem: &str, ext: &str, kind: AssetKind) -> Option<(LoadedAsset, DestroyPolicy)>;
}
