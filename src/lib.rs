//! Runtime UI asset-package loader.
//!
//! Parses the binary package format describing UI components, fonts,
//! atlases, sounds and sprites, lazily materializes renderable assets from
//! the descriptors, and instantiates UI object trees through an embedder
//! supplied factory. Rendering, audio decoding and scene-graph attachment
//! stay behind the [`loader::ResourceLoader`] and [`factory::ObjectFactory`]
//! collaborator traits.
//!
//! Single-threaded by design: parsing and resolution run on the caller's
//! thread with no internal locking.

pub mod audio;
pub mod buffer;
pub mod error;
pub mod factory;
pub mod font;
pub mod item;
pub mod loader;
pub mod package;
pub mod registry;
pub mod texture;

pub use audio::AudioClip;
pub use buffer::ByteBuf;
pub use error::PackageError;
pub use factory::{CreateObjectCallback, ObjectFactory, UiObject};
pub use font::{BitmapFont, BitmapGlyph, GlyphInfo};
pub use item::{
    AtlasSprite, ItemKind, MovieClipData, MovieFrame, ObjectType, PackageDependency, PackageItem,
    PixelHitTestData, Rect,
};
pub use loader::{AssetKind, DestroyPolicy, LoadedAsset, NativeHandle, ResourceLoader};
pub use package::{ItemAsset, PACKAGE_MAGIC, Package};
pub use registry::{PackageRegistry, URL_PREFIX};
pub use texture::{NativeTexture, Texture};
