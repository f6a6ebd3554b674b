use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, error, warn};

use crate::error::PackageError;
use crate::factory::{AsyncCreationQueue, CreateObjectCallback, ObjectFactory, UiObject};
use crate::item::PackageItem;
use crate::loader::{AssetKind, LoadedAsset, ResourceLoader};
use crate::package::{ItemAsset, Package};

/// Scheme prefix of resource urls: `ui://<pkgId><itemId>` or
/// `ui://<pkgName>/<itemName>`.
pub const URL_PREFIX: &str = "ui://";

/// Suffix of the descriptor file next to a package's resource files.
const DESCRIPTOR_SUFFIX: &str = "_fui";
const DESCRIPTOR_EXT: &str = ".bytes";

/// Process-scoped table of loaded packages, keyed by id, by name and by
/// optional id aliases (asset path, custom id).
///
/// This is explicit state handed around by the embedding application, not
/// an implicit global; construct one per process at the assembly boundary.
/// Not thread-safe: concurrent loads must be serialized by the embedder.
#[derive(Default)]
pub struct PackageRegistry {
    by_id: HashMap<String, Rc<Package>>,
    by_name: HashMap<String, Rc<Package>>,
    list: Vec<Rc<Package>>,
    factory: Option<Rc<dyn ObjectFactory>>,
    pending: AsyncCreationQueue,
    editor_mode: bool,
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Editor mode re-sorts parsed item listings by name for deterministic
    /// tooling output and softens the bad-descriptor diagnostic.
    pub fn set_editor_mode(&mut self, editor_mode: bool) {
        self.editor_mode = editor_mode;
    }

    pub fn set_object_factory(&mut self, factory: Rc<dyn ObjectFactory>) {
        self.factory = Some(factory);
    }

    /// Load and register a package from a path understood by `loader`; the
    /// descriptor is fetched from `<asset_path>_fui.bytes`. Re-adding an
    /// already registered path returns the existing instance.
    pub fn add_package(
        &mut self,
        asset_path: &str,
        loader: Rc<dyn ResourceLoader>,
    ) -> Result<Rc<Package>, PackageError> {
        if let Some(existing) = self.by_id.get(asset_path) {
            return Ok(Rc::clone(existing));
        }

        let descriptor = loader.load(
            &format!("{}{}", asset_path, DESCRIPTOR_SUFFIX),
            DESCRIPTOR_EXT,
            AssetKind::Descriptor,
        );
        let data = match descriptor {
            Some((LoadedAsset::Bytes(data), _)) => data,
            Some((LoadedAsset::Text(text), _)) => text.into_bytes(),
            _ => {
                let err = PackageError::NotFound(asset_path.to_string());
                self.report_load_failure(&err);
                return Err(err);
            }
        };

        self.load_and_register(
            data,
            asset_path,
            Some(asset_path),
            Some(asset_path.to_string()),
            loader,
        )
    }

    /// Load and register a package from raw descriptor bytes. Companion
    /// resource files are addressed through `asset_prefix`.
    pub fn add_package_from_bytes(
        &mut self,
        data: Vec<u8>,
        asset_prefix: Option<&str>,
        loader: Rc<dyn ResourceLoader>,
    ) -> Result<Rc<Package>, PackageError> {
        self.load_and_register(data, "raw data", asset_prefix, None, loader)
    }

    fn load_and_register(
        &mut self,
        data: Vec<u8>,
        source: &str,
        asset_prefix: Option<&str>,
        asset_path: Option<String>,
        loader: Rc<dyn ResourceLoader>,
    ) -> Result<Rc<Package>, PackageError> {
        let by_id = &self.by_id;
        let result = Package::load(
            data,
            source,
            asset_prefix,
            asset_path,
            loader,
            self.factory.as_deref(),
            self.editor_mode,
            &|id| by_id.get(id).map(|p| p.name().to_string()),
        );
        let package = match result {
            Ok(package) => Rc::new(package),
            Err(err) => {
                self.report_load_failure(&err);
                return Err(err);
            }
        };

        self.by_id
            .insert(package.id().to_string(), Rc::clone(&package));
        self.by_name
            .insert(package.name().to_string(), Rc::clone(&package));
        if let Some(path) = package.asset_path() {
            self.by_id.insert(path.to_string(), Rc::clone(&package));
        }
        self.list.push(Rc::clone(&package));
        debug!("ui package '{}' ({}) loaded", package.name(), package.id());
        Ok(package)
    }

    fn report_load_failure(&self, err: &PackageError) {
        if self.editor_mode {
            warn!("{}", err);
        } else {
            error!("{}", err);
        }
    }

    pub fn get_by_id(&self, id: &str) -> Option<Rc<Package>> {
        self.by_id.get(id).cloned()
    }

    pub fn get_by_name(&self, name: &str) -> Option<Rc<Package>> {
        self.by_name.get(name).cloned()
    }

    /// Loaded packages in load order.
    pub fn packages(&self) -> &[Rc<Package>] {
        &self.list
    }

    /// Remove a package and dispose all of its resources.
    ///
    /// Panics when `id_or_name` matches nothing: unregistering an unknown
    /// package is a programmer error, unlike query-path misses.
    pub fn remove_package(&mut self, id_or_name: &str) {
        let package = self
            .by_id
            .get(id_or_name)
            .or_else(|| self.by_name.get(id_or_name))
            .cloned()
            .unwrap_or_else(|| {
                panic!("'{}' is not a registered package id or name", id_or_name)
            });

        package.dispose();
        self.by_id.remove(package.id());
        if let Some(custom) = package.custom_id() {
            self.by_id.remove(&custom);
        }
        if let Some(path) = package.asset_path() {
            let path = path.to_string();
            self.by_id.remove(&path);
        }
        self.by_name.remove(package.name());
        self.list.retain(|p| !Rc::ptr_eq(p, &package));
    }

    /// Dispose and drop every loaded package.
    pub fn remove_all_packages(&mut self) {
        for package in &self.list {
            package.dispose();
        }
        self.list.clear();
        self.by_id.clear();
        self.by_name.clear();
    }

    /// Maintain a user-chosen extra id alias for a package; replaces the
    /// previous alias if one was set.
    pub fn set_custom_id(&mut self, id_or_name: &str, custom_id: Option<&str>) {
        let Some(package) = self
            .by_id
            .get(id_or_name)
            .or_else(|| self.by_name.get(id_or_name))
            .cloned()
        else {
            error!("'{}' is not a registered package id or name", id_or_name);
            return;
        };

        if let Some(old) = package.custom_id.borrow_mut().take() {
            self.by_id.remove(&old);
        }
        if let Some(custom) = custom_id {
            self.by_id.insert(custom.to_string(), Rc::clone(&package));
            *package.custom_id.borrow_mut() = Some(custom.to_string());
        }
    }

    /// Resolve a resource url to its package and item.
    ///
    /// The id form packs an 8-character package id directly against the
    /// item id; the name form separates package and item names with `/`.
    pub fn item_by_url(&self, url: &str) -> Option<(Rc<Package>, Rc<PackageItem>)> {
        let pos1 = url.find("//")?;
        match url[pos1 + 2..].find('/') {
            None => {
                if url.len() > 13 {
                    let pkg_id = url.get(5..13)?;
                    let package = self.get_by_id(pkg_id)?;
                    let item = package.item(url.get(13..)?)?;
                    Some((package, item))
                } else {
                    None
                }
            }
            Some(sep) => {
                let pos2 = pos1 + 2 + sep;
                let package = self.get_by_name(url.get(pos1 + 2..pos2)?)?;
                let item = package.item_by_name(url.get(pos2 + 1..)?)?;
                Some((package, item))
            }
        }
    }

    /// Url of a named resource in id form, `ui://<pkgId><itemId>`.
    pub fn item_url(&self, pkg_name: &str, res_name: &str) -> Option<String> {
        let package = self.get_by_name(pkg_name)?;
        let item = package.item_by_name(res_name)?;
        Some(format!("{}{}{}", URL_PREFIX, package.id(), item.id))
    }

    /// Convert a name-form url to id form. Id-form input passes through;
    /// anything unresolvable is `None`.
    pub fn normalize_url(&self, url: &str) -> Option<String> {
        let pos1 = url.find("//")?;
        match url[pos1 + 2..].find('/') {
            None => Some(url.to_string()),
            Some(sep) => {
                let pos2 = pos1 + 2 + sep;
                self.item_url(url.get(pos1 + 2..pos2)?, url.get(pos2 + 1..)?)
            }
        }
    }

    pub fn get_item_asset(&self, pkg_name: &str, res_name: &str) -> Option<ItemAsset> {
        match self.get_by_name(pkg_name) {
            Some(package) => package.item_asset_by_name(res_name),
            None => {
                error!("package not found - {}", pkg_name);
                None
            }
        }
    }

    pub fn get_item_asset_by_url(&self, url: &str) -> Option<ItemAsset> {
        let (package, item) = self.item_by_url(url)?;
        package.item_asset(&item)
    }

    pub fn create_object(&self, pkg_name: &str, res_name: &str) -> Option<Box<dyn UiObject>> {
        let factory = self.require_factory()?;
        match self.get_by_name(pkg_name) {
            Some(package) => package.create_object(res_name, factory.as_ref()),
            None => {
                error!("package not found - {}", pkg_name);
                None
            }
        }
    }

    pub fn create_object_from_url(&self, url: &str) -> Option<Box<dyn UiObject>> {
        let factory = self.require_factory()?;
        match self.item_by_url(url) {
            Some((package, item)) => package.create_object_item(&item, factory.as_ref()),
            None => {
                error!("resource not found - {}", url);
                None
            }
        }
    }

    /// Resolve now, construct later: the item's asset is materialized
    /// immediately, the object itself is built on a subsequent
    /// [`PackageRegistry::tick_async_creations`] call.
    pub fn create_object_async(
        &self,
        pkg_name: &str,
        res_name: &str,
        callback: CreateObjectCallback,
    ) {
        let Some(package) = self.get_by_name(pkg_name) else {
            error!("package not found - {}", pkg_name);
            return;
        };
        let Some(item) = package.item_by_name(res_name) else {
            error!("resource not found - {} in {}", res_name, pkg_name);
            return;
        };
        package.item_asset(&item);
        self.pending.enqueue(package, item, callback);
    }

    /// Construct at most one deferred object per call, cooperative with
    /// the host scheduler's tick. Returns whether work remains.
    pub fn tick_async_creations(&self) -> bool {
        let Some(factory) = self.require_factory() else {
            return !self.pending.is_empty();
        };
        self.pending.tick(factory.as_ref())
    }

    fn require_factory(&self) -> Option<Rc<dyn ObjectFactory>> {
        if self.factory.is_none() {
            error!("no object factory installed on this registry");
        }
        self.factory.clone()
    }
}
