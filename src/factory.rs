use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::item::PackageItem;
use crate::package::Package;

/// A constructed UI object. The concrete widget types live in the
/// embedding application; this crate only tags the object with its source
/// item and triggers tree assembly.
pub trait UiObject: Any {
    /// Called before construction with the package and item the object was
    /// created from.
    fn set_source(&mut self, package: &Rc<Package>, item: &Rc<PackageItem>);

    /// Assemble the object's UI tree from its resolved resource.
    fn construct_from_resource(&mut self);

    fn as_any(&self) -> &dyn Any;
}

/// Object-construction collaborator supplied by the embedder.
pub trait ObjectFactory {
    /// Instantiate the host-side object for an item; `None` if the item's
    /// archetype is not constructible.
    fn new_object(&self, item: &Rc<PackageItem>) -> Option<Box<dyn UiObject>>;

    /// Hook invoked while component entries are parsed, letting the host
    /// override the archetype classification stored in the package.
    fn resolve_package_item_extension(&self, _item: &PackageItem) {}
}

pub type CreateObjectCallback = Box<dyn FnOnce(Option<Box<dyn UiObject>>)>;

struct PendingCreation {
    package: Rc<Package>,
    item: Rc<PackageItem>,
    callback: CreateObjectCallback,
}

/// Deferred-construction façade. Resources are resolved synchronously when
/// a creation is queued; only the construction step waits for a later tick,
/// cooperative with the host scheduler.
#[derive(Default)]
pub(crate) struct AsyncCreationQueue {
    queue: RefCell<VecDeque<PendingCreation>>,
}

impl AsyncCreationQueue {
    pub fn enqueue(
        &self,
        package: Rc<Package>,
        item: Rc<PackageItem>,
        callback: CreateObjectCallback,
    ) {
        self.queue.borrow_mut().push_back(PendingCreation {
            package,
            item,
            callback,
        });
    }

    /// Construct at most one queued object. Returns whether work remains.
    pub fn tick(&self, factory: &dyn ObjectFactory) -> bool {
        let pending = self.queue.borrow_mut().pop_front();
        if let Some(p) = pending {
            let obj = p.package.create_object_item(&p.item, factory);
            (p.callback)(obj);
        }
        !self.queue.borrow().is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}
