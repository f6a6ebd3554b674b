use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::loader::{DestroyPolicy, NativeHandle};

/// Opaque audio-clip wrapper. Wrapped once on first resolve; a reload
/// replaces the engine handle in place so dependents that captured the
/// wrapper keep working.
pub struct AudioClip {
    native: RefCell<Option<NativeHandle>>,
    destroy_policy: Cell<DestroyPolicy>,
}

impl AudioClip {
    pub fn new(native: Option<NativeHandle>, destroy_policy: DestroyPolicy) -> Rc<AudioClip> {
        Rc::new(AudioClip {
            native: RefCell::new(native),
            destroy_policy: Cell::new(destroy_policy),
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.native.borrow().is_some()
    }

    pub fn native(&self) -> Option<NativeHandle> {
        self.native.borrow().clone()
    }

    pub fn destroy_policy(&self) -> DestroyPolicy {
        self.destroy_policy.get()
    }

    pub fn set_destroy_policy(&self, policy: DestroyPolicy) {
        self.destroy_policy.set(policy);
    }

    pub fn reload(&self, native: Option<NativeHandle>) {
        *self.native.borrow_mut() = native;
    }

    pub fn unload(&self) {
        *self.native.borrow_mut() = None;
    }
}
