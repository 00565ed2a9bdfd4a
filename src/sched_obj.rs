use std::{
    cell::{Ref, RefCell, RefMut},
    rc::Rc,
    sync::{Arc, Mutex, MutexGuard},
};

// SchedObj lets test code mutably share objects (a scoreboard, a resumption
// log, etc.) between tasks. The simulation is single threaded, so Rc/RefCell
// are fine even though task futures must formally be Send.
pub struct SchedObj<T>(Rc<RefCell<T>>);

impl<T> SchedObj<T> {
    pub fn new(data: T) -> SchedObj<T> {
        SchedObj(Rc::new(RefCell::new(data)))
    }
    pub fn get(&self) -> Ref<T> {
        (*self.0).borrow()
    }
    pub fn get_mut(&self) -> RefMut<T> {
        (*self.0).borrow_mut()
    }
}

impl<T> Clone for SchedObj<T> {
    fn clone(&self) -> Self {
        SchedObj(self.0.clone())
    }
}

// Rc is neither Send nor Sync, but tasks only ever run on the scheduler
// thread. We save the locking overhead.
unsafe impl<T> Send for SchedObj<T> {}
unsafe impl<T> Sync for SchedObj<T> {}

// Lock-backed variant for state shared between the loop and coroutine-held
// contexts. Locks are uncontended by construction; try_lock failing means a
// reentrancy bug, so it panics rather than blocks.
#[derive(Debug)]
pub struct SchedObjSafe<T>(Arc<Mutex<T>>);

impl<T> SchedObjSafe<T> {
    pub fn new(data: T) -> SchedObjSafe<T> {
        SchedObjSafe(Arc::new(Mutex::new(data)))
    }
    pub fn get(&self) -> MutexGuard<T> {
        (*self.0).try_lock().expect("scheduler object locked reentrantly")
    }
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.get();
        f(&mut guard)
    }
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Clone for SchedObjSafe<T> {
    fn clone(&self) -> Self {
        SchedObjSafe(self.0.clone())
    }
}
