//! Observers of archive changes.
//!
//! Extensions are told about every structural change of a [`ZFile`]. A hook
//! never receives the archive itself; when an extension wants to change the
//! archive in response to an event it returns a [`DeferredAction`]. Actions
//! run after the event has been delivered to every extension, in the order
//! they were returned, so all extensions observe events in the same order
//! even when actions trigger further events.

use std::cell::RefCell;
use std::rc::Rc;

use crate::entry::StoredEntry;
use crate::{Result, ZFile};

/// Work an extension wants done on the archive once the current
/// notification completes.
pub type DeferredAction = Box<dyn FnOnce(&mut ZFile) -> Result<()>>;

/// Shared handle under which an extension is registered.
pub type ExtensionHandle = Rc<RefCell<dyn ZFileExtension>>;

/// Hook result: optionally, an action to run later.
pub type HookResult = Result<Option<DeferredAction>>;

/// Lifecycle hooks of an archive. All hooks do nothing by default.
pub trait ZFileExtension {
    /// The backing file has been opened for writing.
    fn open(&mut self) -> HookResult {
        Ok(None)
    }

    /// An update is about to start. Changes made from here are part of it.
    fn before_update(&mut self) -> HookResult {
        Ok(None)
    }

    /// All entries have been written; the central directory has not.
    ///
    /// May be delivered more than once per update if an action resets the
    /// central directory.
    fn entries_written(&mut self) -> HookResult {
        Ok(None)
    }

    /// The update has finished.
    fn updated(&mut self) -> HookResult {
        Ok(None)
    }

    /// The archive has been closed.
    fn closed(&mut self) {}

    /// `entry` was added, replacing `replaced` if an entry of the same name
    /// existed.
    fn added(&mut self, entry: &StoredEntry, replaced: Option<&StoredEntry>) -> HookResult {
        let _ = (entry, replaced);
        Ok(None)
    }

    /// `entry` was removed.
    fn removed(&mut self, entry: &StoredEntry) -> HookResult {
        let _ = entry;
        Ok(None)
    }
}

/// Deliver one event to a snapshot of `extensions`, collecting the actions
/// they return.
pub(crate) fn dispatch<F>(extensions: &[ExtensionHandle], mut hook: F) -> Result<Vec<DeferredAction>>
where
    F: FnMut(&mut dyn ZFileExtension) -> HookResult,
{
    let snapshot: Vec<ExtensionHandle> = extensions.to_vec();
    let mut actions = Vec::new();
    for extension in snapshot {
        if let Some(action) = hook(&mut *extension.borrow_mut())? {
            actions.push(action);
        }
    }
    Ok(actions)
}

/// Whether two handles refer to the same extension.
pub(crate) fn same_extension(a: &ExtensionHandle, b: &ExtensionHandle) -> bool {
    std::ptr::eq(
        Rc::as_ptr(a) as *const (),
        Rc::as_ptr(b) as *const (),
    )
}
