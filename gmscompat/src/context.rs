// SPDX-FileCopyrightText: 2023 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Explicit call-context tokens. Instead of walking the runtime call stack,
//! components that may end up calling into guarded operations announce
//! themselves with [`enter`] and the guard samples [`CallContext::current`].

use std::{
    cell::{Cell, RefCell},
    fmt,
    marker::PhantomData,
    sync::Arc,
};

thread_local! {
    static NEXT_ID: Cell<u64> = const { Cell::new(0) };
    static FRAMES: RefCell<Vec<(u64, Arc<str>)>> = const { RefCell::new(Vec::new()) };
}

/// Removes the frame pushed by [`enter`] when dropped. Only this guard's own
/// frame is removed, so guards may be dropped in any order.
#[must_use = "the frame is removed as soon as the guard is dropped"]
pub struct FrameGuard {
    id: u64,
    // Frames are per-thread, so the guard must be dropped on the same thread.
    _not_send: PhantomData<*const ()>,
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        FRAMES.with_borrow_mut(|frames| {
            if let Some(index) = frames.iter().rposition(|(id, _)| *id == self.id) {
                frames.remove(index);
            }
        });
    }
}

impl fmt::Debug for FrameGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameGuard")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Push `component` onto the current thread's call path.
pub fn enter(component: &str) -> FrameGuard {
    let id = NEXT_ID.replace(NEXT_ID.get() + 1);
    FRAMES.with_borrow_mut(|frames| frames.push((id, Arc::from(component))));

    FrameGuard {
        id,
        _not_send: PhantomData,
    }
}

/// Snapshot of the component names on a call path, outermost first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallContext {
    frames: Vec<Arc<str>>,
}

impl CallContext {
    pub fn current() -> Self {
        let frames = FRAMES.with_borrow(|frames| frames.iter().map(|(_, f)| f.clone()).collect());

        Self { frames }
    }

    pub fn from_frames<S: AsRef<str>>(frames: impl IntoIterator<Item = S>) -> Self {
        Self {
            frames: frames.into_iter().map(|f| Arc::from(f.as_ref())).collect(),
        }
    }

    pub fn frames(&self) -> impl Iterator<Item = &str> {
        self.frames.iter().map(|f| &**f)
    }

    /// Find the first frame whose name contains `marker`.
    pub fn find(&self, marker: &str) -> Option<&str> {
        self.frames().find(|f| f.contains(marker))
    }
}
