use std::ops::{Deref, DerefMut};

use crate::surface::{Generation, MutationRecord, Surface};

/// Tracks the engine's own write batches so their mutation records are not mistaken for host
/// activity.
#[derive(Debug, Default)]
pub struct SelfWrites {
    generation: Generation,
    writing: bool,
}

impl SelfWrites {
    /// No batch written yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a write batch under a fresh generation.
    ///
    /// Records the surface produces while the batch is alive carry that generation. Dropping the
    /// batch ends the stamping and clears the writing flag, on every exit path.
    pub fn begin<'a, S: Surface + ?Sized>(&'a mut self, surface: &'a mut S) -> WriteBatch<'a, S> {
        self.generation = Generation(self.generation.0 + 1);
        self.writing = true;
        surface.stamp_self_writes(Some(self.generation));
        WriteBatch {
            surface,
            writing: &mut self.writing,
        }
    }

    /// Whether a batch is currently open.
    pub fn is_writing(&self) -> bool {
        self.writing
    }

    /// Generation of the most recent batch.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Whether `record` was produced by one of our batches.
    pub fn is_own(&self, record: &MutationRecord) -> bool {
        record.self_write.is_some_and(|g| g <= self.generation)
    }
}

/// An open write batch; dereferences to the surface.
pub struct WriteBatch<'a, S: Surface + ?Sized> {
    surface: &'a mut S,
    writing: &'a mut bool,
}

impl<S: Surface + ?Sized> Deref for WriteBatch<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &*self.surface
    }
}

impl<S: Surface + ?Sized> DerefMut for WriteBatch<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut *self.surface
    }
}

impl<S: Surface + ?Sized> Drop for WriteBatch<'_, S> {
    fn drop(&mut self) {
        self.surface.stamp_self_writes(None);
        *self.writing = false;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/stabilize/guard.rs"]
mod tests;
