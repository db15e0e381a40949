use std::num::NonZeroUsize;

/// One display row borrowed from a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayGroup<'a, T> {
    pub index: usize,
    pub items: &'a [T],
}

impl<'a, T> DisplayGroup<'a, T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Position of each item in the original sequence.
    pub fn positions(&self, width: NonZeroUsize) -> std::ops::Range<usize> {
        let start = self.index * width.get();
        start..start + self.items.len()
    }
}

/// Splits `items` into rows of `width`; the last row may be shorter.
pub fn partition<T>(items: &[T], width: NonZeroUsize) -> Vec<DisplayGroup<'_, T>> {
    items
        .chunks(width.get())
        .enumerate()
        .map(|(index, items)| DisplayGroup { index, items })
        .collect()
}
