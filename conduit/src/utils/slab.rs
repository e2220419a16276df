/// A simple slab allocator.
///
/// A `Slab` stores values in a contiguous array and hands out small
/// indices that are reused after removal. The reactor uses these indices
/// as poller tokens.
///
/// Because indices are reused, a token alone does not identify a value
/// forever: callers that may hold an index across a removal must carry
/// their own generation or identity check.
pub(crate) struct Slab<T> {
    /// Storage; `None` marks a free slot.
    items: Vec<Option<T>>,
    /// Stack of free indices that can be reused.
    free: Vec<usize>,
}

impl<T> Slab<T> {
    /// Creates a new `Slab` with `size` free slots.
    pub(crate) fn new(size: usize) -> Self {
        let items = (0..size).map(|_| None).collect();
        let free = (0..size).rev().collect();

        Self { items, free }
    }

    /// Inserts a value and returns its index.
    ///
    /// A free slot is reused when available; otherwise the slab doubles.
    pub(crate) fn insert(&mut self, item: T) -> usize {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let len = self.items.len();
                let new_len = if len == 0 { 1 } else { 2 * len };

                self.items.extend((len..new_len).map(|_| None));
                self.free.extend(((len + 1)..new_len).rev());

                len
            }
        };

        self.items[index] = Some(item);
        index
    }

    /// Index the next [`insert`](Self::insert) will return.
    pub(crate) fn vacant_key(&self) -> usize {
        self.free.last().copied().unwrap_or(self.items.len())
    }

    /// Removes and returns the value stored at `index`, if any.
    pub(crate) fn remove(&mut self, index: usize) -> Option<T> {
        let item = self.items.get_mut(index)?.take()?;
        self.free.push(index);
        Some(item)
    }

    pub(crate) fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)?.as_mut()
    }

    /// Removes every value, yielding them in index order.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.free.clear();
        self.free.extend((0..self.items.len()).rev());
        self.items.iter_mut().filter_map(Option::take)
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len() - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_freed_slots() {
        let mut slab = Slab::new(2);

        let a = slab.insert("a");
        let b = slab.insert("b");
        assert_eq!((a, b), (0, 1));

        assert_eq!(slab.remove(a), Some("a"));
        assert_eq!(slab.remove(a), None);
        assert_eq!(slab.vacant_key(), a);
        assert_eq!(slab.insert("c"), a);
        assert_eq!(slab.get(a), Some(&"c"));
    }

    #[test]
    fn grows_when_full() {
        let mut slab = Slab::new(0);

        for i in 0..5 {
            assert_eq!(slab.insert(i), i);
        }
        assert_eq!(slab.len(), 5);

        let drained: Vec<_> = slab.drain().collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert_eq!(slab.len(), 0);
    }
}
