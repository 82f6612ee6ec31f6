use std::fmt;

/// Fixed-capacity ring buffer that overwrites its oldest slot once full.
///
/// Storage is allocated up front; `push` never reallocates.
pub struct CircularQueue<T> {
    slots: Vec<T>,
    cursor: usize,
    wrapped: bool,
}

impl<T: Clone> Clone for CircularQueue<T> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
            cursor: self.cursor,
            wrapped: self.wrapped,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for CircularQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircularQueue")
            .field("capacity", &self.slots.len())
            .field("cursor", &self.cursor)
            .field("wrapped", &self.wrapped)
            .finish()
    }
}

impl<T: Copy + Default> CircularQueue<T> {
    #[inline]
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            slots: vec![T::default(); cap.max(1)],
            cursor: 0,
            wrapped: false,
        }
    }

    /// Writes `item` at the cursor. Returns `true` when this push completed the first wrap.
    #[inline]
    pub fn push(&mut self, item: T) -> bool {
        self.slots[self.cursor] = item;
        self.cursor += 1;

        if self.cursor == self.slots.len() {
            self.cursor = 0;
            let first_wrap = !self.wrapped;
            self.wrapped = true;

            return first_wrap;
        }

        false
    }

    #[inline]
    pub fn clear(&mut self) {
        self.slots.fill(T::default());
        self.cursor = 0;
        self.wrapped = false;
    }
}

impl<T> CircularQueue<T> {
    /// Slots holding data, in storage order.
    #[inline]
    pub fn filled(&self) -> &[T] {
        if self.wrapped {
            &self.slots
        } else {
            &self.slots[..self.cursor]
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.filled().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.wrapped
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[cfg(test)]
    fn cursor(&self) -> usize {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_and_overwrites_oldest() {
        let mut q = CircularQueue::with_capacity(3);

        assert!(!q.push(1));
        assert!(!q.push(2));
        assert_eq!(q.filled(), &[1, 2]);
        assert!(q.push(3));
        assert!(q.is_full());
        assert_eq!(q.cursor(), 0);

        assert!(!q.push(4));
        assert_eq!(q.filled(), &[4, 2, 3]);
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn clear_resets_state() {
        let mut q = CircularQueue::with_capacity(2);
        q.push(1.0);
        q.push(2.0);
        q.clear();

        assert!(q.is_empty());
        assert!(!q.is_full());
        assert_eq!(q.capacity(), 2);
    }
}
