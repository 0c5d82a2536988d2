use std::collections::VecDeque;

#[derive(Debug)]
pub struct RollingMean<T> {
    window: VecDeque<T>,
    size: usize,
    sum: T,
}

impl<T: num_traits::Float> RollingMean<T> {
    pub fn new(size: usize) -> Self {
        RollingMean {
            window: VecDeque::with_capacity(size),
            size: size.max(1),
            sum: T::zero(),
        }
    }

    /// Push a new value into the window and return the new mean
    pub fn push(&mut self, value: T) -> T {
        if self.window.len() == self.size {
            if let Some(old) = self.window.pop_front() {
                self.sum = self.sum - old;
            }
        }
        self.window.push_back(value);
        self.sum = self.sum + value;
        self.mean()
    }

    pub fn mean(&self) -> T {
        if self.window.is_empty() {
            return T::zero();
        }
        self.sum / T::from(self.window.len()).unwrap_or_else(T::one)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}
