use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// One visual observation: a flattened grayscale frame with pixel
/// intensities normalized to `0.0..=1.0`. Immutable once created.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    values: Box<[f32]>,
}

impl Frame {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values: values.into_boxed_slice() }
    }

    pub fn values(&self) -> &[f32] { &self.values }

    pub fn len(&self) -> usize { self.values.len() }

    pub fn is_empty(&self) -> bool { self.values.is_empty() }
}

/// Bounded circular store of the most recent observation frames, addressed
/// by a global monotonic frame index.
///
/// `curr_index` counts every frame ever appended; `start_index` is the
/// global index of the oldest frame still retained. The invariant
/// `curr_index - start_index <= max_frames` holds after every operation.
///
/// A lookup older than `start_index` resolves to the oldest retained frame
/// instead of failing - callers relying on long-gone frames get the
/// closest survivor, not an error.
pub struct FrameStore {
    max_frames: usize,
    frames: VecDeque<Rc<Frame>>,
    start_index: usize,
    curr_index: usize,
}

impl FrameStore {
    pub fn new(max_frames: usize) -> Self {
        assert!(max_frames > 0);
        Self {
            max_frames,
            frames: VecDeque::with_capacity(max_frames),
            start_index: 0,
            curr_index: 0,
        }
    }

    /// Stores `frame` and returns its global index.
    /// Evicts the oldest retained frame when the capacity is exceeded.
    pub fn append(&mut self, frame: Frame) -> usize {
        self.frames.push_back(Rc::new(frame));
        self.curr_index += 1;

        if self.frames.len() > self.max_frames {
            self.frames.pop_front();
            self.start_index += 1;
        }

        self.curr_index - 1
    }

    /// Frame at global `index`. An index older than the retention window is
    /// clamped to the oldest retained frame. An index that was never
    /// appended is a programmer error.
    pub fn get(&self, index: usize) -> Rc<Frame> {
        assert!(index < self.curr_index, "frame index {} was never appended (appended so far: {})", index, self.curr_index);
        if index < self.start_index {
            Rc::clone(self.frames.front().expect("at least one frame is retained"))
        } else {
            Rc::clone(&self.frames[index - self.start_index])
        }
    }

    /// Number of frames ever appended (not the number currently retained).
    pub fn current_index(&self) -> usize { self.curr_index }

    /// Number of frames currently retained.
    pub fn len(&self) -> usize { self.frames.len() }

    pub fn is_empty(&self) -> bool { self.frames.is_empty() }

    /// Most recently appended frame.
    pub fn latest(&self) -> Option<Rc<Frame>> {
        self.frames.back().map(Rc::clone)
    }
}

/// Shared-ownership handle to one [FrameStore], created once per process
/// and handed to every consumer (agents, replay buffers, the session).
/// All consumers observe the same retention window and index space.
///
/// The step loop is strictly single-threaded, hence `Rc<RefCell<_>>`;
/// introducing parallel simulation workers would require replacing this
/// handle with a lock-guarded one (single writer for `append`).
#[derive(Clone)]
pub struct SharedFrameStore(Rc<RefCell<FrameStore>>);

impl SharedFrameStore {
    pub fn new(max_frames: usize) -> Self {
        SharedFrameStore(Rc::new(RefCell::new(FrameStore::new(max_frames))))
    }

    pub fn append(&self, frame: Frame) -> usize {
        self.0.borrow_mut().append(frame)
    }

    pub fn get(&self, index: usize) -> Rc<Frame> {
        self.0.borrow().get(index)
    }

    pub fn current_index(&self) -> usize {
        self.0.borrow().current_index()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn latest(&self) -> Option<Rc<Frame>> {
        self.0.borrow().latest()
    }
}
