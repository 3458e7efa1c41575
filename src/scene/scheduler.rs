use super::NodeKey;

/// Deferred `need_update` requests, flushed once per update pass. Owned by
/// the scene graph instead of living in a global.
#[derive(Clone, Debug, Default)]
pub struct UpdateScheduler {
    queue: Vec<NodeKey>,
}

impl UpdateScheduler {
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.queue.contains(&key)
    }

    pub fn queued(&self) -> &[NodeKey] {
        &self.queue
    }

    pub(crate) fn push(&mut self, key: NodeKey) {
        self.queue.push(key);
    }

    /// Order of the remaining entries is not preserved.
    pub(crate) fn remove(&mut self, key: NodeKey) -> bool {
        match self.queue.iter().position(|queued| *queued == key) {
            Some(index) => {
                self.queue.swap_remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn take(&mut self) -> Vec<NodeKey> {
        std::mem::take(&mut self.queue)
    }
}
