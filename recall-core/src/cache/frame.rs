//! Call Frames
//!
//! Tracks which cached methods are being computed by the current task, so a
//! computation that (directly or through other cached methods) awaits its own
//! result on the same instance is reported instead of waiting on itself
//! forever.
//!
//! # Implementation
//!
//! A task-local stack of `(instance, method)` frames. Each computation runs
//! in its own spawned task, and that task is scoped with the caller's stack
//! plus one frame for the method being computed.

use std::future::Future;
use std::sync::Arc;

use super::state::InstanceId;

tokio::task_local! {
    static FRAMES: CallStack;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Frame {
    instance: InstanceId,
    method: Arc<str>,
}

/// The chain of cached-method computations the current task is running
/// inside of, outermost first.
#[derive(Debug, Clone, Default)]
pub(crate) struct CallStack {
    frames: Arc<Vec<Frame>>,
}

impl CallStack {
    /// The stack of the current task, empty outside of any computation.
    pub(crate) fn current() -> Self {
        FRAMES.try_with(Clone::clone).unwrap_or_default()
    }

    /// Whether `method` on `instance` is already being computed by this chain.
    pub(crate) fn contains(&self, instance: InstanceId, method: &str) -> bool {
        self.frames
            .iter()
            .any(|frame| frame.instance == instance && &*frame.method == method)
    }

    /// A new stack with one more frame on top.
    pub(crate) fn push(&self, instance: InstanceId, method: Arc<str>) -> Self {
        let mut frames = Vec::with_capacity(self.frames.len() + 1);
        frames.extend(self.frames.iter().cloned());
        frames.push(Frame { instance, method });
        Self {
            frames: Arc::new(frames),
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Run `fut` with this stack as the task's current stack.
    pub(crate) fn scope<F: Future>(self, fut: F) -> impl Future<Output = F::Output> {
        FRAMES.scope(self, fut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::class::ClassBuilder;
    use crate::cache::state::{Cacheable, InstanceState};

    struct Host {
        state: InstanceState,
    }

    impl Cacheable for Host {
        fn cache_state(&self) -> &InstanceState {
            &self.state
        }
    }

    fn instance_ids() -> (InstanceId, InstanceId) {
        let class = ClassBuilder::<Host>::new("Host").build().unwrap();
        (
            InstanceState::new(&class).id(),
            InstanceState::new(&class).id(),
        )
    }

    #[test]
    fn empty_outside_of_scope() {
        let stack = CallStack::current();
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn push_does_not_modify_parent() {
        let (a, _) = instance_ids();
        let root = CallStack::default();
        let child = root.push(a, Arc::from("m"));

        assert_eq!(root.depth(), 0);
        assert_eq!(child.depth(), 1);
        assert!(child.contains(a, "m"));
        assert!(!root.contains(a, "m"));
    }

    #[test]
    fn frames_are_per_instance() {
        let (a, b) = instance_ids();
        let stack = CallStack::default().push(a, Arc::from("m"));

        assert!(stack.contains(a, "m"));
        assert!(!stack.contains(b, "m"));
        assert!(!stack.contains(a, "other"));
    }

    #[tokio::test]
    async fn scope_sets_current_stack() {
        let (a, _) = instance_ids();
        let stack = CallStack::default().push(a, Arc::from("outer"));

        let inner = stack
            .scope(async {
                let current = CallStack::current();
                (current.depth(), current.contains(a, "outer"))
            })
            .await;

        assert_eq!(inner, (1, true));
        assert_eq!(CallStack::current().depth(), 0);
    }
}
