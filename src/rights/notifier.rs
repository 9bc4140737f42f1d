use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::rights::types::Auth;

/// Observer of committed configuration changes.
pub trait RightsChangeListener: Send + Sync {
    /// Called once per successful commit, after the new snapshot is installed.
    fn configuration_changed(&self, snapshot: &Arc<Auth>) -> miette::Result<()>;
}

/// Handle returned by `add_listener`, used to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listener registry. Listeners are held weakly so a subscriber that owns the
/// store does not keep itself alive through it.
#[derive(Default)]
pub struct ChangeNotifier {
    listeners: Mutex<Vec<(ListenerId, Weak<dyn RightsChangeListener>)>>,
    next_id: AtomicU64,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Weak<dyn RightsChangeListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver a change to every live listener. Returns how many were notified
    /// successfully. Failures are logged and never stop delivery.
    pub fn notify(&self, snapshot: &Arc<Auth>) -> usize {
        // Copy out so listeners run without the registry lock and may
        // (de)register from inside the callback.
        let listeners: Vec<_> = {
            let mut guard = self.listeners.lock();
            guard.retain(|(_, weak)| weak.strong_count() > 0);
            guard.clone()
        };

        let mut delivered = 0;
        for (id, weak) in listeners {
            let Some(listener) = weak.upgrade() else {
                continue;
            };
            match catch_unwind(AssertUnwindSafe(|| listener.configuration_changed(snapshot))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => {
                    tracing::error!(listener = id.0, error = %err, "rights change listener failed");
                }
                Err(_) => {
                    tracing::error!(listener = id.0, "rights change listener panicked");
                }
            }
        }
        delivered
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rights::types::PolicyMode;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl RightsChangeListener for Counting {
        fn configuration_changed(&self, _snapshot: &Arc<Auth>) -> miette::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    impl RightsChangeListener for Failing {
        fn configuration_changed(&self, _snapshot: &Arc<Auth>) -> miette::Result<()> {
            Err(miette::miette!("listener refused"))
        }
    }

    struct Panicking;

    impl RightsChangeListener for Panicking {
        fn configuration_changed(&self, _snapshot: &Arc<Auth>) -> miette::Result<()> {
            panic!("listener exploded");
        }
    }

    fn snapshot() -> Arc<Auth> {
        Arc::new(Auth {
            mode: PolicyMode::AllowListed,
            profiles: vec![],
            user_profiles: vec![],
        })
    }

    fn weak<T: RightsChangeListener + 'static>(listener: &Arc<T>) -> Weak<dyn RightsChangeListener> {
        let listener: Arc<dyn RightsChangeListener> = listener.clone();
        Arc::downgrade(&listener)
    }

    #[test]
    fn test_notify_reaches_all_listeners() {
        let notifier = ChangeNotifier::new();
        let a = Arc::new(Counting::default());
        let b = Arc::new(Counting::default());
        notifier.add_listener(weak(&a));
        notifier.add_listener(weak(&b));

        assert_eq!(notifier.notify(&snapshot()), 2);
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failures_do_not_stop_delivery() {
        let notifier = ChangeNotifier::new();
        let failing = Arc::new(Failing);
        let panicking = Arc::new(Panicking);
        let counting = Arc::new(Counting::default());
        notifier.add_listener(weak(&failing));
        notifier.add_listener(weak(&panicking));
        notifier.add_listener(weak(&counting));

        assert_eq!(notifier.notify(&snapshot()), 1);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_listener() {
        let notifier = ChangeNotifier::new();
        let a = Arc::new(Counting::default());
        let id = notifier.add_listener(weak(&a));

        assert!(notifier.remove_listener(id));
        assert!(!notifier.remove_listener(id));
        assert_eq!(notifier.notify(&snapshot()), 0);
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dropped_listeners_are_pruned() {
        let notifier = ChangeNotifier::new();
        let a = Arc::new(Counting::default());
        notifier.add_listener(weak(&a));
        drop(a);

        assert_eq!(notifier.notify(&snapshot()), 0);
        assert!(notifier.is_empty());
    }
}
