use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

type Listener<V> = Rc<dyn Fn(&V)>;

struct StoreInner<K, V> {
    values: BTreeMap<K, V>,
    listeners: BTreeMap<K, Vec<(u64, Listener<V>)>>,
    next_id: u64,
}

/// Keyed observable store. Cloning yields another handle to the same store.
///
/// `set` is a no-op (and notifies nobody) when the new value equals the
/// current one. Listeners run after the store is updated and may read it.
pub struct Store<K, V> {
    inner: Rc<RefCell<StoreInner<K, V>>>,
}

impl<K, V> Clone for Store<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K: Ord + Clone, V: Clone + PartialEq> Default for Store<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone, V: Clone + PartialEq> Store<K, V> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(StoreInner {
                values: BTreeMap::new(),
                listeners: BTreeMap::new(),
                next_id: 0,
            })),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.borrow().values.get(key).cloned()
    }

    /// Stores `value` and notifies subscribers of `key`. Returns whether the
    /// value changed.
    pub fn set(&self, key: K, value: V) -> bool {
        let listeners: Vec<Listener<V>> = {
            let mut inner = self.inner.borrow_mut();
            if inner.values.get(&key) == Some(&value) {
                return false;
            }
            inner.values.insert(key.clone(), value.clone());
            inner
                .listeners
                .get(&key)
                .map(|subs| subs.iter().map(|(_, l)| Rc::clone(l)).collect())
                .unwrap_or_default()
        };

        for listener in listeners {
            listener(&value);
        }
        true
    }

    pub fn subscribe(&self, key: K, listener: impl Fn(&V) + 'static) -> Subscription<K, V> {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .listeners
            .entry(key.clone())
            .or_default()
            .push((id, Rc::new(listener)));

        Subscription {
            store: Rc::downgrade(&self.inner),
            key,
            id,
        }
    }

    pub fn subscriber_count(&self, key: &K) -> usize {
        self.inner
            .borrow()
            .listeners
            .get(key)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// Handle returned by `Store::subscribe`.
pub struct Subscription<K, V> {
    store: std::rc::Weak<RefCell<StoreInner<K, V>>>,
    key: K,
    id: u64,
}

impl<K: Ord, V> Subscription<K, V> {
    pub fn unsubscribe(self) {
        let Some(inner) = self.store.upgrade() else {
            return;
        };
        let mut inner = inner.borrow_mut();
        let emptied = match inner.listeners.get_mut(&self.key) {
            Some(subs) => {
                subs.retain(|(id, _)| *id != self.id);
                subs.is_empty()
            }
            None => false,
        };
        if emptied {
            inner.listeners.remove(&self.key);
        }
    }
}
