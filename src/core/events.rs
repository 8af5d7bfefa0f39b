//! 类型化事件分发
//!
//! 固定事件名到有序回调集合的映射。回调按注册顺序同步调用，
//! 注册与注销都是幂等的（以 `Rc` 指针身份判等）。

use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;

/// 事件监听器
pub type Listener<P> = Rc<dyn Fn(&P)>;

/// 事件分发器
pub struct EventEmitter<K, P> {
    listeners: HashMap<K, Vec<Listener<P>>>,
}

impl<K: Copy + Eq + Hash, P> EventEmitter<K, P> {
    pub fn new() -> Self {
        Self {
            listeners: HashMap::new(),
        }
    }

    /// 注册监听器；同一监听器重复注册不会产生第二个条目
    pub fn add_listener(&mut self, kind: K, listener: Listener<P>) {
        let set = self.listeners.entry(kind).or_default();
        if !set.iter().any(|l| Rc::ptr_eq(l, &listener)) {
            set.push(listener);
        }
    }

    /// 注销监听器；未注册时无操作
    pub fn remove_listener(&mut self, kind: K, listener: &Listener<P>) {
        if let Some(set) = self.listeners.get_mut(&kind) {
            set.retain(|l| !Rc::ptr_eq(l, listener));
        }
    }

    /// 同步分发事件
    pub fn emit(&self, kind: K, payload: &P) {
        if let Some(set) = self.listeners.get(&kind) {
            // 克隆快照，回调内的注册变更不影响本次分发
            let snapshot: Vec<Listener<P>> = set.clone();
            for listener in snapshot {
                listener(payload);
            }
        }
    }

    pub fn listener_count(&self, kind: K) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }
}

impl<K: Copy + Eq + Hash, P> Default for EventEmitter<K, P> {
    fn default() -> Self {
        Self::new()
    }
}
