//! 单核独占访问单元
//!
//! # Overview
//! 本 crate 只面向单 hart 目标，没有真正的并行执行流；共享可变状态
//! 只会被「启动流程」或「陷阱上下文」二者之一触碰。`UPSafeCell` 把
//! `RefCell` 包装成 `Sync`，让全局静态量可以在这种前提下做内部可变。
//!
//! # Safety
//! - `Sync` 是在「单核且陷阱处理器不可重入」的前提下人为断言的，
//!   构造函数因此标为 `unsafe`。
//! - 借用冲突仍由内层 `RefCell` 在运行期拦截。

use core::cell::{RefCell, RefMut};

/// 允许在单核环境下把可变数据放进全局静态量。
pub struct UPSafeCell<T> {
    inner: RefCell<T>,
}

unsafe impl<T> Sync for UPSafeCell<T> {}
unsafe impl<T> Send for UPSafeCell<T> {}

impl<T> UPSafeCell<T> {
    /// # Safety
    /// 调用者保证整个程序只有一个 hart 在访问该单元。
    pub unsafe fn new(value: T) -> Self {
        Self {
            inner: RefCell::new(value),
        }
    }

    /// 独占借用内部数据；重复借用会 panic。
    pub fn exclusive_access(&self) -> RefMut<'_, T> {
        self.inner.borrow_mut()
    }
}
