//! 板级常量
//!
//! 每块板一个常量文件；驱动只吃这些数字，不自己编地址。

mod bl808;

pub use bl808::*;
