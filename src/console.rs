//! 控制台输出模块
//!
//! # Overview
//! 本核心对外只要求一个字节级的诊断输出接口（[`ConsoleSink`]）。具体的
//! UART 驱动由外围代码提供，这里负责：
//! - 定义 sink 接口与 `core::fmt` 适配器；
//! - 维护一个可安装的全局 sink，支撑 `print!` / `println!` 宏；
//! - 把 `log` 门面的记录转发到同一个 sink。
//!
//! # Design
//! - sink 方法取 `&self`：串口寄存器写本来就是内部可变的，这也让
//!   陷阱分发器可以长期持有一个共享引用。
//! - 安装前的任何输出被静默丢弃，诊断通道永远不参与控制流。

use core::fmt::{self, Write};

use lazy_static::lazy_static;

use crate::sync::UPSafeCell;

/// 诊断字节输出接口，由外围的串口驱动实现。
pub trait ConsoleSink {
    fn put_byte(&self, byte: u8);

    fn put_str(&self, s: &str) {
        for byte in s.as_bytes() {
            self.put_byte(*byte);
        }
    }
}

/// 把 [`ConsoleSink`] 适配成 `core::fmt::Write`。
pub struct SinkWriter<'a>(pub &'a dyn ConsoleSink);

impl Write for SinkWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.put_str(s);
        Ok(())
    }
}

lazy_static! {
    static ref CONSOLE: UPSafeCell<Option<&'static dyn ConsoleSink>> =
        unsafe { UPSafeCell::new(None) };
}

struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let sink = *CONSOLE.exclusive_access();
        if let Some(sink) = sink {
            let _ = writeln!(
                SinkWriter(sink),
                "[{}] {}",
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

/// 安装全局控制台并接管 `log` 门面。
///
/// 重复安装只更新 sink；日志器注册失败（已被占用）被忽略。
pub fn init(sink: &'static dyn ConsoleSink) {
    *CONSOLE.exclusive_access() = Some(sink);
    let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(log::LevelFilter::Info));
}

pub fn print(args: fmt::Arguments) {
    let sink = *CONSOLE.exclusive_access();
    if let Some(sink) = sink {
        let _ = SinkWriter(sink).write_fmt(args);
    }
}

#[macro_export]
macro_rules! print {
    ($fmt: literal $(, $($arg: tt)+)?) => {
        $crate::console::print(format_args!($fmt $(, $($arg)+)?))
    };
}

#[macro_export]
macro_rules! println {
    ($fmt: literal $(, $($arg: tt)+)?) => {
        $crate::console::print(format_args!(concat!($fmt, "\n") $(, $($arg)+)?))
    };
}
